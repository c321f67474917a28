// src/models/place.rs

//! Place records flowing through the pipeline.
//!
//! A place moves through three artifact stages: the search-time
//! [`PlaceCandidate`], the enrichment [`DetailRecord`], and the merged
//! [`CanonicalRow`] that ends up in the output table.

use serde::{Deserialize, Serialize};

/// Geographic point in WGS84.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A place as returned by a directory search page.
///
/// Immutable once created. Duplicate candidates for the same `place_id`
/// may appear across paginated search results; downstream merging collapses
/// them into one row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceCandidate {
    /// Opaque stable directory identifier, never reused
    pub place_id: String,

    /// Display name
    pub name: String,

    /// Location, when the directory supplies one
    pub coordinates: Option<Coordinates>,

    /// Zero-based position in the search result sequence
    pub search_rank: usize,
}

/// Enrichment fields from a directory detail lookup, keyed by place id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailRecord {
    pub place_id: String,

    /// Formatted street address
    pub address: String,

    /// Postcode extracted from the address, empty if none matched
    pub postcode: String,

    /// The restaurant's own website, if it has one
    pub website: Option<String>,

    /// Cuisine derived from the directory's place types
    pub cuisine_guess: Option<String>,

    /// National phone number
    pub phone: String,

    pub coordinates: Option<Coordinates>,
}

/// Where a merged field's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Directory,
    Detail,
    Crawl,
    Default,
}

impl FieldSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Detail => "detail",
            Self::Crawl => "crawl",
            Self::Default => "default",
        }
    }
}

/// Diagnostic outcome of menu discovery, kept distinguishable even though
/// every non-`Found` variant maps to an absent menu URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MenuFlag {
    Found,
    NotFound,
    Blocked,
    Failed,
}

impl MenuFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Found => "found",
            Self::NotFound => "not-found",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }
}

/// Per-field provenance for one canonical row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFlags {
    pub name: FieldSource,
    pub postcode: FieldSource,
    pub cuisine: FieldSource,
    pub menu: MenuFlag,
}

impl SourceFlags {
    /// Compact form for the diagnostic CSV column,
    /// e.g. `name=directory,postcode=detail,cuisine=default,menu=blocked`.
    pub fn summary(&self) -> String {
        format!(
            "name={},postcode={},cuisine={},menu={}",
            self.name.as_str(),
            self.postcode.as_str(),
            self.cuisine.as_str(),
            self.menu.as_str()
        )
    }
}

impl Default for SourceFlags {
    fn default() -> Self {
        Self {
            name: FieldSource::Directory,
            postcode: FieldSource::Default,
            cuisine: FieldSource::Default,
            menu: MenuFlag::NotFound,
        }
    }
}

/// The single deduplicated output record for one place.
///
/// Exactly one row exists per distinct place id in the final table. Fields
/// are filled in as artifacts arrive and never overwritten once non-empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRow {
    /// Primary key, unique across the whole run
    pub place_id: String,

    pub name: String,

    pub postcode: String,

    pub cuisine: String,

    /// Menu page URL, only ever populated from a confirmed crawl find
    pub menu_url: Option<String>,

    // Diagnostic columns beyond the core schema
    pub coordinates: Option<Coordinates>,
    pub address: String,
    pub website: Option<String>,

    pub flags: SourceFlags,
}
