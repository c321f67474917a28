// src/pipeline/merge.rs

//! Reconciliation engine.
//!
//! Combines a directory candidate, its detail record, and the crawler
//! finding into one canonical row per place id. The run-scoped
//! [`MergeTable`] enforces the uniqueness invariant: duplicates across
//! paginated search results collapse into one row, and later-seen data
//! never overwrites a field that is already populated.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{
    CanonicalRow, CrawlResult, DetailRecord, FieldSource, MenuFlag, PlaceCandidate, SourceFlags,
};

/// Default cuisine label when the directory gives no recognizable type.
const DEFAULT_CUISINE: &str = "Restaurant";

/// Merge the artifacts for one place into a canonical row.
///
/// Directory-sourced fields are authoritative over heuristic-derived ones;
/// the menu URL is only ever populated from a confirmed crawl find.
pub fn merge(
    candidate: &PlaceCandidate,
    detail: Option<&DetailRecord>,
    crawl: &CrawlResult,
) -> CanonicalRow {
    let postcode = detail.map(|d| d.postcode.clone()).unwrap_or_default();
    let cuisine_guess = detail.and_then(|d| d.cuisine_guess.clone());

    let flags = SourceFlags {
        name: FieldSource::Directory,
        postcode: if postcode.is_empty() {
            FieldSource::Default
        } else {
            FieldSource::Detail
        },
        cuisine: if cuisine_guess.is_some() {
            FieldSource::Detail
        } else {
            FieldSource::Default
        },
        menu: crawl.flag(),
    };

    CanonicalRow {
        place_id: candidate.place_id.clone(),
        name: candidate.name.clone(),
        postcode,
        cuisine: cuisine_guess.unwrap_or_else(|| DEFAULT_CUISINE.to_string()),
        menu_url: crawl.menu_url().map(str::to_string),
        coordinates: detail
            .and_then(|d| d.coordinates)
            .or(candidate.coordinates),
        address: detail.map(|d| d.address.clone()).unwrap_or_default(),
        website: detail.and_then(|d| d.website.clone()),
        flags,
    }
}

/// Run-scoped table of canonical rows, keyed by place id.
///
/// Safe under concurrent upserts for different ids; inserts and per-row
/// merges are serialized by the table lock.
#[derive(Default)]
pub struct MergeTable {
    inner: Mutex<TableInner>,
}

#[derive(Default)]
struct TableInner {
    rows: HashMap<String, CanonicalRow>,
    dropped: usize,
}

impl MergeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or merge a row. Idempotent: applying the same row twice
    /// leaves the table unchanged.
    ///
    /// Rows without a usable place id are counted as dropped and reported
    /// as an error, never silently included.
    pub fn upsert(&self, row: CanonicalRow) -> Result<()> {
        let mut inner = self.inner.lock().expect("merge table poisoned");

        if row.place_id.trim().is_empty() {
            inner.dropped += 1;
            return Err(AppError::validation(format!(
                "record without place id dropped (name: {:?})",
                row.name
            )));
        }

        match inner.rows.entry(row.place_id.clone()) {
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(row);
            }
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                fill_absent(slot.get_mut(), row);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("merge table poisoned").rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records dropped for lacking a place id.
    pub fn dropped(&self) -> usize {
        self.inner.lock().expect("merge table poisoned").dropped
    }

    /// Consume the table into the final ordered row set: by name, then
    /// place id, for a stable output across runs.
    pub fn into_rows(self) -> Vec<CanonicalRow> {
        let inner = self.inner.into_inner().expect("merge table poisoned");
        let mut rows: Vec<CanonicalRow> = inner.rows.into_values().collect();
        rows.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.place_id.cmp(&b.place_id))
        });
        rows
    }
}

/// Fill absent fields of `existing` from `incoming` without overwriting
/// anything already populated.
fn fill_absent(existing: &mut CanonicalRow, incoming: CanonicalRow) {
    if existing.name.is_empty() && !incoming.name.is_empty() {
        existing.name = incoming.name;
        existing.flags.name = incoming.flags.name;
    }
    if existing.postcode.is_empty() && !incoming.postcode.is_empty() {
        existing.postcode = incoming.postcode;
        existing.flags.postcode = incoming.flags.postcode;
    }
    if existing.flags.cuisine == FieldSource::Default
        && incoming.flags.cuisine != FieldSource::Default
    {
        existing.cuisine = incoming.cuisine;
        existing.flags.cuisine = incoming.flags.cuisine;
    }
    if existing.menu_url.is_none() && incoming.menu_url.is_some() {
        existing.menu_url = incoming.menu_url;
        existing.flags.menu = MenuFlag::Found;
    }
    if existing.coordinates.is_none() {
        existing.coordinates = incoming.coordinates;
    }
    if existing.address.is_empty() && !incoming.address.is_empty() {
        existing.address = incoming.address;
    }
    if existing.website.is_none() {
        existing.website = incoming.website;
    }
}
