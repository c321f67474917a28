// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory search settings
    #[serde(default)]
    pub places: PlacesConfig,

    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Output table settings
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    ///
    /// Failures here are fatal and abort the run before any network
    /// activity.
    pub fn validate(&self) -> Result<()> {
        if self.places.query.trim().is_empty() {
            return Err(AppError::validation("places.query is empty"));
        }
        if self.places.radius_m <= 0.0 {
            return Err(AppError::validation("places.radius_m must be > 0"));
        }
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.agent_token.trim().is_empty() {
            return Err(AppError::validation("crawler.agent_token is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.hop_budget == 0 {
            return Err(AppError::validation("crawler.hop_budget must be > 0"));
        }
        Ok(())
    }
}

/// Directory search settings.
///
/// The defaults describe the Soho, London survey area the pipeline was
/// first built for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacesConfig {
    /// Text query passed to the directory search
    #[serde(default = "defaults::query")]
    pub query: String,

    /// Center of the location-bias circle
    #[serde(default = "defaults::latitude")]
    pub latitude: f64,

    #[serde(default = "defaults::longitude")]
    pub longitude: f64,

    /// Radius of the location-bias circle in meters
    #[serde(default = "defaults::radius")]
    pub radius_m: f64,

    /// Pause between search result pages in milliseconds
    #[serde(default = "defaults::page_gap")]
    pub page_gap_ms: u64,
}

impl Default for PlacesConfig {
    fn default() -> Self {
        Self {
            query: defaults::query(),
            latitude: defaults::latitude(),
            longitude: defaults::longitude(),
            radius_m: defaults::radius(),
            page_gap_ms: defaults::page_gap(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Token matched against robots.txt user-agent groups
    #[serde(default = "defaults::agent_token")]
    pub agent_token: String,

    /// Hard per-page deadline in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent in-flight places
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Attempts for transient detail/crawl failures
    #[serde(default = "defaults::retry_limit")]
    pub retry_limit: u32,

    /// Per-host request spacing floor in milliseconds, used when
    /// robots.txt gives no crawl-delay
    #[serde(default = "defaults::host_delay")]
    pub host_delay_ms: u64,

    /// Candidate pages fetched per site during menu discovery
    #[serde(default = "defaults::hop_budget")]
    pub hop_budget: usize,

    /// Redirects followed before a fetch counts as a redirect loop
    #[serde(default = "defaults::redirect_limit")]
    pub redirect_limit: usize,
}

impl CrawlerConfig {
    /// Per-page deadline as a `Duration`.
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Per-host spacing floor as a `Duration`.
    pub fn host_delay(&self) -> Duration {
        Duration::from_millis(self.host_delay_ms)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            agent_token: defaults::agent_token(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            retry_limit: defaults::retry_limit(),
            host_delay_ms: defaults::host_delay(),
            hop_budget: defaults::hop_budget(),
            redirect_limit: defaults::redirect_limit(),
        }
    }
}

/// Output table settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory the table and run stats are written into
    #[serde(default = "defaults::output_dir")]
    pub dir: String,

    /// Table file name
    #[serde(default = "defaults::table_name")]
    pub table_name: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: defaults::output_dir(),
            table_name: defaults::table_name(),
        }
    }
}

mod defaults {
    pub fn query() -> String {
        "restaurants in Soho London".to_string()
    }

    pub fn latitude() -> f64 {
        51.5136
    }

    pub fn longitude() -> f64 {
        -0.1331
    }

    pub fn radius() -> f64 {
        1000.0
    }

    pub fn page_gap() -> u64 {
        1500
    }

    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; menufinder/0.1)".to_string()
    }

    pub fn agent_token() -> String {
        "menufinder".to_string()
    }

    pub fn timeout() -> u64 {
        5
    }

    pub fn max_concurrent() -> usize {
        8
    }

    pub fn retry_limit() -> u32 {
        3
    }

    pub fn host_delay() -> u64 {
        250
    }

    pub fn hop_budget() -> usize {
        3
    }

    pub fn redirect_limit() -> usize {
        5
    }

    pub fn output_dir() -> String {
        "output".to_string()
    }

    pub fn table_name() -> String {
        "restaurants.csv".to_string()
    }
}
