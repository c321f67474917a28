// src/pipeline/run.rs

//! Pipeline orchestration.
//!
//! Drives search, detail enrichment, menu discovery, and reconciliation
//! over the full candidate set with bounded concurrency. Each worker owns
//! one place end-to-end: detail fetch, menu crawl, merge. Per-place
//! failures degrade to a partial row; nothing short of a config error
//! aborts the run.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::Result;
use crate::models::{CanonicalRow, Config, CrawlResult, DetailRecord, MenuFlag, PlaceCandidate};
use crate::pipeline::merge::{MergeTable, merge};
use crate::services::{HostGate, MenuDiscovery, PlaceDirectory, PolicyStore};
use crate::utils::http::create_async_client;

/// Summary of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,

    /// Unique places discovered by search
    pub discovered: usize,

    /// Rows with every artifact merged
    pub merged_full: usize,

    /// Rows degraded by a failed detail fetch
    pub merged_partial: usize,

    /// Records dropped for lacking a place id
    pub dropped: usize,

    /// Places skipped because the run was cancelled
    pub skipped: usize,

    pub menus_found: usize,
    pub menus_blocked: usize,

    /// Transparent retry counts, not surfaced as errors
    pub detail_retries: u32,
    pub crawl_retries: u32,
}

/// Final output of a run: ordered canonical rows plus accounting.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub rows: Vec<CanonicalRow>,
    pub stats: RunStats,
}

#[derive(Debug, Default)]
struct PlaceReport {
    partial: bool,
    skipped: bool,
    detail_retries: u32,
    crawl_retries: u32,
}

/// Run the full acquisition pipeline.
///
/// `cancel` is polled between places: once set, no new place is started,
/// in-flight workers finish, and whatever merged is returned for flushing.
pub async fn run_pipeline(
    config: Arc<Config>,
    directory: &dyn PlaceDirectory,
    cancel: Arc<AtomicBool>,
) -> Result<PipelineOutcome> {
    // Fatal config errors abort before any network activity
    config.validate()?;

    let start_time = Utc::now();
    let retry_limit = config.crawler.retry_limit.max(1);

    log::info!("Searching directory: {}", config.places.query);
    let (candidates, search_retries) = with_retry(retry_limit, "directory search", || {
        directory.search(&config.places.query)
    })
    .await;
    let candidates = candidates?;

    let table = MergeTable::new();
    let unique = dedupe_candidates(candidates, &table);
    let total = unique.len();
    log::info!("{total} unique places to enrich");

    let client = create_async_client(&config.crawler)?;
    let policies = Arc::new(PolicyStore::new(
        client.clone(),
        config.crawler.page_timeout(),
    ));
    let gate = Arc::new(HostGate::new(config.crawler.host_delay()));
    let discovery = MenuDiscovery::new(Arc::clone(&config), client, policies, gate);

    let reports: Vec<PlaceReport> = stream::iter(unique.into_iter().enumerate())
        .map(|(index, candidate)| {
            let discovery = &discovery;
            let table = &table;
            let cancel = &cancel;
            async move {
                if cancel.load(Ordering::Relaxed) {
                    return PlaceReport {
                        skipped: true,
                        ..PlaceReport::default()
                    };
                }
                log::info!("[{}/{}] Enriching: {}", index + 1, total, candidate.name);
                process_place(candidate, directory, discovery, table, retry_limit).await
            }
        })
        .buffer_unordered(config.crawler.max_concurrent.max(1))
        .collect()
        .await;

    let mut stats = RunStats {
        start_time,
        end_time: Utc::now(),
        discovered: total,
        merged_full: 0,
        merged_partial: 0,
        dropped: table.dropped(),
        skipped: 0,
        menus_found: 0,
        menus_blocked: 0,
        detail_retries: search_retries,
        crawl_retries: 0,
    };
    for report in &reports {
        if report.skipped {
            stats.skipped += 1;
        } else if report.partial {
            stats.merged_partial += 1;
        } else {
            stats.merged_full += 1;
        }
        stats.detail_retries += report.detail_retries;
        stats.crawl_retries += report.crawl_retries;
    }

    let rows = table.into_rows();
    for row in &rows {
        match row.flags.menu {
            MenuFlag::Found => stats.menus_found += 1,
            MenuFlag::Blocked => stats.menus_blocked += 1,
            _ => {}
        }
    }
    stats.end_time = Utc::now();

    log::info!(
        "Run complete: {} rows ({} full, {} partial, {} dropped, {} skipped), {} menus found",
        rows.len(),
        stats.merged_full,
        stats.merged_partial,
        stats.dropped,
        stats.skipped,
        stats.menus_found,
    );

    Ok(PipelineOutcome { rows, stats })
}

/// Collapse paginated duplicates, keeping the first-seen candidate.
/// Candidates without a place id go straight through the table's drop
/// accounting.
fn dedupe_candidates(candidates: Vec<PlaceCandidate>, table: &MergeTable) -> Vec<PlaceCandidate> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for candidate in candidates {
        if candidate.place_id.trim().is_empty() {
            if let Err(e) = table.upsert(merge(&candidate, None, &CrawlResult::NotFound)) {
                log::error!("{e}");
            }
            continue;
        }
        if seen.insert(candidate.place_id.clone()) {
            unique.push(candidate);
        }
    }
    unique
}

/// Take one place through detail fetch, menu crawl, and merge.
async fn process_place(
    candidate: PlaceCandidate,
    directory: &dyn PlaceDirectory,
    discovery: &MenuDiscovery,
    table: &MergeTable,
    retry_limit: u32,
) -> PlaceReport {
    let mut report = PlaceReport::default();

    let (detail, detail_retries) = with_retry(retry_limit, "detail fetch", || {
        directory.details(&candidate.place_id)
    })
    .await;
    report.detail_retries = detail_retries;
    let detail: Option<DetailRecord> = match detail {
        Ok(d) => Some(d),
        Err(e) => {
            log::warn!(
                "Detail fetch failed for {} ({}): {e}",
                candidate.name,
                candidate.place_id
            );
            report.partial = true;
            None
        }
    };

    let website = detail.as_ref().and_then(|d| d.website.as_deref());
    let mut crawl = discovery.discover(website).await;
    while crawl.is_transient_failure() && report.crawl_retries + 1 < retry_limit {
        report.crawl_retries += 1;
        tokio::time::sleep(backoff(report.crawl_retries)).await;
        crawl = discovery.discover(website).await;
    }
    if let Some(menu_url) = crawl.menu_url() {
        log::info!("   Menu detected: {menu_url}");
    }

    let row = merge(&candidate, detail.as_ref(), &crawl);
    if let Err(e) = table.upsert(row) {
        log::error!("{e}");
    }
    report
}

/// Retry a transient-failing operation up to `limit` attempts with
/// exponential backoff, honoring any retry-after hint.
async fn with_retry<T, F, Fut>(limit: u32, what: &str, mut op: F) -> (Result<T>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return (Ok(value), attempt),
            Err(e) if e.is_transient() && attempt + 1 < limit => {
                let wait = e.retry_after().unwrap_or_else(|| backoff(attempt + 1));
                log::debug!(
                    "{what} attempt {} failed: {e}; retrying in {wait:?}",
                    attempt + 1
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * 2u64.saturating_pow(attempt.saturating_sub(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::AppError;
    use crate::models::{Coordinates, FieldSource};

    struct MockDirectory {
        pages: Vec<PlaceCandidate>,
        details: HashMap<String, DetailRecord>,
        /// place id -> failures to serve before succeeding
        rate_limit: Mutex<HashMap<String, u32>>,
        search_calls: Mutex<u32>,
    }

    impl MockDirectory {
        fn new(pages: Vec<PlaceCandidate>) -> Self {
            Self {
                pages,
                details: HashMap::new(),
                rate_limit: Mutex::new(HashMap::new()),
                search_calls: Mutex::new(0),
            }
        }

        fn with_detail(mut self, detail: DetailRecord) -> Self {
            self.details.insert(detail.place_id.clone(), detail);
            self
        }

        fn rate_limited(self, place_id: &str, failures: u32) -> Self {
            self.rate_limit
                .lock()
                .unwrap()
                .insert(place_id.to_string(), failures);
            self
        }
    }

    #[async_trait]
    impl PlaceDirectory for MockDirectory {
        async fn search(&self, _query: &str) -> crate::error::Result<Vec<PlaceCandidate>> {
            *self.search_calls.lock().unwrap() += 1;
            Ok(self.pages.clone())
        }

        async fn details(&self, place_id: &str) -> crate::error::Result<DetailRecord> {
            let mut limits = self.rate_limit.lock().unwrap();
            if let Some(remaining) = limits.get_mut(place_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AppError::RateLimited {
                        retry_after: Some(Duration::from_millis(10)),
                    });
                }
            }
            drop(limits);
            self.details
                .get(place_id)
                .cloned()
                .ok_or_else(|| AppError::NotFound(place_id.to_string()))
        }
    }

    fn candidate(place_id: &str, name: &str, rank: usize) -> PlaceCandidate {
        PlaceCandidate {
            place_id: place_id.to_string(),
            name: name.to_string(),
            coordinates: Some(Coordinates {
                latitude: 51.5136,
                longitude: -0.1331,
            }),
            search_rank: rank,
        }
    }

    fn detail(place_id: &str) -> DetailRecord {
        DetailRecord {
            place_id: place_id.to_string(),
            address: "26-29 Dean St, London W1D 3LL, UK".to_string(),
            postcode: "W1D 3LL".to_string(),
            website: None, // keeps tests off the network
            cuisine_guess: Some("French".to_string()),
            phone: String::new(),
            coordinates: None,
        }
    }

    fn test_config() -> Arc<Config> {
        let mut config = Config::default();
        config.crawler.max_concurrent = 2;
        config.crawler.retry_limit = 3;
        Arc::new(config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_across_pages_yields_one_row() {
        let directory = MockDirectory::new(vec![
            candidate("p1", "Quo Vadis", 0),
            candidate("p1", "Quo Vadis", 12),
        ])
        .with_detail(detail("p1"));

        let outcome = run_pipeline(test_config(), &directory, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.stats.discovered, 1);
        assert_eq!(outcome.rows[0].place_id, "p1");
        assert_eq!(outcome.rows[0].postcode, "W1D 3LL");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_detail_retried_to_success() {
        // Two throttled responses, success on the third attempt
        let directory = MockDirectory::new(vec![candidate("p2", "Busy Corner", 0)])
            .with_detail(detail("p2"))
            .rate_limited("p2", 2);

        let outcome = run_pipeline(test_config(), &directory, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].postcode, "W1D 3LL");
        assert_eq!(outcome.stats.merged_full, 1);
        assert_eq!(outcome.stats.merged_partial, 0);
        assert!(outcome.stats.detail_retries >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_degrade_to_partial() {
        let directory = MockDirectory::new(vec![candidate("p2", "Busy Corner", 0)])
            .with_detail(detail("p2"))
            .rate_limited("p2", 10);

        let outcome = run_pipeline(test_config(), &directory, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        // The place still appears, with detail-derived fields absent
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.rows[0].postcode, "");
        assert_eq!(outcome.rows[0].flags.cuisine, FieldSource::Default);
        assert_eq!(outcome.stats.merged_partial, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_without_place_id_dropped() {
        let directory = MockDirectory::new(vec![
            candidate("", "Phantom", 0),
            candidate("p1", "Quo Vadis", 1),
        ])
        .with_detail(detail("p1"));

        let outcome = run_pipeline(test_config(), &directory, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.stats.dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_flushes_nothing_new() {
        let directory = MockDirectory::new(vec![
            candidate("p1", "Quo Vadis", 0),
            candidate("p2", "Busy Corner", 1),
        ]);

        let outcome = run_pipeline(test_config(), &directory, Arc::new(AtomicBool::new(true)))
            .await
            .unwrap();

        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.stats.skipped, 2);
    }

    #[tokio::test]
    async fn test_invalid_config_aborts_before_network() {
        let mut config = Config::default();
        config.places.query = String::new();
        let directory = MockDirectory::new(vec![candidate("p1", "Quo Vadis", 0)]);

        let result = run_pipeline(
            Arc::new(config),
            &directory,
            Arc::new(AtomicBool::new(false)),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(*directory.search_calls.lock().unwrap(), 0);
    }

    #[test]
    fn test_backoff_grows() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_millis(1000));
        assert_eq!(backoff(3), Duration::from_millis(2000));
    }
}
