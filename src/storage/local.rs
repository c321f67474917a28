// src/storage/local.rs

//! Local filesystem storage for the output table.
//!
//! Writes the CSV table and `run.json` atomically (write to temp, then
//! rename) so an interrupted run never leaves truncated output behind.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::models::CanonicalRow;
use crate::pipeline::RunStats;
use crate::storage::{TableStorage, WriteSummary};

/// Core schema columns, in contract order, followed by diagnostics.
const COLUMNS: &[&str] = &[
    "google_place_id",
    "name",
    "postcode",
    "cuisine",
    "menu_url",
    "latitude",
    "longitude",
    "address",
    "website",
    "menu_status",
    "sources",
];

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    table_name: String,
}

impl LocalStorage {
    pub fn new(root_dir: impl Into<PathBuf>, table_name: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            table_name: table_name.into(),
        }
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, path: &PathBuf, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Encode rows as UTF-8 CSV. Absent values become empty fields, never
    /// placeholder strings.
    fn encode_csv(rows: &[CanonicalRow]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(COLUMNS)?;

        for row in rows {
            let (latitude, longitude) = match row.coordinates {
                Some(c) => (c.latitude.to_string(), c.longitude.to_string()),
                None => (String::new(), String::new()),
            };
            writer.write_record([
                row.place_id.as_str(),
                row.name.as_str(),
                row.postcode.as_str(),
                row.cuisine.as_str(),
                row.menu_url.as_deref().unwrap_or(""),
                latitude.as_str(),
                longitude.as_str(),
                row.address.as_str(),
                row.website.as_deref().unwrap_or(""),
                row.flags.menu.as_str(),
                row.flags.summary().as_str(),
            ])?;
        }

        writer
            .into_inner()
            .map_err(|e| crate::error::AppError::validation(e.to_string()))
    }
}

#[async_trait]
impl TableStorage for LocalStorage {
    async fn write_table(&self, rows: &[CanonicalRow], stats: &RunStats) -> Result<WriteSummary> {
        let table_path = self.root_dir.join(&self.table_name);
        let stats_path = self.root_dir.join("run.json");

        let csv_bytes = Self::encode_csv(rows)?;
        self.write_bytes(&table_path, &csv_bytes).await?;

        let stats_bytes = serde_json::to_vec_pretty(stats)?;
        self.write_bytes(&stats_path, &stats_bytes).await?;

        Ok(WriteSummary {
            row_count: rows.len(),
            table_path: table_path.display().to_string(),
            stats_path: stats_path.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;

    use crate::models::{FieldSource, MenuFlag, SourceFlags};

    fn row(place_id: &str, name: &str, menu_url: Option<&str>) -> CanonicalRow {
        CanonicalRow {
            place_id: place_id.to_string(),
            name: name.to_string(),
            postcode: "W1D 3LL".to_string(),
            cuisine: "French".to_string(),
            menu_url: menu_url.map(str::to_string),
            coordinates: None,
            address: "26-29 Dean St, London".to_string(),
            website: None,
            flags: SourceFlags {
                name: FieldSource::Directory,
                postcode: FieldSource::Detail,
                cuisine: FieldSource::Detail,
                menu: if menu_url.is_some() {
                    MenuFlag::Found
                } else {
                    MenuFlag::NotFound
                },
            },
        }
    }

    fn stats() -> RunStats {
        RunStats {
            start_time: Utc::now(),
            end_time: Utc::now(),
            discovered: 2,
            merged_full: 2,
            merged_partial: 0,
            dropped: 0,
            skipped: 0,
            menus_found: 1,
            menus_blocked: 0,
            detail_retries: 0,
            crawl_retries: 0,
        }
    }

    #[test]
    fn test_csv_schema_and_empty_menu_field() {
        let rows = vec![
            row("p1", "Quo Vadis", Some("https://site/menu")),
            row("p2", "No Menu Diner", None),
        ];
        let bytes = LocalStorage::encode_csv(&rows).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();

        assert_eq!(
            lines.next().unwrap(),
            "google_place_id,name,postcode,cuisine,menu_url,latitude,longitude,\
             address,website,menu_status,sources"
        );
        let first = lines.next().unwrap();
        assert!(first.starts_with("p1,Quo Vadis,W1D 3LL,French,https://site/menu,"));
        // Absent menu_url is an empty field, not a placeholder
        let second = lines.next().unwrap();
        assert!(second.starts_with("p2,No Menu Diner,W1D 3LL,French,,"));
    }

    #[tokio::test]
    async fn test_write_table_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "restaurants.csv");

        let summary = storage
            .write_table(&[row("p1", "Quo Vadis", None)], &stats())
            .await
            .unwrap();

        assert_eq!(summary.row_count, 1);
        let csv = std::fs::read_to_string(dir.path().join("restaurants.csv")).unwrap();
        assert_eq!(csv.lines().count(), 2);
        let run: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("run.json")).unwrap())
                .unwrap();
        assert_eq!(run["discovered"], 2);

        // No temp leftovers
        assert!(!dir.path().join("restaurants.tmp").exists());
    }
}
