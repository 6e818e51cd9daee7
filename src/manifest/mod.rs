// src/manifest/mod.rs

pub mod sink;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::fetch::period::{DateNormalizer, UNKNOWN_YEAR};
pub use sink::{CsvSink, JsonLinesSink, RowSink};

pub const REPORT_FILE: &str = "ecobici_download_report.csv";
pub const ARCHIVE_FILE: &str = "ecobici_download_report.jsonl";

/// One remote CSV export and whether it is present locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub url: String,
    #[serde(rename = "normalized_date")]
    pub normalized_period: String,
    pub year: String,
    pub month: String,
    pub downloaded: bool,
}

impl FileRecord {
    /// `period` must have the `YYYY-MM` shape; year and month are sliced from it.
    pub fn new(url: impl Into<String>, period: impl Into<String>) -> Self {
        let normalized_period = period.into();
        let year = normalized_period.get(0..4).unwrap_or(UNKNOWN_YEAR).to_string();
        let month = normalized_period.get(5..7).unwrap_or("00").to_string();
        Self {
            url: url.into(),
            normalized_period,
            year,
            month,
            downloaded: false,
        }
    }

    /// Build a record for `url`, falling back to the reserved unknown period.
    pub fn from_url(url: impl Into<String>, normalizer: &DateNormalizer) -> Self {
        let url = url.into();
        let period = normalizer.normalize(&url);
        Self::new(url, period)
    }

    pub fn is_unknown(&self) -> bool {
        self.year == UNKNOWN_YEAR
    }

    pub fn with_downloaded(mut self, downloaded: bool) -> Self {
        self.downloaded = downloaded;
        self
    }

    /// `{root}/{year}/{YYYY-MM}.csv`
    pub fn target_path(&self, root: &Path) -> PathBuf {
        root.join(&self.year)
            .join(format!("{}.csv", self.normalized_period))
    }
}

/// Write the CSV report under `root` and return its path.
pub fn write_report(records: &[FileRecord], root: &Path) -> Result<PathBuf> {
    let path = root.join(REPORT_FILE);
    let written = CsvSink::new(&path).write_rows(records)?;
    let downloaded = records.iter().filter(|r| r.downloaded).count();
    info!(path = %path.display(), rows = written, downloaded, "wrote download report");
    Ok(path)
}
