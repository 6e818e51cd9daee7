// src/fetch/mod.rs
//! Download side: listing-page links, filename periods, and the idempotent downloader.

pub mod download;
pub mod links;
pub mod period;

#[cfg(test)]
pub(crate) mod testing;

pub use download::{DownloadManager, DownloadOutcome, DownloadSummary, SkipReason};
pub use period::{DateNormalizer, UNKNOWN_PERIOD};
