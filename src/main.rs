use anyhow::{Context, Result};
use ecobici::{
    config::Config,
    fetch::{DateNormalizer, DownloadManager, DownloadSummary},
    logging,
    manifest::{self, FileRecord, JsonLinesSink, RowSink, ARCHIVE_FILE},
};
use std::fs;
use tokio::time::Instant;
use tracing::{error, info, warn};

async fn run(cfg: Config) -> Result<()> {
    let start = Instant::now();

    // ─── 1) output root ──────────────────────────────────────────────
    fs::create_dir_all(&cfg.root_folder)
        .with_context(|| format!("creating root folder {}", cfg.root_folder.display()))?;

    // ─── 2) discover CSV links ───────────────────────────────────────
    let manager = DownloadManager::new(&cfg)?;
    let links = manager.list_csv_links(&cfg.base_url).await;
    if links.is_empty() {
        warn!(listing = %cfg.base_url, "no CSV links found");
        return Ok(());
    }
    info!("found {} CSV links", links.len());

    // ─── 3) normalize periods & plan ─────────────────────────────────
    let normalizer = DateNormalizer::new();
    let records = manager.plan(links.iter().map(|u| u.as_str()), &normalizer);

    // ─── 4) download ─────────────────────────────────────────────────
    let results = manager.download_all(records).await;
    let summary = DownloadSummary::from_results(&results);
    let records: Vec<FileRecord> = results.into_iter().map(|(record, _)| record).collect();

    // ─── 5) manifest ─────────────────────────────────────────────────
    manifest::write_report(&records, manager.root())?;
    let archive = manager.root().join(ARCHIVE_FILE);
    if let Err(e) = JsonLinesSink::new(&archive).write_rows(&records) {
        error!(path = %archive.display(), "archiving report failed: {:#}", e);
    }

    info!(
        fetched = summary.fetched,
        already_present = summary.already_present,
        skipped = summary.skipped,
        failed = summary.failed,
        "process completed in {:.2?}",
        start.elapsed()
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    logging::init("info");
    info!("startup");

    let result = match Config::from_env() {
        Ok(cfg) => run(cfg).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        error!("fatal error: {:?}", e);
        std::process::exit(1);
    }
}
