use anyhow::{Context, Result};
use futures::{stream, StreamExt};
use reqwest::Client;
use std::{
    collections::{BTreeSet, HashSet},
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;
use tracing::{debug, error, info, warn, Instrument};
use url::Url;

use crate::config::Config;
use crate::fetch::{links, period::DateNormalizer};
use crate::manifest::FileRecord;

pub const USER_AGENT: &str = "EcobiciDataDownloader/1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No date could be read from the filename.
    UnknownPeriod,
    /// An earlier record already owns this period's target file.
    DuplicatePeriod,
}

/// Result of one attempt to make a record's file present locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Fetched { bytes: u64 },
    AlreadyPresent,
    Skipped(SkipReason),
    Failed(String),
}

impl DownloadOutcome {
    /// The target file exists after this outcome.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Fetched { .. } | Self::AlreadyPresent)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Per-outcome counts for a finished batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadSummary {
    pub fetched: usize,
    pub already_present: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DownloadSummary {
    pub fn from_results(results: &[(FileRecord, DownloadOutcome)]) -> Self {
        let mut s = Self::default();
        for (_, outcome) in results {
            match outcome {
                DownloadOutcome::Fetched { .. } => s.fetched += 1,
                DownloadOutcome::AlreadyPresent => s.already_present += 1,
                DownloadOutcome::Skipped(_) => s.skipped += 1,
                DownloadOutcome::Failed(_) => s.failed += 1,
            }
        }
        s
    }
}

/// Owns the HTTP session for one run and places files under `{root}/{year}/{YYYY-MM}.csv`.
pub struct DownloadManager {
    client: Client,
    root: PathBuf,
    workers: usize,
    max_retries: u32,
    retry_delay: Duration,
    span: tracing::Span,
}

impl DownloadManager {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(cfg.timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            root: cfg.root_folder.clone(),
            workers: cfg.download_workers.max(1),
            max_retries: cfg.max_retries,
            retry_delay: cfg.retry_delay,
            span: tracing::info_span!("downloader", root = %cfg.root_folder.display()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// CSV links on the listing page, fetched with this manager's session.
    pub async fn list_csv_links(&self, listing: &Url) -> Vec<Url> {
        links::list_csv_links(&self.client, listing)
            .instrument(self.span.clone())
            .await
    }

    /// Turn discovered URLs into records sorted by period and pre-create the year folders.
    pub fn plan<I, S>(&self, urls: I, normalizer: &DateNormalizer) -> Vec<FileRecord>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let _enter = self.span.enter();
        let mut records: Vec<FileRecord> = urls
            .into_iter()
            .map(|u| FileRecord::from_url(u, normalizer))
            .collect();
        records.sort_by(|a, b| a.normalized_period.cmp(&b.normalized_period));

        let years: BTreeSet<&str> = records
            .iter()
            .filter(|r| !r.is_unknown())
            .map(|r| r.year.as_str())
            .collect();
        for year in years {
            let dir = self.root.join(year);
            match std::fs::create_dir_all(&dir) {
                Ok(()) => debug!(dir = %dir.display(), "ensured folder exists"),
                Err(e) => error!(dir = %dir.display(), error = %e, "creating year folder failed"),
            }
        }

        records
    }

    /// Single attempt for one record. Never returns an error: failures become `Failed`.
    pub async fn download(&self, record: &FileRecord) -> DownloadOutcome {
        self.download_inner(record)
            .instrument(self.span.clone())
            .await
    }

    async fn download_inner(&self, record: &FileRecord) -> DownloadOutcome {
        if record.is_unknown() {
            warn!(url = %record.url, year = %record.year, "skipping invalid year");
            return DownloadOutcome::Skipped(SkipReason::UnknownPeriod);
        }

        let path = record.target_path(&self.root);
        match fs::try_exists(&path).await {
            Ok(true) => {
                debug!(path = %path.display(), "file already exists");
                return DownloadOutcome::AlreadyPresent;
            }
            Ok(false) => {}
            Err(e) => {
                error!(path = %path.display(), error = %e, "checking target failed");
                return DownloadOutcome::Failed(e.to_string());
            }
        }

        match self.fetch_to(&record.url, &path).await {
            Ok(bytes) => {
                info!(path = %path.display(), bytes, "downloaded");
                DownloadOutcome::Fetched { bytes }
            }
            Err(e) => {
                error!(url = %record.url, path = %path.display(), "download failed: {:#}", e);
                DownloadOutcome::Failed(format!("{:#}", e))
            }
        }
    }

    /// GET `url` and write the body to `path` through a `.part` file and a rename.
    async fn fetch_to(&self, url: &str, path: &Path) -> Result<u64> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?
            .error_for_status()
            .with_context(|| format!("non-success status from {}", url))?
            .bytes()
            .await
            .with_context(|| format!("reading body from {}", url))?;

        let tmp = path.with_extension("csv.part");
        let placed = match fs::write(&tmp, &bytes).await {
            Ok(()) => fs::rename(&tmp, path)
                .await
                .with_context(|| format!("moving into {}", path.display())),
            Err(e) => Err(e).with_context(|| format!("writing {}", tmp.display())),
        };
        if placed.is_err() {
            let _ = fs::remove_file(&tmp).await;
        }
        placed?;

        Ok(bytes.len() as u64)
    }

    /// One pass over the batch. Later records whose period repeats an earlier one are
    /// skipped; results keep input order.
    pub async fn download_batch(
        &self,
        records: Vec<FileRecord>,
    ) -> Vec<(FileRecord, DownloadOutcome)> {
        let mut seen: HashSet<String> = HashSet::new();
        let jobs: Vec<(FileRecord, bool)> = records
            .into_iter()
            .map(|r| {
                let duplicate = !r.is_unknown() && !seen.insert(r.normalized_period.clone());
                (r, duplicate)
            })
            .collect();

        stream::iter(jobs)
            .map(|(record, duplicate)| async move {
                let outcome = if duplicate {
                    warn!(
                        parent: &self.span,
                        url = %record.url,
                        period = %record.normalized_period,
                        "duplicate period, keeping the first source"
                    );
                    DownloadOutcome::Skipped(SkipReason::DuplicatePeriod)
                } else {
                    self.download(&record).await
                };
                let record = record.with_downloaded(outcome.is_present());
                (record, outcome)
            })
            .buffered(self.workers)
            .collect()
            .await
    }

    /// `download_batch`, then up to `max_retries` further passes over the failures.
    /// Safe to repeat because present files are never fetched again.
    pub async fn download_all(&self, records: Vec<FileRecord>) -> Vec<(FileRecord, DownloadOutcome)> {
        let mut results = self.download_batch(records).await;

        for attempt in 1..=self.max_retries {
            let failed: Vec<usize> = results
                .iter()
                .enumerate()
                .filter(|(_, (_, outcome))| outcome.is_failed())
                .map(|(i, _)| i)
                .collect();
            if failed.is_empty() {
                break;
            }
            warn!(
                parent: &self.span,
                attempt,
                failed = failed.len(),
                delay = ?self.retry_delay,
                "retrying failed downloads"
            );
            tokio::time::sleep(self.retry_delay).await;

            let retry: Vec<FileRecord> = failed.iter().map(|&i| results[i].0.clone()).collect();
            let outcomes: Vec<DownloadOutcome> = stream::iter(retry)
                .map(|record| async move { self.download(&record).await })
                .buffered(self.workers)
                .collect()
                .await;

            for (i, outcome) in failed.into_iter().zip(outcomes) {
                let record = results[i].0.clone().with_downloaded(outcome.is_present());
                results[i] = (record, outcome);
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{hits, serve};
    use crate::logging::init_test_logging;
    use tempfile::tempdir;

    fn manager(root: &Path, max_retries: u32) -> Result<DownloadManager> {
        let cfg = Config {
            root_folder: root.to_path_buf(),
            timeout: Duration::from_secs(5),
            max_retries,
            retry_delay: Duration::from_millis(10),
            ..Config::default()
        };
        DownloadManager::new(&cfg)
    }

    #[tokio::test]
    async fn unknown_period_is_skipped_without_network() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let (base, counter) = serve("200 OK", b"a,b\n1,2\n".to_vec()).await?;
        let dm = manager(dir.path(), 0)?;

        let record = FileRecord::from_url(
            base.join("unparseable_name.csv")?.to_string(),
            &DateNormalizer::new(),
        );
        assert_eq!(record.normalized_period, "0000-00");

        let outcome = dm.download(&record).await;
        assert_eq!(outcome, DownloadOutcome::Skipped(SkipReason::UnknownPeriod));
        assert_eq!(hits(&counter), 0);
        assert!(!dir.path().join("0000").exists());
        Ok(())
    }

    #[tokio::test]
    async fn fetch_then_rerun_is_idempotent() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let body = b"Genero_Usuario,Edad_Usuario\nM,30\n".to_vec();
        let (base, counter) = serve("200 OK", body.clone()).await?;
        let dm = manager(dir.path(), 0)?;
        let record = FileRecord::new(base.join("2023_05.csv")?.to_string(), "2023-05");

        let first = dm.download(&record).await;
        assert_eq!(first, DownloadOutcome::Fetched { bytes: body.len() as u64 });
        let target = dir.path().join("2023").join("2023-05.csv");
        assert_eq!(std::fs::read(&target)?, body);
        assert!(!dir.path().join("2023").join("2023-05.csv.part").exists());

        let second = dm.download(&record).await;
        assert_eq!(second, DownloadOutcome::AlreadyPresent);
        assert!(second.is_present());
        assert_eq!(hits(&counter), 1);
        Ok(())
    }

    #[tokio::test]
    async fn http_error_leaves_record_not_downloaded() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let (base, _) = serve("404 Not Found", b"missing".to_vec()).await?;
        let dm = manager(dir.path(), 0)?;
        let records = vec![FileRecord::new(base.join("2023_06.csv")?.to_string(), "2023-06")];

        let results = dm.download_all(records).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_failed());
        assert!(!results[0].0.downloaded);
        assert!(!dir.path().join("2023").join("2023-06.csv").exists());
        Ok(())
    }

    #[tokio::test]
    async fn failures_are_retried_and_isolated() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let (bad, bad_hits) = serve("503 Service Unavailable", Vec::new()).await?;
        let (good, _) = serve("200 OK", b"x\n1\n".to_vec()).await?;
        let dm = manager(dir.path(), 2)?;

        let results = dm
            .download_all(vec![
                FileRecord::new(bad.join("2020_01.csv")?.to_string(), "2020-01"),
                FileRecord::new(good.join("2020_02.csv")?.to_string(), "2020-02"),
            ])
            .await;

        assert!(results[0].1.is_failed());
        assert!(results[1].0.downloaded);
        // one initial attempt plus two retries
        assert_eq!(hits(&bad_hits), 3);
        Ok(())
    }

    #[tokio::test]
    async fn filesystem_failure_is_isolated() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        // a plain file where the year folder should be
        std::fs::write(dir.path().join("2023"), "not a directory")?;
        let (base, counter) = serve("200 OK", b"x\n1\n".to_vec()).await?;
        let dm = manager(dir.path(), 0)?;

        let results = dm
            .download_batch(vec![
                FileRecord::new(base.join("2023_05.csv")?.to_string(), "2023-05"),
                FileRecord::new(base.join("2024_01.csv")?.to_string(), "2024-01"),
            ])
            .await;

        assert!(results[0].1.is_failed());
        assert!(!results[0].0.downloaded);
        assert_eq!(results[1].1, DownloadOutcome::Fetched { bytes: 4 });
        assert!(results[1].0.downloaded);
        assert!(dir.path().join("2024").join("2024-01.csv").is_file());
        assert_eq!(hits(&counter), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_write_leaves_no_partial_file() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let part = dir.path().join("2022").join("2022-08.csv.part");
        // a directory at the scratch path makes the write fail
        std::fs::create_dir_all(&part)?;
        let (base, _) = serve("200 OK", b"x\n1\n".to_vec()).await?;
        let dm = manager(dir.path(), 0)?;

        let record = FileRecord::new(base.join("2022_08.csv")?.to_string(), "2022-08");
        assert!(dm.download(&record).await.is_failed());
        assert!(!record.target_path(dir.path()).exists());
        assert!(!part.is_file());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_periods_keep_the_first() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let (base, counter) = serve("200 OK", b"x\n1\n".to_vec()).await?;
        let dm = manager(dir.path(), 0)?;

        let results = dm
            .download_batch(vec![
                FileRecord::new(base.join("2021_03.csv")?.to_string(), "2021-03"),
                FileRecord::new(base.join("2021_marzo.csv")?.to_string(), "2021-03"),
            ])
            .await;

        assert!(results[0].0.downloaded);
        assert_eq!(
            results[1].1,
            DownloadOutcome::Skipped(SkipReason::DuplicatePeriod)
        );
        assert!(!results[1].0.downloaded);
        assert_eq!(hits(&counter), 1);

        let summary = DownloadSummary::from_results(&results);
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.skipped, 1);
        Ok(())
    }

    #[tokio::test]
    async fn plan_sorts_and_creates_year_folders() -> Result<()> {
        let dir = tempdir()?;
        let dm = manager(dir.path(), 0)?;
        let records = dm.plan(
            vec![
                "https://x.org/2024_03.csv",
                "https://x.org/sin_fecha.csv",
                "https://x.org/202209.csv",
            ],
            &DateNormalizer::new(),
        );

        let periods: Vec<&str> = records.iter().map(|r| r.normalized_period.as_str()).collect();
        assert_eq!(periods, vec!["0000-00", "2022-09", "2024-03"]);
        assert!(dir.path().join("2022").is_dir());
        assert!(dir.path().join("2024").is_dir());
        assert!(!dir.path().join("0000").exists());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_workers_preserve_order() -> Result<()> {
        let dir = tempdir()?;
        let (base, _) = serve("200 OK", b"x\n".to_vec()).await?;
        let cfg = Config {
            root_folder: dir.path().to_path_buf(),
            download_workers: 4,
            max_retries: 0,
            ..Config::default()
        };
        let dm = DownloadManager::new(&cfg)?;
        let records: Vec<FileRecord> = (1..=6)
            .map(|m| {
                let name = format!("2019_{:02}.csv", m);
                FileRecord::new(base.join(&name).unwrap().to_string(), format!("2019-{:02}", m))
            })
            .collect();

        let results = dm.download_all(records.clone()).await;
        let urls: Vec<&str> = results.iter().map(|(r, _)| r.url.as_str()).collect();
        let expected: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, expected);
        assert!(results.iter().all(|(r, _)| r.downloaded));
        Ok(())
    }
}
