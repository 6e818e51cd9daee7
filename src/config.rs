// src/config.rs

use anyhow::{Context, Result};
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://ecobici.cdmx.gob.mx/datos-abiertos/";
pub const DEFAULT_ROOT_FOLDER: &str = "ecobici_data";
pub const DEFAULT_SUBFOLDER: &str = "ecobici/ecobici_data";
pub const DEFAULT_CHUNK_ROWS: usize = 100_000;
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Runtime settings for the download and ETL pipelines.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listing page that links every CSV export.
    pub base_url: Url,
    /// Root of the `{year}/{YYYY-MM}.csv` download layout.
    pub root_folder: PathBuf,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Concurrent downloads; 1 keeps the batch sequential.
    pub download_workers: usize,
    /// ETL input is read from `{base_path}/{subfolder}/{year}/*.csv`.
    pub base_path: PathBuf,
    pub subfolder: PathBuf,
    pub max_workers: usize,
    pub chunk_rows: usize,
    pub output: PathBuf,
    pub zip_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL should parse"),
            root_folder: PathBuf::from(DEFAULT_ROOT_FOLDER),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            download_workers: 1,
            base_path: PathBuf::from("."),
            subfolder: PathBuf::from(DEFAULT_SUBFOLDER),
            max_workers: DEFAULT_MAX_WORKERS,
            chunk_rows: DEFAULT_CHUNK_ROWS,
            output: PathBuf::from("ecobici_trips.parquet"),
            zip_dir: PathBuf::from("ecobici_zips"),
        }
    }
}

impl Config {
    /// Build a config from the process environment (after loading `.env` if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("ECOBICI_BASE_URL") {
            cfg.base_url =
                Url::parse(&v).with_context(|| format!("parsing ECOBICI_BASE_URL {}", v))?;
        }
        if let Some(v) = lookup("ECOBICI_ROOT_FOLDER") {
            cfg.root_folder = PathBuf::from(v);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "ECOBICI_TIMEOUT_SECS")? {
            cfg.timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var(&lookup, "ECOBICI_MAX_RETRIES")? {
            cfg.max_retries = n;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "ECOBICI_RETRY_DELAY_SECS")? {
            cfg.retry_delay = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "ECOBICI_DOWNLOAD_WORKERS")? {
            cfg.download_workers = n.max(1);
        }
        if let Some(v) = lookup("BASE_PATH") {
            cfg.base_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ECOBICI_SUBFOLDER") {
            cfg.subfolder = PathBuf::from(v);
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "MAX_WORKERS")? {
            cfg.max_workers = n.max(1);
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "ECOBICI_CHUNK_ROWS")? {
            cfg.chunk_rows = n.max(1);
        }
        if let Some(v) = lookup("ECOBICI_OUTPUT") {
            cfg.output = PathBuf::from(v);
        }
        if let Some(v) = lookup("ECOBICI_ZIP_DIR") {
            cfg.zip_dir = PathBuf::from(v);
        }

        Ok(cfg)
    }

    /// Directory the ETL pipeline scans for year folders.
    pub fn source_dir(&self) -> PathBuf {
        self.base_path.join(&self.subfolder)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => {
            let v = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {}: {:?}", key, raw))?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() -> Result<()> {
        let cfg = Config::from_lookup(|_| None)?;
        assert_eq!(cfg.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(cfg.root_folder, PathBuf::from("ecobici_data"));
        assert_eq!(cfg.timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.retry_delay, Duration::from_secs(2));
        assert_eq!(cfg.download_workers, 1);
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.chunk_rows, 100_000);
        Ok(())
    }

    #[test]
    fn overrides_are_applied() -> Result<()> {
        let cfg = Config::from_lookup(lookup_from(&[
            ("ECOBICI_ROOT_FOLDER", "/data/ecobici"),
            ("ECOBICI_TIMEOUT_SECS", "30"),
            ("MAX_WORKERS", "8"),
            ("BASE_PATH", "/srv"),
            ("ECOBICI_SUBFOLDER", "raw"),
        ]))?;
        assert_eq!(cfg.root_folder, PathBuf::from("/data/ecobici"));
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.max_workers, 8);
        assert_eq!(cfg.source_dir(), PathBuf::from("/srv/raw"));
        Ok(())
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[("MAX_WORKERS", "many")])).unwrap_err();
        assert!(err.to_string().contains("MAX_WORKERS"));
    }

    #[test]
    fn zero_workers_is_clamped() -> Result<()> {
        let cfg = Config::from_lookup(lookup_from(&[("MAX_WORKERS", "0")]))?;
        assert_eq!(cfg.max_workers, 1);
        Ok(())
    }
}
