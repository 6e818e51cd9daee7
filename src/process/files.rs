use anyhow::{bail, Context, Result};
use glob::{glob, Pattern};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use crate::process::utils::is_year_name;

/// Year directories (four-digit names) directly under `folder`, sorted.
pub fn list_year_dirs(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut years: Vec<PathBuf> = fs::read_dir(folder)
        .with_context(|| format!("reading directory {}", folder.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, is_year_name)
        })
        .collect();
    years.sort();
    Ok(years)
}

/// Every `{folder}/{year}/*.csv`, sorted. Fails when `folder` does not exist.
#[tracing::instrument(level = "info", skip(folder), fields(folder = %folder.display()))]
pub fn list_csv_files(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.exists() {
        bail!("the folder {} does not exist", folder.display());
    }

    let mut files = Vec::new();
    for year_dir in list_year_dirs(folder)? {
        let pattern = format!(
            "{}/*.csv",
            Pattern::escape(&year_dir.to_string_lossy())
        );
        for entry in glob(&pattern)? {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => warn!("unreadable entry under {}: {}", year_dir.display(), e),
            }
        }
        debug!(year = %year_dir.display(), total = files.len(), "scanned year");
    }

    files.sort();
    info!(count = files.len(), "found csv files");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn only_year_directories_are_scanned() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path();
        for d in ["2021", "2022", "misc", "20230"] {
            fs::create_dir_all(root.join(d))?;
        }
        fs::write(root.join("2021/2021-01.csv"), "a\n1\n")?;
        fs::write(root.join("2021/2021-02.csv"), "a\n1\n")?;
        fs::write(root.join("2021/notes.txt"), "x")?;
        fs::write(root.join("2022/2022-07.csv"), "a\n1\n")?;
        fs::write(root.join("misc/2020-01.csv"), "a\n1\n")?;
        fs::write(root.join("20230/2023-01.csv"), "a\n1\n")?;
        fs::write(root.join("top.csv"), "a\n1\n")?;

        let files = list_csv_files(root)?;
        let rel: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(rel, vec!["2021/2021-01.csv", "2021/2021-02.csv", "2022/2022-07.csv"]);
        Ok(())
    }

    #[test]
    fn missing_folder_is_an_error() {
        let dir = tempdir().unwrap();
        let err = list_csv_files(&dir.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }
}
