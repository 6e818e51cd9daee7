use anyhow::{Context, Result};
use glob::{glob, Pattern};
use std::{
    fs::{self, File},
    io::{self, BufWriter},
    path::{Path, PathBuf},
};
use tracing::{error, info};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Member name of `path` inside an archive: relative to `base`, `/`-separated.
fn archive_name(base: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(base)
        .with_context(|| format!("{} is not under {}", path.display(), base.display()))?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Zip every file beneath `dir` into `zip_path`; names are relative to `base`.
fn zip_dir(base: &Path, dir: &Path, zip_path: &Path) -> Result<usize> {
    let pattern = format!("{}/**/*", Pattern::escape(&dir.to_string_lossy()));
    let mut files: Vec<PathBuf> = glob(&pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let out = File::create(zip_path)
        .with_context(|| format!("creating archive {}", zip_path.display()))?;
    let mut writer = ZipWriter::new(BufWriter::new(out));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &files {
        writer
            .start_file(archive_name(base, path)?, options)
            .with_context(|| format!("adding {} to {}", path.display(), zip_path.display()))?;
        let mut f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        io::copy(&mut f, &mut writer)
            .with_context(|| format!("compressing {}", path.display()))?;
    }
    writer
        .finish()
        .with_context(|| format!("finalizing {}", zip_path.display()))?;
    Ok(files.len())
}

/// One `{output_dir}/{name}.zip` per directory directly under `base_dir`. A directory
/// that fails to archive is logged and skipped. Returns the archives written.
#[tracing::instrument(level = "info", skip_all, fields(base = %base_dir.display()))]
pub fn zip_by_year(base_dir: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating archive directory {}", output_dir.display()))?;

    let mut dirs: Vec<PathBuf> = fs::read_dir(base_dir)
        .with_context(|| format!("reading directory {}", base_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    let mut written = Vec::new();
    for dir in dirs {
        let Some(name) = dir.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let zip_path = output_dir.join(format!("{}.zip", name));
        match zip_dir(base_dir, &dir, &zip_path) {
            Ok(n) => {
                info!(archive = %zip_path.display(), files = n, "archived {}", name);
                written.push(zip_path);
            }
            Err(e) => error!(dir = %dir.display(), "failed to archive: {:#}", e),
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    #[test]
    fn one_archive_per_year() -> Result<()> {
        init_test_logging();
        let data = tempdir()?;
        let out = tempdir()?;
        fs::create_dir_all(data.path().join("2021"))?;
        fs::create_dir_all(data.path().join("2022"))?;
        fs::write(data.path().join("2021/2021-01.csv"), "a,b\n1,2\n")?;
        fs::write(data.path().join("2021/2021-02.csv"), "a,b\n3,4\n")?;
        fs::write(data.path().join("2022/2022-07.csv"), "a,b\n5,6\n")?;
        fs::write(data.path().join("ecobici_download_report.csv"), "url\n")?;

        let written = zip_by_year(data.path(), out.path())?;
        assert_eq!(
            written,
            vec![out.path().join("2021.zip"), out.path().join("2022.zip")]
        );

        let mut archive = ZipArchive::new(File::open(out.path().join("2021.zip"))?)?;
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["2021/2021-01.csv", "2021/2021-02.csv"]);

        let mut body = String::new();
        archive.by_name("2021/2021-02.csv")?.read_to_string(&mut body)?;
        assert_eq!(body, "a,b\n3,4\n");
        Ok(())
    }

    #[test]
    fn missing_base_is_an_error() {
        let out = tempdir().unwrap();
        assert!(zip_by_year(&out.path().join("nope"), out.path()).is_err());
    }
}
