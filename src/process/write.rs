use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs::{self, File},
    io::BufWriter,
    path::Path,
};
use tracing::info;

/// Write `batch` to `path` as a single SNAPPY Parquet file. The file is built under a
/// `.tmp` sibling and renamed into place once closed. Returns the rows written.
pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("parquet.tmp");

    let file = File::create(&tmp_path)
        .with_context(|| format!("creating parquet file {}", tmp_path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(BufWriter::new(file), batch.schema(), Some(props))
        .context("creating ArrowWriter for trips")?;
    writer.write(batch).context("writing trip batch")?;
    writer.close().context("closing ArrowWriter for trips")?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming {} → {}", tmp_path.display(), path.display()))?;
    info!(path = %path.display(), rows = batch.num_rows(), "wrote parquet");
    Ok(batch.num_rows())
}
