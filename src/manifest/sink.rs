use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

/// Destination for serialized rows (report file, archive, ...).
pub trait RowSink {
    /// Write every row; returns how many were written.
    fn write_rows<T: Serialize>(&mut self, rows: &[T]) -> Result<usize>;
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    Ok(())
}

/// Rewrites a CSV file with a header row derived from the row type.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RowSink for CsvSink {
    fn write_rows<T: Serialize>(&mut self, rows: &[T]) -> Result<usize> {
        ensure_parent(&self.path)?;
        let mut wtr = csv::Writer::from_path(&self.path)
            .with_context(|| format!("creating {}", self.path.display()))?;
        for row in rows {
            wtr.serialize(row)
                .with_context(|| format!("writing row to {}", self.path.display()))?;
        }
        wtr.flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        Ok(rows.len())
    }
}

/// Appends one JSON document per line, the way a document collection accumulates inserts.
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RowSink for JsonLinesSink {
    fn write_rows<T: Serialize>(&mut self, rows: &[T]) -> Result<usize> {
        ensure_parent(&self.path)?;
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening {}", self.path.display()))?;
        let mut out = BufWriter::new(file);
        for row in rows {
            serde_json::to_writer(&mut out, row).context("serializing archive row")?;
            out.write_all(b"\n")?;
        }
        out.flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        Ok(rows.len())
    }
}
