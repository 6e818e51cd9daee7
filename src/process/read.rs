use anyhow::{bail, Context, Result};
use arrow::{
    array::{new_null_array, ArrayRef},
    compute::concat_batches,
    csv::ReaderBuilder,
    datatypes::{DataType, Field, FieldRef, Schema},
    record_batch::RecordBatch,
};
use rayon::prelude::*;
use std::{
    collections::HashSet,
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tracing::{debug, error, info};

use crate::config::{Config, DEFAULT_CHUNK_ROWS, DEFAULT_MAX_WORKERS};
use crate::process::columns::standardize_batch;

/// Reads year-partitioned CSV exports on a bounded pool, one file per task.
pub struct ParallelReader {
    max_workers: usize,
    chunk_rows: usize,
    span: tracing::Span,
}

impl Default for ParallelReader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WORKERS, DEFAULT_CHUNK_ROWS)
    }
}

impl ParallelReader {
    pub fn new(max_workers: usize, chunk_rows: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            chunk_rows: chunk_rows.max(1),
            span: tracing::info_span!("reader", max_workers, chunk_rows),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.max_workers, cfg.chunk_rows)
    }

    /// Header names of `path`; blank names become `Unnamed: <index>`.
    fn read_headers(path: &Path) -> Result<Vec<String>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;
        let headers: Vec<String> = rdr
            .headers()
            .with_context(|| format!("reading header of {}", path.display()))?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if h.trim().is_empty() {
                    format!("Unnamed: {}", i)
                } else {
                    h.to_string()
                }
            })
            .collect();
        if headers.is_empty() {
            bail!("{} has no header row", path.display());
        }
        Ok(headers)
    }

    /// Read one CSV in `chunk_rows` pages, standardizing each page's columns.
    /// Short rows are padded with nulls; rows with extra fields fail the file.
    pub fn read_file(&self, path: &Path) -> Result<RecordBatch> {
        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("csv"));
        if !is_csv {
            bail!("unsupported format: {}", path.display());
        }

        let fields: Vec<Field> = Self::read_headers(path)?
            .into_iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let reader = ReaderBuilder::new(schema.clone())
            .with_header(true)
            .with_batch_size(self.chunk_rows)
            .with_truncated_rows(true)
            .build(file)
            .with_context(|| format!("creating CSV reader for {}", path.display()))?;

        let mut chunks = Vec::new();
        for (idx, batch) in reader.enumerate() {
            let batch =
                batch.with_context(|| format!("decoding chunk {} of {}", idx, path.display()))?;
            chunks.push(standardize_batch(&batch)?);
        }

        match chunks.first() {
            None => standardize_batch(&RecordBatch::new_empty(schema)),
            Some(first) => {
                let out_schema = first.schema();
                Ok(concat_batches(&out_schema, &chunks)?)
            }
        }
    }

    /// `read_file`, with failures logged and turned into `None`.
    pub fn safe_read_file(&self, path: &Path) -> Option<RecordBatch> {
        let _enter = self.span.enter();
        match self.read_file(path) {
            Ok(batch) => {
                debug!(file = %path.display(), rows = batch.num_rows(), "read");
                Some(batch)
            }
            Err(e) => {
                error!(file = %path.display(), "error reading file: {:#}", e);
                None
            }
        }
    }

    /// Read every file on a pool of `max_workers` threads and concatenate the non-empty
    /// results in input order. Unreadable files are logged and left out.
    pub fn read_files(&self, paths: &[PathBuf]) -> Result<RecordBatch> {
        let start = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .build()
            .context("building reader pool")?;

        let results: Vec<Option<RecordBatch>> =
            pool.install(|| paths.par_iter().map(|p| self.safe_read_file(p)).collect());

        let batches: Vec<RecordBatch> = results
            .into_iter()
            .flatten()
            .filter(|b| b.num_rows() > 0 && b.num_columns() > 0)
            .collect();

        let out = concat_aligned(&batches)?;
        info!(
            parent: &self.span,
            files = paths.len(),
            read = batches.len(),
            rows = out.num_rows(),
            elapsed = ?start.elapsed(),
            "read files"
        );
        Ok(out)
    }
}

/// Concatenate batches whose column sets differ: columns are the union of names in
/// first-seen order, and a batch lacking a column contributes nulls.
pub fn concat_aligned(batches: &[RecordBatch]) -> Result<RecordBatch> {
    if batches.is_empty() {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    }

    let mut names: HashSet<String> = HashSet::new();
    let mut fields: Vec<FieldRef> = Vec::new();
    for batch in batches {
        for field in batch.schema().fields() {
            if names.insert(field.name().clone()) {
                fields.push(Arc::new(Field::new(
                    field.name(),
                    field.data_type().clone(),
                    true,
                )));
            }
        }
    }
    let schema = Arc::new(Schema::new(fields));

    let aligned = batches
        .iter()
        .map(|batch| {
            let columns: Vec<ArrayRef> = schema
                .fields()
                .iter()
                .map(|f| match batch.column_by_name(f.name()) {
                    Some(col) => col.clone(),
                    None => new_null_array(f.data_type(), batch.num_rows()),
                })
                .collect();
            RecordBatch::try_new(schema.clone(), columns)
                .context("aligning batch to the union schema")
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(concat_batches(&schema, &aligned)?)
}
