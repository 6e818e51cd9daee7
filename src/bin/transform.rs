use anyhow::Result;
use ecobici::{
    config::Config,
    logging,
    manifest::{CsvSink, RowSink},
    process::{canonical_rows, list_csv_files, write_parquet, ParallelReader, Transformer},
};
use std::time::Instant;
use tracing::{error, info, warn};

fn run(cfg: &Config) -> Result<()> {
    let start = Instant::now();
    let source = cfg.source_dir();

    let files = list_csv_files(&source)?;
    if files.is_empty() {
        warn!(folder = %source.display(), "no CSV files to process");
        return Ok(());
    }

    let raw = ParallelReader::from_config(cfg).read_files(&files)?;
    let trips = Transformer::new().transform(&raw)?;

    let is_csv = cfg
        .output
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("csv"));
    let rows = if is_csv {
        CsvSink::new(&cfg.output).write_rows(&canonical_rows(&trips)?)?
    } else {
        write_parquet(&trips, &cfg.output)?
    };

    info!(
        files = files.len(),
        rows,
        output = %cfg.output.display(),
        "transform completed in {:.2?}",
        start.elapsed()
    );
    Ok(())
}

fn main() {
    logging::init("info");

    let result = Config::from_env().and_then(|cfg| run(&cfg));
    if let Err(e) = result {
        error!("fatal error: {:?}", e);
        std::process::exit(1);
    }
}
