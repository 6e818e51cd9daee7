//! Trip ETL: list year-partitioned CSVs, read them in parallel, normalize the
//! columns and write the result out.

pub mod columns;
pub mod convert;
pub mod date_parser;
pub mod files;
pub mod read;
pub mod transform;
pub mod utils;
pub mod write;

pub use files::list_csv_files;
pub use read::{concat_aligned, ParallelReader};
pub use transform::{canonical_rows, CanonicalTripRecord, Transformer};
pub use write::write_parquet;
