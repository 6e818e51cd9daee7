use anyhow::Result;
use arrow::{
    array::ArrayRef,
    datatypes::{Field, Schema},
    record_batch::{RecordBatch, RecordBatchOptions},
};
use std::{collections::HashSet, sync::Arc};

/// Spelling variants seen across export years, mapped to canonical names.
/// Keys are already standardized (trimmed, `_` for spaces, lower-case).
pub static COLUMN_MAPPING: &[(&str, &str)] = &[
    ("genero", "gender"),
    ("género_usuario", "gender"),
    ("edad", "age"),
    ("id_bici", "bike_id"),
    ("bici_id", "bike_id"),
    ("ciclo_estacionretiro", "start_station_id"),
    ("ciclo_estación_retiro", "start_station_id"),
    ("ciclo_estacionarribo", "end_station_id"),
    ("ciclo_estación_arribo", "end_station_id"),
    ("fecha_de_retiro", "start_date"),
    ("fecha_de_arribo", "end_date"),
    ("hora_de_retiro", "start_time"),
    ("hora_de_arribo", "end_time"),
];

/// `" Fecha Retiro "` → `"fecha_retiro"`.
pub fn standardize_name(raw: &str) -> String {
    raw.trim().replace(' ', "_").to_lowercase()
}

fn canonical_name(standardized: String) -> String {
    COLUMN_MAPPING
        .iter()
        .find(|(from, _)| *from == standardized)
        .map(|(_, to)| to.to_string())
        .unwrap_or(standardized)
}

/// Index-column artifacts of the source export (`Unnamed: 0`, ...).
pub fn is_unnamed(name: &str) -> bool {
    name.to_lowercase().starts_with("unnamed")
}

/// Build a batch from selected columns, keeping the row count even when no column survives.
pub(crate) fn batch_from_parts(
    fields: Vec<Field>,
    columns: Vec<ArrayRef>,
    num_rows: usize,
) -> Result<RecordBatch> {
    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::new(Schema::new(fields)),
        columns,
        &options,
    )?)
}

/// Standardize names, apply the rename table, then drop `unnamed*` columns and
/// repeated names (first occurrence wins).
pub fn standardize_batch(batch: &RecordBatch) -> Result<RecordBatch> {
    let schema = batch.schema();
    let mut seen: HashSet<String> = HashSet::new();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns = Vec::with_capacity(schema.fields().len());

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let name = canonical_name(standardize_name(field.name()));
        if is_unnamed(&name) || !seen.insert(name.clone()) {
            continue;
        }
        fields.push(Field::new(name, field.data_type().clone(), field.is_nullable()));
        columns.push(column.clone());
    }

    batch_from_parts(fields, columns, batch.num_rows())
}
