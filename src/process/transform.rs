use anyhow::{anyhow, Result};
use arrow::{
    array::{Array, ArrayRef, Int64Array},
    datatypes::Field,
    record_batch::RecordBatch,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, time::Instant};
use tracing::{debug, info};

use crate::process::{columns::batch_from_parts, convert};

/// Raw export names → canonical trip schema.
pub const RENAMES: &[(&str, &str)] = &[
    ("genero_usuario", "gender"),
    ("edad_usuario", "age"),
    ("fecha_retiro", "start_date"),
    ("fecha_arribo", "end_date"),
    ("hora_retiro", "start_time"),
    ("hora_arribo", "end_time"),
    ("ciclo_estacion_retiro", "start_station_id"),
    ("ciclo_estacion_arribo", "end_station_id"),
    ("bici", "bike_id"),
];

pub const DATE_COLUMNS: &[&str] = &["start_date", "end_date"];
pub const TIME_COLUMNS: &[&str] = &["start_time", "end_time"];
pub const INT_COLUMNS: &[&str] = &["age", "bike_id", "start_station_id", "end_station_id"];
pub const CATEGORY_COLUMN: &str = "gender";

/// One trip in the canonical schema, used when rows leave Arrow (CSV output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTripRecord {
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub bike_id: Option<i64>,
    pub start_station_id: Option<i64>,
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub end_station_id: Option<i64>,
    pub end_date: Option<String>,
    pub end_time: Option<String>,
}

fn renamed(name: &str) -> Option<&'static str> {
    RENAMES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
}

fn coerce(name: &str, column: &ArrayRef) -> Result<Option<ArrayRef>> {
    let out = if DATE_COLUMNS.contains(&name) {
        convert::to_iso_dates(column)?
    } else if TIME_COLUMNS.contains(&name) {
        convert::to_hour_minute(column)?
    } else if INT_COLUMNS.contains(&name) {
        convert::to_nullable_ints(column)?
    } else if name == CATEGORY_COLUMN {
        convert::to_categorical(column)?
    } else {
        return Ok(None);
    };
    Ok(Some(out))
}

/// Renames raw trip columns and coerces them into the canonical types.
pub struct Transformer {
    span: tracing::Span,
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer {
    pub fn new() -> Self {
        Self {
            span: tracing::info_span!("transformer"),
        }
    }

    /// Values that fail coercion become null; absent columns are left absent.
    pub fn transform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let _enter = self.span.enter();
        let start = Instant::now();
        let schema = batch.schema();

        let existing: HashSet<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
        let mut fields = Vec::with_capacity(schema.fields().len());
        let mut columns = Vec::with_capacity(schema.fields().len());

        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            let name = match renamed(field.name()) {
                Some(target) if existing.contains(target) => {
                    debug!(from = %field.name(), to = target, "rename target already present");
                    field.name().as_str()
                }
                Some(target) => target,
                None => field.name().as_str(),
            };

            match coerce(name, column)? {
                Some(coerced) => {
                    fields.push(Field::new(name, coerced.data_type().clone(), true));
                    columns.push(coerced);
                }
                None => {
                    fields.push(Field::new(name, field.data_type().clone(), true));
                    columns.push(column.clone());
                }
            }
        }

        let out = batch_from_parts(fields, columns, batch.num_rows())?;
        info!(
            rows = out.num_rows(),
            columns = out.num_columns(),
            elapsed = ?start.elapsed(),
            "transformed"
        );
        Ok(out)
    }
}

fn string_column(batch: &RecordBatch, name: &str) -> Result<Option<arrow::array::StringArray>> {
    batch
        .column_by_name(name)
        .map(convert::string_values)
        .transpose()
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<Option<&'a Int64Array>> {
    batch
        .column_by_name(name)
        .map(|col| {
            col.as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| anyhow!("column {} is {}, expected Int64", name, col.data_type()))
        })
        .transpose()
}

/// Rows of a transformed batch as `CanonicalTripRecord`s.
pub fn canonical_rows(batch: &RecordBatch) -> Result<Vec<CanonicalTripRecord>> {
    let gender = string_column(batch, "gender")?;
    let start_date = string_column(batch, "start_date")?;
    let start_time = string_column(batch, "start_time")?;
    let end_date = string_column(batch, "end_date")?;
    let end_time = string_column(batch, "end_time")?;
    let age = int_column(batch, "age")?;
    let bike_id = int_column(batch, "bike_id")?;
    let start_station_id = int_column(batch, "start_station_id")?;
    let end_station_id = int_column(batch, "end_station_id")?;

    let text = |col: &Option<arrow::array::StringArray>, i: usize| {
        col.as_ref()
            .filter(|c| c.is_valid(i))
            .map(|c| c.value(i).to_string())
    };
    let int = |col: Option<&Int64Array>, i: usize| col.filter(|c| c.is_valid(i)).map(|c| c.value(i));

    Ok((0..batch.num_rows())
        .map(|i| CanonicalTripRecord {
            gender: text(&gender, i),
            age: int(age, i),
            bike_id: int(bike_id, i),
            start_station_id: int(start_station_id, i),
            start_date: text(&start_date, i),
            start_time: text(&start_time, i),
            end_station_id: int(end_station_id, i),
            end_date: text(&end_date, i),
            end_time: text(&end_time, i),
        })
        .collect())
}
