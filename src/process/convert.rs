use crate::process::{date_parser, utils};
use anyhow::{anyhow, Result};
use arrow::{
    array::{
        Array, ArrayRef, Int64Array, StringArray, StringDictionaryBuilder, TimestampSecondArray,
    },
    compute::cast,
    datatypes::{DataType, Int32Type, TimeUnit},
};
use chrono::DateTime;
use std::sync::Arc;

/// View any column as UTF-8 strings (casting when it is not already `Utf8`).
pub fn string_values(arr: &ArrayRef) -> Result<StringArray> {
    let utf8 = if arr.data_type() == &DataType::Utf8 {
        arr.clone()
    } else {
        cast(arr, &DataType::Utf8)?
    };
    utf8.as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| anyhow!("column of type {} is not castable to utf8", arr.data_type()))
}

/// Dates → `YYYY-MM-DD` strings; unparseable values become null.
pub fn to_iso_dates(arr: &ArrayRef) -> Result<ArrayRef> {
    let sarr = string_values(arr)?;
    let out: StringArray = sarr
        .iter()
        .map(|opt| {
            opt.and_then(date_parser::parse_date)
                .map(|d| d.format("%Y-%m-%d").to_string())
        })
        .collect();
    Ok(Arc::new(out) as ArrayRef)
}

/// Time of day → `HH:MM`. Timestamp columns are formatted directly; anything else has its
/// first `H:MM`/`HH:MM` pulled out.
pub fn to_hour_minute(arr: &ArrayRef) -> Result<ArrayRef> {
    let out: StringArray = match arr.data_type() {
        DataType::Timestamp(_, _) => {
            let secs = cast(arr, &DataType::Timestamp(TimeUnit::Second, None))?;
            let secs = secs
                .as_any()
                .downcast_ref::<TimestampSecondArray>()
                .ok_or_else(|| anyhow!("expected second-resolution timestamps"))?;
            secs.iter()
                .map(|opt| {
                    opt.and_then(|v| DateTime::from_timestamp(v, 0))
                        .map(|dt| dt.format("%H:%M").to_string())
                })
                .collect()
        }
        _ => string_values(arr)?
            .iter()
            .map(|opt| opt.and_then(date_parser::extract_hour_minute))
            .collect(),
    };
    Ok(Arc::new(out) as ArrayRef)
}

/// Numeric ids/ages → nullable Int64; non-numeric values become null.
pub fn to_nullable_ints(arr: &ArrayRef) -> Result<ArrayRef> {
    let sarr = string_values(arr)?;
    let out: Int64Array = sarr.iter().map(|opt| opt.and_then(utils::parse_int)).collect();
    Ok(Arc::new(out) as ArrayRef)
}

/// Dictionary-encode labels as a categorical column; labels are kept verbatim.
pub fn to_categorical(arr: &ArrayRef) -> Result<ArrayRef> {
    let sarr = string_values(arr)?;
    let mut b = StringDictionaryBuilder::<Int32Type>::new();
    for opt in sarr.iter() {
        match opt {
            Some(label) => b.append_value(label),
            None => b.append_null(),
        }
    }
    Ok(Arc::new(b.finish()) as ArrayRef)
}
