use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::process::utils::clean_str;

/// Tried in order against the date part of a value. Slash/dash day-month forms are
/// day-first on purpose: the exports use the Mexican `DD/MM/YYYY` convention, so
/// `02/05/2023` is 2 May. Do not reorder to month-first.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d/%m/%y",
    "%d-%m-%y",
];

static HOUR_MINUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}):(\d{2})").expect("hour:minute regex should compile"));

/// Tolerant date parse: `"2023-05-01"`, `"2023-05-01 00:00:00"`, `"2023-05-01T08:15:00"`,
/// `"01/05/2023"`, `"01/05/23"`, ... Anything else gives `None`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = clean_str(raw);
    let date_part = s.split(|c: char| c == ' ' || c == 'T').next()?;
    if date_part.is_empty() {
        return None;
    }
    DATE_FORMATS.iter().find_map(|fmt| {
        let d = NaiveDate::parse_from_str(date_part, fmt).ok()?;
        // `%Y` happily reads "23" as year 23
        (fmt.contains("%y") || d.year() >= 1000).then_some(d)
    })
}

/// First `H:MM` / `HH:MM` in the value, zero-padded to `HH:MM`.
pub fn extract_hour_minute(raw: &str) -> Option<String> {
    let caps = HOUR_MINUTE.captures(raw)?;
    Some(format!("{:0>2}:{}", &caps[1], &caps[2]))
}
