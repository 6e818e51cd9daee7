// src/fetch/period.rs

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, warn};
use url::Url;

/// Reserved period for files whose name carries no recognisable date.
/// Keeps the `YYYY-MM` shape so year/month slicing never fails.
pub const UNKNOWN_PERIOD: &str = "0000-00";
pub const UNKNOWN_YEAR: &str = "0000";

/// Month table: one entry per month, English and Spanish three-letter prefixes.
static MONTHS: [(&[&str], &str); 12] = [
    (&["jan", "ene"], "01"),
    (&["feb"], "02"),
    (&["mar"], "03"),
    (&["apr", "abr"], "04"),
    (&["may"], "05"),
    (&["jun"], "06"),
    (&["jul"], "07"),
    (&["aug", "ago"], "08"),
    (&["sep", "set"], "09"),
    (&["oct"], "10"),
    (&["nov"], "11"),
    (&["dec", "dic"], "12"),
];

/// Map a month name to `01`..`12` by its first three letters; unknown names give `00`.
pub fn month_number(name: &str) -> &'static str {
    let prefix: String = name.chars().take(3).flat_map(char::to_lowercase).collect();
    MONTHS
        .iter()
        .find(|(prefixes, _)| prefixes.contains(&prefix.as_str()))
        .map(|(_, num)| *num)
        .unwrap_or("00")
}

/// One entry of the ordered fallback chain.
pub struct PeriodPattern {
    pub name: &'static str,
    pub regex: Regex,
    extract: fn(&Captures) -> String,
}

impl PeriodPattern {
    fn new(name: &'static str, re: &str, extract: fn(&Captures) -> String) -> Self {
        Self {
            name,
            regex: Regex::new(re).expect("period pattern should compile"),
            extract,
        }
    }

    /// Apply this pattern alone; `None` when it does not match.
    pub fn apply(&self, stem: &str) -> Option<String> {
        self.regex.captures(stem).map(|caps| (self.extract)(&caps))
    }
}

fn numeric_month(caps: &Captures) -> String {
    format!("{}-{:0>2}", &caps[1], &caps[2])
}

fn named_month(caps: &Captures) -> String {
    format!("{}-{}", &caps[1], month_number(&caps[2]))
}

/// Most specific (anchored) first; the first match wins.
pub static PERIOD_PATTERNS: Lazy<Vec<PeriodPattern>> = Lazy::new(|| {
    vec![
        PeriodPattern::new(
            "year-month-trailing",
            r"([0-9]{4})[_-]([0-9]{1,2})$",
            numeric_month,
        ),
        PeriodPattern::new(
            "year-monthname-trailing",
            r"(?i)([0-9]{4})[_-]([a-záéíóú]+)$",
            named_month,
        ),
        PeriodPattern::new(
            "year-month-suffix",
            r"([0-9]{4})[-_]([0-9]{2})[-_](\w+)$",
            numeric_month,
        ),
        PeriodPattern::new("yyyymm-trailing", r"([0-9]{4})([0-9]{2})$", numeric_month),
        PeriodPattern::new(
            "year-month-anywhere",
            r"([0-9]{4})[_-]([0-9]{2})",
            numeric_month,
        ),
        PeriodPattern::new(
            "year-monthname-anywhere",
            r"(?i)([0-9]{4})[_-]([a-záéíóú]+)",
            named_month,
        ),
    ]
});

/// Lower-cased file stem of a URL (or plain filename): last path segment, extension removed.
pub fn filename_stem(url_or_name: &str) -> String {
    let segment = match Url::parse(url_or_name) {
        Ok(url) => url
            .path_segments()
            .and_then(|mut segs| segs.next_back().map(str::to_string))
            .unwrap_or_default(),
        Err(_) => url_or_name
            .rsplit(&['/', '\\'][..])
            .next()
            .unwrap_or(url_or_name)
            .to_string(),
    };
    let stem = match segment.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem,
        _ => segment.as_str(),
    };
    stem.to_lowercase()
}

/// Extracts a canonical `YYYY-MM` period from filenames.
pub struct DateNormalizer {
    span: tracing::Span,
}

impl Default for DateNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DateNormalizer {
    pub fn new() -> Self {
        Self {
            span: tracing::info_span!("date_normalizer"),
        }
    }

    /// `Some("YYYY-MM")`, or `None` when no pattern matches the file stem.
    pub fn extract(&self, url_or_name: &str) -> Option<String> {
        let _enter = self.span.enter();
        let stem = filename_stem(url_or_name);
        for pattern in PERIOD_PATTERNS.iter() {
            if let Some(period) = pattern.apply(&stem) {
                debug!(file = %stem, pattern = pattern.name, %period, "matched");
                return Some(period);
            }
        }
        warn!(file = %stem, "could not extract date from filename");
        None
    }

    /// Same as [`extract`](Self::extract), substituting [`UNKNOWN_PERIOD`] on a miss.
    pub fn normalize(&self, url_or_name: &str) -> String {
        self.extract(url_or_name)
            .unwrap_or_else(|| UNKNOWN_PERIOD.to_string())
    }
}
