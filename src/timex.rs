//! Timestamp and date helpers.

use chrono::{DateTime, NaiveDate, Utc};

/// Separated date layouts accepted by [`parse_date`]. Month and day may be
/// one or two digits.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// Current UTC time as `YYYYMMDDhhmmss` followed by six microsecond digits.
pub fn timestamp() -> String {
    format_timestamp(Utc::now())
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%S%6f").to_string()
}

/// Input [`parse_date`] could not read as a calendar date.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unable to parse date: {input}")]
pub struct DateParseError {
    pub input: String,
}

/// Parse a calendar date into UTC midnight.
///
/// Accepts the compact `yyyyMMdd` form and `y-m-d`, `y/m/d`, `y.m.d`.
pub fn parse_date(input: &str) -> Result<DateTime<Utc>, DateParseError> {
    let input = input.trim();

    let date = if input.len() == 8 && input.bytes().all(|b| b.is_ascii_digit()) {
        compact_date(input)
    } else {
        DATE_FORMATS
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(input, format).ok())
    };

    date.and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DateParseError {
            input: input.to_string(),
        })
}

fn compact_date(input: &str) -> Option<NaiveDate> {
    let year = input[0..4].parse().ok()?;
    let month = input[4..6].parse().ok()?;
    let day = input[6..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}
