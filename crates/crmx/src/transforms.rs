//! 🔄 Transforms: the Rosetta Stone between the legacy export and the destination API 🎭
//!
//! 🎬 COLD OPEN, INT. BILLING OFFICE, 4:12 PM, THE DAY BEFORE CUTOVER
//!
//! Dates arrive as `2023-07-01`, as `2023-07-01T09:30:00`, as `2023-07-01T09:30:00+08:00`.
//! Prices arrive as `"1,499.00"` and sometimes as `"₱1,499"`. The destination API
//! accepts exactly one of each. This module is the translator in the booth.
//!
//! ## Knowledge Graph 🧠
//! - Shared scalar coercions live here: [`normalize_date`], [`parse_price`], [`json_number`].
//! - Payload builders live one level down, one file per pipeline. They are pure
//!   functions from a source record (plus resolved foreign keys) to a `serde_json::Value`.
//!   No I/O. The pipelines do the talking.
//!
//! 🦆

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

pub mod clients;
pub mod invoices;
pub mod pppoe;

/// Naive timestamp layouts the legacy exports have been seen to use.
const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// 📅 Coerce a legacy date into `YYYY-MM-DDTHH:MM:SS+HHMM`.
///
/// - Already has a `T` and a `+`/`Z` → passed through untouched.
/// - Has a `T` but no zone → parsed, re-rendered, `utc_offset` appended. A
///   negative offset like `-05:00` is dropped and replaced, not converted.
/// - Plain `Y-m-d` → midnight plus `utc_offset`.
/// - Anything else, or blank → `None`.
pub fn normalize_date(raw: &str, utc_offset: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.contains('T') {
        if raw.contains('+') || raw.contains('Z') {
            return Some(raw.to_string());
        }
        let naive = NAIVE_DATETIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
            .or_else(|| {
                DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%:z")
                    .ok()
                    .map(|zoned| zoned.naive_local())
            })?;
        return Some(format!("{}{}", naive.format("%Y-%m-%dT%H:%M:%S"), utc_offset));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| format!("{}T00:00:00{}", date.format("%Y-%m-%d"), utc_offset))
}

/// 💸 `"₱1,499.50"` → `1499.5`. Thousands separators and peso signs go, anything
/// else unparseable is `None`.
pub fn parse_price(raw: &str) -> Option<f64> {
    // -- "â‚±" is ₱ read as cp1252 then saved as UTF-8 again. the CSV has both.
    let cleaned = raw.replace(',', "").replace("â‚±", "").replace('₱', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|price| price.is_finite())
}

/// 🔢 Whole floats go out as integers so `1000` stays `1000` and not `1000.0`.
pub fn json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}
