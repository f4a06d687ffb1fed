//! Typed coercion of raw CSV fields
//!
//! One function per declared column type; the set is closed. Coercion never
//! looks at other fields of the row.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::schema::{ColumnDef, ColumnType};

use super::value::Value;

/// Offset-aware form with a compact or partial offset (`+00`, `-0500`)
const OFFSET_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%#z";

/// Naive forms, interpreted as UTC
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Decodes one field against its column definition.
///
/// `dataset_format` is the dataset-wide timestamp format; a format declared
/// on the column takes precedence. Returns the rejection reason on failure.
pub fn decode_field(
    def: &ColumnDef,
    raw: &str,
    dataset_format: Option<&str>,
) -> Result<Value, String> {
    if is_null(def.column_type, raw) {
        return if def.required {
            Err("required value is empty".to_string())
        } else {
            Ok(Value::Null)
        };
    }

    match def.column_type {
        ColumnType::String => Ok(Value::String(raw.to_string())),
        ColumnType::Int => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| "not an integer".to_string()),
        ColumnType::Boolean => parse_boolean(raw)
            .map(Value::Boolean)
            .ok_or_else(|| "not a boolean".to_string()),
        ColumnType::Category => decode_category(def, raw),
        ColumnType::Timestamp => {
            let format = def.format.as_deref().or(dataset_format);
            parse_timestamp(raw, format)
                .map(Value::Timestamp)
                .ok_or_else(|| match format {
                    Some(f) => format!("not a timestamp in format '{}'", f),
                    None => "not a recognized timestamp".to_string(),
                })
        }
    }
}

fn is_null(column_type: ColumnType, raw: &str) -> bool {
    match column_type {
        ColumnType::String => raw.is_empty(),
        _ => raw.trim().is_empty(),
    }
}

fn decode_category(def: &ColumnDef, raw: &str) -> Result<Value, String> {
    let value = raw.trim();
    match &def.values {
        Some(allowed) if !allowed.iter().any(|v| v == value) => Err(format!(
            "not one of the declared values ({})",
            allowed.join(", ")
        )),
        _ => Ok(Value::Category(value.to_string())),
    }
}

/// Parses a boolean token: true/false, t/f, yes/no, y/n, 1/0 (any case).
pub fn parse_boolean(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// Parses a timestamp, either with an explicit chrono format or by trying
/// the default forms in order.
pub fn parse_timestamp(raw: &str, format: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    match format {
        Some(format) => parse_with_format(raw, format),
        None => parse_default(raw),
    }
}

fn parse_with_format(raw: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_str(raw, format) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(raw, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_default(raw: &str) -> Option<DateTime<Utc>> {
    if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
        let millis = raw.parse::<i64>().ok()?;
        return Utc.timestamp_millis_opt(millis).single();
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_str(raw, OFFSET_FORMAT) {
        return Some(t.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
