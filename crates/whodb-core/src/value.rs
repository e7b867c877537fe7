use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::CanonicalType;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-]?)(\d*)(?:\.(\d*))?$").expect("valid decimal regex"));

/// Canonical cell value exchanged between plugins, the generator and the importer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Exact decimal kept in its textual form.
    Decimal(String),
    Text(String),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

/// A raw text cell that does not fit the column's canonical type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid input for type {expected}: \"{raw}\" ({reason})")]
pub struct ValueError {
    pub expected: String,
    pub raw: String,
    pub reason: String,
}

impl ValueError {
    fn new(expected: &CanonicalType, raw: &str, reason: impl Into<String>) -> Self {
        Self {
            expected: type_label(expected),
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::UInt(value) => i64::try_from(*value).ok(),
            Value::Decimal(text) | Value::Text(text) => text.parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::UInt(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            Value::Decimal(text) => text.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) | Value::Decimal(text) => Some(text),
            _ => None,
        }
    }

    /// Text codec. `Null` has no textual form.
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            Value::Null => return None,
            Value::Bool(value) => value.to_string(),
            Value::Int(value) => value.to_string(),
            Value::UInt(value) => value.to_string(),
            Value::Float(value) => value.to_string(),
            Value::Decimal(text) | Value::Text(text) => text.clone(),
            Value::Uuid(value) => value.to_string(),
            Value::Date(value) => value.format(DATE_FORMAT).to_string(),
            Value::Time(value) => value.format(TIME_FORMAT).to_string(),
            Value::Timestamp(value) => value.format(TIMESTAMP_FORMAT).to_string(),
            Value::Json(value) => value.to_string(),
            Value::Bytes(bytes) => {
                let mut out = String::with_capacity(2 + bytes.len() * 2);
                out.push_str("\\x");
                for byte in bytes {
                    out.push_str(&format!("{byte:02x}"));
                }
                out
            }
        };
        Some(text)
    }

    /// Parse a text cell according to the column's canonical type.
    pub fn parse_text(ty: &CanonicalType, raw: &str) -> Result<Value, ValueError> {
        match ty {
            CanonicalType::Integer { .. } => parse_integer(ty, raw.trim()),
            CanonicalType::Decimal { precision, scale } => {
                parse_decimal(ty, raw.trim(), *precision, *scale)
            }
            CanonicalType::Float => raw
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|err| ValueError::new(ty, raw, err.to_string())),
            CanonicalType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "yes" | "y" | "on" => Ok(Value::Bool(true)),
                "false" | "f" | "0" | "no" | "n" | "off" => Ok(Value::Bool(false)),
                _ => Err(ValueError::new(ty, raw, "expected a boolean")),
            },
            CanonicalType::Text { max_len } => {
                if let Some(max_len) = max_len
                    && raw.chars().count() > *max_len as usize
                {
                    return Err(ValueError::new(
                        ty,
                        raw,
                        format!("value too long for length {max_len}"),
                    ));
                }
                Ok(Value::Text(raw.to_string()))
            }
            CanonicalType::Uuid => Uuid::parse_str(raw.trim())
                .map(Value::Uuid)
                .map_err(|err| ValueError::new(ty, raw, err.to_string())),
            CanonicalType::Date => NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
                .map(Value::Date)
                .map_err(|err| ValueError::new(ty, raw, err.to_string())),
            CanonicalType::Time => NaiveTime::parse_from_str(raw.trim(), TIME_FORMAT)
                .map(Value::Time)
                .map_err(|err| ValueError::new(ty, raw, err.to_string())),
            CanonicalType::Timestamp => parse_timestamp(raw.trim())
                .map(Value::Timestamp)
                .ok_or_else(|| ValueError::new(ty, raw, "unrecognised timestamp format")),
            CanonicalType::Json => serde_json::from_str(raw)
                .map(Value::Json)
                .map_err(|err| ValueError::new(ty, raw, err.to_string())),
            CanonicalType::Binary => parse_bytes(raw).ok_or_else(|| {
                ValueError::new(ty, raw, "invalid hexadecimal escape")
            }),
            CanonicalType::Array { .. } | CanonicalType::Other { .. } => {
                Ok(Value::Text(raw.to_string()))
            }
        }
    }

    /// Document codec: canonical value to JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(value) => serde_json::Value::Bool(*value),
            Value::Int(value) => serde_json::Value::from(*value),
            Value::UInt(value) => serde_json::Value::from(*value),
            Value::Float(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Json(value) => value.clone(),
            other => serde_json::Value::String(other.to_text().unwrap_or_default()),
        }
    }

    /// Document codec: JSON to canonical value without a declared type.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(*value),
            serde_json::Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    Value::Int(value)
                } else if let Some(value) = number.as_u64() {
                    Value::UInt(value)
                } else {
                    Value::Float(number.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(text) => Value::Text(text.clone()),
            other => Value::Json(other.clone()),
        }
    }

    /// Stable identity string used for uniqueness sets and FK sampling.
    pub fn key(&self) -> String {
        match self {
            Value::Null => "\u{0}null".to_string(),
            Value::Float(value) if value.fract() == 0.0 && value.is_finite() => {
                format!("{}", *value as i64)
            }
            other => other.to_text().unwrap_or_default(),
        }
    }

    /// Ordering used by in-process evaluation of comparison operators.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Uuid(a), Value::Uuid(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => Some(a.key().cmp(&b.key())),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

fn parse_integer(ty: &CanonicalType, raw: &str) -> Result<Value, ValueError> {
    let (min, max) = ty.integer_bounds().unwrap_or((i64::MIN as i128, i64::MAX as i128));
    let parsed = raw
        .parse::<i128>()
        .map_err(|err| ValueError::new(ty, raw, err.to_string()))?;
    if parsed < min || parsed > max {
        return Err(ValueError::new(ty, raw, "value out of range"));
    }
    match i64::try_from(parsed) {
        Ok(value) => Ok(Value::Int(value)),
        Err(_) => u64::try_from(parsed)
            .map(Value::UInt)
            .map_err(|err| ValueError::new(ty, raw, err.to_string())),
    }
}

fn parse_decimal(
    ty: &CanonicalType,
    raw: &str,
    precision: Option<u32>,
    scale: Option<u32>,
) -> Result<Value, ValueError> {
    let Some(caps) = DECIMAL_RE.captures(raw) else {
        return Err(ValueError::new(ty, raw, "expected a decimal number"));
    };
    let int_part = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let frac_part = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(ValueError::new(ty, raw, "expected a decimal number"));
    }

    let max_scale = match (precision, scale) {
        (Some(_), scale) => Some(scale.unwrap_or(0)),
        (None, scale) => scale,
    };
    if let Some(max_scale) = max_scale
        && frac_part.trim_end_matches('0').len() as u32 > max_scale
    {
        return Err(ValueError::new(
            ty,
            raw,
            format!("more than {max_scale} fraction digits"),
        ));
    }

    if let Some(precision) = precision {
        let scale = scale.unwrap_or(0);
        let int_digits = int_part.trim_start_matches('0').len() as u32;
        if int_digits > precision.saturating_sub(scale) {
            return Err(ValueError::new(
                ty,
                raw,
                format!("numeric field overflow for precision {precision}, scale {scale}"),
            ));
        }
    }
    Ok(Value::Decimal(raw.to_string()))
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
        return Some(value.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
        if let Ok(value) = DateTime::parse_from_str(raw, format) {
            return Some(value.naive_utc());
        }
    }
    for format in [TIMESTAMP_FORMAT, "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(value);
        }
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn parse_bytes(raw: &str) -> Option<Value> {
    let Some(hex) = raw.strip_prefix("\\x") else {
        return Some(Value::Bytes(raw.as_bytes().to_vec()));
    };
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for idx in (0..hex.len()).step_by(2) {
        let byte = u8::from_str_radix(hex.get(idx..idx + 2)?, 16).ok()?;
        bytes.push(byte);
    }
    Some(Value::Bytes(bytes))
}

fn type_label(ty: &CanonicalType) -> String {
    match ty {
        CanonicalType::Integer { .. } => "integer".to_string(),
        CanonicalType::Decimal { .. } => "numeric".to_string(),
        CanonicalType::Float => "double precision".to_string(),
        CanonicalType::Boolean => "boolean".to_string(),
        CanonicalType::Text { .. } => "text".to_string(),
        CanonicalType::Uuid => "uuid".to_string(),
        CanonicalType::Date => "date".to_string(),
        CanonicalType::Time => "time".to_string(),
        CanonicalType::Timestamp => "timestamp".to_string(),
        CanonicalType::Json => "json".to_string(),
        CanonicalType::Binary => "bytea".to_string(),
        CanonicalType::Array { element } => format!("{}[]", type_label(element)),
        CanonicalType::Other { name } => name.clone(),
    }
}
