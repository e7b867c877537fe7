use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use fake::Fake;
use fake::faker::lorem::en::Word;
use rand::{Rng, RngCore};
use rand_chacha::ChaCha8Rng;

use whodb_core::{CanonicalType, Value};

/// Generated dates span ten years starting January 1st, 2015.
const BASE_YEAR: i32 = 2015;
const DATE_SPAN_DAYS: i64 = 3650;
const INT_CEILING: i128 = 100_000;
const MAX_ARRAY_LEN: usize = 5;

/// Short label used in usage counters, e.g. `type:integer`.
pub fn type_label(ty: &CanonicalType) -> &'static str {
    match ty {
        CanonicalType::Integer { .. } => "type:integer",
        CanonicalType::Decimal { .. } => "type:decimal",
        CanonicalType::Float => "type:float",
        CanonicalType::Boolean => "type:boolean",
        CanonicalType::Text { .. } => "type:text",
        CanonicalType::Uuid => "type:uuid",
        CanonicalType::Date => "type:date",
        CanonicalType::Time => "type:time",
        CanonicalType::Timestamp => "type:timestamp",
        CanonicalType::Json => "type:json",
        CanonicalType::Binary => "type:binary",
        CanonicalType::Array { .. } => "type:array",
        CanonicalType::Other { .. } => "type:other",
    }
}

/// Value of the given canonical type; `column` seeds textual values.
pub fn value_for_type(ty: &CanonicalType, column: &str, rng: &mut ChaCha8Rng) -> Value {
    match ty {
        CanonicalType::Integer { .. } => {
            let (low, high) = ty.integer_bounds().unwrap_or((1, INT_CEILING));
            let low = low.max(1);
            let high = high.min(INT_CEILING).max(low);
            Value::Int(rng.random_range(low..=high) as i64)
        }
        CanonicalType::Decimal { precision, scale } => decimal(*precision, *scale, rng),
        CanonicalType::Float => {
            let value: f64 = rng.random_range(0.0..=100_000.0);
            Value::Float((value * 100.0).round() / 100.0)
        }
        CanonicalType::Boolean => Value::Bool(rng.random_bool(0.5)),
        CanonicalType::Uuid => Value::Uuid(random_uuid(rng)),
        CanonicalType::Date => Value::Date(random_date(rng)),
        CanonicalType::Time => Value::Time(random_time(rng)),
        CanonicalType::Timestamp => {
            Value::Timestamp(NaiveDateTime::new(random_date(rng), random_time(rng)))
        }
        CanonicalType::Json => {
            let mut object = serde_json::Map::new();
            let key: String = Word().fake_with_rng(rng);
            let word: String = Word().fake_with_rng(rng);
            object.insert(key, serde_json::Value::String(word));
            object.insert("value".to_string(), rng.random_range(1..=100_i64).into());
            Value::Json(serde_json::Value::Object(object))
        }
        CanonicalType::Binary => {
            let mut bytes = vec![0_u8; 16];
            rng.fill_bytes(&mut bytes);
            Value::Bytes(bytes)
        }
        CanonicalType::Array { element } => {
            let len = rng.random_range(1..=MAX_ARRAY_LEN);
            let items: Vec<String> = (0..len)
                .map(|_| array_item(element, column, rng))
                .collect();
            Value::Text(format!("{{{}}}", items.join(",")))
        }
        CanonicalType::Text { max_len } => {
            Value::Text(truncate(format!("{}_{}", column, rng.random::<u32>()), *max_len))
        }
        CanonicalType::Other { .. } => Value::Text(format!("{}_{}", column, rng.random::<u32>())),
    }
}

/// Cut `value` to at most `max_len` characters.
pub fn truncate(value: String, max_len: Option<u32>) -> String {
    match max_len {
        Some(max_len) if value.chars().count() > max_len as usize => {
            value.chars().take(max_len as usize).collect()
        }
        _ => value,
    }
}

fn decimal(precision: Option<u32>, scale: Option<u32>, rng: &mut ChaCha8Rng) -> Value {
    let (int_digits, scale) = match precision {
        Some(precision) => {
            let scale = scale.unwrap_or(0).min(precision);
            (precision - scale, scale)
        }
        None => (5, scale.unwrap_or(2)),
    };
    let scale = scale.min(18);
    let int_max = if int_digits == 0 {
        0
    } else {
        10_u64
            .checked_pow(int_digits)
            .map(|bound| bound - 1)
            .unwrap_or(u64::MAX)
            .min(INT_CEILING as u64)
    };
    let int_part = rng.random_range(0..=int_max);
    if scale == 0 {
        return Value::Decimal(int_part.to_string());
    }
    let frac = rng.random_range(0..10_u64.pow(scale));
    let width = scale as usize;
    Value::Decimal(format!("{int_part}.{frac:0width$}"))
}

fn array_item(element: &CanonicalType, column: &str, rng: &mut ChaCha8Rng) -> String {
    let value = value_for_type(element, column, rng);
    let text = value.to_text().unwrap_or_default();
    if element.is_numeric() || matches!(element, CanonicalType::Boolean) {
        text
    } else {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

fn random_date(rng: &mut ChaCha8Rng) -> NaiveDate {
    let base = NaiveDate::from_ymd_opt(BASE_YEAR, 1, 1).unwrap_or_default();
    base + Duration::days(rng.random_range(0..=DATE_SPAN_DAYS))
}

fn random_time(rng: &mut ChaCha8Rng) -> NaiveTime {
    let seconds = rng.random_range(0..=86_399);
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default()
}

pub fn random_uuid(rng: &mut ChaCha8Rng) -> uuid::Uuid {
    let mut bytes = [0_u8; 16];
    rng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes)
}
