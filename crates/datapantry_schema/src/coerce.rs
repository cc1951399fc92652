//! Value coercion between logical datatypes.
//!
//! Every function here is total: a bulk migration can never stop halfway
//! because one cell failed to convert. Values that cannot be represented in the
//! target type resolve to a fixed safe value instead.

use crate::model::DataType;
use crate::value::Value;
use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, NaiveTime};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Convert `value`, currently stored as `from`, into `to`.
pub fn coerce(value: &Value, from: DataType, to: DataType) -> Value {
    if from == to {
        return value.clone();
    }
    // A reference is never guessed from other data.
    if to == DataType::ForeignKey {
        return Value::Null;
    }
    if from == DataType::ForeignKey {
        return match to {
            DataType::String => Value::Text(String::new()),
            DataType::Number => Value::Number(0.0),
            DataType::Boolean => Value::Bool(false),
            _ => Value::Null,
        };
    }
    // String parsing has its own fallback for a missing value.
    let parses_string = from == DataType::String && matches!(to, DataType::Number | DataType::Boolean);
    if value.is_null() && !parses_string {
        return Value::Null;
    }

    match to {
        DataType::String => Value::Text(value.render()),
        DataType::Number if from.is_temporal() => Value::Number(0.0),
        DataType::Number => Value::Number(to_number(value)),
        DataType::Boolean if from.is_temporal() => Value::Bool(false),
        DataType::Boolean => Value::Bool(to_bool(value)),
        DataType::Date | DataType::Time | DataType::DateTime => to_temporal(value, from, to),
        DataType::ForeignKey => Value::Null,
    }
}

/// Value given to a freshly added column.
pub fn default_for(datatype: DataType) -> Value {
    match datatype {
        DataType::String => Value::Text(String::new()),
        DataType::Number => Value::Number(0.0),
        DataType::Boolean => Value::Bool(false),
        DataType::Date | DataType::Time | DataType::DateTime | DataType::ForeignKey => Value::Null,
    }
}

/// Synthetic value written into an empty cell of a required column.
///
/// `None` for ForeignKey: references are reported, never fabricated.
pub fn required_default(datatype: DataType) -> Option<Value> {
    match datatype {
        DataType::String => Some(Value::Text("default".to_string())),
        DataType::Number => Some(Value::Number(1.0)),
        DataType::Boolean => Some(Value::Bool(false)),
        DataType::Date => Some(Value::Text("1970-01-01".to_string())),
        DataType::Time => Some(Value::Text("00:00:00".to_string())),
        DataType::DateTime => Some(Value::Text("1970-01-01T00:00:00".to_string())),
        DataType::ForeignKey => None,
    }
}

/// The `n`th synthetic value for a required column that is also unique or
/// primary, counting from 0. `None` once the type has no values left.
///
/// Temporal types step one day or one second from the epoch.
pub fn distinct_default(datatype: DataType, n: u64) -> Option<Value> {
    match datatype {
        DataType::String => Some(Value::Text(format!("default_{}", n + 1))),
        DataType::Number => Some(Value::Number((n + 1) as f64)),
        DataType::Boolean => match n {
            0 => Some(Value::Bool(false)),
            1 => Some(Value::Bool(true)),
            _ => None,
        },
        DataType::Date => NaiveDate::from_ymd_opt(1970, 1, 1)?
            .checked_add_days(Days::new(n))
            .map(|date| Value::Text(date.format(DATE_FORMAT).to_string())),
        DataType::Time => u32::try_from(n)
            .ok()
            .and_then(|secs| NaiveTime::from_num_seconds_from_midnight_opt(secs, 0))
            .map(|time| Value::Text(time.format(TIME_FORMAT).to_string())),
        DataType::DateTime => i64::try_from(n)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| Value::Text(dt.naive_utc().format(DATETIME_FORMAT).to_string())),
        DataType::ForeignKey => None,
    }
}

fn to_number(value: &Value) -> f64 {
    let n = match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => *n,
        Value::Text(s) => s.trim().parse::<f64>().unwrap_or(0.0),
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0,
        Value::Text(s) => s.trim().to_lowercase() == "true",
    }
}

/// A parsed temporal reading of some text.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Temporal {
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

fn parse_temporal(text: &str) -> Option<Temporal> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Temporal::DateTime(dt.naive_local()));
    }
    for format in [
        DATETIME_FORMAT,
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Temporal::DateTime(dt));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
        return Some(Temporal::Date(date));
    }
    for format in [TIME_FORMAT, "%H:%M:%S%.f", "%H:%M"] {
        if let Ok(time) = NaiveTime::parse_from_str(text, format) {
            return Some(Temporal::Time(time));
        }
    }
    None
}

fn to_temporal(value: &Value, from: DataType, to: DataType) -> Value {
    // Only text carries temporal information.
    if !(from == DataType::String || from.is_temporal()) {
        return Value::Null;
    }
    let Value::Text(text) = value else {
        return Value::Null;
    };
    let Some(parsed) = parse_temporal(text) else {
        return Value::Null;
    };

    let rendered = match (parsed, to) {
        (Temporal::Date(d), DataType::Date) => d.format(DATE_FORMAT).to_string(),
        (Temporal::Date(d), DataType::DateTime) => d
            .and_time(NaiveTime::MIN)
            .format(DATETIME_FORMAT)
            .to_string(),
        (Temporal::Time(t), DataType::Time) => t.format(TIME_FORMAT).to_string(),
        (Temporal::DateTime(dt), DataType::Date) => dt.date().format(DATE_FORMAT).to_string(),
        (Temporal::DateTime(dt), DataType::Time) => dt.time().format(TIME_FORMAT).to_string(),
        (Temporal::DateTime(dt), DataType::DateTime) => dt.format(DATETIME_FORMAT).to_string(),
        _ => return Value::Null,
    };
    Value::Text(rendered)
}
