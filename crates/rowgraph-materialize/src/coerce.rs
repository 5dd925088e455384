//! Value coercion and JSON rendering.
//!
//! Row sources hand back whatever the driver produced; the declared field type
//! decides what the materialized object holds. Conversions are lossless or
//! fail: an integral field accepts a `DECIMAL` of `42.0` but rejects `42.5`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use rowgraph_core::{FieldClass, FieldDescriptor, TypeDescriptor, Value, ValueType};

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_DAY: i64 = 86_400 * MICROS_PER_SECOND;

/// Why a value was rejected. Context (type, field, alias) is added by the
/// materializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected {
    /// Declared target.
    pub expected: String,
    /// Offending value, described.
    pub found: String,
    /// Detail.
    pub message: String,
}

impl Rejected {
    fn new(expected: impl Into<String>, found: &Value, message: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
            found: describe(found),
            message: message.into(),
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Text(s) | Value::Decimal(s) => format!("{} '{s}'", value.type_name()),
        Value::Bytes(b) => format!("BLOB ({} bytes)", b.len()),
        Value::Array(items) => format!("ARRAY ({} items)", items.len()),
        Value::Json(_) | Value::Null => value.type_name().to_string(),
        other => format!("{} {}", other.type_name(), to_json(other)),
    }
}

/// Convert a row value to what `field` declares.
///
/// `target` is the descriptor of the field's named type; it is consulted for
/// enum constants.
pub fn coerce_field(
    field: &FieldDescriptor,
    target: Option<&TypeDescriptor>,
    value: Value,
) -> Result<Value, Rejected> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match (field.class, value) {
        (FieldClass::Scalar(ty), Value::Array(items)) if field.cardinality.is_many() => items
            .into_iter()
            .map(|v| {
                if v.is_null() {
                    Ok(Value::Null)
                } else {
                    coerce(ty, v)
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (FieldClass::Scalar(ty), value) => coerce(ty, value),
        (FieldClass::Enum, value) => {
            let constants = target.map(|t| t.enum_constants.as_slice()).unwrap_or_default();
            resolve_enum(constants, value)
        }
        (_, value) => Ok(value),
    }
}

/// Resolve a stored value against enum constants by name.
pub fn resolve_enum(constants: &[String], value: Value) -> Result<Value, Rejected> {
    match &value {
        Value::Text(name) if constants.iter().any(|c| c == name) => Ok(value),
        Value::Text(name) => Err(Rejected::new(
            "enum constant",
            &value,
            format!("'{name}' is not one of [{}]", constants.join(", ")),
        )),
        _ => Err(Rejected::new(
            "enum constant",
            &value,
            "enum values are stored by name",
        )),
    }
}

/// Convert a value to a scalar type.
pub fn coerce(ty: ValueType, value: Value) -> Result<Value, Rejected> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match ty {
        ValueType::Bool => to_bool(value),
        ValueType::TinyInt | ValueType::SmallInt | ValueType::Int | ValueType::BigInt => {
            to_integral(ty, value)
        }
        ValueType::Float => to_f64(ty, &value).map(|f| Value::Float(f as f32)),
        ValueType::Double => to_f64(ty, &value).map(Value::Double),
        ValueType::Decimal => match value {
            Value::Decimal(_) => Ok(value),
            Value::Text(ref s) if s.trim().parse::<f64>().is_ok() => {
                Ok(Value::Decimal(s.trim().to_string()))
            }
            Value::Float(f) => Ok(Value::Decimal(f.to_string())),
            Value::Double(f) => Ok(Value::Decimal(f.to_string())),
            ref other => match other.as_i64() {
                Some(i) => Ok(Value::Decimal(i.to_string())),
                None => Err(mismatch(ty, other)),
            },
        },
        ValueType::Text => match value {
            Value::Text(_) => Ok(value),
            Value::Decimal(s) => Ok(Value::Text(s)),
            Value::Uuid(u) => Ok(Value::Text(uuid_string(&u))),
            other => Err(mismatch(ty, &other)),
        },
        ValueType::Bytes => match value {
            Value::Bytes(_) => Ok(value),
            Value::Text(s) => Ok(Value::Bytes(s.into_bytes())),
            other => Err(mismatch(ty, &other)),
        },
        ValueType::Date => to_date(value),
        ValueType::Time => to_time(value),
        ValueType::Timestamp => to_timestamp(value).map(Value::Timestamp),
        ValueType::TimestampTz => to_timestamp(value).map(Value::TimestampTz),
        ValueType::Uuid => match value {
            Value::Uuid(_) => Ok(value),
            Value::Text(ref s) => parse_uuid(s)
                .map(Value::Uuid)
                .ok_or_else(|| Rejected::new("UUID", &value, "malformed UUID text")),
            Value::Bytes(ref b) => <[u8; 16]>::try_from(b.as_slice())
                .map(Value::Uuid)
                .map_err(|_| Rejected::new("UUID", &value, "a UUID is 16 bytes")),
            other => Err(mismatch(ty, &other)),
        },
        ValueType::Json => match value {
            Value::Json(_) => Ok(value),
            Value::Text(ref s) => serde_json::from_str(s)
                .map(Value::Json)
                .map_err(|e| Rejected::new("JSON", &value, e.to_string())),
            other => Ok(Value::Json(to_json(&other))),
        },
    }
}

fn mismatch(ty: ValueType, value: &Value) -> Rejected {
    Rejected::new(ty.sql_name(), value, "incompatible value")
}

fn to_bool(value: Value) -> Result<Value, Rejected> {
    match value {
        Value::Bool(_) => Ok(value),
        Value::Text(ref s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "1" => Ok(Value::Bool(true)),
            "false" | "f" | "no" | "0" => Ok(Value::Bool(false)),
            _ => Err(mismatch(ValueType::Bool, &value)),
        },
        ref other => match other.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(mismatch(ValueType::Bool, other)),
        },
    }
}

fn to_integral(ty: ValueType, value: Value) -> Result<Value, Rejected> {
    let wide = match &value {
        v @ (Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_)) => {
            v.as_i64().unwrap_or_default()
        }
        Value::Decimal(s) | Value::Text(s) => parse_integral(s)
            .ok_or_else(|| Rejected::new(ty.sql_name(), &value, "not a whole number"))?,
        Value::Float(_) | Value::Double(_) => {
            let f = value.as_f64().unwrap_or(f64::NAN);
            if f.fract() != 0.0 || !f.is_finite() {
                return Err(Rejected::new(ty.sql_name(), &value, "not a whole number"));
            }
            f as i64
        }
        Value::Bool(b) => i64::from(*b),
        _ => return Err(mismatch(ty, &value)),
    };
    let out_of_range = || Rejected::new(ty.sql_name(), &value, "out of range");
    Ok(match ty {
        ValueType::TinyInt => Value::TinyInt(i8::try_from(wide).map_err(|_| out_of_range())?),
        ValueType::SmallInt => Value::SmallInt(i16::try_from(wide).map_err(|_| out_of_range())?),
        ValueType::Int => Value::Int(i32::try_from(wide).map_err(|_| out_of_range())?),
        _ => Value::BigInt(wide),
    })
}

/// Parse `"42"`, `"42.000"` or `"-7"`; reject anything with a fractional part.
fn parse_integral(s: &str) -> Option<i64> {
    let s = s.trim();
    match s.split_once('.') {
        Some((whole, frac)) if frac.bytes().all(|b| b == b'0') => whole.parse().ok(),
        Some(_) => None,
        None => s.parse().ok(),
    }
}

fn to_f64(ty: ValueType, value: &Value) -> Result<f64, Rejected> {
    match value {
        Value::Text(s) => s.trim().parse().map_err(|_| mismatch(ty, value)),
        other => other.as_f64().ok_or_else(|| mismatch(ty, other)),
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn to_date(value: Value) -> Result<Value, Rejected> {
    match value {
        Value::Date(_) => Ok(value),
        Value::Timestamp(us) | Value::TimestampTz(us) => {
            Ok(Value::Date(us.div_euclid(MICROS_PER_DAY) as i32))
        }
        Value::Text(ref s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(|d| Value::Date(d.signed_duration_since(epoch()).num_days() as i32))
            .map_err(|e| Rejected::new("DATE", &value, e.to_string())),
        other => Err(mismatch(ValueType::Date, &other)),
    }
}

fn to_time(value: Value) -> Result<Value, Rejected> {
    match value {
        Value::Time(_) => Ok(value),
        Value::Timestamp(us) | Value::TimestampTz(us) => {
            Ok(Value::Time(us.rem_euclid(MICROS_PER_DAY)))
        }
        Value::Text(ref s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
            .map(|t| {
                Value::Time(
                    i64::from(t.num_seconds_from_midnight()) * MICROS_PER_SECOND
                        + i64::from(t.nanosecond() / 1_000),
                )
            })
            .map_err(|e| Rejected::new("TIME", &value, e.to_string())),
        other => Err(mismatch(ValueType::Time, &other)),
    }
}

fn to_timestamp(value: Value) -> Result<i64, Rejected> {
    match value {
        Value::Timestamp(us) | Value::TimestampTz(us) => Ok(us),
        Value::Date(days) => i64::from(days)
            .checked_mul(MICROS_PER_DAY)
            .ok_or_else(|| Rejected::new("TIMESTAMP", &value, "date out of timestamp range")),
        Value::Text(ref s) => parse_timestamp(s.trim())
            .ok_or_else(|| Rejected::new("TIMESTAMP", &value, "unrecognized timestamp text")),
        ref other => match other.as_i64() {
            // Legacy drivers hand back epoch milliseconds.
            Some(ms) => ms.checked_mul(1_000).ok_or_else(|| {
                Rejected::new("TIMESTAMP", other, "epoch milliseconds out of timestamp range")
            }),
            None => Err(mismatch(ValueType::Timestamp, other)),
        },
    }
}

fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_micros());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.and_utc().timestamp_micros())
}

fn parse_uuid(s: &str) -> Option<[u8; 16]> {
    let hex: Vec<u8> = s.bytes().filter(|b| *b != b'-').collect();
    if hex.len() != 32 {
        return None;
    }
    let mut out = [0u8; 16];
    for (i, pair) in hex.chunks(2).enumerate() {
        let text = std::str::from_utf8(pair).ok()?;
        out[i] = u8::from_str_radix(text, 16).ok()?;
    }
    Some(out)
}

fn uuid_string(u: &[u8; 16]) -> String {
    let hex: String = u.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

/// Render a value as JSON.
///
/// Temporal values become ISO 8601 strings, UUIDs their hyphenated form and
/// decimals strings (so no precision is lost).
pub fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => {
            Json::from(value.as_i64().unwrap_or_default())
        }
        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f)).map_or(Json::Null, Json::Number),
        Value::Double(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Decimal(s) | Value::Text(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::Array(b.iter().map(|x| Json::from(*x)).collect()),
        Value::Date(days) => epoch()
            .checked_add_signed(chrono::Duration::days(i64::from(*days)))
            .map_or(Json::Null, |d| Json::String(d.format("%Y-%m-%d").to_string())),
        Value::Time(us) => {
            let secs = us.div_euclid(MICROS_PER_SECOND);
            let nanos = (us.rem_euclid(MICROS_PER_SECOND) * 1_000) as u32;
            NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, nanos)
                .map_or(Json::Null, |t| Json::String(t.format("%H:%M:%S%.f").to_string()))
        }
        Value::Timestamp(us) => DateTime::<Utc>::from_timestamp_micros(*us).map_or(Json::Null, |dt| {
            Json::String(dt.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }),
        Value::TimestampTz(us) => DateTime::<Utc>::from_timestamp_micros(*us)
            .map_or(Json::Null, |dt| {
                Json::String(dt.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
            }),
        Value::Uuid(u) => Json::String(uuid_string(u)),
        Value::Json(j) => j.clone(),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
    }
}
