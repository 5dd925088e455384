//! Identity keys for the per-execution identity cache.
//!
//! Drivers do not agree on the width of integer keys: the same primary key may
//! arrive as `INTEGER` in one column and `BIGINT` or `DECIMAL` in another (a
//! link table, a view). Keys are normalized before hashing so that all of them
//! address one instance.

use std::hash::{Hash, Hasher};

use rowgraph_core::Value;

/// One normalized key component.
#[derive(Debug, Clone, PartialEq, Eq)]
enum KeyPart {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
    Bytes(Vec<u8>),
    Date(i32),
    Time(i64),
    Timestamp(i64),
    Uuid([u8; 16]),
    Json(String),
    Array(Vec<KeyPart>),
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => KeyPart::Null,
            Value::Bool(b) => KeyPart::Bool(*b),
            Value::TinyInt(_) | Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => {
                KeyPart::Int(value.as_i64().unwrap_or_default())
            }
            Value::Float(f) => float_part(f64::from(*f)),
            Value::Double(f) => float_part(*f),
            Value::Decimal(s) => decimal_part(s),
            Value::Text(s) => KeyPart::Text(s.clone()),
            Value::Bytes(b) => KeyPart::Bytes(b.clone()),
            Value::Date(d) => KeyPart::Date(*d),
            Value::Time(t) => KeyPart::Time(*t),
            // Both timestamp flavors count microseconds from the epoch.
            Value::Timestamp(ts) | Value::TimestampTz(ts) => KeyPart::Timestamp(*ts),
            Value::Uuid(u) => KeyPart::Uuid(*u),
            Value::Json(j) => KeyPart::Json(j.to_string()),
            Value::Array(items) => KeyPart::Array(items.iter().map(KeyPart::from).collect()),
        }
    }
}

fn float_part(f: f64) -> KeyPart {
    if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 {
        KeyPart::Int(f as i64)
    } else {
        KeyPart::Float(f.to_bits())
    }
}

fn decimal_part(s: &str) -> KeyPart {
    let trimmed = s.trim();
    let integral = match trimmed.split_once('.') {
        Some((whole, frac)) if frac.bytes().all(|b| b == b'0') => whole,
        Some(_) => return KeyPart::Text(trimmed.to_string()),
        None => trimmed,
    };
    integral
        .parse::<i64>()
        .map_or_else(|_| KeyPart::Text(trimmed.to_string()), KeyPart::Int)
}

impl Hash for KeyPart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            KeyPart::Null => 0u8.hash(state),
            KeyPart::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            KeyPart::Int(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            KeyPart::Float(bits) => {
                3u8.hash(state);
                bits.hash(state);
            }
            KeyPart::Text(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            KeyPart::Bytes(b) => {
                5u8.hash(state);
                b.hash(state);
            }
            KeyPart::Date(d) => {
                6u8.hash(state);
                d.hash(state);
            }
            KeyPart::Time(t) => {
                7u8.hash(state);
                t.hash(state);
            }
            KeyPart::Timestamp(ts) => {
                8u8.hash(state);
                ts.hash(state);
            }
            KeyPart::Uuid(u) => {
                9u8.hash(state);
                u.hash(state);
            }
            KeyPart::Json(s) => {
                10u8.hash(state);
                s.hash(state);
            }
            KeyPart::Array(items) => {
                11u8.hash(state);
                items.len().hash(state);
                for item in items {
                    item.hash(state);
                }
            }
        }
    }
}

/// Normalized primary key of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey(Vec<KeyPart>);

impl IdentityKey {
    /// Build a key from the key column values of a row.
    ///
    /// Returns `None` when every value is NULL: the instance is absent from
    /// this row.
    pub fn from_values<'v, I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'v Value>,
    {
        let parts: Vec<KeyPart> = values.into_iter().map(KeyPart::from).collect();
        if parts.iter().all(|p| *p == KeyPart::Null) {
            None
        } else {
            Some(Self(parts))
        }
    }

    /// Number of key components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a key with no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn key(values: &[Value]) -> Option<IdentityKey> {
        IdentityKey::from_values(values)
    }

    #[test]
    fn test_integer_widths_share_identity() {
        let a = key(&[Value::Int(7)]).unwrap();
        let b = key(&[Value::BigInt(7)]).unwrap();
        let c = key(&[Value::Decimal("7.00".into())]).unwrap();
        let d = key(&[Value::Double(7.0)]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);

        let set: HashSet<_> = [a, b, c, d].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_distinct_values_differ() {
        assert_ne!(key(&[Value::Int(1)]), key(&[Value::Int(2)]));
        assert_ne!(key(&[Value::Int(1)]), key(&[Value::Text("1".into())]));
        assert_ne!(
            key(&[Value::Decimal("1.5".into())]),
            key(&[Value::Int(1)])
        );
    }

    #[test]
    fn test_all_null_is_absent() {
        assert!(key(&[Value::Null, Value::Null]).is_none());
        assert!(key(&[]).is_none());
        let partial = key(&[Value::Null, Value::Int(3)]).unwrap();
        assert_eq!(partial.len(), 2);
    }

    #[test]
    fn test_composite_key_order_matters() {
        let ab = key(&[Value::Text("a".into()), Value::Text("b".into())]);
        let ba = key(&[Value::Text("b".into()), Value::Text("a".into())]);
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_timestamp_flavors_match() {
        assert_eq!(
            key(&[Value::Timestamp(1_000)]),
            key(&[Value::TimestampTz(1_000)])
        );
    }
}
