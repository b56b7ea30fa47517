use bytes::Bytes;
use std::fmt;
use time::{Date, PrimitiveDateTime, Time};
use uuid::Uuid;

use super::convert::{fmt_date, fmt_time, fmt_timestamp};
use crate::netezza::{NzType, Oid, oid};

/// Decoded column value.
///
/// The variant is chosen by the wire type of the column, see
/// [`convert`][super::convert].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// `BYTEINT`, `SMALLINT` and `INTEGER`.
    Int(i32),
    /// `BIGINT`.
    BigInt(i64),
    /// Floating point, and numeric that fits `f64` exactly.
    Number(f64),
    /// Numeric as exact decimal text.
    Decimal(String),
    Text(String),
    Bytes(Bytes),
    Date(Date),
    Time(Time),
    Timestamp(PrimitiveDateTime),
    /// Time with zone, e.g. `10:11:12+05:30`.
    TimeTz(String),
    /// Interval, e.g. `1 years 2 mons 03:04:05`.
    Interval(String),
    Uuid(Uuid),
}

/// Coarse value category, as reported in the schema table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ValueKind {
    String,
    Number,
    Date,
    Boolean,
}

impl ValueKind {
    /// Kind of a DBOS field type.
    pub fn of_dbos(ty: NzType) -> ValueKind {
        match ty {
            NzType::Int1
            | NzType::Int2
            | NzType::Int
            | NzType::Int8
            | NzType::Float
            | NzType::Double
            | NzType::Numeric
            | NzType::Money => ValueKind::Number,
            NzType::Date | NzType::Timestamp | NzType::AbsTime => ValueKind::Date,
            NzType::Bool => ValueKind::Boolean,
            _ => ValueKind::String,
        }
    }

    /// Kind of a column type oid.
    pub fn of_oid(oid: Oid) -> ValueKind {
        match oid {
            oid::INT2 | oid::INT4 | oid::INT8 | oid::BYTEINT | oid::OID | oid::FLOAT4 | oid::FLOAT8
            | oid::NUMERIC => ValueKind::Number,
            oid::DATE | oid::TIMESTAMP | oid::TIMESTAMPTZ | oid::ABSTIME => ValueKind::Date,
            oid::BOOL => ValueKind::Boolean,
            _ => ValueKind::String,
        }
    }
}

impl Value {
    /// Returns `true` if value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Value category, `None` for NULL.
    pub fn kind(&self) -> Option<ValueKind> {
        let kind = match self {
            Value::Null => return None,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Int(_) | Value::BigInt(_) | Value::Number(_) | Value::Decimal(_) => ValueKind::Number,
            Value::Date(_) | Value::Timestamp(_) => ValueKind::Date,
            Value::Text(_)
            | Value::Bytes(_)
            | Value::Time(_)
            | Value::TimeTz(_)
            | Value::Interval(_)
            | Value::Uuid(_) => ValueKind::String,
        };
        Some(kind)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Integer value, `Int` widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int(n) => Some(n.into()),
            Value::BigInt(n) => Some(n),
            _ => None,
        }
    }

    /// Numeric value as `f64`, lossy for `BigInt` and `Decimal`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some((*n).into()),
            Value::BigInt(n) => Some(*n as f64),
            Value::Number(n) => Some(*n),
            Value::Decimal(d) => d.parse().ok(),
            _ => None,
        }
    }

    /// Borrow text-like value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Decimal(s) | Value::TimeTz(s) | Value::Interval(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Date> {
        match *self {
            Value::Date(d) => Some(d),
            Value::Timestamp(ts) => Some(ts.date()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<PrimitiveDateTime> {
        match *self {
            Value::Timestamp(ts) => Some(ts),
            Value::Date(d) => Some(d.midnight()),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match *self {
            Value::Uuid(u) => Some(u),
            _ => None,
        }
    }

    /// Convert into [`serde_json::Value`].
    ///
    /// Dates and times are rendered as text, non finite numbers become `null`.
    #[cfg(feature = "json")]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            Value::BigInt(n) => Json::from(*n),
            Value::Number(n) => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            Value::Bytes(b) => Json::Array(b.iter().map(|b| Json::from(*b)).collect()),
            Value::Text(s) | Value::Decimal(s) | Value::TimeTz(s) | Value::Interval(s) => {
                Json::String(s.clone())
            },
            other => Json::String(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => fmt::Display::fmt(b, f),
            Value::Int(n) => fmt::Display::fmt(n, f),
            Value::BigInt(n) => fmt::Display::fmt(n, f),
            Value::Number(n) => fmt::Display::fmt(n, f),
            Value::Decimal(s) | Value::Text(s) | Value::TimeTz(s) | Value::Interval(s) => f.write_str(s),
            Value::Bytes(b) => {
                f.write_str("\\x")?;
                for b in b.iter() {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            },
            Value::Date(d) => fmt_date(*d, f),
            Value::Time(t) => fmt_time(*t, f),
            Value::Timestamp(ts) => fmt_timestamp(*ts, f),
            Value::Uuid(u) => fmt::Display::fmt(u, f),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(n) => serializer.serialize_i32(*n),
            Value::BigInt(n) => serializer.serialize_i64(*n),
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Text(s) | Value::Decimal(s) | Value::TimeTz(s) | Value::Interval(s) => {
                serializer.serialize_str(s)
            },
            other => serializer.collect_str(other),
        }
    }
}

macro_rules! from {
    ($($ty:ty => $variant:ident),* $(,)?) => {$(
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::$variant(value.into())
            }
        }
    )*};
}

from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => BigInt,
    f32 => Number,
    f64 => Number,
    String => Text,
    &str => Text,
    Bytes => Bytes,
    Date => Date,
    Time => Time,
    PrimitiveDateTime => Timestamp,
    Uuid => Uuid,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use time::macros::{date, datetime, time};

    #[test]
    fn display() {
        assert_eq!(Value::Date(date!(2024 - 01 - 05)).to_string(), "2024-01-05");
        assert_eq!(Value::Time(time!(7:08:09)).to_string(), "07:08:09");
        assert_eq!(
            Value::Timestamp(datetime!(2024-01-05 07:08:09.25)).to_string(),
            "2024-01-05 07:08:09.25"
        );
        assert_eq!(Value::Bytes(Bytes::from_static(b"\x01\xab")).to_string(), "\\x01ab");
        assert_eq!(Value::Number(42.0).to_string(), "42");
        assert_eq!(Value::Null.to_string(), "NULL");
    }

    #[test]
    fn kind_and_accessors() {
        assert_eq!(Value::Null.kind(), None);
        assert_eq!(Value::Decimal("1.5".into()).kind(), Some(ValueKind::Number));
        assert_eq!(Value::Decimal("1.5".into()).as_f64(), Some(1.5));
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::from(Some("a")), Value::Text("a".into()));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(ValueKind::of_dbos(NzType::AbsTime), ValueKind::Date);
        assert_eq!(ValueKind::of_oid(oid::VARCHAR), ValueKind::String);
    }

    #[cfg(feature = "json")]
    #[test]
    fn json() {
        assert_eq!(Value::Int(1).to_json(), serde_json::json!(1));
        assert_eq!(Value::Date(date!(2024 - 01 - 05)).to_json(), serde_json::json!("2024-01-05"));
        assert_eq!(Value::Number(f64::NAN).to_json(), serde_json::Value::Null);
    }
}
