use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use indexmap::IndexMap;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use uuid::Uuid;

use crate::ProtocolVersion;

/// An ordered field map.
///
/// Field order is the order of assignment: the order the service sent the
/// properties in, or the order the caller inserted them into a payload.
pub type Record = IndexMap<String, Value>;

/// A typed protocol value.
///
/// Values appear as literals inside filter expressions and key segments, as
/// function arguments, as fields of request payloads and as fields of parsed
/// response records.
///
/// # Type Preservation
///
/// The protocol distinguishes numeric widths and several temporal types that
/// JSON cannot express, so each gets its own variant. The literal encoder
/// ([`crate::literal`]) uses the variant to pick suffixes and wrappers.
///
/// # Examples
///
/// ```
/// use odata_engine::{Record, Value};
///
/// let id = Value::Int32(42);
/// let name = Value::from("Chai");
///
/// let mut record = Record::new();
/// record.insert("ProductID".to_string(), id);
/// record.insert("ProductName".to_string(), name);
/// let product = Value::Record(record);
/// assert!(!product.is_scalar());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Protocol null
    Null,

    /// `Edm.Boolean`
    Boolean(bool),

    /// `Edm.Int32` (and the narrower integer types)
    Int32(i32),

    /// `Edm.Int64`
    Int64(i64),

    /// `Edm.Decimal`
    Decimal(Decimal),

    /// `Edm.Single`
    Single(f32),

    /// `Edm.Double`
    Double(f64),

    /// `Edm.String`
    String(String),

    /// `Edm.Guid`
    Guid(Uuid),

    /// `Edm.DateTime` without an offset
    DateTime(NaiveDateTime),

    /// `Edm.DateTimeOffset`
    DateTimeOffset(DateTime<FixedOffset>),

    /// `Edm.Date`
    Date(NaiveDate),

    /// `Edm.TimeOfDay`
    TimeOfDay(NaiveTime),

    /// `Edm.Time` (V3) / `Edm.Duration` (V4)
    Duration(TimeDelta),

    /// `Edm.Binary`
    Binary(Vec<u8>),

    /// Collection of values
    Collection(Vec<Value>),

    /// Structured value: a complex type or an expanded entity
    Record(Record),

    /// Inclusive range. Only meaningful as the right-hand side of `eq` in a
    /// filter, where it expands to a pair of bound comparisons.
    Range { low: Box<Value>, high: Box<Value> },
}

impl Value {
    /// Builds an inclusive range value.
    pub fn range(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Value::Range {
            low: Box::new(low.into()),
            high: Box::new(high.into()),
        }
    }

    /// True for everything except collections, records and ranges.
    pub fn is_scalar(&self) -> bool {
        !matches!(
            self,
            Value::Collection(_) | Value::Record(_) | Value::Range { .. }
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as a record, if this is one
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Get as a collection, if this is one
    pub fn as_collection(&self) -> Option<&[Value]> {
        match self {
            Value::Collection(items) => Some(items),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as integer, widening 32-bit values
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            _ => None,
        }
    }

    /// Human-readable name of the protocol type
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "Edm.Boolean",
            Value::Int32(_) => "Edm.Int32",
            Value::Int64(_) => "Edm.Int64",
            Value::Decimal(_) => "Edm.Decimal",
            Value::Single(_) => "Edm.Single",
            Value::Double(_) => "Edm.Double",
            Value::String(_) => "Edm.String",
            Value::Guid(_) => "Edm.Guid",
            Value::DateTime(_) => "Edm.DateTime",
            Value::DateTimeOffset(_) => "Edm.DateTimeOffset",
            Value::Date(_) => "Edm.Date",
            Value::TimeOfDay(_) => "Edm.TimeOfDay",
            Value::Duration(_) => "Edm.Duration",
            Value::Binary(_) => "Edm.Binary",
            Value::Collection(_) => "Collection",
            Value::Record(_) => "Record",
            Value::Range { .. } => "Range",
        }
    }

    /// Converts a JSON value into a protocol value.
    ///
    /// Integers that fit 32 bits become `Int32`, wider ones `Int64`, and
    /// everything else numeric becomes `Double`. Strings are kept as strings;
    /// typed conversion of string-encoded values is the caller's business.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    match i32::try_from(i) {
                        Ok(small) => Value::Int32(small),
                        Err(_) => Value::Int64(i),
                    }
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Collection(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Converts into the JSON representation used in request bodies.
    ///
    /// V3 JSON carries 64-bit integers and decimals as strings; V4 writes them
    /// as numbers.
    pub fn to_json(&self, version: ProtocolVersion) -> serde_json::Value {
        use serde_json::Value as Json;

        let number = |f: f64| {
            serde_json::Number::from_f64(f)
                .map(Json::Number)
                .unwrap_or(Json::Null)
        };

        match self {
            Value::Null => Json::Null,
            Value::Boolean(b) => Json::Bool(*b),
            Value::Int32(n) => Json::from(*n),
            Value::Int64(n) => match version {
                ProtocolVersion::V3 => Json::String(n.to_string()),
                ProtocolVersion::V4 => Json::from(*n),
            },
            Value::Decimal(d) => match version {
                ProtocolVersion::V3 => Json::String(d.to_string()),
                ProtocolVersion::V4 => d.to_f64().map_or(Json::Null, number),
            },
            Value::Single(f) => number(f64::from(*f)),
            Value::Double(f) => number(*f),
            Value::String(s) => Json::String(s.clone()),
            Value::Guid(g) => Json::String(g.to_string()),
            Value::DateTime(dt) => match version {
                ProtocolVersion::V3 => Json::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
                ProtocolVersion::V4 => Json::String(dt.and_utc().to_rfc3339()),
            },
            Value::DateTimeOffset(dt) => Json::String(dt.to_rfc3339()),
            Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Value::TimeOfDay(t) => Json::String(t.format("%H:%M:%S%.f").to_string()),
            Value::Duration(d) => Json::String(crate::literal::iso8601_duration(d)),
            Value::Binary(bytes) => Json::String(BASE64.encode(bytes)),
            Value::Collection(items) => {
                Json::Array(items.iter().map(|v| v.to_json(version)).collect())
            }
            Value::Record(fields) => Json::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json(version)))
                    .collect(),
            ),
            Value::Range { low, high } => Json::Array(vec![low.to_json(version), high.to_json(version)]),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Uuid> for Value {
    fn from(g: Uuid) -> Self {
        Value::Guid(g)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Value::DateTimeOffset(dt)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Record(record)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Collection(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
