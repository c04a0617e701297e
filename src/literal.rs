//! Value-literal encoding.
//!
//! Turns a typed [`Value`] into the literal text the protocol expects inside
//! a filter, a key segment or a function argument list. The two dialects
//! disagree on most non-trivial types:
//!
//! | Value | V3 | V4 |
//! |---|---|---|
//! | `Int64(5)` | `5L` | `5` |
//! | `Decimal(1.5)` | `1.5M` | `1.5` |
//! | `Guid` | `guid'…'` | `…` |
//! | `DateTime` | `datetime'2014-02-01T12:00:00'` | `2014-02-01T12:00:00Z` |
//! | `DateTimeOffset` | `datetimeoffset'…'` | `…` |
//! | `Duration` | `time'PT1H'` | `duration'PT1H'` |
//! | `Binary` | `X'0A0B'` | `binary'Cgs'` |
//!
//! Strings are always single-quoted with embedded quotes doubled.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{NaiveTime, TimeDelta, Timelike};

use crate::{ProtocolVersion, formatter::FormatError, value::Value};

/// Encodes a value as a protocol literal.
///
/// # Errors
///
/// Records and ranges have no literal form. Collections have one only in V4.
///
/// # Examples
///
/// ```
/// use odata_engine::{ProtocolVersion, Value, literal::format_literal};
///
/// let lit = format_literal(&Value::Int64(10), ProtocolVersion::V3).unwrap();
/// assert_eq!(lit, "10L");
///
/// let lit = format_literal(&Value::from("O'Neil"), ProtocolVersion::V4).unwrap();
/// assert_eq!(lit, "'O''Neil'");
/// ```
pub fn format_literal(value: &Value, version: ProtocolVersion) -> Result<String, FormatError> {
    use ProtocolVersion::*;

    let literal = match (value, version) {
        (Value::Null, _) => "null".to_string(),
        (Value::Boolean(b), _) => b.to_string(),
        (Value::Int32(n), _) => n.to_string(),
        (Value::Int64(n), V3) => format!("{}L", n),
        (Value::Int64(n), V4) => n.to_string(),
        (Value::Decimal(d), V3) => format!("{}M", d),
        (Value::Decimal(d), V4) => d.to_string(),
        (Value::Single(f), V3) => format!("{}f", format_float(f64::from(*f))),
        (Value::Single(f), V4) => format_float(f64::from(*f)),
        (Value::Double(f), _) => format_float(*f),
        (Value::String(s), _) => quote(s),
        (Value::Guid(g), V3) => format!("guid'{}'", g),
        (Value::Guid(g), V4) => g.to_string(),
        (Value::DateTime(dt), V3) => {
            format!("datetime'{}'", dt.format("%Y-%m-%dT%H:%M:%S%.f"))
        }
        (Value::DateTime(dt), V4) => dt.format("%Y-%m-%dT%H:%M:%S%.fZ").to_string(),
        (Value::DateTimeOffset(dt), V3) => format!("datetimeoffset'{}'", dt.to_rfc3339()),
        (Value::DateTimeOffset(dt), V4) => dt.to_rfc3339(),
        (Value::Date(d), V3) => format!("datetime'{}T00:00:00'", d.format("%Y-%m-%d")),
        (Value::Date(d), V4) => d.format("%Y-%m-%d").to_string(),
        (Value::TimeOfDay(t), V3) => format!("time'{}'", iso8601_duration(&since_midnight(t))),
        (Value::TimeOfDay(t), V4) => t.format("%H:%M:%S%.f").to_string(),
        (Value::Duration(d), V3) => format!("time'{}'", iso8601_duration(d)),
        (Value::Duration(d), V4) => format!("duration'{}'", iso8601_duration(d)),
        (Value::Binary(bytes), V3) => format!("X'{}'", hex::encode_upper(bytes)),
        (Value::Binary(bytes), V4) => format!("binary'{}'", URL_SAFE_NO_PAD.encode(bytes)),
        (Value::Collection(_), V4) => value.to_json(V4).to_string(),
        (Value::Collection(_), V3) => {
            return Err(FormatError::InvalidLiteral(
                "collection literals are not supported by the V3 dialect".to_string(),
            ));
        }
        (Value::Record(_), _) | (Value::Range { .. }, _) => {
            return Err(FormatError::InvalidLiteral(format!(
                "{} values have no literal representation",
                value.type_name()
            )));
        }
    };

    Ok(literal)
}

/// Single-quotes a string, doubling embedded quotes.
pub fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Formats a time span as an ISO 8601 duration (`P1DT2H30M`, `-PT5S`).
pub fn iso8601_duration(span: &TimeDelta) -> String {
    let negative = *span < TimeDelta::zero();
    let span = if negative { -*span } else { *span };

    let days = span.num_days();
    let hours = span.num_hours() % 24;
    let minutes = span.num_minutes() % 60;
    let seconds = span.num_seconds() % 60;
    let nanos = span.subsec_nanos();

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push('P');
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }

    let has_time = hours > 0 || minutes > 0 || seconds > 0 || nanos > 0;
    if has_time || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if nanos > 0 {
            let fraction = format!("{:09}", nanos);
            out.push_str(&format!("{}.{}S", seconds, fraction.trim_end_matches('0')));
        } else if seconds > 0 || !has_time {
            out.push_str(&format!("{}S", seconds));
        }
    }
    out
}

fn since_midnight(t: &NaiveTime) -> TimeDelta {
    TimeDelta::seconds(i64::from(t.num_seconds_from_midnight()))
        + TimeDelta::nanoseconds(i64::from(t.nanosecond()))
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        let inf = if f > 0.0 { "INF" } else { "-INF" };
        inf.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else if f.fract() == 0.0 {
        // Plain digits would read back as an integer literal.
        format!("{:e}", f)
    } else {
        f.to_string()
    }
}
