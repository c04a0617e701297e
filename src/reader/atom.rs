//! Atom/XML payload reader.
//!
//! Walks the document with a streaming `quick_xml` reader and turns feed,
//! entry and inline-link elements into builder events. Properties inside
//! `m:properties` are typed by their `m:type` attribute.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::value::{Record, Value};

use super::{ReadError, builder::ResponseBuilder};

const RELATED: &str = "/related/";

/// Element the reader is inside, as far as structure is concerned.
#[derive(Debug, Clone, PartialEq)]
enum Element {
    Feed,
    Entry,
    /// Navigation link that produced a builder link frame
    NavigationLink,
    Other,
}

/// Feeds an Atom document through the builder.
pub fn read_atom(body: &str, builder: &mut ResponseBuilder<'_>) -> Result<(), ReadError> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    let mut elements: Vec<Element> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let parent = elements.last().cloned();
                let element = start_element(&mut reader, &e, parent, builder)?;
                if let Some(element) = element {
                    elements.push(element);
                }
            }
            Event::Empty(e) => {
                let parent = elements.last().cloned();
                empty_element(&e, parent, builder)?;
            }
            Event::End(_) => match elements.pop() {
                Some(Element::Feed) => builder.end_feed()?,
                Some(Element::Entry) => builder.end_entry()?,
                Some(Element::NavigationLink) => builder.end_link()?,
                Some(Element::Other) => {}
                None => {
                    return Err(ReadError::MalformedResponse(
                        "closing tag with no open element".to_string(),
                    ));
                }
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !elements.is_empty() {
        return Err(ReadError::MalformedResponse(format!(
            "document ended with {} open element(s)",
            elements.len()
        )));
    }
    Ok(())
}

/// Handles a start tag. Returns the element to push, or `None` when the
/// element was consumed whole (text-only elements and property blocks).
fn start_element(
    reader: &mut Reader<&[u8]>,
    e: &BytesStart<'_>,
    parent: Option<Element>,
    builder: &mut ResponseBuilder<'_>,
) -> Result<Option<Element>, ReadError> {
    let name = local_name(e);

    match (name.as_str(), parent) {
        ("feed", _) => {
            builder.start_feed();
            Ok(Some(Element::Feed))
        }
        ("entry", _) => {
            builder.start_entry();
            if let Some(etag) = attribute(e, "etag")? {
                builder.entry_annotations()?.etag = Some(etag);
            }
            Ok(Some(Element::Entry))
        }
        ("count", Some(Element::Feed)) => {
            let text = read_text(reader)?;
            builder.feed_annotations()?.count = text.trim().parse().ok();
            Ok(None)
        }
        ("id", Some(Element::Entry)) => {
            let text = read_text(reader)?;
            builder.entry_annotations()?.id = Some(text);
            Ok(None)
        }
        ("properties", _) => {
            for (field, value) in read_properties(reader)? {
                builder.set_field(field, value)?;
            }
            Ok(None)
        }
        ("link", Some(Element::Entry)) => {
            if let Some(nav) = navigation_name(e)? {
                builder.start_link(nav);
                Ok(Some(Element::NavigationLink))
            } else {
                apply_entry_link(e, builder)?;
                Ok(Some(Element::Other))
            }
        }
        ("link", Some(Element::Feed)) => {
            apply_feed_link(e, builder)?;
            Ok(Some(Element::Other))
        }
        ("content", Some(Element::Entry)) => {
            apply_media_content(e, builder)?;
            Ok(Some(Element::Other))
        }
        _ => Ok(Some(Element::Other)),
    }
}

fn empty_element(e: &BytesStart<'_>, parent: Option<Element>, builder: &mut ResponseBuilder<'_>) -> Result<(), ReadError> {
    let name = local_name(e);

    match (name.as_str(), parent) {
        // Self-closing navigation links are deferred; nothing was expanded.
        ("link", Some(Element::Entry)) if navigation_name(e)?.is_none() => apply_entry_link(e, builder),
        ("link", Some(Element::Feed)) => apply_feed_link(e, builder),
        ("content", Some(Element::Entry)) => apply_media_content(e, builder),
        ("category", Some(Element::Entry)) => {
            if let Some(term) = attribute(e, "term")? {
                builder.entry_annotations()?.type_name = Some(term);
            }
            Ok(())
        }
        ("feed", _) => {
            builder.start_feed();
            builder.end_feed()
        }
        _ => Ok(()),
    }
}

fn navigation_name(e: &BytesStart<'_>) -> Result<Option<String>, ReadError> {
    let rel = attribute(e, "rel")?.unwrap_or_default();
    let Some(idx) = rel.find(RELATED) else {
        return Ok(None);
    };
    let name = match attribute(e, "title")? {
        Some(title) => title,
        None => rel[idx + RELATED.len()..].to_string(),
    };
    Ok(Some(name))
}

fn apply_entry_link(e: &BytesStart<'_>, builder: &mut ResponseBuilder<'_>) -> Result<(), ReadError> {
    let rel = attribute(e, "rel")?.unwrap_or_default();
    let href = attribute(e, "href")?;
    let annotations = builder.entry_annotations()?;
    match rel.as_str() {
        "edit" => annotations.edit_link = href,
        "self" => annotations.read_link = href,
        "edit-media" => {
            annotations.media_edit_link = href;
            if let Some(etag) = attribute(e, "etag")? {
                annotations.media_etag = Some(etag);
            }
        }
        _ => {}
    }
    Ok(())
}

fn apply_feed_link(e: &BytesStart<'_>, builder: &mut ResponseBuilder<'_>) -> Result<(), ReadError> {
    let rel = attribute(e, "rel")?.unwrap_or_default();
    let href = attribute(e, "href")?;
    let annotations = builder.feed_annotations()?;
    match rel.as_str() {
        "next" => annotations.next_link = href,
        "http://docs.oasis-open.org/odata/ns/delta" => annotations.delta_link = href,
        _ => {}
    }
    Ok(())
}

fn apply_media_content(e: &BytesStart<'_>, builder: &mut ResponseBuilder<'_>) -> Result<(), ReadError> {
    if let Some(src) = attribute(e, "src")? {
        let content_type = attribute(e, "type")?;
        let annotations = builder.entry_annotations()?;
        annotations.media_read_link = Some(src);
        annotations.media_content_type = content_type;
    }
    Ok(())
}

/// Reads the children of `m:properties` up to its closing tag.
fn read_properties(reader: &mut Reader<&[u8]>) -> Result<Record, ReadError> {
    let mut record = Record::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let value = read_property(reader, &e)?;
                record.insert(local_name(&e), value);
            }
            Event::Empty(e) => {
                record.insert(local_name(&e), empty_property(&e)?);
            }
            Event::End(_) => return Ok(record),
            Event::Eof => {
                return Err(ReadError::MalformedResponse("unterminated properties".to_string()));
            }
            _ => {}
        }
    }
}

/// Reads one property element whose start tag was just consumed.
fn read_property(reader: &mut Reader<&[u8]>, start: &BytesStart<'_>) -> Result<Value, ReadError> {
    let type_name = attribute(start, "type")?;
    let is_null = attribute(start, "null")?.as_deref() == Some("true");

    let mut text = String::new();
    let mut children: Vec<(String, Value)> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            Event::Start(e) => {
                let value = read_property(reader, &e)?;
                children.push((local_name(&e), value));
            }
            Event::Empty(e) => children.push((local_name(&e), empty_property(&e)?)),
            Event::End(_) => break,
            Event::Eof => {
                return Err(ReadError::MalformedResponse("unterminated property".to_string()));
            }
            _ => {}
        }
    }

    if is_null {
        return Ok(Value::Null);
    }

    let is_collection = type_name
        .as_deref()
        .is_some_and(|t| t.starts_with("Collection("));
    if is_collection || (!children.is_empty() && children.iter().all(|(n, _)| n == "element")) {
        return Ok(Value::Collection(children.into_iter().map(|(_, v)| v).collect()));
    }
    if !children.is_empty() {
        return Ok(Value::Record(children.into_iter().collect()));
    }

    convert_text(type_name.as_deref(), &text)
}

fn empty_property(e: &BytesStart<'_>) -> Result<Value, ReadError> {
    let type_name = attribute(e, "type")?;
    if attribute(e, "null")?.as_deref() == Some("true") {
        return Ok(Value::Null);
    }
    match type_name.as_deref() {
        Some(t) if t.starts_with("Collection(") => Ok(Value::Collection(vec![])),
        Some("Edm.String") | None => Ok(Value::String(String::new())),
        Some(_) => Ok(Value::Null),
    }
}

/// Converts element text according to its `m:type`.
fn convert_text(type_name: Option<&str>, text: &str) -> Result<Value, ReadError> {
    let invalid = |detail: String| {
        ReadError::MalformedResponse(format!(
            "invalid {} value '{}': {}",
            type_name.unwrap_or("Edm.String"),
            text,
            detail
        ))
    };

    let value = match type_name.unwrap_or("Edm.String") {
        "Edm.Int32" | "Edm.Int16" | "Edm.Byte" | "Edm.SByte" => {
            Value::Int32(text.parse().map_err(|e| invalid(format!("{e}")))?)
        }
        "Edm.Int64" => Value::Int64(text.parse().map_err(|e| invalid(format!("{e}")))?),
        "Edm.Decimal" => Value::Decimal(text.parse::<Decimal>().map_err(|e| invalid(format!("{e}")))?),
        "Edm.Double" => Value::Double(parse_float(text).ok_or_else(|| invalid("not a number".into()))?),
        "Edm.Single" => Value::Single(parse_float(text).ok_or_else(|| invalid("not a number".into()))? as f32),
        "Edm.Boolean" => Value::Boolean(text.eq_ignore_ascii_case("true") || text == "1"),
        "Edm.Guid" => Value::Guid(text.parse::<Uuid>().map_err(|e| invalid(format!("{e}")))?),
        "Edm.DateTime" => Value::DateTime(parse_datetime(text).ok_or_else(|| invalid("not a date".into()))?),
        "Edm.DateTimeOffset" => Value::DateTimeOffset(
            DateTime::parse_from_rfc3339(text).map_err(|e| invalid(format!("{e}")))?,
        ),
        "Edm.Date" => Value::Date(
            NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| invalid(format!("{e}")))?,
        ),
        "Edm.TimeOfDay" => Value::TimeOfDay(
            NaiveTime::parse_from_str(text, "%H:%M:%S%.f").map_err(|e| invalid(format!("{e}")))?,
        ),
        "Edm.Binary" => Value::Binary(BASE64.decode(text.trim()).map_err(|e| invalid(format!("{e}")))?),
        // Durations, enums, spatial types and strings stay textual.
        _ => Value::String(text.to_string()),
    };
    Ok(value)
}

fn parse_float(text: &str) -> Option<f64> {
    match text {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M"))
        .ok()
}

/// Reads text up to the closing tag of the element just opened.
fn read_text(reader: &mut Reader<&[u8]>) -> Result<String, ReadError> {
    let mut text = String::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event()? {
            Event::Text(t) => text.push_str(&t.unescape()?),
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => return Ok(text),
            Event::End(_) => depth -= 1,
            Event::Eof => {
                return Err(ReadError::MalformedResponse("unterminated element".to_string()));
            }
            _ => {}
        }
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

/// Attribute value by local name, ignoring the namespace prefix.
fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, ReadError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.to_string()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_conversion() {
        assert_eq!(convert_text(Some("Edm.Int32"), "42").unwrap(), Value::Int32(42));
        assert_eq!(convert_text(Some("Edm.Boolean"), "true").unwrap(), Value::Boolean(true));
        assert_eq!(convert_text(None, "Chai").unwrap(), Value::from("Chai"));
        assert!(convert_text(Some("Edm.Int32"), "forty").is_err());
    }

    #[test]
    fn test_datetime_without_seconds() {
        let parsed = parse_datetime("2014-02-01T12:00").unwrap();
        assert_eq!(parsed.format("%H:%M").to_string(), "12:00");
    }
}
