//! JSON payload reader.
//!
//! Understands the three JSON shapes services send:
//!
//! - V4 and V3 "light": `{"value": [...], "@odata.count": 2}` for feeds, a
//!   bare object for an entry, annotations prefixed with `@odata.` / `odata.`
//! - V3 "verbose": everything wrapped in `{"d": ...}`, feeds as
//!   `{"results": [...], "__count": "2", "__next": "..."}`, entry metadata in
//!   `__metadata`, unexpanded links as `{"__deferred": ...}`
//! - A bare array of entries
//!
//! Nested objects and arrays of objects are read as expanded links. An empty
//! array is a link only when the entry carries annotations for that property
//! (`Suppliers@odata.navigationLink`); otherwise it is an empty collection.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use serde_json::{Map, Value as Json};

use crate::value::Value;

use super::{
    ReadError,
    builder::ResponseBuilder,
    node::{EntryAnnotations, FeedAnnotations},
};

/// Feeds a JSON document through the builder.
pub fn read_json(body: &str, builder: &mut ResponseBuilder<'_>) -> Result<(), ReadError> {
    let document: Json = serde_json::from_str(body)?;
    let dates = Regex::new(r"^/Date\((-?\d+)([+-]\d{4})?\)/$")
        .map_err(|e| ReadError::MalformedResponse(format!("invalid date pattern: {e}")))?;
    let reader = JsonReader { dates };

    match document {
        Json::Object(mut root) => match root.remove("d") {
            Some(inner) if root.is_empty() => reader.read_verbose_root(inner, builder),
            Some(inner) => {
                root.insert("d".to_string(), inner);
                reader.read_root(root, builder)
            }
            None => reader.read_root(root, builder),
        },
        Json::Array(items) => reader.read_feed(items, Map::new(), builder),
        other => builder.set_value(reader.convert(other)),
    }
}

struct JsonReader {
    dates: Regex,
}

impl JsonReader {
    fn read_root(&self, mut root: Map<String, Json>, builder: &mut ResponseBuilder<'_>) -> Result<(), ReadError> {
        let has_only_annotations = |root: &Map<String, Json>| {
            root.keys().all(|k| k == "value" || is_annotation(k))
        };

        if root.contains_key("value") && has_only_annotations(&root) {
            let value = root.remove("value").unwrap_or(Json::Null);
            return match value {
                Json::Array(items) if items.iter().all(Json::is_object) => {
                    self.read_feed(items, root, builder)
                }
                other => builder.set_value(self.convert(other)),
            };
        }

        self.read_entry(root, builder)
    }

    fn read_verbose_root(&self, inner: Json, builder: &mut ResponseBuilder<'_>) -> Result<(), ReadError> {
        match inner {
            Json::Array(items) => self.read_feed(items, Map::new(), builder),
            Json::Object(mut object) => match object.remove("results") {
                Some(Json::Array(items)) => self.read_feed(items, object, builder),
                Some(other) => {
                    object.insert("results".to_string(), other);
                    self.read_verbose_object(object, builder)
                }
                None => self.read_verbose_object(object, builder),
            },
            other => builder.set_value(self.convert(other)),
        }
    }

    /// A verbose `d` object is either an entry or a single-property result
    /// (`{"d": {"ProductName": "Chai"}}`).
    fn read_verbose_object(&self, object: Map<String, Json>, builder: &mut ResponseBuilder<'_>) -> Result<(), ReadError> {
        if object.len() == 1 && !object.contains_key("__metadata") {
            if let Some(value) = object.values().next() {
                if !value.is_object() && !value.is_array() {
                    return builder.set_value(self.convert(value.clone()));
                }
            }
        }
        self.read_entry(object, builder)
    }

    fn read_feed(
        &self,
        items: Vec<Json>,
        annotations: Map<String, Json>,
        builder: &mut ResponseBuilder<'_>,
    ) -> Result<(), ReadError> {
        builder.start_feed();
        for (key, value) in annotations {
            apply_feed_annotation(builder.feed_annotations()?, &key, value);
        }
        for item in items {
            match item {
                Json::Object(object) => self.read_entry(object, builder)?,
                other => {
                    return Err(ReadError::MalformedResponse(format!(
                        "feed item is not an object: {}",
                        other
                    )));
                }
            }
        }
        builder.end_feed()
    }

    fn read_entry(&self, object: Map<String, Json>, builder: &mut ResponseBuilder<'_>) -> Result<(), ReadError> {
        builder.start_entry();

        let annotated: HashSet<String> = object
            .keys()
            .filter_map(|k| k.split_once('@'))
            .filter(|(property, _)| !property.is_empty())
            .map(|(property, _)| property.to_string())
            .collect();

        for (key, value) in object {
            if key == "__metadata" {
                if let Json::Object(metadata) = value {
                    apply_verbose_metadata(builder.entry_annotations()?, metadata);
                }
                continue;
            }
            if is_annotation(&key) {
                apply_entry_annotation(builder.entry_annotations()?, &key, value);
                continue;
            }
            if let Some((property, annotation)) = key.split_once('@') {
                // Paging annotations of an expanded collection belong to the
                // link; the rest (`Category@odata.navigationLink`) are dropped.
                if is_feed_annotation(annotation) {
                    apply_feed_annotation(&mut builder.link_annotations(property)?.feed, annotation, value);
                }
                continue;
            }

            match value {
                Json::Object(nested) if nested.contains_key("__deferred") => {}
                Json::Object(mut nested) => match nested.remove("results") {
                    Some(Json::Array(items)) => {
                        builder.start_link(key);
                        self.read_feed(items, nested, builder)?;
                        builder.end_link()?;
                    }
                    Some(other) => {
                        nested.insert("results".to_string(), other);
                        builder.start_link(key);
                        self.read_entry(nested, builder)?;
                        builder.end_link()?;
                    }
                    None => {
                        builder.start_link(key);
                        self.read_entry(nested, builder)?;
                        builder.end_link()?;
                    }
                },
                Json::Array(items)
                    if items.iter().all(Json::is_object) && (!items.is_empty() || annotated.contains(&key)) =>
                {
                    builder.start_link(key);
                    self.read_feed(items, Map::new(), builder)?;
                    builder.end_link()?;
                }
                other => builder.set_field(key, self.convert(other))?,
            }
        }

        builder.end_entry()
    }

    /// Converts a field value, recognising verbose `/Date(ms)/` strings.
    fn convert(&self, json: Json) -> Value {
        match json {
            Json::String(s) => self.convert_date(&s).unwrap_or(Value::String(s)),
            Json::Array(items) => Value::Collection(items.into_iter().map(|v| self.convert(v)).collect()),
            other => Value::from_json(other),
        }
    }

    fn convert_date(&self, s: &str) -> Option<Value> {
        let captures = self.dates.captures(s)?;
        let millis: i64 = captures.get(1)?.as_str().parse().ok()?;
        let utc = DateTime::<Utc>::from_timestamp_millis(millis)?;

        match captures.get(2) {
            None => Some(Value::DateTime(utc.naive_utc())),
            Some(offset) => {
                // The offset is expressed in minutes: +0060 is one hour.
                let minutes: i32 = offset.as_str().parse().ok()?;
                let offset = FixedOffset::east_opt(minutes * 60)?;
                Some(Value::DateTimeOffset(utc.with_timezone(&offset)))
            }
        }
    }
}

fn is_annotation(key: &str) -> bool {
    key.starts_with("@odata.") || key.starts_with("odata.") || key.starts_with('@')
}

fn annotation_name(key: &str) -> &str {
    key.trim_start_matches('@').trim_start_matches("odata.")
}

fn as_text(value: Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s),
        Json::Null => None,
        other => Some(other.to_string()),
    }
}

fn as_count(value: &Json) -> Option<u64> {
    match value {
        Json::Number(n) => n.as_u64(),
        Json::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn is_feed_annotation(key: &str) -> bool {
    matches!(annotation_name(key), "count" | "nextLink" | "deltaLink")
}

fn apply_feed_annotation(annotations: &mut FeedAnnotations, key: &str, value: Json) {
    match annotation_name(key) {
        "count" | "__count" => annotations.count = as_count(&value),
        "nextLink" | "__next" => annotations.next_link = as_text(value),
        "deltaLink" | "__delta" => annotations.delta_link = as_text(value),
        _ => {}
    }
}

fn apply_entry_annotation(annotations: &mut EntryAnnotations, key: &str, value: Json) {
    let text = as_text(value);
    match annotation_name(key) {
        "id" => annotations.id = text,
        "type" => annotations.type_name = text.map(|t| t.trim_start_matches('#').to_string()),
        "etag" => annotations.etag = text,
        "editLink" => annotations.edit_link = text,
        "readLink" => annotations.read_link = text,
        "mediaReadLink" => annotations.media_read_link = text,
        "mediaEditLink" => annotations.media_edit_link = text,
        "mediaContentType" => annotations.media_content_type = text,
        "mediaEtag" => annotations.media_etag = text,
        _ => {}
    }
}

fn apply_verbose_metadata(annotations: &mut EntryAnnotations, metadata: Map<String, Json>) {
    for (key, value) in metadata {
        let text = as_text(value);
        match key.as_str() {
            "uri" => {
                annotations.edit_link = text.clone();
                annotations.id = text;
            }
            "type" => annotations.type_name = text,
            "etag" => annotations.etag = text,
            "media_src" => annotations.media_read_link = text,
            "edit_media" => annotations.media_edit_link = text,
            "content_type" => annotations.media_content_type = text,
            "media_etag" => annotations.media_etag = text,
            _ => {}
        }
    }
}
