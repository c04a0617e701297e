use log::trace;

use crate::value::{Record, Value};

use super::{
    ReadError,
    node::{Entry, EntryAnnotations, Feed, FeedAnnotations, LinkAnnotations, ResponseNode},
};

/// Converts an entry's raw field buffer into the record exposed to callers.
///
/// Runs once per entry, when the entry closes. Conversion may reshape or
/// type the fields; it must not depend on sibling entries.
pub trait EntryConverter {
    fn to_record(&self, fields: Record) -> Result<Record, ReadError>;
}

/// Keeps fields exactly as read.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityConverter;

impl EntryConverter for IdentityConverter {
    fn to_record(&self, fields: Record) -> Result<Record, ReadError> {
        Ok(fields)
    }
}

impl<F> EntryConverter for F
where
    F: Fn(Record) -> Result<Record, ReadError>,
{
    fn to_record(&self, fields: Record) -> Result<Record, ReadError> {
        self(fields)
    }
}

/// Reader state, derived from the innermost open frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    InFeed,
    InEntry,
    InLink,
}

/// Open element on the parse stack.
#[derive(Debug)]
enum Frame {
    Feed(Feed),
    Entry {
        fields: Record,
        annotations: EntryAnnotations,
    },
    /// Expanded navigation link; `value` is whatever closed inside it
    Link {
        name: String,
        value: Option<ResponseNode>,
    },
}

impl Frame {
    fn kind(&self) -> &'static str {
        match self {
            Frame::Feed(_) => "feed",
            Frame::Entry { .. } => "entry",
            Frame::Link { .. } => "link",
        }
    }
}

/// Frame-stack state machine that assembles a [`ResponseNode`] from
/// structural events.
///
/// Event sources (the JSON and Atom readers) call the `start_*`/`end_*`
/// methods in document order. Entries close bottom-up: an entry is converted
/// when it ends and handed to the enclosing feed or link, and a link hands
/// its value to the enclosing entry's field map when it ends.
///
/// # Examples
///
/// ```
/// use odata_engine::Value;
/// use odata_engine::reader::{IdentityConverter, ResponseBuilder, ResponseNode};
///
/// let mut builder = ResponseBuilder::new(&IdentityConverter);
/// builder.start_entry();
/// builder.set_field("ProductID", Value::Int32(1)).unwrap();
/// builder.end_entry().unwrap();
///
/// match builder.finish().unwrap() {
///     ResponseNode::Entry(entry) => assert_eq!(entry.get("ProductID"), Some(&Value::Int32(1))),
///     other => panic!("unexpected node: {:?}", other),
/// }
/// ```
pub struct ResponseBuilder<'c> {
    stack: Vec<Frame>,
    result: Option<ResponseNode>,
    converter: &'c dyn EntryConverter,
}

impl<'c> ResponseBuilder<'c> {
    pub fn new(converter: &'c dyn EntryConverter) -> Self {
        ResponseBuilder {
            stack: Vec::new(),
            result: None,
            converter,
        }
    }

    pub fn state(&self) -> ReaderState {
        match self.stack.last() {
            None => ReaderState::Idle,
            Some(Frame::Feed(_)) => ReaderState::InFeed,
            Some(Frame::Entry { .. }) => ReaderState::InEntry,
            Some(Frame::Link { .. }) => ReaderState::InLink,
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn start_feed(&mut self) {
        trace!("start feed at depth {}", self.stack.len());
        self.stack.push(Frame::Feed(Feed::default()));
    }

    pub fn end_feed(&mut self) -> Result<(), ReadError> {
        let feed = match self.stack.pop() {
            Some(Frame::Feed(feed)) => feed,
            other => return Err(unbalanced("end-feed", other)),
        };
        trace!("end feed with {} entries", feed.entries.len());
        self.close_node(ResponseNode::Feed(feed))
    }

    pub fn start_entry(&mut self) {
        trace!("start entry at depth {}", self.stack.len());
        self.stack.push(Frame::Entry {
            fields: Record::new(),
            annotations: EntryAnnotations::default(),
        });
    }

    pub fn end_entry(&mut self) -> Result<(), ReadError> {
        let (fields, annotations) = match self.stack.pop() {
            Some(Frame::Entry { fields, annotations }) => (fields, annotations),
            other => return Err(unbalanced("end-entry", other)),
        };
        let data = self.converter.to_record(fields)?;
        trace!("end entry with {} fields", data.len());
        self.close_node(ResponseNode::Entry(Entry { data, annotations }))
    }

    pub fn start_link(&mut self, name: impl Into<String>) {
        let name = name.into();
        trace!("start link '{}'", name);
        self.stack.push(Frame::Link { name, value: None });
    }

    pub fn end_link(&mut self) -> Result<(), ReadError> {
        let (name, value) = match self.stack.pop() {
            Some(Frame::Link { name, value }) => (name, value),
            other => return Err(unbalanced("end-link", other)),
        };

        let (fields, annotations) = match self.stack.last_mut() {
            Some(Frame::Entry { fields, annotations }) => (fields, annotations),
            _ => {
                return Err(ReadError::MalformedResponse(format!(
                    "link '{}' closed outside an entry",
                    name
                )));
            }
        };

        // Expanded-but-empty and not-expanded look the same to callers, but
        // a count or next link on an empty collection is still kept.
        let mut closed = LinkAnnotations::default();
        match value {
            Some(ResponseNode::Entry(entry)) if !entry.data.is_empty() => {
                closed.entries.push(entry.annotations);
                fields.insert(name.clone(), Value::Record(entry.data));
            }
            Some(ResponseNode::Feed(feed)) if !feed.entries.is_empty() => {
                closed.feed = feed.annotations;
                let mut records = Vec::with_capacity(feed.entries.len());
                for entry in feed.entries {
                    closed.entries.push(entry.annotations);
                    records.push(Value::Record(entry.data));
                }
                fields.insert(name.clone(), Value::Collection(records));
            }
            Some(ResponseNode::Feed(feed)) => {
                trace!("link '{}' is empty; leaving it absent", name);
                closed.feed = feed.annotations;
            }
            _ => trace!("link '{}' is empty; leaving it absent", name),
        }

        if !closed.is_empty() {
            annotations.links.entry(name).or_default().merge(closed);
        }
        Ok(())
    }

    /// Annotations of a navigation link on the innermost entry, for
    /// property annotations such as a count read before the link opens.
    pub fn link_annotations(&mut self, name: &str) -> Result<&mut LinkAnnotations, ReadError> {
        match self.stack.last_mut() {
            Some(Frame::Entry { annotations, .. }) => {
                Ok(annotations.links.entry(name.to_string()).or_default())
            }
            _ => Err(ReadError::MalformedResponse(format!(
                "annotation on link '{}' outside an entry",
                name
            ))),
        }
    }

    /// Assigns a field on the innermost entry.
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) -> Result<(), ReadError> {
        let name = name.into();
        match self.stack.last_mut() {
            Some(Frame::Entry { fields, .. }) => {
                fields.insert(name, value);
                Ok(())
            }
            other => Err(ReadError::MalformedResponse(format!(
                "field '{}' outside an entry (in {})",
                name,
                other.map_or("document", |f| f.kind())
            ))),
        }
    }

    /// Annotations of the innermost entry.
    pub fn entry_annotations(&mut self) -> Result<&mut EntryAnnotations, ReadError> {
        match self.stack.last_mut() {
            Some(Frame::Entry { annotations, .. }) => Ok(annotations),
            _ => Err(ReadError::MalformedResponse(
                "entry annotation outside an entry".to_string(),
            )),
        }
    }

    /// Annotations of the innermost feed.
    pub fn feed_annotations(&mut self) -> Result<&mut FeedAnnotations, ReadError> {
        match self.stack.last_mut() {
            Some(Frame::Feed(feed)) => Ok(&mut feed.annotations),
            _ => Err(ReadError::MalformedResponse(
                "feed annotation outside a feed".to_string(),
            )),
        }
    }

    /// Sets a primitive result for the whole document.
    pub fn set_value(&mut self, value: Value) -> Result<(), ReadError> {
        if !self.stack.is_empty() {
            return Err(ReadError::MalformedResponse(
                "primitive result inside an open frame".to_string(),
            ));
        }
        self.set_result(ResponseNode::Value(value))
    }

    /// Returns the root node once every frame has closed.
    pub fn finish(self) -> Result<ResponseNode, ReadError> {
        if let Some(frame) = self.stack.last() {
            return Err(ReadError::MalformedResponse(format!(
                "{} unclosed frame(s), innermost is a {}",
                self.stack.len(),
                frame.kind()
            )));
        }
        self.result
            .ok_or_else(|| ReadError::MalformedResponse("payload contains no feed or entry".to_string()))
    }

    fn close_node(&mut self, node: ResponseNode) -> Result<(), ReadError> {
        match self.stack.last_mut() {
            None => self.set_result(node),
            Some(Frame::Feed(feed)) => match node {
                ResponseNode::Entry(entry) => {
                    feed.entries.push(entry);
                    Ok(())
                }
                _ => Err(ReadError::MalformedResponse("feed nested directly in a feed".to_string())),
            },
            Some(Frame::Link { name, value }) => {
                if value.is_some() {
                    return Err(ReadError::MalformedResponse(format!(
                        "link '{}' holds more than one node",
                        name
                    )));
                }
                *value = Some(node);
                Ok(())
            }
            Some(Frame::Entry { .. }) => Err(ReadError::MalformedResponse(
                "node nested directly in an entry without a link".to_string(),
            )),
        }
    }

    fn set_result(&mut self, node: ResponseNode) -> Result<(), ReadError> {
        if self.result.is_some() {
            return Err(ReadError::MalformedResponse("more than one root node".to_string()));
        }
        self.result = Some(node);
        Ok(())
    }
}

fn unbalanced(event: &str, popped: Option<Frame>) -> ReadError {
    let found = popped.as_ref().map_or("nothing", Frame::kind);
    ReadError::MalformedResponse(format!("{} with no matching start (found {})", event, found))
}
