use indexmap::IndexMap;

use crate::value::{Record, Value};

/// Protocol metadata attached to an entry.
///
/// Kept apart from the entry's own fields so an entity property named, say,
/// `etag` can never collide with the concurrency token.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntryAnnotations {
    /// Canonical entity URI
    pub id: Option<String>,
    /// Qualified entity type name
    pub type_name: Option<String>,
    /// Concurrency token
    pub etag: Option<String>,
    pub edit_link: Option<String>,
    pub read_link: Option<String>,
    pub media_read_link: Option<String>,
    pub media_edit_link: Option<String>,
    pub media_content_type: Option<String>,
    pub media_etag: Option<String>,
    /// Annotations of expanded navigation links, keyed by link name
    pub links: IndexMap<String, LinkAnnotations>,
}

impl EntryAnnotations {
    pub fn link(&self, name: &str) -> Option<&LinkAnnotations> {
        self.links.get(name)
    }
}

/// Protocol metadata attached to a feed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedAnnotations {
    /// Total count across all pages, when requested
    pub count: Option<u64>,
    /// Continuation link for the next page
    pub next_link: Option<String>,
    pub delta_link: Option<String>,
}

/// Protocol metadata of an expanded navigation link.
///
/// The link's value lives in the owning entry's field map; its annotations
/// live here, on the owning entry's [`EntryAnnotations`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkAnnotations {
    /// Count and continuation link of an expanded collection
    pub feed: FeedAnnotations,
    /// Annotations of each expanded entry, in document order
    pub entries: Vec<EntryAnnotations>,
}

impl LinkAnnotations {
    /// Annotations of a singular expanded entry.
    pub fn entry(&self) -> Option<&EntryAnnotations> {
        self.entries.first()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.feed == FeedAnnotations::default() && self.entries.iter().all(|e| *e == EntryAnnotations::default())
    }

    /// Folds annotations read when the link closed into ones that arrived
    /// earlier as property annotations on the owning entry.
    pub(crate) fn merge(&mut self, closed: LinkAnnotations) {
        let LinkAnnotations { feed, entries } = closed;
        if feed.count.is_some() {
            self.feed.count = feed.count;
        }
        if feed.next_link.is_some() {
            self.feed.next_link = feed.next_link;
        }
        if feed.delta_link.is_some() {
            self.feed.delta_link = feed.delta_link;
        }
        self.entries.extend(entries);
    }
}

/// A single record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Entry {
    pub data: Record,
    pub annotations: EntryAnnotations,
}

impl Entry {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }
}

/// An ordered list of records.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feed {
    pub entries: Vec<Entry>,
    pub annotations: FeedAnnotations,
}

/// Parsed response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseNode {
    /// One entry
    Entry(Entry),
    /// A feed of entries
    Feed(Feed),
    /// Primitive or collection result of a function or property request
    Value(Value),
}

impl ResponseNode {
    /// Entries of the node: the feed's entries, or the single entry.
    pub fn entries(&self) -> &[Entry] {
        match self {
            ResponseNode::Entry(entry) => std::slice::from_ref(entry),
            ResponseNode::Feed(feed) => &feed.entries,
            ResponseNode::Value(_) => &[],
        }
    }

    pub fn into_entries(self) -> Vec<Entry> {
        match self {
            ResponseNode::Entry(entry) => vec![entry],
            ResponseNode::Feed(feed) => feed.entries,
            ResponseNode::Value(_) => vec![],
        }
    }

    pub fn feed_annotations(&self) -> Option<&FeedAnnotations> {
        match self {
            ResponseNode::Feed(feed) => Some(&feed.annotations),
            _ => None,
        }
    }
}
