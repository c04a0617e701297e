use std::sync::Arc;

use log::debug;
use uuid::Uuid;

use crate::{
    ProtocolVersion,
    command::Command,
    formatter::EscapeMode,
    metadata::MetadataResolver,
    reader::PayloadFormat,
    request::{HttpRequest, PendingEntity, RequestWriter, Target},
    value::Record,
};

use super::{
    BatchError,
    decoder::{self, Callback, PartResponse, Slot},
    multipart,
};

/// Identifies an operation queued in a [`Batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartHandle {
    /// Position in issue order, starting at 0
    pub index: usize,
    /// Content-ID, for operations inside the changeset
    pub content_id: Option<usize>,
}

impl PartHandle {
    /// `$<content-id>` reference usable by later parts of the same batch.
    pub fn reference(&self) -> Option<String> {
        self.content_id.map(|id| format!("${}", id))
    }
}

/// Encoded batch request body and its `Content-Type`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPayload {
    pub content_type: String,
    pub body: String,
}

struct Operation {
    request: HttpRequest,
    /// Set for changeset members
    content_id: Option<usize>,
}

/// A batch under construction.
///
/// Operations must be added in the order the caller issues them: Content-IDs
/// and callback correlation are positional. Use one instance per batch.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use odata_engine::{ProtocolVersion, Record, Value};
/// use odata_engine::batch::Batch;
/// use odata_engine::metadata::{FieldKind, Schema};
///
/// let schema = Schema::new("NorthwindModel")
///     .field("Categories", "CategoryName", FieldKind::String)
///     .field("Products", "ProductName", FieldKind::String)
///     .navigation("Products", "Category", "Categories", false);
/// let mut batch = Batch::new(Arc::new(schema), ProtocolVersion::V4);
///
/// let mut category = Record::new();
/// category.insert("CategoryName".to_string(), Value::from("Seafood"));
/// let category = Arc::new(category);
///
/// let mut product = Record::new();
/// product.insert("ProductName".to_string(), Value::from("Ikura"));
///
/// batch.insert("Categories", &category, &[]).unwrap();
/// batch.insert("Products", &Arc::new(product), &[("Category", (&category).into())]).unwrap();
///
/// let payload = batch.end();
/// assert!(payload.body.contains(r#""Category@odata.bind":"$1""#));
/// ```
pub struct Batch {
    resolver: Arc<dyn MetadataResolver>,
    version: ProtocolVersion,
    escape_mode: EscapeMode,
    base_url: String,
    format: PayloadFormat,
    prefer_representation: bool,
    batch_boundary: String,
    changeset_boundary: String,
    operations: Vec<Operation>,
    callbacks: Vec<Option<Callback>>,
    pending: Vec<PendingEntity>,
    next_content_id: usize,
}

impl Batch {
    pub fn new(resolver: Arc<dyn MetadataResolver>, version: ProtocolVersion) -> Self {
        let batch = Batch {
            resolver,
            version,
            escape_mode: EscapeMode::default(),
            base_url: String::new(),
            format: PayloadFormat::default(),
            prefer_representation: false,
            batch_boundary: format!("batch_{}", Uuid::new_v4()),
            changeset_boundary: format!("changeset_{}", Uuid::new_v4()),
            operations: Vec::new(),
            callbacks: Vec::new(),
            pending: Vec::new(),
            next_content_id: 1,
        };
        debug!("begin batch {}", batch.batch_boundary);
        batch
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_escape_mode(mut self, mode: EscapeMode) -> Self {
        self.escape_mode = mode;
        self
    }

    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_prefer_representation(mut self, prefer: bool) -> Self {
        self.prefer_representation = prefer;
        self
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    fn writer(&self) -> RequestWriter<'_> {
        RequestWriter::new(self.resolver.as_ref(), self.version)
            .with_escape_mode(self.escape_mode)
            .with_base_url(&self.base_url)
            .with_format(self.format)
            .with_prefer_representation(self.prefer_representation)
            .with_pending(&self.pending)
    }

    /// Queues an insert. Later operations can reference `entry` through
    /// [`Target::Pending`] until the batch ends.
    pub fn insert(
        &mut self,
        collection: &str,
        entry: &Arc<Record>,
        links: &[(&str, Target)],
    ) -> Result<PartHandle, BatchError> {
        if self.pending.iter().any(|p| Arc::ptr_eq(&p.entry, entry)) {
            return Err(BatchError::MalformedBatch(
                "entity is already inserted in this batch".to_string(),
            ));
        }
        let (request, collection) = self.writer().insert(collection, entry, links)?;
        let handle = self.push_write(request);
        if let Some(content_id) = handle.content_id {
            self.pending.push(PendingEntity {
                entry: Arc::clone(entry),
                content_id,
                collection,
            });
        }
        Ok(handle)
    }

    pub fn update(
        &mut self,
        target: &Target,
        entry: &Record,
        links: &[(&str, Target)],
    ) -> Result<PartHandle, BatchError> {
        let request = self.writer().update(target, entry, links)?;
        Ok(self.push_write(request))
    }

    pub fn delete(&mut self, target: &Target) -> Result<PartHandle, BatchError> {
        let request = self.writer().delete(target)?;
        Ok(self.push_write(request))
    }

    pub fn link(&mut self, source: &Target, navigation: &str, target: &Target) -> Result<PartHandle, BatchError> {
        let request = self.writer().link(source, navigation, target)?;
        Ok(self.push_write(request))
    }

    pub fn unlink(
        &mut self,
        source: &Target,
        navigation: &str,
        target: Option<&Target>,
    ) -> Result<PartHandle, BatchError> {
        let request = self.writer().unlink(source, navigation, target)?;
        Ok(self.push_write(request))
    }

    pub fn execute_action(&mut self, command: &Command, args: &Record) -> Result<PartHandle, BatchError> {
        let request = self.writer().action(command, args)?;
        Ok(self.push_write(request))
    }

    /// Queues a read. Reads travel outside the changeset.
    pub fn get(&mut self, command: &Command) -> Result<PartHandle, BatchError> {
        let request = self.writer().query(command)?;
        let index = self.operations.len();
        self.operations.push(Operation {
            request,
            content_id: None,
        });
        self.callbacks.push(None);
        Ok(PartHandle {
            index,
            content_id: None,
        })
    }

    /// Registers the callback for a queued operation, replacing any earlier one.
    pub fn on_response<F>(&mut self, handle: &PartHandle, callback: F)
    where
        F: FnOnce(Result<&PartResponse, &BatchError>) + 'static,
    {
        if let Some(slot) = self.callbacks.get_mut(handle.index) {
            *slot = Some(Box::new(callback));
        }
    }

    fn push_write(&mut self, request: HttpRequest) -> PartHandle {
        let index = self.operations.len();
        let content_id = self.next_content_id;
        self.next_content_id += 1;
        self.operations.push(Operation {
            request,
            content_id: Some(content_id),
        });
        self.callbacks.push(None);
        PartHandle {
            index,
            content_id: Some(content_id),
        }
    }

    /// Top-level layout: each read in place, and the changeset where the
    /// first write was issued.
    fn layout(&self) -> Vec<Slot> {
        let writes: Vec<usize> = self
            .operations
            .iter()
            .enumerate()
            .filter(|(_, op)| op.content_id.is_some())
            .map(|(i, _)| i)
            .collect();

        let mut layout = Vec::new();
        let mut changeset_placed = false;
        for (index, op) in self.operations.iter().enumerate() {
            if op.content_id.is_none() {
                layout.push(Slot::Read(index));
            } else if !changeset_placed {
                layout.push(Slot::Changeset(writes.clone()));
                changeset_placed = true;
            }
        }
        layout
    }

    /// Encodes the batch as a `multipart/mixed` body.
    pub fn end(&self) -> BatchPayload {
        let mut body = String::new();
        let mut changeset_parts = 0;

        for slot in self.layout() {
            match slot {
                Slot::Read(index) => {
                    multipart::write_part(&mut body, &self.batch_boundary, &self.operations[index].request, None);
                }
                Slot::Changeset(indices) => {
                    let mut nested = String::new();
                    for index in &indices {
                        let op = &self.operations[*index];
                        multipart::write_part(&mut nested, &self.changeset_boundary, &op.request, op.content_id);
                    }
                    multipart::write_close(&mut nested, &self.changeset_boundary);
                    multipart::write_nested(&mut body, &self.batch_boundary, &self.changeset_boundary, &nested);
                    changeset_parts = indices.len();
                }
            }
        }
        multipart::write_close(&mut body, &self.batch_boundary);

        debug!(
            "end batch {}: {} operation(s), {} in changeset",
            self.batch_boundary,
            self.operations.len(),
            changeset_parts
        );
        BatchPayload {
            content_type: multipart::content_type(&self.batch_boundary),
            body,
        }
    }

    /// Matches a batch response to the queued operations and runs their
    /// callbacks in issue order.
    ///
    /// Stops at the first part that faulted or returned status 400 or above:
    /// that operation's callback receives the error, later callbacks are not
    /// invoked, and the error is returned.
    pub fn demultiplex(self, content_type: &str, body: &str) -> Result<Vec<PartResponse>, BatchError> {
        let parts = decoder::decode_response(content_type, body)?;
        let outcomes = decoder::correlate(&self.layout(), parts, self.operations.len())?;
        decoder::dispatch(outcomes, self.callbacks)
    }
}
