//! Request construction.
//!
//! [`RequestWriter`] turns commands and records into [`HttpRequest`]s. The
//! client uses it for single requests and [`Batch`](crate::batch::Batch)
//! uses it for batch parts, so both produce identical wire requests. The only
//! difference is that a batch writer knows which entities are pending and can
//! address them as `$<content-id>`.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as Json, json};

use crate::{
    ProtocolVersion,
    batch::BatchPayload,
    command::{Command, Key},
    formatter::{CommandFormatter, EscapeMode, FormatError, escape},
    metadata::MetadataResolver,
    reader::PayloadFormat,
    value::Record,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    /// V3 partial update
    Merge,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Merge => "MERGE",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One HTTP request, either sent on its own or packed into a batch part.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        HttpRequest {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Entity a write or link operation addresses.
#[derive(Debug, Clone)]
pub enum Target {
    /// Existing entity, addressed by a command's path
    Entity(Command),
    /// Entity inserted earlier in the same batch, matched by `Arc` identity
    Pending(Arc<Record>),
    /// Entity addressed by an edit link or id read from a response
    Uri(String),
}

impl From<Command> for Target {
    fn from(command: Command) -> Self {
        Target::Entity(command)
    }
}

impl From<&Arc<Record>> for Target {
    fn from(entry: &Arc<Record>) -> Self {
        Target::Pending(Arc::clone(entry))
    }
}

/// An insert queued in a batch, whose key is not known yet.
#[derive(Debug, Clone)]
pub(crate) struct PendingEntity {
    pub entry: Arc<Record>,
    pub content_id: usize,
    pub collection: String,
}

/// Resolved address of a [`Target`].
struct Address {
    uri: String,
    collection: Option<String>,
    key: Option<Key>,
}

pub(crate) struct RequestWriter<'a> {
    resolver: &'a dyn MetadataResolver,
    formatter: CommandFormatter<'a>,
    escape_mode: EscapeMode,
    base_url: &'a str,
    format: PayloadFormat,
    prefer_representation: bool,
    pending: &'a [PendingEntity],
}

impl<'a> RequestWriter<'a> {
    pub(crate) fn new(resolver: &'a dyn MetadataResolver, version: ProtocolVersion) -> Self {
        RequestWriter {
            resolver,
            formatter: CommandFormatter::new(resolver, version),
            escape_mode: EscapeMode::default(),
            base_url: "",
            format: PayloadFormat::default(),
            prefer_representation: false,
            pending: &[],
        }
    }

    pub(crate) fn with_escape_mode(mut self, mode: EscapeMode) -> Self {
        self.formatter = self.formatter.with_escape_mode(mode);
        self.escape_mode = mode;
        self
    }

    pub(crate) fn with_base_url(mut self, base_url: &'a str) -> Self {
        self.base_url = base_url;
        self
    }

    pub(crate) fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    pub(crate) fn with_prefer_representation(mut self, prefer: bool) -> Self {
        self.prefer_representation = prefer;
        self
    }

    pub(crate) fn with_pending(mut self, pending: &'a [PendingEntity]) -> Self {
        self.pending = pending;
        self
    }

    fn version(&self) -> ProtocolVersion {
        self.formatter.version()
    }

    /// GET for a query, function call or count.
    pub(crate) fn query(&self, command: &Command) -> Result<HttpRequest, FormatError> {
        let uri = self.absolute(&self.formatter.format(command)?);
        Ok(self.request(Method::Get, uri))
    }

    /// POST of a new entity. Returns the request and the exact collection name.
    pub(crate) fn insert(
        &self,
        collection: &str,
        entry: &Record,
        links: &[(&str, Target)],
    ) -> Result<(HttpRequest, String), FormatError> {
        let exact = self.resolver.exact_collection_name(collection)?;
        let body = self.entry_body(Some(&exact), entry, links)?;
        let request = self
            .write_request(Method::Post, self.absolute(&exact))
            .with_body(body);
        Ok((self.with_prefer(request), exact))
    }

    /// Partial update: PATCH in V4, MERGE in V3.
    pub(crate) fn update(&self, target: &Target, entry: &Record, links: &[(&str, Target)]) -> Result<HttpRequest, FormatError> {
        let address = self.address(target)?;
        let method = match self.version() {
            ProtocolVersion::V3 => Method::Merge,
            ProtocolVersion::V4 => Method::Patch,
        };
        let body = self.entry_body(address.collection.as_deref(), entry, links)?;
        let request = self
            .write_request(method, address.uri)
            .with_header("If-Match", "*")
            .with_body(body);
        Ok(self.with_prefer(request))
    }

    pub(crate) fn delete(&self, target: &Target) -> Result<HttpRequest, FormatError> {
        let address = self.address(target)?;
        Ok(self
            .request(Method::Delete, address.uri)
            .with_header("If-Match", "*"))
    }

    /// Adds `target` to the `navigation` link of `source`.
    pub(crate) fn link(&self, source: &Target, navigation: &str, target: &Target) -> Result<HttpRequest, FormatError> {
        let source = self.address(source)?;
        let target = self.address(target)?;
        let (navigation, multivalued) = self.navigation(source.collection.as_deref(), navigation)?;

        let (uri, body) = match self.version() {
            ProtocolVersion::V4 => (
                format!("{}/{}/$ref", source.uri, navigation),
                json!({ "@odata.id": target.uri }),
            ),
            ProtocolVersion::V3 => (
                format!("{}/$links/{}", source.uri, navigation),
                json!({ "uri": target.uri }),
            ),
        };
        let method = if multivalued { Method::Post } else { Method::Put };
        Ok(self.write_request(method, uri).with_body(body.to_string()))
    }

    /// Removes `target` (or the single linked entity) from a navigation link.
    pub(crate) fn unlink(
        &self,
        source: &Target,
        navigation: &str,
        target: Option<&Target>,
    ) -> Result<HttpRequest, FormatError> {
        let source = self.address(source)?;
        let (navigation, multivalued) = self.navigation(source.collection.as_deref(), navigation)?;
        let target = match target {
            Some(target) if multivalued => Some(self.address(target)?),
            _ => None,
        };

        let uri = match self.version() {
            ProtocolVersion::V4 => {
                let base = format!("{}/{}/$ref", source.uri, navigation);
                match target {
                    Some(target) => format!("{}?$id={}", base, escape(&target.uri, self.escape_mode)),
                    None => base,
                }
            }
            ProtocolVersion::V3 => {
                let base = format!("{}/$links/{}", source.uri, navigation);
                match target.and_then(|t| t.key.map(|key| (key, t.collection))) {
                    Some((key, collection)) => {
                        format!("{}{}", base, self.formatter.format_key(&key, collection.as_deref())?)
                    }
                    None => base,
                }
            }
        };
        Ok(self.request(Method::Delete, uri))
    }

    /// POST invoking a bound or unbound action.
    pub(crate) fn action(&self, command: &Command, args: &Record) -> Result<HttpRequest, FormatError> {
        if command.action.is_none() {
            return Err(FormatError::MalformedCommand("command has no action to execute".to_string()));
        }
        let uri = self.absolute(&self.formatter.format(command)?);
        let body = self.record_json(args);
        let request = self.write_request(Method::Post, uri).with_body(Json::Object(body).to_string());
        Ok(self.with_prefer(request))
    }

    /// POST of an encoded batch to `$batch`.
    pub(crate) fn batch(&self, payload: BatchPayload) -> HttpRequest {
        self.request(Method::Post, self.absolute("$batch"))
            .with_header("Content-Type", payload.content_type)
            .with_body(payload.body)
    }

    fn request(&self, method: Method, uri: String) -> HttpRequest {
        HttpRequest::new(method, uri).with_header("Accept", self.format.media_type())
    }

    fn write_request(&self, method: Method, uri: String) -> HttpRequest {
        let content_type = match self.version() {
            ProtocolVersion::V3 => "application/json;odata=verbose",
            ProtocolVersion::V4 => "application/json",
        };
        self.request(method, uri).with_header("Content-Type", content_type)
    }

    fn with_prefer(&self, request: HttpRequest) -> HttpRequest {
        if !self.prefer_representation {
            return request;
        }
        match self.version() {
            ProtocolVersion::V3 => request.with_header("Prefer", "return-content"),
            ProtocolVersion::V4 => request.with_header("Prefer", "return=representation"),
        }
    }

    fn absolute(&self, path: &str) -> String {
        if self.base_url.is_empty() {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        }
    }

    fn address(&self, target: &Target) -> Result<Address, FormatError> {
        match target {
            Target::Entity(command) => {
                let (path, collection) = self.formatter.resolve_resource(command)?;
                Ok(Address {
                    uri: self.absolute(&path),
                    collection,
                    key: command.key.clone(),
                })
            }
            Target::Uri(uri) => Ok(Address {
                uri: if uri.contains("://") { uri.clone() } else { self.absolute(uri) },
                collection: None,
                key: None,
            }),
            Target::Pending(entry) => {
                let pending = self
                    .pending
                    .iter()
                    .find(|p| Arc::ptr_eq(&p.entry, entry))
                    .ok_or_else(|| {
                        FormatError::MalformedCommand(
                            "referenced entity was not inserted earlier in this batch".to_string(),
                        )
                    })?;
                Ok(Address {
                    uri: format!("${}", pending.content_id),
                    collection: Some(pending.collection.clone()),
                    key: None,
                })
            }
        }
    }

    fn navigation(&self, collection: Option<&str>, name: &str) -> Result<(String, bool), FormatError> {
        match collection {
            Some(collection) => {
                let exact = self.resolver.exact_navigation_name(collection, name)?;
                let multivalued = self.resolver.is_navigation_multivalued(collection, &exact)?;
                Ok((exact, multivalued))
            }
            None => Ok((name.to_string(), false)),
        }
    }

    fn record_json(&self, record: &Record) -> Map<String, Json> {
        let version = self.version();
        record
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json(version)))
            .collect()
    }

    /// JSON body for an entity, with navigation links written as bindings.
    fn entry_body(&self, collection: Option<&str>, entry: &Record, links: &[(&str, Target)]) -> Result<String, FormatError> {
        let mut body = self.record_json(entry);

        for (navigation, target) in links {
            let address = self.address(target)?;
            let (navigation, multivalued) = self.navigation(collection, navigation)?;

            let (field, reference) = match self.version() {
                ProtocolVersion::V4 => (format!("{}@odata.bind", navigation), Json::String(address.uri)),
                ProtocolVersion::V3 => (navigation, json!({ "__metadata": { "uri": address.uri } })),
            };

            if !multivalued {
                body.insert(field, reference);
                continue;
            }
            if let Some(Json::Array(items)) = body.get_mut(&field) {
                items.push(reference);
                continue;
            }
            body.insert(field, Json::Array(vec![reference]));
        }

        Ok(Json::Object(body).to_string())
    }
}
