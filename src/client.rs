//! Client session.
//!
//! A [`Client`] ties the stages together for one service: it formats
//! commands, sends each request once through a caller-supplied
//! [`Transport`], maps non-success statuses to
//! [`ClientError::RemoteOperation`] and parses success bodies with the
//! configured reader. Retries, authentication and connection handling belong
//! to the transport.

use std::sync::Arc;

use log::{debug, warn};
use thiserror::Error;

use crate::{
    ProtocolVersion,
    batch::{Batch, BatchError, PartResponse},
    command::Command,
    formatter::{EscapeMode, FormatError},
    metadata::MetadataResolver,
    reader::{Entry, Feed, PayloadFormat, ReadError, ResponseNode, parse_response},
    request::{HttpRequest, RequestWriter, Target},
    value::{Record, Value},
};

/// Response returned by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The transport itself failed, for example on connectivity.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Transport fault: {0}")]
pub struct TransportFault(pub String);

/// Sends one HTTP request and returns the service's response.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFault>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFault> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFault> {
        (**self).send(request)
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Batch error: {0}")]
    Batch(BatchError),

    /// The service answered with a non-success status
    #[error("Remote operation failed with status {status}: {body}")]
    RemoteOperation { status: u16, body: String },

    #[error(transparent)]
    TransportFault(#[from] TransportFault),
}

impl From<BatchError> for ClientError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::RemoteOperation { status, body, .. } => ClientError::RemoteOperation { status, body },
            BatchError::PartFault { message, .. } => ClientError::TransportFault(TransportFault(message)),
            BatchError::Format(e) => ClientError::Format(e),
            other => ClientError::Batch(other),
        }
    }
}

/// Session settings.
///
/// # Examples
///
/// ```
/// use odata_engine::ProtocolVersion;
/// use odata_engine::client::Settings;
/// use odata_engine::reader::PayloadFormat;
///
/// let settings = Settings::new("https://services.odata.org/V3/Northwind/Northwind.svc")
///     .with_version("3.0".parse::<ProtocolVersion>().unwrap())
///     .with_format(PayloadFormat::Atom);
/// assert_eq!(settings.version, ProtocolVersion::V3);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    /// Service root; request paths are appended to it
    pub base_url: String,
    pub version: ProtocolVersion,
    pub escape_mode: EscapeMode,
    /// Reader used when a response carries no usable `Content-Type`
    pub format: PayloadFormat,
    /// Ask the service to return written entities
    pub prefer_representation: bool,
}

impl Settings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Settings {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
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
}

/// Session against one service.
pub struct Client<T: Transport> {
    settings: Settings,
    resolver: Arc<dyn MetadataResolver>,
    transport: T,
}

impl<T: Transport> Client<T> {
    pub fn new(settings: Settings, resolver: Arc<dyn MetadataResolver>, transport: T) -> Self {
        Client {
            settings,
            resolver,
            transport,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn writer(&self) -> RequestWriter<'_> {
        RequestWriter::new(self.resolver.as_ref(), self.settings.version)
            .with_escape_mode(self.settings.escape_mode)
            .with_base_url(&self.settings.base_url)
            .with_format(self.settings.format)
            .with_prefer_representation(self.settings.prefer_representation)
    }

    fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let version = self.settings.version;
        let max_version = match version {
            ProtocolVersion::V3 => "MaxDataServiceVersion",
            ProtocolVersion::V4 => "OData-MaxVersion",
        };
        let request = request
            .with_header(version.header_name(), version.header_value())
            .with_header(max_version, version.header_value());

        debug!("{} {}", request.method, request.uri);
        let response = self.transport.send(&request)?;

        if !response.is_success() {
            warn!(
                "{} {} failed with status {}",
                request.method, request.uri, response.status
            );
            return Err(ClientError::RemoteOperation {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }

    /// Parses a success body; empty bodies (204) yield `None`.
    fn parse(&self, response: &HttpResponse) -> Result<Option<ResponseNode>, ClientError> {
        if response.body.trim().is_empty() {
            return Ok(None);
        }
        let format = response
            .header("Content-Type")
            .and_then(PayloadFormat::from_content_type)
            .unwrap_or(self.settings.format);
        Ok(Some(parse_response(&response.body, format)?))
    }

    /// Runs a query and returns the feed it produced.
    pub fn find_entries(&self, command: &Command) -> Result<Feed, ClientError> {
        let response = self.send(self.writer().query(command)?)?;
        match self.parse(&response)? {
            Some(ResponseNode::Feed(feed)) => Ok(feed),
            Some(ResponseNode::Entry(entry)) => Ok(Feed {
                entries: vec![entry],
                ..Default::default()
            }),
            Some(ResponseNode::Value(value)) => Err(ReadError::MalformedResponse(format!(
                "expected a feed, got a {} value",
                value.type_name()
            ))
            .into()),
            None => Ok(Feed::default()),
        }
    }

    /// Runs a query and returns its first entry. A 404 yields `None`.
    pub fn find_entry(&self, command: &Command) -> Result<Option<Entry>, ClientError> {
        let request = self.writer().query(command)?;
        let response = match self.send(request) {
            Ok(response) => response,
            Err(ClientError::RemoteOperation { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(self
            .parse(&response)?
            .and_then(|node| node.into_entries().into_iter().next()))
    }

    /// Number of entries the command matches, via `/$count`.
    pub fn count(&self, command: &Command) -> Result<u64, ClientError> {
        let command = command.clone().count_only();
        let response = self.send(self.writer().query(&command)?)?;
        let text = response.body.trim();
        text.parse::<u64>().map_err(|e| {
            ReadError::MalformedResponse(format!("invalid count '{}': {}", text, e)).into()
        })
    }

    /// Inserts an entry; returns it as stored when the service sends it back.
    pub fn insert_entry(
        &self,
        collection: &str,
        entry: &Record,
        links: &[(&str, Target)],
    ) -> Result<Option<Entry>, ClientError> {
        let (request, _) = self.writer().insert(collection, entry, links)?;
        let response = self.send(request)?;
        Ok(self.first_entry(&response)?)
    }

    pub fn update_entry(
        &self,
        target: &Target,
        entry: &Record,
        links: &[(&str, Target)],
    ) -> Result<Option<Entry>, ClientError> {
        let request = self.writer().update(target, entry, links)?;
        let response = self.send(request)?;
        Ok(self.first_entry(&response)?)
    }

    /// Updates every entry the command matches.
    ///
    /// A command with a key updates that entity directly. Otherwise the
    /// matching entries are fetched first and each is updated through its
    /// edit link (or id). Returns the number of entries updated.
    pub fn update_entries(
        &self,
        command: &Command,
        entry: &Record,
        links: &[(&str, Target)],
    ) -> Result<usize, ClientError> {
        if command.key.is_some() {
            self.update_entry(&Target::Entity(command.clone()), entry, links)?;
            return Ok(1);
        }

        let feed = self.find_entries(command)?;
        let mut updated = 0;
        for existing in &feed.entries {
            let annotations = &existing.annotations;
            let uri = annotations
                .edit_link
                .clone()
                .or_else(|| annotations.id.clone())
                .ok_or_else(|| {
                    ReadError::MalformedResponse("entry has neither an edit link nor an id".to_string())
                })?;
            self.update_entry(&Target::Uri(uri), entry, links)?;
            updated += 1;
        }
        Ok(updated)
    }

    pub fn delete_entry(&self, target: &Target) -> Result<(), ClientError> {
        self.send(self.writer().delete(target)?)?;
        Ok(())
    }

    /// Adds `target` to the `navigation` link of `source`.
    pub fn link_entry(&self, source: &Target, navigation: &str, target: &Target) -> Result<(), ClientError> {
        self.send(self.writer().link(source, navigation, target)?)?;
        Ok(())
    }

    pub fn unlink_entry(&self, source: &Target, navigation: &str, target: Option<&Target>) -> Result<(), ClientError> {
        self.send(self.writer().unlink(source, navigation, target)?)?;
        Ok(())
    }

    /// Calls a function with GET. An empty body yields a null value.
    pub fn execute_function(&self, command: &Command) -> Result<ResponseNode, ClientError> {
        if command.function.is_none() {
            return Err(FormatError::MalformedCommand("command has no function to execute".to_string()).into());
        }
        let response = self.send(self.writer().query(command)?)?;
        Ok(self.parse(&response)?.unwrap_or(ResponseNode::Value(Value::Null)))
    }

    /// Invokes an action with POST and its arguments as a JSON body.
    pub fn execute_action(&self, command: &Command, args: &Record) -> Result<Option<ResponseNode>, ClientError> {
        let response = self.send(self.writer().action(command, args)?)?;
        self.parse(&response)
    }

    /// Starts a batch carrying this session's settings.
    pub fn batch(&self) -> Batch {
        Batch::new(Arc::clone(&self.resolver), self.settings.version)
            .with_base_url(self.settings.base_url.clone())
            .with_escape_mode(self.settings.escape_mode)
            .with_format(self.settings.format)
            .with_prefer_representation(self.settings.prefer_representation)
    }

    /// Sends a batch and runs its callbacks.
    ///
    /// The first failed part is returned as the error; callbacks of later
    /// parts are not invoked.
    pub fn execute_batch(&self, batch: Batch) -> Result<Vec<PartResponse>, ClientError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.writer().batch(batch.end());
        let response = self.send(request)?;
        let content_type = response.header("Content-Type").ok_or_else(|| {
            BatchError::MalformedBatch("batch response has no Content-Type".to_string())
        })?;
        Ok(batch.demultiplex(content_type, &response.body)?)
    }

    fn first_entry(&self, response: &HttpResponse) -> Result<Option<Entry>, ClientError> {
        Ok(self
            .parse(response)?
            .and_then(|node| node.into_entries().into_iter().next()))
    }
}
