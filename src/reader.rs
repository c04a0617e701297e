//! Response reading.
//!
//! Payload readers ([`read_json`], [`read_atom`]) translate a document into
//! structural events on a [`ResponseBuilder`], which assembles the final
//! [`ResponseNode`]. Both readers share the builder, so the empty-link rule
//! and entry conversion behave identically across formats.

pub mod atom;
pub mod builder;
pub mod json;
pub mod node;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub use atom::read_atom;
pub use builder::{EntryConverter, IdentityConverter, ReaderState, ResponseBuilder};
pub use json::read_json;
pub use node::{Entry, EntryAnnotations, Feed, FeedAnnotations, LinkAnnotations, ResponseNode};

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid XML payload: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Wire format of response and request payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    #[default]
    Json,
    Atom,
}

impl PayloadFormat {
    /// Value for the `Accept` and `Content-Type` headers.
    pub fn media_type(&self) -> &'static str {
        match self {
            PayloadFormat::Json => "application/json",
            PayloadFormat::Atom => "application/atom+xml",
        }
    }

    /// Guesses the format from a `Content-Type` header value.
    pub fn from_content_type(content_type: &str) -> Option<PayloadFormat> {
        let lower = content_type.to_ascii_lowercase();
        if lower.contains("json") {
            Some(PayloadFormat::Json)
        } else if lower.contains("xml") {
            Some(PayloadFormat::Atom)
        } else {
            None
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFormat::Json => write!(f, "json"),
            PayloadFormat::Atom => write!(f, "atom"),
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = ReadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(PayloadFormat::Json),
            "atom" | "xml" => Ok(PayloadFormat::Atom),
            other => Err(ReadError::MalformedResponse(format!(
                "unknown payload format '{}'",
                other
            ))),
        }
    }
}

/// Parses a response body, keeping entry fields as read.
pub fn parse_response(body: &str, format: PayloadFormat) -> Result<ResponseNode, ReadError> {
    parse_response_with(body, format, &IdentityConverter)
}

/// Parses a response body, running `converter` on every entry as it closes.
pub fn parse_response_with(
    body: &str,
    format: PayloadFormat,
    converter: &dyn EntryConverter,
) -> Result<ResponseNode, ReadError> {
    let mut builder = ResponseBuilder::new(converter);
    match format {
        PayloadFormat::Json => read_json(body, &mut builder)?,
        PayloadFormat::Atom => read_atom(body, &mut builder)?,
    }
    builder.finish()
}
