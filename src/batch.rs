//! Batch requests.
//!
//! A [`Batch`] collects operations in issue order and encodes them as one
//! `multipart/mixed` request: reads as top-level parts, every write inside a
//! single nested changeset. Each changeset part gets a Content-ID, and an
//! entity inserted earlier in the batch can be referenced by later parts as
//! `$<id>` before its key exists.
//!
//! On the way back, [`Batch::demultiplex`] splits the response, matches
//! parts to operations and runs the queued callbacks in issue order until
//! the first failure.

pub mod decoder;
pub mod encoder;
pub mod multipart;

use thiserror::Error;

use crate::formatter::FormatError;

pub use decoder::{PartOutcome, PartResponse, ResponsePart, decode_response};
pub use encoder::{Batch, BatchPayload, PartHandle};
pub use multipart::MimePart;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    /// The response body cannot be split into the expected parts
    #[error("Malformed batch response: {0}")]
    MalformedBatch(String),

    #[error("Batch response has {actual} part(s), expected {expected}")]
    PartCountMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Format(#[from] FormatError),

    /// A part came back with a non-success status
    #[error("Batch operation {index} failed with status {status}: {body}")]
    RemoteOperation { index: usize, status: u16, body: String },

    /// A part could not be read as an HTTP response
    #[error("Batch operation {index} faulted: {message}")]
    PartFault { index: usize, message: String },
}
