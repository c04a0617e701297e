use log::{debug, trace, warn};

use crate::reader::{PayloadFormat, ReadError, ResponseNode, parse_response};

use super::{
    BatchError,
    multipart::{self, HttpMessage, MimePart, find_header},
};

/// The response to one batched operation.
#[derive(Debug, Clone, PartialEq)]
pub struct PartResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub content_id: Option<String>,
}

impl PartResponse {
    fn from_message(message: HttpMessage, content_id: Option<String>) -> Self {
        PartResponse {
            status: message.status,
            headers: message.headers,
            body: message.body,
            content_id,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Parses the body, choosing the reader from the part's content type.
    pub fn parse(&self, default: PayloadFormat) -> Result<ResponseNode, ReadError> {
        let format = self
            .header("Content-Type")
            .and_then(PayloadFormat::from_content_type)
            .unwrap_or(default);
        parse_response(&self.body, format)
    }
}

/// What came back for one part: a response, or a fault reading it.
#[derive(Debug, Clone, PartialEq)]
pub enum PartOutcome {
    Response(PartResponse),
    Fault(String),
}

/// A top-level part of a batch response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePart {
    Single(PartOutcome),
    Changeset(Vec<PartOutcome>),
}

/// Splits a batch response into its top-level parts, unpacking changesets.
pub fn decode_response(content_type: &str, body: &str) -> Result<Vec<ResponsePart>, BatchError> {
    let boundary = multipart::boundary(content_type)?;
    let parts = multipart::split(body, &boundary)?;
    debug!("batch response has {} top-level part(s)", parts.len());

    parts.into_iter().map(decode_part).collect()
}

fn decode_part(part: MimePart) -> Result<ResponsePart, BatchError> {
    let content_type = part.content_type().unwrap_or_default();
    if content_type.to_ascii_lowercase().starts_with("multipart/mixed") {
        let boundary = multipart::boundary(content_type)?;
        let nested = multipart::split(&part.body, &boundary)?;
        let outcomes = nested.into_iter().map(decode_http).collect();
        Ok(ResponsePart::Changeset(outcomes))
    } else {
        Ok(ResponsePart::Single(decode_http(part)))
    }
}

fn decode_http(part: MimePart) -> PartOutcome {
    let content_id = part.header("Content-ID").map(str::to_string);
    match multipart::parse_http_response(&part.body) {
        Ok(message) => {
            trace!("batch part {:?} returned status {}", content_id, message.status);
            PartOutcome::Response(PartResponse::from_message(message, content_id))
        }
        Err(e) => PartOutcome::Fault(e.to_string()),
    }
}

/// Callback queued for one operation; receives its part's response, or the
/// failure that aborted the batch at this operation.
pub type Callback = Box<dyn FnOnce(Result<&PartResponse, &BatchError>)>;

/// Where an operation's response sits in the response body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    /// Top-level read, by issue index
    Read(usize),
    /// The changeset, listing issue indices in part order
    Changeset(Vec<usize>),
}

/// Assigns each top-level response part to the operations it answers.
///
/// Returns one outcome per issued operation. A changeset that came back as a
/// single failed response is charged to its first operation; the rest get no
/// outcome.
pub(crate) fn correlate(
    layout: &[Slot],
    parts: Vec<ResponsePart>,
    operation_count: usize,
) -> Result<Vec<Option<PartOutcome>>, BatchError> {
    if layout.len() != parts.len() {
        return Err(BatchError::PartCountMismatch {
            expected: layout.len(),
            actual: parts.len(),
        });
    }

    let mut outcomes: Vec<Option<PartOutcome>> = vec![None; operation_count];
    for (slot, part) in layout.iter().zip(parts) {
        match (slot, part) {
            (Slot::Read(index), ResponsePart::Single(outcome)) => outcomes[*index] = Some(outcome),
            (Slot::Changeset(indices), ResponsePart::Changeset(changeset)) => {
                if indices.len() != changeset.len() {
                    return Err(BatchError::PartCountMismatch {
                        expected: indices.len(),
                        actual: changeset.len(),
                    });
                }
                for (index, outcome) in indices.iter().zip(changeset) {
                    outcomes[*index] = Some(outcome);
                }
            }
            (Slot::Changeset(indices), ResponsePart::Single(outcome)) => {
                // The service rejected the changeset as a whole.
                if let Some(first) = indices.first() {
                    outcomes[*first] = Some(outcome);
                }
            }
            (Slot::Read(index), ResponsePart::Changeset(_)) => {
                return Err(BatchError::MalformedBatch(format!(
                    "expected a single response for operation {}, found a changeset",
                    index
                )));
            }
        }
    }
    Ok(outcomes)
}

/// Runs callbacks in issue order, stopping at the first failed operation.
///
/// The failing operation's callback receives the error, later callbacks are
/// dropped uninvoked, and the error is returned. Callbacks that already ran
/// are not undone.
pub(crate) fn dispatch(
    outcomes: Vec<Option<PartOutcome>>,
    callbacks: Vec<Option<Callback>>,
) -> Result<Vec<PartResponse>, BatchError> {
    let mut responses = Vec::with_capacity(outcomes.len());

    for (index, (outcome, callback)) in outcomes.into_iter().zip(callbacks).enumerate() {
        let result = match outcome {
            Some(PartOutcome::Response(response)) if response.is_success() => Ok(response),
            Some(PartOutcome::Response(response)) => Err(BatchError::RemoteOperation {
                index,
                status: response.status,
                body: response.body,
            }),
            Some(PartOutcome::Fault(message)) => Err(BatchError::PartFault { index, message }),
            None => Err(BatchError::MalformedBatch(format!(
                "no response for operation {}",
                index
            ))),
        };

        match result {
            Ok(response) => {
                if let Some(callback) = callback {
                    callback(Ok(&response));
                }
                responses.push(response);
            }
            Err(error) => {
                warn!("batch aborted at operation {}: {}", index, error);
                if let Some(callback) = callback {
                    callback(Err(&error));
                }
                return Err(error);
            }
        }
    }
    Ok(responses)
}
