//! `multipart/mixed` framing for batch requests and responses.
//!
//! Writes parts with CRLF line endings; reads either CRLF or bare LF, since
//! services and proxies are not consistent about it.

use regex::Regex;

use crate::request::HttpRequest;

use super::BatchError;

const CRLF: &str = "\r\n";

/// One body part of a multipart document: its MIME headers and raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct MimePart {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl MimePart {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }
}

/// Status line, headers and body of one HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpMessage {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

pub fn content_type(boundary: &str) -> String {
    format!("multipart/mixed; boundary={}", boundary)
}

/// Writes an `application/http` part wrapping `request`.
pub fn write_part(out: &mut String, boundary: &str, request: &HttpRequest, content_id: Option<usize>) {
    out.push_str("--");
    out.push_str(boundary);
    out.push_str(CRLF);
    out.push_str("Content-Type: application/http");
    out.push_str(CRLF);
    out.push_str("Content-Transfer-Encoding: binary");
    out.push_str(CRLF);
    if let Some(id) = content_id {
        out.push_str(&format!("Content-ID: {}{}", id, CRLF));
    }
    out.push_str(CRLF);

    out.push_str(&format!("{} {} HTTP/1.1{}", request.method, request.uri, CRLF));
    for (name, value) in &request.headers {
        out.push_str(&format!("{}: {}{}", name, value, CRLF));
    }
    out.push_str(CRLF);
    if let Some(body) = &request.body {
        out.push_str(body);
    }
    out.push_str(CRLF);
}

/// Writes a nested multipart part holding already-encoded changeset parts.
pub fn write_nested(out: &mut String, boundary: &str, nested_boundary: &str, nested_body: &str) {
    out.push_str("--");
    out.push_str(boundary);
    out.push_str(CRLF);
    out.push_str(&format!("Content-Type: {}{}", content_type(nested_boundary), CRLF));
    out.push_str(CRLF);
    out.push_str(nested_body);
    out.push_str(CRLF);
}

pub fn write_close(out: &mut String, boundary: &str) {
    out.push_str("--");
    out.push_str(boundary);
    out.push_str("--");
    out.push_str(CRLF);
}

/// Extracts the `boundary` parameter of a multipart content type.
pub fn boundary(content_type: &str) -> Result<String, BatchError> {
    let re = Regex::new(r#"(?i)boundary=(?:"([^"]+)"|([^;\s]+))"#)
        .map_err(|e| BatchError::MalformedBatch(format!("invalid boundary pattern: {e}")))?;
    let captures = re.captures(content_type).ok_or_else(|| {
        BatchError::MalformedBatch(format!("no boundary in content type '{}'", content_type))
    })?;
    captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| BatchError::MalformedBatch("empty boundary".to_string()))
}

/// Splits a multipart body into its parts, dropping preamble and epilogue.
pub fn split(body: &str, boundary: &str) -> Result<Vec<MimePart>, BatchError> {
    let delimiter = format!("--{}", boundary);
    let mut sections = body.split(delimiter.as_str());

    // Text before the first delimiter is preamble.
    if sections.next().is_none() {
        return Err(BatchError::MalformedBatch("empty multipart body".to_string()));
    }

    let mut parts = Vec::new();
    let mut closed = false;
    for section in sections {
        if section.starts_with("--") {
            closed = true;
            break;
        }
        let section = strip_line_break(section);
        let section = section.strip_suffix(CRLF).or_else(|| section.strip_suffix('\n')).unwrap_or(section);
        let (head, body) = split_head(section);
        parts.push(MimePart {
            headers: parse_headers(head),
            body: body.to_string(),
        });
    }

    if !closed {
        return Err(BatchError::MalformedBatch(format!(
            "multipart body is missing the closing delimiter for '{}'",
            boundary
        )));
    }
    Ok(parts)
}

/// Parses a raw HTTP response: status line, headers, blank line, body.
pub fn parse_http_response(text: &str) -> Result<HttpMessage, BatchError> {
    let re = Regex::new(r"^HTTP/\d(?:\.\d)?\s+(\d{3})")
        .map_err(|e| BatchError::MalformedBatch(format!("invalid status pattern: {e}")))?;

    let text = text.trim_start_matches(['\r', '\n']);
    let (status_line, rest) = match text.find('\n') {
        Some(idx) => (text[..idx].trim_end_matches('\r'), &text[idx + 1..]),
        None => (text.trim_end_matches('\r'), ""),
    };

    let status = re
        .captures(status_line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .ok_or_else(|| BatchError::MalformedBatch(format!("invalid status line '{}'", status_line)))?;

    let (head, body) = if rest.starts_with(CRLF) || rest.starts_with('\n') {
        ("", strip_line_break(rest))
    } else {
        split_head(rest)
    };

    Ok(HttpMessage {
        status,
        headers: parse_headers(head),
        body: body.to_string(),
    })
}

pub(crate) fn find_header<'h>(headers: &'h [(String, String)], name: &str) -> Option<&'h str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Splits at the first blank line.
fn split_head(text: &str) -> (&str, &str) {
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let lf = text.find("\n\n").map(|i| (i, 2));
    let split = match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    };
    match split {
        Some((idx, len)) => (&text[..idx], &text[idx + len..]),
        None => (text, ""),
    }
}

fn strip_line_break(text: &str) -> &str {
    text.strip_prefix(CRLF)
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(text)
}

fn parse_headers(head: &str) -> Vec<(String, String)> {
    head.lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;

    #[test]
    fn test_boundary_quoted_and_bare() {
        assert_eq!(boundary("multipart/mixed; boundary=batch_1").unwrap(), "batch_1");
        assert_eq!(
            boundary("multipart/mixed; boundary=\"changeset_2\"; charset=utf-8").unwrap(),
            "changeset_2"
        );
        assert!(boundary("application/json").is_err());
    }

    #[test]
    fn test_split_lf_body() {
        let body = "preamble\n--b\nContent-Type: application/http\n\nHTTP/1.1 204 No Content\n\n\n--b--\n";
        let parts = split(body, "b").unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].content_type(), Some("application/http"));
        assert!(parts[0].body.starts_with("HTTP/1.1 204"));
    }

    #[test]
    fn test_split_requires_close_delimiter() {
        assert!(split("--b\r\nContent-Type: text/plain\r\n\r\nx\r\n", "b").is_err());
    }

    #[test]
    fn test_http_response_without_headers() {
        let message = parse_http_response("HTTP/1.1 404 Not Found\r\n\r\n{\"error\":{}}").unwrap();
        assert_eq!(message.status, 404);
        assert!(message.headers.is_empty());
        assert_eq!(message.body, "{\"error\":{}}");
    }

    #[test]
    fn test_write_part_layout() {
        let request = HttpRequest::new(Method::Delete, "Products(1)");
        let mut out = String::new();
        write_part(&mut out, "cs", &request, Some(3));
        assert!(out.starts_with("--cs\r\nContent-Type: application/http\r\n"));
        assert!(out.contains("Content-ID: 3\r\n\r\nDELETE Products(1) HTTP/1.1\r\n"));
    }
}
