use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use odata_engine::batch::{Batch, BatchError, PartResponse};
use odata_engine::formatter::FormatError;
use odata_engine::metadata::{FieldKind, Schema};
use odata_engine::reader::PayloadFormat;
use odata_engine::{Command, ProtocolVersion, Record, Target, Value};

fn northwind() -> Arc<Schema> {
    Arc::new(
        Schema::new("NorthwindModel")
            .field("Products", "ProductID", FieldKind::Other)
            .field("Products", "ProductName", FieldKind::String)
            .navigation("Products", "Category", "Categories", false)
            .field("Categories", "CategoryID", FieldKind::Other)
            .field("Categories", "CategoryName", FieldKind::String)
            .navigation("Categories", "Products", "Products", true),
    )
}

fn record(fields: &[(&str, Value)]) -> Record {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn http_part(status_line: &str, body: &str) -> String {
    format!(
        "Content-Type: application/http\r\nContent-Transfer-Encoding: binary\r\n\r\n\
         HTTP/1.1 {}\r\nContent-Type: application/json\r\n\r\n{}\r\n",
        status_line, body
    )
}

fn multipart(boundary: &str, parts: &[String]) -> String {
    let mut out = String::new();
    for part in parts {
        out.push_str(&format!("--{}\r\n{}", boundary, part));
    }
    out.push_str(&format!("--{}--\r\n", boundary));
    out
}

fn changeset(boundary: &str, parts: &[String]) -> String {
    format!(
        "Content-Type: multipart/mixed; boundary={}\r\n\r\n{}",
        boundary,
        multipart(boundary, parts)
    )
}

const RESPONSE_TYPE: &str = "multipart/mixed; boundary=batchresponse_1";

type Log = Rc<RefCell<Vec<(usize, Result<u16, u16>)>>>;

fn recorder(log: &Log, index: usize) -> impl FnOnce(Result<&PartResponse, &BatchError>) + 'static {
    let log = Rc::clone(log);
    move |result: Result<&PartResponse, &BatchError>| {
        let entry = match result {
            Ok(response) => Ok(response.status),
            Err(BatchError::RemoteOperation { status, .. }) => Err(*status),
            Err(_) => Err(0),
        };
        log.borrow_mut().push((index, entry));
    }
}

// ============================================================================
// Encoding
// ============================================================================

#[test]
fn test_pending_entity_is_referenced_by_content_id() {
    let mut batch = Batch::new(northwind(), ProtocolVersion::V4);
    let category = Arc::new(record(&[("CategoryName", Value::from("Seafood"))]));
    let product = Arc::new(record(&[("ProductName", Value::from("Ikura"))]));

    let a = batch.insert("Categories", &category, &[]).unwrap();
    let b = batch
        .insert("Products", &product, &[("Category", Target::from(&category))])
        .unwrap();

    assert_eq!(a.content_id, Some(1));
    assert_eq!(b.content_id, Some(2));
    assert_eq!(a.reference().as_deref(), Some("$1"));

    let payload = batch.end();
    let product_part = payload.body.split("Content-ID: 2").nth(1).unwrap();
    assert!(product_part.contains(r#"{"ProductName":"Ikura","Category@odata.bind":"$1"}"#));
}

#[test]
fn test_v3_reference_uses_metadata_uri() {
    let mut batch = Batch::new(northwind(), ProtocolVersion::V3);
    let category = Arc::new(record(&[("CategoryName", Value::from("Seafood"))]));
    let product = Arc::new(record(&[("ProductName", Value::from("Ikura"))]));

    batch.insert("Categories", &category, &[]).unwrap();
    batch
        .insert("Products", &product, &[("Category", Target::from(&category))])
        .unwrap();

    let payload = batch.end();
    assert!(payload.body.contains(r#""Category":{"__metadata":{"uri":"$1"}}"#));
}

#[test]
fn test_reference_uses_identity_not_equality() {
    let mut batch = Batch::new(northwind(), ProtocolVersion::V4);
    let category = Arc::new(record(&[("CategoryName", Value::from("Seafood"))]));
    let twin = Arc::new((*category).clone());
    let product = Arc::new(record(&[("ProductName", Value::from("Ikura"))]));

    batch.insert("Categories", &category, &[]).unwrap();
    let err = batch
        .insert("Products", &product, &[("Category", Target::from(&twin))])
        .unwrap_err();

    assert!(matches!(err, BatchError::Format(FormatError::MalformedCommand(_))));
}

#[test]
fn test_link_between_pending_entities() {
    let mut batch = Batch::new(northwind(), ProtocolVersion::V4);
    let category = Arc::new(record(&[("CategoryName", Value::from("Seafood"))]));
    let product = Arc::new(record(&[("ProductName", Value::from("Ikura"))]));

    batch.insert("Categories", &category, &[]).unwrap();
    batch.insert("Products", &product, &[]).unwrap();
    batch
        .link(&Target::from(&product), "Category", &Target::from(&category))
        .unwrap();
    batch
        .link(&Target::from(&category), "Products", &Command::collection("Products").key(7).into())
        .unwrap();

    let payload = batch.end();
    assert!(payload.body.contains("PUT $2/Category/$ref HTTP/1.1"));
    assert!(payload.body.contains(r#"{"@odata.id":"$1"}"#));
    assert!(payload.body.contains("POST $1/Products/$ref HTTP/1.1"));
    assert!(payload.body.contains(r#"{"@odata.id":"Products(7)"}"#));
}

#[test]
fn test_writes_share_one_changeset() {
    let mut batch = Batch::new(northwind(), ProtocolVersion::V4).with_base_url("http://host/svc/");
    batch.get(&Command::collection("Products")).unwrap();
    batch.delete(&Command::collection("Products").key(1).into()).unwrap();
    batch
        .update(
            &Command::collection("Products").key(2).into(),
            &record(&[("ProductName", Value::from("Chang"))]),
            &[],
        )
        .unwrap();

    let payload = batch.end();
    let boundary = payload.content_type.split("boundary=").nth(1).unwrap();
    assert!(boundary.starts_with("batch_"));

    assert_eq!(payload.body.matches("Content-Type: multipart/mixed; boundary=changeset_").count(), 1);
    assert!(payload.body.contains("GET http://host/svc/Products HTTP/1.1"));
    assert!(payload.body.contains("DELETE http://host/svc/Products(1) HTTP/1.1"));
    assert!(payload.body.contains("PATCH http://host/svc/Products(2) HTTP/1.1"));
    assert!(payload.body.trim_end().ends_with(&format!("--{}--", boundary)));
}

// ============================================================================
// Demultiplexing
// ============================================================================

#[test]
fn test_failure_stops_later_callbacks() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut batch = Batch::new(northwind(), ProtocolVersion::V4);
    for (index, id) in [1, 2, 3].into_iter().enumerate() {
        let handle = batch.get(&Command::collection("Products").key(id)).unwrap();
        batch.on_response(&handle, recorder(&log, index));
    }

    let body = multipart(
        "batchresponse_1",
        &[
            http_part("200 OK", r#"{"ProductID":1}"#),
            http_part("404 Not Found", r#"{"error":{"message":"not found"}}"#),
            http_part("200 OK", r#"{"ProductID":3}"#),
        ],
    );
    let err = batch.demultiplex(RESPONSE_TYPE, &body).unwrap_err();

    assert!(matches!(err, BatchError::RemoteOperation { index: 1, status: 404, .. }));
    assert_eq!(*log.borrow(), vec![(0, Ok(200)), (1, Err(404))]);
}

#[test]
fn test_changeset_failure_stops_later_callbacks() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut batch = Batch::new(northwind(), ProtocolVersion::V4);
    for (index, id) in [1, 2, 3].into_iter().enumerate() {
        let handle = batch.delete(&Command::collection("Products").key(id).into()).unwrap();
        batch.on_response(&handle, recorder(&log, index));
    }

    let body = multipart(
        "batchresponse_1",
        &[changeset(
            "changesetresponse_1",
            &[
                http_part("204 No Content", ""),
                http_part("404 Not Found", ""),
                http_part("204 No Content", ""),
            ],
        )],
    );
    let err = batch.demultiplex(RESPONSE_TYPE, &body).unwrap_err();

    assert!(matches!(err, BatchError::RemoteOperation { index: 1, status: 404, .. }));
    assert_eq!(*log.borrow(), vec![(0, Ok(204)), (1, Err(404))]);
}

#[test]
fn test_collapsed_changeset_fails_first_write() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut batch = Batch::new(northwind(), ProtocolVersion::V4);
    let read = batch.get(&Command::collection("Products")).unwrap();
    batch.on_response(&read, recorder(&log, 0));
    for index in 1..3 {
        let handle = batch
            .delete(&Command::collection("Products").key(index as i32).into())
            .unwrap();
        batch.on_response(&handle, recorder(&log, index));
    }

    let body = multipart(
        "batchresponse_1",
        &[
            http_part("200 OK", r#"{"value":[]}"#),
            http_part("400 Bad Request", r#"{"error":{}}"#),
        ],
    );
    let err = batch.demultiplex(RESPONSE_TYPE, &body).unwrap_err();

    assert!(matches!(err, BatchError::RemoteOperation { index: 1, status: 400, .. }));
    assert_eq!(*log.borrow(), vec![(0, Ok(200)), (1, Err(400))]);
}

#[test]
fn test_successful_batch_runs_callbacks_in_issue_order() {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let mut batch = Batch::new(northwind(), ProtocolVersion::V4);

    let delete = batch.delete(&Command::collection("Products").key(1).into()).unwrap();
    batch.on_response(&delete, recorder(&log, 0));
    let read = batch.get(&Command::collection("Products").key(2)).unwrap();
    batch.on_response(&read, recorder(&log, 1));

    // The changeset sits where the first write was issued.
    let body = multipart(
        "batchresponse_1",
        &[
            changeset("changesetresponse_1", &[http_part("204 No Content", "")]),
            http_part("200 OK", r#"{"ProductID":2,"ProductName":"Chang"}"#),
        ],
    );
    let responses = batch.demultiplex(RESPONSE_TYPE, &body).unwrap();

    assert_eq!(responses.len(), 2);
    assert_eq!(*log.borrow(), vec![(0, Ok(204)), (1, Ok(200))]);

    let node = responses[1].parse(PayloadFormat::Json).unwrap();
    assert_eq!(node.entries()[0].get("ProductName"), Some(&Value::from("Chang")));
}

#[test]
fn test_missing_parts_are_a_count_mismatch() {
    let mut batch = Batch::new(northwind(), ProtocolVersion::V4);
    batch.get(&Command::collection("Products")).unwrap();
    batch.get(&Command::collection("Categories")).unwrap();

    let body = multipart("batchresponse_1", &[http_part("200 OK", r#"{"value":[]}"#)]);
    let err = batch.demultiplex(RESPONSE_TYPE, &body).unwrap_err();

    assert_eq!(err, BatchError::PartCountMismatch { expected: 2, actual: 1 });
}

#[test]
fn test_response_without_boundary_is_malformed() {
    let batch = Batch::new(northwind(), ProtocolVersion::V4);
    let err = batch.demultiplex("application/json", "{}").unwrap_err();
    assert!(matches!(err, BatchError::MalformedBatch(_)));
}
