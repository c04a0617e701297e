use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

use odata_engine::client::{Client, ClientError, HttpResponse, Settings, Transport, TransportFault};
use odata_engine::formatter::FormatError;
use odata_engine::metadata::{FieldKind, Schema};
use odata_engine::reader::ResponseNode;
use odata_engine::{Command, HttpRequest, Method, ProtocolVersion, Record, Target, Value, reference};

/// Replays canned responses in order and records every request it was given.
#[derive(Default)]
struct ScriptedTransport {
    responses: RefCell<VecDeque<Result<HttpResponse, TransportFault>>>,
    requests: RefCell<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    fn respond(self, response: HttpResponse) -> Self {
        self.responses.borrow_mut().push_back(Ok(response));
        self
    }

    fn fail(self, message: &str) -> Self {
        self.responses
            .borrow_mut()
            .push_back(Err(TransportFault(message.to_string())));
        self
    }

    fn request(&self, index: usize) -> HttpRequest {
        self.requests.borrow()[index].clone()
    }

    fn request_count(&self) -> usize {
        self.requests.borrow().len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportFault> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(TransportFault("no scripted response left".to_string())))
    }
}

fn northwind() -> Arc<Schema> {
    Arc::new(
        Schema::new("NorthwindModel")
            .field("Products", "ProductID", FieldKind::Other)
            .field("Products", "ProductName", FieldKind::String)
            .field("Products", "UnitPrice", FieldKind::Other)
            .navigation("Products", "Category", "Categories", false)
            .field("Categories", "CategoryID", FieldKind::Other)
            .field("Categories", "CategoryName", FieldKind::String)
            .navigation("Categories", "Products", "Products", true)
            .function("GetProductsByRating")
            .function("ResetDataSource"),
    )
}

const BASE: &str = "http://host/svc/";

fn client(version: ProtocolVersion, transport: &ScriptedTransport) -> Client<&ScriptedTransport> {
    Client::new(Settings::new(BASE).with_version(version), northwind(), transport)
}

fn record(fields: &[(&str, Value)]) -> Record {
    fields
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn test_find_entries_sends_version_headers() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(
        200,
        r#"{"value": [{"ProductID": 1}, {"ProductID": 2}]}"#,
    ));
    let client = client(ProtocolVersion::V4, &transport);

    let feed = client.find_entries(&Command::collection("products").top(2)).unwrap();
    assert_eq!(feed.entries.len(), 2);

    let request = transport.request(0);
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.uri, "http://host/svc/Products?$top=2");
    assert_eq!(request.header("OData-Version"), Some("4.0"));
    assert_eq!(request.header("OData-MaxVersion"), Some("4.0"));
    assert_eq!(request.header("Accept"), Some("application/json"));
}

#[test]
fn test_v3_version_headers() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(200, r#"{"d": {"results": []}}"#));
    let client = client(ProtocolVersion::V3, &transport);

    let feed = client.find_entries(&Command::collection("Products")).unwrap();
    assert!(feed.entries.is_empty());

    let request = transport.request(0);
    assert_eq!(request.header("DataServiceVersion"), Some("3.0"));
    assert_eq!(request.header("MaxDataServiceVersion"), Some("3.0"));
}

#[test]
fn test_find_entry_not_found_is_none() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(404, "not found"));
    let client = client(ProtocolVersion::V4, &transport);

    let entry = client.find_entry(&Command::collection("Products").key(99)).unwrap();
    assert!(entry.is_none());
    assert_eq!(transport.request(0).uri, "http://host/svc/Products(99)");
}

#[test]
fn test_find_entry_returns_first_entry() {
    let transport = ScriptedTransport::default().respond(
        HttpResponse::new(200, r#"{"ProductID": 1, "ProductName": "Chai"}"#)
            .with_header("Content-Type", "application/json;odata.metadata=minimal"),
    );
    let client = client(ProtocolVersion::V4, &transport);

    let entry = client.find_entry(&Command::collection("Products").key(1)).unwrap().unwrap();
    assert_eq!(entry.get("ProductName"), Some(&Value::from("Chai")));
}

#[test]
fn test_count_uses_count_segment() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(200, "77"));
    let client = client(ProtocolVersion::V4, &transport);

    let command = Command::collection("Products").filter(reference("UnitPrice").greater_than(20));
    assert_eq!(client.count(&command).unwrap(), 77);
    assert_eq!(
        transport.request(0).uri,
        "http://host/svc/Products/$count?$filter=UnitPrice%20gt%2020"
    );
}

#[test]
fn test_invalid_count_is_a_read_error() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(200, "many"));
    let client = client(ProtocolVersion::V4, &transport);

    let err = client.count(&Command::collection("Products")).unwrap_err();
    assert!(matches!(err, ClientError::Read(_)));
}

// ============================================================================
// Writes
// ============================================================================

#[test]
fn test_insert_posts_entry_and_reads_it_back() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(
        201,
        r#"{"ProductID": 78, "ProductName": "Ikura"}"#,
    ));
    let settings = Settings::new(BASE).with_prefer_representation(true);
    let client = Client::new(settings, northwind(), &transport);

    let links = [("Category", Target::from(Command::collection("Categories").key(8)))];
    let stored = client
        .insert_entry("Products", &record(&[("ProductName", Value::from("Ikura"))]), &links)
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("ProductID"), Some(&Value::Int32(78)));

    let request = transport.request(0);
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.uri, "http://host/svc/Products");
    assert_eq!(request.header("Content-Type"), Some("application/json"));
    assert_eq!(request.header("Prefer"), Some("return=representation"));
    assert_eq!(
        request.body.as_deref(),
        Some(r#"{"ProductName":"Ikura","Category@odata.bind":"http://host/svc/Categories(8)"}"#)
    );
}

#[test]
fn test_v3_update_uses_merge() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(204, ""));
    let client = client(ProtocolVersion::V3, &transport);

    let target = Target::from(Command::collection("Products").key(1));
    let returned = client
        .update_entry(&target, &record(&[("UnitPrice", Value::Int32(20))]), &[])
        .unwrap();
    assert!(returned.is_none());

    let request = transport.request(0);
    assert_eq!(request.method, Method::Merge);
    assert_eq!(request.uri, "http://host/svc/Products(1)");
    assert_eq!(request.header("If-Match"), Some("*"));
    assert_eq!(request.header("Content-Type"), Some("application/json;odata=verbose"));
    assert_eq!(request.body.as_deref(), Some(r#"{"UnitPrice":20}"#));
}

#[test]
fn test_update_entries_without_key_goes_through_edit_links() {
    let transport = ScriptedTransport::default()
        .respond(HttpResponse::new(
            200,
            r#"{"value": [
                {"@odata.editLink": "Products(1)", "ProductID": 1},
                {"@odata.editLink": "Products(2)", "ProductID": 2}
            ]}"#,
        ))
        .respond(HttpResponse::new(204, ""))
        .respond(HttpResponse::new(204, ""));
    let client = client(ProtocolVersion::V4, &transport);

    let command = Command::collection("Products").filter(reference("UnitPrice").less_than(5));
    let updated = client
        .update_entries(&command, &record(&[("UnitPrice", Value::Int32(5))]), &[])
        .unwrap();

    assert_eq!(updated, 2);
    assert_eq!(transport.request_count(), 3);
    assert_eq!(transport.request(1).method, Method::Patch);
    assert_eq!(transport.request(1).uri, "http://host/svc/Products(1)");
    assert_eq!(transport.request(2).uri, "http://host/svc/Products(2)");
}

#[test]
fn test_delete_entry() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(204, ""));
    let client = client(ProtocolVersion::V4, &transport);

    client
        .delete_entry(&Command::collection("Products").key(1).into())
        .unwrap();

    let request = transport.request(0);
    assert_eq!(request.method, Method::Delete);
    assert_eq!(request.uri, "http://host/svc/Products(1)");
    assert_eq!(request.header("If-Match"), Some("*"));
}

#[test]
fn test_v3_link_posts_to_links_segment() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(204, ""));
    let client = client(ProtocolVersion::V3, &transport);

    client
        .link_entry(
            &Command::collection("Categories").key(1).into(),
            "products",
            &Command::collection("Products").key(7).into(),
        )
        .unwrap();

    let request = transport.request(0);
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.uri, "http://host/svc/Categories(1)/$links/Products");
    assert_eq!(request.body.as_deref(), Some(r#"{"uri":"http://host/svc/Products(7)"}"#));
}

#[test]
fn test_v4_unlink_addresses_member_by_id() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(204, ""));
    let client = client(ProtocolVersion::V4, &transport);

    let member: Target = Command::collection("Products").key(7).into();
    client
        .unlink_entry(&Command::collection("Categories").key(1).into(), "Products", Some(&member))
        .unwrap();

    let request = transport.request(0);
    assert_eq!(request.method, Method::Delete);
    assert_eq!(
        request.uri,
        "http://host/svc/Categories(1)/Products/$ref?$id=http%3A%2F%2Fhost%2Fsvc%2FProducts%287%29"
    );
}

// ============================================================================
// Operations
// ============================================================================

#[test]
fn test_execute_function() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(200, r#"{"value": 5}"#));
    let client = client(ProtocolVersion::V4, &transport);

    let command = Command::unbound_function("GetProductsByRating", vec![("rating".to_string(), Value::Int32(3))]);
    let result = client.execute_function(&command).unwrap();

    assert_eq!(result, ResponseNode::Value(Value::Int32(5)));
    assert_eq!(transport.request(0).uri, "http://host/svc/GetProductsByRating(rating=3)");
}

#[test]
fn test_execute_function_requires_a_function() {
    let transport = ScriptedTransport::default();
    let client = client(ProtocolVersion::V4, &transport);

    let err = client.execute_function(&Command::collection("Products")).unwrap_err();
    assert!(matches!(err, ClientError::Format(FormatError::MalformedCommand(_))));
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn test_execute_action_posts_arguments() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(204, ""));
    let client = client(ProtocolVersion::V4, &transport);

    let result = client
        .execute_action(&Command::unbound_action("ResetDataSource"), &Record::new())
        .unwrap();
    assert!(result.is_none());

    let request = transport.request(0);
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.uri, "http://host/svc/ResetDataSource");
    assert_eq!(request.body.as_deref(), Some("{}"));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_error_status_is_remote_operation() {
    let transport = ScriptedTransport::default().respond(HttpResponse::new(500, "boom"));
    let client = client(ProtocolVersion::V4, &transport);

    let err = client.find_entries(&Command::collection("Products")).unwrap_err();
    match err {
        ClientError::RemoteOperation { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_transport_fault_is_propagated() {
    let transport = ScriptedTransport::default().fail("connection refused");
    let client = client(ProtocolVersion::V4, &transport);

    let err = client.find_entries(&Command::collection("Products")).unwrap_err();
    assert!(matches!(err, ClientError::TransportFault(TransportFault(ref m)) if m == "connection refused"));
}

// ============================================================================
// Batches
// ============================================================================

fn batch_response(parts: &[(&str, &str)]) -> HttpResponse {
    let mut body = String::new();
    for (status, content) in parts {
        body.push_str(&format!(
            "--batchresponse_1\r\nContent-Type: application/http\r\n\r\nHTTP/1.1 {}\r\n\r\n{}\r\n",
            status, content
        ));
    }
    body.push_str("--batchresponse_1--\r\n");
    HttpResponse::new(200, body).with_header("Content-Type", "multipart/mixed; boundary=batchresponse_1")
}

#[test]
fn test_execute_batch() {
    let transport = ScriptedTransport::default().respond(batch_response(&[
        ("200 OK", r#"{"value": [{"ProductID": 1}]}"#),
        ("200 OK", r#"{"value": []}"#),
    ]));
    let client = client(ProtocolVersion::V4, &transport);

    let mut batch = client.batch();
    batch.get(&Command::collection("Products")).unwrap();
    batch.get(&Command::collection("Categories")).unwrap();
    let responses = client.execute_batch(batch).unwrap();

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].status, 200);

    let request = transport.request(0);
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.uri, "http://host/svc/$batch");
    assert!(request
        .header("Content-Type")
        .is_some_and(|ct| ct.starts_with("multipart/mixed; boundary=batch_")));
    assert!(request
        .body
        .as_deref()
        .is_some_and(|body| body.contains("GET http://host/svc/Products HTTP/1.1")));
}

#[test]
fn test_batch_part_failure_is_remote_operation() {
    let transport = ScriptedTransport::default().respond(batch_response(&[("404 Not Found", "missing")]));
    let client = client(ProtocolVersion::V4, &transport);

    let mut batch = client.batch();
    batch.get(&Command::collection("Products").key(99)).unwrap();
    let err = client.execute_batch(batch).unwrap_err();

    assert!(matches!(err, ClientError::RemoteOperation { status: 404, .. }));
}

#[test]
fn test_empty_batch_sends_nothing() {
    let transport = ScriptedTransport::default();
    let client = client(ProtocolVersion::V4, &transport);

    let responses = client.execute_batch(client.batch()).unwrap();
    assert!(responses.is_empty());
    assert_eq!(transport.request_count(), 0);
}
