//! Client tests against a stub HTTP server.

use super::*;
use serde_json::json;
use test_utils::HttpStub;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn users_stub() -> HttpStub {
    let stub = HttpStub::start().unwrap();
    stub.mount(
        Mock::given(method("GET"))
            .and(path("/api/users/42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "name": "Wraith", "roles": ["admin"] })),
            ),
    );
    stub
}

#[test]
fn test_get_passes_when_expectations_hold() {
    let stub = users_stub();
    let client = SpektrTestClient::new(stub.uri(), "/api/users").unwrap();

    let result = client
        .get("/42", |spec| {
            spec.expect(|e| {
                e.has_ok_status();
                e.json_path("$.name").value_equals("Wraith");
                e.json_path("$.roles").is_not_empty();
            })
        })
        .unwrap();

    assert_eq!(result.status(), 200);
    assert_eq!(result.json().unwrap()["name"], "Wraith");
}

#[test]
fn test_failed_expectations_are_all_reported() {
    let stub = users_stub();
    let client = SpektrTestClient::new(stub.uri(), "/api/users").unwrap();

    let error = client
        .get("/42", |spec| {
            spec.expect(|e| {
                e.has_created_status();
                e.json_path("$.name").value_equals("Banshee");
            })
        })
        .unwrap_err();

    match &error {
        ClientError::ExpectationFailed {
            method,
            url,
            status,
            failures,
            body,
        } => {
            assert_eq!(method, "GET");
            assert_eq!(url, &format!("{}/api/users/42", stub.uri()));
            assert_eq!(*status, 200);
            assert_eq!(failures.len(), 2);
            assert!(body.contains("Wraith"));
        }
        other => panic!("Expected ExpectationFailed, got {other:?}"),
    }
    assert!(error.to_string().contains("failed 2 expectation(s)"));
}

#[test]
fn test_post_sends_json_body_with_content_type() {
    let stub = HttpStub::start().unwrap();
    stub.mount(
        Mock::given(method("POST"))
            .and(path("/api/users"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({ "name": "Specter" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 7 }))),
    );
    let client = SpektrTestClient::new(stub.uri(), "/api/users").unwrap();

    let result = client
        .post("", Some(&json!({ "name": "Specter" })), |spec| {
            spec.expect(|e| {
                e.has_created_status();
                e.json_path("$.id").value_equals(7);
            })
        })
        .unwrap();

    assert_eq!(result.status(), 201);
}

#[test]
fn test_put_without_body_still_declares_json() {
    let stub = HttpStub::start().unwrap();
    stub.mount(
        Mock::given(method("PUT"))
            .and(path("/api/users/42/lock"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(204)),
    );
    let client = SpektrTestClient::new(stub.uri(), "/api/users").unwrap();

    let result = client.put("/42/lock", None, |spec| {
        spec.expect(|e| {
            e.has_no_content_status();
        })
    });

    assert!(result.is_ok());
}

#[test]
fn test_delete_with_explicit_status() {
    let stub = HttpStub::start().unwrap();
    stub.mount(
        Mock::given(method("DELETE"))
            .and(path("/api/users/42"))
            .respond_with(ResponseTemplate::new(202)),
    );
    let client = spektr_client(format!("{}/", stub.uri()), "/api/users").unwrap();

    let result = client
        .delete("/42", |spec| {
            spec.expect(|e| {
                e.has_status(202);
            })
        })
        .unwrap();

    assert_eq!(result.body(), "");
    assert_eq!(client.base_url(), stub.uri());
}

#[test]
fn test_no_expectations_accept_any_response() {
    let stub = HttpStub::start().unwrap();
    let client = SpektrTestClient::new(stub.uri(), "").unwrap();

    let result = client.get("/unmatched", |_| {}).unwrap();

    assert_eq!(result.status(), 404);
}

#[test]
fn test_transport_failure_is_a_request_error() {
    let port = test_utils::unused_port().unwrap();
    let client = SpektrTestClient::new(format!("http://127.0.0.1:{port}"), "/api").unwrap();

    let result = client.get("/users", |_| {});

    assert!(matches!(
        result,
        Err(ClientError::Request { ref method, .. }) if method == "GET"
    ));
}
