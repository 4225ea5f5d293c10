#![allow(clippy::unwrap_used)]
// Integration tests for `RecorderClient` using wiremock.

use chrono::Utc;
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pullpoint_api::{Error, RecorderClient, TransportConfig, TriggerPayload};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RecorderClient) {
    let server = MockServer::start().await;
    let endpoint = Url::parse(&format!("{}/api/triggers", server.uri())).unwrap();
    let client = RecorderClient::with_client(reqwest::Client::new(), endpoint);
    (server, client)
}

// ── Delivery ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_trigger_success() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/triggers"))
        .and(body_partial_json(json!({
            "device_id": 3,
            "description": "Person|start",
            "label": "Person",
            "transition": "start"
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let payload = TriggerPayload::new(3, "Person", "start", Utc::now());
    client.send_trigger(&payload).await.unwrap();
}

#[tokio::test]
async fn test_send_trigger_with_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let transport = TransportConfig {
        token: Some("s3cret".to_string().into()),
        ..TransportConfig::default()
    };
    let endpoint = Url::parse(&format!("{}/hook", server.uri())).unwrap();
    let client = RecorderClient::new(endpoint, &transport).unwrap();

    let payload = TriggerPayload::new(9, "motion", "stop", Utc::now());
    client.send_trigger(&payload).await.unwrap();
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_trigger_rejected_with_json_error() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/triggers"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "error": "device 3 not found" })),
        )
        .mount(&server)
        .await;

    let payload = TriggerPayload::new(3, "Vehicle", "start", Utc::now());
    let result = client.send_trigger(&payload).await;

    match result {
        Err(Error::Recorder { status, message }) => {
            assert_eq!(status, 404);
            assert_eq!(message, "device 3 not found");
        }
        other => panic!("expected Recorder error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_send_trigger_server_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/api/triggers"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let payload = TriggerPayload::new(1, "Animal", "stop", Utc::now());
    let err = client.send_trigger(&payload).await.unwrap_err();

    assert!(err.is_transient(), "expected transient error, got: {err:?}");
}
