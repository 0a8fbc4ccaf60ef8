#![allow(clippy::unwrap_used)]
// Integration tests for `CloudClient` using wiremock.

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use reqwest::Method;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use evsync_api::{CloudClient, Error, RetryPolicy, TransportConfig};

// ── Helpers ─────────────────────────────────────────────────────────

fn fast_transport() -> TransportConfig {
    TransportConfig::default()
        .with_timeout(Duration::from_millis(500))
        .with_retry(RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(10),
            max_delay: Duration::from_secs(5),
        })
}

async fn setup() -> (MockServer, CloudClient) {
    let server = MockServer::start().await;
    let key: SecretString = "test-key".to_string().into();
    let client = CloudClient::from_api_key(&server.uri(), &key, &fast_transport()).unwrap();
    (server, client)
}

fn pairings_body() -> serde_json::Value {
    json!([
        { "deviceId": "dev-1", "tag": "Garage", "ip": "192.168.1.20", "model": "Trydan" },
        { "deviceId": "dev-2", "tag": "Street" }
    ])
}

// ── Success paths ───────────────────────────────────────────────────

#[tokio::test]
async fn test_pairings_sends_api_key() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/pairings/me"))
        .and(header("apikey", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pairings_body()))
        .expect(1)
        .mount(&server)
        .await;

    let pairings = client.get_pairings().await.unwrap();
    assert_eq!(pairings.len(), 2);
    assert_eq!(pairings[0].device_id, "dev-1");
    assert_eq!(pairings[0].ip.as_deref(), Some("192.168.1.20"));
    assert_eq!(pairings[1].tag.as_deref(), Some("Street"));
}

#[tokio::test]
async fn test_plain_text_scalar_body_is_coerced() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/device/intensity"))
        .and(query_param("deviceId", "dev-1"))
        .and(query_param("value", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_string("true"))
        .mount(&server)
        .await;

    let value = client.set_intensity("dev-1", 20).await.unwrap();
    assert_eq!(value, json!(true));
}

#[tokio::test]
async fn test_version_accepts_object_or_scalar() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/version"))
        .and(query_param("deviceId", "dev-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "2.1.7" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .and(query_param("deviceId", "dev-2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("2.0.4"))
        .mount(&server)
        .await;

    assert_eq!(client.get_version("dev-1").await.unwrap(), "2.1.7");
    assert_eq!(client.get_version("dev-2").await.unwrap(), "2.0.4");
}

#[tokio::test]
async fn test_malformed_rfid_payload_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/device/rfid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": true })))
        .mount(&server)
        .await;

    let result = client.get_rfid_cards("dev-1").await;
    assert!(
        matches!(result, Err(Error::Deserialization { .. })),
        "expected Deserialization error, got: {result:?}"
    );
}

// ── Retry classification ────────────────────────────────────────────

#[tokio::test]
async fn test_rate_limit_honours_retry_after_then_succeeds() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/pairings/me"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pairings/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pairings_body()))
        .expect(1)
        .mount(&server)
        .await;

    let started = Instant::now();
    let pairings = client.get_pairings().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(1900));
    assert_eq!(pairings.len(), 2);
}

#[tokio::test]
async fn test_rate_limit_exhausts_attempts() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/pairings/me"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let result = client.get_pairings().await;
    match result {
        Err(Error::RateLimit {
            status, attempts, ..
        }) => {
            assert_eq!(status, 429);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected RateLimit, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/pairings/me"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.get_pairings().await;
    assert!(
        matches!(&result, Err(Error::Auth { message }) if message == "invalid key"),
        "expected Auth error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/device/reported"))
        .respond_with(ResponseTemplate::new(404).set_body_string("device not found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.get_reported("missing").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(!err.is_transient());
    assert!(err.to_string().contains("device not found"));
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/device/reported"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/device/reported"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "reported": { "intensity": 16 } })))
        .expect(1)
        .mount(&server)
        .await;

    let value = client.get_reported("dev-1").await.unwrap();
    assert_eq!(value["reported"]["intensity"], json!(16));
}

#[tokio::test]
async fn test_timeout_retries_then_fails_without_status() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/device/reported"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = client.get_reported("dev-1").await.unwrap_err();
    assert!(
        matches!(err, Error::Request { status: None, .. }),
        "expected status-less Request error, got: {err:?}"
    );
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_connection_refused_is_request_error() {
    let key: SecretString = "test-key".to_string().into();
    let client =
        CloudClient::from_api_key("http://127.0.0.1:1", &key, &fast_transport()).unwrap();

    let err = client
        .request(Method::GET, "pairings/me", &[], None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Request { status: None, .. }));
}

// ── Quota capture ───────────────────────────────────────────────────

#[tokio::test]
async fn test_quota_headers_recorded_on_success_and_failure() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/pairings/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ratelimit-limit", "1000")
                .insert_header("x-ratelimit-remaining", "998")
                .set_body_json(pairings_body()),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/device/reported"))
        .respond_with(ResponseTemplate::new(404).insert_header("x-ratelimit-remaining", "997"))
        .mount(&server)
        .await;

    assert!(client.quota().snapshot().is_none());

    client.get_pairings().await.unwrap();
    let snap = client.quota().snapshot().unwrap();
    assert_eq!(snap.limit, Some(1000));
    assert_eq!(snap.remaining, Some(998));

    let _ = client.get_reported("dev-1").await;
    let snap = client.quota().snapshot().unwrap();
    assert_eq!(snap.limit, Some(1000));
    assert_eq!(snap.remaining, Some(997));
}
