mod utils;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use signed_webhook::domain::ports::{ReplayStore, ReplayStoreError};
use signed_webhook::outbound::webhook::hmac_signer;
use time::OffsetDateTime;
use utils::{PATH, RecordingHandler, SECRET, TOKEN};

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

fn hmac_test_payload() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "hmac_test",
        "ticket": { "id": 42, "subject": "Printer on fire" }
    }))
    .unwrap()
}

async fn post_signed(
    client: &Client,
    addr: &str,
    body: Vec<u8>,
    timestamp: i64,
    signature: &str,
) -> StatusCode {
    client
        .post(format!("{addr}{PATH}"))
        .header("Content-Type", "application/json")
        .bearer_auth(TOKEN)
        .header("X-Timestamp", timestamp.to_string())
        .header("X-Signature", signature)
        .body(body)
        .send()
        .await
        .expect("Failed to execute request.")
        .status()
}

#[tokio::test]
async fn test_signed_delivery_is_dispatched() {
    let handler = Arc::new(RecordingHandler::default());
    let addr = utils::spawn_server_with(&[], handler.clone()).await;
    let client = Client::new();

    let body = hmac_test_payload();
    let ts = now_millis();
    let signature = hmac_signer::sign(SECRET.as_bytes(), ts, &body);

    let status = post_signed(&client, &addr, body, ts, &signature).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(handler.count(), 1);
    assert_eq!(handler.received.lock().unwrap()[0]["event"], "hmac_test");
}

#[tokio::test]
async fn test_wrong_secret_is_rejected() {
    let handler = Arc::new(RecordingHandler::default());
    let addr = utils::spawn_server_with(&[], handler.clone()).await;
    let client = Client::new();

    let body = hmac_test_payload();
    let ts = now_millis();
    let signature = hmac_signer::sign(b"wrongsecret", ts, &body);

    let status = post_signed(&client, &addr, body, ts, &signature).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(handler.count(), 0);
}

#[tokio::test]
async fn test_resent_request_is_a_replay() {
    let handler = Arc::new(RecordingHandler::default());
    let addr = utils::spawn_server_with(&[], handler.clone()).await;
    let client = Client::new();

    let body = hmac_test_payload();
    let ts = now_millis();
    let signature = hmac_signer::sign(SECRET.as_bytes(), ts, &body);

    let first = post_signed(&client, &addr, body.clone(), ts, &signature).await;
    let second = post_signed(&client, &addr, body, ts, &signature).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::UNAUTHORIZED);
    assert_eq!(handler.count(), 1);
}

#[tokio::test]
async fn test_stale_timestamp_is_rejected() {
    let addr = utils::spawn_server().await;
    let client = Client::new();

    let body = hmac_test_payload();
    let ts = now_millis() - 301_000;
    let signature = hmac_signer::sign(SECRET.as_bytes(), ts, &body);

    let status = post_signed(&client, &addr, body, ts, &signature).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_oversized_body_is_rejected_before_auth() {
    let addr = utils::spawn_server_with(
        &[("receiver.max_body_bytes", "64")],
        Arc::new(RecordingHandler::default()),
    )
    .await;
    let client = Client::new();

    let response = client
        .post(format!("{addr}{PATH}"))
        .header("Content-Type", "application/json")
        .body(vec![b'a'; 74])
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_missing_authorization_is_rejected() {
    let addr = utils::spawn_server().await;
    let client = Client::new();

    let body = hmac_test_payload();
    let ts = now_millis();
    let signature = hmac_signer::sign(SECRET.as_bytes(), ts, &body);

    let response = client
        .post(format!("{addr}{PATH}"))
        .header("X-Timestamp", ts.to_string())
        .header("X-Signature", signature)
        .body(body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_non_json_body_is_bad_request() {
    let addr = utils::spawn_server().await;
    let client = Client::new();

    let body = b"not json".to_vec();
    let ts = now_millis();
    let signature = hmac_signer::sign(SECRET.as_bytes(), ts, &body);

    let status = post_signed(&client, &addr, body, ts, &signature).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unsigned_receiver_accepts_bearer_only() {
    let handler = Arc::new(RecordingHandler::default());
    let addr = utils::spawn_server_with(&[("receiver.hmac_secret", "")], handler.clone()).await;
    let client = Client::new();

    let response = client
        .post(format!("{addr}{PATH}"))
        .bearer_auth(TOKEN)
        .json(&json!({ "event": "ticket.created" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(handler.count(), 1);
}

#[tokio::test]
async fn test_custom_path_and_timestamp_header() {
    let addr = utils::spawn_server_with(
        &[
            ("receiver.path", "/inbound/events"),
            ("receiver.timestamp_header", "X-Webhook-Timestamp"),
        ],
        Arc::new(RecordingHandler::default()),
    )
    .await;
    let client = Client::new();

    let body = hmac_test_payload();
    let ts = now_millis();
    let signature = hmac_signer::sign(SECRET.as_bytes(), ts, &body);

    let response = client
        .post(format!("{addr}/inbound/events"))
        .bearer_auth(TOKEN)
        .header("X-Webhook-Timestamp", ts.to_string())
        .header("X-Signature", signature)
        .body(body)
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status(), StatusCode::OK);
}

/// Replay store that counts lookups and answers from a fixed script
struct ScriptedStore {
    calls: AtomicUsize,
    available: bool,
}

impl ScriptedStore {
    fn new(available: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            available,
        })
    }
}

#[async_trait]
impl ReplayStore for ScriptedStore {
    async fn check_and_insert(
        &self,
        _fingerprint: &str,
        _ttl: Duration,
    ) -> Result<bool, ReplayStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available {
            Ok(true)
        } else {
            Err(ReplayStoreError::Unavailable("cluster down".to_string()))
        }
    }
}

#[tokio::test]
async fn test_injected_replay_store_is_consulted() {
    let store = ScriptedStore::new(true);
    let handler = Arc::new(RecordingHandler::default());
    let addr = utils::spawn_server_with_store(handler.clone(), store.clone()).await;
    let client = Client::new();

    let body = hmac_test_payload();
    let ts = now_millis();
    let signature = hmac_signer::sign(SECRET.as_bytes(), ts, &body);

    let status = post_signed(&client, &addr, body, ts, &signature).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    assert_eq!(handler.count(), 1);
}

#[tokio::test]
async fn test_unavailable_replay_store_is_service_unavailable() {
    let store = ScriptedStore::new(false);
    let handler = Arc::new(RecordingHandler::default());
    let addr = utils::spawn_server_with_store(handler.clone(), store).await;
    let client = Client::new();

    let body = hmac_test_payload();
    let ts = now_millis();
    let signature = hmac_signer::sign(SECRET.as_bytes(), ts, &body);

    let status = post_signed(&client, &addr, body, ts, &signature).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(handler.count(), 0);
}
