//! Sender behavior against a mock HTTP endpoint.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use signed_webhook::outbound::webhook::{
    AttemptOutcome, DeliveryOptions, DeliveryRequest, WebhookSender, hmac_signer,
};

fn fast_sender() -> WebhookSender {
    WebhookSender::new()
        .unwrap()
        .with_backoff_base(Duration::from_millis(10))
}

fn signed_options() -> DeliveryOptions {
    DeliveryOptions::default().with_hmac_secret("testsecret")
}

#[tokio::test]
async fn test_delivery_carries_signed_headers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hooks/tickets"))
        .and(header("authorization", "Bearer s3cr3t-token"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let delivered = fast_sender()
        .deliver(
            &format!("{}/hooks/tickets", server.uri()),
            Some("s3cr3t-token"),
            &json!({ "event": "hmac_test" }),
            &signed_options(),
        )
        .await;

    assert!(delivered);

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let timestamp: i64 = request.headers["x-timestamp"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let signature = request.headers["x-signature"].to_str().unwrap();

    assert!(signature.starts_with("sha256="));
    assert!(hmac_signer::verify(
        b"testsecret",
        timestamp,
        &request.body,
        signature
    ));
}

#[tokio::test]
async fn test_unsigned_delivery_omits_signature_headers() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let delivered = fast_sender()
        .deliver(
            &server.uri(),
            None,
            &json!({ "event": "ping" }),
            &DeliveryOptions::default(),
        )
        .await;

    assert!(delivered);

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("x-signature").is_none());
    assert!(requests[0].headers.get("x-timestamp").is_none());
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_server_error_is_retried_with_the_same_signature() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let request = DeliveryRequest::new(
        server.uri(),
        Some("s3cr3t-token".to_string()),
        &json!({ "event": "ticket.updated" }),
        signed_options(),
    )
    .unwrap();

    let report = fast_sender().deliver_with_report(&request).await;

    assert!(report.delivered);
    assert_eq!(report.attempt_count(), 2);
    assert_eq!(report.attempts[0].outcome, AttemptOutcome::Rejected(500));
    assert_eq!(report.last_outcome(), Some(AttemptOutcome::Success(200)));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].headers["x-signature"], requests[1].headers["x-signature"]);
    assert_eq!(requests[0].headers["x-timestamp"], requests[1].headers["x-timestamp"]);
    assert_eq!(requests[0].body, requests[1].body);
}

#[tokio::test]
async fn test_persistent_failure_exhausts_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let delivered = fast_sender()
        .deliver(
            &server.uri(),
            Some("s3cr3t-token"),
            &json!({ "event": "ticket.deleted" }),
            &signed_options(),
        )
        .await;

    assert!(!delivered);
}

#[tokio::test]
async fn test_slow_endpoint_times_out_each_attempt() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let options = signed_options()
        .with_timeout_ms(100)
        .with_max_attempts(2);
    let request =
        DeliveryRequest::new(server.uri(), None, &json!({ "event": "slow" }), options).unwrap();

    let report = fast_sender().deliver_with_report(&request).await;

    assert!(!report.delivered);
    assert_eq!(report.attempt_count(), 2);
    assert!(
        report
            .attempts
            .iter()
            .all(|a| a.outcome == AttemptOutcome::Timeout)
    );
}

#[tokio::test]
async fn test_unreachable_endpoint_is_not_delivered() {
    let delivered = fast_sender()
        .deliver(
            "http://127.0.0.1:19998/hooks",
            None,
            &json!({ "event": "ping" }),
            &DeliveryOptions::default().with_max_attempts(2),
        )
        .await;

    assert!(!delivered);
}
