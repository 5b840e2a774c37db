use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use super::pipeline::{ReceiverPipeline, Rejection};

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Collaborator failures are not described to the caller.
        let message = if status.is_server_error() {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string()
        } else {
            self.to_string()
        };

        (status, message).into_response()
    }
}

/// Webhook ingestion handler.
///
/// # Request
///
/// - Method: POST
/// - Required headers:
///   - `Authorization`: `Bearer <token>`
///   - `X-Signature`: `sha256=<hex>` (when the receiver has a secret)
///   - `X-Timestamp`: epoch milliseconds (when the receiver has a secret)
/// - Body: JSON payload, at most 5 MiB by default
///
/// # Response
///
/// - 200 OK: payload dispatched
/// - 400 Bad Request: body is not JSON
/// - 401 Unauthorized: token, signature, freshness or replay check failed
/// - 413 Payload Too Large: body over the size limit
pub async fn webhook_handler(
    State(pipeline): State<Arc<ReceiverPipeline>>,
    headers: HeaderMap,
    body: Body,
) -> Result<StatusCode, Rejection> {
    pipeline.process(&headers, body).await?;
    Ok(StatusCode::OK)
}
