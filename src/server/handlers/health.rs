use axum::http::StatusCode;

/// Liveness probe; does not touch the replay store or the payload handler.
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}
