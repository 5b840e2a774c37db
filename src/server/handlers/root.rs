pub async fn home() -> &'static str {
    "Signed Webhook Receiver"
}
