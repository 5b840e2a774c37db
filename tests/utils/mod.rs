#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use signed_webhook::domain::ports::{HandlerError, PayloadHandler, ReplayStore};
use signed_webhook::{config::Config, server::Server};

pub const TOKEN: &str = "s3cr3t-token";
pub const SECRET: &str = "testsecret";
pub const PATH: &str = "/hooks/tickets";

/// Payload handler that keeps every payload it receives
#[derive(Default)]
pub struct RecordingHandler {
    pub received: Mutex<Vec<Value>>,
}

impl RecordingHandler {
    pub fn count(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

#[async_trait]
impl PayloadHandler for RecordingHandler {
    async fn handle(&self, payload: Value) -> Result<(), HandlerError> {
        self.received.lock().unwrap().push(payload);
        Ok(())
    }
}

fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("server.host".to_string(), "localhost".to_string()),
        ("server.port".to_string(), "0".to_string()),
        ("receiver.token".to_string(), TOKEN.to_string()),
        ("receiver.hmac_secret".to_string(), SECRET.to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }

    Config::load_with_sources(Some(vars)).unwrap()
}

pub async fn spawn_server() -> String {
    spawn_server_with(&[], Arc::new(RecordingHandler::default())).await
}

pub async fn spawn_server_with(
    overrides: &[(&str, &str)],
    handler: Arc<dyn PayloadHandler>,
) -> String {
    let config = test_config(overrides);

    let server = Server::with_handler(&config, handler).await.unwrap();

    let port = server.port().unwrap();
    tokio::spawn(server.run());

    format!("http://{}:{}", config.server.host, port)
}

pub async fn spawn_server_with_store(
    handler: Arc<dyn PayloadHandler>,
    replay_store: Arc<dyn ReplayStore>,
) -> String {
    let config = test_config(&[]);

    let server = Server::with_store(&config, handler, replay_store)
        .await
        .unwrap();

    let port = server.port().unwrap();
    tokio::spawn(server.run());

    format!("http://{}:{}", config.server.host, port)
}
