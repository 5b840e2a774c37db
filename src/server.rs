mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use color_eyre::eyre::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::domain::ports::{PayloadHandler, ReplayStore};
use crate::inbound::webhook::{InMemoryReplayStore, LoggingHandler, ReceiverPipeline, webhook_handler};
use crate::server::handlers::{health::health_check, root::home};

/// Build the application router.
///
/// Serves `GET /`, `GET /health` and `POST {webhook_path}`; the pipeline is the
/// shared state handed to every webhook request.
///
/// # Panics
///
/// If `webhook_path` is not a valid axum route; see [`ReceiverConfig::validate`].
///
/// [`ReceiverConfig::validate`]: crate::config::ReceiverConfig::validate
pub fn build_router(webhook_path: &str, pipeline: Arc<ReceiverPipeline>) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &'_ axum::extract::Request<_>| {
            let uri = request.uri().to_string();
            tracing::info_span!("request", method = %request.method(), uri)
        });

    Router::new()
        .route("/", get(home))
        .route("/health", get(health_check))
        .route(webhook_path, post(webhook_handler))
        .layer(trace_layer)
        .with_state(pipeline)
}

pub struct Server {
    router: Router,
    listener: TcpListener,
    sweeper: Option<JoinHandle<()>>,
}

impl Server {
    /// Creates a new HTTP server whose accepted payloads are logged.
    pub async fn new(config: &Config) -> Result<Self> {
        Self::with_handler(config, Arc::new(LoggingHandler)).await
    }

    /// Creates a new HTTP server dispatching accepted payloads to `handler`.
    ///
    /// Fingerprints are kept in memory and swept every
    /// `receiver.sweep_interval_seconds`.
    pub async fn with_handler(config: &Config, handler: Arc<dyn PayloadHandler>) -> Result<Self> {
        config.receiver.validate()?;

        let replay_store = Arc::new(InMemoryReplayStore::new());
        let sweeper = replay_store.spawn_sweeper(config.receiver.sweep_interval());

        Self::build(config, handler, replay_store, Some(sweeper)).await
    }

    /// Creates a new HTTP server backed by an externally managed replay store.
    ///
    /// Expiry of the store's entries is left to the store itself.
    pub async fn with_store(
        config: &Config,
        handler: Arc<dyn PayloadHandler>,
        replay_store: Arc<dyn ReplayStore>,
    ) -> Result<Self> {
        config.receiver.validate()?;
        Self::build(config, handler, replay_store, None).await
    }

    async fn build(
        config: &Config,
        handler: Arc<dyn PayloadHandler>,
        replay_store: Arc<dyn ReplayStore>,
        sweeper: Option<JoinHandle<()>>,
    ) -> Result<Self> {
        let settings = config.receiver.settings();
        if settings.hmac_secret.is_none() {
            tracing::warn!("No receiver HMAC secret configured; signatures are not verified");
        }

        let pipeline = Arc::new(ReceiverPipeline::new(settings, replay_store, handler));
        let router = build_router(&config.receiver.path, pipeline);

        let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await
            .wrap_err_with(|| format!("Failed to bind to port {}", config.server.port))?;

        Ok(Self {
            router,
            listener,
            sweeper,
        })
    }

    pub fn port(&self) -> Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Runs the HTTP server.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Server listening on {}", self.listener.local_addr()?);
        let served = axum::serve(self.listener, self.router).await;
        if let Some(sweeper) = self.sweeper {
            sweeper.abort();
        }
        served?;
        Ok(())
    }
}
