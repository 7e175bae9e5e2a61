//! HTTP surface of docsync: the GitHub webhook receiver, the owner-facing
//! webhook management API, `/api/health` and the `/ws` live feed.

pub mod api;
pub mod ws;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use docsync_core::config::AppConfig;
use docsync_core::db::Database;
use docsync_core::lifecycle::WebhookLifecycle;
use docsync_core::sync::WebhookIngestor;

/// Live feed messages buffered per subscriber before it counts as lagging.
const LIVE_FEED_CAPACITY: usize = 256;

/// Everything a handler can reach.
pub struct AppState {
    pub db: Arc<Database>,
    pub config: AppConfig,
    pub ingestor: Arc<WebhookIngestor>,
    pub lifecycle: WebhookLifecycle,
    /// Finished webhook events, fanned out to `/ws` subscribers.
    pub ws_broadcast: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: Arc<Database>,
        ingestor: Arc<WebhookIngestor>,
        lifecycle: WebhookLifecycle,
    ) -> Self {
        Self {
            db,
            config,
            ingestor,
            lifecycle,
            ws_broadcast: broadcast::channel(LIVE_FEED_CAPACITY).0,
        }
    }
}

/// Build the full application router, body limit and tracing included.
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.server.max_body_bytes);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    api::status::routes()
        .merge(api::webhooks::routes())
        .merge(api::manage::routes())
        .merge(ws::routes())
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `listen` and serve until `shutdown` completes, then let in-flight
/// requests finish.
pub async fn serve<F>(state: AppState, listen: &str, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address {listen:?}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, "accepting webhook deliveries");
    axum::serve(listener, router(Arc::new(state)))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
