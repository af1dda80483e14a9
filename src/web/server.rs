//! Axum HTTP API server.

use std::sync::Arc;

use axum::Router;
use tokio::sync::watch;
use tracing::info;

use crate::brokers::BrokerService;
use crate::config::WebConfig;
use crate::db::Store;
use crate::feeds::PolygonClient;
use crate::settings::SettingsService;
use crate::sidecar::AnalyticsClient;
use crate::strategy::service::StrategyService;

use super::routes;

/// Shared state for all web routes.
#[derive(Clone)]
pub struct AppState {
    pub polygon: PolygonClient,
    pub analytics: AnalyticsClient,
    pub strategies: Arc<StrategyService>,
    pub settings: Arc<SettingsService>,
    pub brokers: Arc<BrokerService>,
    pub store: Arc<dyn Store>,
    pub batch_concurrency: Option<usize>,
}

/// The full application router.
pub fn router(state: AppState) -> Router {
    Router::new().merge(routes::api_routes()).with_state(state)
}

pub struct WebServer {
    config: WebConfig,
    state: AppState,
}

impl WebServer {
    pub fn new(config: WebConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Serve until `shutdown` flips.
    pub async fn start(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let app = router(self.state);

        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], self.config.port));
        info!(port = self.config.port, "http api starting");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await?;

        info!("http api stopped");
        Ok(())
    }
}
