//! Quant Gateway: Entry Point
//!
//! Loads configuration, wires the services, spawns the background loops and
//! the HTTP API, then waits for SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use quant_gateway::alerts::{AlertFeed, AlertProcessor, AnomalyFeed, JsonFeed};
use quant_gateway::brokers::BrokerService;
use quant_gateway::config::Config;
use quant_gateway::db::{pool, MemoryStore, PgStore, Store};
use quant_gateway::events::bus::EventBus;
use quant_gateway::feeds::PolygonClient;
use quant_gateway::logging;
use quant_gateway::settings::{SecretCipher, SettingsService};
use quant_gateway::sidecar::AnalyticsClient;
use quant_gateway::strategy::StrategyService;
use quant_gateway::sync;
use quant_gateway::telegram;
use quant_gateway::web::server::{AppState, WebServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if missing)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    logging::structured::init_logging(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        sync_enabled = config.sync.enabled,
        web_enabled = config.web.enabled,
        "quant-gateway starting"
    );

    let store: Arc<dyn Store> = if config.database.url.is_empty() {
        warn!("no database url configured, using the in-process store");
        Arc::new(MemoryStore::new())
    } else {
        let db_pool = pool::create_pool(&config.database.url, config.database.max_connections).await?;
        pool::run_migrations(&db_pool).await?;
        info!("database connected and migrations applied");
        Arc::new(PgStore::new(db_pool))
    };

    let event_bus = Arc::new(EventBus::new(1024));

    let polygon = PolygonClient::new(&config.polygon)?;
    if !polygon.has_api_key() {
        warn!("POLYGON_API_KEY not set, market data requests will fail");
    }
    let analytics = AnalyticsClient::new(&config.analytics)?;
    let batch_concurrency = config.polygon.batch_concurrency;

    let cipher = SecretCipher::from_config(&config.database)?;
    let settings = Arc::new(SettingsService::new(store.clone(), cipher));
    let brokers = Arc::new(BrokerService::new(
        &config.brokers,
        settings.clone(),
        polygon.clone(),
        event_bus.clone(),
    )?);
    let strategies = Arc::new(StrategyService::new(
        store.clone(),
        analytics.clone(),
        polygon.clone(),
        event_bus.clone(),
        batch_concurrency,
    ));
    let processor = Arc::new(AlertProcessor::new(
        store.clone(),
        event_bus.clone(),
        config.sync.notify_batch_limit,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    if config.sync.enabled {
        handles.push(tokio::spawn(sync::run_strategy_loop(
            strategies.clone(),
            Duration::from_secs(config.sync.strategy_interval_secs),
            shutdown_rx.clone(),
        )));

        let mut feeds: Vec<(Arc<dyn AlertFeed>, u64)> = Vec::new();
        for source in &config.sync.feeds {
            let feed: Arc<dyn AlertFeed> = Arc::new(JsonFeed::new(
                source.kind,
                source.url.clone(),
                config.polygon.timeout(),
            )?);
            feeds.push((feed, source.interval_secs));
        }
        let anomaly = &config.sync.anomaly;
        if !anomaly.symbols.is_empty() {
            let feed: Arc<dyn AlertFeed> = Arc::new(AnomalyFeed::new(
                polygon.clone(),
                anomaly.symbols.clone(),
                anomaly.threshold_pct,
                batch_concurrency,
            ));
            feeds.push((feed, anomaly.interval_secs));
        }

        handles.push(tokio::spawn(sync::run_notification_loop(
            processor.clone(),
            Duration::from_secs(config.sync.notify_interval_secs),
            shutdown_rx.clone(),
        )));

        for (feed, every) in feeds {
            handles.push(tokio::spawn(sync::run_feed_loop(
                processor.clone(),
                feed,
                Duration::from_secs(every),
                shutdown_rx.clone(),
            )));
        }
    } else {
        info!("background sync disabled");
    }

    // Spawn Telegram forwarder (if configured)
    if config.telegram.bot_token.is_some() {
        let tg = telegram::bot::TelegramBot::new(
            config.telegram.clone(),
            event_bus.subscribe(),
            shutdown_rx.clone(),
        )?;
        handles.push(tokio::spawn(async move {
            if let Err(e) = tg.run().await {
                error!(error = %e, "telegram forwarder error");
            }
        }));
    }

    // Spawn HTTP API (if enabled)
    if config.web.enabled {
        let state = AppState {
            polygon: polygon.clone(),
            analytics: analytics.clone(),
            strategies: strategies.clone(),
            settings: settings.clone(),
            brokers: brokers.clone(),
            store: store.clone(),
            batch_concurrency,
        };
        let web_server = WebServer::new(config.web.clone(), state);
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = web_server.start(rx).await {
                error!(error = %e, "web server error");
            }
        }));
    }

    info!(tasks = handles.len(), "all subsystems started, waiting for shutdown signal");

    wait_for_signal().await?;

    warn!("shutting down");
    let _ = shutdown_tx.send(true);
    for handle in handles {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            warn!("task did not stop within 5s");
        }
    }

    info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = signal::ctrl_c() => { res?; info!("received SIGINT"); }
        _ = sigterm.recv() => { info!("received SIGTERM"); }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<()> {
    signal::ctrl_c().await?;
    info!("received SIGINT");
    Ok(())
}
