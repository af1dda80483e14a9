//! Periodic background jobs: alert feeds and open-strategy sync.
//!
//! Each job owns a fixed interval. A failed tick is logged and the next
//! tick runs as scheduled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::alerts::{AlertFeed, AlertProcessor};
use crate::strategy::service::StrategyService;

/// Sync open strategies every `every` until `shutdown` flips.
pub async fn run_strategy_loop(
    service: Arc<StrategyService>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = every.as_secs(), "strategy sync loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = service.sync_open_strategies().await {
                    error!(error = %e, "strategy sync tick failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("strategy sync loop stopped");
}

/// Poll one alert feed every `every` until `shutdown` flips.
pub async fn run_feed_loop(
    processor: Arc<AlertProcessor>,
    feed: Arc<dyn AlertFeed>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(feed = feed.name(), kind = %feed.kind(), interval_secs = every.as_secs(), "alert feed loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = processor.run_feed(feed.as_ref()).await {
                    error!(feed = feed.name(), error = %e, "alert feed tick failed");
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!(feed = feed.name(), "alert feed loop stopped");
}

/// Notify pending alerts every `every`, whichever job appended them.
pub async fn run_notification_loop(
    processor: Arc<AlertProcessor>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match processor.process_pending().await {
                    Ok(0) => {}
                    Ok(n) => info!(notified = n, "pending alerts notified"),
                    Err(e) => error!(error = %e, "notification pass failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("notification loop stopped");
}
