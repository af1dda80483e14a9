//! Append feed items and dispatch each unnotified alert exactly once.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use super::feed::AlertFeed;
use crate::db::models::AlertRecord;
use crate::db::Store;
use crate::error::Result;
use crate::events::bus::{EventBus, GatewayEvent};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &AlertRecord) -> anyhow::Result<()>;
}

#[async_trait]
impl Notifier for EventBus {
    async fn notify(&self, alert: &AlertRecord) -> anyhow::Result<()> {
        self.publish(GatewayEvent::AlertRaised {
            alert_id: alert.id,
            kind: alert.kind.clone(),
            severity: alert.severity.clone(),
            title: alert.title.clone(),
            message: alert.message.clone(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    pub fetched: usize,
    pub appended: usize,
    pub notified: usize,
}

pub struct AlertProcessor {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    batch_limit: i64,
}

impl AlertProcessor {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, batch_limit: i64) -> Self {
        Self {
            store,
            notifier,
            batch_limit,
        }
    }

    /// One feed tick: fetch, append new rows, then a notification pass.
    pub async fn run_feed(&self, feed: &dyn AlertFeed) -> Result<TickReport> {
        let items = feed.fetch().await?;
        let mut report = TickReport {
            fetched: items.len(),
            ..Default::default()
        };
        for item in &items {
            if self.store.append_alert(item).await?.is_some() {
                report.appended += 1;
            }
        }
        report.notified = self.process_pending().await?;
        info!(
            feed = feed.name(),
            kind = %feed.kind(),
            fetched = report.fetched,
            appended = report.appended,
            notified = report.notified,
            "alert feed tick"
        );
        Ok(report)
    }

    /// Claim and dispatch pending alerts. A row claimed elsewhere is skipped.
    ///
    /// The flag never rolls back: a failed dispatch is logged, not retried.
    pub async fn process_pending(&self) -> Result<usize> {
        let pending = self.store.pending_alerts(self.batch_limit).await?;
        let mut notified = 0;
        for alert in pending {
            if !self.store.mark_alert_notified(alert.id).await? {
                continue;
            }
            if let Err(e) = self.notifier.notify(&alert).await {
                warn!(alert_id = alert.id, error = %e, "alert dispatch failed");
                continue;
            }
            notified += 1;
        }
        Ok(notified)
    }
}
