//! Persistence seam shared by the Postgres and in-process backends.

use async_trait::async_trait;
use sqlx::PgPool;

use super::models::{AlertRecord, NewStrategy, SettingsRow, StrategyRecord};
use super::{pool, queries};
use crate::alerts::{AlertKind, NewAlert};
use crate::error::{GatewayError, Result};

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_strategy(&self, strategy: &NewStrategy) -> Result<StrategyRecord>;

    /// Overwrite the user-editable columns and analytics. Status and the
    /// latest mark are left alone. Ids the owner does not hold are `NotFound`.
    async fn update_strategy(&self, strategy: &StrategyRecord) -> Result<StrategyRecord>;

    async fn get_strategy(&self, user_id: &str, id: i64) -> Result<Option<StrategyRecord>>;

    async fn set_strategy_status(
        &self,
        user_id: &str,
        id: i64,
        status: &str,
    ) -> Result<Option<StrategyRecord>>;

    /// Record the latest underlying price and P&L, touching nothing else.
    async fn mark_strategy(&self, id: i64, price: f64, pnl: f64) -> Result<Option<StrategyRecord>>;

    async fn list_strategies(&self, user_id: &str) -> Result<Vec<StrategyRecord>>;

    async fn open_strategies(&self) -> Result<Vec<StrategyRecord>>;

    async fn save_settings(&self, row: &SettingsRow) -> Result<SettingsRow>;

    async fn load_settings(&self, user_id: &str, provider: &str) -> Result<Option<SettingsRow>>;

    /// Returns false when no settings row exists for the pair.
    async fn set_connection_status(
        &self,
        user_id: &str,
        provider: &str,
        status: &str,
        last_error: Option<&str>,
    ) -> Result<bool>;

    /// Returns `None` when the external id was already present.
    async fn append_alert(&self, alert: &NewAlert) -> Result<Option<AlertRecord>>;

    /// Unnotified alerts, oldest first.
    async fn pending_alerts(&self, limit: i64) -> Result<Vec<AlertRecord>>;

    /// Atomically flip `notified`. True only for the caller that flipped it.
    async fn mark_alert_notified(&self, id: i64) -> Result<bool>;

    async fn recent_alerts(&self, kind: Option<AlertKind>, limit: i64) -> Result<Vec<AlertRecord>>;

    /// Fails when the backend cannot serve queries.
    async fn health_check(&self) -> Result<()>;
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_strategy(&self, strategy: &NewStrategy) -> Result<StrategyRecord> {
        queries::insert_strategy(&self.pool, strategy).await
    }

    async fn update_strategy(&self, strategy: &StrategyRecord) -> Result<StrategyRecord> {
        queries::update_strategy(&self.pool, strategy)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("Strategy {}", strategy.id)))
    }

    async fn get_strategy(&self, user_id: &str, id: i64) -> Result<Option<StrategyRecord>> {
        queries::get_strategy(&self.pool, user_id, id).await
    }

    async fn set_strategy_status(
        &self,
        user_id: &str,
        id: i64,
        status: &str,
    ) -> Result<Option<StrategyRecord>> {
        queries::set_strategy_status(&self.pool, user_id, id, status).await
    }

    async fn mark_strategy(&self, id: i64, price: f64, pnl: f64) -> Result<Option<StrategyRecord>> {
        queries::mark_strategy(&self.pool, id, price, pnl).await
    }

    async fn list_strategies(&self, user_id: &str) -> Result<Vec<StrategyRecord>> {
        queries::list_strategies(&self.pool, user_id).await
    }

    async fn open_strategies(&self) -> Result<Vec<StrategyRecord>> {
        queries::open_strategies(&self.pool).await
    }

    async fn save_settings(&self, row: &SettingsRow) -> Result<SettingsRow> {
        queries::upsert_settings(&self.pool, row).await
    }

    async fn load_settings(&self, user_id: &str, provider: &str) -> Result<Option<SettingsRow>> {
        queries::get_settings(&self.pool, user_id, provider).await
    }

    async fn set_connection_status(
        &self,
        user_id: &str,
        provider: &str,
        status: &str,
        last_error: Option<&str>,
    ) -> Result<bool> {
        queries::update_connection_status(&self.pool, user_id, provider, status, last_error).await
    }

    async fn append_alert(&self, alert: &NewAlert) -> Result<Option<AlertRecord>> {
        queries::append_alert(&self.pool, alert).await
    }

    async fn pending_alerts(&self, limit: i64) -> Result<Vec<AlertRecord>> {
        queries::pending_alerts(&self.pool, limit).await
    }

    async fn mark_alert_notified(&self, id: i64) -> Result<bool> {
        queries::mark_alert_notified(&self.pool, id).await
    }

    async fn recent_alerts(&self, kind: Option<AlertKind>, limit: i64) -> Result<Vec<AlertRecord>> {
        queries::recent_alerts(&self.pool, kind.as_ref().map(AlertKind::as_str), limit).await
    }

    async fn health_check(&self) -> Result<()> {
        pool::health_check(&self.pool).await
    }
}
