//! Process-local store, used when no database URL is configured.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use sqlx::types::Json;

use super::models::{AlertRecord, NewStrategy, SettingsRow, StrategyRecord};
use super::store::Store;
use crate::alerts::{AlertKind, NewAlert};
use crate::error::{GatewayError, Result};

#[derive(Default)]
struct Tables {
    next_strategy_id: i64,
    strategies: BTreeMap<i64, StrategyRecord>,
    next_alert_id: i64,
    alerts: BTreeMap<i64, AlertRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    settings: DashMap<(String, String), SettingsRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_strategy(&self, s: &NewStrategy) -> Result<StrategyRecord> {
        let mut tables = self.tables.lock();
        tables.next_strategy_id += 1;
        let now = Utc::now();
        let record = StrategyRecord {
            id: tables.next_strategy_id,
            user_id: s.user_id.clone(),
            symbol: s.symbol.clone(),
            strategy_type: s.strategy_type.clone(),
            expiration_date: s.expiration_date,
            long_call_strike: s.legs.long_call,
            short_call_strike: s.legs.short_call,
            short_put_strike: s.legs.short_put,
            long_put_strike: s.legs.long_put,
            contracts: s.contracts,
            entry_credit: s.entry_credit,
            status: "open".into(),
            analytics: s.analytics.clone().map(Json),
            analytics_source: s.analytics_source.clone(),
            current_price: None,
            current_pnl: None,
            created_at: now,
            updated_at: now,
        };
        tables.strategies.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_strategy(&self, s: &StrategyRecord) -> Result<StrategyRecord> {
        let mut tables = self.tables.lock();
        let existing = tables
            .strategies
            .get_mut(&s.id)
            .filter(|r| r.user_id == s.user_id)
            .ok_or_else(|| GatewayError::NotFound(format!("Strategy {}", s.id)))?;
        existing.symbol = s.symbol.clone();
        existing.expiration_date = s.expiration_date;
        existing.set_legs(s.legs());
        existing.contracts = s.contracts;
        existing.entry_credit = s.entry_credit;
        existing.analytics = s.analytics.clone();
        existing.analytics_source = s.analytics_source.clone();
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn get_strategy(&self, user_id: &str, id: i64) -> Result<Option<StrategyRecord>> {
        Ok(self
            .tables
            .lock()
            .strategies
            .get(&id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }

    async fn set_strategy_status(
        &self,
        user_id: &str,
        id: i64,
        status: &str,
    ) -> Result<Option<StrategyRecord>> {
        let mut tables = self.tables.lock();
        Ok(tables
            .strategies
            .get_mut(&id)
            .filter(|r| r.user_id == user_id)
            .map(|r| {
                r.status = status.to_string();
                r.updated_at = Utc::now();
                r.clone()
            }))
    }

    async fn mark_strategy(&self, id: i64, price: f64, pnl: f64) -> Result<Option<StrategyRecord>> {
        let mut tables = self.tables.lock();
        Ok(tables.strategies.get_mut(&id).map(|r| {
            r.current_price = Some(price);
            r.current_pnl = Some(pnl);
            r.updated_at = Utc::now();
            r.clone()
        }))
    }

    async fn list_strategies(&self, user_id: &str) -> Result<Vec<StrategyRecord>> {
        let tables = self.tables.lock();
        let mut rows: Vec<_> = tables
            .strategies
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn open_strategies(&self) -> Result<Vec<StrategyRecord>> {
        let tables = self.tables.lock();
        Ok(tables
            .strategies
            .values()
            .filter(|s| s.status == "open")
            .cloned()
            .collect())
    }

    async fn save_settings(&self, row: &SettingsRow) -> Result<SettingsRow> {
        let mut saved = row.clone();
        saved.updated_at = Utc::now();
        self.settings
            .insert((row.user_id.clone(), row.provider.clone()), saved.clone());
        Ok(saved)
    }

    async fn load_settings(&self, user_id: &str, provider: &str) -> Result<Option<SettingsRow>> {
        Ok(self
            .settings
            .get(&(user_id.to_string(), provider.to_string()))
            .map(|r| r.value().clone()))
    }

    async fn set_connection_status(
        &self,
        user_id: &str,
        provider: &str,
        status: &str,
        last_error: Option<&str>,
    ) -> Result<bool> {
        match self
            .settings
            .get_mut(&(user_id.to_string(), provider.to_string()))
        {
            Some(mut row) => {
                let now = Utc::now();
                row.status = status.to_string();
                row.last_error = last_error.map(str::to_string);
                row.last_tested_at = Some(now);
                row.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn append_alert(&self, a: &NewAlert) -> Result<Option<AlertRecord>> {
        let mut tables = self.tables.lock();
        if tables.alerts.values().any(|r| r.external_id == a.external_id) {
            return Ok(None);
        }
        tables.next_alert_id += 1;
        let record = AlertRecord {
            id: tables.next_alert_id,
            kind: a.kind.as_str().to_string(),
            external_id: a.external_id.clone(),
            title: a.title.clone(),
            message: a.message.clone(),
            severity: a.severity.as_str().to_string(),
            payload: Json(a.payload.clone()),
            notified: false,
            created_at: Utc::now(),
            notified_at: None,
        };
        tables.alerts.insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn pending_alerts(&self, limit: i64) -> Result<Vec<AlertRecord>> {
        let tables = self.tables.lock();
        Ok(tables
            .alerts
            .values()
            .filter(|r| !r.notified)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_alert_notified(&self, id: i64) -> Result<bool> {
        let mut tables = self.tables.lock();
        match tables.alerts.get_mut(&id) {
            Some(row) if !row.notified => {
                row.notified = true;
                row.notified_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn recent_alerts(&self, kind: Option<AlertKind>, limit: i64) -> Result<Vec<AlertRecord>> {
        let tables = self.tables.lock();
        Ok(tables
            .alerts
            .values()
            .rev()
            .filter(|r| kind.map_or(true, |k| r.kind == k.as_str()))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Severity;
    use serde_json::json;

    fn alert(external_id: &str) -> NewAlert {
        NewAlert {
            kind: AlertKind::Anomaly,
            external_id: external_id.into(),
            title: "TSLA moved 5.2%".into(),
            message: "Previous session close moved 5.2%".into(),
            severity: Severity::Warning,
            payload: json!({"symbol": "TSLA"}),
        }
    }

    #[tokio::test]
    async fn duplicate_external_id_is_a_no_op() {
        let store = MemoryStore::new();
        assert!(store.append_alert(&alert("a-1")).await.unwrap().is_some());
        assert!(store.append_alert(&alert("a-1")).await.unwrap().is_none());
        assert_eq!(store.pending_alerts(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn notified_flag_flips_once() {
        let store = MemoryStore::new();
        let row = store.append_alert(&alert("a-2")).await.unwrap().unwrap();
        assert!(store.mark_alert_notified(row.id).await.unwrap());
        assert!(!store.mark_alert_notified(row.id).await.unwrap());
        assert!(store.pending_alerts(10).await.unwrap().is_empty());
    }

    fn strategy(user_id: &str) -> NewStrategy {
        NewStrategy {
            user_id: user_id.into(),
            symbol: "SPY".into(),
            strategy_type: "iron_condor".into(),
            expiration_date: chrono::NaiveDate::from_ymd_opt(2030, 1, 18).unwrap(),
            legs: crate::strategy::iron_condor::IronCondorLegs {
                long_put: 470.0,
                short_put: 480.0,
                short_call: 520.0,
                long_call: 530.0,
            },
            contracts: 1,
            entry_credit: Some(250.0),
            analytics: None,
            analytics_source: "basic".into(),
        }
    }

    #[tokio::test]
    async fn strategies_are_scoped_to_their_owner() {
        let store = MemoryStore::new();
        let row = store.insert_strategy(&strategy("u1")).await.unwrap();

        assert!(store.get_strategy("u1", row.id).await.unwrap().is_some());
        assert!(store.get_strategy("u2", row.id).await.unwrap().is_none());
        assert!(store
            .set_strategy_status("u2", row.id, "closed")
            .await
            .unwrap()
            .is_none());

        let mut foreign = row.clone();
        foreign.user_id = "u2".into();
        assert!(matches!(
            store.update_strategy(&foreign).await,
            Err(GatewayError::NotFound(_))
        ));
        assert_eq!(store.open_strategies().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn marks_and_edits_leave_status_alone() {
        let store = MemoryStore::new();
        let row = store.insert_strategy(&strategy("u1")).await.unwrap();
        let stale = row.clone();

        store.set_strategy_status("u1", row.id, "closed").await.unwrap();
        let marked = store.mark_strategy(row.id, 501.0, 80.0).await.unwrap().unwrap();
        assert_eq!(marked.status, "closed");
        assert_eq!(marked.current_price, Some(501.0));

        // An edit built from a copy read before the close.
        let mut edit = stale;
        edit.contracts = 3;
        let saved = store.update_strategy(&edit).await.unwrap();
        assert_eq!(saved.status, "closed");
        assert_eq!(saved.contracts, 3);
        assert_eq!(saved.current_pnl, Some(80.0));
    }

    #[tokio::test]
    async fn status_update_requires_existing_row() {
        let store = MemoryStore::new();
        assert!(!store
            .set_connection_status("u1", "ibkr", "connected", None)
            .await
            .unwrap());
    }
}
