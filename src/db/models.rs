//! Database row types for all tables.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::strategy::iron_condor::{AnalyticsSnapshot, IronCondorLegs};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct StrategyRecord {
    pub id: i64,
    pub user_id: String,
    pub symbol: String,
    pub strategy_type: String,
    pub expiration_date: NaiveDate,
    pub long_call_strike: f64,
    pub short_call_strike: f64,
    pub short_put_strike: f64,
    pub long_put_strike: f64,
    pub contracts: i32,
    pub entry_credit: Option<f64>,
    pub status: String,
    pub analytics: Option<Json<AnalyticsSnapshot>>,
    pub analytics_source: String,
    pub current_price: Option<f64>,
    pub current_pnl: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StrategyRecord {
    pub fn legs(&self) -> IronCondorLegs {
        IronCondorLegs {
            long_put: self.long_put_strike,
            short_put: self.short_put_strike,
            short_call: self.short_call_strike,
            long_call: self.long_call_strike,
        }
    }

    pub fn set_legs(&mut self, legs: IronCondorLegs) {
        self.long_put_strike = legs.long_put;
        self.short_put_strike = legs.short_put;
        self.short_call_strike = legs.short_call;
        self.long_call_strike = legs.long_call;
    }

    pub fn analytics(&self) -> Option<&AnalyticsSnapshot> {
        self.analytics.as_ref().map(|a| &a.0)
    }
}

/// Insert shape for `strategies`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStrategy {
    pub user_id: String,
    pub symbol: String,
    pub strategy_type: String,
    pub expiration_date: NaiveDate,
    pub legs: IronCondorLegs,
    pub contracts: i32,
    pub entry_credit: Option<f64>,
    pub analytics: Option<AnalyticsSnapshot>,
    pub analytics_source: String,
}

/// One `(user, provider)` row. `secrets` values are sealed by `SecretCipher`.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct SettingsRow {
    pub user_id: String,
    pub provider: String,
    pub fields: Json<BTreeMap<String, String>>,
    pub secrets: Json<BTreeMap<String, String>>,
    pub status: String,
    pub last_error: Option<String>,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AlertRecord {
    pub id: i64,
    pub kind: String,
    pub external_id: String,
    pub title: String,
    pub message: String,
    pub severity: String,
    pub payload: Json<serde_json::Value>,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}
