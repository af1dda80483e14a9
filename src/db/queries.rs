//! SQL query functions for all tables.

use sqlx::types::Json;
use sqlx::PgPool;

use super::models::*;
use crate::alerts::NewAlert;
use crate::error::Result;

// ── Strategies ───────────────────────────────────────────────────

pub async fn insert_strategy(pool: &PgPool, s: &NewStrategy) -> Result<StrategyRecord> {
    let row = sqlx::query_as::<_, StrategyRecord>(
        "INSERT INTO strategies (user_id, symbol, strategy_type, expiration_date,
         long_call_strike, short_call_strike, short_put_strike, long_put_strike,
         contracts, entry_credit, analytics, analytics_source)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING *"
    )
    .bind(&s.user_id)
    .bind(&s.symbol)
    .bind(&s.strategy_type)
    .bind(s.expiration_date)
    .bind(s.legs.long_call)
    .bind(s.legs.short_call)
    .bind(s.legs.short_put)
    .bind(s.legs.long_put)
    .bind(s.contracts)
    .bind(s.entry_credit)
    .bind(s.analytics.as_ref().map(Json))
    .bind(&s.analytics_source)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Overwrite the editable columns. Status and the latest mark are untouched.
pub async fn update_strategy(pool: &PgPool, s: &StrategyRecord) -> Result<Option<StrategyRecord>> {
    let row = sqlx::query_as::<_, StrategyRecord>(
        "UPDATE strategies SET symbol = $3, expiration_date = $4,
         long_call_strike = $5, short_call_strike = $6, short_put_strike = $7, long_put_strike = $8,
         contracts = $9, entry_credit = $10, analytics = $11, analytics_source = $12,
         updated_at = now()
         WHERE id = $1 AND user_id = $2
         RETURNING *"
    )
    .bind(s.id)
    .bind(&s.user_id)
    .bind(&s.symbol)
    .bind(s.expiration_date)
    .bind(s.long_call_strike)
    .bind(s.short_call_strike)
    .bind(s.short_put_strike)
    .bind(s.long_put_strike)
    .bind(s.contracts)
    .bind(s.entry_credit)
    .bind(&s.analytics)
    .bind(&s.analytics_source)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_strategy(pool: &PgPool, user_id: &str, id: i64) -> Result<Option<StrategyRecord>> {
    let row = sqlx::query_as::<_, StrategyRecord>(
        "SELECT * FROM strategies WHERE id = $1 AND user_id = $2"
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn set_strategy_status(
    pool: &PgPool,
    user_id: &str,
    id: i64,
    status: &str,
) -> Result<Option<StrategyRecord>> {
    let row = sqlx::query_as::<_, StrategyRecord>(
        "UPDATE strategies SET status = $3, updated_at = now()
         WHERE id = $1 AND user_id = $2
         RETURNING *"
    )
    .bind(id)
    .bind(user_id)
    .bind(status)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn mark_strategy(
    pool: &PgPool,
    id: i64,
    price: f64,
    pnl: f64,
) -> Result<Option<StrategyRecord>> {
    let row = sqlx::query_as::<_, StrategyRecord>(
        "UPDATE strategies SET current_price = $2, current_pnl = $3, updated_at = now()
         WHERE id = $1
         RETURNING *"
    )
    .bind(id)
    .bind(price)
    .bind(pnl)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_strategies(pool: &PgPool, user_id: &str) -> Result<Vec<StrategyRecord>> {
    let rows = sqlx::query_as::<_, StrategyRecord>(
        "SELECT * FROM strategies WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn open_strategies(pool: &PgPool) -> Result<Vec<StrategyRecord>> {
    let rows = sqlx::query_as::<_, StrategyRecord>(
        "SELECT * FROM strategies WHERE status = 'open' ORDER BY id ASC"
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ── Connection settings ──────────────────────────────────────────

pub async fn upsert_settings(pool: &PgPool, s: &SettingsRow) -> Result<SettingsRow> {
    let row = sqlx::query_as::<_, SettingsRow>(
        "INSERT INTO connection_settings (user_id, provider, fields, secrets, status, last_error, last_tested_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (user_id, provider) DO UPDATE SET
           fields = EXCLUDED.fields, secrets = EXCLUDED.secrets, status = EXCLUDED.status,
           last_error = EXCLUDED.last_error, last_tested_at = EXCLUDED.last_tested_at,
           updated_at = now()
         RETURNING *"
    )
    .bind(&s.user_id)
    .bind(&s.provider)
    .bind(&s.fields)
    .bind(&s.secrets)
    .bind(&s.status)
    .bind(&s.last_error)
    .bind(s.last_tested_at)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_settings(
    pool: &PgPool,
    user_id: &str,
    provider: &str,
) -> Result<Option<SettingsRow>> {
    let row = sqlx::query_as::<_, SettingsRow>(
        "SELECT * FROM connection_settings WHERE user_id = $1 AND provider = $2"
    )
    .bind(user_id)
    .bind(provider)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn update_connection_status(
    pool: &PgPool,
    user_id: &str,
    provider: &str,
    status: &str,
    last_error: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE connection_settings SET status = $3, last_error = $4,
         last_tested_at = now(), updated_at = now()
         WHERE user_id = $1 AND provider = $2"
    )
    .bind(user_id)
    .bind(provider)
    .bind(status)
    .bind(last_error)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

// ── Alerts ───────────────────────────────────────────────────────

/// Append unless `external_id` already exists.
pub async fn append_alert(pool: &PgPool, a: &NewAlert) -> Result<Option<AlertRecord>> {
    let row = sqlx::query_as::<_, AlertRecord>(
        "INSERT INTO alerts (kind, external_id, title, message, severity, payload)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (external_id) DO NOTHING
         RETURNING *"
    )
    .bind(a.kind.as_str())
    .bind(&a.external_id)
    .bind(&a.title)
    .bind(&a.message)
    .bind(a.severity.as_str())
    .bind(Json(&a.payload))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn pending_alerts(pool: &PgPool, limit: i64) -> Result<Vec<AlertRecord>> {
    let rows = sqlx::query_as::<_, AlertRecord>(
        "SELECT * FROM alerts WHERE notified = false ORDER BY created_at ASC, id ASC LIMIT $1"
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// One-way `unnotified → notified`. True only for the caller that flipped it.
pub async fn mark_alert_notified(pool: &PgPool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE alerts SET notified = true, notified_at = now() WHERE id = $1 AND notified = false"
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn recent_alerts(
    pool: &PgPool,
    kind: Option<&str>,
    limit: i64,
) -> Result<Vec<AlertRecord>> {
    let rows = sqlx::query_as::<_, AlertRecord>(
        "SELECT * FROM alerts WHERE ($1::text IS NULL OR kind = $1)
         ORDER BY created_at DESC, id DESC LIMIT $2"
    )
    .bind(kind)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
