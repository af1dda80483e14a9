//! HTTP route handlers.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::alerts::AlertKind;
use crate::brokers::{AuthorizeLink, ConnectionTest};
use crate::db::models::{AlertRecord, StrategyRecord};
use crate::error::{GatewayError, Result};
use crate::fallback::Outcome;
use crate::feeds::polygon::{AggregatesRequest, ChainQuery, ContractsQuery};
use crate::feeds::types::{
    Bar, ContractType, LastQuote, LastTrade, OptionContract, OptionSnapshot, PriceQuote,
    TickerSnapshot, Timespan,
};
use crate::feeds::{fetch_batch_prices, BatchPrices};
use crate::settings::{Provider, SettingsInput, SettingsView};
use crate::sidecar::types::{
    BatchUpdateRequest, BatchUpdateResponse, EquityResponse, GreeksResponse, MarketDataRequest,
    MarketDataResponse, OptimizationRequest, OptimizationResponse, PositionsResponse,
    SidecarHealth,
};
use crate::strategy::iron_condor::{StrategyDraft, StrategyPatch};
use crate::strategy::service::SyncReport;

use super::server::AppState;

const DEFAULT_ALERT_LIMIT: i64 = 50;
const MAX_ALERT_LIMIT: i64 = 500;

/// Build all API routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        // Market data
        .route("/api/quotes/:symbol", get(quote))
        .route("/api/quotes/:symbol/snapshot", get(snapshot))
        .route("/api/quotes/:symbol/last-trade", get(last_trade))
        .route("/api/quotes/:symbol/nbbo", get(nbbo))
        .route("/api/aggregates/:symbol", get(aggregates))
        .route("/api/prices/batch", post(batch_prices))
        .route("/api/options/contracts", get(options_contracts))
        .route("/api/options/chain/:underlying", get(option_chain))
        // Strategies
        .route("/api/strategies", get(list_strategies).post(create_strategy))
        .route("/api/strategies/optimize", post(optimize))
        .route("/api/strategies/sync", post(sync_strategies))
        .route("/api/strategies/:id", get(get_strategy).put(update_strategy))
        .route("/api/strategies/:id/close", post(close_strategy))
        .route("/api/strategies/:id/greeks", get(strategy_greeks))
        // Alerts
        .route("/api/alerts", get(alerts))
        // Connections
        .route(
            "/api/settings/:user_id/:provider",
            get(load_settings).put(save_settings),
        )
        .route("/api/settings/:user_id/:provider/test", post(test_connection))
        .route("/api/oauth/:provider/authorize", get(oauth_authorize))
        .route("/api/oauth/callback", get(oauth_callback))
        // Sidecar passthrough
        .route("/api/sidecar/health", get(sidecar_health))
        .route("/api/sidecar/positions", get(sidecar_positions))
        .route("/api/sidecar/equity", get(sidecar_equity))
        .route("/api/sidecar/market-data", post(sidecar_market_data))
        .route("/api/sidecar/batch-update", post(sidecar_batch_update))
}

/// GET /health: liveness plus whether the store and the sidecar answer.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let (database, sidecar) = tokio::join!(state.store.health_check(), state.analytics.health());
    if let Err(e) = &database {
        warn!(error = %e, "database health check failed");
    }
    Json(json!({
        "status": if database.is_ok() { "ok" } else { "degraded" },
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "database_available": database.is_ok(),
        "analytics_available": sidecar.is_ok(),
        "polygon_configured": state.polygon.has_api_key(),
    }))
}

// ── Market data ──────────────────────────────────────────────────

async fn quote(State(state): State<AppState>, Path(symbol): Path<String>) -> Result<Json<PriceQuote>> {
    Ok(Json(state.polygon.previous_close(&symbol).await?))
}

async fn snapshot(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<TickerSnapshot>> {
    Ok(Json(state.polygon.snapshot(&symbol).await?))
}

async fn last_trade(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<LastTrade>> {
    Ok(Json(state.polygon.last_trade(&symbol).await?))
}

async fn nbbo(State(state): State<AppState>, Path(symbol): Path<String>) -> Result<Json<LastQuote>> {
    Ok(Json(state.polygon.last_quote(&symbol).await?))
}

#[derive(Debug, Deserialize)]
struct AggregatesParams {
    #[serde(default = "one")]
    multiplier: u32,
    #[serde(default = "day")]
    timespan: Timespan,
    from: NaiveDate,
    to: NaiveDate,
}

fn one() -> u32 {
    1
}

fn day() -> Timespan {
    Timespan::Day
}

async fn aggregates(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(p): Query<AggregatesParams>,
) -> Result<Json<Vec<Bar>>> {
    let req = AggregatesRequest {
        symbol,
        multiplier: p.multiplier,
        timespan: p.timespan,
        from: p.from,
        to: p.to,
    };
    Ok(Json(state.polygon.aggregates(&req).await?))
}

#[derive(Debug, Deserialize)]
struct BatchBody {
    #[serde(default)]
    symbols: Vec<String>,
}

/// POST /api/prices/batch: settle-all price fetch.
async fn batch_prices(
    State(state): State<AppState>,
    Json(body): Json<BatchBody>,
) -> Result<Json<BatchPrices>> {
    Ok(Json(
        fetch_batch_prices(&state.polygon, &body.symbols, state.batch_concurrency).await?,
    ))
}

#[derive(Debug, Deserialize)]
struct ContractsParams {
    underlying: String,
    expiration_date: Option<NaiveDate>,
    contract_type: Option<ContractType>,
    limit: Option<u32>,
}

async fn options_contracts(
    State(state): State<AppState>,
    Query(p): Query<ContractsParams>,
) -> Result<Json<Vec<OptionContract>>> {
    let query = ContractsQuery {
        underlying: p.underlying,
        expiration_date: p.expiration_date,
        contract_type: p.contract_type,
        limit: p.limit,
    };
    Ok(Json(state.polygon.options_contracts(&query).await?))
}

#[derive(Debug, Deserialize)]
struct ChainParams {
    expiration_date: Option<NaiveDate>,
    contract_type: Option<ContractType>,
    limit: Option<u32>,
}

async fn option_chain(
    State(state): State<AppState>,
    Path(underlying): Path<String>,
    Query(p): Query<ChainParams>,
) -> Result<Json<Vec<OptionSnapshot>>> {
    let query = ChainQuery {
        expiration_date: p.expiration_date,
        contract_type: p.contract_type,
        limit: p.limit,
    };
    Ok(Json(state.polygon.option_chain(&underlying, &query).await?))
}

// ── Strategies ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UserParams {
    user_id: String,
}

async fn list_strategies(
    State(state): State<AppState>,
    Query(p): Query<UserParams>,
) -> Result<Json<Vec<StrategyRecord>>> {
    Ok(Json(state.strategies.list(&p.user_id).await?))
}

async fn create_strategy(
    State(state): State<AppState>,
    Json(draft): Json<StrategyDraft>,
) -> Result<Json<Outcome<StrategyRecord>>> {
    Ok(Json(state.strategies.create_iron_condor(draft).await?))
}

async fn get_strategy(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(p): Query<UserParams>,
) -> Result<Json<StrategyRecord>> {
    Ok(Json(state.strategies.get(&p.user_id, id).await?))
}

async fn update_strategy(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(p): Query<UserParams>,
    Json(patch): Json<StrategyPatch>,
) -> Result<Json<Outcome<StrategyRecord>>> {
    Ok(Json(state.strategies.update_iron_condor(&p.user_id, id, patch).await?))
}

async fn close_strategy(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(p): Query<UserParams>,
) -> Result<Json<StrategyRecord>> {
    Ok(Json(state.strategies.close(&p.user_id, id).await?))
}

async fn strategy_greeks(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(p): Query<UserParams>,
) -> Result<Json<Outcome<GreeksResponse>>> {
    Ok(Json(state.strategies.position_greeks(&p.user_id, id).await?))
}

async fn optimize(
    State(state): State<AppState>,
    Json(req): Json<OptimizationRequest>,
) -> Result<Json<OptimizationResponse>> {
    Ok(Json(state.strategies.suggest_strikes(&req).await?))
}

/// POST /api/strategies/sync: run one sync pass now.
async fn sync_strategies(State(state): State<AppState>) -> Result<Json<SyncReport>> {
    Ok(Json(state.strategies.sync_open_strategies().await?))
}

// ── Alerts ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AlertParams {
    kind: Option<String>,
    limit: Option<i64>,
}

/// GET /api/alerts: newest first, optionally by kind.
async fn alerts(
    State(state): State<AppState>,
    Query(p): Query<AlertParams>,
) -> Result<Json<Vec<AlertRecord>>> {
    let kind = p
        .kind
        .as_deref()
        .map(str::parse::<AlertKind>)
        .transpose()
        .map_err(GatewayError::Validation)?;
    let limit = p.limit.unwrap_or(DEFAULT_ALERT_LIMIT).clamp(1, MAX_ALERT_LIMIT);
    Ok(Json(state.store.recent_alerts(kind, limit).await?))
}

// ── Connections ──────────────────────────────────────────────────

async fn load_settings(
    State(state): State<AppState>,
    Path((user_id, provider)): Path<(String, String)>,
) -> Result<Json<SettingsView>> {
    let provider: Provider = provider.parse()?;
    Ok(Json(state.settings.load(&user_id, provider).await?))
}

async fn save_settings(
    State(state): State<AppState>,
    Path((user_id, provider)): Path<(String, String)>,
    Json(input): Json<SettingsInput>,
) -> Result<Json<SettingsView>> {
    let provider: Provider = provider.parse()?;
    Ok(Json(state.settings.save(&user_id, provider, input).await?))
}

async fn test_connection(
    State(state): State<AppState>,
    Path((user_id, provider)): Path<(String, String)>,
) -> Result<Json<ConnectionTest>> {
    let provider: Provider = provider.parse()?;
    Ok(Json(state.brokers.test_connection(&user_id, provider).await?))
}

async fn oauth_authorize(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(p): Query<UserParams>,
) -> Result<Json<AuthorizeLink>> {
    let provider: Provider = provider.parse()?;
    Ok(Json(state.brokers.authorize_url(&p.user_id, provider).await?))
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    state: String,
    code: Option<String>,
    error: Option<String>,
}

/// GET /api/oauth/callback: redirect target registered with the broker.
async fn oauth_callback(
    State(state): State<AppState>,
    Query(p): Query<CallbackParams>,
) -> Result<Json<SettingsView>> {
    if let Some(err) = p.error {
        return Err(GatewayError::validation(format!("Authorization denied: {err}")));
    }
    let code = p.code.unwrap_or_default();
    Ok(Json(state.brokers.complete_oauth(&p.state, &code).await?))
}

// ── Sidecar passthrough ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AccountParams {
    account_id: Option<String>,
}

async fn sidecar_health(State(state): State<AppState>) -> Result<Json<SidecarHealth>> {
    Ok(Json(state.analytics.health().await?))
}

async fn sidecar_positions(
    State(state): State<AppState>,
    Query(p): Query<AccountParams>,
) -> Result<Json<PositionsResponse>> {
    Ok(Json(state.analytics.positions(p.account_id.as_deref()).await?))
}

async fn sidecar_equity(
    State(state): State<AppState>,
    Query(p): Query<AccountParams>,
) -> Result<Json<EquityResponse>> {
    Ok(Json(state.analytics.equity(p.account_id.as_deref()).await?))
}

async fn sidecar_market_data(
    State(state): State<AppState>,
    Json(req): Json<MarketDataRequest>,
) -> Result<Json<MarketDataResponse>> {
    Ok(Json(state.analytics.market_data(&req).await?))
}

async fn sidecar_batch_update(
    State(state): State<AppState>,
    Json(req): Json<BatchUpdateRequest>,
) -> Result<Json<BatchUpdateResponse>> {
    Ok(Json(state.analytics.batch_update(&req).await?))
}
