//! Shared fixtures: a local stand-in for every upstream and a fully wired gateway.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::json;

use quant_gateway::brokers::BrokerService;
use quant_gateway::config::Config;
use quant_gateway::db::{MemoryStore, Store};
use quant_gateway::events::bus::EventBus;
use quant_gateway::feeds::PolygonClient;
use quant_gateway::settings::{SecretCipher, SettingsService};
use quant_gateway::sidecar::AnalyticsClient;
use quant_gateway::strategy::iron_condor::{payoff_at_expiration, IronCondorLegs};
use quant_gateway::strategy::StrategyService;
use quant_gateway::web::server::AppState;

pub const POLYGON_KEY: &str = "good-key";
/// Nothing listens here, so connects fail fast.
pub const DEAD_URL: &str = "http://127.0.0.1:1";

pub const CTRADER_CLIENT_ID: &str = "ct-app";
pub const CTRADER_CLIENT_SECRET: &str = "ct-secret";
pub const CTRADER_CODE: &str = "good-code";

pub const TOS_CLIENT_ID: &str = "tos-app";
pub const TOS_CLIENT_SECRET: &str = "tos-secret";
/// `tos-app:tos-secret`, base64.
const TOS_BASIC: &str = "Basic dG9zLWFwcDp0b3Mtc2VjcmV0";

/// Serve `app` on an ephemeral port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Polygon, the brokers, an IBKR gateway and an alert feed behind one listener.
pub async fn spawn_upstream() -> String {
    let app = Router::new()
        .route("/v2/aggs/ticker/:symbol/prev", get(polygon_prev))
        .route("/v3/snapshot/options/:underlying", get(polygon_chain))
        .route("/apps/token", get(ctrader_token))
        .route("/connect/tradingaccounts", get(ctrader_accounts))
        .route("/v1/oauth/token", post(tos_token))
        .route("/trader/v1/accounts/accountNumbers", get(tos_accounts))
        .route("/v1/api/iserver/auth/status", post(ibkr_status))
        .route("/feeds/calendar", get(calendar_feed));
    serve(app).await
}

async fn polygon_prev(
    Path(symbol): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if q.get("apiKey").map(String::as_str) != Some(POLYGON_KEY) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"status": "ERROR", "error": "Unknown API Key"})),
        )
            .into_response();
    }
    match symbol.as_str() {
        "AAPL" => Json(json!({
            "status": "OK",
            "ticker": "AAPL",
            "results": [{"o": 98.0, "h": 101.0, "l": 97.5, "c": 100.0, "v": 1200000.0, "t": 1760659200000i64}]
        }))
        .into_response(),
        _ => Json(json!({"status": "OK", "results": []})).into_response(),
    }
}

/// The 90/95/105/110 AAPL condor at whatever expiration was asked for.
async fn polygon_chain(
    Path(underlying): Path<String>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if q.get("apiKey").map(String::as_str) != Some(POLYGON_KEY) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Some(expiration) = q.get("expiration_date") else {
        return (StatusCode::BAD_REQUEST, Json(json!({"status": "ERROR", "error": "expiration_date required"})))
            .into_response();
    };
    if underlying != "AAPL" {
        return Json(json!({"status": "OK", "results": []})).into_response();
    }
    let leg = |contract_type: &str, strike: f64, delta: f64| {
        json!({
            "details": {
                "ticker": format!("O:AAPL{strike}{contract_type}"),
                "contract_type": contract_type,
                "expiration_date": expiration,
                "strike_price": strike
            },
            "greeks": {"delta": delta, "gamma": 0.01, "theta": -0.02, "vega": 0.05},
            "last_quote": {"bid": 1.0, "ask": 1.2, "midpoint": 1.1}
        })
    };
    Json(json!({
        "status": "OK",
        "results": [
            leg("put", 90.0, -0.10),
            leg("put", 95.0, -0.25),
            leg("call", 105.0, 0.25),
            leg("call", 110.0, 0.10)
        ]
    }))
    .into_response()
}

async fn ctrader_token(Query(q): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    let get = |k: &str| q.get(k).map(String::as_str);
    if get("grant_type") != Some("authorization_code")
        || get("client_id") != Some(CTRADER_CLIENT_ID)
        || get("client_secret") != Some(CTRADER_CLIENT_SECRET)
    {
        return Json(json!({"errorCode": "INVALID_CLIENT", "description": "Unknown client"}));
    }
    if get("code") != Some(CTRADER_CODE) {
        return Json(json!({"errorCode": "ACCESS_DENIED", "description": "Authorization code expired"}));
    }
    Json(json!({
        "accessToken": "ct-access",
        "refreshToken": "ct-refresh",
        "expiresIn": 2628000,
        "tokenType": "bearer",
        "errorCode": null
    }))
}

async fn ctrader_accounts(Query(q): Query<HashMap<String, String>>) -> Response {
    if q.get("access_token").map(String::as_str) != Some("ct-access") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({"data": [
        {"accountId": 1001, "accountNumber": 55, "live": false, "brokerName": "Demo"},
        {"accountId": 1002, "live": true}
    ]}))
    .into_response()
}

async fn tos_token(headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if auth != Some(TOS_BASIC) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid_client"}))).into_response();
    }
    if form.get("grant_type").map(String::as_str) != Some("authorization_code") {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "unsupported_grant_type"})))
            .into_response();
    }
    Json(json!({
        "access_token": "tos-access",
        "refresh_token": "tos-refresh",
        "token_type": "Bearer",
        "expires_in": 1800,
        "scope": "api"
    }))
    .into_response()
}

async fn tos_accounts(headers: HeaderMap) -> Response {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if auth != Some("Bearer tos-access") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!([{"accountNumber": "12345678", "hashValue": "ABCDEF"}])).into_response()
}

async fn ibkr_status() -> Json<serde_json::Value> {
    Json(json!({"authenticated": true, "connected": true, "competing": false}))
}

async fn calendar_feed() -> Json<serde_json::Value> {
    Json(json!({"events": [
        {"id": "cpi-2026-10", "title": "CPI", "impact": "High", "date": "2026-10-15"},
        {"event": "FOMC Minutes", "date": "2026-10-20"},
        {"description": "an item without a title"}
    ]}))
}

/// How the stub analytics service prices a monitor request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MonitorPricing {
    /// Echo the price it was sent.
    Echo,
    /// Ignore it and price at a fixed placeholder.
    Placeholder,
}

pub const SIDECAR_MONITOR_PNL: f64 = 120.0;
pub const PLACEHOLDER_PRICE: f64 = 4500.0;

/// An analytics service answering in its own envelope shapes.
pub async fn spawn_sidecar(pricing: MonitorPricing) -> String {
    serve(sidecar_router(pricing)).await
}

pub fn sidecar_router(pricing: MonitorPricing) -> Router {
    Router::new()
        .route("/health", get(sidecar_health))
        .route("/iron-condor/analyze", post(sidecar_analyze))
        .route("/iron-condor/greeks", post(sidecar_greeks))
        .route("/iron-condor/optimize", post(sidecar_optimize))
        .route(
            "/iron-condor/monitor",
            post(move |Json(req): Json<serde_json::Value>| async move { sidecar_monitor(pricing, req) }),
        )
}

async fn sidecar_health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "service": "analytics", "timestamp": "2026-10-17T00:00:00Z"}))
}

fn sidecar_analysis() -> serde_json::Value {
    json!({
        "risk_reward": {
            "max_profit": 150.0, "max_loss": 350.0, "return_on_risk_percent": 42.86,
            "risk_reward_ratio": 2.33, "net_credit": 1.5
        },
        "breakevens": {"upper": 106.5, "lower": 93.5, "range": 13.0, "range_percent": 13.0},
        "probability": {
            "profit_percent": 68.2, "loss_percent": 31.8,
            "short_call_itm_percent": 16.0, "short_put_itm_percent": 15.8, "method": "black_scholes"
        },
        "quality_metrics": {"score": 72.0, "rating": "Good", "factors": {"probability": "high"}},
        "payoff_profile": [{"price": 90.0, "pnl": -350.0}, {"price": 100.0, "pnl": 150.0}]
    })
}

async fn sidecar_analyze(Json(_req): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(json!({"success": true, "analysis": sidecar_analysis()}))
}

async fn sidecar_greeks(Json(_req): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "portfolio_greeks": {"delta": 1.5, "gamma": -0.4, "theta": 3.2, "vega": -6.1},
        "risk_profile": {
            "delta_neutral": true, "positive_theta": true, "negative_vega": true, "gamma_risk": "low"
        },
        "daily_estimates": {
            "theta_decay_pnl": 3.2, "pnl_if_underlying_up_1pct": -1.0, "pnl_if_underlying_down_1pct": 1.0
        },
        "interpretation": {"delta": "neutral"}
    }))
}

async fn sidecar_optimize(Json(_req): Json<serde_json::Value>) -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "optimal_strikes": {"long_call": 530.0, "short_call": 520.0, "short_put": 480.0, "long_put": 470.0},
        "expected_performance": sidecar_analysis(),
        "optimization_parameters": {"target_probability": 0.7}
    }))
}

fn sidecar_monitor(pricing: MonitorPricing, req: serde_json::Value) -> Json<serde_json::Value> {
    let num = |v: &serde_json::Value| v.as_f64().unwrap_or_default();
    let strikes = &req["strikes"];
    let legs = IronCondorLegs {
        long_put: num(&strikes["long_put"]),
        short_put: num(&strikes["short_put"]),
        short_call: num(&strikes["short_call"]),
        long_call: num(&strikes["long_call"]),
    };
    let contracts = req["contracts"].as_i64().unwrap_or(1) as i32;
    let credit = num(&req["entry_credit"]);
    let (price, pnl) = match pricing {
        MonitorPricing::Echo => (num(&req["current_price"]), SIDECAR_MONITOR_PNL),
        MonitorPricing::Placeholder => (
            PLACEHOLDER_PRICE,
            payoff_at_expiration(&legs, contracts, credit, PLACEHOLDER_PRICE),
        ),
    };
    Json(json!({
        "success": true,
        "position_status": {
            "strategy_id": req["strategy_id"],
            "current_price": price,
            "current_pnl": pnl,
            "pnl_percent": if credit > 0.0 { pnl / credit * 100.0 } else { 0.0 },
            "days_to_expiration": 3,
            "entry_credit": credit
        },
        "alerts": [{"type": "PROFIT_TARGET", "message": "Take profits", "severity": "info"}]
    }))
}

/// Defaults pointed at `upstream`, with the sidecar unreachable.
pub fn config_for(upstream: &str) -> Config {
    let mut config = Config::from_toml("").unwrap();
    config.polygon.base_url = upstream.to_string();
    config.polygon.api_key = POLYGON_KEY.to_string();
    config.polygon.timeout_secs = 5;
    config.analytics.base_url = DEAD_URL.to_string();
    config.analytics.timeout_secs = 2;

    config.brokers.ibkr.timeout_secs = 5;
    config.brokers.ctrader.authorize_url = format!("{upstream}/apps/auth");
    config.brokers.ctrader.token_url = format!("{upstream}/apps/token");
    config.brokers.ctrader.api_base_url = upstream.to_string();
    config.brokers.ctrader.timeout_secs = 5;
    config.brokers.thinkorswim.authorize_url = format!("{upstream}/v1/oauth/authorize");
    config.brokers.thinkorswim.token_url = format!("{upstream}/v1/oauth/token");
    config.brokers.thinkorswim.api_base_url = upstream.to_string();
    config.brokers.thinkorswim.timeout_secs = 5;
    config
}

/// Defaults pointed at `upstream` and at a live analytics service.
pub fn config_with_sidecar(upstream: &str, sidecar: &str) -> Config {
    let mut config = config_for(upstream);
    config.analytics.base_url = sidecar.to_string();
    config.analytics.timeout_secs = 5;
    config
}

/// Every service wired the way the binary wires them, over an in-memory store.
pub struct Gateway {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<EventBus>,
    pub polygon: PolygonClient,
    pub analytics: AnalyticsClient,
    pub settings: Arc<SettingsService>,
    pub brokers: Arc<BrokerService>,
    pub strategies: Arc<StrategyService>,
}

impl Gateway {
    pub fn new(config: &Config) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Wire over a store the test also hands to its stubs.
    pub fn with_store(config: &Config, store: Arc<MemoryStore>) -> Self {
        let dyn_store: Arc<dyn Store> = store.clone();
        let bus = Arc::new(EventBus::new(64));
        let polygon = PolygonClient::new(&config.polygon).unwrap();
        let analytics = AnalyticsClient::new(&config.analytics).unwrap();
        let settings = Arc::new(SettingsService::new(dyn_store.clone(), SecretCipher::ephemeral()));
        let brokers = Arc::new(
            BrokerService::new(&config.brokers, settings.clone(), polygon.clone(), bus.clone())
                .unwrap(),
        );
        let strategies = Arc::new(StrategyService::new(
            dyn_store,
            analytics.clone(),
            polygon.clone(),
            bus.clone(),
            config.polygon.batch_concurrency,
        ));
        Self {
            store,
            bus,
            polygon,
            analytics,
            settings,
            brokers,
            strategies,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            polygon: self.polygon.clone(),
            analytics: self.analytics.clone(),
            strategies: self.strategies.clone(),
            settings: self.settings.clone(),
            brokers: self.brokers.clone(),
            store: self.store.clone(),
            batch_concurrency: None,
        }
    }
}
