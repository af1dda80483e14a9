mod support;

use std::sync::Arc;

use axum::{http::StatusCode, routing::post, Json, Router};
use chrono::{Duration, Utc};
use serde_json::Value;

use quant_gateway::alerts::AlertKind;
use quant_gateway::db::{MemoryStore, Store};
use quant_gateway::error::GatewayError;
use quant_gateway::events::bus::GatewayEvent;
use quant_gateway::strategy::iron_condor::{IronCondorLegs, StrategyDraft, StrategyPatch};

use support::{
    config_for, config_with_sidecar, spawn_sidecar, spawn_upstream, Gateway, MonitorPricing,
    DEAD_URL, PLACEHOLDER_PRICE, SIDECAR_MONITOR_PNL,
};

fn draft(days_out: i64) -> StrategyDraft {
    StrategyDraft {
        user_id: "trader-1".into(),
        symbol: "aapl".into(),
        expiration_date: Utc::now().date_naive() + Duration::days(days_out),
        legs: IronCondorLegs {
            long_put: 90.0,
            short_put: 95.0,
            short_call: 105.0,
            long_call: 110.0,
        },
        contracts: 1,
        entry_credit: Some(150.0),
        current_price: None,
        implied_volatility: None,
    }
}

#[tokio::test]
async fn create_falls_back_to_basic_analytics() {
    let gw = Gateway::new(&config_for(DEAD_URL));
    let mut events = gw.bus.subscribe();

    let outcome = gw.strategies.create_iron_condor(draft(30)).await.unwrap();
    assert!(outcome.degraded);
    assert!(outcome.degraded_reason.is_some());

    let record = outcome.value;
    assert_eq!(record.symbol, "AAPL");
    assert_eq!(record.status, "open");
    assert_eq!(record.analytics_source, "basic");
    let analytics = record.analytics().unwrap();
    assert_eq!(analytics.max_profit, 150.0);
    assert_eq!(analytics.max_loss, 350.0);
    assert!((analytics.breakeven_lower - 93.5).abs() < 1e-9);
    assert!((analytics.breakeven_upper - 106.5).abs() < 1e-9);
    assert!(!analytics.payoff.is_empty());

    match events.recv().await.unwrap() {
        GatewayEvent::AnalyticsDegraded { operation, .. } => {
            assert_eq!(operation, "create_iron_condor")
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn invalid_strategies_are_rejected_before_persisting() {
    let gw = Gateway::new(&config_for(DEAD_URL));

    let mut crossed = draft(30);
    crossed.legs.short_call = 94.0;
    let err = gw.strategies.create_iron_condor(crossed).await.unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)), "{err}");

    let mut expired = draft(0);
    expired.expiration_date = Utc::now().date_naive();
    let err = gw.strategies.create_iron_condor(expired).await.unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)), "{err}");

    let mut no_contracts = draft(30);
    no_contracts.contracts = 0;
    assert!(gw.strategies.create_iron_condor(no_contracts).await.is_err());

    assert!(gw.strategies.list("trader-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn update_recomputes_and_close_keeps_the_row() {
    let gw = Gateway::new(&config_for(DEAD_URL));
    let created = gw.strategies.create_iron_condor(draft(30)).await.unwrap().value;

    let patch = StrategyPatch {
        long_call_strike: Some(115.0),
        contracts: Some(2),
        ..Default::default()
    };
    let updated = gw
        .strategies
        .update_iron_condor("trader-1", created.id, patch)
        .await
        .unwrap()
        .value;
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.contracts, 2);
    assert_eq!(updated.long_call_strike, 115.0);
    assert_eq!(updated.created_at, created.created_at);
    // Widest wing is now 10 wide over 200 shares.
    assert_eq!(updated.analytics().unwrap().max_loss, 10.0 * 200.0 - 150.0);

    let closed = gw.strategies.close("trader-1", created.id).await.unwrap();
    assert_eq!(closed.status, "closed");
    assert_eq!(gw.strategies.list("trader-1").await.unwrap().len(), 1);
    assert!(gw.store.open_strategies().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_strategy_is_not_found() {
    let gw = Gateway::new(&config_for(DEAD_URL));
    let err = gw.strategies.get("trader-1", 404).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)));
    assert!(gw.strategies.close("trader-1", 404).await.is_err());
}

#[tokio::test]
async fn sync_prices_positions_and_raises_alerts_once_per_day() {
    let upstream = spawn_upstream().await;
    let gw = Gateway::new(&config_for(&upstream));
    let created = gw.strategies.create_iron_condor(draft(3)).await.unwrap().value;

    let report = gw.strategies.sync_open_strategies().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.degraded, 1);
    assert_eq!(report.failed, 0);
    // Full credit kept at 100 and three days left.
    assert_eq!(report.alerts_appended, 2);

    let stored = gw.strategies.get("trader-1", created.id).await.unwrap();
    assert_eq!(stored.current_price, Some(100.0));
    assert_eq!(stored.current_pnl, Some(150.0));

    let alerts = gw
        .store
        .recent_alerts(Some(AlertKind::StrategyMonitor), 10)
        .await
        .unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts
        .iter()
        .all(|a| a.external_id.starts_with(&format!("strategy:{}:", created.id))));

    let again = gw.strategies.sync_open_strategies().await.unwrap();
    assert_eq!(again.updated, 1);
    assert_eq!(again.alerts_appended, 0);
}

#[tokio::test]
async fn sync_counts_symbols_without_a_price_as_failed() {
    let upstream = spawn_upstream().await;
    let gw = Gateway::new(&config_for(&upstream));
    let mut unknown = draft(30);
    unknown.symbol = "ZZZZ".into();
    gw.strategies.create_iron_condor(unknown).await.unwrap();

    let report = gw.strategies.sync_open_strategies().await.unwrap();
    assert_eq!(report.updated, 0);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn suggestions_have_no_local_fallback() {
    let gw = Gateway::new(&config_for(DEAD_URL));
    let request = serde_json::from_value(serde_json::json!({
        "symbol": "SPY",
        "expiration_date": "2030-01-18",
        "current_price": 500.0,
        "implied_volatility": 0.2
    }))
    .unwrap();
    let err = gw.strategies.suggest_strikes(&request).await.unwrap_err();
    assert!(matches!(err, GatewayError::Fetch(_)));
}

#[tokio::test]
async fn strategies_are_invisible_to_other_users() {
    let gw = Gateway::new(&config_for(DEAD_URL));
    let created = gw.strategies.create_iron_condor(draft(30)).await.unwrap().value;

    let err = gw.strategies.get("trader-2", created.id).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)), "{err}");
    let err = gw.strategies.close("trader-2", created.id).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)), "{err}");
    let patch = StrategyPatch {
        contracts: Some(5),
        ..Default::default()
    };
    let err = gw
        .strategies
        .update_iron_condor("trader-2", created.id, patch)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound(_)), "{err}");

    let stored = gw.strategies.get("trader-1", created.id).await.unwrap();
    assert_eq!(stored.status, "open");
    assert_eq!(stored.contracts, 1);
}

#[tokio::test]
async fn live_sidecar_enriches_create_greeks_and_suggestions() {
    let upstream = spawn_upstream().await;
    let sidecar = spawn_sidecar(MonitorPricing::Echo).await;
    let gw = Gateway::new(&config_with_sidecar(&upstream, &sidecar));

    let outcome = gw.strategies.create_iron_condor(draft(30)).await.unwrap();
    assert!(!outcome.degraded);
    assert!(outcome.degraded_reason.is_none());
    let record = outcome.value;
    assert_eq!(record.analytics_source, "enhanced");
    let analytics = record.analytics().unwrap();
    assert_eq!(analytics.score, Some(72.0));
    assert_eq!(analytics.rating.as_deref(), Some("Good"));
    assert_eq!(analytics.probability_of_profit, Some(68.2));
    assert_eq!(analytics.payoff.len(), 2);

    let greeks = gw.strategies.position_greeks("trader-1", record.id).await.unwrap();
    assert!(!greeks.degraded);
    assert_eq!(greeks.value.portfolio_greeks.delta, 1.5);
    assert_eq!(greeks.value.risk_profile.unwrap().gamma_risk, "low");

    let request = serde_json::from_value(serde_json::json!({
        "symbol": "SPY",
        "expiration_date": "2030-01-18",
        "current_price": 500.0,
        "implied_volatility": 0.2
    }))
    .unwrap();
    let suggestion = gw.strategies.suggest_strikes(&request).await.unwrap();
    assert_eq!(suggestion.optimal_strikes.short_put, 480.0);
    assert_eq!(suggestion.expected_performance.quality_metrics.unwrap().score, 72.0);
}

#[tokio::test]
async fn greeks_fall_back_to_the_chain_sum() {
    let upstream = spawn_upstream().await;
    let gw = Gateway::new(&config_for(&upstream));
    let created = gw.strategies.create_iron_condor(draft(30)).await.unwrap().value;

    let greeks = gw.strategies.position_greeks("trader-1", created.id).await.unwrap();
    assert!(greeks.degraded);
    // Short call delta 0.25 over 100 shares.
    assert_eq!(greeks.value.legs_breakdown["short_call"].delta, 25.0);
    assert_eq!(greeks.value.legs_breakdown["long_call"].delta, -10.0);
}

#[tokio::test]
async fn sidecar_monitor_results_are_used_when_priced_at_our_quote() {
    let upstream = spawn_upstream().await;
    let sidecar = spawn_sidecar(MonitorPricing::Echo).await;
    let gw = Gateway::new(&config_with_sidecar(&upstream, &sidecar));
    let created = gw.strategies.create_iron_condor(draft(3)).await.unwrap().value;

    let report = gw.strategies.sync_open_strategies().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.degraded, 0);
    assert_eq!(report.alerts_appended, 1);

    let stored = gw.strategies.get("trader-1", created.id).await.unwrap();
    assert_eq!(stored.current_price, Some(100.0));
    assert_eq!(stored.current_pnl, Some(SIDECAR_MONITOR_PNL));
}

#[tokio::test]
async fn sidecar_monitor_priced_elsewhere_falls_back_to_local_rules() {
    let upstream = spawn_upstream().await;
    let sidecar = spawn_sidecar(MonitorPricing::Placeholder).await;
    let gw = Gateway::new(&config_with_sidecar(&upstream, &sidecar));
    let created = gw.strategies.create_iron_condor(draft(3)).await.unwrap().value;
    assert_eq!(created.analytics_source, "enhanced");

    let report = gw.strategies.sync_open_strategies().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.degraded, 1);
    // Local rules at 100: full credit kept and three days left.
    assert_eq!(report.alerts_appended, 2);

    let stored = gw.strategies.get("trader-1", created.id).await.unwrap();
    assert_eq!(stored.current_price, Some(100.0));
    assert_eq!(stored.current_pnl, Some(150.0));
    assert_ne!(stored.current_price, Some(PLACEHOLDER_PRICE));
}

#[tokio::test]
async fn close_during_sync_is_not_overwritten() {
    let upstream = spawn_upstream().await;
    let store = Arc::new(MemoryStore::new());
    let closer = store.clone();
    // Closes the strategy while its monitor call is in flight, then fails the call.
    let sidecar = support::serve(Router::new().route(
        "/iron-condor/monitor",
        post(move |Json(req): Json<Value>| {
            let store = closer.clone();
            async move {
                let id = req["strategy_id"].as_i64().unwrap();
                store.set_strategy_status("trader-1", id, "closed").await.unwrap();
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }),
    ))
    .await;
    let gw = Gateway::with_store(&config_with_sidecar(&upstream, &sidecar), store);
    let created = gw.strategies.create_iron_condor(draft(30)).await.unwrap().value;

    let report = gw.strategies.sync_open_strategies().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.degraded, 1);

    let stored = gw.strategies.get("trader-1", created.id).await.unwrap();
    assert_eq!(stored.status, "closed");
    assert_eq!(stored.current_price, Some(100.0));
    assert!(gw.store.open_strategies().await.unwrap().is_empty());
}
