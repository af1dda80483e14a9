//! Strategy service: iron condor lifecycle on top of the store, the
//! analytics sidecar and Polygon.
//!
//! Analytics-bearing operations try the sidecar first and fall back to the
//! local arithmetic in [`super::iron_condor`]. Persistence errors always surface.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::iron_condor::{
    basic_analytics, local_monitor_alerts, local_position_greeks, payoff_at_expiration,
    AnalyticsSnapshot, AnalyticsSource, IronCondorLegs, LegGreeks, StrategyDraft, StrategyPatch,
};
use crate::alerts::{AlertKind, NewAlert, Severity};
use crate::db::models::{NewStrategy, StrategyRecord};
use crate::db::Store;
use crate::error::{FetchError, GatewayError, Result, Upstream};
use crate::events::bus::{EventBus, GatewayEvent};
use crate::fallback::{with_fallback, Outcome};
use crate::feeds::polygon::{normalize_symbol, ChainQuery};
use crate::feeds::types::{ContractType, Greeks, OptionSnapshot};
use crate::feeds::{fetch_batch_prices, PolygonClient};
use crate::sidecar::types::{
    AnalysisRequest, GreeksRequest, GreeksResponse, MonitorAlert, MonitorRequest,
    OptimizationRequest, OptimizationResponse,
};
use crate::sidecar::AnalyticsClient;

pub const STRATEGY_TYPE: &str = "iron_condor";
pub const STATUS_CLOSED: &str = "closed";
const STRIKE_EPSILON: f64 = 1e-6;
/// Half a cent. A monitor result priced further from the quote we sent is stale.
const MONITOR_PRICE_TOLERANCE: f64 = 0.005;
const CHAIN_LIMIT: u32 = 250;

/// Totals from one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub updated: usize,
    pub degraded: usize,
    pub failed: usize,
    pub alerts_appended: usize,
}

pub struct StrategyService {
    store: Arc<dyn Store>,
    analytics: AnalyticsClient,
    polygon: PolygonClient,
    bus: Arc<EventBus>,
    batch_concurrency: Option<usize>,
}

impl StrategyService {
    pub fn new(
        store: Arc<dyn Store>,
        analytics: AnalyticsClient,
        polygon: PolygonClient,
        bus: Arc<EventBus>,
        batch_concurrency: Option<usize>,
    ) -> Self {
        Self {
            store,
            analytics,
            polygon,
            bus,
            batch_concurrency,
        }
    }

    pub async fn create_iron_condor(&self, draft: StrategyDraft) -> Result<Outcome<StrategyRecord>> {
        let symbol = normalize_symbol(&draft.symbol)?;
        if draft.user_id.trim().is_empty() {
            return Err(GatewayError::validation("User id is required"));
        }
        validate_shape(&draft.legs, draft.contracts, draft.expiration_date, draft.entry_credit)?;

        let request = analysis_request(
            &symbol,
            draft.expiration_date,
            &draft.legs,
            draft.contracts,
            draft.current_price,
            draft.implied_volatility,
        );
        let outcome = self
            .analyze("create_iron_condor", request, &draft.legs, draft.contracts, draft.entry_credit)
            .await?;

        let new = NewStrategy {
            user_id: draft.user_id.trim().to_string(),
            symbol,
            strategy_type: STRATEGY_TYPE.to_string(),
            expiration_date: draft.expiration_date,
            legs: draft.legs,
            contracts: draft.contracts,
            entry_credit: draft.entry_credit,
            analytics: Some(outcome.value.clone()),
            analytics_source: source_of(&outcome).as_str().to_string(),
        };
        let record = self.store.insert_strategy(&new).await?;
        info!(
            id = record.id,
            symbol = %record.symbol,
            source = %record.analytics_source,
            "iron condor created"
        );
        Ok(outcome.map(|_| record))
    }

    pub async fn update_iron_condor(
        &self,
        user_id: &str,
        id: i64,
        patch: StrategyPatch,
    ) -> Result<Outcome<StrategyRecord>> {
        let mut record = self.get(user_id, id).await?;

        if let Some(symbol) = &patch.symbol {
            record.symbol = normalize_symbol(symbol)?;
        }
        if let Some(exp) = patch.expiration_date {
            record.expiration_date = exp;
        }
        if let Some(contracts) = patch.contracts {
            record.contracts = contracts;
        }
        if patch.entry_credit.is_some() {
            record.entry_credit = patch.entry_credit;
        }
        let legs = patch.apply_legs(record.legs());
        validate_shape(&legs, record.contracts, record.expiration_date, record.entry_credit)?;
        record.set_legs(legs);

        let request = analysis_request(
            &record.symbol,
            record.expiration_date,
            &legs,
            record.contracts,
            patch.current_price.or(record.current_price),
            patch.implied_volatility,
        );
        let outcome = self
            .analyze("update_iron_condor", request, &legs, record.contracts, record.entry_credit)
            .await?;

        record.analytics_source = source_of(&outcome).as_str().to_string();
        record.analytics = Some(sqlx::types::Json(outcome.value.clone()));
        let saved = self.store.update_strategy(&record).await?;
        info!(id, source = %saved.analytics_source, "iron condor updated");
        Ok(outcome.map(|_| saved))
    }

    /// Strategies are only visible to the user who owns them.
    pub async fn get(&self, user_id: &str, id: i64) -> Result<StrategyRecord> {
        self.store
            .get_strategy(user_id, id)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("Strategy {id}")))
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<StrategyRecord>> {
        self.store.list_strategies(user_id).await
    }

    pub async fn close(&self, user_id: &str, id: i64) -> Result<StrategyRecord> {
        let saved = self
            .store
            .set_strategy_status(user_id, id, STATUS_CLOSED)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("Strategy {id}")))?;
        info!(id, "iron condor closed");
        Ok(saved)
    }

    /// Net Greeks for a stored position from the live option chain.
    pub async fn position_greeks(&self, user_id: &str, id: i64) -> Result<Outcome<GreeksResponse>> {
        let record = self.get(user_id, id).await?;
        let chain = self
            .polygon
            .option_chain(
                &record.symbol,
                &ChainQuery {
                    expiration_date: Some(record.expiration_date),
                    contract_type: None,
                    limit: Some(CHAIN_LIMIT),
                },
            )
            .await?;

        let legs = record.legs();
        let leg_greeks = LegGreeks {
            long_call: find_leg(&chain, ContractType::Call, legs.long_call, record.expiration_date)?,
            short_call: find_leg(&chain, ContractType::Call, legs.short_call, record.expiration_date)?,
            short_put: find_leg(&chain, ContractType::Put, legs.short_put, record.expiration_date)?,
            long_put: find_leg(&chain, ContractType::Put, legs.long_put, record.expiration_date)?,
        };

        let request = GreeksRequest {
            long_call_greeks: leg_greeks.long_call,
            short_call_greeks: leg_greeks.short_call,
            short_put_greeks: leg_greeks.short_put,
            long_put_greeks: leg_greeks.long_put,
            contracts: record.contracts.max(0) as u32,
        };
        let contracts = record.contracts;
        let outcome = with_fallback(
            "position_greeks",
            self.analytics.iron_condor_greeks(&request),
            move || async move { Ok::<_, GatewayError>(local_position_greeks(&leg_greeks, contracts)) },
        )
        .await?;
        self.note_degraded("position_greeks", &outcome);
        Ok(outcome)
    }

    /// Ask the sidecar for strike suggestions. No local fallback.
    pub async fn suggest_strikes(&self, request: &OptimizationRequest) -> Result<OptimizationResponse> {
        Ok(self.analytics.optimize_iron_condor(request).await?)
    }

    /// Refresh price and P&L for every open strategy and raise monitor alerts.
    pub async fn sync_open_strategies(&self) -> Result<SyncReport> {
        let open = self.store.open_strategies().await?;
        let mut report = SyncReport::default();
        if open.is_empty() {
            return Ok(report);
        }

        let symbols: Vec<String> = open
            .iter()
            .map(|s| s.symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let prices = fetch_batch_prices(&self.polygon, &symbols, self.batch_concurrency).await?;
        let today = Utc::now().date_naive();

        for record in open {
            let Some(price) = prices.prices.get(&record.symbol).map(|q| q.price) else {
                warn!(
                    id = record.id,
                    symbol = %record.symbol,
                    error = prices.errors.get(&record.symbol).map(String::as_str).unwrap_or("no price"),
                    "skipping strategy sync"
                );
                report.failed += 1;
                continue;
            };

            let (status, degraded) = self.monitor(&record, price, today).await;
            if degraded {
                report.degraded += 1;
            }

            // Only the mark is written, so a concurrent close or edit survives.
            let record = match self
                .store
                .mark_strategy(record.id, price, status.current_pnl)
                .await
            {
                Ok(Some(marked)) => marked,
                Ok(None) => {
                    warn!(id = record.id, "strategy vanished during sync");
                    report.failed += 1;
                    continue;
                }
                Err(e) => {
                    warn!(id = record.id, error = %e, "failed to persist strategy sync");
                    report.failed += 1;
                    continue;
                }
            };
            report.updated += 1;

            for alert in &status.alerts {
                match self.store.append_alert(&monitor_alert(&record, alert, today)).await {
                    Ok(Some(_)) => report.alerts_appended += 1,
                    Ok(None) => {}
                    Err(e) => warn!(id = record.id, error = %e, "failed to append monitor alert"),
                }
            }
        }

        info!(
            updated = report.updated,
            degraded = report.degraded,
            failed = report.failed,
            alerts = report.alerts_appended,
            "strategy sync complete"
        );
        self.bus.publish(GatewayEvent::StrategiesSynced {
            updated: report.updated,
            degraded: report.degraded,
            failed: report.failed,
        });
        Ok(report)
    }

    async fn analyze(
        &self,
        operation: &str,
        request: AnalysisRequest,
        legs: &IronCondorLegs,
        contracts: i32,
        entry_credit: Option<f64>,
    ) -> Result<Outcome<AnalyticsSnapshot>> {
        let outcome = with_fallback(
            operation,
            async {
                self.analytics
                    .analyze_iron_condor(&request)
                    .await
                    .map(|a| AnalyticsSnapshot::from_sidecar(legs, a))
            },
            move || async move { Ok::<_, GatewayError>(basic_analytics(legs, contracts, entry_credit)) },
        )
        .await?;
        self.note_degraded(operation, &outcome);
        Ok(outcome)
    }

    async fn monitor(&self, record: &StrategyRecord, price: f64, today: NaiveDate) -> (MonitorStatus, bool) {
        let credit = record.entry_credit.unwrap_or(0.0);
        let days_to_expiration = (record.expiration_date - today).num_days();
        let request = MonitorRequest {
            strategy_id: record.id,
            symbol: record.symbol.clone(),
            expiration_date: record.expiration_date,
            strikes: record.legs().strike_map(),
            contracts: record.contracts.max(0) as u32,
            entry_credit: credit,
            current_price: Some(price),
        };

        let primary = async {
            let resp = self.analytics.monitor_position(&request).await?;
            let priced_at = resp.position_status.current_price;
            if (priced_at - price).abs() > MONITOR_PRICE_TOLERANCE {
                return Err(FetchError::Api {
                    upstream: Upstream::Analytics,
                    status: 200,
                    detail: format!("monitor priced {} at {priced_at}, quote was {price}", record.symbol),
                });
            }
            Ok::<_, FetchError>(MonitorStatus {
                current_pnl: resp.position_status.current_pnl,
                alerts: resp.alerts,
            })
        };
        let legs = record.legs();
        let contracts = record.contracts;
        let local = move || async move {
            let current_pnl = payoff_at_expiration(&legs, contracts, credit, price);
            Ok::<_, FetchError>(MonitorStatus {
                current_pnl,
                alerts: local_monitor_alerts(credit, current_pnl, days_to_expiration),
            })
        };

        match with_fallback("monitor_position", primary, local).await {
            Ok(outcome) => (outcome.value, outcome.degraded),
            // The local path is infallible.
            Err(_) => (MonitorStatus::default(), true),
        }
    }

    fn note_degraded<T>(&self, operation: &str, outcome: &Outcome<T>) {
        if let Some(reason) = &outcome.degraded_reason {
            self.bus.publish(GatewayEvent::AnalyticsDegraded {
                operation: operation.to_string(),
                reason: reason.clone(),
            });
        }
    }
}

#[derive(Debug, Default)]
struct MonitorStatus {
    current_pnl: f64,
    alerts: Vec<MonitorAlert>,
}

fn validate_shape(
    legs: &IronCondorLegs,
    contracts: i32,
    expiration: NaiveDate,
    entry_credit: Option<f64>,
) -> Result<()> {
    legs.validate()?;
    if contracts <= 0 {
        return Err(GatewayError::validation("Contracts must be at least 1"));
    }
    if expiration <= Utc::now().date_naive() {
        return Err(GatewayError::validation("Expiration date must be in the future"));
    }
    if entry_credit.is_some_and(|c| !c.is_finite()) {
        return Err(GatewayError::validation("Entry credit must be a number"));
    }
    Ok(())
}

fn analysis_request(
    symbol: &str,
    expiration_date: NaiveDate,
    legs: &IronCondorLegs,
    contracts: i32,
    current_price: Option<f64>,
    implied_volatility: Option<f64>,
) -> AnalysisRequest {
    AnalysisRequest {
        symbol: symbol.to_string(),
        expiration_date,
        long_call_strike: legs.long_call,
        short_call_strike: legs.short_call,
        short_put_strike: legs.short_put,
        long_put_strike: legs.long_put,
        contracts: contracts.max(0) as u32,
        current_price,
        implied_volatility,
        risk_free_rate: None,
    }
}

fn source_of<T>(outcome: &Outcome<T>) -> AnalyticsSource {
    if outcome.degraded {
        AnalyticsSource::Basic
    } else {
        AnalyticsSource::Enhanced
    }
}

fn find_leg(
    chain: &[OptionSnapshot],
    contract_type: ContractType,
    strike: f64,
    expiration: NaiveDate,
) -> Result<Greeks> {
    chain
        .iter()
        .find(|o| {
            o.contract_type == contract_type
                && o.expiration_date == expiration
                && (o.strike_price - strike).abs() < STRIKE_EPSILON
        })
        .map(|o| o.greeks.unwrap_or_default())
        .ok_or_else(|| {
            GatewayError::NotFound(format!(
                "{} {strike} expiring {expiration} in the option chain",
                contract_type.as_str()
            ))
        })
}

/// Dedup key is strategy, alert type and day.
fn monitor_alert(record: &StrategyRecord, alert: &MonitorAlert, today: NaiveDate) -> NewAlert {
    NewAlert {
        kind: AlertKind::StrategyMonitor,
        external_id: format!("strategy:{}:{}:{}", record.id, alert.alert_type, today),
        title: format!("{} iron condor #{}: {}", record.symbol, record.id, alert.alert_type),
        message: alert.message.clone(),
        severity: Severity::parse_lenient(&alert.severity),
        payload: json!({
            "strategy_id": record.id,
            "symbol": record.symbol,
            "type": alert.alert_type,
            "current_price": record.current_price,
            "current_pnl": record.current_pnl,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn legs() -> IronCondorLegs {
        IronCondorLegs {
            long_put: 90.0,
            short_put: 95.0,
            short_call: 105.0,
            long_call: 110.0,
        }
    }

    #[test]
    fn expiration_must_be_after_today() {
        let today = Utc::now().date_naive();
        assert!(validate_shape(&legs(), 1, today, None).is_err());
        assert!(validate_shape(&legs(), 1, today + Duration::days(1), None).is_ok());
    }

    #[test]
    fn contracts_must_be_positive() {
        let exp = Utc::now().date_naive() + Duration::days(30);
        assert!(validate_shape(&legs(), 0, exp, None).is_err());
    }

    #[test]
    fn legs_match_by_type_strike_and_expiration() {
        let exp = NaiveDate::from_ymd_opt(2030, 1, 18).unwrap();
        let snap = |ct, strike, delta| OptionSnapshot {
            ticker: format!("O:SPY{strike}"),
            contract_type: ct,
            expiration_date: exp,
            strike_price: strike,
            implied_volatility: None,
            open_interest: None,
            greeks: Some(Greeks {
                delta,
                ..Default::default()
            }),
            bid: None,
            ask: None,
            midpoint: None,
            underlying_price: None,
        };
        let chain = vec![
            snap(ContractType::Call, 105.0, 0.3),
            snap(ContractType::Put, 105.0, -0.7),
        ];
        let g = find_leg(&chain, ContractType::Put, 105.0, exp).unwrap();
        assert_eq!(g.delta, -0.7);
        assert!(find_leg(&chain, ContractType::Call, 110.0, exp).is_err());
    }
}
