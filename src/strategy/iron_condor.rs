//! Iron condor shape, validation, and the local (basic) analytics path.
//!
//! Everything here is textbook expiration arithmetic. Probability and
//! Greeks modelling belong to the analytics sidecar.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::feeds::types::Greeks;
use crate::sidecar::types::{
    GreeksResponse, IronCondorAnalysis, MonitorAlert, PayoffPoint, StrikeMap,
};

/// Shares per option contract.
pub const CONTRACT_MULTIPLIER: f64 = 100.0;

const PAYOFF_POINTS: usize = 41;
const EXPIRATION_WARNING_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IronCondorLegs {
    #[serde(rename = "long_put_strike")]
    pub long_put: f64,
    #[serde(rename = "short_put_strike")]
    pub short_put: f64,
    #[serde(rename = "short_call_strike")]
    pub short_call: f64,
    #[serde(rename = "long_call_strike")]
    pub long_call: f64,
}

impl IronCondorLegs {
    /// Strikes must be positive and strictly ordered
    /// `long_put < short_put < short_call < long_call`.
    pub fn validate(&self) -> Result<()> {
        let strikes = [self.long_put, self.short_put, self.short_call, self.long_call];
        if strikes.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(GatewayError::validation("All strikes must be positive"));
        }
        if !(self.long_put < self.short_put
            && self.short_put < self.short_call
            && self.short_call < self.long_call)
        {
            return Err(GatewayError::validation(
                "Strikes must satisfy long_put < short_put < short_call < long_call",
            ));
        }
        Ok(())
    }

    pub fn put_width(&self) -> f64 {
        self.short_put - self.long_put
    }

    pub fn call_width(&self) -> f64 {
        self.long_call - self.short_call
    }

    pub fn widest(&self) -> f64 {
        self.put_width().max(self.call_width())
    }

    pub fn strike_map(&self) -> StrikeMap {
        StrikeMap {
            long_call: self.long_call,
            short_call: self.short_call,
            short_put: self.short_put,
            long_put: self.long_put,
        }
    }
}

/// Submission body for a new iron condor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDraft {
    pub user_id: String,
    pub symbol: String,
    pub expiration_date: NaiveDate,
    #[serde(flatten)]
    pub legs: IronCondorLegs,
    pub contracts: i32,
    /// Net credit received for the whole position, in dollars.
    #[serde(default)]
    pub entry_credit: Option<f64>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub implied_volatility: Option<f64>,
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyPatch {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<NaiveDate>,
    #[serde(default)]
    pub long_put_strike: Option<f64>,
    #[serde(default)]
    pub short_put_strike: Option<f64>,
    #[serde(default)]
    pub short_call_strike: Option<f64>,
    #[serde(default)]
    pub long_call_strike: Option<f64>,
    #[serde(default)]
    pub contracts: Option<i32>,
    #[serde(default)]
    pub entry_credit: Option<f64>,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub implied_volatility: Option<f64>,
}

impl StrategyPatch {
    pub fn apply_legs(&self, legs: IronCondorLegs) -> IronCondorLegs {
        IronCondorLegs {
            long_put: self.long_put_strike.unwrap_or(legs.long_put),
            short_put: self.short_put_strike.unwrap_or(legs.short_put),
            short_call: self.short_call_strike.unwrap_or(legs.short_call),
            long_call: self.long_call_strike.unwrap_or(legs.long_call),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsSource {
    Enhanced,
    Basic,
}

impl AnalyticsSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsSource::Enhanced => "enhanced",
            AnalyticsSource::Basic => "basic",
        }
    }
}

/// Stored analytics for one strategy. Sidecar-only fields stay `None` on the basic path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub max_profit: f64,
    pub max_loss: f64,
    pub breakeven_lower: f64,
    pub breakeven_upper: f64,
    pub put_spread_width: f64,
    pub call_spread_width: f64,
    #[serde(default)]
    pub return_on_risk_percent: Option<f64>,
    #[serde(default)]
    pub probability_of_profit: Option<f64>,
    #[serde(default)]
    pub greeks: Option<Greeks>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub rating: Option<String>,
    #[serde(default)]
    pub payoff: Vec<PayoffPoint>,
}

impl AnalyticsSnapshot {
    pub fn from_sidecar(legs: &IronCondorLegs, analysis: IronCondorAnalysis) -> Self {
        let (score, rating) = match analysis.quality_metrics {
            Some(q) => (Some(q.score), Some(q.rating)),
            None => (None, None),
        };
        Self {
            max_profit: analysis.risk_reward.max_profit,
            max_loss: analysis.risk_reward.max_loss,
            breakeven_lower: analysis.breakevens.lower,
            breakeven_upper: analysis.breakevens.upper,
            put_spread_width: legs.put_width(),
            call_spread_width: legs.call_width(),
            return_on_risk_percent: Some(analysis.risk_reward.return_on_risk_percent),
            probability_of_profit: Some(analysis.probability.profit_percent),
            greeks: None,
            score,
            rating,
            payoff: analysis.payoff_profile,
        }
    }
}

/// Local analytics from strikes, size and credit alone.
pub fn basic_analytics(
    legs: &IronCondorLegs,
    contracts: i32,
    entry_credit: Option<f64>,
) -> AnalyticsSnapshot {
    let credit = entry_credit.unwrap_or(0.0);
    let shares = f64::from(contracts) * CONTRACT_MULTIPLIER;
    let credit_per_share = if shares > 0.0 { credit / shares } else { 0.0 };
    let max_profit = credit;
    let max_loss = legs.widest() * shares - credit;
    let return_on_risk_percent = (max_loss > 0.0).then(|| max_profit / max_loss * 100.0);

    AnalyticsSnapshot {
        max_profit,
        max_loss,
        breakeven_lower: legs.short_put - credit_per_share,
        breakeven_upper: legs.short_call + credit_per_share,
        put_spread_width: legs.put_width(),
        call_spread_width: legs.call_width(),
        return_on_risk_percent,
        probability_of_profit: None,
        greeks: None,
        score: None,
        rating: None,
        payoff: payoff_profile(legs, contracts, credit),
    }
}

/// Whole-position P&L at expiration for an underlying price.
pub fn payoff_at_expiration(legs: &IronCondorLegs, contracts: i32, credit: f64, price: f64) -> f64 {
    let put_loss = (legs.short_put - price).max(0.0) - (legs.long_put - price).max(0.0);
    let call_loss = (price - legs.short_call).max(0.0) - (price - legs.long_call).max(0.0);
    credit - (put_loss + call_loss) * f64::from(contracts) * CONTRACT_MULTIPLIER
}

/// Evenly spaced payoff samples spanning one wing width beyond each long strike.
pub fn payoff_profile(legs: &IronCondorLegs, contracts: i32, credit: f64) -> Vec<PayoffPoint> {
    let pad = legs.widest();
    let low = (legs.long_put - pad).max(0.0);
    let high = legs.long_call + pad;
    let step = (high - low) / (PAYOFF_POINTS - 1) as f64;
    (0..PAYOFF_POINTS)
        .map(|i| {
            let price = low + step * i as f64;
            PayoffPoint {
                price,
                pnl: payoff_at_expiration(legs, contracts, credit, price),
            }
        })
        .collect()
}

/// Threshold rules applied when the sidecar monitor is unavailable.
pub fn local_monitor_alerts(
    entry_credit: f64,
    current_pnl: f64,
    days_to_expiration: i64,
) -> Vec<MonitorAlert> {
    let mut alerts = Vec::new();
    if entry_credit != 0.0 {
        let pnl_percent = current_pnl / entry_credit.abs() * 100.0;
        if pnl_percent >= 50.0 {
            alerts.push(MonitorAlert {
                alert_type: "PROFIT_TARGET".into(),
                message: format!("Position has reached {pnl_percent:.1}% of max profit"),
                severity: "info".into(),
            });
        }
        if current_pnl < -entry_credit * 0.5 {
            alerts.push(MonitorAlert {
                alert_type: "LOSS_THRESHOLD".into(),
                message: format!(
                    "Position has lost {:.1}% of max profit",
                    (current_pnl / entry_credit * 100.0).abs()
                ),
                severity: "warning".into(),
            });
        }
    }
    if days_to_expiration <= EXPIRATION_WARNING_DAYS {
        alerts.push(MonitorAlert {
            alert_type: "EXPIRATION_WARNING".into(),
            message: format!("Position expires in {days_to_expiration} days"),
            severity: "info".into(),
        });
    }
    alerts
}

/// Per-leg Greeks in the order the sidecar expects.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LegGreeks {
    pub long_call: Greeks,
    pub short_call: Greeks,
    pub short_put: Greeks,
    pub long_put: Greeks,
}

/// Net position Greeks: short legs add, long legs subtract, scaled to shares.
pub fn local_position_greeks(legs: &LegGreeks, contracts: i32) -> GreeksResponse {
    let scale = f64::from(contracts) * CONTRACT_MULTIPLIER;
    let signed = |g: &Greeks, sign: f64| Greeks {
        delta: g.delta * sign * scale,
        gamma: g.gamma * sign * scale,
        theta: g.theta * sign * scale,
        vega: g.vega * sign * scale,
    };

    let breakdown = [
        ("long_call", signed(&legs.long_call, -1.0)),
        ("short_call", signed(&legs.short_call, 1.0)),
        ("short_put", signed(&legs.short_put, 1.0)),
        ("long_put", signed(&legs.long_put, -1.0)),
    ];

    let portfolio = breakdown.iter().fold(Greeks::default(), |acc, (_, g)| Greeks {
        delta: acc.delta + g.delta,
        gamma: acc.gamma + g.gamma,
        theta: acc.theta + g.theta,
        vega: acc.vega + g.vega,
    });

    GreeksResponse {
        portfolio_greeks: portfolio,
        legs_breakdown: breakdown
            .into_iter()
            .map(|(name, g)| (name.to_string(), g))
            .collect::<HashMap<_, _>>(),
        risk_profile: None,
        daily_estimates: None,
        interpretation: HashMap::new(),
    }
}
