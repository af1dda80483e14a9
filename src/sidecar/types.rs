//! Request and response shapes of the analytics sidecar.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::feeds::types::Greeks;

/// The four strikes of an iron condor, keyed the way the sidecar expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrikeMap {
    pub long_call: f64,
    pub short_call: f64,
    pub short_put: f64,
    pub long_put: f64,
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataRequest {
    pub symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub symbol: String,
    pub expiration_date: NaiveDate,
    pub long_call_strike: f64,
    pub short_call_strike: f64,
    pub short_put_strike: f64,
    pub long_put_strike: f64,
    pub contracts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implied_volatility: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_free_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GreeksRequest {
    pub long_call_greeks: Greeks,
    pub short_call_greeks: Greeks,
    pub short_put_greeks: Greeks,
    pub long_put_greeks: Greeks,
    pub contracts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationRequest {
    pub symbol: String,
    pub expiration_date: NaiveDate,
    pub current_price: f64,
    pub implied_volatility: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_probability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wing_width: Option<f64>,
    #[serde(default = "one")]
    pub contracts: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorRequest {
    pub strategy_id: i64,
    pub symbol: String,
    pub expiration_date: NaiveDate,
    pub strikes: StrikeMap,
    pub contracts: u32,
    pub entry_credit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpdateRequest {
    pub positions: Vec<BatchPosition>,
    pub market_data: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPosition {
    pub id: i64,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<f64>,
}

// ── Responses ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarHealth {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub uptime: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataResponse {
    pub data: HashMap<String, SymbolAnalytics>,
    #[serde(default)]
    pub symbols_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolAnalytics {
    pub price: MarketPrice,
    #[serde(default)]
    pub indicators: HashMap<String, f64>,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub processed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPrice {
    pub symbol: String,
    pub last: f64,
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub open: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub change: Option<f64>,
    #[serde(default)]
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentiment {
    pub score: f64,
    pub signal: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionsResponse {
    pub account_id: String,
    pub positions: Vec<BrokerPosition>,
    #[serde(default)]
    pub total_positions: usize,
    #[serde(default)]
    pub total_unrealized_pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub position_id: String,
    pub symbol: String,
    pub position_type: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub unrealized_pnl: f64,
    #[serde(default)]
    pub commission: f64,
    #[serde(default)]
    pub open_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityResponse {
    pub data: EquitySnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquitySnapshot {
    pub broker: String,
    #[serde(default)]
    pub account_id: Option<String>,
    pub equity_balance: f64,
    pub cash_balance: f64,
    pub margin_used: f64,
    pub available_margin: f64,
    pub unrealized_pnl: f64,
    #[serde(default)]
    pub margin_level: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: IronCondorAnalysis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IronCondorAnalysis {
    pub risk_reward: RiskReward,
    pub breakevens: Breakevens,
    pub probability: ProbabilityAnalysis,
    #[serde(default)]
    pub sensitivity: Option<Sensitivity>,
    #[serde(default)]
    pub recommendations: Option<Recommendations>,
    #[serde(default)]
    pub quality_metrics: Option<QualityMetrics>,
    #[serde(default)]
    pub payoff_profile: Vec<PayoffPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReward {
    pub max_profit: f64,
    pub max_loss: f64,
    pub return_on_risk_percent: f64,
    #[serde(default)]
    pub risk_reward_ratio: f64,
    pub net_credit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakevens {
    pub upper: f64,
    pub lower: f64,
    #[serde(default)]
    pub range: f64,
    #[serde(default)]
    pub range_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilityAnalysis {
    pub profit_percent: f64,
    #[serde(default)]
    pub loss_percent: f64,
    #[serde(default)]
    pub short_call_itm_percent: f64,
    #[serde(default)]
    pub short_put_itm_percent: f64,
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sensitivity {
    pub upside_room_percent: f64,
    pub downside_room_percent: f64,
    pub days_to_expiration: i64,
    pub implied_volatility: f64,
    pub current_price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendations {
    pub optimal_long_call_strike: f64,
    pub optimal_short_call_strike: f64,
    pub optimal_short_put_strike: f64,
    pub optimal_long_put_strike: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub score: f64,
    pub rating: String,
    #[serde(default)]
    pub factors: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PayoffPoint {
    pub price: f64,
    pub pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreeksResponse {
    pub portfolio_greeks: Greeks,
    #[serde(default)]
    pub legs_breakdown: HashMap<String, Greeks>,
    #[serde(default)]
    pub risk_profile: Option<RiskProfile>,
    #[serde(default)]
    pub daily_estimates: Option<DailyEstimates>,
    #[serde(default)]
    pub interpretation: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    pub delta_neutral: bool,
    pub positive_theta: bool,
    pub negative_vega: bool,
    pub gamma_risk: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyEstimates {
    pub theta_decay_pnl: f64,
    pub pnl_if_underlying_up_1pct: f64,
    pub pnl_if_underlying_down_1pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResponse {
    pub optimal_strikes: StrikeMap,
    pub expected_performance: IronCondorAnalysis,
    #[serde(default)]
    pub optimization_parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorResponse {
    pub position_status: PositionStatus,
    #[serde(default)]
    pub alerts: Vec<MonitorAlert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionStatus {
    pub strategy_id: i64,
    pub current_price: f64,
    pub current_pnl: f64,
    pub pnl_percent: f64,
    pub days_to_expiration: i64,
    pub entry_credit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorAlert {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUpdateResponse {
    pub updates: Vec<PositionUpdate>,
    #[serde(default)]
    pub total_updated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionUpdate {
    #[serde(default)]
    pub position_id: Option<i64>,
    #[serde(default)]
    pub symbol: Option<String>,
    pub current_price: f64,
    #[serde(default)]
    pub updated_at: Option<String>,
}
