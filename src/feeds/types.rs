//! Normalized market data types and the raw Polygon payloads they come from.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Option right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Call,
    Put,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Call => "call",
            ContractType::Put => "put",
        }
    }
}

impl FromStr for ContractType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "call" | "c" => Ok(ContractType::Call),
            "put" | "p" => Ok(ContractType::Put),
            other => Err(format!("Invalid contract type: {other}")),
        }
    }
}

/// Aggregate bar width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timespan {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Timespan::Minute => "minute",
            Timespan::Hour => "hour",
            Timespan::Day => "day",
            Timespan::Week => "week",
            Timespan::Month => "month",
        };
        f.write_str(s)
    }
}

impl FromStr for Timespan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minute" => Ok(Timespan::Minute),
            "hour" => Ok(Timespan::Hour),
            "day" => Ok(Timespan::Day),
            "week" => Ok(Timespan::Week),
            "month" => Ok(Timespan::Month),
            other => Err(format!("Invalid timespan: {other}")),
        }
    }
}

/// Option sensitivities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    #[serde(default)]
    pub delta: f64,
    #[serde(default)]
    pub gamma: f64,
    #[serde(default)]
    pub theta: f64,
    #[serde(default)]
    pub vega: f64,
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub timestamp: Option<DateTime<Utc>>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub vwap: Option<f64>,
    pub transactions: Option<u64>,
}

/// Latest price for a ticker, derived from the previous session's bar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub change: f64,
    pub change_percent: f64,
    pub as_of: Option<DateTime<Utc>>,
}

impl PriceQuote {
    pub fn from_bar(symbol: &str, bar: &Bar) -> Self {
        let change = bar.close - bar.open;
        let change_percent = if bar.open != 0.0 {
            change / bar.open * 100.0
        } else {
            0.0
        };
        Self {
            symbol: symbol.to_string(),
            price: bar.close,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            volume: bar.volume,
            change,
            change_percent,
            as_of: bar.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub last_price: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub day: Option<Bar>,
    pub prev_close: Option<f64>,
    pub updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastTrade {
    pub symbol: String,
    pub price: f64,
    pub size: f64,
    pub exchange: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastQuote {
    pub symbol: String,
    pub bid_price: f64,
    pub bid_size: f64,
    pub ask_price: f64,
    pub ask_size: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub ticker: String,
    pub underlying_ticker: String,
    pub contract_type: ContractType,
    pub expiration_date: NaiveDate,
    pub strike_price: f64,
    #[serde(default)]
    pub exercise_style: Option<String>,
    #[serde(default)]
    pub shares_per_contract: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionSnapshot {
    pub ticker: String,
    pub contract_type: ContractType,
    pub expiration_date: NaiveDate,
    pub strike_price: f64,
    pub implied_volatility: Option<f64>,
    pub open_interest: Option<f64>,
    pub greeks: Option<Greeks>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub midpoint: Option<f64>,
    pub underlying_price: Option<f64>,
}

// ── Raw Polygon payloads ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct AggsResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<RawBar>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBar {
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v", default)]
    pub volume: f64,
    #[serde(rename = "vw", default)]
    pub vwap: Option<f64>,
    #[serde(rename = "n", default)]
    pub transactions: Option<u64>,
    #[serde(rename = "t", default)]
    pub timestamp_ms: Option<i64>,
}

impl From<&RawBar> for Bar {
    fn from(raw: &RawBar) -> Self {
        Bar {
            timestamp: raw.timestamp_ms.and_then(DateTime::from_timestamp_millis),
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
            vwap: raw.vwap,
            transactions: raw.transactions,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SnapshotResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub ticker: Option<RawTickerSnapshot>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTickerSnapshot {
    pub ticker: String,
    #[serde(rename = "todaysChange", default)]
    pub todays_change: Option<f64>,
    #[serde(rename = "todaysChangePerc", default)]
    pub todays_change_perc: Option<f64>,
    #[serde(default)]
    pub updated: Option<i64>,
    #[serde(default)]
    pub day: Option<RawBar>,
    #[serde(rename = "prevDay", default)]
    pub prev_day: Option<RawBar>,
    #[serde(rename = "lastTrade", default)]
    pub last_trade: Option<RawTrade>,
    #[serde(rename = "lastQuote", default)]
    pub last_quote: Option<RawNbbo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LastTradeResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Option<RawTrade>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTrade {
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "s", default)]
    pub size: f64,
    #[serde(rename = "x", default)]
    pub exchange: Option<i64>,
    #[serde(rename = "t", default)]
    pub timestamp_ns: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LastQuoteResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Option<RawNbbo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawNbbo {
    #[serde(rename = "p", default)]
    pub bid_price: f64,
    #[serde(rename = "s", default)]
    pub bid_size: f64,
    #[serde(rename = "P", default)]
    pub ask_price: f64,
    #[serde(rename = "S", default)]
    pub ask_size: f64,
    #[serde(rename = "t", default)]
    pub timestamp_ns: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContractsResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<OptionContract>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChainResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Option<Vec<RawOptionSnapshot>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawOptionSnapshot {
    pub details: RawOptionDetails,
    #[serde(default)]
    pub greeks: Option<Greeks>,
    #[serde(default)]
    pub implied_volatility: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<f64>,
    #[serde(default)]
    pub last_quote: Option<RawOptionQuote>,
    #[serde(default)]
    pub underlying_asset: Option<RawUnderlying>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawOptionDetails {
    pub ticker: String,
    pub contract_type: ContractType,
    pub expiration_date: NaiveDate,
    pub strike_price: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawOptionQuote {
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
    #[serde(default)]
    pub midpoint: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUnderlying {
    #[serde(default)]
    pub price: Option<f64>,
}

impl From<RawOptionSnapshot> for OptionSnapshot {
    fn from(raw: RawOptionSnapshot) -> Self {
        let quote = raw.last_quote.unwrap_or(RawOptionQuote {
            bid: None,
            ask: None,
            midpoint: None,
        });
        OptionSnapshot {
            ticker: raw.details.ticker,
            contract_type: raw.details.contract_type,
            expiration_date: raw.details.expiration_date,
            strike_price: raw.details.strike_price,
            implied_volatility: raw.implied_volatility,
            open_interest: raw.open_interest,
            greeks: raw.greeks,
            bid: quote.bid,
            ask: quote.ask,
            midpoint: quote.midpoint,
            underlying_price: raw.underlying_asset.and_then(|u| u.price),
        }
    }
}

pub(crate) fn from_nanos(ns: Option<i64>) -> Option<DateTime<Utc>> {
    ns.map(DateTime::from_timestamp_nanos)
}
