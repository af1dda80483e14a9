//! Polygon.io REST fetchers.
//!
//! Every call validates its inputs first, attaches `apiKey`, issues exactly one
//! request under the client timeout and returns a normalized payload or a
//! classified [`FetchError`]. Nothing is retried.

use chrono::NaiveDate;
use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::http::{build_client, send_json};
use super::types::*;
use crate::config::PolygonConfig;
use crate::error::{FetchError, Upstream};

const UPSTREAM: Upstream = Upstream::Polygon;
const MAX_CONTRACTS_LIMIT: u32 = 1000;
const MAX_CHAIN_LIMIT: u32 = 250;

/// Parameters for `/v2/aggs/ticker/{T}/range/...`.
#[derive(Debug, Clone)]
pub struct AggregatesRequest {
    pub symbol: String,
    pub multiplier: u32,
    pub timespan: Timespan,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Filters for `/v3/reference/options/contracts`.
#[derive(Debug, Clone, Default)]
pub struct ContractsQuery {
    pub underlying: String,
    pub expiration_date: Option<NaiveDate>,
    pub contract_type: Option<ContractType>,
    pub limit: Option<u32>,
}

/// Filters for `/v3/snapshot/options/{underlying}`.
#[derive(Debug, Clone, Default)]
pub struct ChainQuery {
    pub expiration_date: Option<NaiveDate>,
    pub contract_type: Option<ContractType>,
    pub limit: Option<u32>,
}

#[derive(Clone)]
pub struct PolygonClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PolygonClient {
    pub fn new(config: &PolygonConfig) -> crate::error::Result<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Same transport, different key. Used to test a user's stored key.
    pub fn with_api_key(&self, api_key: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: api_key.into(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Previous session's bar for `symbol`.
    pub async fn previous_close(&self, symbol: &str) -> Result<PriceQuote, FetchError> {
        let symbol = normalize_symbol(symbol)?;
        self.require_key()?;

        let path = format!("/v2/aggs/ticker/{symbol}/prev");
        let resp: AggsResponse = self.get(&path, &[("adjusted", "true".into())], "quote").await?;
        check_status(resp.status.as_deref(), resp.error.as_deref())?;

        let bar = resp
            .results
            .as_deref()
            .and_then(|r| r.first())
            .map(Bar::from)
            .ok_or_else(|| no_data(&symbol))?;
        Ok(PriceQuote::from_bar(&symbol, &bar))
    }

    /// Single-ticker price used by the batch fetcher.
    pub async fn fetch_price(&self, symbol: &str) -> Result<PriceQuote, FetchError> {
        self.previous_close(symbol).await
    }

    pub async fn aggregates(&self, req: &AggregatesRequest) -> Result<Vec<Bar>, FetchError> {
        let symbol = normalize_symbol(&req.symbol)?;
        if req.multiplier == 0 {
            return Err(FetchError::invalid_input("Multiplier must be at least 1"));
        }
        if req.from > req.to {
            return Err(FetchError::invalid_input(
                "Start date must be on or before end date",
            ));
        }
        self.require_key()?;

        let path = format!(
            "/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            symbol,
            req.multiplier,
            req.timespan,
            req.from.format("%Y-%m-%d"),
            req.to.format("%Y-%m-%d"),
        );
        let query = [
            ("adjusted", "true".to_string()),
            ("sort", "asc".to_string()),
            ("limit", "5000".to_string()),
        ];
        let resp: AggsResponse = self.get(&path, &query, "aggregates").await?;
        check_status(resp.status.as_deref(), resp.error.as_deref())?;

        let bars: Vec<Bar> = resp.results.unwrap_or_default().iter().map(Bar::from).collect();
        if bars.is_empty() {
            return Err(no_data(&symbol));
        }
        Ok(bars)
    }

    pub async fn snapshot(&self, symbol: &str) -> Result<TickerSnapshot, FetchError> {
        let symbol = normalize_symbol(symbol)?;
        self.require_key()?;

        let path = format!("/v2/snapshot/locale/us/markets/stocks/tickers/{symbol}");
        let resp: SnapshotResponse = self.get(&path, &[], "snapshot").await?;
        check_status(resp.status.as_deref(), resp.error.as_deref())?;

        let raw = resp.ticker.ok_or_else(|| no_data(&symbol))?;
        Ok(TickerSnapshot {
            symbol: raw.ticker,
            last_price: raw
                .last_trade
                .as_ref()
                .map(|t| t.price)
                .or_else(|| raw.day.as_ref().map(|d| d.close)),
            change: raw.todays_change,
            change_percent: raw.todays_change_perc,
            bid: raw.last_quote.as_ref().map(|q| q.bid_price),
            ask: raw.last_quote.as_ref().map(|q| q.ask_price),
            day: raw.day.as_ref().map(Bar::from),
            prev_close: raw.prev_day.as_ref().map(|d| d.close),
            updated: from_nanos(raw.updated),
        })
    }

    pub async fn last_trade(&self, symbol: &str) -> Result<LastTrade, FetchError> {
        let symbol = normalize_symbol(symbol)?;
        self.require_key()?;

        let path = format!("/v2/last/trade/{symbol}");
        let resp: LastTradeResponse = self.get(&path, &[], "last trade").await?;
        check_status(resp.status.as_deref(), resp.error.as_deref())?;

        let t = resp.results.ok_or_else(|| no_data(&symbol))?;
        Ok(LastTrade {
            symbol,
            price: t.price,
            size: t.size,
            exchange: t.exchange,
            timestamp: from_nanos(t.timestamp_ns),
        })
    }

    pub async fn last_quote(&self, symbol: &str) -> Result<LastQuote, FetchError> {
        let symbol = normalize_symbol(symbol)?;
        self.require_key()?;

        let path = format!("/v2/last/nbbo/{symbol}");
        let resp: LastQuoteResponse = self.get(&path, &[], "last quote").await?;
        check_status(resp.status.as_deref(), resp.error.as_deref())?;

        let q = resp.results.ok_or_else(|| no_data(&symbol))?;
        Ok(LastQuote {
            symbol,
            bid_price: q.bid_price,
            bid_size: q.bid_size,
            ask_price: q.ask_price,
            ask_size: q.ask_size,
            timestamp: from_nanos(q.timestamp_ns),
        })
    }

    pub async fn options_contracts(
        &self,
        query: &ContractsQuery,
    ) -> Result<Vec<OptionContract>, FetchError> {
        let underlying = normalize_symbol(&query.underlying)?;
        let limit = check_limit(query.limit, MAX_CONTRACTS_LIMIT)?;
        self.require_key()?;

        let mut params = vec![
            ("underlying_ticker", underlying.clone()),
            ("limit", limit.to_string()),
            ("expired", "false".to_string()),
        ];
        if let Some(exp) = query.expiration_date {
            params.push(("expiration_date", exp.format("%Y-%m-%d").to_string()));
        }
        if let Some(ct) = query.contract_type {
            params.push(("contract_type", ct.as_str().to_string()));
        }

        let resp: ContractsResponse = self
            .get("/v3/reference/options/contracts", &params, "options contracts")
            .await?;
        check_status(resp.status.as_deref(), resp.error.as_deref())?;

        let contracts = resp.results.unwrap_or_default();
        if contracts.is_empty() {
            return Err(FetchError::not_found(
                UPSTREAM,
                format!("No options contracts found for {underlying}"),
            ));
        }
        Ok(contracts)
    }

    pub async fn option_chain(
        &self,
        underlying: &str,
        query: &ChainQuery,
    ) -> Result<Vec<OptionSnapshot>, FetchError> {
        let underlying = normalize_symbol(underlying)?;
        let limit = check_limit(query.limit, MAX_CHAIN_LIMIT)?;
        self.require_key()?;

        let mut params = vec![("limit", limit.to_string())];
        if let Some(exp) = query.expiration_date {
            params.push(("expiration_date", exp.format("%Y-%m-%d").to_string()));
        }
        if let Some(ct) = query.contract_type {
            params.push(("contract_type", ct.as_str().to_string()));
        }

        let path = format!("/v3/snapshot/options/{underlying}");
        let resp: ChainResponse = self.get(&path, &params, "options chain").await?;
        check_status(resp.status.as_deref(), resp.error.as_deref())?;

        let chain: Vec<OptionSnapshot> = resp
            .results
            .unwrap_or_default()
            .into_iter()
            .map(OptionSnapshot::from)
            .collect();
        if chain.is_empty() {
            return Err(FetchError::not_found(
                UPSTREAM,
                format!("No options chain found for {underlying}"),
            ));
        }
        Ok(chain)
    }

    fn require_key(&self) -> Result<(), FetchError> {
        if self.has_api_key() {
            Ok(())
        } else {
            Err(FetchError::invalid_input("Polygon API key is not configured"))
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        resource: &str,
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path, "polygon request");
        let request = self
            .client
            .get(&url)
            .query(query)
            .query(&[("apiKey", self.api_key.as_str())]);
        send_json(UPSTREAM, request, resource).await
    }
}

/// Trim and upper-case a ticker; reject empty or malformed input.
pub fn normalize_symbol(symbol: &str) -> Result<String, FetchError> {
    let s = symbol.trim().to_uppercase();
    if s.is_empty() {
        return Err(FetchError::invalid_input("Symbol is required"));
    }
    let valid = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '-'));
    if !valid || s.len() > 32 {
        return Err(FetchError::invalid_input(format!(
            "Invalid symbol format: {}",
            symbol.trim()
        )));
    }
    Ok(s)
}

fn check_limit(limit: Option<u32>, max: u32) -> Result<u32, FetchError> {
    match limit {
        None => Ok(max.min(250)),
        Some(0) => Err(FetchError::invalid_input("Limit must be at least 1")),
        Some(n) if n > max => Err(FetchError::invalid_input(format!(
            "Limit must not exceed {max}"
        ))),
        Some(n) => Ok(n),
    }
}

/// Polygon occasionally answers 200 with `"status": "ERROR"`.
fn check_status(status: Option<&str>, error: Option<&str>) -> Result<(), FetchError> {
    match status {
        Some("ERROR") => Err(FetchError::Api {
            upstream: UPSTREAM,
            status: 200,
            detail: error.unwrap_or("unknown error").to_string(),
        }),
        Some("NOT_AUTHORIZED") => Err(FetchError::Forbidden { upstream: UPSTREAM }),
        _ => Ok(()),
    }
}

fn no_data(symbol: &str) -> FetchError {
    FetchError::not_found(UPSTREAM, format!("No data found for symbol {symbol}"))
}
