//! HTTP client for the analytics sidecar.
//!
//! The sidecar owns all pricing math. Every response is checked for its
//! `success` flag at the boundary before being decoded into a typed payload.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::types::*;
use crate::config::AnalyticsConfig;
use crate::error::{FetchError, Upstream};
use crate::feeds::http::{build_client, send_json};

const UPSTREAM: Upstream = Upstream::Analytics;

#[derive(Clone)]
pub struct AnalyticsClient {
    client: Client,
    base_url: String,
}

impl AnalyticsClient {
    pub fn new(config: &AnalyticsConfig) -> crate::error::Result<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<SidecarHealth, FetchError> {
        let url = format!("{}/health", self.base_url);
        send_json(UPSTREAM, self.client.get(&url), "health").await
    }

    pub async fn market_data(
        &self,
        request: &MarketDataRequest,
    ) -> Result<MarketDataResponse, FetchError> {
        if request.symbols.iter().all(|s| s.trim().is_empty()) {
            return Err(FetchError::invalid_input("At least one symbol is required"));
        }
        self.post("/market-data", request, "market data").await
    }

    pub async fn positions(&self, account_id: Option<&str>) -> Result<PositionsResponse, FetchError> {
        self.get_with_account("/positions", account_id, "positions").await
    }

    pub async fn equity(&self, account_id: Option<&str>) -> Result<EquityResponse, FetchError> {
        self.get_with_account("/equity", account_id, "equity").await
    }

    pub async fn analyze_iron_condor(
        &self,
        request: &AnalysisRequest,
    ) -> Result<IronCondorAnalysis, FetchError> {
        if request.symbol.trim().is_empty() {
            return Err(FetchError::invalid_input("Symbol is required"));
        }
        if request.contracts == 0 {
            return Err(FetchError::invalid_input("Contracts must be at least 1"));
        }
        let resp: AnalysisResponse = self
            .post("/iron-condor/analyze", request, "iron condor analysis")
            .await?;
        Ok(resp.analysis)
    }

    pub async fn iron_condor_greeks(
        &self,
        request: &GreeksRequest,
    ) -> Result<GreeksResponse, FetchError> {
        if request.contracts == 0 {
            return Err(FetchError::invalid_input("Contracts must be at least 1"));
        }
        self.post("/iron-condor/greeks", request, "iron condor greeks").await
    }

    pub async fn optimize_iron_condor(
        &self,
        request: &OptimizationRequest,
    ) -> Result<OptimizationResponse, FetchError> {
        if request.symbol.trim().is_empty() {
            return Err(FetchError::invalid_input("Symbol is required"));
        }
        if request.current_price <= 0.0 {
            return Err(FetchError::invalid_input("Current price must be positive"));
        }
        if request.implied_volatility <= 0.0 {
            return Err(FetchError::invalid_input(
                "Implied volatility must be positive",
            ));
        }
        if let Some(p) = request.target_probability {
            if !(0.5..=0.95).contains(&p) {
                return Err(FetchError::invalid_input(
                    "Target probability must be between 0.5 and 0.95",
                ));
            }
        }
        self.post("/iron-condor/optimize", request, "iron condor optimization")
            .await
    }

    pub async fn monitor_position(
        &self,
        request: &MonitorRequest,
    ) -> Result<MonitorResponse, FetchError> {
        if request.entry_credit == 0.0 {
            return Err(FetchError::invalid_input(
                "Entry credit is required to monitor a position",
            ));
        }
        self.post("/iron-condor/monitor", request, "position monitor").await
    }

    pub async fn batch_update(
        &self,
        request: &BatchUpdateRequest,
    ) -> Result<BatchUpdateResponse, FetchError> {
        if request.positions.is_empty() {
            return Err(FetchError::invalid_input("At least one position is required"));
        }
        self.post("/iron-condor/batch-update", request, "batch update").await
    }

    async fn get_with_account<T: DeserializeOwned>(
        &self,
        path: &str,
        account_id: Option<&str>,
        resource: &str,
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(id) = account_id.filter(|id| !id.trim().is_empty()) {
            request = request.query(&[("account_id", id)]);
        }
        let value: Value = send_json(UPSTREAM, request, resource).await?;
        unwrap_envelope(value)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        resource: &str,
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        let value: Value = send_json(UPSTREAM, self.client.post(&url).json(body), resource).await?;
        unwrap_envelope(value)
    }
}

/// Accept only `{"success": true, ...}` bodies.
fn unwrap_envelope<T: DeserializeOwned>(value: Value) -> Result<T, FetchError> {
    match value.get("success").and_then(Value::as_bool) {
        Some(true) => serde_json::from_value(value).map_err(|e| FetchError::Decode {
            upstream: UPSTREAM,
            detail: e.to_string(),
        }),
        Some(false) => {
            let detail = ["error", "detail", "message"]
                .iter()
                .find_map(|k| value.get(*k).and_then(Value::as_str))
                .unwrap_or("request was not successful")
                .to_string();
            Err(FetchError::Api {
                upstream: UPSTREAM,
                status: 200,
                detail,
            })
        }
        None => Err(FetchError::Decode {
            upstream: UPSTREAM,
            detail: "response is missing the success flag".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;
    use serde_json::json;

    #[test]
    fn envelope_success_decodes_payload() {
        let body = json!({
            "success": true,
            "account_id": "DEFAULT",
            "positions": [],
            "total_positions": 0,
            "total_unrealized_pnl": 0.0,
            "timestamp": "2025-01-01T00:00:00"
        });
        let resp: PositionsResponse = unwrap_envelope(body).unwrap();
        assert_eq!(resp.account_id, "DEFAULT");
    }

    #[test]
    fn envelope_failure_is_an_api_error() {
        let body = json!({"success": false, "error": "model not loaded"});
        let err = unwrap_envelope::<PositionsResponse>(body).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Api);
        assert!(err.to_string().contains("model not loaded"));
    }

    #[test]
    fn envelope_without_flag_is_rejected() {
        let err = unwrap_envelope::<PositionsResponse>(json!({"positions": []})).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::Decode);
    }

    #[tokio::test]
    async fn empty_batch_update_fails_before_network() {
        let client = AnalyticsClient::new(&AnalyticsConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 1,
        })
        .unwrap();
        let err = client
            .batch_update(&BatchUpdateRequest {
                positions: vec![],
                market_data: Default::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::InvalidInput);
    }
}
