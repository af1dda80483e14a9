//! Interactive Brokers Client Portal gateway.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::IbkrConfig;
use crate::error::{FetchError, GatewayError, Upstream};
use crate::feeds::http::send_json;
use crate::settings::Credentials;

const UPSTREAM: Upstream = Upstream::Ibkr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthStatus {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub competing: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone)]
pub struct IbkrClient {
    client: Client,
}

impl IbkrClient {
    pub fn new(config: &IbkrConfig) -> crate::error::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build ibkr client: {e}")))?;
        Ok(Self { client })
    }

    /// `POST /v1/api/iserver/auth/status` on the user's gateway.
    pub async fn auth_status(&self, creds: &Credentials) -> Result<AuthStatus, FetchError> {
        let base = gateway_url(creds)?;
        let url = format!("{base}/v1/api/iserver/auth/status");
        send_json(UPSTREAM, self.client.post(&url), "auth status").await
    }
}

/// `{scheme}://{host}:{port}`. The gateway serves https unless told otherwise.
pub fn gateway_url(creds: &Credentials) -> Result<String, FetchError> {
    let host = creds
        .field("host")
        .ok_or_else(|| FetchError::invalid_input("IBKR gateway host is not configured"))?;
    let port: u16 = creds
        .field("port")
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(|| FetchError::invalid_input("IBKR gateway port is not configured"))?;
    let scheme = creds.field("scheme").unwrap_or("https");
    Ok(format!("{scheme}://{}:{port}", host.trim()))
}
