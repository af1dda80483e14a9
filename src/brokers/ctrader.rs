//! cTrader Open API account check.

use serde::Deserialize;

use super::oauth::OAuthClient;
use crate::error::{FetchError, Upstream};
use crate::feeds::http::send_json;
use crate::settings::Credentials;

#[derive(Debug, Clone, Deserialize)]
pub struct TradingAccount {
    #[serde(alias = "accountId", alias = "ctidTraderAccountId")]
    pub account_id: i64,
    #[serde(default, alias = "accountNumber")]
    pub account_number: Option<i64>,
    #[serde(default)]
    pub live: Option<bool>,
    #[serde(default, alias = "brokerName")]
    pub broker_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    #[serde(default)]
    data: Vec<TradingAccount>,
}

/// `GET /connect/tradingaccounts?access_token=...`
pub async fn trading_accounts(
    oauth: &OAuthClient,
    creds: &Credentials,
) -> Result<Vec<TradingAccount>, FetchError> {
    let token = creds
        .secret("access_token")
        .ok_or_else(|| FetchError::invalid_input("cTrader is not authorized yet"))?;
    let request = oauth
        .http()
        .get(oauth.api_url("/connect/tradingaccounts"))
        .query(&[("access_token", token)]);
    let resp: AccountsResponse = send_json(Upstream::CTrader, request, "trading accounts").await?;
    Ok(resp.data)
}
