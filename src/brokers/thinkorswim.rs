//! Schwab / ThinkorSwim trader API account check.

use serde::Deserialize;

use super::oauth::OAuthClient;
use crate::error::{FetchError, Upstream};
use crate::feeds::http::send_json;
use crate::settings::Credentials;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountNumber {
    pub account_number: String,
    #[serde(default)]
    pub hash_value: Option<String>,
}

/// `GET /trader/v1/accounts/accountNumbers` with the stored bearer token.
pub async fn account_numbers(
    oauth: &OAuthClient,
    creds: &Credentials,
) -> Result<Vec<AccountNumber>, FetchError> {
    let token = creds
        .secret("access_token")
        .ok_or_else(|| FetchError::invalid_input("ThinkorSwim is not authorized yet"))?;
    let request = oauth
        .http()
        .get(oauth.api_url("/trader/v1/accounts/accountNumbers"))
        .bearer_auth(token);
    send_json(Upstream::ThinkorSwim, request, "account numbers").await
}
