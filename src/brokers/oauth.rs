//! OAuth2 authorization-code flow shared by cTrader and ThinkorSwim.

use std::collections::BTreeMap;

use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::OAuthProviderConfig;
use crate::error::{FetchError, Upstream};
use crate::feeds::http::{build_client, send_json};

/// How the token endpoint wants the code exchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenExchange {
    /// `GET token_url?grant_type=...&client_secret=...` (cTrader).
    QueryGet,
    /// Form `POST` with HTTP basic client auth (Schwab / ThinkorSwim).
    BasicAuthForm,
}

/// Tokens issued by a successful exchange. cTrader answers in camelCase.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenSet {
    #[serde(alias = "accessToken")]
    pub access_token: String,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
    #[serde(default, alias = "expiresIn")]
    pub expires_in: Option<i64>,
    #[serde(default, alias = "tokenType")]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenSet {
    /// Secret-map entries to persist.
    pub fn into_secrets(self) -> BTreeMap<String, String> {
        let mut secrets = BTreeMap::new();
        secrets.insert("access_token".to_string(), self.access_token);
        if let Some(refresh) = self.refresh_token {
            secrets.insert("refresh_token".to_string(), refresh);
        }
        secrets
    }
}

/// App credentials resolved for one exchange.
#[derive(Debug, Clone)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Clone)]
pub struct OAuthClient {
    client: Client,
    upstream: Upstream,
    config: OAuthProviderConfig,
    exchange: TokenExchange,
}

impl OAuthClient {
    pub fn new(
        upstream: Upstream,
        config: &OAuthProviderConfig,
        exchange: TokenExchange,
    ) -> crate::error::Result<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            upstream,
            config: config.clone(),
            exchange,
        })
    }

    pub fn config(&self) -> &OAuthProviderConfig {
        &self.config
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// URL the user is sent to for consent.
    pub fn authorize_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, FetchError> {
        if client_id.trim().is_empty() {
            return Err(FetchError::invalid_input(format!(
                "{} client_id is not configured",
                self.upstream
            )));
        }
        if redirect_uri.trim().is_empty() {
            return Err(FetchError::invalid_input("redirect_uri is required"));
        }
        let mut params = vec![
            ("response_type", "code"),
            ("client_id", client_id),
            ("redirect_uri", redirect_uri),
            ("state", state),
        ];
        if !self.config.scope.is_empty() {
            params.push(("scope", self.config.scope.as_str()));
        }
        let url = Url::parse_with_params(&self.config.authorize_url, &params)
            .map_err(|e| FetchError::invalid_input(format!("invalid authorize_url: {e}")))?;
        Ok(url.to_string())
    }

    /// Trade an authorization code for tokens. One request, no retry.
    pub async fn exchange_code(
        &self,
        app: &AppCredentials,
        code: &str,
    ) -> Result<TokenSet, FetchError> {
        if code.trim().is_empty() {
            return Err(FetchError::invalid_input("Authorization code is required"));
        }
        if app.client_id.trim().is_empty() || app.client_secret.trim().is_empty() {
            return Err(FetchError::invalid_input(format!(
                "{} client credentials are not configured",
                self.upstream
            )));
        }

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", app.redirect_uri.as_str()),
        ];
        debug!(upstream = %self.upstream, style = ?self.exchange, "token exchange");
        let request = match self.exchange {
            TokenExchange::QueryGet => self.client.get(&self.config.token_url).query(&params).query(&[
                ("client_id", app.client_id.as_str()),
                ("client_secret", app.client_secret.as_str()),
            ]),
            TokenExchange::BasicAuthForm => self
                .client
                .post(&self.config.token_url)
                .basic_auth(&app.client_id, Some(&app.client_secret))
                .form(&params),
        };

        let body: Value = send_json(self.upstream, request, "token").await?;
        decode_token_body(self.upstream, body)
    }
}

/// cTrader reports exchange failures inside a 200 body.
fn decode_token_body(upstream: Upstream, body: Value) -> Result<TokenSet, FetchError> {
    if let Some(code) = body.get("errorCode").filter(|v| !v.is_null()) {
        let detail = body
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| code.to_string());
        return Err(FetchError::Api {
            upstream,
            status: 200,
            detail,
        });
    }
    serde_json::from_value(body).map_err(|e| FetchError::Decode {
        upstream,
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctrader() -> OAuthClient {
        let config = OAuthProviderConfig {
            authorize_url: "https://openapi.ctrader.com/apps/auth".into(),
            token_url: "https://openapi.ctrader.com/apps/token".into(),
            api_base_url: "https://api.spotware.com".into(),
            scope: "trading".into(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            timeout_secs: 5,
        };
        OAuthClient::new(Upstream::CTrader, &config, TokenExchange::QueryGet).unwrap()
    }

    #[test]
    fn authorize_url_carries_client_redirect_scope_and_state() {
        let url = ctrader()
            .authorize_url("app-1", "http://localhost:8080/cb", "st-9")
            .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let q: BTreeMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(q["client_id"], "app-1");
        assert_eq!(q["redirect_uri"], "http://localhost:8080/cb");
        assert_eq!(q["scope"], "trading");
        assert_eq!(q["state"], "st-9");
        assert_eq!(q["response_type"], "code");
    }

    #[test]
    fn authorize_url_requires_client_id() {
        assert!(ctrader().authorize_url("", "http://cb", "s").is_err());
    }

    #[test]
    fn camel_case_tokens_decode() {
        let t = decode_token_body(
            Upstream::CTrader,
            json!({"accessToken": "at", "refreshToken": "rt", "expiresIn": 2628000, "tokenType": "bearer"}),
        )
        .unwrap();
        assert_eq!(t.access_token, "at");
        assert_eq!(t.into_secrets().len(), 2);
    }

    #[test]
    fn error_code_in_body_is_an_api_error() {
        let err = decode_token_body(
            Upstream::CTrader,
            json!({"errorCode": "ACCESS_DENIED", "description": "Code expired", "accessToken": null}),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "cTrader API error (200): Code expired");
    }

    #[tokio::test]
    async fn empty_code_fails_before_network() {
        let app = AppCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            redirect_uri: "http://cb".into(),
        };
        let err = ctrader().exchange_code(&app, " ").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidInput(_)));
    }
}
