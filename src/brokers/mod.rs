//! Broker and data-provider connectivity: OAuth linking and connection tests.

pub mod ctrader;
pub mod ibkr;
pub mod oauth;
pub mod thinkorswim;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BrokersConfig;
use crate::error::{FetchError, GatewayError, Result, Upstream};
use crate::events::bus::{EventBus, GatewayEvent};
use crate::feeds::PolygonClient;
use crate::settings::{ConnectionStatus, Credentials, Provider, SettingsService, SettingsView};
use ibkr::IbkrClient;
use oauth::{AppCredentials, OAuthClient, TokenExchange};

/// Symbol used to prove a Polygon key works.
const POLYGON_CHECK_SYMBOL: &str = "AAPL";
const OAUTH_STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeLink {
    pub provider: Provider,
    pub url: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionTest {
    pub provider: Provider,
    pub status: ConnectionStatus,
    pub detail: String,
    pub tested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingAuth {
    user_id: String,
    provider: Provider,
    created_at: DateTime<Utc>,
}

pub struct BrokerService {
    settings: Arc<SettingsService>,
    polygon: PolygonClient,
    ibkr: IbkrClient,
    ctrader: OAuthClient,
    thinkorswim: OAuthClient,
    bus: Arc<EventBus>,
    pending: DashMap<String, PendingAuth>,
}

impl BrokerService {
    pub fn new(
        config: &BrokersConfig,
        settings: Arc<SettingsService>,
        polygon: PolygonClient,
        bus: Arc<EventBus>,
    ) -> Result<Self> {
        Ok(Self {
            settings,
            polygon,
            ibkr: IbkrClient::new(&config.ibkr)?,
            ctrader: OAuthClient::new(Upstream::CTrader, &config.ctrader, TokenExchange::QueryGet)?,
            thinkorswim: OAuthClient::new(
                Upstream::ThinkorSwim,
                &config.thinkorswim,
                TokenExchange::BasicAuthForm,
            )?,
            bus,
            pending: DashMap::new(),
        })
    }

    /// Start an authorization-code flow for the user's saved app.
    pub async fn authorize_url(&self, user_id: &str, provider: Provider) -> Result<AuthorizeLink> {
        let oauth = self.oauth(provider)?;
        let creds = self.settings.credentials(user_id, provider).await?;
        let app = app_credentials(oauth, &creds);

        let state = Uuid::new_v4().simple().to_string();
        let url = oauth.authorize_url(&app.client_id, &app.redirect_uri, &state)?;

        self.prune_expired();
        self.pending.insert(
            state.clone(),
            PendingAuth {
                user_id: user_id.to_string(),
                provider,
                created_at: Utc::now(),
            },
        );
        info!(user_id, provider = %provider, "oauth authorization started");
        Ok(AuthorizeLink {
            provider,
            url,
            state,
        })
    }

    /// Finish the flow from the redirect callback. Each state is single-use.
    pub async fn complete_oauth(&self, state: &str, code: &str) -> Result<SettingsView> {
        let (_, pending) = self
            .pending
            .remove(state)
            .ok_or_else(|| GatewayError::validation("Unknown or expired OAuth state"))?;
        if is_expired(&pending, Utc::now()) {
            return Err(GatewayError::validation("Unknown or expired OAuth state"));
        }

        let provider = pending.provider;
        let user_id = pending.user_id.as_str();
        let oauth = self.oauth(provider)?;
        let creds = self.settings.credentials(user_id, provider).await?;
        let app = app_credentials(oauth, &creds);

        match oauth.exchange_code(&app, code).await {
            Ok(tokens) => {
                let view = self
                    .settings
                    .store_tokens(user_id, provider, tokens.into_secrets())
                    .await?;
                self.publish_status(user_id, provider, ConnectionStatus::Connected, None);
                Ok(view)
            }
            Err(e) => {
                let msg = e.to_string();
                warn!(user_id, provider = %provider, error = %msg, "oauth code exchange failed");
                self.settings
                    .set_status(user_id, provider, ConnectionStatus::Error, Some(&msg))
                    .await?;
                self.publish_status(user_id, provider, ConnectionStatus::Error, Some(msg));
                Err(e.into())
            }
        }
    }

    /// Call the provider with the stored settings and record the outcome.
    pub async fn test_connection(&self, user_id: &str, provider: Provider) -> Result<ConnectionTest> {
        let creds = self.settings.credentials(user_id, provider).await?;
        let result = match provider {
            Provider::Polygon => self.check_polygon(&creds).await,
            Provider::Ibkr => self.check_ibkr(&creds).await,
            Provider::CTrader => ctrader::trading_accounts(&self.ctrader, &creds)
                .await
                .map(|accounts| format!("{} trading account(s) available", accounts.len()))
                .map_err(|e| e.to_string()),
            Provider::ThinkorSwim => thinkorswim::account_numbers(&self.thinkorswim, &creds)
                .await
                .map(|accounts| format!("{} account(s) linked", accounts.len()))
                .map_err(|e| e.to_string()),
        };

        let (status, detail) = match result {
            Ok(detail) => (ConnectionStatus::Connected, detail),
            Err(detail) => (ConnectionStatus::Error, detail),
        };
        let last_error = (status == ConnectionStatus::Error).then_some(detail.as_str());
        self.settings
            .set_status(user_id, provider, status, last_error)
            .await?;

        info!(user_id, provider = %provider, status = status.as_str(), "connection tested");
        self.publish_status(user_id, provider, status, Some(detail.clone()));
        Ok(ConnectionTest {
            provider,
            status,
            detail,
            tested_at: Utc::now(),
        })
    }

    async fn check_polygon(&self, creds: &Credentials) -> std::result::Result<String, String> {
        let key = creds
            .secret("api_key")
            .ok_or_else(|| "Polygon API key is not configured".to_string())?;
        self.polygon
            .with_api_key(key)
            .previous_close(POLYGON_CHECK_SYMBOL)
            .await
            .map(|q| format!("{} previous close {:.2}", q.symbol, q.price))
            .map_err(|e| e.to_string())
    }

    async fn check_ibkr(&self, creds: &Credentials) -> std::result::Result<String, String> {
        let status = self.ibkr.auth_status(creds).await.map_err(|e| e.to_string())?;
        if status.authenticated {
            Ok("Gateway session authenticated".to_string())
        } else {
            Err(status
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Gateway session is not authenticated".to_string()))
        }
    }

    fn oauth(&self, provider: Provider) -> Result<&OAuthClient> {
        match provider {
            Provider::CTrader => Ok(&self.ctrader),
            Provider::ThinkorSwim => Ok(&self.thinkorswim),
            other => Err(FetchError::invalid_input(format!("{other} does not use OAuth")).into()),
        }
    }

    fn prune_expired(&self) {
        let now = Utc::now();
        self.pending.retain(|_, p| !is_expired(p, now));
    }

    fn publish_status(
        &self,
        user_id: &str,
        provider: Provider,
        status: ConnectionStatus,
        detail: Option<String>,
    ) {
        self.bus.publish(GatewayEvent::ConnectionStatusChanged {
            user_id: user_id.to_string(),
            provider: provider.as_str().to_string(),
            status: status.as_str().to_string(),
            detail,
        });
    }
}

fn is_expired(pending: &PendingAuth, now: DateTime<Utc>) -> bool {
    now - pending.created_at > Duration::minutes(OAUTH_STATE_TTL_MINUTES)
}

/// User-saved app settings win over process-wide defaults.
fn app_credentials(oauth: &OAuthClient, creds: &Credentials) -> AppCredentials {
    let config = oauth.config();
    AppCredentials {
        client_id: creds
            .field("client_id")
            .unwrap_or(config.client_id.as_str())
            .to_string(),
        client_secret: creds
            .secret("client_secret")
            .unwrap_or(config.client_secret.as_str())
            .to_string(),
        redirect_uri: creds
            .field("redirect_uri")
            .unwrap_or(config.redirect_uri.as_str())
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_expire_after_ttl() {
        let now = Utc::now();
        let fresh = PendingAuth {
            user_id: "u1".into(),
            provider: Provider::CTrader,
            created_at: now - Duration::minutes(1),
        };
        let stale = PendingAuth {
            created_at: now - Duration::minutes(OAUTH_STATE_TTL_MINUTES + 1),
            ..fresh.clone()
        };
        assert!(!is_expired(&fresh, now));
        assert!(is_expired(&stale, now));
    }
}
