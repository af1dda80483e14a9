//! Per-user connection settings with masked secrets.
//!
//! Non-secret fields round-trip exactly. Secrets are write-only from the
//! outside: a stored secret reads back as [`SECRET_MASK`], and saving the
//! mask (or an empty value) keeps what is stored. Secrets are sealed with
//! [`SecretCipher`] before they reach the store.

pub mod crypto;

pub use crypto::SecretCipher;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use tracing::info;

use crate::db::models::SettingsRow;
use crate::db::Store;
use crate::error::{GatewayError, Result};

pub const SECRET_MASK: &str = "********";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Polygon,
    Ibkr,
    #[serde(rename = "ctrader")]
    CTrader,
    #[serde(rename = "thinkorswim")]
    ThinkorSwim,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Polygon => "polygon",
            Provider::Ibkr => "ibkr",
            Provider::CTrader => "ctrader",
            Provider::ThinkorSwim => "thinkorswim",
        }
    }

    /// Keys stored in the secret map. Anything else is a plain field.
    pub fn secret_keys(&self) -> &'static [&'static str] {
        match self {
            Provider::Polygon => &["api_key"],
            Provider::Ibkr => &[],
            Provider::CTrader | Provider::ThinkorSwim => {
                &["client_secret", "access_token", "refresh_token"]
            }
        }
    }

    pub fn uses_oauth(&self) -> bool {
        matches!(self, Provider::CTrader | Provider::ThinkorSwim)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "polygon" => Ok(Provider::Polygon),
            "ibkr" => Ok(Provider::Ibkr),
            "ctrader" => Ok(Provider::CTrader),
            "thinkorswim" | "schwab" => Ok(Provider::ThinkorSwim),
            other => Err(GatewayError::validation(format!("Unknown provider: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "connected" => ConnectionStatus::Connected,
            "error" => ConnectionStatus::Error,
            _ => ConnectionStatus::Disconnected,
        }
    }
}

/// Form body for a save.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsInput {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

/// What a client may see. Secrets are masked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsView {
    pub user_id: String,
    pub provider: Provider,
    pub fields: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
    pub status: ConnectionStatus,
    pub last_error: Option<String>,
    pub last_tested_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SettingsView {
    fn empty(user_id: &str, provider: Provider) -> Self {
        Self {
            user_id: user_id.to_string(),
            provider,
            fields: BTreeMap::new(),
            secrets: BTreeMap::new(),
            status: ConnectionStatus::Disconnected,
            last_error: None,
            last_tested_at: None,
            updated_at: None,
        }
    }

    fn from_row(row: &SettingsRow, provider: Provider) -> Self {
        Self {
            user_id: row.user_id.clone(),
            provider,
            fields: row.fields.0.clone(),
            secrets: mask(&row.secrets.0),
            status: ConnectionStatus::parse(&row.status),
            last_error: row.last_error.clone(),
            last_tested_at: row.last_tested_at,
            updated_at: Some(row.updated_at),
        }
    }
}

/// Plaintext settings for outbound calls. Never rendered.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub fields: BTreeMap<String, String>,
    pub secrets: BTreeMap<String, String>,
}

impl Credentials {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    pub fn secret(&self, key: &str) -> Option<&str> {
        self.secrets.get(key).map(String::as_str).filter(|v| !v.trim().is_empty())
    }
}

pub fn mask(secrets: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    secrets
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, _)| (k.clone(), SECRET_MASK.to_string()))
        .collect()
}

/// Apply incoming secrets over stored ones. Empty or masked values keep the stored secret.
pub fn merge_secrets(
    stored: &BTreeMap<String, String>,
    incoming: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = stored.clone();
    for (key, value) in incoming {
        let value = value.trim();
        if value.is_empty() || value == SECRET_MASK {
            continue;
        }
        merged.insert(key.clone(), value.to_string());
    }
    merged
}

fn validate(
    provider: Provider,
    fields: &BTreeMap<String, String>,
    incoming_secrets: &BTreeMap<String, String>,
    merged_secrets: &BTreeMap<String, String>,
) -> Result<()> {
    let secret_keys = provider.secret_keys();
    if let Some(key) = fields.keys().find(|k| secret_keys.contains(&k.as_str())) {
        return Err(GatewayError::validation(format!(
            "{key} must be sent as a secret for {provider}"
        )));
    }
    if let Some(key) = incoming_secrets
        .keys()
        .find(|k| !secret_keys.contains(&k.as_str()))
    {
        return Err(GatewayError::validation(format!(
            "Unknown secret field {key} for {provider}"
        )));
    }

    let present = |key: &str| fields.get(key).is_some_and(|v| !v.trim().is_empty());
    match provider {
        Provider::Polygon => {
            if merged_secrets.get("api_key").map_or(true, |v| v.is_empty()) {
                return Err(GatewayError::validation("Polygon API key is required"));
            }
        }
        Provider::Ibkr => {
            if !present("host") {
                return Err(GatewayError::validation("IBKR gateway host is required"));
            }
            let port = fields.get("port").map(|p| p.trim()).unwrap_or_default();
            if port.parse::<u16>().map_or(true, |p| p == 0) {
                return Err(GatewayError::validation("IBKR gateway port must be a number"));
            }
        }
        Provider::CTrader | Provider::ThinkorSwim => {
            if !present("client_id") {
                return Err(GatewayError::validation(format!(
                    "{provider} client_id is required"
                )));
            }
        }
    }
    Ok(())
}

pub struct SettingsService {
    store: Arc<dyn Store>,
    cipher: SecretCipher,
}

impl SettingsService {
    pub fn new(store: Arc<dyn Store>, cipher: SecretCipher) -> Self {
        Self { store, cipher }
    }

    pub async fn save(
        &self,
        user_id: &str,
        provider: Provider,
        input: SettingsInput,
    ) -> Result<SettingsView> {
        if user_id.trim().is_empty() {
            return Err(GatewayError::validation("User id is required"));
        }
        let existing = self.store.load_settings(user_id, provider.as_str()).await?;
        let stored_secrets = match &existing {
            Some(row) => self.cipher.decrypt_map(&row.secrets.0)?,
            None => BTreeMap::new(),
        };
        let secrets = merge_secrets(&stored_secrets, &input.secrets);
        validate(provider, &input.fields, &input.secrets, &secrets)?;

        // Changed credentials invalidate the last test result.
        let unchanged = existing
            .as_ref()
            .is_some_and(|r| r.fields.0 == input.fields && stored_secrets == secrets);
        let (status, last_error, last_tested_at) = match (&existing, unchanged) {
            (Some(r), true) => (r.status.clone(), r.last_error.clone(), r.last_tested_at),
            _ => (ConnectionStatus::Disconnected.as_str().to_string(), None, None),
        };

        let row = SettingsRow {
            user_id: user_id.to_string(),
            provider: provider.as_str().to_string(),
            fields: Json(input.fields),
            secrets: Json(self.cipher.encrypt_map(&secrets)?),
            status,
            last_error,
            last_tested_at,
            updated_at: Utc::now(),
        };
        let saved = self.store.save_settings(&row).await?;
        info!(user_id, provider = %provider, "connection settings saved");
        Ok(SettingsView::from_row(&saved, provider))
    }

    /// Unsaved providers read back empty and disconnected.
    pub async fn load(&self, user_id: &str, provider: Provider) -> Result<SettingsView> {
        Ok(self
            .store
            .load_settings(user_id, provider.as_str())
            .await?
            .map(|row| SettingsView::from_row(&row, provider))
            .unwrap_or_else(|| SettingsView::empty(user_id, provider)))
    }

    /// The only path that decrypts stored secrets.
    pub async fn credentials(&self, user_id: &str, provider: Provider) -> Result<Credentials> {
        let row = self
            .store
            .load_settings(user_id, provider.as_str())
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("{provider} settings for user {user_id}")))?;
        Ok(Credentials {
            secrets: self.cipher.decrypt_map(&row.secrets.0)?,
            fields: row.fields.0,
        })
    }

    /// Merge freshly issued tokens into the stored secrets and mark connected.
    pub async fn store_tokens(
        &self,
        user_id: &str,
        provider: Provider,
        tokens: BTreeMap<String, String>,
    ) -> Result<SettingsView> {
        let existing = self
            .store
            .load_settings(user_id, provider.as_str())
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("{provider} settings for user {user_id}")))?;
        let stored = self.cipher.decrypt_map(&existing.secrets.0)?;
        let now = Utc::now();
        let row = SettingsRow {
            secrets: Json(self.cipher.encrypt_map(&merge_secrets(&stored, &tokens))?),
            status: ConnectionStatus::Connected.as_str().to_string(),
            last_error: None,
            last_tested_at: Some(now),
            updated_at: now,
            ..existing
        };
        let saved = self.store.save_settings(&row).await?;
        info!(user_id, provider = %provider, "oauth tokens stored");
        Ok(SettingsView::from_row(&saved, provider))
    }

    pub async fn set_status(
        &self,
        user_id: &str,
        provider: Provider,
        status: ConnectionStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        let found = self
            .store
            .set_connection_status(user_id, provider.as_str(), status.as_str(), last_error)
            .await?;
        if !found {
            return Err(GatewayError::NotFound(format!(
                "{provider} settings for user {user_id}"
            )));
        }
        Ok(())
    }
}
