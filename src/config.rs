//! Configuration: TOML file defaults + environment variable overrides.
//!
//! Tunables live in `config/default.toml`.
//! Secrets (API keys, client secrets, tokens) come from environment variables.

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::alerts::AlertKind;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub polygon: PolygonConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub brokers: BrokersConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolygonConfig {
    #[serde(default = "default_polygon_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_polygon_timeout")]
    pub timeout_secs: u64,
    /// Cap on in-flight requests during batch price fetches. Unbounded when unset.
    #[serde(default)]
    pub batch_concurrency: Option<usize>,
}

impl Default for PolygonConfig {
    fn default() -> Self {
        Self {
            base_url: default_polygon_url(),
            api_key: String::new(),
            timeout_secs: default_polygon_timeout(),
            batch_concurrency: None,
        }
    }
}

impl PolygonConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_polygon_url() -> String {
    "https://api.polygon.io".into()
}
fn default_polygon_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_analytics_url")]
    pub base_url: String,
    #[serde(default = "default_analytics_timeout")]
    pub timeout_secs: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            base_url: default_analytics_url(),
            timeout_secs: default_analytics_timeout(),
        }
    }
}

impl AnalyticsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_analytics_url() -> String {
    "http://localhost:8000".into()
}
fn default_analytics_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokersConfig {
    #[serde(default)]
    pub ibkr: IbkrConfig,
    #[serde(default = "default_ctrader")]
    pub ctrader: OAuthProviderConfig,
    #[serde(default = "default_thinkorswim")]
    pub thinkorswim: OAuthProviderConfig,
}

impl Default for BrokersConfig {
    fn default() -> Self {
        Self {
            ibkr: IbkrConfig::default(),
            ctrader: default_ctrader(),
            thinkorswim: default_thinkorswim(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IbkrConfig {
    /// The Client Portal gateway ships a self-signed certificate.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_broker_timeout")]
    pub timeout_secs: u64,
}

impl Default for IbkrConfig {
    fn default() -> Self {
        Self {
            accept_invalid_certs: true,
            timeout_secs: default_broker_timeout(),
        }
    }
}

/// Endpoints and app credentials for an OAuth2 authorization-code broker.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProviderConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub api_base_url: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default = "default_broker_timeout")]
    pub timeout_secs: u64,
}

impl OAuthProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_ctrader() -> OAuthProviderConfig {
    OAuthProviderConfig {
        authorize_url: "https://openapi.ctrader.com/apps/auth".into(),
        token_url: "https://openapi.ctrader.com/apps/token".into(),
        api_base_url: "https://api.spotware.com".into(),
        scope: "trading".into(),
        client_id: String::new(),
        client_secret: String::new(),
        redirect_uri: String::new(),
        timeout_secs: default_broker_timeout(),
    }
}

fn default_thinkorswim() -> OAuthProviderConfig {
    OAuthProviderConfig {
        authorize_url: "https://api.schwabapi.com/v1/oauth/authorize".into(),
        token_url: "https://api.schwabapi.com/v1/oauth/token".into(),
        api_base_url: "https://api.schwabapi.com".into(),
        scope: "readonly".into(),
        client_id: String::new(),
        client_secret: String::new(),
        redirect_uri: String::new(),
        timeout_secs: default_broker_timeout(),
    }
}

fn default_broker_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_strategy_interval")]
    pub strategy_interval_secs: u64,
    #[serde(default = "default_notify_batch")]
    pub notify_batch_limit: i64,
    #[serde(default = "default_notify_interval")]
    pub notify_interval_secs: u64,
    #[serde(default)]
    pub feeds: Vec<FeedSourceConfig>,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy_interval_secs: default_strategy_interval(),
            notify_batch_limit: default_notify_batch(),
            notify_interval_secs: default_notify_interval(),
            feeds: Vec::new(),
            anomaly: AnomalyConfig::default(),
        }
    }
}

fn default_strategy_interval() -> u64 {
    300
}
fn default_notify_batch() -> i64 {
    100
}
fn default_notify_interval() -> u64 {
    60
}

/// A JSON alert feed polled on a fixed interval.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSourceConfig {
    pub kind: AlertKind,
    pub url: String,
    #[serde(default = "default_feed_interval")]
    pub interval_secs: u64,
}

fn default_feed_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default = "default_anomaly_threshold")]
    pub threshold_pct: f64,
    #[serde(default = "default_anomaly_interval")]
    pub interval_secs: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            threshold_pct: default_anomaly_threshold(),
            interval_secs: default_anomaly_interval(),
        }
    }
}

fn default_anomaly_threshold() -> f64 {
    3.0
}
fn default_anomaly_interval() -> u64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Empty means the process-local store.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Passphrase for connection secrets at rest. Env only: `SETTINGS_ENCRYPTION_KEY`.
    #[serde(default)]
    pub secrets_key: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            secrets_key: String::new(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default = "default_telegram_url")]
    pub api_url: String,
    #[serde(default = "default_telegram_timeout")]
    pub timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_url: default_telegram_url(),
            timeout_secs: default_telegram_timeout(),
        }
    }
}

impl TelegramConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_telegram_url() -> String {
    "https://api.telegram.org".into()
}
fn default_telegram_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_port(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_output: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load configuration from `config/default.toml` merged with env vars.
    /// Overrides use the `QG__SECTION__KEY` form.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::with_prefix("QG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: Config = builder.try_deserialize()?;
        cfg.apply_env_secrets();
        Ok(cfg)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml(source: &str) -> anyhow::Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(cfg)
    }

    // These should never be in TOML.
    fn apply_env_secrets(&mut self) {
        if let Ok(v) = env::var("POLYGON_API_KEY") {
            self.polygon.api_key = v;
        }
        if let Ok(v) = env::var("CTRADER_CLIENT_ID") {
            self.brokers.ctrader.client_id = v;
        }
        if let Ok(v) = env::var("CTRADER_CLIENT_SECRET") {
            self.brokers.ctrader.client_secret = v;
        }
        if let Ok(v) = env::var("THINKORSWIM_CLIENT_ID") {
            self.brokers.thinkorswim.client_id = v;
        }
        if let Ok(v) = env::var("THINKORSWIM_CLIENT_SECRET") {
            self.brokers.thinkorswim.client_secret = v;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = env::var("SETTINGS_ENCRYPTION_KEY") {
            self.database.secrets_key = v;
        }
        if let Ok(v) = env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(v);
        }
        if let Ok(v) = env::var("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.polygon.base_url, "https://api.polygon.io");
        assert_eq!(cfg.polygon.timeout_secs, 10);
        assert_eq!(cfg.analytics.timeout_secs, 15);
        assert!(cfg.polygon.batch_concurrency.is_none());
        assert!(cfg.database.url.is_empty());
        assert_eq!(cfg.brokers.ctrader.scope, "trading");
        assert_eq!(cfg.web.port, 8080);
        assert!(cfg.database.secrets_key.is_empty());
        assert_eq!(cfg.telegram.api_url, "https://api.telegram.org");
        assert_eq!(cfg.telegram.timeout_secs, 10);
    }

    #[test]
    fn feeds_parse_with_kinds() {
        let cfg = Config::from_toml(
            r#"
            [polygon]
            batch_concurrency = 4

            [[sync.feeds]]
            kind = "economic_calendar"
            url = "http://localhost:9000/calendar"
            interval_secs = 600

            [[sync.feeds]]
            kind = "white_house"
            url = "http://localhost:9000/whitehouse"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.polygon.batch_concurrency, Some(4));
        assert_eq!(cfg.sync.feeds.len(), 2);
        assert_eq!(cfg.sync.feeds[0].kind, AlertKind::EconomicCalendar);
        assert_eq!(cfg.sync.feeds[0].interval_secs, 600);
        assert_eq!(cfg.sync.feeds[1].interval_secs, 300);
    }
}
