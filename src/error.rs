//! Unified error types for the gateway.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Upstream services the gateway talks to. Used to name the provider in
/// user-facing error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Upstream {
    Polygon,
    Analytics,
    Ibkr,
    CTrader,
    ThinkorSwim,
    AlertFeed,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Upstream::Polygon => "Polygon",
            Upstream::Analytics => "Analytics service",
            Upstream::Ibkr => "Interactive Brokers",
            Upstream::CTrader => "cTrader",
            Upstream::ThinkorSwim => "ThinkorSwim",
            Upstream::AlertFeed => "Alert feed",
        };
        f.write_str(name)
    }
}

/// Classified failure of a single outbound fetch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Missing or malformed parameter. Raised before any network I/O.
    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid {upstream} API key or credentials")]
    InvalidKey { upstream: Upstream },

    #[error("{upstream} access forbidden - check your subscription tier or permissions")]
    Forbidden { upstream: Upstream },

    #[error("{upstream}: {what}")]
    NotFound { upstream: Upstream, what: String },

    #[error("{upstream} rate limit exceeded, try again later")]
    RateLimited { upstream: Upstream },

    #[error("Network error reaching {upstream}: {detail}")]
    Network { upstream: Upstream, detail: String },

    #[error("{upstream} API error ({status}): {detail}")]
    Api {
        upstream: Upstream,
        status: u16,
        detail: String,
    },

    #[error("Unexpected {upstream} response: {detail}")]
    Decode { upstream: Upstream, detail: String },
}

impl FetchError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        FetchError::InvalidInput(msg.into())
    }

    pub fn not_found(upstream: Upstream, what: impl Into<String>) -> Self {
        FetchError::NotFound {
            upstream,
            what: what.into(),
        }
    }

    /// Map a non-success HTTP status to a classified error.
    pub fn from_status(upstream: Upstream, status: StatusCode, body: &str, resource: &str) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => FetchError::InvalidKey { upstream },
            StatusCode::FORBIDDEN => FetchError::Forbidden { upstream },
            StatusCode::NOT_FOUND => FetchError::not_found(upstream, format!("{resource} not found")),
            StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited { upstream },
            other => FetchError::Api {
                upstream,
                status: other.as_u16(),
                detail: upstream_message(body).unwrap_or_else(|| {
                    other
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                }),
            },
        }
    }

    /// Map a transport-level reqwest failure.
    pub fn from_transport(upstream: Upstream, err: &reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode {
                upstream,
                detail: err.to_string(),
            }
        } else if err.is_timeout() {
            FetchError::Network {
                upstream,
                detail: "request timed out".into(),
            }
        } else {
            FetchError::Network {
                upstream,
                detail: err.to_string(),
            }
        }
    }

    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::InvalidInput(_) => FetchErrorKind::InvalidInput,
            FetchError::InvalidKey { .. } => FetchErrorKind::InvalidKey,
            FetchError::Forbidden { .. } => FetchErrorKind::Forbidden,
            FetchError::NotFound { .. } => FetchErrorKind::NotFound,
            FetchError::RateLimited { .. } => FetchErrorKind::RateLimited,
            FetchError::Network { .. } => FetchErrorKind::Network,
            FetchError::Api { .. } => FetchErrorKind::Api,
            FetchError::Decode { .. } => FetchErrorKind::Decode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    InvalidInput,
    InvalidKey,
    Forbidden,
    NotFound,
    RateLimited,
    Network,
    Api,
    Decode,
}

/// Pull a human-readable message out of an upstream error body.
/// Polygon uses `error`/`message`, FastAPI uses `detail`.
fn upstream_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error", "message", "detail", "error_description"]
        .iter()
        .find_map(|key| value.get(*key))
        .map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("secret storage error: {0}")]
    Crypto(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GatewayError::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
