//! Try an enhanced path, fall back to a basic one.
//!
//! No failure counting and no probing: every call tries the primary first.

use std::fmt::Display;
use std::future::Future;

use serde::Serialize;
use tracing::warn;

/// A result plus which path produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub value: T,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl<T> Outcome<T> {
    pub fn enhanced(value: T) -> Self {
        Self {
            value,
            degraded: false,
            degraded_reason: None,
        }
    }

    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self {
            value,
            degraded: true,
            degraded_reason: Some(reason.into()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            degraded: self.degraded,
            degraded_reason: self.degraded_reason,
        }
    }
}

/// Run `primary`; if it fails, log and run `secondary` instead.
///
/// The primary's error is swallowed. Only the secondary's error reaches the caller.
pub async fn with_fallback<T, E1, E2, P, S, SF>(
    operation: &str,
    primary: P,
    secondary: S,
) -> Result<Outcome<T>, E2>
where
    P: Future<Output = Result<T, E1>>,
    E1: Display,
    S: FnOnce() -> SF,
    SF: Future<Output = Result<T, E2>>,
{
    match primary.await {
        Ok(value) => Ok(Outcome::enhanced(value)),
        Err(e) => {
            let reason = e.to_string();
            warn!(operation, error = %reason, "enhanced path failed, using basic path");
            let value = secondary().await?;
            Ok(Outcome::degraded(value, reason))
        }
    }
}
