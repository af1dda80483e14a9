//! Shared request plumbing: one call, fixed timeout, classified errors.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{FetchError, GatewayError, Upstream};

/// Build a client whose every request carries `timeout`.
pub fn build_client(timeout: Duration) -> crate::error::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GatewayError::Config(format!("failed to build http client: {e}")))
}

/// Send `request` and decode a JSON body, classifying any failure.
pub async fn send_json<T: DeserializeOwned>(
    upstream: Upstream,
    request: RequestBuilder,
    resource: &str,
) -> Result<T, FetchError> {
    let body = send_text(upstream, request, resource).await?;
    serde_json::from_str(&body).map_err(|e| FetchError::Decode {
        upstream,
        detail: e.to_string(),
    })
}

/// Send `request` and return the raw body of a successful response.
pub async fn send_text(
    upstream: Upstream,
    request: RequestBuilder,
    resource: &str,
) -> Result<String, FetchError> {
    let response = request
        .send()
        .await
        .map_err(|e| FetchError::from_transport(upstream, &e))?;

    let status = response.status();
    debug!(%upstream, resource, status = status.as_u16(), "upstream responded");

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FetchError::from_status(upstream, status, &body, resource));
    }

    response
        .text()
        .await
        .map_err(|e| FetchError::from_transport(upstream, &e))
}
