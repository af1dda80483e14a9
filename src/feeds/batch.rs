//! Multi-symbol price fetch with settle-all semantics.

use std::collections::BTreeMap;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info};

use super::polygon::PolygonClient;
use super::types::PriceQuote;
use crate::error::FetchError;

/// Outcome of a batch fetch. A failure for one symbol never hides the others.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchPrices {
    pub prices: BTreeMap<String, PriceQuote>,
    pub errors: BTreeMap<String, String>,
    pub success_count: usize,
    pub error_count: usize,
}

/// Fetch every symbol concurrently and partition the results.
///
/// `concurrency` caps in-flight requests; `None` issues all of them at once.
pub async fn fetch_batch_prices(
    client: &PolygonClient,
    symbols: &[String],
    concurrency: Option<usize>,
) -> Result<BatchPrices, FetchError> {
    if symbols.is_empty() {
        return Err(FetchError::invalid_input("At least one symbol is required"));
    }

    let limit = concurrency.unwrap_or(symbols.len()).max(1);
    debug!(count = symbols.len(), limit, "batch price fetch");

    // Owned symbols and clients keep the futures `Send` for spawned callers.
    let settled: Vec<(String, Result<PriceQuote, FetchError>)> = stream::iter(symbols.to_vec())
        .map(|symbol| {
            let client = client.clone();
            async move {
                let key = symbol.trim().to_uppercase();
                let result = client.fetch_price(&symbol).await;
                (key, result)
            }
        })
        .buffer_unordered(limit)
        .collect()
        .await;

    let mut batch = BatchPrices::default();
    for (symbol, result) in settled {
        match result {
            Ok(quote) => {
                batch.prices.insert(symbol, quote);
            }
            Err(e) => {
                batch.errors.insert(symbol, e.to_string());
            }
        }
    }
    batch.success_count = batch.prices.len();
    batch.error_count = batch.errors.len();

    info!(
        success = batch.success_count,
        errors = batch.error_count,
        "batch price fetch complete"
    );
    Ok(batch)
}
