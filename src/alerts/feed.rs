//! Alert sources polled by the sync loops.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{AlertKind, NewAlert, Severity};
use crate::error::{FetchError, Upstream};
use crate::feeds::http::{build_client, send_json};
use crate::feeds::{fetch_batch_prices, PolygonClient};

#[async_trait]
pub trait AlertFeed: Send + Sync {
    fn kind(&self) -> AlertKind;

    fn name(&self) -> &str;

    /// Fetch the current items. Duplicates are fine, the store dedups by external id.
    async fn fetch(&self) -> Result<Vec<NewAlert>, FetchError>;
}

/// A JSON endpoint returning a list of items, bare or under `items`/`events`/`data`.
pub struct JsonFeed {
    client: Client,
    kind: AlertKind,
    url: String,
}

impl JsonFeed {
    pub fn new(kind: AlertKind, url: impl Into<String>, timeout: std::time::Duration) -> crate::error::Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            kind,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertFeed for JsonFeed {
    fn kind(&self) -> AlertKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<NewAlert>, FetchError> {
        let body: Value = send_json(Upstream::AlertFeed, self.client.get(&self.url), self.kind.as_str()).await?;
        let alerts = parse_items(self.kind, &body)?;
        debug!(kind = %self.kind, count = alerts.len(), "feed items parsed");
        Ok(alerts)
    }
}

fn parse_items(kind: AlertKind, body: &Value) -> Result<Vec<NewAlert>, FetchError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(map) => ["items", "events", "data"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .ok_or_else(|| FetchError::Decode {
                upstream: Upstream::AlertFeed,
                detail: "expected a list of items".into(),
            })?,
        _ => {
            return Err(FetchError::Decode {
                upstream: Upstream::AlertFeed,
                detail: "expected a list of items".into(),
            })
        }
    };
    Ok(items.iter().filter_map(|item| parse_item(kind, item)).collect())
}

/// Items without a title are skipped.
fn parse_item(kind: AlertKind, item: &Value) -> Option<NewAlert> {
    let text = |keys: &[&str]| {
        keys.iter().find_map(|k| match item.get(*k)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    let title = text(&["title", "event", "headline", "name"])?;
    let when = text(&["date", "time", "published_at", "timestamp"]).unwrap_or_default();
    let id = text(&["id", "guid", "url", "link"]).unwrap_or_else(|| format!("{title}@{when}"));
    let message = text(&["message", "description", "summary"]).unwrap_or_else(|| title.clone());
    let severity = text(&["severity", "impact", "importance"])
        .map(|s| Severity::parse_lenient(&s))
        .unwrap_or(Severity::Info);

    Some(NewAlert {
        kind,
        external_id: format!("{}:{id}", kind.as_str()),
        title,
        message,
        severity,
        payload: item.clone(),
    })
}

/// Flags symbols whose previous session moved at least `threshold_pct`.
pub struct AnomalyFeed {
    polygon: PolygonClient,
    symbols: Vec<String>,
    threshold_pct: f64,
    concurrency: Option<usize>,
}

impl AnomalyFeed {
    pub fn new(
        polygon: PolygonClient,
        symbols: Vec<String>,
        threshold_pct: f64,
        concurrency: Option<usize>,
    ) -> Self {
        Self {
            polygon,
            symbols,
            threshold_pct,
            concurrency,
        }
    }
}

#[async_trait]
impl AlertFeed for AnomalyFeed {
    fn kind(&self) -> AlertKind {
        AlertKind::Anomaly
    }

    fn name(&self) -> &str {
        "anomaly"
    }

    async fn fetch(&self) -> Result<Vec<NewAlert>, FetchError> {
        if self.symbols.is_empty() {
            return Ok(Vec::new());
        }
        let batch = fetch_batch_prices(&self.polygon, &self.symbols, self.concurrency).await?;
        let today = Utc::now().date_naive();

        Ok(batch
            .prices
            .values()
            .filter(|q| q.change_percent.abs() >= self.threshold_pct)
            .map(|q| {
                let day = q.as_of.map(|t| t.date_naive()).unwrap_or(today);
                let severity = if q.change_percent.abs() >= self.threshold_pct * 2.0 {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                NewAlert {
                    kind: AlertKind::Anomaly,
                    external_id: format!("anomaly:{}:{day}", q.symbol),
                    title: format!("{} moved {:+.2}%", q.symbol, q.change_percent),
                    message: format!(
                        "{} closed at {:.2} ({:+.2}, {:+.2}%) on {day}",
                        q.symbol, q.price, q.change, q.change_percent
                    ),
                    severity,
                    payload: json!({
                        "symbol": q.symbol,
                        "price": q.price,
                        "change": q.change,
                        "change_percent": q.change_percent,
                        "threshold_pct": self.threshold_pct,
                    }),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_items_parse_with_fallback_ids() {
        let body = json!({
            "events": [
                {"id": 42, "title": "CPI YoY", "impact": "high", "date": "2026-10-14"},
                {"event": "FOMC Minutes", "date": "2026-10-15"},
                {"description": "no title here"}
            ]
        });
        let alerts = parse_items(AlertKind::EconomicCalendar, &body).unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].external_id, "economic_calendar:42");
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[1].external_id, "economic_calendar:FOMC Minutes@2026-10-15");
        assert_eq!(alerts[1].message, "FOMC Minutes");
    }

    #[test]
    fn bare_arrays_parse() {
        let body = json!([{"guid": "wh-1", "title": "Executive order", "summary": "Tariffs"}]);
        let alerts = parse_items(AlertKind::WhiteHouse, &body).unwrap();
        assert_eq!(alerts[0].external_id, "white_house:wh-1");
        assert_eq!(alerts[0].message, "Tariffs");
    }

    #[test]
    fn scalars_are_rejected() {
        assert!(parse_items(AlertKind::WhiteHouse, &json!("nope")).is_err());
    }
}
