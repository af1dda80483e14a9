//! Telegram forwarder: relays gateway events to a chat.

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use crate::config::TelegramConfig;
use crate::events::bus::GatewayEvent;
use crate::feeds::http::build_client;

pub struct TelegramBot {
    config: TelegramConfig,
    events: broadcast::Receiver<GatewayEvent>,
    shutdown: watch::Receiver<bool>,
    client: reqwest::Client,
}

impl TelegramBot {
    pub fn new(
        config: TelegramConfig,
        events: broadcast::Receiver<GatewayEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> crate::error::Result<Self> {
        Ok(Self {
            client: build_client(config.timeout())?,
            config,
            events,
            shutdown,
        })
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        let token = match &self.config.bot_token {
            Some(t) if !t.is_empty() => t.clone(),
            _ => {
                warn!("telegram bot token not configured, skipping");
                return Ok(());
            }
        };

        let chat_id = match &self.config.chat_id {
            Some(c) if !c.is_empty() => c.clone(),
            _ => {
                warn!("telegram chat_id not configured, skipping");
                return Ok(());
            }
        };

        info!("telegram forwarder started");
        let _ = self
            .send_message(&token, &chat_id, "🟢 <b>Quant Gateway Online</b>")
            .await;

        loop {
            let received = tokio::select! {
                ev = self.events.recv() => ev,
                _ = self.shutdown.changed() => {
                    info!("telegram forwarder stopped");
                    break;
                }
            };
            match received {
                Ok(ev) => {
                    if let Some(msg) = format_event(&ev) {
                        if let Err(e) = self.send_message(&token, &chat_id, &msg).await {
                            warn!(error = %e, "failed to send telegram message");
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "telegram event receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("event bus closed, telegram forwarder shutting down");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn send_message(&self, token: &str, chat_id: &str, text: &str) -> anyhow::Result<()> {
        let url = format!(
            "{}/bot{token}/sendMessage",
            self.config.api_url.trim_end_matches('/')
        );
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "disable_web_page_preview": true,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let body = resp.text().await?;
            warn!(body = %body, "telegram API error");
        }
        Ok(())
    }
}

/// Escape text for Telegram's HTML parse mode.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Format a gateway event into a Telegram message. Quiet events return `None`.
fn format_event(event: &GatewayEvent) -> Option<String> {
    match event {
        GatewayEvent::AlertRaised { kind, severity, title, message, .. } => {
            let icon = match severity.as_str() {
                "critical" => "🚨",
                "warning" => "⚠️",
                _ => "ℹ️",
            };
            Some(format!(
                "{icon} <b>{}</b>\n<i>{}</i>\n{}",
                escape(title),
                kind.replace('_', " "),
                escape(message)
            ))
        }
        GatewayEvent::AnalyticsDegraded { operation, reason } => Some(format!(
            "🟡 <b>Analytics degraded</b>\n{}: {}",
            operation,
            escape(reason)
        )),
        GatewayEvent::ConnectionStatusChanged { provider, status, detail, .. } if status == "error" => {
            Some(format!(
                "🔴 <b>{provider} connection failed</b>\n{}",
                escape(detail.as_deref().unwrap_or(""))
            ))
        }
        GatewayEvent::StrategiesSynced { failed, .. } if *failed > 0 => Some(format!(
            "⚠️ <b>Strategy sync</b>\n{failed} strateg{} could not be refreshed",
            if *failed == 1 { "y" } else { "ies" }
        )),
        _ => None,
    }
}
