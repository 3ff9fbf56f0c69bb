//! Operator notifications.
//!
//! Every terminal command result is relayed to a [`Notifier`] with a
//! [`Severity`] so downstream alerting can filter. Delivery is best-effort: a
//! failing notifier is logged and otherwise ignored, it never changes a
//! trading outcome.
//!
//! Two sinks ship with the crate: [`LogNotifier`] (tracing only) and
//! [`WebhookNotifier`], which posts to a chat webhook (Slack, Feishu, ...)
//! everything at or above a configured severity. [`notifier_from_config`]
//! picks the webhook when `notifications` is configured.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, NotificationConfig};
use crate::types::TradeId;

/// How loudly a notification should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Error,
    /// Funds at risk with no programmatic recovery. Page a human.
    Critical,
}

/// A message for the operator channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub msg: String,
    pub trade_id: Option<TradeId>,
}

impl Notification {
    pub fn new(severity: Severity, msg: impl Into<String>) -> Self {
        Self { severity, msg: msg.into(), trade_id: None }
    }

    pub fn with_trade_id(mut self, trade_id: TradeId) -> Self {
        self.trade_id = Some(trade_id);
        self
    }
}

/// Sink for operator notifications (chat bot, pager, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Notifier that writes to the tracing log. Used when no external channel is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, n: &Notification) -> anyhow::Result<()> {
        let trade_id = n.trade_id.as_ref().map(TradeId::as_str).unwrap_or("-");
        match n.severity {
            Severity::Info => info!(trade_id, "[notify] {}", n.msg),
            Severity::Warn => warn!(trade_id, "[notify] {}", n.msg),
            Severity::Error => error!(trade_id, "[notify] {}", n.msg),
            Severity::Critical => error!(trade_id, critical = true, "[notify] CRITICAL: {}", n.msg),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    /// Rendered line for chat webhooks that only read `text`.
    text: String,
    severity: Severity,
    msg: &'a str,
    trade_id: Option<&'a str>,
}

/// Posts notifications to an HTTP webhook. Every notification is also logged;
/// only those at or above `min_severity` are posted.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    webhook_url: String,
    min_severity: Severity,
}

impl WebhookNotifier {
    pub fn new(config: &NotificationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("building webhook client")?;
        Ok(Self { client, webhook_url: config.webhook_url.clone(), min_severity: config.min_severity })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, n: &Notification) -> anyhow::Result<()> {
        LogNotifier.send(n).await?;
        if n.severity < self.min_severity {
            return Ok(());
        }

        let trade_id = n.trade_id.as_ref().map(TradeId::as_str);
        let payload = WebhookPayload {
            text: format!("[{:?}] {} (trade {})", n.severity, n.msg, trade_id.unwrap_or("-")),
            severity: n.severity,
            msg: &n.msg,
            trade_id,
        };
        let resp = self.client.post(&self.webhook_url).json(&payload).send().await.context("webhook request")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned HTTP {status}: {body}");
        }
        debug!("[notify] {:?} delivered to webhook", n.severity);
        Ok(())
    }
}

/// The webhook notifier when `notifications` is configured, the log notifier
/// otherwise.
pub fn notifier_from_config(config: &AppConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.notifications {
        Some(notifications) => {
            info!("[notify] webhook alerts enabled at {:?} and above", notifications.min_severity);
            Ok(Arc::new(WebhookNotifier::new(notifications)?))
        }
        None => {
            warn!("[notify] no webhook configured, alerts go to the log only");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Send a notification, logging (and swallowing) any delivery failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.send(&notification).await {
        warn!("[notify] delivery failed ({:?}): {e:#}; message was: {}", notification.severity, notification.msg);
    }
}
