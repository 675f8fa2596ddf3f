//! Webhook notifications.
//!
//! Sweep reports, lifecycle notices, emergency alerts and sale embeds are
//! posted as JSON to a chat webhook. Delivery is fire-and-forget: every
//! message is spawned onto the tokio runtime, posts are serialized through a
//! single-permit semaphore, and failures are logged and dropped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::engine::report::SweepReport;
use crate::ports::{LogSink, ReportSink};
use crate::types::{LifetimeStats, SaleRecord};

/// Back-off after the webhook answers 429.
const RATE_LIMIT_BACKOFF_MS: u64 = 1000;
const SALE_EMBED_COLOR: u32 = 5_763_719;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub username: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

impl WebhookPayload {
    pub fn text(content: impl Into<String>, username: &str) -> Self {
        Self { content: Some(content.into()), username: username.to_string(), embeds: Vec::new() }
    }

    pub fn alert(sender: &str, message: &str, username: &str) -> Self {
        Self::text(
            format!("**EMERGENCY STOP** @everyone\n**From:** {sender}\n**Message:** `{message}`"),
            username,
        )
    }

    pub fn sale(sale: &SaleRecord, lifetime: &LifetimeStats, username: &str) -> Self {
        let field = |name: &str, value: String, inline: bool| EmbedField {
            name: name.to_string(),
            value,
            inline,
        };
        let item = if sale.is_hq { format!("{} (HQ)", sale.item_name) } else { sale.item_name.clone() };

        Self {
            content: None,
            username: format!("{username} Sales"),
            embeds: vec![Embed {
                title: "💰 Item Sold!".to_string(),
                color: SALE_EMBED_COLOR,
                fields: vec![
                    field("Item", item, true),
                    field("Price", format!("{} gil", group_thousands(sale.price)), true),
                    field("Market", sale.city.clone(), true),
                    field(
                        "Lifetime Stats",
                        format!(
                            "Total Earned: {} gil\nItems Sold: {}",
                            group_thousands(lifetime.total_gil_earned),
                            group_thousands(lifetime.total_items_sold),
                        ),
                        false,
                    ),
                ],
                footer: EmbedFooter {
                    text: format!("{username} | {}", sale.timestamp.format("%Y-%m-%d %H:%M")),
                },
            }],
        }
    }
}

/// `1234567` → `"1,234,567"`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Something that can deliver a webhook payload.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, payload: &WebhookPayload) -> Result<()>;
}

pub struct WebhookClient {
    http: Client,
    url: SecretString,
}

impl WebhookClient {
    pub fn new(url: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Notifier for WebhookClient {
    async fn send(&self, payload: &WebhookPayload) -> Result<()> {
        let resp = self
            .http
            .post(self.url.expose_secret())
            .json(payload)
            .send()
            .await
            .context("Webhook request failed")?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Webhook rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(RATE_LIMIT_BACKOFF_MS)).await;
            anyhow::bail!("Webhook rate limited");
        }
        if !status.is_success() {
            anyhow::bail!("Webhook returned {status}");
        }

        debug!(%status, "Webhook delivered");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Report sink that logs locally and posts everything to a webhook.
pub struct WebhookSink {
    notifier: Arc<dyn Notifier>,
    permit: Arc<Semaphore>,
    runtime: Handle,
    username: String,
}

impl WebhookSink {
    /// Must be called from within a tokio runtime.
    pub fn new(notifier: Arc<dyn Notifier>, username: impl Into<String>) -> Result<Self> {
        let runtime = Handle::try_current().context("Webhook sink needs a tokio runtime")?;
        Ok(Self {
            notifier,
            permit: Arc::new(Semaphore::new(1)),
            runtime,
            username: username.into(),
        })
    }

    fn dispatch(&self, payload: WebhookPayload) {
        let notifier = Arc::clone(&self.notifier);
        let permit = Arc::clone(&self.permit);
        self.runtime.spawn(async move {
            let Ok(_guard) = permit.acquire_owned().await else {
                return;
            };
            if let Err(e) = notifier.send(&payload).await {
                warn!(error = %e, "Webhook delivery failed");
            }
        });
    }
}

impl ReportSink for WebhookSink {
    fn flush(&self, report: SweepReport) {
        let content = report.render();
        LogSink.flush(report);
        self.dispatch(WebhookPayload::text(content, &self.username));
    }

    fn notice(&self, message: &str) {
        LogSink.notice(message);
        self.dispatch(WebhookPayload::text(message, &self.username));
    }

    fn alert(&self, sender: &str, message: &str) {
        LogSink.alert(sender, message);
        self.dispatch(WebhookPayload::alert(sender, message, &self.username));
    }

    fn sale(&self, sale: &SaleRecord, lifetime: &LifetimeStats) {
        LogSink.sale(sale, lifetime);
        self.dispatch(WebhookPayload::sale(sale, lifetime, &self.username));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
