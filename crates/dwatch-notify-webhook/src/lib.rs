// # Chat Webhook Channel
//
// This crate provides the chat webhook notification channel for the
// domain watch system.
//
// ## Wire Format
//
// One JSON POST per report to the configured incoming-webhook URL
// (Discord-compatible):
//
// ```json
// { "username": "Domain Watch", "content": "...", "embeds": [ ... ] }
// ```
//
// Each non-empty category becomes one embed. An empty report is sent as
// an explicit "all clear" message.
//
// ## Failure Policy
//
// `send_report` never fails outward: transport errors and non-2xx
// responses become `SendOutcome { success: false, .. }`. Requests time
// out after 10 seconds.

use async_trait::async_trait;
use dwatch_core::settings::{ChannelConfig, ChannelKind, ChannelSettings};
use dwatch_core::traits::{DomainRecord, NotificationChannel, Report, SendOutcome};
use dwatch_core::{ChannelRegistry, Error, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Default display name of the webhook bot
const DEFAULT_USERNAME: &str = "Domain Watch";

/// Request timeout for webhook delivery
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Domains listed per category before the list is cut short
const MAX_LISTED: usize = 15;

const COLOR_AVAILABLE: u32 = 0x2ecc71;
const COLOR_EXPIRING: u32 = 0xf1c40f;
const COLOR_EXPIRED: u32 = 0xe74c3c;

/// Webhook request body
#[derive(Debug, Serialize, PartialEq)]
pub struct WebhookPayload {
    pub username: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

/// One report category
#[derive(Debug, Serialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
}

/// Chat webhook notification channel
pub struct ChatWebhookChannel {
    client: reqwest::Client,
}

impl ChatWebhookChannel {
    /// Create a new webhook channel
    ///
    /// # Errors
    ///
    /// - `Error::Config`: The HTTP client could not be built
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl std::fmt::Debug for ChatWebhookChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatWebhookChannel").finish()
    }
}

#[async_trait]
impl NotificationChannel for ChatWebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::ChatWebhook
    }

    fn validate(&self, settings: &ChannelSettings) -> bool {
        match &settings.config {
            ChannelConfig::ChatWebhook { webhook_url, .. } => is_webhook_url(webhook_url),
            _ => false,
        }
    }

    async fn send_report(&self, settings: &ChannelSettings, report: &Report) -> SendOutcome {
        let ChannelConfig::ChatWebhook {
            webhook_url,
            username,
        } = &settings.config
        else {
            return SendOutcome::failed("Settings are not webhook settings");
        };

        let payload = render_payload(report, username.as_deref());
        tracing::debug!(
            "Posting webhook report ({} domains, {} embeds)",
            report.total_count,
            payload.embeds.len()
        );

        let response = match self.client.post(webhook_url).json(&payload).send().await {
            Ok(response) => response,
            Err(e) => {
                // reqwest errors may embed the URL, which is a secret
                let reason = if e.is_timeout() {
                    "Webhook request timed out"
                } else {
                    "Webhook request failed"
                };
                tracing::warn!("{}", reason);
                return SendOutcome::failed(reason);
            }
        };

        let status = response.status();
        if status.is_success() {
            SendOutcome::sent(format!("Webhook accepted the report (HTTP {})", status.as_u16()))
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Webhook returned HTTP {}", status.as_u16());
            SendOutcome::failed(format!("Webhook returned HTTP {}", status.as_u16()))
                .with_data(serde_json::json!({ "status": status.as_u16(), "body": body }))
        }
    }
}

/// Whether `url` looks like a deliverable webhook endpoint
pub fn is_webhook_url(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("https://") && url.len() > "https://".len()
}

/// Render a report into the webhook body
pub fn render_payload(report: &Report, username: Option<&str>) -> WebhookPayload {
    let username = username
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_USERNAME)
        .to_string();

    if report.is_all_clear() {
        return WebhookPayload {
            username,
            content: format!(
                "✅ All clear: no domain changes as of {}.",
                report.generated_at.format("%Y-%m-%d %H:%M UTC")
            ),
            embeds: Vec::new(),
        };
    }

    let mut embeds = Vec::new();
    if !report.available.is_empty() {
        embeds.push(Embed {
            title: format!("🟢 Available ({})", report.available.len()),
            description: list_domains(&report.available, |_| None),
            color: COLOR_AVAILABLE,
        });
    }
    if !report.expiring.is_empty() {
        embeds.push(Embed {
            title: format!("🟡 Expiring soon ({})", report.expiring.len()),
            description: list_domains(&report.expiring, |domain| {
                domain
                    .expires
                    .map(|at| format!("expires {}", at.format("%Y-%m-%d")))
            }),
            color: COLOR_EXPIRING,
        });
    }
    if !report.expired.is_empty() {
        embeds.push(Embed {
            title: format!("🔴 Expired, still registered ({})", report.expired.len()),
            description: list_domains(&report.expired, |domain| {
                domain
                    .expires
                    .map(|at| format!("expired {}", at.format("%Y-%m-%d")))
            }),
            color: COLOR_EXPIRED,
        });
    }

    WebhookPayload {
        username,
        content: format!("Domain watch report: {} domain(s) need attention.", report.total_count),
        embeds,
    }
}

fn list_domains(domains: &[DomainRecord], note: impl Fn(&DomainRecord) -> Option<String>) -> String {
    let mut lines: Vec<String> = domains
        .iter()
        .take(MAX_LISTED)
        .map(|domain| match note(domain) {
            Some(note) => format!("• `{}` ({})", domain.name, note),
            None => format!("• `{}`", domain.name),
        })
        .collect();
    if domains.len() > MAX_LISTED {
        lines.push(format!("…and {} more", domains.len() - MAX_LISTED));
    }
    lines.join("\n")
}

/// Register the webhook channel
pub fn register(registry: &mut ChannelRegistry) -> Result<()> {
    registry.register(Arc::new(ChatWebhookChannel::new()?))
}
