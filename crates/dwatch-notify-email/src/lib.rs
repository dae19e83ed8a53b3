// # Transactional Email Channel
//
// This crate provides the transactional email notification channel for
// the domain watch system, delivered through the Resend HTTP API.
//
// ## API Reference
//
// - Send: POST `/emails` with `Authorization: Bearer <api key>`
// - Body: `{ "from", "to": [..], "subject", "html", "text" }`
// - Success: `{ "id": "<message id>" }`
//
// ## Security Requirements
//
// - API key NEVER appears in logs or Debug output
// - `send_report` never fails outward; failures become unsuccessful outcomes

use async_trait::async_trait;
use dwatch_core::settings::{ChannelConfig, ChannelKind, ChannelSettings};
use dwatch_core::traits::{DomainRecord, NotificationChannel, Report, SendOutcome};
use dwatch_core::{ChannelRegistry, Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Resend API base URL
pub const RESEND_API_BASE: &str = "https://api.resend.com";

/// Request timeout for email delivery
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Email request body
#[derive(Debug, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: Option<String>,
}

/// Transactional email notification channel
pub struct TransactionalEmailChannel {
    base_url: String,
    client: reqwest::Client,
}

impl TransactionalEmailChannel {
    /// Create a channel against the Resend API
    ///
    /// # Errors
    ///
    /// - `Error::Config`: The HTTP client could not be built
    pub fn new() -> Result<Self> {
        Self::with_base_url(RESEND_API_BASE)
    }

    /// Create a channel against a different API base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

impl std::fmt::Debug for TransactionalEmailChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalEmailChannel")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl NotificationChannel for TransactionalEmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::TransactionalEmail
    }

    fn validate(&self, settings: &ChannelSettings) -> bool {
        match &settings.config {
            ChannelConfig::TransactionalEmail {
                api_key,
                from_address,
                to_address,
            } => {
                !api_key.trim().is_empty()
                    && looks_like_address(from_address)
                    && looks_like_address(to_address)
            }
            _ => false,
        }
    }

    async fn send_report(&self, settings: &ChannelSettings, report: &Report) -> SendOutcome {
        let ChannelConfig::TransactionalEmail {
            api_key,
            from_address,
            to_address,
        } = &settings.config
        else {
            return SendOutcome::failed("Settings are not email settings");
        };

        let message = render_message(report, from_address, to_address);
        tracing::debug!("Sending report email: {}", message.subject);

        let response = match self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key.trim())
            .json(&message)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Email request failed: {}", e);
                return SendOutcome::failed(format!("Email request failed: {}", e));
            }
        };

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        match status {
            200..=299 => {
                let id = serde_json::from_str::<SendResponse>(&body)
                    .ok()
                    .and_then(|parsed| parsed.id);
                let outcome = SendOutcome::sent(format!("Email sent to {}", to_address));
                match id {
                    Some(id) => outcome.with_data(serde_json::json!({ "id": id })),
                    None => outcome,
                }
            }
            401 | 403 => SendOutcome::failed("Email API rejected the API key"),
            422 => SendOutcome::failed(format!("Email API rejected the message: {}", body)),
            429 => SendOutcome::failed("Email API rate limit exceeded"),
            _ => {
                tracing::warn!("Email API returned HTTP {}", status);
                SendOutcome::failed(format!("Email API returned HTTP {}", status))
            }
        }
    }
}

fn looks_like_address(address: &str) -> bool {
    let address = address.trim();
    // Accept "Name <user@host>" as well as bare addresses
    let bare = match (address.rfind('<'), address.rfind('>')) {
        (Some(start), Some(end)) if start < end => &address[start + 1..end],
        _ => address,
    };
    match bare.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !bare.contains(' '),
        None => false,
    }
}

/// Render a report into an email
pub fn render_message(report: &Report, from: &str, to: &str) -> EmailMessage {
    let date = report.generated_at.format("%Y-%m-%d");
    let subject = if report.is_all_clear() {
        format!("Domain watch {}: all clear", date)
    } else {
        format!(
            "Domain watch {}: {} domain(s) need attention",
            date, report.total_count
        )
    };

    let sections = [
        ("Available now", &report.available, false),
        ("Expiring soon", &report.expiring, true),
        ("Expired but still registered", &report.expired, true),
    ];

    let mut html = format!("<h2>{}</h2>", escape_html(&subject));
    let mut text = format!("{}\n", subject);

    if report.is_all_clear() {
        html.push_str("<p>No domain on your watchlist changed state.</p>");
        text.push_str("\nNo domain on your watchlist changed state.\n");
    }

    for (title, domains, with_expiry) in sections {
        if domains.is_empty() {
            continue;
        }
        html.push_str(&format!("<h3>{} ({})</h3><ul>", title, domains.len()));
        text.push_str(&format!("\n{} ({}):\n", title, domains.len()));
        for domain in domains.iter() {
            let line = describe(domain, with_expiry);
            html.push_str(&format!("<li>{}</li>", escape_html(&line)));
            text.push_str(&format!("  - {}\n", line));
        }
        html.push_str("</ul>");
    }

    EmailMessage {
        from: from.trim().to_string(),
        to: vec![to.trim().to_string()],
        subject,
        html,
        text,
    }
}

fn describe(domain: &DomainRecord, with_expiry: bool) -> String {
    match (with_expiry, domain.expires) {
        (true, Some(expires)) => format!("{} (expiry {})", domain.name, expires.format("%Y-%m-%d")),
        _ => domain.name.clone(),
    }
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Register the email channel
pub fn register(registry: &mut ChannelRegistry) -> Result<()> {
    registry.register(Arc::new(TransactionalEmailChannel::new()?))
}
