// # Notification Channel Trait
//
// Defines the capability contract every delivery channel implements.
//
// ## Implementations
//
// - Chat webhook: `dwatch-notify-webhook` crate
// - Transactional email: `dwatch-notify-email` crate
//
// The engine depends only on this contract. Adding a channel kind means a
// new `ChannelKind` variant, its settings shape and one registration; the
// orchestrator itself does not change.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::settings::{ChannelKind, ChannelSettings};
use crate::traits::domain_store::DomainRecord;

/// Categorized domains handed to every due channel
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    /// Domains that are now free to register
    pub available: Vec<DomainRecord>,
    /// Registered domains expiring inside the window
    pub expiring: Vec<DomainRecord>,
    /// Expired domains that are still registered
    pub expired: Vec<DomainRecord>,
    /// `available + expiring + expired`
    pub total_count: usize,
    /// Tick time the report was built for
    pub generated_at: DateTime<Utc>,
}

impl Report {
    /// Build a report, computing the total
    pub fn new(
        available: Vec<DomainRecord>,
        expiring: Vec<DomainRecord>,
        expired: Vec<DomainRecord>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let total_count = available.len() + expiring.len() + expired.len();
        Self {
            available,
            expiring,
            expired,
            total_count,
            generated_at,
        }
    }

    /// Nothing to report; still delivered as an "all clear"
    pub fn is_all_clear(&self) -> bool {
        self.total_count == 0
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendOutcome {
    /// Whether the channel accepted the report
    pub success: bool,
    /// Human-readable detail
    pub message: String,
    /// Channel-specific response payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SendOutcome {
    /// Successful delivery
    pub fn sent(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    /// Failed delivery
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    /// Attach a response payload
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Trait for notification channel implementations
///
/// # Contract
///
/// - [`validate`](Self::validate) is pure: no I/O, no logging side effects
///   beyond tracing.
/// - [`send_report`](Self::send_report) performs the I/O and must not fail
///   outward: internal errors become `SendOutcome { success: false, .. }`.
///   The engine additionally isolates panics, but a channel should never
///   rely on that.
/// - Each channel owns its request timeout and returns in bounded time.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Which settings record this channel reads
    fn kind(&self) -> ChannelKind;

    /// Whether `settings` carries the minimum fields needed to send
    fn validate(&self, settings: &ChannelSettings) -> bool;

    /// Render and deliver one report
    async fn send_report(&self, settings: &ChannelSettings, report: &Report) -> SendOutcome;

    /// Deliver a connectivity test
    ///
    /// The default sends an empty report, which every channel renders as
    /// an "all clear" message.
    async fn send_test(&self, settings: &ChannelSettings, now: DateTime<Utc>) -> SendOutcome {
        let report = Report::new(Vec::new(), Vec::new(), Vec::new(), now);
        self.send_report(settings, &report).await
    }
}
