//! Notification channel settings
//!
//! One settings record exists per [`ChannelKind`]. Records are versioned:
//! the current shape is [`SETTINGS_VERSION`] and older documents are
//! migrated explicitly by [`ChannelSettings::from_document`].
//!
//! ## Connection status
//!
//! ```text
//! setup_required ──save (complete)──▶ ready ──test ok──▶ connected
//!        ▲                              │   ──test failed──▶ error
//!        └────save (incomplete)─────────┘
//! any ──disconnect──▶ disconnected
//! ```
//!
//! Saving a configuration never moves the status past `ready`; only an
//! explicit test send does.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settings shape written by this version
pub const SETTINGS_VERSION: u32 = 2;

/// Default time of day for the daily report
pub const DEFAULT_NOTIFICATION_TIME: &str = "09:00";

/// Closed set of supported channel kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Chat webhook (Discord/Slack style)
    ChatWebhook,
    /// Transactional email API
    TransactionalEmail,
}

impl ChannelKind {
    /// Every kind, in registration order
    pub const ALL: [ChannelKind; 2] = [ChannelKind::ChatWebhook, ChannelKind::TransactionalEmail];

    /// Stable key used in reports and storage
    pub fn key(&self) -> &'static str {
        match self {
            Self::ChatWebhook => "webhook",
            Self::TransactionalEmail => "email",
        }
    }

    /// Parse a stable key
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Connectivity state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Required fields are missing
    #[default]
    SetupRequired,
    /// Configured, never tested
    Ready,
    /// Last test send succeeded
    Connected,
    /// Disconnected by the operator
    Disconnected,
    /// Last test send failed
    Error,
}

/// Channel-specific fields
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    /// Chat webhook
    ChatWebhook {
        /// Incoming-webhook URL
        webhook_url: String,
        /// Display name override
        #[serde(default)]
        username: Option<String>,
    },

    /// Transactional email
    TransactionalEmail {
        /// Email API key
        api_key: String,
        /// Sender address
        from_address: String,
        /// Recipient address
        to_address: String,
    },
}

// Custom Debug implementation that hides secrets
impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChatWebhook { username, .. } => f
                .debug_struct("ChatWebhook")
                .field("webhook_url", &"<REDACTED>")
                .field("username", username)
                .finish(),
            Self::TransactionalEmail {
                from_address,
                to_address,
                ..
            } => f
                .debug_struct("TransactionalEmail")
                .field("api_key", &"<REDACTED>")
                .field("from_address", from_address)
                .field("to_address", to_address)
                .finish(),
        }
    }
}

impl ChannelConfig {
    /// Kind this configuration belongs to
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::ChatWebhook { .. } => ChannelKind::ChatWebhook,
            Self::TransactionalEmail { .. } => ChannelKind::TransactionalEmail,
        }
    }

    /// An empty configuration of `kind`
    pub fn empty(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::ChatWebhook => Self::ChatWebhook {
                webhook_url: String::new(),
                username: None,
            },
            ChannelKind::TransactionalEmail => Self::TransactionalEmail {
                api_key: String::new(),
                from_address: String::new(),
                to_address: String::new(),
            },
        }
    }

    /// Whether the minimum required fields are present
    pub fn is_complete(&self) -> bool {
        match self {
            Self::ChatWebhook { webhook_url, .. } => !webhook_url.trim().is_empty(),
            Self::TransactionalEmail {
                api_key,
                from_address,
                to_address,
            } => {
                !api_key.trim().is_empty()
                    && !from_address.trim().is_empty()
                    && !to_address.trim().is_empty()
            }
        }
    }
}

/// Settings record of one channel kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Shape version
    pub version: u32,
    /// Whether the channel takes part in ticks
    pub enabled: bool,
    /// Local time of day (`HH:MM`) the report fires
    pub notification_time: String,
    /// Connectivity state
    pub connection_status: ConnectionStatus,
    /// When the last test send completed
    pub connection_verified_at: Option<DateTime<Utc>>,
    /// Channel-specific fields
    pub config: ChannelConfig,
}

/// Version 1 shape: no connection tracking
#[derive(Debug, Deserialize)]
struct ChannelSettingsV1 {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_notification_time")]
    notification_time: String,
    config: ChannelConfig,
}

fn default_notification_time() -> String {
    DEFAULT_NOTIFICATION_TIME.to_string()
}

impl ChannelSettings {
    /// Disabled settings for `config`, status derived from completeness
    pub fn new(config: ChannelConfig) -> Self {
        let connection_status = status_for(&config);
        Self {
            version: SETTINGS_VERSION,
            enabled: false,
            notification_time: default_notification_time(),
            connection_status,
            connection_verified_at: None,
            config,
        }
    }

    /// Set the notification time
    pub fn with_notification_time(mut self, time: impl Into<String>) -> Self {
        self.notification_time = time.into();
        self
    }

    /// Enable or disable the channel
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Kind of the embedded configuration
    pub fn kind(&self) -> ChannelKind {
        self.config.kind()
    }

    /// Whether the channel fires at local time `hhmm`
    ///
    /// Exact minute-granularity match; leading zeros are normalized so a
    /// stored `9:05` matches `09:05`.
    pub fn is_due_at(&self, hhmm: &str) -> bool {
        match (parse_hhmm(&self.notification_time), parse_hhmm(hhmm)) {
            (Some(configured), Some(current)) => configured == current,
            _ => false,
        }
    }

    /// Replace the channel fields, resetting connectivity tracking
    pub fn apply_config(&mut self, config: ChannelConfig) {
        self.connection_status = status_for(&config);
        self.connection_verified_at = None;
        self.config = config;
    }

    /// Record the outcome of a test send
    pub fn record_test(&mut self, success: bool, at: DateTime<Utc>) {
        self.connection_status = if success {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Error
        };
        self.connection_verified_at = Some(at);
    }

    /// Validate the record before it is saved
    pub fn validate(&self) -> Result<(), crate::Error> {
        if parse_hhmm(&self.notification_time).is_none() {
            return Err(crate::Error::invalid_input(format!(
                "Notification time must be HH:MM, got '{}'",
                self.notification_time
            )));
        }
        Ok(())
    }

    /// Load a stored document of any supported version
    ///
    /// # Returns
    ///
    /// - `Ok(ChannelSettings)`: Current-shape settings
    /// - `Err(Error::Config)`: Unknown or future version
    /// - `Err(Error::Json)`: Malformed document
    pub fn from_document(document: serde_json::Value) -> Result<Self, crate::Error> {
        let version = document
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(1);

        match version {
            1 => {
                let legacy: ChannelSettingsV1 = serde_json::from_value(document)?;
                Ok(Self::migrate_v1(legacy))
            }
            v if v == u64::from(SETTINGS_VERSION) => Ok(serde_json::from_value(document)?),
            other => Err(crate::Error::config(format!(
                "Unsupported settings version {} (newest known is {})",
                other, SETTINGS_VERSION
            ))),
        }
    }

    fn migrate_v1(legacy: ChannelSettingsV1) -> Self {
        let connection_status = status_for(&legacy.config);
        Self {
            version: SETTINGS_VERSION,
            enabled: legacy.enabled,
            notification_time: legacy.notification_time,
            connection_status,
            connection_verified_at: None,
            config: legacy.config,
        }
    }
}

fn status_for(config: &ChannelConfig) -> ConnectionStatus {
    if config.is_complete() {
        ConnectionStatus::Ready
    } else {
        ConnectionStatus::SetupRequired
    }
}

/// Parse a 24-hour `HH:MM` string
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}
