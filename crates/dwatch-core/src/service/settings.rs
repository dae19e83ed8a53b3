// # Channel Settings Service
//
// Operator-facing settings operations, one record per channel kind.
//
// Connection status is maintained here:
// - save → `ready` or `setup_required`, depending on completeness
// - test_send → `connected` or `error`, stamping `connection_verified_at`
// - disconnect → `disconnected`, fields cleared, channel disabled

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::registry::ChannelRegistry;
use crate::settings::{ChannelConfig, ChannelKind, ChannelSettings, ConnectionStatus};
use crate::traits::{Clock, DomainStore, SendOutcome};

/// Settings operations for every registered channel kind
#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn DomainStore>,
    channels: ChannelRegistry,
    clock: Arc<dyn Clock>,
    read_only: bool,
}

impl SettingsService {
    /// Create a settings service
    pub fn new(
        store: Arc<dyn DomainStore>,
        channels: ChannelRegistry,
        clock: Arc<dyn Clock>,
        read_only: bool,
    ) -> Self {
        Self {
            store,
            channels,
            clock,
            read_only,
        }
    }

    /// Current settings of `kind`
    ///
    /// A kind that was never saved reads as disabled with empty fields.
    pub async fn get(&self, kind: ChannelKind) -> Result<ChannelSettings> {
        Ok(self
            .store
            .select_settings(kind)
            .await?
            .unwrap_or_else(|| ChannelSettings::new(ChannelConfig::empty(kind))))
    }

    /// Save channel fields, notification time and enabled flag
    ///
    /// Resets connectivity tracking: the status becomes `ready` or
    /// `setup_required` until the next test send.
    pub async fn save(
        &self,
        config: ChannelConfig,
        notification_time: &str,
        enabled: bool,
    ) -> Result<ChannelSettings> {
        self.ensure_writable()?;
        let kind = config.kind();

        let mut settings = self.get(kind).await?;
        settings.apply_config(config);
        settings.notification_time = notification_time.trim().to_string();
        settings.enabled = enabled;
        settings.validate()?;

        self.persist(&settings).await?;
        info!(
            "Saved {} settings ({:?}, enabled: {})",
            kind, settings.connection_status, settings.enabled
        );
        Ok(settings)
    }

    /// Toggle whether `kind` takes part in ticks
    pub async fn set_enabled(&self, kind: ChannelKind, enabled: bool) -> Result<ChannelSettings> {
        self.ensure_writable()?;

        let mut settings = self.get(kind).await?;
        if enabled && !settings.config.is_complete() {
            return Err(Error::invalid_input(format!(
                "Cannot enable {}: required fields are missing",
                kind
            )));
        }
        settings.enabled = enabled;

        self.persist(&settings).await?;
        info!("{} {}", kind, if enabled { "enabled" } else { "disabled" });
        Ok(settings)
    }

    /// Clear the channel fields and disable the channel
    pub async fn disconnect(&self, kind: ChannelKind) -> Result<ChannelSettings> {
        self.ensure_writable()?;

        let mut settings = self.get(kind).await?;
        settings.apply_config(ChannelConfig::empty(kind));
        settings.connection_status = ConnectionStatus::Disconnected;
        settings.enabled = false;

        self.persist(&settings).await?;
        info!("{} disconnected", kind);
        Ok(settings)
    }

    /// Send a connectivity test and record its outcome
    ///
    /// # Returns
    ///
    /// - `Ok(SendOutcome)`: The test ran; `success` tells whether it was delivered
    /// - `Err(Error::InvalidInput)`: Required fields are missing, nothing was sent
    /// - `Err(Error::Config)`: No channel of `kind` is registered
    pub async fn test_send(&self, kind: ChannelKind) -> Result<SendOutcome> {
        self.ensure_writable()?;

        let channel = self
            .channels
            .get(kind)
            .ok_or_else(|| Error::config(format!("Channel '{}' is not registered", kind)))?;

        let mut settings = self.get(kind).await?;
        if !channel.validate(&settings) {
            return Err(Error::invalid_input(format!(
                "{} settings are incomplete",
                kind
            )));
        }

        let now = self.clock.now_utc();
        let outcome = channel.send_test(&settings, now).await;
        if !outcome.success {
            warn!("Test send via {} failed: {}", kind, outcome.message);
        }

        settings.record_test(outcome.success, now);
        self.persist(&settings).await?;
        Ok(outcome)
    }

    async fn persist(&self, settings: &ChannelSettings) -> Result<()> {
        self.store
            .upsert_settings(settings.kind(), settings, settings.enabled)
            .await?;
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::read_only("Settings changes are disabled"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SettingsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsService")
            .field("channels", &self.channels)
            .field("read_only", &self.read_only)
            .finish()
    }
}
