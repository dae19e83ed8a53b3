//! Notification channel registry
//!
//! The registry is the list of channel implementations a deployment
//! wires in. Channel kinds form a closed enum ([`ChannelKind`]), so the
//! registry holds at most one implementation per kind and lookups never
//! go through runtime string dispatch.
//!
//! ## Registration
//!
//! Channel crates expose a `register()` function:
//!
//! ```rust,ignore
//! let mut registry = ChannelRegistry::new();
//! dwatch_notify_webhook::register(&mut registry)?;
//! dwatch_notify_email::register(&mut registry)?;
//! ```

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::settings::ChannelKind;
use crate::traits::NotificationChannel;

/// Registered notification channels, in registration order
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl ChannelRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel implementation
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Registered
    /// - `Err(Error::Config)`: A channel of the same kind is already registered
    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) -> Result<()> {
        let kind = channel.kind();
        if self.has_channel(kind) {
            return Err(Error::config(format!(
                "Channel '{}' is already registered",
                kind
            )));
        }
        self.channels.push(channel);
        Ok(())
    }

    /// Registered channels, in registration order
    pub fn channels(&self) -> &[Arc<dyn NotificationChannel>] {
        &self.channels
    }

    /// The channel implementing `kind`
    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn NotificationChannel>> {
        self.channels
            .iter()
            .find(|channel| channel.kind() == kind)
            .cloned()
    }

    /// Check if a channel kind is registered
    pub fn has_channel(&self, kind: ChannelKind) -> bool {
        self.channels.iter().any(|channel| channel.kind() == kind)
    }

    /// List all registered channel kinds
    pub fn kinds(&self) -> Vec<ChannelKind> {
        self.channels.iter().map(|channel| channel.kind()).collect()
    }

    /// Number of registered channels
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is registered
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
