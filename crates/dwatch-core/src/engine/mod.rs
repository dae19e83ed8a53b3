//! Core monitor engine
//!
//! The MonitorEngine is responsible for:
//! - Deciding which notification channels are due this tick
//! - Verifying the watchlist via the lookup provider (only when a channel is due)
//! - Categorizing the watchlist into report buckets
//! - Fanning the report out to every due channel with per-channel isolation
//!
//! ## Architecture
//!
//! ```text
//!             run_tick(force)
//!                    │
//!                    ▼
//!           ┌────────────────┐   settings    ┌─────────────┐
//!           │ MonitorEngine  │◀─────────────│ DomainStore │
//!           └────────────────┘               └─────────────┘
//!                    │                              ▲
//!          ┌─────────┴──────────┐                   │ writes
//!          ▼                    ▼                   │
//!  ┌──────────────┐     ┌──────────────┐    ┌────────────────┐
//!  │ Categorizer  │────▶│   Verifier   │───▶│ LookupProvider │
//!  └──────────────┘     └──────────────┘    └────────────────┘
//!                               │
//!                               ▼
//!               ┌───────────────────────────────┐
//!               │ NotificationChannel × due     │
//!               └───────────────────────────────┘
//! ```
//!
//! ## Tick Flow
//!
//! 1. Resolve due channels (enabled, and forced or matching `HH:MM`)
//! 2. No due channel → return `skipped` without touching the watchlist
//! 3. Categorize once, then verify the priority and routine buckets as
//!    two concurrent batches
//! 4. Send the merged report to every due channel, concurrently, even
//!    when there is nothing to report
//! 5. Aggregate delivery results
//!
//! Every tick re-derives its plan from the store; nothing about the
//! schedule is persisted.

pub mod categorizer;
pub mod verification;

pub use categorizer::{CategorizedWatchlist, Categorizer};
pub use verification::{BatchVerificationResult, VerificationOutcome, VerificationResult, Verifier};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::registry::ChannelRegistry;
use crate::settings::{ChannelKind, ChannelSettings};
use crate::traits::{Clock, DomainStore, LookupProvider, NotificationChannel, Report};

/// Events emitted by the MonitorEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// No channel was due
    TickSkipped {
        timestamp: DateTime<Utc>,
    },

    /// Verification finished for a tick
    VerificationCompleted {
        checked: usize,
        available: usize,
        expired: usize,
        errors: usize,
    },

    /// A channel accepted the report
    ReportSent {
        channel: ChannelKind,
    },

    /// A channel failed or was skipped
    ReportFailed {
        channel: ChannelKind,
        error: String,
    },
}

/// Whether a tick did any work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickAction {
    /// No channel was due
    Skipped,
    /// Verification and dispatch ran
    Executed,
}

/// Domain counts of an executed tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DomainSummary {
    pub checked: usize,
    pub available: usize,
    pub expiring: usize,
    pub expired: usize,
}

/// A channel that did not deliver
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelFailure {
    /// Channel key
    pub channel: String,
    /// Reason
    pub error: String,
}

/// Delivery results of an executed tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationSummary {
    /// Channels whose send succeeded
    pub sent: usize,
    /// Keys of those channels
    pub providers: Vec<String>,
    /// Present only when at least one channel failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ChannelFailure>>,
}

/// Result of one tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub timestamp: DateTime<Utc>,
    pub action: TickAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domains: Option<DomainSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationSummary>,
}

impl TickReport {
    fn skipped(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            action: TickAction::Skipped,
            domains: None,
            notifications: None,
        }
    }
}

/// A channel due this tick, with the settings it was resolved from
struct DueChannel {
    channel: Arc<dyn NotificationChannel>,
    settings: ChannelSettings,
}

/// Core monitor engine
///
/// The engine owns no timers. The process entry point calls
/// [`MonitorEngine::run_tick`] once per minute (or on demand with
/// `force = true`) and the engine reacts to the injected clock.
///
/// ## Load Resistance
///
/// - Provider calls happen only when at least one channel is due
/// - Provider calls are bounded by the batch size and spaced by the batch delay
/// - Channel failures and panics are contained per channel
/// - Event emission never blocks: a full event channel drops the event
pub struct MonitorEngine {
    store: Arc<dyn DomainStore>,
    verifier: Verifier,
    categorizer: Categorizer,
    channels: ChannelRegistry,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl MonitorEngine {
    /// Create a new monitor engine
    ///
    /// # Parameters
    ///
    /// - `store`: Store gateway shared with the rest of the process
    /// - `provider`: Lookup provider implementation
    /// - `channels`: Registered notification channels
    /// - `clock`: Time source
    /// - `config`: Monitor configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        store: Arc<dyn DomainStore>,
        provider: Arc<dyn LookupProvider>,
        channels: ChannelRegistry,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            verifier: Verifier::new(Arc::clone(&store), provider, Arc::clone(&clock)),
            categorizer: Categorizer::new(Arc::clone(&store), config.expiring_window()),
            store,
            channels,
            clock,
            config,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run one tick
    ///
    /// # Parameters
    ///
    /// - `force`: Treat every enabled channel as due, ignoring its time of day
    ///
    /// # Returns
    ///
    /// - `Ok(TickReport)`: The tick completed (channel failures are inside the report)
    /// - `Err(Error::MissingCredentials)`: A channel is due but the provider
    ///   has no credentials; nothing was verified or written
    /// - `Err(Error)`: The store failed while planning the tick
    pub async fn run_tick(&self, force: bool) -> Result<TickReport> {
        let now = self.clock.now_utc();
        let hhmm = self.clock.local_hhmm(now);

        let due = self.resolve_due_channels(&hhmm, force).await?;
        if due.is_empty() {
            debug!("No channel due at {}, skipping tick", hhmm);
            self.emit_event(EngineEvent::TickSkipped { timestamp: now });
            return Ok(TickReport::skipped(now));
        }

        let provider = self.verifier.provider();
        if !provider.has_credentials() {
            warn!(
                "{} channel(s) due at {} but no lookup credentials are configured",
                due.len(),
                hhmm
            );
            return Err(Error::missing_credentials(format!(
                "{} API key is not configured",
                provider.provider_name()
            )));
        }

        info!(
            "Tick at {}: {} channel(s) due{}",
            hhmm,
            due.len(),
            if force { " (forced)" } else { "" }
        );

        let (checked, report) = self.verify_and_categorize(now).await?;
        info!(
            "Dispatching report ({} domain(s) need attention) to {} channel(s)",
            report.total_count,
            due.len()
        );
        let domains = DomainSummary {
            checked,
            available: report.available.len(),
            expiring: report.expiring.len(),
            expired: report.expired.len(),
        };

        let notifications = self.dispatch(due, Arc::new(report)).await;

        Ok(TickReport {
            timestamp: now,
            action: TickAction::Executed,
            domains: Some(domains),
            notifications: Some(notifications),
        })
    }

    /// Load settings and keep the channels that fire this tick
    async fn resolve_due_channels(&self, hhmm: &str, force: bool) -> Result<Vec<DueChannel>> {
        let mut due = Vec::new();

        for channel in self.channels.channels() {
            let kind = channel.kind();
            let Some(settings) = self.store.select_settings(kind).await? else {
                debug!("Channel {} has no settings, skipping", kind);
                continue;
            };

            if !settings.enabled {
                debug!("Channel {} is disabled, skipping", kind);
                continue;
            }

            if force || settings.is_due_at(hhmm) {
                due.push(DueChannel {
                    channel: Arc::clone(channel),
                    settings,
                });
            }
        }

        Ok(due)
    }

    /// Categorize, verify both sweeps concurrently and merge
    ///
    /// Returns the number of domains checked and the report to send.
    async fn verify_and_categorize(&self, now: DateTime<Utc>) -> Result<(usize, Report)> {
        let buckets = self.categorizer.categorize(now).await?;
        debug!(
            "Categorized watchlist: {} expired, {} to verify, {} expiring",
            buckets.expired_registered.len(),
            buckets.needing_verification.len(),
            buckets.expiring.len()
        );

        let (priority, routine) = tokio::join!(
            self.verifier
                .verify_batch(buckets.expired_registered, self.config.priority),
            self.verifier
                .verify_batch(buckets.needing_verification, self.config.routine),
        );

        for message in priority.error_messages.iter().chain(&routine.error_messages) {
            warn!("Verification error: {}", message);
        }

        let checked = priority.checked + routine.checked;
        let errors = priority.errors + routine.errors;
        let expired = priority.still_registered.clone();

        let mut merged = priority;
        merged.merge(routine);

        self.emit_event(EngineEvent::VerificationCompleted {
            checked,
            available: merged.available.len(),
            expired: expired.len(),
            errors,
        });

        Ok((
            checked,
            Report::new(merged.available, buckets.expiring, expired, now),
        ))
    }

    /// Send the report to every due channel concurrently
    async fn dispatch(&self, due: Vec<DueChannel>, report: Arc<Report>) -> NotificationSummary {
        let handles: Vec<(ChannelKind, JoinHandle<std::result::Result<String, String>>)> = due
            .into_iter()
            .map(|DueChannel { channel, settings }| {
                let kind = channel.kind();
                let report = Arc::clone(&report);
                let handle = tokio::spawn(async move {
                    if !channel.validate(&settings) {
                        return Err("skipped: settings incomplete".to_string());
                    }
                    let outcome = channel.send_report(&settings, &report).await;
                    if outcome.success {
                        Ok(outcome.message)
                    } else {
                        Err(outcome.message)
                    }
                });
                (kind, handle)
            })
            .collect();

        let mut providers = Vec::new();
        let mut failures = Vec::new();

        for (kind, handle) in handles {
            let delivery = match handle.await {
                Ok(delivery) => delivery,
                Err(join_error) => {
                    error!("Channel {} aborted: {}", kind, join_error);
                    Err(format!("channel aborted: {}", join_error))
                }
            };

            match delivery {
                Ok(message) => {
                    info!("Report sent via {}: {}", kind, message);
                    self.emit_event(EngineEvent::ReportSent { channel: kind });
                    providers.push(kind.key().to_string());
                }
                Err(reason) => {
                    warn!("Report not sent via {}: {}", kind, reason);
                    self.emit_event(EngineEvent::ReportFailed {
                        channel: kind,
                        error: reason.clone(),
                    });
                    failures.push(ChannelFailure {
                        channel: kind.key().to_string(),
                        error: reason,
                    });
                }
            }
        }

        NotificationSummary {
            sent: providers.len(),
            providers,
            errors: if failures.is_empty() {
                None
            } else {
                Some(failures)
            },
        }
    }

    /// The verifier used by this engine
    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// The registered channels
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Emit an engine event
    fn emit_event(&self, event: EngineEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
