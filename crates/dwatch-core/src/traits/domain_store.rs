// # Domain Store Trait
//
// Defines the query contract of the relational store that holds the
// watchlist and the per-channel settings.
//
// ## Implementations
//
// - In-memory: `state::MemoryStore`
// - JSON file: `state::FileStore`
// - Future: SQLite, Postgres, etc.
//
// Every mutation reports the number of affected rows so callers can tell
// a no-op from an applied change. Writes are single-row and keyed by
// domain id; a failed write never rolls back a sibling's write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::settings::{ChannelKind, ChannelSettings};

/// Store-assigned domain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(pub u64);

impl fmt::Display for DomainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registration state of a watched domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    /// Added but never looked up
    #[default]
    NotChecked,
    /// Free to register
    Available,
    /// Held by a registrant
    Registered,
    /// Last lookup failed
    Error,
}

impl DomainStatus {
    /// Stable string key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotChecked => "not_checked",
            Self::Available => "available",
            Self::Registered => "registered",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A watched domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    /// Store-assigned id
    pub id: DomainId,
    /// Normalized lowercase name without scheme, path or port
    pub name: String,
    /// Current registration state
    #[serde(default)]
    pub status: DomainStatus,
    /// Registration expiry, as last reported
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    /// Time of the last completed check, successful or not
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    /// Provider payload from the last successful check
    #[serde(default)]
    pub raw_data: Option<serde_json::Value>,
    /// Failure reason, only set while `status` is `error`
    #[serde(default)]
    pub error_message: Option<String>,
}

impl DomainRecord {
    /// Create a fresh, never-checked record
    pub fn new(id: DomainId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: DomainStatus::NotChecked,
            expires: None,
            last_checked: None,
            raw_data: None,
            error_message: None,
        }
    }

    /// Expiry, only when it can be trusted
    ///
    /// The expiry survives a failed check in storage but means nothing
    /// unless the domain is currently registered.
    pub fn trusted_expiry(&self) -> Option<DateTime<Utc>> {
        match self.status {
            DomainStatus::Registered => self.expires,
            _ => None,
        }
    }

    /// Registered and past its expiry at `now`
    pub fn is_expired_registered(&self, now: DateTime<Utc>) -> bool {
        self.trusted_expiry().is_some_and(|expires| expires < now)
    }
}

/// Outcome of a successful lookup, as persisted
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// New registration state
    pub status: DomainStatus,
    /// Reported expiry (if any)
    pub expires: Option<DateTime<Utc>>,
    /// Provider payload
    pub raw_data: serde_json::Value,
    /// When the check completed
    pub checked_at: DateTime<Utc>,
}

/// Trait for the store gateway
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks;
/// the verification engine issues one write per domain from parallel
/// tasks within a chunk.
///
/// # Responsibilities
///
/// The store only persists rows. It never decides which domains to check,
/// never calls the lookup provider and never sends notifications.
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Every watched domain, ordered by id
    async fn select_all(&self) -> Result<Vec<DomainRecord>, crate::Error>;

    /// One domain by id
    async fn select_by_id(&self, id: DomainId) -> Result<Option<DomainRecord>, crate::Error>;

    /// Domains whose status is one of `statuses`, ordered by id
    async fn select_where(
        &self,
        statuses: &[DomainStatus],
    ) -> Result<Vec<DomainRecord>, crate::Error>;

    /// Insert a never-checked domain unless the name is already watched
    ///
    /// # Returns
    ///
    /// - `Ok(Some(id))`: Inserted
    /// - `Ok(None)`: Name already present (no-op)
    async fn insert_if_not_exists(&self, name: &str) -> Result<Option<DomainId>, crate::Error>;

    /// Remove a domain, returning the number of rows removed
    async fn delete_by_id(&self, id: DomainId) -> Result<u64, crate::Error>;

    /// Persist a successful lookup and clear any previous error
    async fn update_status(&self, id: DomainId, update: &StatusUpdate)
    -> Result<u64, crate::Error>;

    /// Persist a failed lookup
    ///
    /// Sets `status = error`, the message and `last_checked`. The stored
    /// expiry is left in place but is untrusted from here on.
    async fn update_error(
        &self,
        id: DomainId,
        message: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<u64, crate::Error>;

    /// Settings of one channel kind, if ever saved
    async fn select_settings(
        &self,
        kind: ChannelKind,
    ) -> Result<Option<ChannelSettings>, crate::Error>;

    /// Create or replace the settings of one channel kind
    ///
    /// `enabled` overrides `settings.enabled` so a toggle can be written
    /// without re-serializing the channel fields.
    async fn upsert_settings(
        &self,
        kind: ChannelKind,
        settings: &ChannelSettings,
        enabled: bool,
    ) -> Result<u64, crate::Error>;
}
