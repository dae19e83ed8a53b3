// # Memory Store
//
// In-memory implementation of DomainStore.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing and for short-lived deployments that seed the
// watchlist on startup.
//
// ## Crash Behavior
//
// - The watchlist and all channel settings are lost on restart/crash
// - Ids restart from 1

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::settings::{ChannelKind, ChannelSettings};
use crate::traits::domain_store::{DomainId, DomainRecord, DomainStatus, DomainStore, StatusUpdate};

/// In-memory store implementation
///
/// Domains live in an id-ordered map, settings in a map keyed by channel
/// kind, both behind one `RwLock`.
///
/// # Example
///
/// ```rust,no_run
/// use dwatch_core::state::MemoryStore;
/// use dwatch_core::traits::DomainStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///
///     let id = store.insert_if_not_exists("example.com").await?;
///     assert!(id.is_some());
///
///     // Second insert is a no-op
///     assert_eq!(store.insert_if_not_exists("example.com").await?, None);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MemoryState {
    pub(crate) next_id: u64,
    pub(crate) domains: BTreeMap<DomainId, DomainRecord>,
    pub(crate) settings: HashMap<ChannelKind, ChannelSettings>,
}

impl MemoryState {
    pub(crate) fn insert(&mut self, name: &str) -> Option<DomainId> {
        if self.domains.values().any(|record| record.name == name) {
            return None;
        }
        self.next_id += 1;
        let id = DomainId(self.next_id);
        self.domains.insert(id, DomainRecord::new(id, name));
        Some(id)
    }

    pub(crate) fn apply_status(&mut self, id: DomainId, update: &StatusUpdate) -> u64 {
        match self.domains.get_mut(&id) {
            Some(record) => {
                record.status = update.status;
                record.expires = update.expires;
                record.raw_data = Some(update.raw_data.clone());
                record.last_checked = Some(update.checked_at);
                record.error_message = None;
                1
            }
            None => 0,
        }
    }

    pub(crate) fn apply_error(&mut self, id: DomainId, message: &str, at: DateTime<Utc>) -> u64 {
        match self.domains.get_mut(&id) {
            Some(record) => {
                record.status = DomainStatus::Error;
                record.error_message = Some(message.to_string());
                record.last_checked = Some(at);
                1
            }
            None => 0,
        }
    }

    pub(crate) fn apply_settings(
        &mut self,
        kind: ChannelKind,
        settings: &ChannelSettings,
        enabled: bool,
    ) -> u64 {
        let mut stored = settings.clone();
        stored.enabled = enabled;
        self.settings.insert(kind, stored);
        1
    }
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record as-is, keeping its id
    ///
    /// Useful for seeding tests with already-checked domains.
    pub async fn seed(&self, record: DomainRecord) {
        let mut guard = self.inner.write().await;
        guard.next_id = guard.next_id.max(record.id.0);
        guard.domains.insert(record.id, record);
    }

    /// Get the number of watched domains
    pub async fn len(&self) -> usize {
        self.inner.read().await.domains.len()
    }

    /// Check if the watchlist is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.domains.is_empty()
    }
}

#[async_trait]
impl DomainStore for MemoryStore {
    async fn select_all(&self) -> Result<Vec<DomainRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.domains.values().cloned().collect())
    }

    async fn select_by_id(&self, id: DomainId) -> Result<Option<DomainRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.domains.get(&id).cloned())
    }

    async fn select_where(&self, statuses: &[DomainStatus]) -> Result<Vec<DomainRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .domains
            .values()
            .filter(|record| statuses.contains(&record.status))
            .cloned()
            .collect())
    }

    async fn insert_if_not_exists(&self, name: &str) -> Result<Option<DomainId>, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.insert(name))
    }

    async fn delete_by_id(&self, id: DomainId) -> Result<u64, Error> {
        let mut guard = self.inner.write().await;
        Ok(u64::from(guard.domains.remove(&id).is_some()))
    }

    async fn update_status(&self, id: DomainId, update: &StatusUpdate) -> Result<u64, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.apply_status(id, update))
    }

    async fn update_error(
        &self,
        id: DomainId,
        message: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<u64, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.apply_error(id, message, checked_at))
    }

    async fn select_settings(&self, kind: ChannelKind) -> Result<Option<ChannelSettings>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.settings.get(&kind).cloned())
    }

    async fn upsert_settings(
        &self,
        kind: ChannelKind,
        settings: &ChannelSettings,
        enabled: bool,
    ) -> Result<u64, Error> {
        let mut guard = self.inner.write().await;
        Ok(guard.apply_settings(kind, settings, enabled))
    }
}
