// # File Store
//
// File-based implementation of DomainStore with crash recovery.
//
// ## Purpose
//
// Persists the watchlist and channel settings across daemon restarts for
// single-host deployments that don't run a database.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "next_id": 2,
//   "domains": [
//     { "id": 1, "name": "example.com", "status": "registered",
//       "expires": "2026-01-09T12:00:00Z", "last_checked": "...",
//       "raw_data": {}, "error_message": null }
//   ],
//   "settings": {
//     "webhook": { "version": 2, "enabled": true, ... }
//   }
// }
// ```
//
// Settings are kept as raw documents on disk and migrated to the current
// shape on load, so files written by older versions stay readable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::settings::{ChannelKind, ChannelSettings};
use crate::state::memory::MemoryState;
use crate::traits::domain_store::{DomainId, DomainRecord, DomainStatus, DomainStore, StatusUpdate};

/// Store file format version
/// Used for future migration if format changes
const STORE_FILE_VERSION: &str = "1.0";

/// File-based store with crash recovery
///
/// Every mutation is written through immediately; the write lock is held
/// across the file write so concurrent verification tasks never race on
/// the temporary file.
///
/// # Example
///
/// ```rust,no_run
/// use dwatch_core::state::FileStore;
/// use dwatch_core::traits::DomainStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStore::new("/var/lib/dwatch/watchlist.json").await?;
///
///     // Atomically written to disk
///     store.insert_if_not_exists("example.com").await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: Arc<RwLock<MemoryState>>,
}

/// Serializable store file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    domains: Vec<DomainRecord>,
    #[serde(default)]
    settings: BTreeMap<String, serde_json::Value>,
}

impl FileStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Try to load existing store file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with an empty watchlist
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let state = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Load the store file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main store file
    /// 2. If JSON parse error, try loading backup
    /// 3. If backup also fails, start with empty state
    async fn load_with_recovery(path: &Path) -> Result<MemoryState, Error> {
        match Self::load(path).await {
            Ok(state) => {
                tracing::debug!("Loaded store file: {} domains", state.domains.len());
                Ok(state)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty watchlist.");
                    return Ok(MemoryState::default());
                }

                match Self::load(&backup_path).await {
                    Ok(state) => {
                        tracing::info!(
                            "Recovered store from backup: {} domains",
                            state.domains.len()
                        );

                        if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await
                        {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }

                        Ok(state)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty watchlist.",
                            backup_err
                        );
                        Ok(MemoryState::default())
                    }
                }
            }
            // Other error (not corruption)
            Err(e) => Err(e),
        }
    }

    /// Load the store file
    async fn load(path: &Path) -> Result<MemoryState, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(MemoryState::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!(
                "Failed to read store file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        let mut state = MemoryState::default();
        for record in file.domains {
            state.next_id = state.next_id.max(record.id.0);
            state.domains.insert(record.id, record);
        }
        state.next_id = state.next_id.max(file.next_id);

        for (key, document) in file.settings {
            let Some(kind) = ChannelKind::from_key(&key) else {
                tracing::warn!("Ignoring settings for unknown channel '{}'", key);
                continue;
            };
            state.settings.insert(kind, ChannelSettings::from_document(document)?);
        }

        Ok(state)
    }

    /// Write the store atomically
    ///
    /// Called from [`FileStore::commit`] with the write guard held.
    async fn write(&self, state: &MemoryState) -> Result<(), Error> {
        let mut settings = BTreeMap::new();
        for (kind, value) in &state.settings {
            settings.insert(kind.key().to_string(), serde_json::to_value(value)?);
        }

        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            next_id: state.next_id,
            domains: state.domains.values().cloned().collect(),
            settings,
        };

        let json = serde_json::to_string_pretty(&file)?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut handle = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            handle.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            handle.flush().await.map_err(|e| {
                Error::store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Create backup of current file (if it exists)
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        // Atomic rename (temp -> actual)
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    /// Apply `mutate` to a copy of the state and publish it once written
    ///
    /// `mutate` returns its result and the number of affected rows. With
    /// zero affected rows nothing is written. A failed write leaves the
    /// in-memory state untouched.
    async fn commit<T>(
        &self,
        mutate: impl FnOnce(&mut MemoryState) -> (T, u64),
    ) -> Result<T, Error> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        let (result, affected) = mutate(&mut next);
        if affected > 0 {
            self.write(&next).await?;
            *guard = next;
        }
        Ok(result)
    }

    /// Restore store file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored store file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl DomainStore for FileStore {
    async fn select_all(&self) -> Result<Vec<DomainRecord>, Error> {
        let guard = self.state.read().await;
        Ok(guard.domains.values().cloned().collect())
    }

    async fn select_by_id(&self, id: DomainId) -> Result<Option<DomainRecord>, Error> {
        let guard = self.state.read().await;
        Ok(guard.domains.get(&id).cloned())
    }

    async fn select_where(&self, statuses: &[DomainStatus]) -> Result<Vec<DomainRecord>, Error> {
        let guard = self.state.read().await;
        Ok(guard
            .domains
            .values()
            .filter(|record| statuses.contains(&record.status))
            .cloned()
            .collect())
    }

    async fn insert_if_not_exists(&self, name: &str) -> Result<Option<DomainId>, Error> {
        self.commit(|state| {
            let inserted = state.insert(name);
            (inserted, u64::from(inserted.is_some()))
        })
        .await
    }

    async fn delete_by_id(&self, id: DomainId) -> Result<u64, Error> {
        self.commit(|state| {
            let affected = u64::from(state.domains.remove(&id).is_some());
            (affected, affected)
        })
        .await
    }

    async fn update_status(&self, id: DomainId, update: &StatusUpdate) -> Result<u64, Error> {
        self.commit(|state| {
            let affected = state.apply_status(id, update);
            (affected, affected)
        })
        .await
    }

    async fn update_error(
        &self,
        id: DomainId,
        message: &str,
        checked_at: DateTime<Utc>,
    ) -> Result<u64, Error> {
        self.commit(|state| {
            let affected = state.apply_error(id, message, checked_at);
            (affected, affected)
        })
        .await
    }

    async fn select_settings(&self, kind: ChannelKind) -> Result<Option<ChannelSettings>, Error> {
        let guard = self.state.read().await;
        Ok(guard.settings.get(&kind).cloned())
    }

    async fn upsert_settings(
        &self,
        kind: ChannelKind,
        settings: &ChannelSettings,
        enabled: bool,
    ) -> Result<u64, Error> {
        self.commit(|state| {
            let affected = state.apply_settings(kind, settings, enabled);
            (affected, affected)
        })
        .await
    }
}
