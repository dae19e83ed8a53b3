//! Verification engine
//!
//! Checks domains against the lookup provider and persists every outcome.
//!
//! ## Single check
//!
//! [`Verifier::verify_one`] performs exactly one provider call and exactly
//! one store write, whatever the provider does:
//!
//! - provider success → `update_status` (even when the status is
//!   unchanged, so `raw_data` and `last_checked` stay fresh)
//! - provider failure → `update_error`
//!
//! ## Batches
//!
//! [`Verifier::verify_batch`] splits the input into consecutive chunks of
//! `batch_size`. Members of a chunk run concurrently, each as its own task
//! holding a permit of a `batch_size` semaphore, and the chunk is joined
//! before the next one starts. Chunks are separated by the configured
//! delay, which is what keeps bursts inside the provider's rate limit.
//! There are no retries at this layer: total provider calls equal the
//! number of input domains.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BatchConfig;
use crate::error::Result;
use crate::traits::{Clock, DomainRecord, DomainStatus, DomainStore, LookupProvider, StatusUpdate};

/// Per-domain outcome of one check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VerificationOutcome {
    /// Provider answered and the answer was persisted
    Checked {
        /// New registration state
        status: DomainStatus,
        /// Reported expiry
        expires: Option<DateTime<Utc>>,
        /// The domain is now available
        was_available: bool,
        /// The domain is (still) registered
        is_still_registered: bool,
    },

    /// Provider failed; the domain was marked as `error`
    Failed {
        /// Failure reason
        error: String,
    },
}

/// Result of checking one domain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    /// Whether the provider answered
    pub success: bool,
    /// Domain name
    pub domain: String,
    /// Details
    #[serde(flatten)]
    pub outcome: VerificationOutcome,
}

impl VerificationResult {
    /// A successful check
    pub fn checked(
        domain: impl Into<String>,
        status: DomainStatus,
        expires: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            success: true,
            domain: domain.into(),
            outcome: VerificationOutcome::Checked {
                status,
                expires,
                was_available: status == DomainStatus::Available,
                is_still_registered: status == DomainStatus::Registered,
            },
        }
    }

    /// A failed check
    pub fn failed(domain: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            domain: domain.into(),
            outcome: VerificationOutcome::Failed {
                error: error.into(),
            },
        }
    }

    /// The domain transitioned to available
    pub fn was_available(&self) -> bool {
        matches!(
            self.outcome,
            VerificationOutcome::Checked {
                was_available: true,
                ..
            }
        )
    }

    /// The domain is registered
    pub fn is_still_registered(&self) -> bool {
        matches!(
            self.outcome,
            VerificationOutcome::Checked {
                is_still_registered: true,
                ..
            }
        )
    }

    /// Failure reason, if the check failed
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            VerificationOutcome::Failed { error } => Some(error),
            VerificationOutcome::Checked { .. } => None,
        }
    }

    /// `domain` with this outcome applied
    fn apply_to(&self, domain: &DomainRecord, checked_at: DateTime<Utc>) -> DomainRecord {
        let mut refreshed = domain.clone();
        refreshed.last_checked = Some(checked_at);
        match &self.outcome {
            VerificationOutcome::Checked {
                status, expires, ..
            } => {
                refreshed.status = *status;
                refreshed.expires = *expires;
                refreshed.error_message = None;
            }
            VerificationOutcome::Failed { error } => {
                refreshed.status = DomainStatus::Error;
                refreshed.error_message = Some(error.clone());
            }
        }
        refreshed
    }
}

/// Aggregate of one batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchVerificationResult {
    /// Domains processed
    pub checked: usize,
    /// Domains that are now available
    pub available: Vec<DomainRecord>,
    /// Expired input domains that are still registered
    pub still_registered: Vec<DomainRecord>,
    /// Failed checks
    pub errors: usize,
    /// `"<domain>: <reason>"`, in completion order per chunk
    pub error_messages: Vec<String>,
}

impl BatchVerificationResult {
    fn record(&mut self, domain: &DomainRecord, result: &VerificationResult, now: DateTime<Utc>) {
        self.checked += 1;

        if let Some(reason) = result.error() {
            self.push_error(&domain.name, reason);
            return;
        }

        if result.was_available() {
            self.available.push(result.apply_to(domain, now));
        } else if result.is_still_registered() && domain.expires.is_some_and(|e| e < now) {
            self.still_registered.push(result.apply_to(domain, now));
        }
    }

    fn push_error(&mut self, name: &str, reason: &str) {
        self.errors += 1;
        self.error_messages.push(format!("{}: {}", name, reason));
    }

    /// Fold another batch into this one
    pub fn merge(&mut self, other: BatchVerificationResult) {
        self.checked += other.checked;
        for domain in other.available {
            if !self.available.iter().any(|known| known.id == domain.id) {
                self.available.push(domain);
            }
        }
        self.still_registered.extend(other.still_registered);
        self.errors += other.errors;
        self.error_messages.extend(other.error_messages);
    }
}

/// Checks domains and persists the outcomes
///
/// Cheap to clone; every spawned check holds its own clone.
#[derive(Clone)]
pub struct Verifier {
    store: Arc<dyn DomainStore>,
    provider: Arc<dyn LookupProvider>,
    clock: Arc<dyn Clock>,
}

impl Verifier {
    /// Create a verifier
    pub fn new(
        store: Arc<dyn DomainStore>,
        provider: Arc<dyn LookupProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
        }
    }

    /// Check one domain and persist the outcome
    ///
    /// # Returns
    ///
    /// - `Ok(VerificationResult)`: The provider was called and the outcome
    ///   written, whether the provider succeeded or not
    /// - `Err(Error)`: The store write failed
    pub async fn verify_one(&self, domain: &DomainRecord) -> Result<VerificationResult> {
        debug!("Checking {}", domain.name);

        let lookup = self.provider.check_availability(&domain.name).await;
        let checked_at = self.clock.now_utc();

        let check = match lookup {
            Ok(check)
                if matches!(
                    check.status,
                    DomainStatus::Available | DomainStatus::Registered
                ) =>
            {
                check
            }
            Ok(check) => {
                let reason = format!(
                    "{} returned unusable status '{}'",
                    self.provider.provider_name(),
                    check.status
                );
                return self.record_failure(domain, reason, checked_at).await;
            }
            Err(e) => {
                warn!("Check failed for {}: {}", domain.name, e);
                return self.record_failure(domain, e.to_string(), checked_at).await;
            }
        };

        let update = StatusUpdate {
            status: check.status,
            expires: check.expires,
            raw_data: check.raw,
            checked_at,
        };
        let affected = self.store.update_status(domain.id, &update).await?;
        if affected == 0 {
            warn!("{} (id {}) vanished before its check was saved", domain.name, domain.id);
        }

        debug!("{} is {}", domain.name, check.status);
        Ok(VerificationResult::checked(
            &domain.name,
            check.status,
            check.expires,
        ))
    }

    async fn record_failure(
        &self,
        domain: &DomainRecord,
        reason: String,
        checked_at: DateTime<Utc>,
    ) -> Result<VerificationResult> {
        self.store
            .update_error(domain.id, &reason, checked_at)
            .await?;
        Ok(VerificationResult::failed(&domain.name, reason))
    }

    /// Check many domains in rate-limited chunks
    ///
    /// Never fails as a whole: provider failures, store failures and
    /// aborted checks are counted per domain.
    pub async fn verify_batch(
        &self,
        domains: Vec<DomainRecord>,
        batch: BatchConfig,
    ) -> BatchVerificationResult {
        let mut result = BatchVerificationResult::default();
        if domains.is_empty() {
            return result;
        }

        let batch_size = batch.batch_size.max(1);
        let delay = batch.delay();
        let permits = Arc::new(Semaphore::new(batch_size));
        let chunk_count = domains.len().div_ceil(batch_size);

        for (index, chunk) in domains.chunks(batch_size).enumerate() {
            let now = self.clock.now_utc();
            debug!(
                "Verifying chunk {}/{} ({} domains)",
                index + 1,
                chunk_count,
                chunk.len()
            );

            let handles: Vec<(DomainRecord, JoinHandle<Result<VerificationResult>>)> = chunk
                .iter()
                .map(|domain| {
                    let verifier = self.clone();
                    let permits = Arc::clone(&permits);
                    let task_domain = domain.clone();
                    let handle = tokio::spawn(async move {
                        let _permit = permits.acquire_owned().await.ok();
                        verifier.verify_one(&task_domain).await
                    });
                    (domain.clone(), handle)
                })
                .collect();

            // Each handle is joined on its own so one failure never hides a sibling
            for (domain, handle) in handles {
                match handle.await {
                    Ok(Ok(outcome)) => result.record(&domain, &outcome, now),
                    Ok(Err(e)) => {
                        error!("Store write failed for {}: {}", domain.name, e);
                        result.checked += 1;
                        result.push_error(&domain.name, &e.to_string());
                    }
                    Err(join_error) => {
                        let reason = format!("check aborted: {}", join_error);
                        error!("{}: {}", domain.name, reason);
                        self.mark_aborted(&domain, &reason).await;
                        result.checked += 1;
                        result.push_error(&domain.name, &reason);
                    }
                }
            }

            if index + 1 < chunk_count && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        info!(
            "Batch complete: {} checked, {} available, {} still registered, {} errors",
            result.checked,
            result.available.len(),
            result.still_registered.len(),
            result.errors
        );
        result
    }

    /// Best-effort error write for a check that never returned normally
    async fn mark_aborted(&self, domain: &DomainRecord, reason: &str) {
        let at = self.clock.now_utc();
        if let Err(e) = self.store.update_error(domain.id, reason, at).await {
            error!("Could not mark {} as failed: {}", domain.name, e);
        }
    }

    /// The store this verifier writes to
    pub fn store(&self) -> &Arc<dyn DomainStore> {
        &self.store
    }

    /// The provider this verifier calls
    pub fn provider(&self) -> &Arc<dyn LookupProvider> {
        &self.provider
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Verifier")
            .field("provider", &self.provider.provider_name())
            .finish()
    }
}
