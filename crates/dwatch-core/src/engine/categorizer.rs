//! Watchlist categorization
//!
//! Splits the watchlist into the three buckets a tick works with, using a
//! single `now` snapshot so no domain can move between buckets halfway
//! through the computation.
//!
//! | bucket | rule |
//! |---|---|
//! | `expired_registered` | registered and `expires < now` |
//! | `needing_verification` | available, error or not checked, and not in `expired_registered` |
//! | `expiring` | registered and `now < expires <= now + window` |
//!
//! `expired_registered` is verified first and separately from the routine
//! sweep; keeping it out of `needing_verification` means no domain is
//! checked twice in one tick. `expiring` is a read-only reporting bucket
//! and is never verified.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::traits::{DomainRecord, DomainStatus, DomainStore};

/// The three buckets of one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategorizedWatchlist {
    /// Routine sweep
    pub needing_verification: Vec<DomainRecord>,
    /// Priority sweep
    pub expired_registered: Vec<DomainRecord>,
    /// Report-only
    pub expiring: Vec<DomainRecord>,
}

/// Reads the watchlist and buckets it
#[derive(Clone)]
pub struct Categorizer {
    store: Arc<dyn DomainStore>,
    window: Duration,
}

impl Categorizer {
    /// Create a categorizer with an "expiring soon" window
    pub fn new(store: Arc<dyn DomainStore>, window: Duration) -> Self {
        Self { store, window }
    }

    /// Read the full watchlist once and bucket it at `now`
    pub async fn categorize(&self, now: DateTime<Utc>) -> Result<CategorizedWatchlist> {
        let domains = self.store.select_all().await?;
        Ok(partition(domains, now, self.window))
    }
}

impl std::fmt::Debug for Categorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Categorizer")
            .field("window", &self.window)
            .finish()
    }
}

/// Bucket `domains` at `now`
pub fn partition(
    domains: Vec<DomainRecord>,
    now: DateTime<Utc>,
    window: Duration,
) -> CategorizedWatchlist {
    let horizon = now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC);
    let mut buckets = CategorizedWatchlist::default();

    for domain in domains {
        if domain.is_expired_registered(now) {
            buckets.expired_registered.push(domain);
            continue;
        }

        match (domain.status, domain.trusted_expiry()) {
            (DomainStatus::Available | DomainStatus::Error | DomainStatus::NotChecked, _) => {
                buckets.needing_verification.push(domain);
            }
            (DomainStatus::Registered, Some(expires)) if now < expires && expires <= horizon => {
                buckets.expiring.push(domain);
            }
            (DomainStatus::Registered, _) => {}
        }
    }

    buckets
}
