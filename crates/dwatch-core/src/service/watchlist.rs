//! Watchlist operations for manual callers
//!
//! Everything an operator does outside the scheduled tick: adding and
//! removing domains, rechecking one domain or a capped sweep, and raw
//! nameserver/certificate inspection.
//!
//! Input validation and policy (read-only mode, missing provider
//! credentials) are enforced here, before any store or provider I/O.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::MonitorConfig;
use crate::engine::{BatchVerificationResult, Categorizer, VerificationResult, Verifier};
use crate::error::{Error, Result};
use crate::traits::{Clock, DomainId, DomainRecord, DomainStore, LookupProvider};

const MAX_NAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Manual watchlist operations
#[derive(Clone)]
pub struct WatchlistService {
    verifier: Verifier,
    categorizer: Categorizer,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
}

impl WatchlistService {
    /// Create a watchlist service
    pub fn new(
        store: Arc<dyn DomainStore>,
        provider: Arc<dyn LookupProvider>,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            verifier: Verifier::new(Arc::clone(&store), provider, Arc::clone(&clock)),
            categorizer: Categorizer::new(store, config.expiring_window()),
            clock,
            config,
        })
    }

    fn store(&self) -> &Arc<dyn DomainStore> {
        self.verifier.store()
    }

    fn provider(&self) -> &Arc<dyn LookupProvider> {
        self.verifier.provider()
    }

    /// Add a domain to the watchlist
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: Added, status `not_checked`
    /// - `Ok(None)`: The normalized name is already watched
    /// - `Err(Error::InvalidInput)`: Not a valid domain name
    /// - `Err(Error::ReadOnly)`: Mutations are disabled
    pub async fn add_domain(&self, raw: &str) -> Result<Option<DomainRecord>> {
        self.ensure_writable()?;
        let name = normalize_domain(raw)?;

        let Some(id) = self.store().insert_if_not_exists(&name).await? else {
            debug!("{} is already on the watchlist", name);
            return Ok(None);
        };

        info!("Added {} to the watchlist (id {})", name, id);
        self.store().select_by_id(id).await
    }

    /// Remove a domain from the watchlist
    pub async fn remove_domain(&self, id: DomainId) -> Result<()> {
        self.ensure_writable()?;

        if self.store().delete_by_id(id).await? == 0 {
            return Err(Error::not_found(format!("Domain {} does not exist", id)));
        }
        info!("Removed domain {} from the watchlist", id);
        Ok(())
    }

    /// The full watchlist
    pub async fn list_domains(&self) -> Result<Vec<DomainRecord>> {
        self.store().select_all().await
    }

    /// Recheck one domain now
    ///
    /// Provider failures are returned inside the result (and persisted);
    /// only policy, lookup and store failures are errors.
    pub async fn verify_single(&self, id: DomainId) -> Result<VerificationResult> {
        self.ensure_can_check()?;
        let domain = self.find(id).await?;
        self.verifier.verify_one(&domain).await
    }

    /// Run a capped sweep outside the schedule
    ///
    /// Expired-but-registered domains are verified first, in full, with
    /// the priority batching. At most `min(limit, manual.max_domains)`
    /// routine domains follow with the manual batching.
    pub async fn verify_all_due(&self, limit: usize) -> Result<BatchVerificationResult> {
        self.ensure_can_check()?;
        if limit == 0 {
            return Err(Error::invalid_input("Sweep limit must be > 0"));
        }

        let now = self.clock.now_utc();
        let mut buckets = self.categorizer.categorize(now).await?;

        let cap = limit.min(self.config.manual.max_domains);
        if buckets.needing_verification.len() > cap {
            debug!(
                "Capping manual sweep at {} of {} routine domains",
                cap,
                buckets.needing_verification.len()
            );
            buckets.needing_verification.truncate(cap);
        }

        let mut result = self
            .verifier
            .verify_batch(buckets.expired_registered, self.config.priority)
            .await;
        let routine = self
            .verifier
            .verify_batch(buckets.needing_verification, self.config.manual.batch)
            .await;
        result.merge(routine);

        info!(
            "Manual sweep: {} checked, {} available, {} errors",
            result.checked,
            result.available.len(),
            result.errors
        );
        Ok(result)
    }

    /// Raw nameserver data for a watched domain
    pub async fn inspect_nameservers(&self, id: DomainId) -> Result<Value> {
        self.ensure_credentials()?;
        let domain = self.find(id).await?;
        self.provider().check_ns(&domain.name).await
    }

    /// Raw certificate data for a watched domain
    pub async fn inspect_ssl(&self, id: DomainId) -> Result<Value> {
        self.ensure_credentials()?;
        let domain = self.find(id).await?;
        self.provider().check_ssl(&domain.name).await
    }

    async fn find(&self, id: DomainId) -> Result<DomainRecord> {
        self.store()
            .select_by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Domain {} does not exist", id)))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.config.read_only {
            return Err(Error::read_only("Watchlist changes are disabled"));
        }
        Ok(())
    }

    fn ensure_credentials(&self) -> Result<()> {
        if !self.provider().has_credentials() {
            return Err(Error::missing_credentials(format!(
                "{} API key is not configured",
                self.provider().provider_name()
            )));
        }
        Ok(())
    }

    fn ensure_can_check(&self) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_credentials()
    }
}

impl std::fmt::Debug for WatchlistService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchlistService")
            .field("verifier", &self.verifier)
            .field("read_only", &self.config.read_only)
            .finish()
    }
}

/// Normalize user input to a bare lowercase domain name
///
/// Accepts things people paste: `https://Example.com:443/path?q`,
/// `user@example.com`, `example.com.`. A leading `www.` is kept.
pub fn normalize_domain(raw: &str) -> Result<String> {
    let mut name = raw.trim().to_ascii_lowercase();

    if let Some((_, rest)) = name.split_once("://") {
        name = rest.to_string();
    }
    if let Some(end) = name.find(['/', '?', '#']) {
        name.truncate(end);
    }
    if let Some((_, host)) = name.rsplit_once('@') {
        name = host.to_string();
    }
    if let Some((host, _port)) = name.split_once(':') {
        name = host.to_string();
    }
    while name.ends_with('.') {
        name.pop();
    }

    validate_domain(&name)?;
    Ok(name)
}

fn validate_domain(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_input("Domain name is empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid_input(format!(
            "Domain name exceeds {} characters",
            MAX_NAME_LEN
        )));
    }

    let labels: Vec<&str> = name.split('.').collect();
    if labels.len() < 2 {
        return Err(Error::invalid_input(format!(
            "'{}' has no top-level domain",
            name
        )));
    }

    for label in &labels {
        let valid = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid {
            return Err(Error::invalid_input(format!(
                "'{}' is not a valid label in '{}'",
                label, name
            )));
        }
    }

    if labels
        .last()
        .is_some_and(|tld| tld.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(Error::invalid_input(format!(
            "'{}' looks like an IP address, not a domain",
            name
        )));
    }

    Ok(())
}
