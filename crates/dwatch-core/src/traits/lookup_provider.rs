// # Lookup Provider Trait
//
// Defines the interface to the rate-limited third-party WHOIS-like API.
//
// ## Implementations
//
// - WhoisJSON: `dwatch-lookup-whoisjson` crate
//
// ## Responsibilities
//
// A provider performs exactly one upstream check per call and returns a
// classified result or a classified error (network, auth, rate-limit,
// validation, server). It owns its request timeout: the engine treats a
// call that never returns as still running, so a provider must surface a
// bounded-time failure instead of hanging. Batching and spacing of calls
// are owned by the verification engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::traits::domain_store::DomainStatus;

/// Result of an availability check
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityCheck {
    /// `Available` or `Registered`
    pub status: DomainStatus,
    /// Registration expiry, when the registry reports one
    pub expires: Option<DateTime<Utc>>,
    /// Provider payload, persisted as the domain's raw data
    pub raw: serde_json::Value,
}

impl AvailabilityCheck {
    /// A domain that is free to register
    pub fn available(raw: serde_json::Value) -> Self {
        Self {
            status: DomainStatus::Available,
            expires: None,
            raw,
        }
    }

    /// A registered domain with an optional expiry
    pub fn registered(expires: Option<DateTime<Utc>>, raw: serde_json::Value) -> Self {
        Self {
            status: DomainStatus::Registered,
            expires,
            raw,
        }
    }
}

/// Trait for lookup provider implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe; up to `batch_size` calls run
/// concurrently.
///
/// # Errors
///
/// Failures are returned as the provider variants of [`crate::Error`]
/// (`Network`, `Authentication`, `RateLimited`, `Validation`, `NotFound`,
/// `Server`), each carrying an HTTP-status-like code via
/// [`crate::Error::status_code`].
#[async_trait]
pub trait LookupProvider: Send + Sync {
    /// Check registration availability and expiry of `name`
    async fn check_availability(&self, name: &str) -> Result<AvailabilityCheck, crate::Error>;

    /// Fetch nameserver data for `name`
    async fn check_ns(&self, name: &str) -> Result<serde_json::Value, crate::Error>;

    /// Fetch certificate data for `name`
    async fn check_ssl(&self, name: &str) -> Result<serde_json::Value, crate::Error>;

    /// Whether API credentials are configured
    ///
    /// Manual operations are rejected up front when this is false.
    fn has_credentials(&self) -> bool {
        true
    }

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}
