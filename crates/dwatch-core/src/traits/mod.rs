//! Core traits for the domain watch system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DomainStore`]: Query contract of the watchlist and settings store
//! - [`LookupProvider`]: Availability, nameserver and SSL checks
//! - [`NotificationChannel`]: Report delivery
//! - [`Clock`]: Injected time source

pub mod clock;
pub mod domain_store;
pub mod lookup_provider;
pub mod notification_channel;

pub use clock::{Clock, FixedClock, SystemClock};
pub use domain_store::{DomainId, DomainRecord, DomainStatus, DomainStore, StatusUpdate};
pub use lookup_provider::{AvailabilityCheck, LookupProvider};
pub use notification_channel::{NotificationChannel, Report, SendOutcome};
