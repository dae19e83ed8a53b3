//! Operations for manual and administrative callers
//!
//! - [`WatchlistService`]: watchlist edits, rechecks and inspection
//! - [`SettingsService`]: per-channel settings and test sends

pub mod settings;
pub mod watchlist;

pub use settings::SettingsService;
pub use watchlist::{WatchlistService, normalize_domain};
