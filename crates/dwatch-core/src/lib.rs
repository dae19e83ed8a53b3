// # dwatch-core
//
// Core library for the domain watch system.
//
// ## Architecture Overview
//
// This library provides the verification and notification engine for a
// watchlist of domain names:
// - **DomainStore**: Query contract of the watchlist and channel settings
// - **LookupProvider**: Trait for the rate-limited WHOIS-like API
// - **NotificationChannel**: Trait for report delivery (chat webhook, email)
// - **MonitorEngine**: Per-tick orchestration: due channels → verify → report
// - **ChannelRegistry**: Registration list of channel implementations
// - **WatchlistService / SettingsService**: Manual operations
//
// ## Design Principles
//
// 1. **Reactive Core**: No timers inside the library; the process calls `run_tick`
// 2. **Injected Dependencies**: Store, provider, channels and clock are passed in
// 3. **Closed Channel Set**: Channel kinds are an enum, registered explicitly
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Partial Failure**: One bad domain or channel never aborts a tick

pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod service;
pub mod settings;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{BatchConfig, ManualSweepConfig, MonitorConfig};
pub use engine::{EngineEvent, MonitorEngine, TickAction, TickReport};
pub use error::{Error, Result};
pub use registry::ChannelRegistry;
pub use service::{SettingsService, WatchlistService};
pub use settings::{ChannelConfig, ChannelKind, ChannelSettings, ConnectionStatus};
pub use state::{FileStore, MemoryStore};
pub use traits::{Clock, DomainStore, LookupProvider, NotificationChannel};
