// # dwatchd - Domain Watch Daemon
//
// The dwatchd daemon is a thin integration layer over dwatch-core. It is
// responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the store, lookup provider and notification channels
// 4. Driving `MonitorEngine::run_tick` once per wall-clock minute
//
// The engine decides whether a tick does any work; the daemon only keeps
// time and logs the outcome.
//
// ## Configuration
//
// ### Store
// - `DWATCH_STORE_PATH`: Path to the JSON store file (in-memory when unset)
//
// ### Lookup Provider
// - `DWATCH_WHOISJSON_API_KEY`: API key (lookups are refused when unset)
//
// ### Watchlist
// - `DWATCH_DOMAINS`: Comma-separated domains added at startup
// - `DWATCH_EXPIRING_WINDOW_DAYS`: Size of the "expiring soon" window
// - `DWATCH_READ_ONLY`: Reject every mutating operation (true/false)
//
// ### Batching
// - `DWATCH_ROUTINE_BATCH_SIZE`, `DWATCH_ROUTINE_DELAY_MS`
// - `DWATCH_PRIORITY_BATCH_SIZE`, `DWATCH_PRIORITY_DELAY_MS`
// - `DWATCH_MANUAL_MAX_DOMAINS`
//
// ### Channels (optional, saved to the store at startup)
// - `DWATCH_WEBHOOK_URL`, `DWATCH_WEBHOOK_TIME`
// - `DWATCH_EMAIL_API_KEY`, `DWATCH_EMAIL_FROM`, `DWATCH_EMAIL_TO`, `DWATCH_EMAIL_TIME`
//
// ### Process
// - `DWATCH_LOG_LEVEL`: trace, debug, info, warn, error
// - `DWATCH_RUN_ONCE`: Run a single tick and exit
// - `DWATCH_FORCE`: With `DWATCH_RUN_ONCE`, ignore channel times of day
//
// ## Example
//
// ```bash
// export DWATCH_STORE_PATH=/var/lib/dwatch/store.json
// export DWATCH_WHOISJSON_API_KEY=your_key
// export DWATCH_DOMAINS=example.com,example.org
// export DWATCH_WEBHOOK_URL=https://discord.com/api/webhooks/...
// export DWATCH_WEBHOOK_TIME=09:00
//
// dwatchd
// ```

use anyhow::{Context, Result};
use dwatch_core::settings::{ChannelConfig, ChannelKind};
use dwatch_core::traits::{Clock, DomainStore, LookupProvider, SystemClock};
use dwatch_core::{
    ChannelRegistry, EngineEvent, FileStore, MemoryStore, MonitorConfig, MonitorEngine,
    SettingsService, TickReport, WatchlistService,
};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DwatchExitCode> for ExitCode {
    fn from(code: DwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Chat webhook settings supplied through the environment
struct WebhookEnv {
    url: String,
    time: String,
}

/// Email settings supplied through the environment
struct EmailEnv {
    api_key: String,
    from: String,
    to: String,
    time: String,
}

/// Application configuration
struct Config {
    store_path: Option<String>,
    whoisjson_api_key: String,
    domains: Vec<String>,
    monitor: MonitorConfig,
    webhook: Option<WebhookEnv>,
    email: Option<EmailEnv>,
    log_level: String,
    run_once: bool,
    force: bool,
}

// Custom Debug implementation that hides secrets
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("store_path", &self.store_path)
            .field("whoisjson_api_key", &"<REDACTED>")
            .field("domains", &self.domains.len())
            .field("monitor", &self.monitor)
            .field("webhook", &self.webhook.is_some())
            .field("email", &self.email.is_some())
            .field("log_level", &self.log_level)
            .field("run_once", &self.run_once)
            .field("force", &self.force)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut monitor = MonitorConfig::new();
        if let Some(size) = parse_var(&var, "DWATCH_ROUTINE_BATCH_SIZE")? {
            monitor.routine.batch_size = size;
            monitor.manual.batch.batch_size = size;
        }
        if let Some(delay) = parse_var(&var, "DWATCH_ROUTINE_DELAY_MS")? {
            monitor.routine.delay_between_batches_ms = delay;
            monitor.manual.batch.delay_between_batches_ms = delay;
        }
        if let Some(size) = parse_var(&var, "DWATCH_PRIORITY_BATCH_SIZE")? {
            monitor.priority.batch_size = size;
        }
        if let Some(delay) = parse_var(&var, "DWATCH_PRIORITY_DELAY_MS")? {
            monitor.priority.delay_between_batches_ms = delay;
        }
        if let Some(max) = parse_var(&var, "DWATCH_MANUAL_MAX_DOMAINS")? {
            monitor.manual.max_domains = max;
        }
        if let Some(days) = parse_var(&var, "DWATCH_EXPIRING_WINDOW_DAYS")? {
            monitor.expiring_window_days = days;
        }
        monitor.read_only = parse_bool(&var, "DWATCH_READ_ONLY")?;

        let webhook = non_empty("DWATCH_WEBHOOK_URL").map(|url| WebhookEnv {
            url,
            time: non_empty("DWATCH_WEBHOOK_TIME").unwrap_or_else(|| "09:00".to_string()),
        });

        let email = non_empty("DWATCH_EMAIL_API_KEY").map(|api_key| EmailEnv {
            api_key,
            from: non_empty("DWATCH_EMAIL_FROM").unwrap_or_default(),
            to: non_empty("DWATCH_EMAIL_TO").unwrap_or_default(),
            time: non_empty("DWATCH_EMAIL_TIME").unwrap_or_else(|| "09:00".to_string()),
        });

        Ok(Self {
            store_path: non_empty("DWATCH_STORE_PATH"),
            whoisjson_api_key: non_empty("DWATCH_WHOISJSON_API_KEY").unwrap_or_default(),
            domains: var("DWATCH_DOMAINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            monitor,
            webhook,
            email,
            log_level: non_empty("DWATCH_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            run_once: parse_bool(&var, "DWATCH_RUN_ONCE")?,
            force: parse_bool(&var, "DWATCH_FORCE")?,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.monitor
            .validate()
            .map_err(|e| anyhow::anyhow!("Monitor configuration is invalid: {}", e))?;

        if let Some(ref path) = self.store_path
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "DWATCH_STORE_PATH parent directory does not exist: {}. \
                Create it first: mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        for domain in &self.domains {
            dwatch_core::service::normalize_domain(domain)
                .map_err(|e| anyhow::anyhow!("DWATCH_DOMAINS entry '{}' is invalid: {}", domain, e))?;
        }

        if let Some(ref webhook) = self.webhook
            && !webhook.url.starts_with("https://")
        {
            anyhow::bail!("DWATCH_WEBHOOK_URL must use the HTTPS scheme");
        }

        if let Some(ref email) = self.email
            && (email.from.is_empty() || email.to.is_empty())
        {
            anyhow::bail!(
                "DWATCH_EMAIL_FROM and DWATCH_EMAIL_TO are required when DWATCH_EMAIL_API_KEY is set"
            );
        }

        if self.force && !self.run_once {
            anyhow::bail!("DWATCH_FORCE only applies together with DWATCH_RUN_ONCE");
        }

        parse_level(&self.log_level)?;

        Ok(())
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(None),
    }
}

fn parse_bool(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    match var(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => anyhow::bail!("{} must be true or false. Got: {}", key, other),
    }
}

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "DWATCH_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DwatchExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DwatchExitCode::ConfigError.into();
    }

    let log_level = parse_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DwatchExitCode::ConfigError.into();
    }

    info!("Starting dwatchd daemon");
    debug!("Configuration: {:?}", config);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DwatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let daemon = match Daemon::build(config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup error: {:#}", e);
                return DwatchExitCode::ConfigError;
            }
        };

        if let Err(e) = daemon.run().await {
            error!("Daemon error: {:#}", e);
            DwatchExitCode::RuntimeError
        } else {
            DwatchExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Wired-up components of a running daemon
struct Daemon {
    engine: MonitorEngine,
    events: mpsc::Receiver<EngineEvent>,
    run_once: bool,
    force: bool,
}

impl Daemon {
    /// Build every component and apply the startup bootstrap
    async fn build(config: Config) -> Result<Self> {
        let store: Arc<dyn DomainStore> = match config.store_path {
            Some(ref path) => {
                info!("Using file store at {}", path);
                Arc::new(
                    FileStore::new(path)
                        .await
                        .with_context(|| format!("Failed to open store at {}", path))?,
                )
            }
            None => {
                warn!("DWATCH_STORE_PATH not set, using in-memory store (nothing persists)");
                Arc::new(MemoryStore::new())
            }
        };

        let provider = build_provider(&config)?;
        if !provider.has_credentials() {
            warn!("No lookup credentials configured, verification will be refused");
        }

        let channels = build_channels()?;
        info!("Registered channels: {:?}", channels.kinds());

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        if config.monitor.read_only {
            if !config.domains.is_empty() || config.webhook.is_some() || config.email.is_some() {
                warn!("Read-only mode: ignoring startup domains and channel settings");
            }
        } else {
            let watchlist = WatchlistService::new(
                Arc::clone(&store),
                Arc::clone(&provider),
                Arc::clone(&clock),
                config.monitor.clone(),
            )?;
            seed_domains(&watchlist, &config.domains).await?;

            let settings = SettingsService::new(
                Arc::clone(&store),
                channels.clone(),
                Arc::clone(&clock),
                false,
            );
            apply_channel_env(&settings, &channels, &config).await?;
        }

        let (engine, events) =
            MonitorEngine::new(store, provider, channels, clock, config.monitor)?;

        Ok(Self {
            engine,
            events,
            run_once: config.run_once,
            force: config.force,
        })
    }

    async fn run(self) -> Result<()> {
        let Self {
            engine,
            events,
            run_once,
            force,
        } = self;

        let event_logger = tokio::spawn(log_events(events));

        let result = if run_once {
            info!("Running a single tick (force: {})", force);
            let report = engine.run_tick(force).await?;
            log_tick_report(&report);
            Ok(())
        } else {
            tick_loop(&engine).await
        };

        // Dropping the engine closes the event channel
        drop(engine);
        if let Err(e) = event_logger.await {
            warn!("Event logger ended abnormally: {}", e);
        }

        result
    }
}

#[cfg(feature = "whoisjson")]
fn build_provider(config: &Config) -> Result<Arc<dyn LookupProvider>> {
    info!("Using WhoisJSON lookup provider");
    Ok(Arc::new(dwatch_lookup_whoisjson::WhoisJsonProvider::new(
        config.whoisjson_api_key.clone(),
    )?))
}

#[cfg(not(feature = "whoisjson"))]
fn build_provider(_config: &Config) -> Result<Arc<dyn LookupProvider>> {
    anyhow::bail!("No lookup provider compiled in. Rebuild with the `whoisjson` feature")
}

fn build_channels() -> Result<ChannelRegistry> {
    #[allow(unused_mut)]
    let mut registry = ChannelRegistry::new();

    #[cfg(feature = "webhook")]
    {
        info!("Registering chat webhook channel");
        dwatch_notify_webhook::register(&mut registry)?;
    }

    #[cfg(feature = "email")]
    {
        info!("Registering transactional email channel");
        dwatch_notify_email::register(&mut registry)?;
    }

    if registry.is_empty() {
        warn!("No notification channels compiled in, ticks will always be skipped");
    }

    Ok(registry)
}

async fn seed_domains(watchlist: &WatchlistService, domains: &[String]) -> Result<()> {
    for raw in domains {
        match watchlist.add_domain(raw).await? {
            Some(record) => info!("Added {} to the watchlist", record.name),
            None => debug!("{} is already on the watchlist", raw),
        }
    }
    Ok(())
}

async fn apply_channel_env(
    settings: &SettingsService,
    channels: &ChannelRegistry,
    config: &Config,
) -> Result<()> {
    if let Some(ref webhook) = config.webhook {
        if channels.has_channel(ChannelKind::ChatWebhook) {
            let config = ChannelConfig::ChatWebhook {
                webhook_url: webhook.url.clone(),
                username: None,
            };
            settings.save(config, &webhook.time, true).await?;
        } else {
            warn!("DWATCH_WEBHOOK_URL set but the webhook channel is not compiled in");
        }
    }

    if let Some(ref email) = config.email {
        if channels.has_channel(ChannelKind::TransactionalEmail) {
            let config = ChannelConfig::TransactionalEmail {
                api_key: email.api_key.clone(),
                from_address: email.from.clone(),
                to_address: email.to.clone(),
            };
            settings.save(config, &email.time, true).await?;
        } else {
            warn!("DWATCH_EMAIL_API_KEY set but the email channel is not compiled in");
        }
    }

    Ok(())
}

/// Tick once per wall-clock minute until a shutdown signal arrives
///
/// A tick that is already running completes before the signal is handled.
async fn tick_loop(engine: &MonitorEngine) -> Result<()> {
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    info!("Daemon initialized, ticking every minute");

    loop {
        tokio::select! {
            received = &mut shutdown => {
                info!("Received shutdown signal: {}", received?);
                info!("Shutting down daemon");
                return Ok(());
            }
            _ = tokio::time::sleep(until_next_minute()) => {
                match engine.run_tick(false).await {
                    Ok(report) => log_tick_report(&report),
                    // A store failure fails this tick only; the next minute retries
                    Err(e) => error!("Tick failed: {}", e),
                }
            }
        }
    }
}

/// Time left until the next minute boundary
fn until_next_minute() -> Duration {
    let now = chrono::Utc::now();
    let into_minute = now.timestamp().rem_euclid(60) as u64 * 1000
        + u64::from(now.timestamp_subsec_millis());
    Duration::from_millis(60_000 - into_minute.min(59_999))
}

fn log_tick_report(report: &TickReport) {
    let rendered = serde_json::to_string(report).unwrap_or_else(|_| format!("{:?}", report));
    match report.notifications {
        Some(ref summary) if summary.errors.is_some() => warn!("Tick finished: {}", rendered),
        Some(_) => info!("Tick finished: {}", rendered),
        None => debug!("Tick finished: {}", rendered),
    }
}

async fn log_events(mut events: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::TickSkipped { .. } => {}
            EngineEvent::VerificationCompleted {
                checked,
                available,
                expired,
                errors,
            } => info!(
                "Verification completed: {} checked, {} available, {} expired, {} errors",
                checked, available, expired, errors
            ),
            EngineEvent::ReportSent { channel } => info!("Report sent via {}", channel),
            EngineEvent::ReportFailed { channel, error } => {
                warn!("Report via {} failed: {}", channel, error)
            }
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert!(config.store_path.is_none());
        assert!(config.domains.is_empty());
        assert_eq!(config.log_level, "info");
        assert!(!config.run_once);
        assert!(!config.monitor.read_only);
        config.validate().unwrap();
    }

    #[test]
    fn test_batching_overrides() {
        let config = config_from(&[
            ("DWATCH_ROUTINE_BATCH_SIZE", "8"),
            ("DWATCH_ROUTINE_DELAY_MS", "250"),
            ("DWATCH_PRIORITY_BATCH_SIZE", "2"),
            ("DWATCH_MANUAL_MAX_DOMAINS", "40"),
            ("DWATCH_EXPIRING_WINDOW_DAYS", "14"),
        ])
        .unwrap();

        assert_eq!(config.monitor.routine.batch_size, 8);
        assert_eq!(config.monitor.manual.batch.delay_between_batches_ms, 250);
        assert_eq!(config.monitor.priority.batch_size, 2);
        assert_eq!(config.monitor.manual.max_domains, 40);
        assert_eq!(config.monitor.expiring_window_days, 14);
    }

    #[test]
    fn test_unparsable_values_are_errors() {
        assert!(config_from(&[("DWATCH_ROUTINE_BATCH_SIZE", "many")]).is_err());
        assert!(config_from(&[("DWATCH_READ_ONLY", "maybe")]).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let zero_batch = config_from(&[("DWATCH_PRIORITY_BATCH_SIZE", "0")]).unwrap();
        assert!(zero_batch.validate().is_err());

        let bad_domain = config_from(&[("DWATCH_DOMAINS", "example.com,not a domain")]).unwrap();
        assert!(bad_domain.validate().is_err());

        let http_hook = config_from(&[("DWATCH_WEBHOOK_URL", "http://hooks.local/x")]).unwrap();
        assert!(http_hook.validate().is_err());

        let half_email = config_from(&[("DWATCH_EMAIL_API_KEY", "re_123")]).unwrap();
        assert!(half_email.validate().is_err());

        let stray_force = config_from(&[("DWATCH_FORCE", "true")]).unwrap();
        assert!(stray_force.validate().is_err());

        let bad_level = config_from(&[("DWATCH_LOG_LEVEL", "loud")]).unwrap();
        assert!(bad_level.validate().is_err());
    }

    #[test]
    fn test_channel_env() {
        let config = config_from(&[
            ("DWATCH_DOMAINS", " example.com , ,example.org"),
            ("DWATCH_WEBHOOK_URL", "https://discord.com/api/webhooks/1/abc"),
            ("DWATCH_EMAIL_API_KEY", "re_123"),
            ("DWATCH_EMAIL_FROM", "watch@example.com"),
            ("DWATCH_EMAIL_TO", "ops@example.com"),
            ("DWATCH_EMAIL_TIME", "18:30"),
        ])
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.domains, vec!["example.com", "example.org"]);
        assert_eq!(config.webhook.as_ref().unwrap().time, "09:00");
        assert_eq!(config.email.as_ref().unwrap().time, "18:30");

        let debug = format!("{:?}", config);
        assert!(!debug.contains("re_123"));
    }

    #[test]
    fn test_until_next_minute_is_bounded() {
        let wait = until_next_minute();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_run_once_with_memory_store() {
        let config = config_from(&[
            ("DWATCH_DOMAINS", "example.com"),
            ("DWATCH_RUN_ONCE", "true"),
        ])
        .unwrap();

        // No channel is enabled, so the tick is skipped without lookups
        let daemon = Daemon::build(config).await.unwrap();
        daemon.run().await.unwrap();
    }
}
