//! Test doubles and common utilities for contract tests
//!
//! The doubles record what the engine asks of them (call counts, call
//! instants, delivered reports) so tests can assert on behavior without
//! any network access.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dwatch_core::engine::EngineEvent;
use dwatch_core::error::{Error, Result};
use dwatch_core::settings::{ChannelConfig, ChannelKind, ChannelSettings};
use dwatch_core::state::MemoryStore;
use dwatch_core::traits::{
    AvailabilityCheck, DomainId, DomainRecord, DomainStatus, DomainStore, FixedClock,
    LookupProvider, NotificationChannel, Report, SendOutcome, StatusUpdate,
};
use dwatch_core::{ChannelRegistry, MonitorConfig, MonitorEngine};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// How the scripted provider answers for one name
#[derive(Debug, Clone)]
pub enum Answer {
    Available,
    Registered(Option<DateTime<Utc>>),
    RateLimited,
    Panic,
}

/// A lookup provider with per-name scripted answers
///
/// Unscripted names are reported as available.
pub struct ScriptedLookup {
    answers: HashMap<String, Answer>,
    latency: Duration,
    credentials: bool,
    calls: Arc<Mutex<Vec<(String, Instant)>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    ns_calls: Arc<AtomicUsize>,
}

impl ScriptedLookup {
    pub fn new() -> Self {
        Self {
            answers: HashMap::new(),
            latency: Duration::ZERO,
            credentials: true,
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            ns_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn answer(mut self, name: &str, answer: Answer) -> Self {
        self.answers.insert(name.to_string(), answer);
        self
    }

    /// Every call sleeps this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn without_credentials(mut self) -> Self {
        self.credentials = false;
        self
    }

    /// Total availability checks issued
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Names checked, in call order
    pub fn called_names(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of calls started at each distinct instant, in time order
    pub fn call_groups(&self) -> Vec<(Instant, usize)> {
        let calls = self.calls.lock().unwrap();
        let mut groups: Vec<(Instant, usize)> = Vec::new();
        for (_, at) in calls.iter() {
            match groups.iter_mut().find(|(instant, _)| instant == at) {
                Some((_, count)) => *count += 1,
                None => groups.push((*at, 1)),
            }
        }
        groups.sort_by_key(|(instant, _)| *instant);
        groups
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn ns_call_count(&self) -> usize {
        self.ns_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LookupProvider for ScriptedLookup {
    async fn check_availability(&self, name: &str) -> Result<AvailabilityCheck> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), Instant::now()));
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.answers.get(name).cloned().unwrap_or(Answer::Available) {
            Answer::Available => Ok(AvailabilityCheck::available(json!({"domain": name}))),
            Answer::Registered(expires) => Ok(AvailabilityCheck::registered(
                expires,
                json!({"domain": name, "registered": true}),
            )),
            Answer::RateLimited => Err(Error::rate_limited("quota exhausted")),
            Answer::Panic => panic!("scripted provider panic for {}", name),
        }
    }

    async fn check_ns(&self, name: &str) -> Result<Value> {
        self.ns_calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"domain": name, "nameservers": ["ns1.example.net"]}))
    }

    async fn check_ssl(&self, name: &str) -> Result<Value> {
        Ok(json!({"domain": name, "valid": true}))
    }

    fn has_credentials(&self) -> bool {
        self.credentials
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}

/// A channel that records every report it is handed
pub struct RecordingChannel {
    kind: ChannelKind,
    succeed: bool,
    reports: Arc<Mutex<Vec<Report>>>,
}

impl RecordingChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            succeed: true,
            reports: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Report `success: false` for every send
    pub fn failing(kind: ChannelKind) -> Self {
        Self {
            succeed: false,
            ..Self::new(kind)
        }
    }

    pub fn send_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn validate(&self, settings: &ChannelSettings) -> bool {
        settings.config.is_complete()
    }

    async fn send_report(&self, _settings: &ChannelSettings, report: &Report) -> SendOutcome {
        self.reports.lock().unwrap().push(report.clone());
        if self.succeed {
            SendOutcome::sent(format!("{} recorded", self.kind))
        } else {
            SendOutcome::failed("upstream returned 500")
        }
    }
}

/// A channel whose send always panics
pub struct PanickingChannel {
    kind: ChannelKind,
}

impl PanickingChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl NotificationChannel for PanickingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn validate(&self, _settings: &ChannelSettings) -> bool {
        true
    }

    async fn send_report(&self, _settings: &ChannelSettings, _report: &Report) -> SendOutcome {
        panic!("channel exploded");
    }
}

/// A store wrapper counting watchlist reads
#[derive(Clone)]
pub struct CountingStore {
    inner: MemoryStore,
    domain_reads: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            domain_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn domain_reads(&self) -> usize {
        self.domain_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DomainStore for CountingStore {
    async fn select_all(&self) -> Result<Vec<DomainRecord>> {
        self.domain_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.select_all().await
    }

    async fn select_by_id(&self, id: DomainId) -> Result<Option<DomainRecord>> {
        self.domain_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.select_by_id(id).await
    }

    async fn select_where(&self, statuses: &[DomainStatus]) -> Result<Vec<DomainRecord>> {
        self.domain_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.select_where(statuses).await
    }

    async fn insert_if_not_exists(&self, name: &str) -> Result<Option<DomainId>> {
        self.inner.insert_if_not_exists(name).await
    }

    async fn delete_by_id(&self, id: DomainId) -> Result<u64> {
        self.inner.delete_by_id(id).await
    }

    async fn update_status(&self, id: DomainId, update: &StatusUpdate) -> Result<u64> {
        self.inner.update_status(id, update).await
    }

    async fn update_error(&self, id: DomainId, message: &str, at: DateTime<Utc>) -> Result<u64> {
        self.inner.update_error(id, message, at).await
    }

    async fn select_settings(&self, kind: ChannelKind) -> Result<Option<ChannelSettings>> {
        self.inner.select_settings(kind).await
    }

    async fn upsert_settings(
        &self,
        kind: ChannelKind,
        settings: &ChannelSettings,
        enabled: bool,
    ) -> Result<u64> {
        self.inner.upsert_settings(kind, settings, enabled).await
    }
}

/// 2025-06-01 at `hour:minute` UTC
pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, hour, minute, 0).unwrap()
}

pub fn domain(
    id: u64,
    name: &str,
    status: DomainStatus,
    expires: Option<DateTime<Utc>>,
) -> DomainRecord {
    let mut record = DomainRecord::new(DomainId(id), name);
    record.status = status;
    record.expires = expires;
    record
}

pub fn webhook_config() -> ChannelConfig {
    ChannelConfig::ChatWebhook {
        webhook_url: "https://chat.example/hooks/test".to_string(),
        username: None,
    }
}

pub fn email_config() -> ChannelConfig {
    ChannelConfig::TransactionalEmail {
        api_key: "re_test".to_string(),
        from_address: "watch@example.com".to_string(),
        to_address: "ops@example.com".to_string(),
    }
}

pub fn config_for(kind: ChannelKind) -> ChannelConfig {
    match kind {
        ChannelKind::ChatWebhook => webhook_config(),
        ChannelKind::TransactionalEmail => email_config(),
    }
}

/// Save enabled, complete settings firing at `time`
pub async fn enable_channel(store: &dyn DomainStore, kind: ChannelKind, time: &str) {
    let settings = ChannelSettings::new(config_for(kind))
        .with_notification_time(time)
        .with_enabled(true);
    store.upsert_settings(kind, &settings, true).await.unwrap();
}

/// Monitor config without inter-chunk delays
pub fn fast_config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.routine.delay_between_batches_ms = 0;
    config.priority.delay_between_batches_ms = 0;
    config.manual.batch.delay_between_batches_ms = 0;
    config
}

pub fn registry(channels: Vec<Arc<dyn NotificationChannel>>) -> ChannelRegistry {
    let mut registry = ChannelRegistry::new();
    for channel in channels {
        registry.register(channel).unwrap();
    }
    registry
}

pub fn build_engine(
    store: Arc<dyn DomainStore>,
    lookup: Arc<ScriptedLookup>,
    channels: ChannelRegistry,
    now: DateTime<Utc>,
) -> (MonitorEngine, mpsc::Receiver<EngineEvent>) {
    MonitorEngine::new(
        store,
        lookup,
        channels,
        Arc::new(FixedClock::new(now)),
        fast_config(),
    )
    .expect("engine construction succeeds")
}

/// Drain every event currently buffered
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
