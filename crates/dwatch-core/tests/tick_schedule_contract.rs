//! Contract Test: Tick Scheduling
//!
//! Verifies that a tick only does work when a channel is due.
//!
//! Constraints verified:
//! - No due channel → `skipped`, zero provider calls, zero watchlist reads
//! - Disabled channels never fire, even when forced
//! - `force` bypasses the time-of-day gate
//! - A due channel receives a report even when there is nothing to report
//! - A due tick without provider credentials fails before reading or writing the watchlist
//!
//! If this test fails, someone has made the tick call the lookup provider
//! just because the timer fired, which burns the provider's rate limit.

mod common;

use common::*;
use dwatch_core::engine::{EngineEvent, TickAction};
use dwatch_core::settings::{ChannelKind, ChannelSettings};
use dwatch_core::state::MemoryStore;
use dwatch_core::traits::{DomainStatus, DomainStore, NotificationChannel};
use std::sync::Arc;

#[tokio::test]
async fn no_due_channel_skips_without_provider_calls() {
    let memory = MemoryStore::new();
    memory
        .seed(domain(1, "a.com", DomainStatus::NotChecked, None))
        .await;
    enable_channel(&memory, ChannelKind::ChatWebhook, "09:00").await;
    let store = CountingStore::new(memory);

    let lookup = Arc::new(ScriptedLookup::new());
    let channel = Arc::new(RecordingChannel::new(ChannelKind::ChatWebhook));
    let (engine, mut events) = build_engine(
        Arc::new(store.clone()),
        Arc::clone(&lookup),
        registry(vec![channel.clone() as Arc<dyn NotificationChannel>]),
        at(10, 15),
    );

    let report = engine.run_tick(false).await.unwrap();

    assert_eq!(report.action, TickAction::Skipped);
    assert_eq!(report.timestamp, at(10, 15));
    assert!(report.domains.is_none());
    assert!(report.notifications.is_none());
    assert_eq!(lookup.call_count(), 0, "provider must not be called");
    assert_eq!(store.domain_reads(), 0, "watchlist must not be read");
    assert_eq!(channel.send_count(), 0);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["action"], "skipped");
    assert!(json.get("domains").is_none());

    assert!(matches!(
        drain_events(&mut events).as_slice(),
        [EngineEvent::TickSkipped { .. }]
    ));
}

#[tokio::test]
async fn matching_time_fires_channel() {
    let store = MemoryStore::new();
    enable_channel(&store, ChannelKind::ChatWebhook, "09:00").await;

    let lookup = Arc::new(ScriptedLookup::new());
    let channel = Arc::new(RecordingChannel::new(ChannelKind::ChatWebhook));
    let (engine, _events) = build_engine(
        Arc::new(store),
        lookup,
        registry(vec![channel.clone() as Arc<dyn NotificationChannel>]),
        at(9, 0),
    );

    let report = engine.run_tick(false).await.unwrap();
    assert_eq!(report.action, TickAction::Executed);
    assert_eq!(channel.send_count(), 1);
}

#[tokio::test]
async fn local_time_zone_decides_due() {
    let store = MemoryStore::new();
    enable_channel(&store, ChannelKind::ChatWebhook, "09:00").await;

    let channel = Arc::new(RecordingChannel::new(ChannelKind::ChatWebhook));
    // 07:00 UTC is 09:00 at UTC+2
    let clock = dwatch_core::traits::FixedClock::new(at(7, 0)).with_offset_secs(2 * 3600);
    let (engine, _events) = dwatch_core::MonitorEngine::new(
        Arc::new(store),
        Arc::new(ScriptedLookup::new()),
        registry(vec![channel.clone() as Arc<dyn NotificationChannel>]),
        Arc::new(clock),
        fast_config(),
    )
    .unwrap();

    let report = engine.run_tick(false).await.unwrap();
    assert_eq!(report.action, TickAction::Executed);
    assert_eq!(channel.send_count(), 1);
}

#[tokio::test]
async fn force_bypasses_time_but_not_enabled_flag() {
    let store = MemoryStore::new();
    enable_channel(&store, ChannelKind::ChatWebhook, "09:00").await;
    let disabled = ChannelSettings::new(email_config()).with_notification_time("10:15");
    store
        .upsert_settings(ChannelKind::TransactionalEmail, &disabled, false)
        .await
        .unwrap();

    let webhook = Arc::new(RecordingChannel::new(ChannelKind::ChatWebhook));
    let email = Arc::new(RecordingChannel::new(ChannelKind::TransactionalEmail));
    let (engine, _events) = build_engine(
        Arc::new(store),
        Arc::new(ScriptedLookup::new()),
        registry(vec![
            webhook.clone() as Arc<dyn NotificationChannel>,
            email.clone() as Arc<dyn NotificationChannel>,
        ]),
        at(10, 15),
    );

    let report = engine.run_tick(true).await.unwrap();

    assert_eq!(report.action, TickAction::Executed);
    assert_eq!(webhook.send_count(), 1);
    assert_eq!(email.send_count(), 0, "disabled channel must not fire");
    let notifications = report.notifications.unwrap();
    assert_eq!(notifications.providers, vec!["webhook".to_string()]);
}

#[tokio::test]
async fn unsaved_settings_never_fire() {
    let channel = Arc::new(RecordingChannel::new(ChannelKind::ChatWebhook));
    let lookup = Arc::new(ScriptedLookup::new());
    let (engine, _events) = build_engine(
        Arc::new(MemoryStore::new()),
        Arc::clone(&lookup),
        registry(vec![channel.clone() as Arc<dyn NotificationChannel>]),
        at(9, 0),
    );

    let report = engine.run_tick(true).await.unwrap();
    assert_eq!(report.action, TickAction::Skipped);
    assert_eq!(lookup.call_count(), 0);
}

#[tokio::test]
async fn all_clear_report_is_still_sent_once() {
    let store = MemoryStore::new();
    let far_future = at(9, 0) + chrono::Duration::days(400);
    store
        .seed(domain(1, "stable.com", DomainStatus::Registered, Some(far_future)))
        .await;
    enable_channel(&store, ChannelKind::ChatWebhook, "09:00").await;

    let lookup = Arc::new(ScriptedLookup::new());
    let channel = Arc::new(RecordingChannel::new(ChannelKind::ChatWebhook));
    let (engine, _events) = build_engine(
        Arc::new(store),
        Arc::clone(&lookup),
        registry(vec![channel.clone() as Arc<dyn NotificationChannel>]),
        at(9, 0),
    );

    let report = engine.run_tick(false).await.unwrap();

    // Registered and outside the window: nothing to verify, nothing to report
    assert_eq!(lookup.call_count(), 0);
    let domains = report.domains.unwrap();
    assert_eq!(
        (domains.checked, domains.available, domains.expiring, domains.expired),
        (0, 0, 0, 0)
    );

    assert_eq!(channel.send_count(), 1);
    let delivered = &channel.reports()[0];
    assert!(delivered.is_all_clear());
    assert_eq!(delivered.total_count, 0);
}

#[tokio::test]
async fn due_tick_without_credentials_leaves_watchlist_untouched() {
    let memory = MemoryStore::new();
    memory
        .seed(domain(1, "a.com", DomainStatus::NotChecked, None))
        .await;
    enable_channel(&memory, ChannelKind::ChatWebhook, "09:00").await;
    let store = CountingStore::new(memory.clone());

    let lookup = Arc::new(ScriptedLookup::new().without_credentials());
    let channel = Arc::new(RecordingChannel::new(ChannelKind::ChatWebhook));
    let (engine, _events) = build_engine(
        Arc::new(store.clone()),
        Arc::clone(&lookup),
        registry(vec![channel.clone() as Arc<dyn NotificationChannel>]),
        at(9, 0),
    );

    let result = engine.run_tick(false).await;

    assert!(matches!(
        result,
        Err(dwatch_core::Error::MissingCredentials(_))
    ));
    assert_eq!(lookup.call_count(), 0, "provider must not be called");
    assert_eq!(store.domain_reads(), 0, "watchlist must not be read");
    assert_eq!(channel.send_count(), 0);

    let record = memory
        .select_by_id(dwatch_core::traits::DomainId(1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, DomainStatus::NotChecked);
    assert!(record.last_checked.is_none());
    assert!(record.error_message.is_none());
}
