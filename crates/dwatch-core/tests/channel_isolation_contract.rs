//! Contract Test: Channel Isolation
//!
//! Verifies that delivery failures stay inside the channel that caused
//! them.
//!
//! Constraints verified:
//! - A panicking channel does not prevent a sibling channel from sending
//! - The aggregate has exactly one error entry per failed channel
//! - `errors` is omitted entirely when every channel succeeded
//! - A channel with incomplete settings is reported, not sent to

mod common;

use common::*;
use dwatch_core::engine::EngineEvent;
use dwatch_core::settings::{ChannelConfig, ChannelKind, ChannelSettings};
use dwatch_core::state::MemoryStore;
use dwatch_core::traits::{DomainStatus, DomainStore, NotificationChannel};
use std::sync::Arc;

async fn store_with_both_channels_due() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .seed(domain(1, "gone.com", DomainStatus::Available, None))
        .await;
    enable_channel(&store, ChannelKind::ChatWebhook, "09:00").await;
    enable_channel(&store, ChannelKind::TransactionalEmail, "09:00").await;
    store
}

#[tokio::test]
async fn panicking_channel_does_not_block_sibling() {
    let store = store_with_both_channels_due().await;
    let email = Arc::new(RecordingChannel::new(ChannelKind::TransactionalEmail));
    let (engine, mut events) = build_engine(
        Arc::new(store),
        Arc::new(ScriptedLookup::new()),
        registry(vec![
            Arc::new(PanickingChannel::new(ChannelKind::ChatWebhook)) as Arc<dyn NotificationChannel>,
            email.clone() as Arc<dyn NotificationChannel>,
        ]),
        at(9, 0),
    );

    let report = engine.run_tick(false).await.expect("tick survives a panicking channel");
    let notifications = report.notifications.unwrap();

    assert_eq!(email.send_count(), 1);
    assert_eq!(notifications.sent, 1);
    assert_eq!(notifications.providers, vec!["email".to_string()]);

    let errors = notifications.errors.expect("failure is reported");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].channel, "webhook");
    assert!(errors[0].error.contains("aborted"));

    let events = drain_events(&mut events);
    assert!(events.contains(&EngineEvent::ReportSent {
        channel: ChannelKind::TransactionalEmail
    }));
    assert!(events.iter().any(|event| matches!(
        event,
        EngineEvent::ReportFailed {
            channel: ChannelKind::ChatWebhook,
            ..
        }
    )));
}

#[tokio::test]
async fn unsuccessful_send_becomes_error_entry() {
    let store = store_with_both_channels_due().await;
    let webhook = Arc::new(RecordingChannel::failing(ChannelKind::ChatWebhook));
    let email = Arc::new(RecordingChannel::new(ChannelKind::TransactionalEmail));
    let (engine, _events) = build_engine(
        Arc::new(store),
        Arc::new(ScriptedLookup::new()),
        registry(vec![
            webhook.clone() as Arc<dyn NotificationChannel>,
            email.clone() as Arc<dyn NotificationChannel>,
        ]),
        at(9, 0),
    );

    let notifications = engine.run_tick(false).await.unwrap().notifications.unwrap();

    assert_eq!(webhook.send_count(), 1);
    assert_eq!(notifications.sent, 1);
    let errors = notifications.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].channel, "webhook");
    assert_eq!(errors[0].error, "upstream returned 500");
}

#[tokio::test]
async fn errors_key_absent_when_all_channels_succeed() {
    let store = store_with_both_channels_due().await;
    let (engine, _events) = build_engine(
        Arc::new(store),
        Arc::new(ScriptedLookup::new()),
        registry(vec![
            Arc::new(RecordingChannel::new(ChannelKind::ChatWebhook)) as Arc<dyn NotificationChannel>,
            Arc::new(RecordingChannel::new(ChannelKind::TransactionalEmail)) as Arc<dyn NotificationChannel>,
        ]),
        at(9, 0),
    );

    let report = engine.run_tick(false).await.unwrap();
    let notifications = report.notifications.as_ref().unwrap();
    assert_eq!(notifications.sent, 2);
    assert!(notifications.errors.is_none());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["notifications"]["sent"], 2);
    assert!(
        json["notifications"].get("errors").is_none(),
        "errors must be omitted, not empty"
    );
}

#[tokio::test]
async fn incomplete_settings_are_reported_not_sent() {
    let store = MemoryStore::new();
    // Enabled but without a webhook URL, e.g. edited outside the settings service
    let broken = ChannelSettings::new(ChannelConfig::ChatWebhook {
        webhook_url: String::new(),
        username: None,
    })
    .with_notification_time("09:00");
    store
        .upsert_settings(ChannelKind::ChatWebhook, &broken, true)
        .await
        .unwrap();

    let webhook = Arc::new(RecordingChannel::new(ChannelKind::ChatWebhook));
    let (engine, _events) = build_engine(
        Arc::new(store),
        Arc::new(ScriptedLookup::new()),
        registry(vec![webhook.clone() as Arc<dyn NotificationChannel>]),
        at(9, 0),
    );

    let notifications = engine.run_tick(false).await.unwrap().notifications.unwrap();

    assert_eq!(webhook.send_count(), 0);
    assert_eq!(notifications.sent, 0);
    assert!(notifications.providers.is_empty());
    let errors = notifications.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].error.starts_with("skipped"));
}
