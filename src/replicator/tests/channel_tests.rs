//! Tests for the async sync-channel driver.

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;

use super::CHANNEL;
use crate::{
    message::Role,
    port::PortError,
    replicator::{
        ApplyMode,
        ChannelContext,
        ChannelState,
        LocalOutcome,
        RejectedUpdate,
        ReplicationConfig,
        SourceId,
        SyncChannel,
        SyncError,
        SyncUpdate,
    },
    retry::RetryPolicy,
    test_helpers::{ManualClock, RecordingPort, RecordingSurface},
};

const NOW: u64 = 1_700_000_000_000;

struct Peer {
    port: Arc<RecordingPort>,
    surface: Arc<RecordingSurface>,
    channel: SyncChannel,
}

fn peer(source: &str, role: Role) -> Peer {
    let port = Arc::new(RecordingPort::default());
    let surface = Arc::new(RecordingSurface::default());
    let context = ChannelContext {
        port: port.clone(),
        clock: Arc::new(ManualClock::new(NOW)),
        role,
        replication: ReplicationConfig::default(),
        retry: RetryPolicy::default(),
    };
    let channel = SyncChannel::new(CHANNEL, surface.clone(), SourceId::new(source), &context);
    Peer {
        port,
        surface,
        channel,
    }
}

fn sent_updates(port: &RecordingPort) -> Vec<SyncUpdate> {
    port.payloads_of("catalog-scroll-sync")
        .iter()
        .map(|payload| serde_json::from_str(payload).expect("sync update"))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn local_change_is_published_on_the_sync_type() {
    let agent = peer("agent-1", Role::Agent);
    agent.surface.scroll_to(0.3);

    let outcome = agent.channel.local_changed().await.expect("send");
    assert_eq!(outcome, LocalOutcome::Sent);

    let raw = agent.port.payloads_of("catalog-scroll-sync");
    assert_eq!(raw.len(), 1);
    let json: serde_json::Value = serde_json::from_str(&raw[0]).expect("json");
    for key in [
        "containerId",
        "percentY",
        "percentX",
        "pxY",
        "pxX",
        "scrollHeight",
        "clientHeight",
        "velocity",
        "sourceId",
        "userType",
        "ts",
    ] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
    assert_eq!(json["userType"], "agent");
    assert_eq!(json["sourceId"], "agent-1");
    assert_eq!(agent.channel.state(), ChannelState::Active);
}

#[tokio::test(start_paused = true)]
async fn trailing_flush_sends_the_resting_position() {
    let agent = peer("agent-1", Role::Agent);
    agent.surface.scroll_to(0.1);
    agent.channel.local_changed().await.expect("send");

    agent.surface.scroll_to(0.1004);
    assert_eq!(
        agent.channel.local_changed().await.expect("defer"),
        LocalOutcome::Deferred
    );
    assert_eq!(sent_updates(&agent.port).len(), 1);

    sleep(Duration::from_millis(150)).await;
    let updates = sent_updates(&agent.port);
    assert_eq!(updates.len(), 2);
    assert!((updates[1].percent_y - 0.1004).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_mark_the_channel_failed_until_next_success() {
    let agent = peer("agent-1", Role::Agent);
    for _ in 0..3 {
        agent.port.fail_next(PortError::Rejected("rate limited".into()));
    }
    agent.surface.scroll_to(0.5);

    let err = agent.channel.local_changed().await.expect_err("all attempts fail");
    assert_eq!(
        err,
        SyncError::SendFailure {
            channel: CHANNEL.into(),
            attempts: 3,
            source: PortError::Rejected("rate limited".into()),
        }
    );
    assert!(matches!(agent.channel.state(), ChannelState::Error { attempts: 3, .. }));

    sleep(Duration::from_millis(200)).await;
    agent.surface.scroll_to(0.6);
    agent.channel.local_changed().await.expect("recovers");
    assert_eq!(agent.channel.state(), ChannelState::Active);
}

#[tokio::test(start_paused = true)]
async fn remote_update_moves_the_surface() {
    let agent = peer("agent-1", Role::Agent);
    let customer = peer("customer-1", Role::Customer);

    customer.surface.scroll_to(0.42);
    customer.channel.local_changed().await.expect("send");
    let update = sent_updates(&customer.port).remove(0);

    let plan = agent.channel.handle_remote(&update).expect("applies");
    assert_eq!(plan.mode, ApplyMode::Immediate);
    let applied = agent.surface.applied();
    assert_eq!(applied.len(), 1);
    assert!((applied[0].0.percent_y - 0.42).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn applied_remote_update_is_not_replicated_back() {
    let agent = peer("agent-1", Role::Agent);
    let customer = peer("customer-1", Role::Customer);

    customer.surface.scroll_to(0.2);
    customer.channel.local_changed().await.expect("send");
    let update = sent_updates(&customer.port).remove(0);
    agent.channel.handle_remote(&update).expect("applies");

    // The agent's view reports the programmatic move as a local change.
    assert_eq!(
        agent.channel.local_changed().await.expect("suppressed"),
        LocalOutcome::Suppressed
    );
    assert!(agent.port.sent().is_empty());

    assert_eq!(
        customer.channel.handle_remote(&update),
        Err(RejectedUpdate::Echo)
    );
    assert!(customer.surface.applied().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unready_surface_ignores_updates() {
    let agent = peer("agent-1", Role::Agent);
    let customer = peer("customer-1", Role::Customer);
    customer.surface.scroll_to(0.7);
    customer.channel.local_changed().await.expect("send");
    let update = sent_updates(&customer.port).remove(0);

    agent.surface.set_ready(false);
    assert_eq!(
        agent.channel.handle_remote(&update),
        Err(RejectedUpdate::SurfaceNotReady)
    );
    assert!(agent.surface.applied().is_empty());
}
