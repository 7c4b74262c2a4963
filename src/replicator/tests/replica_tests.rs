//! Tests for the pure replication decisions.

use std::time::Duration;

use rstest::rstest;
use tokio::time::Instant;

use super::{CHANNEL, PAGE, remote, snapshot};
use crate::{
    message::Role,
    replicator::{
        ApplyBasis,
        ApplyMode,
        Outbound,
        RejectedUpdate,
        ReplicationConfig,
        Replicator,
        SourceId,
        SurfaceSnapshot,
    },
};

const NOW: u64 = 1_700_000_000_000;

fn replicator(source: &str) -> Replicator {
    Replicator::new(
        CHANNEL,
        SourceId::new(source),
        Role::Agent,
        ReplicationConfig::default(),
    )
}

fn ms(millis: u64) -> Duration { Duration::from_millis(millis) }

#[test]
fn peer_update_is_applied_and_own_echo_rejected() {
    let mut peer_a = replicator("peerA");
    let t0 = Instant::now();

    let plan = peer_a
        .on_remote(&remote(0.42, "peerB", NOW), &snapshot(0.0), t0, NOW)
        .expect("update from peerB applies");
    assert!((plan.target.percent_y - 0.42).abs() < f64::EPSILON);
    assert_eq!(plan.basis, ApplyBasis::Absolute);

    let echoed = peer_a.on_remote(&remote(0.42, "peerA", NOW), &snapshot(0.42), t0, NOW);
    assert_eq!(echoed, Err(RejectedUpdate::Echo));
}

#[rstest]
#[case(0.0, NOW)]
#[case(1.0, NOW + 60_000)]
#[case(0.5, NOW - 10)]
fn own_updates_are_never_applied(#[case] percent_y: f64, #[case] ts: u64) {
    let mut replica = replicator("me");
    let outcome = replica.on_remote(&remote(percent_y, "me", ts), &snapshot(0.2), Instant::now(), NOW);
    assert_eq!(outcome, Err(RejectedUpdate::Echo));
}

#[rstest]
#[case(1_001, Err(RejectedUpdate::Stale { age_ms: 1_001 }))]
#[case(1_000, Ok(()))]
#[case(0, Ok(()))]
fn freshness_window_bounds_age(#[case] age: u64, #[case] expected: Result<(), RejectedUpdate>) {
    let mut replica = replicator("me");
    let outcome = replica
        .on_remote(&remote(0.3, "peer", NOW - age), &snapshot(0.0), Instant::now(), NOW)
        .map(|_| ());
    assert_eq!(outcome, expected);
}

#[test]
fn future_dated_updates_are_accepted() {
    let mut replica = replicator("me");
    let outcome = replica.on_remote(&remote(0.3, "peer", NOW + 5_000), &snapshot(0.0), Instant::now(), NOW);
    assert!(outcome.is_ok());
}

#[test]
fn older_or_equal_timestamps_are_superseded() {
    let mut replica = replicator("me");
    let t0 = Instant::now();
    replica
        .on_remote(&remote(0.3, "peer", NOW), &snapshot(0.0), t0, NOW)
        .expect("first");

    for ts in [NOW, NOW - 1] {
        assert_eq!(
            replica.on_remote(&remote(0.6, "peer", ts), &snapshot(0.3), t0, NOW),
            Err(RejectedUpdate::Superseded {
                ts,
                last_applied: NOW,
            })
        );
    }
    assert!(replica.on_remote(&remote(0.6, "peer", NOW + 1), &snapshot(0.3), t0, NOW + 1).is_ok());
    assert_eq!(replica.last_applied_ts(), Some(NOW + 1));
}

#[test]
fn foreign_container_is_rejected() {
    let mut replica = replicator("me");
    let mut update = remote(0.3, "peer", NOW);
    update.container_id = "checkout-scroll".into();
    assert_eq!(
        replica.on_remote(&update, &snapshot(0.0), Instant::now(), NOW),
        Err(RejectedUpdate::ChannelMismatch {
            expected: CHANNEL.into(),
            found: "checkout-scroll".into(),
        })
    );
}

#[test]
fn unready_surface_rejects_without_consuming_the_update() {
    let mut replica = replicator("me");
    let update = remote(0.3, "peer", NOW);
    let hidden = SurfaceSnapshot {
        ready: false,
        ..snapshot(0.0)
    };
    assert_eq!(
        replica.on_remote(&update, &hidden, Instant::now(), NOW),
        Err(RejectedUpdate::SurfaceNotReady)
    );
    assert!(replica.on_remote(&update, &snapshot(0.0), Instant::now(), NOW).is_ok());
}

#[test]
fn differing_extent_falls_back_to_fractions() {
    let mut replica = replicator("me");
    let mut update = remote(0.5, "peer", NOW);
    update.scroll_height = 4_000.0;
    update.px_y = 1_600.0;

    let plan = replica
        .on_remote(&update, &snapshot(0.5), Instant::now(), NOW)
        .expect("applies");
    assert_eq!(plan.basis, ApplyBasis::Relative);
    assert!((plan.target.px_y - 0.5 * PAGE.range()).abs() < f64::EPSILON);
    assert_eq!(plan.mode, ApplyMode::Smooth, "same fraction means no visible jump");
}

#[rstest]
#[case(0.0, 0.25, ApplyMode::Smooth)]
#[case(0.0, 0.75, ApplyMode::Immediate)]
#[case(0.5, 0.25, ApplyMode::Smooth)]
fn jump_size_selects_apply_mode(#[case] from: f64, #[case] to: f64, #[case] mode: ApplyMode) {
    let mut replica = replicator("me");
    let plan = replica
        .on_remote(&remote(to, "peer", NOW), &snapshot(from), Instant::now(), NOW)
        .expect("applies");
    assert_eq!(plan.mode, mode);
}

#[test]
fn slow_movement_is_deferred_to_the_slow_interval() {
    let mut replica = replicator("me");
    let t0 = Instant::now();
    assert!(matches!(
        replica.on_local_change(&snapshot(0.1), t0, NOW),
        Outbound::Send(_)
    ));

    let outcome = replica.on_local_change(&snapshot(0.1005), t0 + ms(10), NOW + 10);
    assert_eq!(outcome, Outbound::Deferred { due_at: t0 + ms(100) });
    assert!(replica.take_due(t0 + ms(50)).is_none());

    let flushed = replica.take_due(t0 + ms(100)).expect("due");
    assert!((flushed.percent_y - 0.1005).abs() < 1e-9);
    assert_eq!(flushed.ts, NOW + 10);
    assert!(replica.next_due().is_none());
}

#[test]
fn fast_movement_uses_the_fast_interval() {
    let mut replica = replicator("me");
    let t0 = Instant::now();
    replica.on_local_change(&snapshot(0.0), t0, NOW);

    let outcome = replica.on_local_change(&snapshot(0.1), t0 + ms(10), NOW + 10);
    assert_eq!(outcome, Outbound::Deferred { due_at: t0 + ms(16) });
    assert!(replica.velocity() >= 1.0);

    let outcome = replica.on_local_change(&snapshot(0.2), t0 + ms(20), NOW + 20);
    assert!(matches!(outcome, Outbound::Send(update) if (update.percent_y - 0.2).abs() < 1e-9));
    assert!(replica.next_due().is_none(), "direct send replaces the deferred update");
}

#[test]
fn local_changes_after_remote_apply_are_suppressed() {
    let mut replica = replicator("me");
    let t0 = Instant::now();
    replica
        .on_remote(&remote(0.4, "peer", NOW), &snapshot(0.0), t0, NOW)
        .expect("applies");

    assert_eq!(
        replica.on_local_change(&snapshot(0.4), t0 + ms(100), NOW + 100),
        Outbound::Suppressed
    );
    assert!(matches!(
        replica.on_local_change(&snapshot(0.45), t0 + ms(151), NOW + 151),
        Outbound::Send(_)
    ));
}

#[test]
fn remote_apply_discards_deferred_local_update() {
    let mut replica = replicator("me");
    let t0 = Instant::now();
    replica.on_local_change(&snapshot(0.1), t0, NOW);
    replica.on_local_change(&snapshot(0.1001), t0 + ms(5), NOW + 5);
    assert!(replica.next_due().is_some());

    replica
        .on_remote(&remote(0.9, "peer", NOW + 6), &snapshot(0.1001), t0 + ms(6), NOW + 6)
        .expect("applies");
    assert!(replica.take_due(t0 + ms(500)).is_none());
}

#[test]
fn outbound_update_carries_relative_and_absolute_values() {
    let mut replica = replicator("me");
    let Outbound::Send(update) = replica.on_local_change(&snapshot(0.25), Instant::now(), NOW) else {
        panic!("first change is sent immediately");
    };
    assert_eq!(update.container_id, CHANNEL);
    assert!((update.percent_y - 0.25).abs() < f64::EPSILON);
    assert!((update.px_y - 300.0).abs() < f64::EPSILON);
    assert!((update.scroll_height - 2_000.0).abs() < f64::EPSILON);
    assert_eq!(update.source_id, SourceId::new("me"));
    assert_eq!(update.user_type, Role::Agent);
    assert_eq!(update.ts, NOW);
}
