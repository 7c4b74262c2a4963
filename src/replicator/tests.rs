//! Unit tests for continuous-state replication.

mod channel_tests;
mod replica_tests;

use super::{Extent, Position, SourceId, SurfaceSnapshot, SyncUpdate};
use crate::message::Role;

const CHANNEL: &str = "catalog-scroll";

const PAGE: Extent = Extent {
    scroll_height: 2_000.0,
    client_height: 800.0,
};

fn snapshot(percent_y: f64) -> SurfaceSnapshot {
    SurfaceSnapshot {
        ready: true,
        extent: PAGE,
        position: Position::from_fractions(0.0, percent_y, PAGE),
    }
}

fn remote(percent_y: f64, source: &str, ts: u64) -> SyncUpdate {
    let position = Position::from_fractions(0.0, percent_y, PAGE);
    SyncUpdate {
        container_id: CHANNEL.to_owned(),
        percent_y,
        percent_x: 0.0,
        px_y: position.px_y,
        px_x: 0.0,
        scroll_height: PAGE.scroll_height,
        client_height: PAGE.client_height,
        velocity: 0.0,
        source_id: SourceId::new(source),
        user_type: Role::Customer,
        ts,
    }
}
