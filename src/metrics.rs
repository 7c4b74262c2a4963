//! Metric helpers for `tandem`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to no-ops.

/// Name of the counter tracking fragments sent and received.
pub const FRAGMENTS_TOTAL: &str = "tandem_fragments_total";
/// Name of the counter tracking finished transfers by outcome.
pub const TRANSFERS_TOTAL: &str = "tandem_transfers_total";
/// Name of the counter tracking continuous-state updates by outcome.
pub const SYNC_UPDATES_TOTAL: &str = "tandem_sync_updates_total";
/// Name of the counter tracking discrete actions.
pub const ACTIONS_TOTAL: &str = "tandem_actions_total";

/// Direction of travel relative to the local peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Received from the remote peer.
    Inbound,
    /// Sent to the remote peer.
    Outbound,
}

impl Direction {
    /// Label value used in metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Record a fragment crossing the channel.
pub fn inc_fragments(direction: Direction) {
    #[cfg(feature = "metrics")]
    metrics::counter!(FRAGMENTS_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}

/// Record a finished transfer. `outcome` is a short static label such as
/// `"complete"` or `"timeout"`.
pub fn inc_transfers(direction: Direction, outcome: &'static str) {
    #[cfg(feature = "metrics")]
    metrics::counter!(
        TRANSFERS_TOTAL,
        "direction" => direction.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, outcome);
}

/// Record a continuous-state update outcome (`"sent"`, `"applied"`, or a
/// drop reason).
pub fn inc_sync_updates(outcome: &'static str) {
    #[cfg(feature = "metrics")]
    metrics::counter!(SYNC_UPDATES_TOTAL, "outcome" => outcome).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Record a discrete action crossing the channel.
pub fn inc_actions(direction: Direction) {
    #[cfg(feature = "metrics")]
    metrics::counter!(ACTIONS_TOTAL, "direction" => direction.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = direction;
}
