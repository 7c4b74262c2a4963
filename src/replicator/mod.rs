//! Continuous-state replication between the two peers.
//!
//! Each sync channel keeps one position (a scroll offset or pointer
//! location) loosely consistent across peers. Outbound updates are paced by
//! how fast the surface moves; inbound updates are applied unless they echo
//! our own identity, arrive stale, or are superseded by one already applied.
//! The pure [`Replicator`] holds the decisions; [`SyncChannel`] drives it
//! with timers, retries and the bound [`Surface`].

mod channel;
mod config;
mod error;
mod replica;
mod surface;
mod update;

pub use channel::{ChannelContext, ChannelState, LocalOutcome, SyncChannel};
pub use config::ReplicationConfig;
pub use error::{RejectedUpdate, SyncError};
pub use replica::{ApplyBasis, ApplyPlan, Outbound, Replicator};
pub use surface::{ApplyMode, Extent, Position, Surface, SurfaceSnapshot};
pub use update::{SourceId, SyncUpdate};

#[cfg(test)]
mod tests;
