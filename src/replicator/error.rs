use thiserror::Error;

use crate::port::PortError;

/// Why an inbound update was not applied.
///
/// These are expected in steady state on an unordered channel shared by two
/// moving peers; they are counted and logged at `trace`, never escalated.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RejectedUpdate {
    /// The update carries our own source identity.
    #[error("update originated locally")]
    Echo,
    /// The update is older than the freshness window.
    #[error("update is {age_ms} ms old")]
    Stale { age_ms: u64 },
    /// A newer or equally recent update was already applied.
    #[error("update at {ts} is not newer than applied update at {last_applied}")]
    Superseded { ts: u64, last_applied: u64 },
    /// The update targets a different container.
    #[error("update targets `{found}`, channel is bound to `{expected}`")]
    ChannelMismatch { expected: String, found: String },
    /// The bound surface cannot accept positions yet.
    #[error("surface is not ready")]
    SurfaceNotReady,
}

impl RejectedUpdate {
    /// Short static label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Echo => "echo",
            Self::Stale { .. } => "stale",
            Self::Superseded { .. } => "superseded",
            Self::ChannelMismatch { .. } => "channel_mismatch",
            Self::SurfaceNotReady => "not_ready",
        }
    }
}

/// Failure to publish a local update.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Every permitted attempt was refused by the signaling channel.
    #[error("sync channel `{channel}` failed after {attempts} attempt(s): {source}")]
    SendFailure {
        channel: String,
        attempts: u32,
        source: PortError,
    },
    /// The update could not be serialized.
    #[error("sync channel `{channel}` could not encode an update: {reason}")]
    Encode { channel: String, reason: String },
}
