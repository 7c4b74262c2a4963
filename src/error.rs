//! Canonical error and result types for the crate.
//!
//! Component errors ([`TransferError`], [`SyncError`], [`PortError`]) stay
//! specific to the operation that raised them; [`Error`] wraps them for
//! callers driving a whole [`SyncSession`](crate::session::SyncSession).

use thiserror::Error;

use crate::{port::PortError, replicator::SyncError, transfer::TransferError};

/// Top-level error type exposed by `tandem`.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// A wire type was registered twice on one session.
    #[error("message type `{0}` is already registered")]
    DuplicateRoute(String),
    /// No transfer stream with this name is bound.
    #[error("no transfer stream named `{0}`")]
    UnknownStream(String),
    /// No sync channel with this name is bound.
    #[error("no sync channel named `{0}`")]
    UnknownChannel(String),
    /// An inbound payload did not decode as its message type requires.
    #[error("could not decode `{message_type}` payload: {source}")]
    Decode {
        message_type: String,
        source: serde_json::Error,
    },
    /// An outbound payload could not be encoded.
    #[error("could not encode payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Port(#[from] PortError),
}

impl Error {
    /// Whether the failure is confined to one transfer, channel, or message
    /// and the session can keep running.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::DuplicateRoute(_) | Self::UnknownStream(_) | Self::UnknownChannel(_) => false,
            Self::Transfer(err) => err.is_recoverable(),
            Self::Port(err) => !matches!(err, PortError::Closed),
            Self::Decode { .. } | Self::Encode(_) | Self::Sync(_) => true,
        }
    }
}

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
