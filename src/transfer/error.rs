//! Errors reported by chunked transfers.
//!
//! Every variant terminates only the transfer it names; the coordinator keeps
//! serving other transfers.

use thiserror::Error;

use crate::{
    fragment::{FragmentIndex, MessageId},
    port::PortError,
};

/// Failure of an outbound or inbound transfer.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    /// The signaling channel rejected the announcement or a fragment.
    #[error("send failed for transfer {message_id}: {source}")]
    SendFailure {
        message_id: MessageId,
        source: PortError,
    },
    /// An outbound transfer is already in flight on this coordinator.
    #[error("another outbound transfer is already in flight")]
    TransferInProgress,
    /// Not every fragment arrived before the reassembly timeout.
    #[error("transfer {message_id} timed out with {received} of {total} fragments")]
    TransferTimeout {
        message_id: MessageId,
        received: u32,
        total: u32,
    },
    /// The reassembled text does not parse, or contradicts its announcement.
    #[error("transfer {message_id} is malformed: {reason}")]
    MalformedPayload { message_id: MessageId, reason: String },
    /// Reassembly was attempted with an empty slot.
    #[error("transfer {message_id} is missing fragment {missing}")]
    IncompleteTransfer {
        message_id: MessageId,
        missing: FragmentIndex,
    },
    /// The announcement declares more bytes than the receiver accepts.
    #[error("transfer {message_id} declares {declared} bytes, above the {limit} byte limit")]
    MessageTooLarge {
        message_id: MessageId,
        declared: usize,
        limit: usize,
    },
    /// The receiver already holds its limit of pending transfers.
    #[error("transfer {message_id} refused: {limit} transfers already pending")]
    TooManyPending { message_id: MessageId, limit: usize },
    /// The outbound payload could not be serialized or split.
    #[error("failed to prepare payload: {reason}")]
    Encode { reason: String },
    /// The caller cancelled the outbound transfer.
    #[error("transfer {message_id} cancelled after {sent} of {total} fragments")]
    Cancelled {
        message_id: MessageId,
        sent: u32,
        total: u32,
    },
}

impl TransferError {
    /// Short static label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SendFailure { .. } => "send_failure",
            Self::TransferInProgress => "in_progress",
            Self::TransferTimeout { .. } => "timeout",
            Self::MalformedPayload { .. } => "malformed",
            Self::IncompleteTransfer { .. } => "incomplete",
            Self::MessageTooLarge { .. } => "too_large",
            Self::TooManyPending { .. } => "too_many_pending",
            Self::Encode { .. } => "encode",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether the caller can reasonably restart the whole transfer.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::MessageTooLarge { .. } | Self::Encode { .. })
    }
}
