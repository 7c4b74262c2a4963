//! Error types emitted by the fragment codec.
//!
//! Splitting and joining fail for different reasons, so each direction has
//! its own enum; the transfer coordinator maps both onto
//! [`TransferError`](crate::transfer::TransferError).

use thiserror::Error;

use super::{FragmentIndex, MessageId};

/// Errors produced while splitting an outbound payload.
#[derive(Debug, Error)]
pub enum FragmentationError {
    /// Serialization failed before slicing.
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    /// The identifier would eat into the slice budget.
    #[error("message id of {len} bytes exceeds the {max} byte limit")]
    MessageIdTooLong { len: usize, max: usize },
    /// More fragments would be needed than a `u32` index can address.
    #[error("payload needs more than u32::MAX fragments")]
    IndexOverflow,
}

/// Errors produced while joining fragments back into a payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    /// A slot had no fragment.
    #[error("transfer incomplete: fragment {missing} missing")]
    Incomplete { missing: FragmentIndex },
    /// Fragments disagree on the transfer they belong to.
    #[error("fragment {index} belongs to {found}, expected {expected}")]
    Inconsistent {
        index: FragmentIndex,
        expected: MessageId,
        found: MessageId,
    },
    /// The concatenated slices do not parse.
    #[error("reassembled payload is malformed: {0}")]
    Malformed(String),
}
