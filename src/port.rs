//! Seam between the engine and the external signaling channel.
//!
//! The signaling channel is a best-effort, size-limited, unordered message
//! transport owned by the host application. The engine only needs two things
//! from it: a way to send a typed string payload and a stream of inbound
//! messages. [`SignalingPort`] captures the first; inbound traffic is fed to
//! [`SyncSession::handle_inbound`](crate::session::SyncSession::handle_inbound)
//! as [`InboundMessage`] values.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a [`SignalingPort`] when a send is not accepted.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PortError {
    /// The payload exceeds the channel's per-message ceiling.
    #[error("payload of {size} bytes exceeds the {limit} byte channel limit")]
    PayloadTooLarge {
        /// Size of the rejected payload in bytes.
        size: usize,
        /// Channel limit in bytes.
        limit: usize,
    },
    /// The channel has been torn down.
    #[error("signaling channel closed")]
    Closed,
    /// The channel refused the message for a provider-specific reason.
    #[error("signaling channel rejected the message: {0}")]
    Rejected(String),
}

impl PortError {
    /// Whether resending the same payload could succeed.
    ///
    /// Oversized payloads and closed channels fail deterministically, so
    /// retrying them only burns the backoff budget.
    #[must_use]
    pub fn is_retryable(&self) -> bool { matches!(self, Self::Rejected(_)) }
}

/// Outbound half of the external signaling channel.
///
/// Implementations resolve once the channel has locally accepted the message
/// (or refused it); no remote acknowledgement is implied.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignalingPort: Send + Sync + 'static {
    /// Largest payload, in bytes, the channel accepts in a single message.
    fn max_payload_bytes(&self) -> usize;

    /// Send `payload` tagged with `message_type`.
    ///
    /// # Errors
    ///
    /// Returns [`PortError`] when the channel rejects the message.
    async fn send(&self, message_type: &str, payload: String) -> Result<(), PortError>;
}

/// Reject payloads larger than `limit` bytes.
///
/// Port implementations call this before handing a payload to the provider so
/// oversize sends fail fast with a precise error.
///
/// # Errors
///
/// Returns [`PortError::PayloadTooLarge`] when `payload` exceeds `limit`.
pub fn check_payload_size(payload: &str, limit: usize) -> Result<(), PortError> {
    if payload.len() > limit {
        return Err(PortError::PayloadTooLarge {
            size: payload.len(),
            limit,
        });
    }
    Ok(())
}

/// A message received from the signaling channel, prior to routing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Message type string as published by the remote peer.
    pub message_type: String,
    /// Raw JSON payload.
    pub payload: String,
}

impl InboundMessage {
    /// Construct a new inbound message.
    #[must_use]
    pub fn new(message_type: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            payload: payload.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("", 0, true)]
    #[case("abc", 3, true)]
    #[case("abcd", 3, false)]
    fn payload_size_checks_are_inclusive(
        #[case] payload: &str,
        #[case] limit: usize,
        #[case] ok: bool,
    ) {
        assert_eq!(check_payload_size(payload, limit).is_ok(), ok);
    }

    #[test]
    fn only_provider_rejections_are_retryable() {
        assert!(PortError::Rejected("busy".into()).is_retryable());
        assert!(!PortError::Closed.is_retryable());
        assert!(
            !PortError::PayloadTooLarge {
                size: 10,
                limit: 5
            }
            .is_retryable()
        );
    }
}
