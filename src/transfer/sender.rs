//! Outbound side of a chunked transfer.
//!
//! [`TransferSender`] walks one payload through
//! `Idle → Announcing → SendingFragments → Complete | Failed`. Fragments go
//! out strictly in index order, each only after the channel accepted the
//! previous one, separated by a fixed pause so the channel is never
//! saturated. Failed sends are reported, not retried; the caller may restart
//! the whole transfer.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use serde::Serialize;
use tokio::{select, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Progress, TransferError, TransferObserver};
use crate::{
    clock::Clock,
    fragment::{FragmentBatch, FragmentationConfig, Fragmenter, MessageId},
    message::{fragment_type, metadata_type},
    metrics::{self, Direction},
    port::SignalingPort,
};

/// Lifecycle of the sender's current (or most recent) transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendState {
    /// No transfer has been attempted.
    Idle,
    /// The announcement is being sent.
    Announcing,
    /// Fragments are being sent.
    SendingFragments { sent: u32, total: u32 },
    /// The last transfer finished.
    Complete,
    /// The last transfer failed or was cancelled.
    Failed,
}

impl SendState {
    /// Whether a transfer currently occupies the sender.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Announcing | Self::SendingFragments { .. })
    }
}

/// Claim on the sender's single in-flight slot.
///
/// Dropping the claim while still in flight (for example because the
/// caller dropped the `send` future) marks the transfer failed so the slot
/// is released.
struct InFlight<'a> {
    state: &'a Mutex<SendState>,
}

impl<'a> InFlight<'a> {
    fn claim(state: &'a Mutex<SendState>) -> Result<Self, TransferError> {
        let mut guard = lock(state);
        if guard.is_in_flight() {
            return Err(TransferError::TransferInProgress);
        }
        *guard = SendState::Announcing;
        Ok(Self { state })
    }

    fn set(&self, next: SendState) { *lock(self.state) = next; }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut guard = lock(self.state);
        if guard.is_in_flight() {
            *guard = SendState::Failed;
        }
    }
}

fn lock(state: &Mutex<SendState>) -> MutexGuard<'_, SendState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives outbound transfers for one stream.
pub struct TransferSender {
    stream: String,
    port: Arc<dyn SignalingPort>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn TransferObserver>,
    fragmenter: Fragmenter,
    inter_fragment_delay: Duration,
    state: Mutex<SendState>,
}

impl TransferSender {
    /// Create a sender publishing on `stream`.
    #[must_use]
    pub fn new(
        stream: impl Into<String>,
        port: Arc<dyn SignalingPort>,
        clock: Arc<dyn Clock>,
        config: &FragmentationConfig,
        observer: Arc<dyn TransferObserver>,
    ) -> Self {
        Self {
            stream: stream.into(),
            port,
            clock,
            observer,
            fragmenter: Fragmenter::from_config(config),
            inter_fragment_delay: config.inter_fragment_delay,
            state: Mutex::new(SendState::Idle),
        }
    }

    /// Stream name this sender publishes on.
    #[must_use]
    pub fn stream(&self) -> &str { &self.stream }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SendState { *lock(&self.state) }

    /// Send `payload` under a freshly generated identifier.
    ///
    /// # Errors
    ///
    /// See [`TransferSender::send_with_id`].
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        cancel: &CancellationToken,
    ) -> Result<MessageId, TransferError> {
        self.send_with_id(payload, MessageId::generate(), cancel)
            .await
    }

    /// Announce and send `payload` as the transfer `message_id`.
    ///
    /// Resolves once the final fragment has been accepted by the channel.
    /// Cancelling `cancel` stops further fragment sends; fragments already
    /// sent are not retracted and the receiver eventually times out.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::TransferInProgress`] when another transfer
    /// is in flight on this sender, [`TransferError::Encode`] when the
    /// payload cannot be serialized, [`TransferError::SendFailure`] when the
    /// channel rejects a message, and [`TransferError::Cancelled`] when
    /// `cancel` fires first.
    pub async fn send_with_id<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        message_id: MessageId,
        cancel: &CancellationToken,
    ) -> Result<MessageId, TransferError> {
        let flight = InFlight::claim(&self.state)?;

        let batch = match self.fragmenter.split(payload, message_id.clone()) {
            Ok(batch) => batch,
            Err(err) => {
                let error = TransferError::Encode {
                    reason: err.to_string(),
                };
                return Err(self.fail(&flight, &message_id, error));
            }
        };

        self.announce(&flight, &batch).await?;
        self.send_fragments(&flight, batch, cancel).await?;

        flight.set(SendState::Complete);
        debug!(stream = %self.stream, %message_id, "transfer sent");
        metrics::inc_transfers(Direction::Outbound, "complete");
        self.observer.on_sent(&message_id);
        Ok(message_id)
    }

    async fn announce(&self, flight: &InFlight<'_>, batch: &FragmentBatch) -> Result<(), TransferError> {
        let message_id = batch.message_id();
        let meta = batch.metadata(self.clock.now_millis());
        debug!(
            stream = %self.stream,
            %message_id,
            total = meta.total_chunks(),
            size = meta.total_size(),
            "announcing transfer"
        );
        let body = self.encode(flight, message_id, &meta)?;
        if let Err(source) = self.port.send(&metadata_type(&self.stream), body).await {
            let error = TransferError::SendFailure {
                message_id: message_id.clone(),
                source,
            };
            return Err(self.fail(flight, message_id, error));
        }
        Ok(())
    }

    async fn send_fragments(
        &self,
        flight: &InFlight<'_>,
        batch: FragmentBatch,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let message_id = batch.message_id().clone();
        let fragments = batch.into_fragments();
        let total = u32::try_from(fragments.len()).unwrap_or(u32::MAX);
        let wire_type = fragment_type(&self.stream);
        flight.set(SendState::SendingFragments { sent: 0, total });

        for (sent, fragment) in (0..total).zip(fragments) {
            if cancel.is_cancelled() {
                return Err(self.cancelled(flight, &message_id, sent, total));
            }
            if sent > 0 && !self.inter_fragment_delay.is_zero() {
                select! {
                    () = cancel.cancelled() => {
                        return Err(self.cancelled(flight, &message_id, sent, total));
                    }
                    () = sleep(self.inter_fragment_delay) => {}
                }
            }

            let body = self.encode(flight, &message_id, &fragment)?;
            if let Err(source) = self.port.send(&wire_type, body).await {
                let error = TransferError::SendFailure {
                    message_id: message_id.clone(),
                    source,
                };
                return Err(self.fail(flight, &message_id, error));
            }

            metrics::inc_fragments(Direction::Outbound);
            let progress = Progress::new(sent + 1, total);
            flight.set(SendState::SendingFragments {
                sent: progress.done(),
                total,
            });
            self.observer.on_progress(&message_id, progress);
        }
        Ok(())
    }

    fn encode<B: Serialize>(
        &self,
        flight: &InFlight<'_>,
        message_id: &MessageId,
        body: &B,
    ) -> Result<String, TransferError> {
        serde_json::to_string(body).map_err(|err| {
            let error = TransferError::Encode {
                reason: err.to_string(),
            };
            self.fail(flight, message_id, error)
        })
    }

    fn cancelled(
        &self,
        flight: &InFlight<'_>,
        message_id: &MessageId,
        sent: u32,
        total: u32,
    ) -> TransferError {
        let error = TransferError::Cancelled {
            message_id: message_id.clone(),
            sent,
            total,
        };
        self.fail(flight, message_id, error)
    }

    fn fail(&self, flight: &InFlight<'_>, message_id: &MessageId, error: TransferError) -> TransferError {
        flight.set(SendState::Failed);
        warn!(stream = %self.stream, %message_id, %error, "outbound transfer failed");
        metrics::inc_transfers(Direction::Outbound, error.kind());
        self.observer.on_failed(message_id, &error);
        error
    }
}
