//! Inbound side of chunked transfers.
//!
//! [`TransferReceiver`] wraps the clock-free [`Reassembler`] with one
//! reassembly timer per pending transfer. Timers start when the
//! announcement arrives and are cancelled on completion, so a timed-out
//! transfer is reported exactly once and a completed one never is.
//! Identifiers of finished transfers are remembered for one reassembly
//! timeout so a late re-announcement cannot open a second record.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::{
    task::AbortHandle,
    time::{Instant, sleep},
};
use tracing::{debug, trace, warn};

use super::{
    AnnounceOutcome,
    DropReason,
    FragmentOutcome,
    Progress,
    Reassembler,
    TransferError,
    TransferObserver,
};
use crate::{
    fragment::{Fragment, FragmentationConfig, MessageId, TransferMetadata},
    metrics::{self, Direction},
};

/// What happened to one inbound fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReceiveStatus {
    /// The fragment was ignored.
    Dropped(DropReason),
    /// The fragment was stored; more are required.
    Progress(Progress),
    /// The fragment duplicated one already stored.
    Duplicate,
    /// The transfer completed and was delivered to the observer.
    Delivered { message_id: MessageId },
}

#[derive(Debug)]
struct ReceiverState {
    reassembler: Reassembler,
    timers: HashMap<MessageId, AbortHandle>,
    finished: HashMap<MessageId, Instant>,
}

impl ReceiverState {
    fn retire(&mut self, message_id: &MessageId, timeout: Duration) {
        if let Some(timer) = self.timers.remove(message_id) {
            timer.abort();
        }
        self.finished
            .insert(message_id.clone(), Instant::now() + timeout);
    }

    fn recently_finished(&mut self, message_id: &MessageId) -> bool {
        let now = Instant::now();
        self.finished.retain(|_, until| *until > now);
        self.finished.contains_key(message_id)
    }
}

struct ReceiverShared {
    stream: String,
    timeout: Duration,
    observer: Arc<dyn TransferObserver>,
    state: Mutex<ReceiverState>,
}

impl ReceiverShared {
    fn lock(&self) -> MutexGuard<'_, ReceiverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expire(&self, message_id: &MessageId) {
        let progress = {
            let mut state = self.lock();
            let progress = state.reassembler.expire(message_id);
            if progress.is_some() {
                state.retire(message_id, self.timeout);
            }
            progress
        };
        let Some(progress) = progress else {
            return;
        };
        let error = TransferError::TransferTimeout {
            message_id: message_id.clone(),
            received: progress.done(),
            total: progress.total(),
        };
        warn!(stream = %self.stream, %message_id, %error, "inbound transfer expired");
        metrics::inc_transfers(Direction::Inbound, error.kind());
        self.observer.on_failed(message_id, &error);
    }
}

/// Reassembles inbound transfers for one stream.
///
/// Handlers must be called from within a Tokio runtime because they spawn
/// the reassembly timers.
pub struct TransferReceiver {
    shared: Arc<ReceiverShared>,
}

impl TransferReceiver {
    /// Create a receiver for `stream`.
    #[must_use]
    pub fn new(
        stream: impl Into<String>,
        config: &FragmentationConfig,
        observer: Arc<dyn TransferObserver>,
    ) -> Self {
        Self {
            shared: Arc::new(ReceiverShared {
                stream: stream.into(),
                timeout: config.reassembly_timeout,
                observer,
                state: Mutex::new(ReceiverState {
                    reassembler: Reassembler::new(
                        config.max_message_size,
                        config.max_pending_transfers,
                    ),
                    timers: HashMap::new(),
                    finished: HashMap::new(),
                }),
            }),
        }
    }

    /// Stream name this receiver listens on.
    #[must_use]
    pub fn stream(&self) -> &str { &self.shared.stream }

    /// Number of transfers awaiting fragments.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.shared.lock().reassembler.pending_len() }

    /// Fragments received so far for a pending transfer.
    #[must_use]
    pub fn received_count(&self, message_id: &MessageId) -> Option<u32> {
        self.shared.lock().reassembler.received_count(message_id)
    }

    /// Record an announcement and start its reassembly timer.
    ///
    /// Re-announcing a pending transfer is ignored and does not restart the
    /// timer. So is re-announcing one that completed, failed, or expired
    /// within the last reassembly timeout.
    ///
    /// # Errors
    ///
    /// Returns the rejection from [`Reassembler::announce`]. Rejected
    /// announcements leave no state behind.
    pub fn handle_metadata(&self, meta: &TransferMetadata) -> Result<AnnounceOutcome, TransferError> {
        let message_id = meta.message_id().clone();
        let mut state = self.shared.lock();
        if state.recently_finished(&message_id) {
            trace!(stream = %self.shared.stream, %message_id, "announcement for finished transfer");
            return Ok(AnnounceOutcome::Duplicate);
        }
        let outcome = match state.reassembler.announce(meta) {
            Ok(outcome) => outcome,
            Err(error) => {
                drop(state);
                warn!(stream = %self.shared.stream, %message_id, %error, "announcement rejected");
                metrics::inc_transfers(Direction::Inbound, error.kind());
                return Err(error);
            }
        };
        if outcome == AnnounceOutcome::Accepted {
            let timer = self.spawn_timer(message_id.clone());
            state.timers.insert(message_id.clone(), timer);
            debug!(
                stream = %self.shared.stream,
                %message_id,
                total = meta.total_chunks(),
                size = meta.total_size(),
                "transfer announced"
            );
        }
        Ok(outcome)
    }

    /// Store a fragment, delivering the payload when it completes a
    /// transfer.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::MalformedPayload`] or
    /// [`TransferError::IncompleteTransfer`] when the completed transfer
    /// cannot be decoded. The observer is notified before the error is
    /// returned.
    pub fn handle_fragment(&self, fragment: Fragment) -> Result<ReceiveStatus, TransferError> {
        let message_id = fragment.message_id().clone();
        let index = fragment.index();
        let total = fragment.total_chunks();
        let outcome = {
            let mut state = self.shared.lock();
            let outcome = state.reassembler.accept(fragment);
            if matches!(outcome, Ok(FragmentOutcome::Complete(_)) | Err(_)) {
                state.retire(&message_id, self.shared.timeout);
            }
            outcome
        };

        match outcome {
            Ok(FragmentOutcome::Dropped(reason)) => {
                debug!(stream = %self.shared.stream, %message_id, %index, ?reason, "fragment dropped");
                Ok(ReceiveStatus::Dropped(reason))
            }
            Ok(FragmentOutcome::Duplicate(_)) => {
                trace!(stream = %self.shared.stream, %message_id, %index, "duplicate fragment");
                Ok(ReceiveStatus::Duplicate)
            }
            Ok(FragmentOutcome::Progress(progress)) => {
                metrics::inc_fragments(Direction::Inbound);
                self.shared.observer.on_progress(&message_id, progress);
                Ok(ReceiveStatus::Progress(progress))
            }
            Ok(FragmentOutcome::Complete(message)) => {
                metrics::inc_fragments(Direction::Inbound);
                metrics::inc_transfers(Direction::Inbound, "complete");
                debug!(stream = %self.shared.stream, %message_id, "transfer reassembled");
                self.shared
                    .observer
                    .on_progress(&message_id, Progress::new(total, total));
                self.shared.observer.on_received(message);
                Ok(ReceiveStatus::Delivered { message_id })
            }
            Err(error) => {
                warn!(stream = %self.shared.stream, %message_id, %error, "reassembly failed");
                metrics::inc_transfers(Direction::Inbound, error.kind());
                self.shared.observer.on_failed(&message_id, &error);
                Err(error)
            }
        }
    }

    fn spawn_timer(&self, message_id: MessageId) -> AbortHandle {
        let shared: Weak<ReceiverShared> = Arc::downgrade(&self.shared);
        let timeout = self.shared.timeout;
        tokio::spawn(async move {
            sleep(timeout).await;
            if let Some(shared) = shared.upgrade() {
                shared.expire(&message_id);
            }
        })
        .abort_handle()
    }
}

impl Drop for TransferReceiver {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
    }
}
