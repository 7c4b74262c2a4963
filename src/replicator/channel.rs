//! Async driver binding a [`Replicator`] to a surface and the signaling
//! port.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::{
    task::AbortHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, trace, warn};

use super::{
    ApplyPlan,
    Outbound,
    RejectedUpdate,
    ReplicationConfig,
    Replicator,
    SourceId,
    Surface,
    SyncError,
    SyncUpdate,
};
use crate::{
    clock::Clock,
    message::{Role, sync_type},
    metrics,
    port::{PortError, SignalingPort},
    retry::{RetryExhausted, RetryPolicy, send_with_retry},
};

/// Health of a sync channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// The last send succeeded, or nothing has been sent yet.
    Active,
    /// The last send exhausted its retries. The next successful send
    /// returns the channel to [`ChannelState::Active`].
    Error { attempts: u32, last_error: PortError },
}

/// What happened to a local change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalOutcome {
    /// An update was sent.
    Sent,
    /// The update will be sent by the trailing flush.
    Deferred,
    /// The change echoed a remote update and was not replicated.
    Suppressed,
}

/// Collaborators and settings shared by every channel of a session.
#[derive(Clone)]
pub struct ChannelContext {
    pub port: Arc<dyn SignalingPort>,
    pub clock: Arc<dyn Clock>,
    pub role: Role,
    pub replication: ReplicationConfig,
    pub retry: RetryPolicy,
}

struct FlushTimer {
    at: Instant,
    handle: AbortHandle,
}

struct ChannelInner {
    replicator: Replicator,
    state: ChannelState,
    flush: Option<FlushTimer>,
}

struct ChannelShared {
    name: String,
    message_type: String,
    port: Arc<dyn SignalingPort>,
    clock: Arc<dyn Clock>,
    surface: Arc<dyn Surface>,
    retry: RetryPolicy,
    inner: Mutex<ChannelInner>,
}

enum FlushStep {
    Send(SyncUpdate),
    Wait(Instant),
    Idle,
}

impl ChannelShared {
    fn lock(&self) -> MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn publish(&self, update: &SyncUpdate) -> Result<(), SyncError> {
        let payload = serde_json::to_string(update).map_err(|err| SyncError::Encode {
            channel: self.name.clone(),
            reason: err.to_string(),
        })?;

        match send_with_retry(&*self.port, &self.retry, &self.message_type, &payload).await {
            Ok(attempts) => {
                self.lock().state = ChannelState::Active;
                trace!(channel = %self.name, attempts, ts = update.ts, "sync update sent");
                metrics::inc_sync_updates("sent");
                Ok(())
            }
            Err(RetryExhausted {
                attempts,
                last_error,
            }) => {
                self.lock().state = ChannelState::Error {
                    attempts,
                    last_error: last_error.clone(),
                };
                warn!(channel = %self.name, attempts, error = %last_error, "sync channel failed");
                metrics::inc_sync_updates("send_failed");
                Err(SyncError::SendFailure {
                    channel: self.name.clone(),
                    attempts,
                    source: last_error,
                })
            }
        }
    }

    fn next_flush_step(&self) -> FlushStep {
        let mut inner = self.lock();
        if let Some(update) = inner.replicator.take_due(Instant::now()) {
            inner.flush = None;
            return FlushStep::Send(update);
        }
        match inner.replicator.next_due() {
            Some(next) => {
                if let Some(timer) = inner.flush.as_mut() {
                    timer.at = next;
                }
                FlushStep::Wait(next)
            }
            None => {
                inner.flush = None;
                FlushStep::Idle
            }
        }
    }
}

async fn run_flush(shared: Weak<ChannelShared>, mut at: Instant) {
    loop {
        sleep_until(at).await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        match shared.next_flush_step() {
            FlushStep::Send(update) => {
                // Failure is recorded in the channel state.
                let _ = shared.publish(&update).await;
                return;
            }
            FlushStep::Wait(next) => at = next,
            FlushStep::Idle => return,
        }
    }
}

/// One replicated surface.
pub struct SyncChannel {
    shared: Arc<ChannelShared>,
}

impl SyncChannel {
    /// Bind `surface` to the sync channel `name`.
    ///
    /// The channel name doubles as the container identifier carried in
    /// updates.
    #[must_use]
    pub fn new(
        name: &str,
        surface: Arc<dyn Surface>,
        source_id: SourceId,
        context: &ChannelContext,
    ) -> Self {
        let replicator = Replicator::new(name, source_id, context.role, context.replication);
        Self {
            shared: Arc::new(ChannelShared {
                name: name.to_owned(),
                message_type: sync_type(name),
                port: Arc::clone(&context.port),
                clock: Arc::clone(&context.clock),
                surface,
                retry: context.retry.normalized(),
                inner: Mutex::new(ChannelInner {
                    replicator,
                    state: ChannelState::Active,
                    flush: None,
                }),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str { &self.shared.name }

    /// Identity stamped on this channel's outbound updates.
    #[must_use]
    pub fn source_id(&self) -> SourceId { self.shared.lock().replicator.source_id().clone() }

    /// Current health.
    #[must_use]
    pub fn state(&self) -> ChannelState { self.shared.lock().state.clone() }

    /// Current velocity estimate.
    #[must_use]
    pub fn velocity(&self) -> f64 { self.shared.lock().replicator.velocity() }

    /// React to a change of the bound surface.
    ///
    /// Resolves once the update has been sent (including retries), or
    /// immediately when the update is deferred or suppressed.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the update could not be sent; the channel
    /// enters [`ChannelState::Error`].
    pub async fn local_changed(&self) -> Result<LocalOutcome, SyncError> {
        let snapshot = self.shared.surface.snapshot();
        let wall_ms = self.shared.clock.now_millis();
        let outbound =
            self.shared
                .lock()
                .replicator
                .on_local_change(&snapshot, Instant::now(), wall_ms);

        match outbound {
            Outbound::Send(update) => {
                self.shared.publish(&update).await?;
                Ok(LocalOutcome::Sent)
            }
            Outbound::Deferred { due_at } => {
                self.schedule_flush(due_at);
                Ok(LocalOutcome::Deferred)
            }
            Outbound::Suppressed => {
                trace!(channel = %self.shared.name, "local change suppressed");
                metrics::inc_sync_updates("suppressed");
                Ok(LocalOutcome::Suppressed)
            }
        }
    }

    /// Apply an inbound update to the bound surface.
    ///
    /// # Errors
    ///
    /// Returns the [`RejectedUpdate`] reason when the update was dropped.
    pub fn handle_remote(&self, update: &SyncUpdate) -> Result<ApplyPlan, RejectedUpdate> {
        let snapshot = self.shared.surface.snapshot();
        let wall_ms = self.shared.clock.now_millis();
        let result =
            self.shared
                .lock()
                .replicator
                .on_remote(update, &snapshot, Instant::now(), wall_ms);

        match &result {
            Ok(plan) => {
                debug!(
                    channel = %self.shared.name,
                    ts = update.ts,
                    mode = ?plan.mode,
                    basis = ?plan.basis,
                    "applying remote update"
                );
                self.shared.surface.apply(plan.target, plan.mode);
                metrics::inc_sync_updates("applied");
            }
            Err(reason) => {
                trace!(channel = %self.shared.name, %reason, "remote update dropped");
                metrics::inc_sync_updates(reason.kind());
            }
        }
        result
    }

    fn schedule_flush(&self, due_at: Instant) {
        let mut inner = self.shared.lock();
        if let Some(timer) = &inner.flush {
            if timer.at <= due_at && !timer.handle.is_finished() {
                return;
            }
            timer.handle.abort();
        }
        let handle = tokio::spawn(run_flush(Arc::downgrade(&self.shared), due_at)).abort_handle();
        inner.flush = Some(FlushTimer { at: due_at, handle });
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.lock().flush.take() {
            timer.handle.abort();
        }
    }
}
