#![cfg(any(test, feature = "test-helpers"))]
//! Test doubles shared by unit tests and the `tandem_testing` crate.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    clock::Clock,
    port::{InboundMessage, PortError, SignalingPort, check_payload_size},
    replicator::{ApplyMode, Extent, Position, Surface, SurfaceSnapshot},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`SignalingPort`] that records every accepted message.
///
/// Failures queued with [`RecordingPort::fail_next`] are returned, in order,
/// by the next sends instead of recording them.
#[derive(Debug)]
pub struct RecordingPort {
    limit: usize,
    sent: Mutex<Vec<InboundMessage>>,
    failures: Mutex<VecDeque<PortError>>,
}

impl RecordingPort {
    /// Create a port accepting payloads of at most `limit` bytes.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Make the next unfailed send return `error`.
    pub fn fail_next(&self, error: PortError) { lock(&self.failures).push_back(error); }

    /// Everything accepted so far, in send order.
    #[must_use]
    pub fn sent(&self) -> Vec<InboundMessage> { lock(&self.sent).clone() }

    /// Payloads accepted under `message_type`, in send order.
    #[must_use]
    pub fn payloads_of(&self, message_type: &str) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .filter(|message| message.message_type == message_type)
            .map(|message| message.payload.clone())
            .collect()
    }

    /// Remove and return everything accepted so far.
    pub fn drain(&self) -> Vec<InboundMessage> { std::mem::take(&mut *lock(&self.sent)) }
}

impl Default for RecordingPort {
    fn default() -> Self { Self::new(crate::fragment::FragmentationConfig::default().frame_budget) }
}

#[async_trait]
impl SignalingPort for RecordingPort {
    fn max_payload_bytes(&self) -> usize { self.limit }

    async fn send(&self, message_type: &str, payload: String) -> Result<(), PortError> {
        check_payload_size(&payload, self.limit)?;
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        lock(&self.sent).push(InboundMessage::new(message_type, payload));
        Ok(())
    }
}

/// [`Clock`] whose time only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading `now` epoch milliseconds.
    #[must_use]
    pub fn new(now: u64) -> Self { Self { now: AtomicU64::new(now) } }

    /// Jump to `now`.
    pub fn set(&self, now: u64) { self.now.store(now, Ordering::SeqCst); }

    /// Move forward by `millis`.
    pub fn advance(&self, millis: u64) { self.now.fetch_add(millis, Ordering::SeqCst); }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 { self.now.load(Ordering::SeqCst) }
}

/// [`Surface`] with settable state that records every applied position.
///
/// Applying a position also moves the surface there, as a real view would.
#[derive(Debug)]
pub struct RecordingSurface {
    state: Mutex<SurfaceSnapshot>,
    applied: Mutex<Vec<(Position, ApplyMode)>>,
}

impl RecordingSurface {
    /// A ready surface of the given extent, scrolled to the top.
    #[must_use]
    pub fn new(extent: Extent) -> Self {
        Self {
            state: Mutex::new(SurfaceSnapshot {
                ready: true,
                extent,
                position: Position::default(),
            }),
            applied: Mutex::new(Vec::new()),
        }
    }

    /// Mark the surface (not) ready.
    pub fn set_ready(&self, ready: bool) { lock(&self.state).ready = ready; }

    /// Change the surface extent.
    pub fn set_extent(&self, extent: Extent) { lock(&self.state).extent = extent; }

    /// Move to the given vertical fraction, as a user scroll would.
    pub fn scroll_to(&self, percent_y: f64) {
        let mut state = lock(&self.state);
        state.position = Position::from_fractions(state.position.percent_x, percent_y, state.extent);
    }

    /// Every position applied so far, in order.
    #[must_use]
    pub fn applied(&self) -> Vec<(Position, ApplyMode)> { lock(&self.applied).clone() }
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self::new(Extent {
            scroll_height: 2_000.0,
            client_height: 800.0,
        })
    }
}

impl Surface for RecordingSurface {
    fn is_ready(&self) -> bool { lock(&self.state).ready }

    fn extent(&self) -> Extent { lock(&self.state).extent }

    fn position(&self) -> Position { lock(&self.state).position }

    fn apply(&self, target: Position, mode: ApplyMode) {
        lock(&self.state).position = target;
        lock(&self.applied).push((target, mode));
    }

    fn snapshot(&self) -> SurfaceSnapshot { *lock(&self.state) }
}
