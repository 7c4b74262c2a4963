//! In-memory signaling channel connecting two peers.
//!
//! Each [`MemoryPort`] delivers what it sends to the other end's inbound
//! queue. The port enforces its payload limit like a real provider and can be
//! told to fail, lose, or hold back messages so tests can reproduce the
//! channel's best-effort, unordered behaviour deterministically.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tandem::port::{InboundMessage, PortError, SignalingPort, check_payload_size};
use tokio::sync::mpsc;

/// Capacity of each direction's inbound queue.
pub const QUEUE_CAPACITY: usize = 1_024;

#[derive(Default)]
struct Faults {
    fail: VecDeque<PortError>,
    lose: usize,
    held: Option<Vec<InboundMessage>>,
}

enum Fate {
    Fail(PortError),
    Lose,
    Hold,
    Deliver,
}

/// One end of an in-memory signaling channel.
pub struct MemoryPort {
    limit: usize,
    peer: mpsc::Sender<InboundMessage>,
    faults: Mutex<Faults>,
    delivered: AtomicUsize,
}

/// A port together with the queue of messages sent to it by the other end.
pub struct PortEnd {
    pub port: Arc<MemoryPort>,
    pub inbound: mpsc::Receiver<InboundMessage>,
}

impl MemoryPort {
    /// Create two connected ends, each accepting payloads of at most `limit`
    /// bytes.
    #[must_use]
    pub fn pair(limit: usize) -> (PortEnd, PortEnd) {
        let (to_b, inbound_b) = mpsc::channel(QUEUE_CAPACITY);
        let (to_a, inbound_a) = mpsc::channel(QUEUE_CAPACITY);
        let a = PortEnd {
            port: Arc::new(Self::new(limit, to_b)),
            inbound: inbound_a,
        };
        let b = PortEnd {
            port: Arc::new(Self::new(limit, to_a)),
            inbound: inbound_b,
        };
        (a, b)
    }

    fn new(limit: usize, peer: mpsc::Sender<InboundMessage>) -> Self {
        Self {
            limit,
            peer,
            faults: Mutex::new(Faults::default()),
            delivered: AtomicUsize::new(0),
        }
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next send fail with `error`. Calls queue up.
    pub fn fail_next(&self, error: PortError) { self.faults().fail.push_back(error); }

    /// Silently lose the next `count` accepted messages.
    pub fn lose_next(&self, count: usize) { self.faults().lose += count; }

    /// Accept but hold back every message until [`MemoryPort::release`].
    pub fn hold(&self) { self.faults().held.get_or_insert_with(Vec::new); }

    /// Deliver held messages in the order produced by `reorder`, then stop
    /// holding.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::Closed`] if the other end has gone away.
    pub async fn release<F>(&self, reorder: F) -> Result<(), PortError>
    where
        F: FnOnce(&mut Vec<InboundMessage>),
    {
        let mut held = self.faults().held.take().unwrap_or_default();
        reorder(&mut held);
        for message in held {
            self.deliver(message).await?;
        }
        Ok(())
    }

    /// Messages handed to the other end so far.
    #[must_use]
    pub fn delivered(&self) -> usize { self.delivered.load(Ordering::SeqCst) }

    async fn deliver(&self, message: InboundMessage) -> Result<(), PortError> {
        self.peer
            .send(message)
            .await
            .map_err(|_| PortError::Closed)?;
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SignalingPort for MemoryPort {
    fn max_payload_bytes(&self) -> usize { self.limit }

    async fn send(&self, message_type: &str, payload: String) -> Result<(), PortError> {
        check_payload_size(&payload, self.limit)?;
        let message = InboundMessage::new(message_type, payload);
        let fate = {
            let mut faults = self.faults();
            if let Some(error) = faults.fail.pop_front() {
                Fate::Fail(error)
            } else if faults.lose > 0 {
                faults.lose -= 1;
                Fate::Lose
            } else if let Some(held) = faults.held.as_mut() {
                held.push(message.clone());
                Fate::Hold
            } else {
                Fate::Deliver
            }
        };
        match fate {
            Fate::Fail(error) => Err(error),
            Fate::Lose | Fate::Hold => Ok(()),
            Fate::Deliver => self.deliver(message).await,
        }
    }
}
