//! Two sessions wired back to back over a [`MemoryPort`] pair.

use std::sync::Arc;

use tandem::{
    message::Role,
    session::{SessionBuilder, SyncSession},
};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{ManualClock, MemoryPort};

/// Default per-message limit of the in-memory channel.
pub const CHANNEL_LIMIT: usize = 6_000;

/// A running session and the handles tests need to poke at it.
pub struct Peer {
    pub session: Arc<SyncSession>,
    pub port: Arc<MemoryPort>,
    dispatch: JoinHandle<()>,
}

impl Peer {
    /// Role played by this peer.
    #[must_use]
    pub fn role(&self) -> Role { self.session.role() }
}

/// Agent and customer sessions sharing one clock.
pub struct PeerPair {
    pub agent: Peer,
    pub customer: Peer,
    pub clock: Arc<ManualClock>,
    shutdown: CancellationToken,
}

impl PeerPair {
    /// Build both peers with `configure` applied to each builder and start
    /// their dispatch loops.
    ///
    /// # Errors
    ///
    /// Returns the first registration error raised by `configure`.
    pub fn start<F>(now: u64, configure: F) -> tandem::Result<Self>
    where
        F: Fn(SessionBuilder, Role) -> tandem::Result<SessionBuilder>,
    {
        let (agent_end, customer_end) = MemoryPort::pair(CHANNEL_LIMIT);
        let clock = Arc::new(ManualClock::new(now));
        let shutdown = CancellationToken::new();

        let spawn = |role: Role, end: crate::PortEnd| -> tandem::Result<Peer> {
            let builder = SyncSession::builder(role, end.port.clone()).clock(clock.clone());
            let session = Arc::new(configure(builder, role)?.build());
            let dispatch = spawn_dispatch(Arc::clone(&session), end.inbound, shutdown.clone());
            Ok(Peer {
                session,
                port: end.port,
                dispatch,
            })
        };
        let agent = spawn(Role::Agent, agent_end)?;
        let customer = spawn(Role::Customer, customer_end)?;
        Ok(Self {
            agent,
            customer,
            clock,
            shutdown,
        })
    }

    /// Stop both dispatch loops and wait for them to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        let _ = self.agent.dispatch.await;
        let _ = self.customer.dispatch.await;
    }
}

/// Run `session`'s dispatch loop on a new task.
pub fn spawn_dispatch(
    session: Arc<SyncSession>,
    inbound: mpsc::Receiver<tandem::port::InboundMessage>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move { session.run(inbound, shutdown).await })
}

/// Yield until `condition` holds, at most `spins` times.
pub async fn settle<F: Fn() -> bool>(condition: F, spins: usize) -> bool {
    for _ in 0..spins {
        if condition() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    condition()
}
