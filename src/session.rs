//! Composition root tying the engine's components to one signaling port.
//!
//! A [`SyncSession`] is built once per peer with [`SessionBuilder`]: every
//! transfer stream, sync channel and action name is registered up front so
//! inbound dispatch is a single lookup followed by an exhaustive `match` on
//! [`Route`]. Sessions share no global state, so several can run side by
//! side (for example both peers of a test).

use std::{collections::HashMap, sync::Arc};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    broadcast::{ActionBroadcaster, ActionKind, ActionMessage},
    clock::{Clock, SystemClock},
    config::EngineConfig,
    error::{Error, Result},
    fragment::{Fragment, MessageId, TransferMetadata},
    message::{Role, Route, Router},
    metrics::{self, Direction},
    port::{InboundMessage, SignalingPort},
    replicator::{
        ApplyPlan,
        ChannelContext,
        LocalOutcome,
        RejectedUpdate,
        SourceId,
        Surface,
        SyncChannel,
        SyncUpdate,
    },
    retry::send_with_retry,
    transfer::{AnnounceOutcome, ReceiveStatus, TransferCoordinator, TransferObserver},
};

/// What [`SyncSession::handle_inbound`] did with a message.
#[derive(Debug, PartialEq)]
pub enum Dispatched {
    /// A transfer announcement was processed.
    Announced {
        stream: String,
        outcome: AnnounceOutcome,
    },
    /// A transfer fragment was processed.
    Fragment {
        stream: String,
        status: ReceiveStatus,
    },
    /// A sync update was applied or dropped.
    Sync {
        channel: String,
        outcome: std::result::Result<ApplyPlan, RejectedUpdate>,
    },
    /// An action was delivered to `listeners` listeners.
    Action { action: ActionKind, listeners: usize },
    /// The message type is not registered on this session, or an action
    /// payload names a different action than its message type.
    Unrouted,
}

struct ChannelBinding {
    name: String,
    surface: Arc<dyn Surface>,
    source_id: SourceId,
}

/// Builder for [`SyncSession`].
pub struct SessionBuilder {
    role: Role,
    port: Arc<dyn SignalingPort>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    router: Router,
    streams: Vec<(String, Arc<dyn TransferObserver>)>,
    channels: Vec<ChannelBinding>,
}

impl SessionBuilder {
    /// Use `clock` for wire timestamps instead of the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the default configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind a chunked transfer stream reporting to `observer`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRoute`] if the stream's wire types are
    /// already registered.
    pub fn transfer_stream(
        mut self,
        stream: &str,
        observer: Arc<dyn TransferObserver>,
    ) -> Result<Self> {
        self.router.register_transfer(stream)?;
        self.streams.push((stream.to_owned(), observer));
        Ok(self)
    }

    /// Bind `surface` to the sync channel `name` under a fresh source
    /// identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRoute`] if the channel is already bound.
    pub fn sync_channel(self, name: &str, surface: Arc<dyn Surface>) -> Result<Self> {
        self.sync_channel_with_source(name, surface, SourceId::generate())
    }

    /// Bind `surface` to the sync channel `name` under `source_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRoute`] if the channel is already bound.
    pub fn sync_channel_with_source(
        mut self,
        name: &str,
        surface: Arc<dyn Surface>,
        source_id: SourceId,
    ) -> Result<Self> {
        self.router.register_sync(name)?;
        self.channels.push(ChannelBinding {
            name: name.to_owned(),
            surface,
            source_id,
        });
        Ok(self)
    }

    /// Accept inbound actions named `action`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRoute`] if the name is already registered.
    pub fn action(mut self, action: impl Into<ActionKind>) -> Result<Self> {
        self.router.register_action(action.into().as_str())?;
        Ok(self)
    }

    /// Finish construction.
    ///
    /// The fragmentation frame budget is lowered to the port's
    /// [`max_payload_bytes`](SignalingPort::max_payload_bytes) when that is
    /// smaller.
    #[must_use]
    pub fn build(self) -> SyncSession {
        let mut config = self.config;
        config.fragmentation.frame_budget = config
            .fragmentation
            .frame_budget
            .min(self.port.max_payload_bytes());
        let config = config.normalized();

        let transfers = self
            .streams
            .into_iter()
            .map(|(stream, observer)| {
                let coordinator = TransferCoordinator::new(
                    &stream,
                    Arc::clone(&self.port),
                    Arc::clone(&self.clock),
                    &config.fragmentation,
                    observer,
                );
                (stream, coordinator)
            })
            .collect();

        let context = ChannelContext {
            port: Arc::clone(&self.port),
            clock: Arc::clone(&self.clock),
            role: self.role,
            replication: config.replication,
            retry: config.retry,
        };
        let channels = self
            .channels
            .into_iter()
            .map(|binding| {
                let channel =
                    SyncChannel::new(&binding.name, binding.surface, binding.source_id, &context);
                (binding.name, channel)
            })
            .collect();

        SyncSession {
            role: self.role,
            port: self.port,
            clock: self.clock,
            config,
            router: self.router,
            broadcaster: ActionBroadcaster::new(self.role),
            transfers,
            channels,
        }
    }
}

/// One peer's view of a synchronization session.
pub struct SyncSession {
    role: Role,
    port: Arc<dyn SignalingPort>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    router: Router,
    broadcaster: ActionBroadcaster,
    transfers: HashMap<String, TransferCoordinator>,
    channels: HashMap<String, SyncChannel>,
}

impl SyncSession {
    /// Start building a session for the local peer playing `role`.
    #[must_use]
    pub fn builder(role: Role, port: Arc<dyn SignalingPort>) -> SessionBuilder {
        SessionBuilder {
            role,
            port,
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
            router: Router::new(),
            streams: Vec::new(),
            channels: Vec::new(),
        }
    }

    #[must_use]
    pub fn role(&self) -> Role { self.role }

    /// Effective (normalized) configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig { &self.config }

    #[must_use]
    pub fn router(&self) -> &Router { &self.router }

    /// Action registry; subscribe here.
    #[must_use]
    pub fn broadcaster(&self) -> &ActionBroadcaster { &self.broadcaster }

    /// Coordinator of the transfer stream `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStream`] if no such stream is bound.
    pub fn transfer(&self, stream: &str) -> Result<&TransferCoordinator> {
        self.transfers
            .get(stream)
            .ok_or_else(|| Error::UnknownStream(stream.to_owned()))
    }

    /// The sync channel `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownChannel`] if no such channel is bound.
    pub fn channel(&self, name: &str) -> Result<&SyncChannel> {
        self.channels
            .get(name)
            .ok_or_else(|| Error::UnknownChannel(name.to_owned()))
    }

    /// Send `payload` as a chunked transfer on `stream`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownStream`] or the [`Error::Transfer`] failure.
    pub async fn send_transfer<T: Serialize + ?Sized>(
        &self,
        stream: &str,
        payload: &T,
        cancel: &CancellationToken,
    ) -> Result<MessageId> {
        Ok(self.transfer(stream)?.send(payload, cancel).await?)
    }

    /// Report that the surface bound to `channel` moved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownChannel`] or the [`Error::Sync`] failure.
    pub async fn local_changed(&self, channel: &str) -> Result<LocalOutcome> {
        Ok(self.channel(channel)?.local_changed().await?)
    }

    /// Publish a discrete action to local listeners and the remote peer.
    ///
    /// Local listeners run first, synchronously; the returned count is how
    /// many were invoked. The send then follows the session retry policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if `data` cannot be serialized, or
    /// [`Error::Port`] with the final send error once retries are spent.
    pub async fn publish_action(&self, action: impl Into<ActionKind>, data: Value) -> Result<usize> {
        let message = ActionMessage::new(action.into(), self.role, data, self.clock.now_millis());
        let payload = serde_json::to_string(&message).map_err(Error::Encode)?;
        let listeners = self.broadcaster.deliver(&message);

        send_with_retry(
            &*self.port,
            &self.config.retry,
            message.action.as_str(),
            &payload,
        )
        .await
        .map_err(|exhausted| Error::Port(exhausted.last_error))?;
        debug!(action = %message.action, listeners, "action published");
        metrics::inc_actions(Direction::Outbound);
        Ok(listeners)
    }

    /// Route one inbound message to the component that owns its type.
    ///
    /// Messages of unregistered types are ignored. Expected steady-state
    /// drops (duplicate announcements, foreign fragments, echoed or stale
    /// sync updates) are reported in the [`Dispatched`] value, not as
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] when the payload does not match its type,
    /// and [`Error::Transfer`] when an announcement is refused or a
    /// completed transfer cannot be decoded.
    pub fn handle_inbound(&self, message: &InboundMessage) -> Result<Dispatched> {
        let Some(route) = self.router.classify(&message.message_type) else {
            trace!(message_type = %message.message_type, "unrouted message ignored");
            return Ok(Dispatched::Unrouted);
        };

        match route {
            Route::TransferMetadata { stream } => {
                let meta: TransferMetadata = decode(message)?;
                let outcome = self.transfer(stream)?.handle_metadata(&meta)?;
                Ok(Dispatched::Announced {
                    stream: stream.clone(),
                    outcome,
                })
            }
            Route::TransferFragment { stream } => {
                let fragment: Fragment = decode(message)?;
                let status = self.transfer(stream)?.handle_fragment(fragment)?;
                Ok(Dispatched::Fragment {
                    stream: stream.clone(),
                    status,
                })
            }
            Route::Sync { channel } => {
                let update: SyncUpdate = decode(message)?;
                let outcome = self.channel(channel)?.handle_remote(&update);
                Ok(Dispatched::Sync {
                    channel: channel.clone(),
                    outcome,
                })
            }
            Route::Action { action } => {
                let action_message: ActionMessage = decode(message)?;
                if action_message.action.as_str() != action.as_str() {
                    debug!(
                        message_type = %message.message_type,
                        action = %action_message.action,
                        "action name disagrees with message type; dropped"
                    );
                    return Ok(Dispatched::Unrouted);
                }
                let listeners = self.broadcaster.deliver(&action_message);
                metrics::inc_actions(Direction::Inbound);
                Ok(Dispatched::Action {
                    action: action_message.action,
                    listeners,
                })
            }
        }
    }

    /// Dispatch inbound messages until `inbound` closes or `shutdown` is
    /// cancelled.
    ///
    /// Per-message failures are logged and do not stop the loop.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<InboundMessage>,
        shutdown: CancellationToken,
    ) {
        loop {
            let message = tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            if let Err(error) = self.handle_inbound(&message) {
                warn!(message_type = %message.message_type, %error, "inbound message failed");
            }
        }
        debug!(role = %self.role, "session dispatch loop stopped");
    }
}

fn decode<T: DeserializeOwned>(message: &InboundMessage) -> Result<T> {
    serde_json::from_str(&message.payload).map_err(|source| Error::Decode {
        message_type: message.message_type.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::{
        fragment::FragmentationConfig,
        test_helpers::{ManualClock, RecordingPort, RecordingSurface},
    };

    const NOW: u64 = 1_700_000_000_000;

    fn session(role: Role, port: Arc<RecordingPort>) -> SyncSession {
        SyncSession::builder(role, port)
            .clock(Arc::new(ManualClock::new(NOW)))
            .transfer_stream("catalog", Arc::new(()))
            .and_then(|b| b.sync_channel("catalog-scroll", Arc::new(RecordingSurface::default())))
            .and_then(|b| b.action(ActionKind::TabChanged))
            .expect("valid session")
            .build()
    }

    #[rstest]
    #[case::metadata("catalog-metadata", r#"{"messageId":"m"}"#)]
    #[case::fragment("catalog", r#"{"messageId":"m"}"#)]
    #[case::sync("catalog-scroll-sync", "[]")]
    #[case::action("tab-changed", r#"{"action":"tab-changed"}"#)]
    fn malformed_payloads_are_decode_errors(#[case] message_type: &str, #[case] payload: &str) {
        let session = session(Role::Agent, Arc::new(RecordingPort::default()));
        let outcome = session.handle_inbound(&InboundMessage::new(message_type, payload));
        assert!(matches!(outcome, Err(Error::Decode { .. })));
    }

    #[test]
    fn unregistered_types_are_unrouted() {
        let session = session(Role::Agent, Arc::new(RecordingPort::default()));
        let outcome = session
            .handle_inbound(&InboundMessage::new("pointer-sync", "{}"))
            .expect("ignored");
        assert_eq!(outcome, Dispatched::Unrouted);
    }

    #[test]
    fn action_named_differently_from_its_type_is_dropped() {
        let session = session(Role::Agent, Arc::new(RecordingPort::default()));
        let calls = Arc::new(AtomicUsize::new(0));
        let _subs = [ActionKind::TabChanged, ActionKind::ModalOpened].map(|kind| {
            let seen = Arc::clone(&calls);
            session.broadcaster().subscribe(kind, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            })
        });

        let message = ActionMessage::new(ActionKind::ModalOpened, Role::Customer, json!(null), NOW);
        let payload = serde_json::to_string(&message).expect("encode");
        let outcome = session
            .handle_inbound(&InboundMessage::new("tab-changed", payload))
            .expect("dispatch");
        assert_eq!(outcome, Dispatched::Unrouted);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn duplicate_registration_fails_at_build_time() {
        let result = SyncSession::builder(Role::Agent, Arc::new(RecordingPort::default()))
            .transfer_stream("catalog", Arc::new(()))
            .and_then(|b| b.action(ActionKind::Custom("catalog".into())));
        assert!(matches!(result, Err(Error::DuplicateRoute(_))));
    }

    #[test]
    fn frame_budget_follows_the_port_limit() {
        let session = session(Role::Agent, Arc::new(RecordingPort::new(4_000)));
        assert!(FragmentationConfig::default().frame_budget > 4_000);
        assert_eq!(session.config().fragmentation.frame_budget, 4_000);
    }

    #[test]
    fn unknown_names_are_reported() {
        let session = session(Role::Agent, Arc::new(RecordingPort::default()));
        assert!(matches!(session.transfer("orders"), Err(Error::UnknownStream(_))));
        assert!(matches!(session.channel("pointer"), Err(Error::UnknownChannel(_))));
    }

    #[tokio::test]
    async fn published_actions_reach_local_listeners_and_the_port() {
        let port = Arc::new(RecordingPort::default());
        let session = session(Role::Agent, port.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let _sub = session
            .broadcaster()
            .subscribe(ActionKind::TabChanged, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });

        let listeners = session
            .publish_action(ActionKind::TabChanged, json!({"tab": "billing"}))
            .await
            .expect("publish");
        assert_eq!(listeners, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let sent = port.payloads_of("tab-changed");
        assert_eq!(sent.len(), 1);
        let message: ActionMessage = serde_json::from_str(&sent[0]).expect("decode");
        assert_eq!(message.user_type, Role::Agent);
        assert_eq!(message.timestamp, NOW);
    }

    #[tokio::test]
    async fn inbound_actions_skip_listeners_filtering_own_role() {
        let session = session(Role::Agent, Arc::new(RecordingPort::default()));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let _sub = session
            .broadcaster()
            .subscribe_remote(ActionKind::TabChanged, move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });

        for role in [Role::Agent, Role::Customer] {
            let message = ActionMessage::new(ActionKind::TabChanged, role, json!(null), NOW);
            let payload = serde_json::to_string(&message).expect("encode");
            session
                .handle_inbound(&InboundMessage::new("tab-changed", payload))
                .expect("dispatch");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
