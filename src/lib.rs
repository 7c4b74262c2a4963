#![doc(html_root_url = "https://docs.rs/tandem/latest")]
//! Public API for the `tandem` library.
//!
//! `tandem` keeps two remote peers looking at the same application state
//! over a narrow, size-limited, unordered signaling channel. It provides
//! chunked transfer of payloads larger than one channel message, adaptive
//! replication of continuous state such as scroll positions, and pub/sub for
//! discrete actions, all composed by a [`SyncSession`].

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod error;
pub mod fragment;
pub mod message;
pub mod metrics;
pub mod port;
pub mod replicator;
pub mod retry;
pub mod session;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;
pub mod transfer;

pub use broadcast::{ActionBroadcaster, ActionKind, ActionMessage, Subscription};
pub use clock::{Clock, SystemClock};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use fragment::{
    Fragment,
    FragmentBatch,
    FragmentIndex,
    FragmentationConfig,
    FragmentationError,
    Fragmenter,
    MessageId,
    TransferMetadata,
    join,
};
pub use message::{Role, Route, Router};
pub use metrics::{ACTIONS_TOTAL, Direction, FRAGMENTS_TOTAL, SYNC_UPDATES_TOTAL, TRANSFERS_TOTAL};
pub use port::{InboundMessage, PortError, SignalingPort};
pub use replicator::{
    ApplyMode,
    ChannelState,
    Extent,
    Position,
    RejectedUpdate,
    ReplicationConfig,
    SourceId,
    Surface,
    SyncChannel,
    SyncError,
    SyncUpdate,
};
pub use retry::RetryPolicy;
pub use session::{Dispatched, SessionBuilder, SyncSession};
pub use transfer::{
    Progress,
    ReassembledMessage,
    TransferCoordinator,
    TransferError,
    TransferEvent,
    TransferObserver,
};
