//! Fragment codec for payloads larger than one signaling message.
//!
//! This module collects the pure, transport-agnostic half of chunked
//! transfers: identifiers, the wire shapes of announcements and fragments,
//! splitting, and joining. Each sub-module focuses on a single concept; the
//! stateful coordination lives in [`crate::transfer`].

pub mod config;
pub mod error;
pub mod fragmenter;
pub mod header;
pub mod id;
pub mod index;
pub mod payload;

pub use config::FragmentationConfig;
pub use error::{FragmentationError, JoinError};
pub use fragmenter::{Fragment, FragmentBatch, Fragmenter, MAX_MESSAGE_ID_LEN};
pub use header::TransferMetadata;
pub use id::MessageId;
pub use index::FragmentIndex;
pub use payload::{join, join_slots};
