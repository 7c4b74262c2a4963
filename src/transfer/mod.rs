//! Chunked transfer of payloads too large for a single channel message.
//!
//! A transfer is an announcement (`<stream>-metadata`) followed by ordered
//! fragments (`<stream>`). The outbound half lives in [`TransferSender`];
//! the inbound half in [`TransferReceiver`] over the clock-free
//! [`Reassembler`]. [`TransferCoordinator`] pairs both for one stream.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

mod error;
mod observer;
mod progress;
mod reassembler;
mod receiver;
mod sender;

pub use error::TransferError;
pub use observer::{TransferEvent, TransferObserver};
pub use progress::Progress;
pub use reassembler::{
    AnnounceOutcome,
    DropReason,
    FragmentOutcome,
    ReassembledMessage,
    Reassembler,
};
pub use receiver::{ReceiveStatus, TransferReceiver};
pub use sender::{SendState, TransferSender};

use crate::{
    clock::Clock,
    fragment::{Fragment, FragmentationConfig, MessageId, TransferMetadata},
    port::SignalingPort,
};

/// Both halves of a named transfer stream.
pub struct TransferCoordinator {
    sender: TransferSender,
    receiver: TransferReceiver,
}

impl TransferCoordinator {
    /// Create a coordinator for `stream`.
    ///
    /// The observer receives notifications for both directions.
    #[must_use]
    pub fn new(
        stream: &str,
        port: Arc<dyn SignalingPort>,
        clock: Arc<dyn Clock>,
        config: &FragmentationConfig,
        observer: Arc<dyn TransferObserver>,
    ) -> Self {
        let config = config.normalized();
        Self {
            sender: TransferSender::new(stream, port, clock, &config, Arc::clone(&observer)),
            receiver: TransferReceiver::new(stream, &config, observer),
        }
    }

    /// Stream name shared by both halves.
    #[must_use]
    pub fn stream(&self) -> &str { self.sender.stream() }

    /// Outbound half.
    #[must_use]
    pub fn sender(&self) -> &TransferSender { &self.sender }

    /// Inbound half.
    #[must_use]
    pub fn receiver(&self) -> &TransferReceiver { &self.receiver }

    /// See [`TransferSender::send`].
    ///
    /// # Errors
    ///
    /// See [`TransferSender::send_with_id`].
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        cancel: &CancellationToken,
    ) -> Result<MessageId, TransferError> {
        self.sender.send(payload, cancel).await
    }

    /// See [`TransferReceiver::handle_metadata`].
    ///
    /// # Errors
    ///
    /// Returns the announcement rejection.
    pub fn handle_metadata(&self, meta: &TransferMetadata) -> Result<AnnounceOutcome, TransferError> {
        self.receiver.handle_metadata(meta)
    }

    /// See [`TransferReceiver::handle_fragment`].
    ///
    /// # Errors
    ///
    /// Returns the reassembly failure of a completed transfer.
    pub fn handle_fragment(&self, fragment: Fragment) -> Result<ReceiveStatus, TransferError> {
        self.receiver.handle_fragment(fragment)
    }
}
