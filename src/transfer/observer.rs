//! Callbacks through which transfers report progress and outcomes.

use tokio::sync::mpsc;

use super::{Progress, ReassembledMessage, TransferError};
use crate::fragment::MessageId;

/// Receives transfer lifecycle notifications.
///
/// Every method has a no-op default so implementations override only what
/// they display. Methods run on the task driving the transfer and must not
/// block. For any one transfer exactly one of `on_sent`, `on_received`, or
/// `on_failed` fires.
pub trait TransferObserver: Send + Sync + 'static {
    /// A fragment was sent (outbound) or newly stored (inbound).
    fn on_progress(&self, _message_id: &MessageId, _progress: Progress) {}

    /// The final outbound fragment was accepted by the channel.
    fn on_sent(&self, _message_id: &MessageId) {}

    /// An inbound transfer was reassembled.
    fn on_received(&self, _message: ReassembledMessage) {}

    /// The transfer ended without completing.
    fn on_failed(&self, _message_id: &MessageId, _error: &TransferError) {}
}

impl TransferObserver for () {}

/// Transfer notifications as values, for hosts that prefer a channel.
#[derive(Clone, Debug, PartialEq)]
pub enum TransferEvent {
    /// See [`TransferObserver::on_progress`].
    Progress {
        message_id: MessageId,
        progress: Progress,
    },
    /// See [`TransferObserver::on_sent`].
    Sent { message_id: MessageId },
    /// See [`TransferObserver::on_received`].
    Received(ReassembledMessage),
    /// See [`TransferObserver::on_failed`].
    Failed {
        message_id: MessageId,
        error: TransferError,
    },
}

impl TransferObserver for mpsc::UnboundedSender<TransferEvent> {
    fn on_progress(&self, message_id: &MessageId, progress: Progress) {
        let _ = self.send(TransferEvent::Progress {
            message_id: message_id.clone(),
            progress,
        });
    }

    fn on_sent(&self, message_id: &MessageId) {
        let _ = self.send(TransferEvent::Sent {
            message_id: message_id.clone(),
        });
    }

    fn on_received(&self, message: ReassembledMessage) {
        let _ = self.send(TransferEvent::Received(message));
    }

    fn on_failed(&self, message_id: &MessageId, error: &TransferError) {
        let _ = self.send(TransferEvent::Failed {
            message_id: message_id.clone(),
            error: error.clone(),
        });
    }
}
