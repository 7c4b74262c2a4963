use serde::{Deserialize, Serialize};

use super::MessageId;

/// Announcement sent once, before any fragment of a transfer.
///
/// The receiver allocates reassembly state from the announcement; fragments
/// for identifiers it has not seen announced are dropped. `total_chunks` and
/// `total_size` are fixed for the lifetime of the transfer.
///
/// # Examples
///
/// ```
/// use tandem::fragment::{MessageId, TransferMetadata};
/// let meta = TransferMetadata::new(MessageId::new("m1"), 4, 20_000, 1_700_000_000_000);
/// let json = serde_json::to_string(&meta).expect("encode");
/// assert!(json.contains("\"totalChunks\":4"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferMetadata {
    message_id: MessageId,
    total_chunks: u32,
    total_size: usize,
    timestamp: u64,
}

impl TransferMetadata {
    /// Create a new announcement.
    #[must_use]
    pub fn new(message_id: MessageId, total_chunks: u32, total_size: usize, timestamp: u64) -> Self {
        Self {
            message_id,
            total_chunks,
            total_size,
            timestamp,
        }
    }

    /// Identifier shared with every fragment of the transfer.
    #[must_use]
    pub fn message_id(&self) -> &MessageId { &self.message_id }

    /// Number of fragments the sender will emit.
    #[must_use]
    pub const fn total_chunks(&self) -> u32 { self.total_chunks }

    /// Size in bytes of the serialized payload.
    #[must_use]
    pub const fn total_size(&self) -> usize { self.total_size }

    /// Sender wall-clock time, in epoch milliseconds.
    #[must_use]
    pub const fn timestamp(&self) -> u64 { self.timestamp }
}
