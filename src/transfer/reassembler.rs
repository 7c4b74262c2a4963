//! Inbound state that stitches fragments back into complete payloads.
//!
//! [`Reassembler`] mirrors the outbound [`Fragmenter`](crate::fragment::Fragmenter)
//! by collecting fragment slices keyed by [`MessageId`]. Reassembly state is
//! created only by an announcement, slots are filled by explicit index so
//! arrival order does not matter, and re-delivered fragments overwrite their
//! slot without counting twice. Slots are stored sparsely, so an
//! announcement reserves nothing until its fragments arrive. The type is clock-free; timeouts are driven
//! by [`TransferReceiver`](crate::transfer::TransferReceiver).

use std::collections::{BTreeMap, HashMap, hash_map::Entry};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Progress, TransferError};
use crate::fragment::{Fragment, JoinError, MessageId, TransferMetadata, join_slots};

#[derive(Debug)]
struct PendingTransfer {
    total: u32,
    total_size: usize,
    slots: BTreeMap<u32, String>,
}

impl PendingTransfer {
    fn new(meta: &TransferMetadata) -> Self {
        Self {
            total: meta.total_chunks(),
            total_size: meta.total_size(),
            slots: BTreeMap::new(),
        }
    }

    fn received(&self) -> u32 { u32::try_from(self.slots.len()).unwrap_or(u32::MAX) }

    fn progress(&self) -> Progress { Progress::new(self.received(), self.total) }

    fn is_complete(&self) -> bool { self.received() == self.total }
}

/// Most fragments a payload of `total_size` bytes can be split into.
///
/// The slicer packs greedily with room for at least two escaped
/// characters, so every fragment but the last carries two or more bytes.
fn max_chunks_for(total_size: usize) -> usize { total_size.div_ceil(2).max(1) }

/// Container for a fully reassembled payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ReassembledMessage {
    message_id: MessageId,
    payload: Value,
}

impl ReassembledMessage {
    /// Construct a new [`ReassembledMessage`].
    #[must_use]
    pub fn new(message_id: MessageId, payload: Value) -> Self {
        Self {
            message_id,
            payload,
        }
    }

    /// Identifier shared by the fragments that formed this payload.
    #[must_use]
    pub fn message_id(&self) -> &MessageId { &self.message_id }

    /// Borrow the parsed payload.
    #[must_use]
    pub fn payload(&self) -> &Value { &self.payload }

    /// Consume the message, returning the parsed payload.
    #[must_use]
    pub fn into_payload(self) -> Value { self.payload }

    /// Decode the payload into a strongly typed value.
    ///
    /// # Errors
    ///
    /// Returns any [`serde_json::Error`] raised while deserializing.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }
}

/// Result of feeding an announcement to the [`Reassembler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// A new transfer record was allocated.
    Accepted,
    /// The transfer was already known; the announcement was ignored.
    Duplicate,
}

/// Why a fragment was dropped without affecting any transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// No announcement is on record for the fragment's transfer.
    UnknownTransfer,
    /// The fragment's total disagrees with the announcement.
    TotalMismatch { announced: u32, found: u32 },
    /// The fragment's index lies outside the announced range.
    IndexOutOfRange,
    /// The declared slice size disagrees with the carried slice.
    SizeMismatch,
}

/// Result of feeding a fragment to the [`Reassembler`].
#[derive(Clone, Debug, PartialEq)]
pub enum FragmentOutcome {
    /// The fragment was ignored.
    Dropped(DropReason),
    /// The fragment filled a new slot; more are required.
    Progress(Progress),
    /// The fragment re-filled an already filled slot.
    Duplicate(Progress),
    /// The fragment completed the transfer.
    Complete(ReassembledMessage),
}

/// Stateful fragment reassembler keyed by [`MessageId`].
#[derive(Debug)]
pub struct Reassembler {
    max_message_size: usize,
    max_pending: usize,
    transfers: HashMap<MessageId, PendingTransfer>,
}

impl Reassembler {
    /// Create a reassembler refusing announcements above `max_message_size`
    /// bytes, holding at most `max_pending` transfers at once.
    #[must_use]
    pub fn new(max_message_size: usize, max_pending: usize) -> Self {
        Self {
            max_message_size,
            max_pending,
            transfers: HashMap::new(),
        }
    }

    /// Record an announcement.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::MessageTooLarge`] when the declared size
    /// exceeds the cap, [`TransferError::MalformedPayload`] when the
    /// declared fragment count is zero or could not possibly fit the
    /// declared size, or [`TransferError::TooManyPending`] when the pending
    /// limit is already reached.
    pub fn announce(&mut self, meta: &TransferMetadata) -> Result<AnnounceOutcome, TransferError> {
        let message_id = meta.message_id();
        if self.transfers.contains_key(message_id) {
            return Ok(AnnounceOutcome::Duplicate);
        }
        if meta.total_size() > self.max_message_size {
            return Err(TransferError::MessageTooLarge {
                message_id: message_id.clone(),
                declared: meta.total_size(),
                limit: self.max_message_size,
            });
        }
        let chunks = meta.total_chunks() as usize;
        if chunks == 0 || chunks > max_chunks_for(meta.total_size()) {
            return Err(TransferError::MalformedPayload {
                message_id: message_id.clone(),
                reason: format!(
                    "{} fragments cannot carry {} bytes",
                    meta.total_chunks(),
                    meta.total_size()
                ),
            });
        }
        if self.transfers.len() >= self.max_pending {
            return Err(TransferError::TooManyPending {
                message_id: message_id.clone(),
                limit: self.max_pending,
            });
        }

        self.transfers
            .insert(message_id.clone(), PendingTransfer::new(meta));
        Ok(AnnounceOutcome::Accepted)
    }

    /// Store a fragment.
    ///
    /// Fragments for unknown transfers, or that contradict their
    /// announcement, are dropped and reported as
    /// [`FragmentOutcome::Dropped`]. When the last missing slot is filled the
    /// transfer record is destroyed and the payload returned.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::MalformedPayload`] when the joined text does
    /// not parse or its length contradicts the announcement. The transfer
    /// record is destroyed in that case too.
    pub fn accept(&mut self, fragment: Fragment) -> Result<FragmentOutcome, TransferError> {
        let Entry::Occupied(mut entry) = self.transfers.entry(fragment.message_id().clone()) else {
            return Ok(FragmentOutcome::Dropped(DropReason::UnknownTransfer));
        };

        let pending = entry.get_mut();
        if fragment.total_chunks() != pending.total {
            return Ok(FragmentOutcome::Dropped(DropReason::TotalMismatch {
                announced: pending.total,
                found: fragment.total_chunks(),
            }));
        }
        if !fragment.is_consistent() {
            return Ok(FragmentOutcome::Dropped(DropReason::SizeMismatch));
        }
        let index = fragment.index();
        if !index.is_within(pending.total) {
            return Ok(FragmentOutcome::Dropped(DropReason::IndexOutOfRange));
        }

        if pending
            .slots
            .insert(index.get(), fragment.into_data())
            .is_some()
        {
            return Ok(FragmentOutcome::Duplicate(pending.progress()));
        }
        if !pending.is_complete() {
            return Ok(FragmentOutcome::Progress(pending.progress()));
        }

        let (message_id, pending) = entry.remove_entry();
        Self::finish(message_id, &pending).map(FragmentOutcome::Complete)
    }

    /// Destroy the record for `message_id`, returning its final progress if
    /// it was still pending.
    pub fn expire(&mut self, message_id: &MessageId) -> Option<Progress> {
        self.transfers
            .remove(message_id)
            .map(|pending| pending.progress())
    }

    /// Fragments stored so far for `message_id`.
    #[must_use]
    pub fn received_count(&self, message_id: &MessageId) -> Option<u32> {
        self.transfers.get(message_id).map(PendingTransfer::received)
    }

    /// Whether a transfer is pending for `message_id`.
    #[must_use]
    pub fn contains(&self, message_id: &MessageId) -> bool { self.transfers.contains_key(message_id) }

    /// Number of transfers currently pending.
    #[must_use]
    pub fn pending_len(&self) -> usize { self.transfers.len() }

    fn finish(
        message_id: MessageId,
        pending: &PendingTransfer,
    ) -> Result<ReassembledMessage, TransferError> {
        let text = join_slots(pending.total, &pending.slots).map_err(|err| match err {
            JoinError::Incomplete { missing } => TransferError::IncompleteTransfer {
                message_id: message_id.clone(),
                missing,
            },
            other => TransferError::MalformedPayload {
                message_id: message_id.clone(),
                reason: other.to_string(),
            },
        })?;
        if text.len() != pending.total_size {
            return Err(TransferError::MalformedPayload {
                message_id,
                reason: format!(
                    "announced {} bytes, reassembled {}",
                    pending.total_size,
                    text.len()
                ),
            });
        }
        match serde_json::from_str(&text) {
            Ok(payload) => Ok(ReassembledMessage::new(message_id, payload)),
            Err(err) => Err(TransferError::MalformedPayload {
                message_id,
                reason: err.to_string(),
            }),
        }
    }
}
