//! Outbound helper that splits payloads into wire fragments.
//!
//! [`Fragmenter`] serializes a payload to JSON text and cuts it into slices
//! sized so each encoded [`Fragment`] fits the channel's frame budget. The
//! first step of every transfer, the [`TransferMetadata`] announcement, is
//! derived from the resulting [`FragmentBatch`].

use serde::{Deserialize, Serialize};

use super::{
    FragmentIndex,
    FragmentationConfig,
    FragmentationError,
    MessageId,
    TransferMetadata,
    payload::{escaped_len, slice_escaped},
};

/// Longest message identifier accepted, in bytes. Keeps the identifier well
/// inside the per-fragment metadata reserve.
pub const MAX_MESSAGE_ID_LEN: usize = 128;

/// One bounded slice of a serialized payload, as carried on the wire.
///
/// Serializes as
/// `{ messageId, chunkIndex, totalChunks, isLast, data, size }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    message_id: MessageId,
    #[serde(rename = "chunkIndex")]
    index: FragmentIndex,
    total_chunks: u32,
    is_last: bool,
    data: String,
    size: usize,
}

impl Fragment {
    /// Construct a fragment; `size` is taken from `data`.
    #[must_use]
    pub fn new(message_id: MessageId, index: FragmentIndex, total_chunks: u32, data: String) -> Self {
        let is_last = index.get().saturating_add(1) == total_chunks;
        let size = data.len();
        Self {
            message_id,
            index,
            total_chunks,
            is_last,
            data,
            size,
        }
    }

    /// Identifier of the transfer this fragment belongs to.
    #[must_use]
    pub fn message_id(&self) -> &MessageId { &self.message_id }

    /// Position of the fragment within the transfer.
    #[must_use]
    pub const fn index(&self) -> FragmentIndex { self.index }

    /// Total fragments in the transfer.
    #[must_use]
    pub const fn total_chunks(&self) -> u32 { self.total_chunks }

    /// Whether this is the final fragment.
    #[must_use]
    pub const fn is_last(&self) -> bool { self.is_last }

    /// The payload slice.
    #[must_use]
    pub fn data(&self) -> &str { self.data.as_str() }

    /// Declared slice length in bytes.
    #[must_use]
    pub const fn size(&self) -> usize { self.size }

    /// Whether the declared size matches the carried slice.
    #[must_use]
    pub fn is_consistent(&self) -> bool { self.size == self.data.len() }

    /// Consume the fragment, returning the slice.
    #[must_use]
    pub fn into_data(self) -> String { self.data }
}

/// All fragments produced for one payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentBatch {
    message_id: MessageId,
    total_size: usize,
    fragments: Vec<Fragment>,
}

impl FragmentBatch {
    fn new(message_id: MessageId, total_size: usize, fragments: Vec<Fragment>) -> Self {
        debug_assert!(!fragments.is_empty(), "fragment batches must not be empty");
        Self {
            message_id,
            total_size,
            fragments,
        }
    }

    /// Identifier shared by all fragments.
    #[must_use]
    pub fn message_id(&self) -> &MessageId { &self.message_id }

    /// Size in bytes of the serialized payload.
    #[must_use]
    pub const fn total_size(&self) -> usize { self.total_size }

    /// The fragments in index order.
    #[must_use]
    pub fn fragments(&self) -> &[Fragment] { self.fragments.as_slice() }

    /// Number of fragments in the batch.
    #[expect(
        clippy::len_without_is_empty,
        reason = "batches are guaranteed non-empty"
    )]
    #[must_use]
    pub fn len(&self) -> usize { self.fragments.len() }

    /// Whether the payload needed more than one fragment.
    #[must_use]
    pub fn is_fragmented(&self) -> bool { self.len() > 1 }

    /// Build the announcement for this batch.
    #[must_use]
    pub fn metadata(&self, timestamp: u64) -> TransferMetadata {
        let total = self
            .fragments
            .first()
            .map_or(0, Fragment::total_chunks);
        TransferMetadata::new(self.message_id.clone(), total, self.total_size, timestamp)
    }

    /// Consume the batch, returning all fragments.
    #[must_use]
    pub fn into_fragments(self) -> Vec<Fragment> { self.fragments }
}

impl IntoIterator for FragmentBatch {
    type Item = Fragment;
    type IntoIter = std::vec::IntoIter<Fragment>;

    fn into_iter(self) -> Self::IntoIter { self.fragments.into_iter() }
}

/// Splits payloads into fragment-sized slices.
#[derive(Clone, Copy, Debug)]
pub struct Fragmenter {
    slice_capacity: usize,
}

impl Fragmenter {
    /// Create a fragmenter that caps each slice at `slice_capacity` escaped
    /// bytes.
    #[must_use]
    pub const fn new(slice_capacity: usize) -> Self { Self { slice_capacity } }

    /// Create a fragmenter whose fragments fit `config.frame_budget`.
    #[must_use]
    pub fn from_config(config: &FragmentationConfig) -> Self { Self::new(config.slice_capacity()) }

    /// Escaped bytes each slice may carry.
    #[must_use]
    pub const fn slice_capacity(&self) -> usize { self.slice_capacity }

    /// Serialize `payload` as JSON and split it into fragments.
    ///
    /// A payload whose serialized form fits one slice yields a single
    /// fragment with `total_chunks == 1`.
    ///
    /// # Errors
    ///
    /// Returns [`FragmentationError::Encode`] if serialization fails, plus the
    /// errors of [`Fragmenter::split_serialized`].
    pub fn split<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        message_id: MessageId,
    ) -> Result<FragmentBatch, FragmentationError> {
        let serialized = serde_json::to_string(payload)?;
        self.split_serialized(&serialized, message_id)
    }

    /// Split already-serialized JSON text into fragments.
    ///
    /// # Errors
    ///
    /// Returns [`FragmentationError::MessageIdTooLong`] when the identifier
    /// exceeds [`MAX_MESSAGE_ID_LEN`], or
    /// [`FragmentationError::IndexOverflow`] when more than `u32::MAX`
    /// fragments would be needed.
    pub fn split_serialized(
        &self,
        serialized: &str,
        message_id: MessageId,
    ) -> Result<FragmentBatch, FragmentationError> {
        let id_len = escaped_len(message_id.as_str());
        if id_len > MAX_MESSAGE_ID_LEN {
            return Err(FragmentationError::MessageIdTooLong {
                len: id_len,
                max: MAX_MESSAGE_ID_LEN,
            });
        }

        let slices = slice_escaped(serialized, self.slice_capacity);
        let total = u32::try_from(slices.len()).map_err(|_| FragmentationError::IndexOverflow)?;
        let fragments = (0..total)
            .zip(slices)
            .map(|(index, slice)| {
                Fragment::new(
                    message_id.clone(),
                    FragmentIndex::new(index),
                    total,
                    slice.to_owned(),
                )
            })
            .collect();

        Ok(FragmentBatch::new(message_id, serialized.len(), fragments))
    }
}
