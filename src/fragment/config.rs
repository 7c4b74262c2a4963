//! Configuration used by chunked transfers.

use std::time::Duration;

use serde::Deserialize;

use crate::config::millis;

/// Bytes reserved in every fragment for the JSON envelope around the slice:
/// field names, the message identifier, counters and flags.
pub const METADATA_RESERVE: usize = 512;

/// Smallest slice budget accepted. One escaped character can take six bytes
/// (`\u001f`), so anything below this could fail to make progress.
pub const MIN_SLICE_CAPACITY: usize = 16;

/// Settings that bound fragment sizes, pacing, and reassembly resources.
///
/// All fields are plain values so hosts can deserialize them; call
/// [`FragmentationConfig::normalized`] (done by
/// [`EngineConfig::normalized`](crate::config::EngineConfig::normalized)) before use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FragmentationConfig {
    /// Largest encoded message, in bytes, the signaling channel accepts.
    pub frame_budget: usize,
    /// Bytes of every frame held back for fragment metadata.
    pub metadata_reserve: usize,
    /// Hard cap on the declared size of an inbound transfer.
    pub max_message_size: usize,
    /// Most inbound transfers awaiting fragments at once.
    pub max_pending_transfers: usize,
    /// Duration after which incomplete inbound transfers are discarded.
    #[serde(with = "millis")]
    pub reassembly_timeout: Duration,
    /// Pause between consecutive outbound fragment sends.
    #[serde(with = "millis")]
    pub inter_fragment_delay: Duration,
}

impl Default for FragmentationConfig {
    fn default() -> Self {
        Self {
            frame_budget: 6_000,
            metadata_reserve: METADATA_RESERVE,
            max_message_size: 4 * 1024 * 1024,
            max_pending_transfers: 16,
            reassembly_timeout: Duration::from_secs(10),
            inter_fragment_delay: Duration::from_millis(50),
        }
    }
}

impl FragmentationConfig {
    /// Derive a configuration from the channel's per-message limit.
    ///
    /// Returns `None` when `frame_budget` cannot hold the metadata reserve
    /// plus a minimal slice.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use tandem::fragment::FragmentationConfig;
    ///
    /// let cfg = FragmentationConfig::for_frame_budget(6_000, Duration::from_secs(10))
    ///     .expect("budget fits the reserve");
    /// assert_eq!(cfg.slice_capacity(), 5_488);
    /// assert!(FragmentationConfig::for_frame_budget(100, Duration::from_secs(10)).is_none());
    /// ```
    #[must_use]
    pub fn for_frame_budget(frame_budget: usize, reassembly_timeout: Duration) -> Option<Self> {
        if frame_budget < METADATA_RESERVE + MIN_SLICE_CAPACITY {
            return None;
        }
        Some(Self {
            frame_budget,
            reassembly_timeout,
            ..Self::default()
        })
    }

    /// Escaped data bytes a single fragment may carry.
    #[must_use]
    pub fn slice_capacity(&self) -> usize {
        self.frame_budget
            .saturating_sub(self.metadata_reserve)
            .max(MIN_SLICE_CAPACITY)
    }

    /// Clamp values so every derived quantity is usable.
    ///
    /// A frame budget too small for the reserve is raised to the minimum
    /// workable size, a zero message cap is raised to one frame, and at least
    /// one inbound transfer may be pending.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.frame_budget = self
            .frame_budget
            .max(self.metadata_reserve + MIN_SLICE_CAPACITY);
        self.max_message_size = self.max_message_size.max(self.frame_budget);
        self.max_pending_transfers = self.max_pending_transfers.max(1);
        self.reassembly_timeout = self.reassembly_timeout.max(Duration::from_millis(1));
        self
    }
}
