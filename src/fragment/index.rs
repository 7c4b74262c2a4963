//! Zero-based fragment positioning within a transfer.
//!
//! Provides [`FragmentIndex`], a type-safe wrapper around `u32` used both as
//! the wire `chunkIndex` and as the slot position during reassembly.

use std::num::TryFromIntError;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Zero-based ordinal describing a fragment's position within its transfer.
///
/// # Examples
///
/// ```
/// use tandem::fragment::FragmentIndex;
/// let index = FragmentIndex::new(3);
/// assert_eq!(index.get(), 3);
/// assert_eq!(index.slot(), 3);
/// ```
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
)]
#[serde(transparent)]
#[display("{_0}")]
pub struct FragmentIndex(u32);

impl FragmentIndex {
    /// Construct an index from a `u32` value.
    #[must_use]
    pub const fn new(value: u32) -> Self { Self(value) }

    /// Return the first valid fragment index.
    #[must_use]
    pub const fn zero() -> Self { Self(0) }

    /// Return the underlying numeric value.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }

    /// Position of this fragment in a slot vector.
    #[must_use]
    pub const fn slot(self) -> usize { self.0 as usize }

    /// Whether this index addresses a slot in a transfer of `total` fragments.
    #[must_use]
    pub const fn is_within(self, total: u32) -> bool { self.0 < total }
}

impl TryFrom<usize> for FragmentIndex {
    type Error = TryFromIntError;

    fn try_from(value: usize) -> Result<Self, Self::Error> { u32::try_from(value).map(Self) }
}

impl From<FragmentIndex> for u32 {
    fn from(value: FragmentIndex) -> Self { value.0 }
}
