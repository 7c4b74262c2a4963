//! Slicing and joining of serialized payload text.
//!
//! Fragment slices travel as JSON string values, so the bytes a slice costs
//! on the wire are its *escaped* length, not its raw length. Slicing budgets
//! the escaped length and never cuts inside a UTF-8 code point, which keeps
//! every encoded fragment within the frame budget regardless of content.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use super::{Fragment, FragmentIndex, JoinError};

/// Bytes `c` occupies once escaped inside a JSON string literal.
#[must_use]
pub fn escaped_char_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0c}' => 2,
        c if u32::from(c) < 0x20 => 6,
        c => c.len_utf8(),
    }
}

/// Bytes `text` occupies once escaped inside a JSON string literal, excluding
/// the surrounding quotes.
#[must_use]
pub fn escaped_len(text: &str) -> usize { text.chars().map(escaped_char_len).sum() }

/// Split `text` into consecutive slices whose escaped length is at most
/// `capacity`.
///
/// Empty input yields a single empty slice so every payload maps to at least
/// one fragment. `capacity` must be at least six bytes; smaller values are
/// raised to six so one character always fits.
#[must_use]
pub fn slice_escaped(text: &str, capacity: usize) -> Vec<&str> {
    let capacity = capacity.max(6);
    let mut slices = Vec::with_capacity(text.len().div_ceil(capacity).max(1));
    let mut start = 0usize;
    let mut cost = 0usize;

    for (offset, c) in text.char_indices() {
        let width = escaped_char_len(c);
        if cost + width > capacity {
            slices.push(&text[start..offset]);
            start = offset;
            cost = 0;
        }
        cost += width;
    }
    slices.push(&text[start..]);
    slices
}

/// Concatenate the slices for indices `0..total` in order.
///
/// Slots are keyed by fragment index so a declared total costs nothing
/// until fragments actually arrive. Keys at or beyond `total` are ignored.
///
/// # Errors
///
/// Returns [`JoinError::Incomplete`] naming the first empty slot.
pub fn join_slots(total: u32, slots: &BTreeMap<u32, String>) -> Result<String, JoinError> {
    let capacity = slots.range(..total).map(|(_, slice)| slice.len()).sum();
    let mut joined = String::with_capacity(capacity);
    for position in 0..total {
        let Some(slice) = slots.get(&position) else {
            return Err(JoinError::Incomplete {
                missing: FragmentIndex::new(position),
            });
        };
        joined.push_str(slice);
    }
    Ok(joined)
}

/// Reassemble and deserialize a complete set of fragments.
///
/// Fragments may be supplied in any order; they are placed by index.
/// Repeated indices overwrite one another harmlessly.
///
/// # Errors
///
/// Returns [`JoinError::Incomplete`] if any slot is empty,
/// [`JoinError::Inconsistent`] if the fragments name different transfers, and
/// [`JoinError::Malformed`] if the joined text does not parse as `T`.
///
/// # Examples
///
/// ```
/// use tandem::fragment::{Fragmenter, MessageId, join};
///
/// let fragmenter = Fragmenter::new(32);
/// let batch = fragmenter
///     .split(&vec!["alpha"; 20], MessageId::new("m"))
///     .expect("split");
/// let mut fragments = batch.into_fragments();
/// fragments.reverse();
/// let restored: Vec<String> = join(&fragments).expect("join");
/// assert_eq!(restored, vec!["alpha"; 20]);
/// ```
pub fn join<T: DeserializeOwned>(fragments: &[Fragment]) -> Result<T, JoinError> {
    let Some(first) = fragments.first() else {
        return Err(JoinError::Incomplete {
            missing: FragmentIndex::zero(),
        });
    };
    let total = first.total_chunks();
    let mut slots = BTreeMap::new();

    for fragment in fragments {
        if fragment.message_id() != first.message_id() {
            return Err(JoinError::Inconsistent {
                index: fragment.index(),
                expected: first.message_id().clone(),
                found: fragment.message_id().clone(),
            });
        }
        if fragment.index().is_within(total) {
            slots.insert(fragment.index().get(), fragment.data().to_owned());
        }
    }

    let text = join_slots(total, &slots)?;
    serde_json::from_str(&text).map_err(|err| JoinError::Malformed(err.to_string()))
}
