use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier correlating the announcement and fragments of one
/// transfer.
///
/// # Examples
///
/// ```
/// use tandem::fragment::MessageId;
/// let id = MessageId::new("catalog-7");
/// assert_eq!(id.as_str(), "catalog-7");
/// ```
#[derive(
    Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, From, Into,
)]
#[serde(transparent)]
#[display("{_0}")]
pub struct MessageId(String);

impl MessageId {
    /// Wrap an existing identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self { Self(Uuid::new_v4().to_string()) }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str { self.0.as_str() }

    /// Length of the identifier in bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether the identifier is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self { Self::new(value) }
}
