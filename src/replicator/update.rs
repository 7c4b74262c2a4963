//! Wire form of a continuous-state update.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Extent, Position};
use crate::message::Role;

/// Identity of one channel binding, used only to recognise echoes of our own
/// updates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
#[display("{_0}")]
pub struct SourceId(String);

impl SourceId {
    /// Wrap an existing identity.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }

    /// Generate a fresh random identity.
    #[must_use]
    pub fn generate() -> Self { Self(Uuid::new_v4().to_string()) }

    /// Borrow the identity text.
    #[must_use]
    pub fn as_str(&self) -> &str { self.0.as_str() }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self { Self::new(value) }
}

/// One `<channel>-sync` message.
///
/// Carries the position both as fractions of the movable range and as
/// absolute pixels, together with the sender's extent, so the receiver can
/// pick whichever is meaningful on its own surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUpdate {
    pub container_id: String,
    pub percent_y: f64,
    pub percent_x: f64,
    pub px_y: f64,
    pub px_x: f64,
    pub scroll_height: f64,
    pub client_height: f64,
    pub velocity: f64,
    pub source_id: SourceId,
    pub user_type: Role,
    pub ts: u64,
}

impl SyncUpdate {
    /// Position carried by the update.
    #[must_use]
    pub fn position(&self) -> Position {
        Position {
            percent_x: self.percent_x,
            percent_y: self.percent_y,
            px_x: self.px_x,
            px_y: self.px_y,
        }
    }

    /// Sender's surface extent.
    #[must_use]
    pub fn extent(&self) -> Extent {
        Extent {
            scroll_height: self.scroll_height,
            client_height: self.client_height,
        }
    }
}
