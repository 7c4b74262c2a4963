//! Classification of inbound signaling messages.
//!
//! The signaling channel tags every message with a free-form type string.
//! [`Router`] maps the strings this session understands onto the closed
//! [`Route`] enumeration once, at registration time, so dispatch is an
//! exhaustive `match` instead of a string-keyed handler table.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which side of the session a peer plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The support agent.
    Agent,
    /// The customer being assisted.
    Customer,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Customer => "customer",
        }
    }

    /// The other participant.
    #[must_use]
    pub const fn peer(self) -> Self {
        match self {
            Self::Agent => Self::Customer,
            Self::Customer => Self::Agent,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Destination of an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Announcement of a chunked transfer on `stream`.
    TransferMetadata { stream: String },
    /// One fragment of a chunked transfer on `stream`.
    TransferFragment { stream: String },
    /// Continuous-state update for the sync channel `channel`.
    Sync { channel: String },
    /// Discrete action named `action`.
    Action { action: String },
}

/// Wire type of the announcement for `stream`.
#[must_use]
pub fn metadata_type(stream: &str) -> String { format!("{stream}-metadata") }

/// Wire type of the fragments for `stream`.
#[must_use]
pub fn fragment_type(stream: &str) -> String { stream.to_owned() }

/// Wire type of the updates for sync channel `channel`.
#[must_use]
pub fn sync_type(channel: &str) -> String { format!("{channel}-sync") }

/// Registry of wire types understood by a session.
#[derive(Clone, Debug, Default)]
pub struct Router {
    routes: HashMap<String, Route>,
}

impl Router {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register the announcement and fragment types of a transfer stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRoute`] if either wire type is taken.
    pub fn register_transfer(&mut self, stream: &str) -> Result<(), Error> {
        let metadata = metadata_type(stream);
        let fragment = fragment_type(stream);
        self.ensure_free(&metadata)?;
        self.ensure_free(&fragment)?;
        self.routes.insert(
            metadata,
            Route::TransferMetadata {
                stream: stream.to_owned(),
            },
        );
        self.routes.insert(
            fragment,
            Route::TransferFragment {
                stream: stream.to_owned(),
            },
        );
        Ok(())
    }

    /// Register the update type of a sync channel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRoute`] if the wire type is taken.
    pub fn register_sync(&mut self, channel: &str) -> Result<(), Error> {
        self.insert(
            sync_type(channel),
            Route::Sync {
                channel: channel.to_owned(),
            },
        )
    }

    /// Register a discrete action name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRoute`] if the wire type is taken.
    pub fn register_action(&mut self, action: &str) -> Result<(), Error> {
        self.insert(
            action.to_owned(),
            Route::Action {
                action: action.to_owned(),
            },
        )
    }

    /// Resolve a wire type to its route.
    #[must_use]
    pub fn classify(&self, message_type: &str) -> Option<&Route> { self.routes.get(message_type) }

    /// Number of registered wire types.
    #[must_use]
    pub fn len(&self) -> usize { self.routes.len() }

    /// Whether nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.routes.is_empty() }

    fn insert(&mut self, wire_type: String, route: Route) -> Result<(), Error> {
        self.ensure_free(&wire_type)?;
        self.routes.insert(wire_type, route);
        Ok(())
    }

    fn ensure_free(&self, wire_type: &str) -> Result<(), Error> {
        if self.routes.contains_key(wire_type) {
            return Err(Error::DuplicateRoute(wire_type.to_owned()));
        }
        Ok(())
    }
}
