//! Pub/sub for discrete actions.
//!
//! Discrete actions (a tab change, a field edit, a dialog opening) are small,
//! unchunked messages sent on a wire type equal to the action name. The
//! [`ActionBroadcaster`] delivers each one synchronously to the listeners
//! registered for that action at the time of delivery; nothing is queued or
//! retained.

use std::{
    fmt,
    sync::{
        Arc,
        Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Role;

/// Name of a discrete action.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    TabChanged,
    FieldEdited,
    ModalOpened,
    ModalClosed,
    PaymentStepChanged,
    CatalogShared,
    /// Any other application-defined action.
    Custom(String),
}

impl ActionKind {
    /// Wire name, also used as the message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TabChanged => "tab-changed",
            Self::FieldEdited => "field-edited",
            Self::ModalOpened => "modal-opened",
            Self::ModalClosed => "modal-closed",
            Self::PaymentStepChanged => "payment-step-changed",
            Self::CatalogShared => "catalog-shared",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for ActionKind {
    fn from(name: &str) -> Self {
        match name {
            "tab-changed" => Self::TabChanged,
            "field-edited" => Self::FieldEdited,
            "modal-opened" => Self::ModalOpened,
            "modal-closed" => Self::ModalClosed,
            "payment-step-changed" => Self::PaymentStepChanged,
            "catalog-shared" => Self::CatalogShared,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl From<String> for ActionKind {
    fn from(name: String) -> Self {
        match Self::from(name.as_str()) {
            Self::Custom(_) => Self::Custom(name),
            known => known,
        }
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Custom(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// One discrete action as carried on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessage {
    pub action: ActionKind,
    /// Role of the peer that published the action.
    pub user_type: Role,
    #[serde(default)]
    pub data: Value,
    pub timestamp: u64,
}

impl ActionMessage {
    /// Build a message published by `originator` at `timestamp`.
    #[must_use]
    pub fn new(action: ActionKind, originator: Role, data: Value, timestamp: u64) -> Self {
        Self {
            action,
            user_type: originator,
            data,
            timestamp,
        }
    }
}

type Listener = Arc<dyn Fn(&ActionMessage) + Send + Sync>;

struct Registry {
    local: Role,
    next_id: AtomicU64,
    listeners: DashMap<ActionKind, Vec<(u64, Listener)>>,
}

impl Registry {
    fn remove(&self, action: &ActionKind, id: u64) {
        if let Some(mut entry) = self.listeners.get_mut(action) {
            entry.retain(|(listener_id, _)| *listener_id != id);
        }
        self.listeners.remove_if(action, |_, entry| entry.is_empty());
    }
}

/// Registry of action listeners for one session.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct ActionBroadcaster {
    registry: Arc<Registry>,
}

impl ActionBroadcaster {
    /// Create a broadcaster for a session where the local peer plays
    /// `local`.
    #[must_use]
    pub fn new(local: Role) -> Self {
        Self {
            registry: Arc::new(Registry {
                local,
                next_id: AtomicU64::new(0),
                listeners: DashMap::new(),
            }),
        }
    }

    /// Role of the local peer.
    #[must_use]
    pub fn local_role(&self) -> Role { self.registry.local }

    /// Register `listener` for every delivery of `action`, whatever its
    /// originator.
    pub fn subscribe<F>(&self, action: impl Into<ActionKind>, listener: F) -> Subscription
    where
        F: Fn(&ActionMessage) + Send + Sync + 'static,
    {
        let action = action.into();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .listeners
            .entry(action.clone())
            .or_default()
            .push((id, Arc::new(listener)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            action,
            id,
        }
    }

    /// Register `listener` for deliveries of `action` published by the
    /// other peer only.
    pub fn subscribe_remote<F>(&self, action: impl Into<ActionKind>, listener: F) -> Subscription
    where
        F: Fn(&ActionMessage) + Send + Sync + 'static,
    {
        let local = self.registry.local;
        self.subscribe(action, move |message: &ActionMessage| {
            if message.user_type != local {
                listener(message);
            }
        })
    }

    /// Invoke every listener registered for `message.action`, returning how
    /// many were called.
    ///
    /// Listeners run on the caller's task after the registry lock has been
    /// released, so they may subscribe or unsubscribe freely; such changes
    /// take effect from the next delivery.
    pub fn deliver(&self, message: &ActionMessage) -> usize {
        let listeners: Vec<Listener> = self
            .registry
            .listeners
            .get(&message.action)
            .map(|entry| entry.iter().map(|(_, listener)| Arc::clone(listener)).collect())
            .unwrap_or_default();
        for listener in &listeners {
            listener(message);
        }
        listeners.len()
    }

    /// Number of listeners registered for `action`.
    #[must_use]
    pub fn listener_count(&self, action: &ActionKind) -> usize {
        self.registry
            .listeners
            .get(action)
            .map_or(0, |entry| entry.len())
    }
}

/// Handle that unregisters its listener when dropped.
#[must_use = "dropping a Subscription unregisters the listener immediately"]
pub struct Subscription {
    registry: Weak<Registry>,
    action: ActionKind,
    id: u64,
}

impl Subscription {
    /// Unregister the listener now.
    pub fn unsubscribe(self) { drop(self); }

    /// Keep the listener registered for the broadcaster's lifetime.
    pub fn detach(mut self) { self.registry = Weak::new(); }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.action, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("action", &self.action)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
