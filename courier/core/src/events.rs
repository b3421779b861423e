//! Chat Events and Subscriptions
//!
//! Everything a transport reports upward is a [`ChatEvent`]. Consumers register
//! interest with [`EventBus::subscribe`] and receive a typed [`Subscription`]
//! handle; dropping the handle (or calling [`Subscription::unsubscribe`])
//! removes the listener.
//!
//! # Dispatch Rules
//!
//! - Events are delivered synchronously, in emission order.
//! - Listeners are called in registration order.
//! - The registry is snapshotted before dispatch, so a listener may subscribe
//!   or unsubscribe (itself included) without deadlocking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;

use crate::error::ErrorInfo;
use crate::messages::NormalizedMessage;
use crate::transport::state::ConnectionInfo;

/// Events emitted by the active transport
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// A normalized inbound message
    Message(NormalizedMessage),
    /// The connection changed state
    ConnectionChanged(ConnectionInfo),
    /// A local transport failure (send rejected, socket error, poll failure)
    Error(ErrorInfo),
}

/// Identifier of one registered listener
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub_{}", self.0)
    }
}

type Listener = Arc<dyn Fn(&ChatEvent) + Send + Sync>;
type Registry = DashMap<SubscriptionId, Listener>;

/// Listener registry shared by a transport and its consumers
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Registry>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.insert(id, Arc::new(listener));
        tracing::trace!(subscription = %id, "Listener registered");

        Subscription {
            id,
            registry: Arc::downgrade(&self.listeners),
        }
    }

    /// Deliver an event to every listener
    pub fn emit(&self, event: &ChatEvent) {
        let mut snapshot: Vec<(SubscriptionId, Listener)> = self
            .listeners
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        snapshot.sort_by_key(|(id, _)| *id);

        for (_, listener) in snapshot {
            listener(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Handle to a registered listener
///
/// The listener stays registered for as long as this handle lives.
#[must_use = "dropping a Subscription unregisters its listener"]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Identifier of this subscription
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Unregister the listener now
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
            tracing::trace!(subscription = %self.id, "Listener removed");
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
