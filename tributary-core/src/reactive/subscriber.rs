//! Subscriber types for the notification bus.
//!
//! A subscriber is a callback registered on a container. Each registration
//! gets an opaque [`SubscriberId`]; the [`Subscription`] handle returned to
//! the caller removes exactly that registration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::change::Notification;

/// Unique identifier for a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A notification callback.
pub type Callback = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Subscriber registry, iterated in registration order.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    entries: IndexMap<SubscriberId, Callback>,
}

impl SubscriberRegistry {
    pub(crate) fn insert(&mut self, callback: Callback) -> SubscriberId {
        let id = SubscriberId::new();
        self.entries.insert(id, callback);
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriberId) -> bool {
        // shift_remove keeps the remaining callbacks in registration order
        self.entries.shift_remove(&id).is_some()
    }

    /// Clone out the current callbacks so they can run without the lock.
    pub(crate) fn snapshot(&self) -> Vec<Callback> {
        self.entries.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Clone)]
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<Mutex<SubscriberRegistry>>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, registry: &Arc<Mutex<SubscriberRegistry>>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// The identifier of this registration.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove the callback from its container. Calling this again is harmless.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.lock().remove(self.id) {
                tracing::trace!(subscriber = ?self.id, "unsubscribed");
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Callback {
        Arc::new(|_: &Notification| {})
    }

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let registry = Arc::new(Mutex::new(SubscriberRegistry::default()));
        let first = registry.lock().insert(noop());
        let second = registry.lock().insert(noop());

        let subscription = Subscription::new(first, &registry);
        subscription.unsubscribe();
        subscription.unsubscribe();

        let guard = registry.lock();
        assert_eq!(guard.len(), 1);
        assert!(guard.entries.contains_key(&second));
    }

    #[test]
    fn unsubscribe_after_registry_dropped() {
        let registry = Arc::new(Mutex::new(SubscriberRegistry::default()));
        let id = registry.lock().insert(noop());
        let subscription = Subscription::new(id, &registry);

        drop(registry);
        subscription.unsubscribe();
    }
}
