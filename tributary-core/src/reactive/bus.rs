//! Notification Bus
//!
//! Every container owns one bus. The bus keeps the version counter, the
//! subscriber registry, the registry of computed values to invalidate, and
//! the queue of changes waiting for a batched flush.
//!
//! # Dispatch Policy
//!
//! - Immediate mode: `notify` bumps the version, invalidates computeds and
//!   calls every subscriber before returning.
//! - Batched mode: `notify` bumps the version and queues the change. The
//!   first queued change of a tick schedules a flush on the runtime's
//!   microtask queue; later changes in the same tick ride along. The queued
//!   flush keeps the bus alive, so it runs even if every container handle is
//!   dropped first.
//!
//! Callbacks always run with no bus lock held. The registry is snapshotted
//! first, so a callback may subscribe, unsubscribe or write to containers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::change::{Change, Notification, QueuedChange};
use super::runtime;
use super::subscriber::{Callback, SubscriberRegistry, Subscription};

/// Something the bus marks stale on every notification.
pub(crate) trait Invalidate: Send + Sync {
    fn mark_dirty(&self);
}

pub(crate) struct Bus {
    version: AtomicU64,
    subscribers: Arc<Mutex<SubscriberRegistry>>,
    computeds: Mutex<Vec<Weak<dyn Invalidate>>>,
    pending: Mutex<Vec<QueuedChange>>,
    flush_scheduled: AtomicBool,
    batched: bool,
}

impl Bus {
    pub(crate) fn new(batched: bool) -> Self {
        Self {
            version: AtomicU64::new(0),
            subscribers: Arc::new(Mutex::new(SubscriberRegistry::default())),
            computeds: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            flush_scheduled: AtomicBool::new(false),
            batched,
        }
    }

    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    pub(crate) fn is_flush_scheduled(&self) -> bool {
        self.flush_scheduled.load(Ordering::SeqCst)
    }

    pub(crate) fn subscribe(&self, callback: Callback) -> Subscription {
        let id = self.subscribers.lock().insert(callback);
        tracing::trace!(subscriber = ?id, "subscribed");
        Subscription::new(id, &self.subscribers)
    }

    pub(crate) fn register_computed(&self, computed: Weak<dyn Invalidate>) {
        self.computeds.lock().push(computed);
    }

    pub(crate) fn notify(self: &Arc<Self>, key: String, change: Change) {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.batched {
            tracing::trace!(%key, version, "dispatching change");
            self.invalidate_computeds();
            let notification = Notification::Immediate {
                key,
                change,
                version,
            };
            self.dispatch(&notification);
            return;
        }

        self.pending.lock().push(QueuedChange { key, change });

        if !self.flush_scheduled.swap(true, Ordering::SeqCst) {
            tracing::debug!(version, "scheduling flush");
            let bus = Arc::clone(self);
            runtime::queue_microtask(move || bus.flush());
        }
    }

    /// Dispatch everything queued since the previous flush.
    pub(crate) fn flush(&self) {
        let mutations = std::mem::take(&mut *self.pending.lock());
        self.flush_scheduled.store(false, Ordering::SeqCst);

        let version = self.version();
        tracing::debug!(changes = mutations.len(), version, "flushing");

        self.invalidate_computeds();
        self.dispatch(&Notification::Batch { mutations, version });
    }

    fn invalidate_computeds(&self) {
        let live: Vec<Arc<dyn Invalidate>> = {
            let mut computeds = self.computeds.lock();
            computeds.retain(|weak| weak.strong_count() > 0);
            computeds.iter().filter_map(Weak::upgrade).collect()
        };

        for computed in live {
            computed.mark_dirty();
        }
    }

    fn dispatch(&self, notification: &Notification) {
        let callbacks = self.subscribers.lock().snapshot();
        for callback in callbacks {
            callback(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index_change(index: usize) -> Change {
        Change::Index {
            index,
            old_value: json!(null),
            new_value: json!(index),
        }
    }

    fn recorder(bus: &Bus) -> (Arc<Mutex<Vec<Notification>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = bus.subscribe(Arc::new(move |n: &Notification| {
            sink.lock().push(n.clone());
        }));
        (seen, subscription)
    }

    struct Flag(AtomicBool);

    impl Invalidate for Flag {
        fn mark_dirty(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn immediate_notify_dispatches_in_registration_order() {
        let bus = Arc::new(Bus::new(false));
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            bus.subscribe(Arc::new(move |_: &Notification| order.lock().push(tag)));
        }

        bus.notify("index:0".into(), index_change(0));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
        assert_eq!(bus.version(), 1);
    }

    #[test]
    fn unsubscribed_callback_is_skipped() {
        let bus = Arc::new(Bus::new(false));
        let (seen, subscription) = recorder(&bus);

        bus.notify("index:0".into(), index_change(0));
        subscription.unsubscribe();
        bus.notify("index:1".into(), index_change(1));

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn batched_notify_coalesces_into_one_flush() {
        let bus = Arc::new(Bus::new(true));
        let (seen, _subscription) = recorder(&bus);

        bus.notify("index:0".into(), index_change(0));
        bus.notify("index:1".into(), index_change(1));
        assert!(bus.is_flush_scheduled());
        assert!(seen.lock().is_empty());

        runtime::run_microtasks();

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            Notification::Batch { mutations, version } => {
                let keys: Vec<_> = mutations.iter().map(|m| m.key.as_str()).collect();
                assert_eq!(keys, vec!["index:0", "index:1"]);
                assert_eq!(*version, 2);
            }
            other => panic!("expected batch, got {other:?}"),
        }
        assert!(!bus.is_flush_scheduled());
    }

    #[test]
    fn notify_after_flush_schedules_again() {
        let bus = Arc::new(Bus::new(true));
        let (seen, _subscription) = recorder(&bus);

        bus.notify("a".into(), index_change(0));
        runtime::run_microtasks();
        bus.notify("b".into(), index_change(1));
        runtime::run_microtasks();

        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn scheduled_flush_survives_dropped_handles() {
        let bus = Arc::new(Bus::new(true));
        let (seen, _subscription) = recorder(&bus);

        bus.notify("index:0".into(), index_change(0));
        drop(bus);
        runtime::run_microtasks();

        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn notify_invalidates_registered_computeds() {
        let bus = Arc::new(Bus::new(false));
        let flag = Arc::new(Flag(AtomicBool::new(false)));
        let registered: Arc<dyn Invalidate> = flag.clone();
        bus.register_computed(Arc::downgrade(&registered));

        bus.notify("length".into(), Change::Length { old_value: 0, new_value: 1 });
        assert!(flag.0.load(Ordering::SeqCst));
    }

    #[test]
    fn dropped_computeds_are_pruned() {
        let bus = Arc::new(Bus::new(false));
        let flag: Arc<dyn Invalidate> = Arc::new(Flag(AtomicBool::new(false)));
        bus.register_computed(Arc::downgrade(&flag));
        drop(flag);

        bus.notify("length".into(), Change::Length { old_value: 0, new_value: 1 });
        assert!(bus.computeds.lock().is_empty());
    }
}
