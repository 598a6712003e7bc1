//! Computed Implementation
//!
//! A Computed is a cached value derived from a container. It is created
//! through [`Container::computed`](super::Container::computed) or
//! [`Container::try_computed`](super::Container::try_computed) and registered
//! with that container's bus.
//!
//! # How Computeds Work
//!
//! 1. A new computed starts dirty and does not evaluate until first read.
//!
//! 2. Reading a dirty computed runs its function inside a tracking scope,
//!    caches the result and records every key the function read.
//!
//! 3. Reading a clean computed returns the cached value.
//!
//! 4. Any notification on the owning container marks the computed dirty,
//!    whatever keys changed. The recorded dependencies are kept for
//!    inspection only.
//!
//! # Failures
//!
//! If the function returns an error (or panics) nothing is committed: the
//! previous cached value and dependencies stay, the computed stays dirty and
//! the error reaches the caller unchanged.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::bus::Invalidate;
use super::context::{Dependency, DependencySet, TrackingScope};

/// Counter for generating unique computed IDs.
static COMPUTED_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new unique computed ID.
fn next_computed_id() -> u64 {
    COMPUTED_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Staleness of a computed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputedState {
    /// The cached value is up-to-date.
    Clean,

    /// The next read must re-evaluate.
    Dirty,
}

type Evaluate<T, E> = dyn Fn() -> Result<T, E> + Send + Sync;

struct ComputedInner<T, E> {
    id: u64,
    evaluate: Box<Evaluate<T, E>>,
    value: RwLock<Option<T>>,
    dirty: AtomicBool,
    dependencies: RwLock<DependencySet>,
}

impl<T, E> Invalidate for ComputedInner<T, E>
where
    T: Send + Sync,
{
    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }
}

/// Puts the dirty flag back unless disarmed, so an evaluation that returns
/// an error or unwinds leaves the computed dirty.
struct StayDirty<'a> {
    dirty: &'a AtomicBool,
    armed: bool,
}

impl Drop for StayDirty<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.dirty.store(true, Ordering::SeqCst);
        }
    }
}

/// A lazily evaluated, memoized value tied to a container.
///
/// Cloning a computed shares its cache.
pub struct Computed<T, E = Infallible> {
    inner: Arc<ComputedInner<T, E>>,
}

impl<T, E> Computed<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: 'static,
{
    pub(crate) fn new<F>(evaluate: F) -> Self
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(ComputedInner {
                id: next_computed_id(),
                evaluate: Box::new(evaluate),
                value: RwLock::new(None),
                dirty: AtomicBool::new(true),
                dependencies: RwLock::new(DependencySet::new()),
            }),
        }
    }

    /// Handle the bus uses to invalidate this computed.
    pub(crate) fn invalidator(&self) -> std::sync::Weak<dyn Invalidate> {
        let inner: Arc<dyn Invalidate> = self.inner.clone();
        Arc::downgrade(&inner)
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Get the current value, evaluating first if dirty.
    pub fn try_get(&self) -> Result<T, E> {
        // Clear the flag before evaluating so an invalidation that lands
        // while the function runs is not lost.
        if !self.inner.dirty.swap(false, Ordering::SeqCst) {
            if let Some(value) = self.inner.value.read().clone() {
                return Ok(value);
            }
        }

        let mut guard = StayDirty {
            dirty: &self.inner.dirty,
            armed: true,
        };
        let scope = TrackingScope::enter();
        let result = (self.inner.evaluate)();
        let dependencies = scope.finish();

        let value = result?;
        *self.inner.value.write() = Some(value.clone());
        *self.inner.dependencies.write() = dependencies;
        guard.armed = false;
        Ok(value)
    }

    /// Mark the computed stale.
    pub fn mark_dirty(&self) {
        self.inner.mark_dirty();
    }

    /// Get the current staleness.
    pub fn state(&self) -> ComputedState {
        if self.is_dirty() {
            ComputedState::Dirty
        } else {
            ComputedState::Clean
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::SeqCst)
    }

    /// Dependencies recorded by the last successful evaluation.
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.inner.dependencies.read().iter().cloned().collect()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }
}

impl<T> Computed<T, Infallible>
where
    T: Clone + Send + Sync + 'static,
{
    /// Get the current value, evaluating first if dirty.
    pub fn get(&self) -> T {
        match self.try_get() {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl<T, E> Clone for Computed<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> std::fmt::Debug for Computed<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("dirty", &self.inner.dirty.load(Ordering::SeqCst))
            .field("dependency_count", &self.inner.dependencies.read().len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    use crate::reactive::context::{self, is_tracking};
    use crate::reactive::ContainerId;

    fn counted(value: i32) -> (Computed<i32>, Arc<AtomicI32>) {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();
        let computed = Computed::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            Ok(value)
        });
        (computed, call_count)
    }

    #[test]
    fn computes_on_first_access() {
        let (computed, call_count) = counted(42);

        assert!(!computed.has_value());
        assert_eq!(computed.state(), ComputedState::Dirty);
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert_eq!(computed.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(computed.state(), ComputedState::Clean);
    }

    #[test]
    fn caches_value_when_clean() {
        let (computed, call_count) = counted(42);

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recomputes_once_after_marked_dirty() {
        let (computed, call_count) = counted(7);

        computed.get();
        computed.mark_dirty();
        computed.get();
        computed.get();

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn error_commits_nothing_and_stays_dirty() {
        let fail = Arc::new(AtomicBool::new(false));
        let fail_clone = fail.clone();
        let computed: Computed<i32, String> = Computed::new(move || {
            if fail_clone.load(Ordering::SeqCst) {
                Err("boom".to_string())
            } else {
                Ok(1)
            }
        });

        assert_eq!(computed.try_get(), Ok(1));

        fail.store(true, Ordering::SeqCst);
        computed.mark_dirty();
        assert_eq!(computed.try_get(), Err("boom".to_string()));
        assert!(computed.is_dirty());
        assert!(!is_tracking());

        fail.store(false, Ordering::SeqCst);
        assert_eq!(computed.try_get(), Ok(1));
        assert!(!computed.is_dirty());
    }

    #[test]
    fn panic_commits_nothing_and_stays_dirty() {
        let source = Arc::new(AtomicI32::new(1));
        let fail = Arc::new(AtomicBool::new(false));
        let (source_clone, fail_clone) = (source.clone(), fail.clone());
        let computed = Computed::new(move || {
            if fail_clone.load(Ordering::SeqCst) {
                panic!("evaluation failed");
            }
            Ok::<_, Infallible>(source_clone.load(Ordering::SeqCst))
        });

        assert_eq!(computed.get(), 1);

        source.store(2, Ordering::SeqCst);
        fail.store(true, Ordering::SeqCst);
        computed.mark_dirty();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| computed.get()));
        assert!(outcome.is_err());
        assert!(computed.is_dirty());
        assert!(!is_tracking());

        fail.store(false, Ordering::SeqCst);
        assert_eq!(computed.get(), 2);
        assert!(!computed.is_dirty());
    }

    #[test]
    fn records_dependencies_of_last_evaluation() {
        let owner = ContainerId::new();
        let computed = Computed::new(move || {
            context::track(owner, "length");
            context::track(owner, "index:0");
            Ok::<_, Infallible>(())
        });

        computed.get();
        let keys: Vec<String> = computed.dependencies().into_iter().map(|d| d.key).collect();
        assert_eq!(keys, vec!["length", "index:0"]);
    }

    #[test]
    fn nested_evaluation_keeps_outer_dependencies() {
        let owner = ContainerId::new();
        let inner = Computed::new(move || {
            context::track(owner, "inner");
            Ok::<_, Infallible>(1)
        });
        let inner_clone = inner.clone();
        let outer = Computed::new(move || {
            context::track(owner, "before");
            let value = inner_clone.get();
            context::track(owner, "after");
            Ok::<_, Infallible>(value + 1)
        });

        assert_eq!(outer.get(), 2);
        let outer_keys: Vec<String> = outer.dependencies().into_iter().map(|d| d.key).collect();
        let inner_keys: Vec<String> = inner.dependencies().into_iter().map(|d| d.key).collect();
        assert_eq!(outer_keys, vec!["before", "after"]);
        assert_eq!(inner_keys, vec!["inner"]);
    }

    #[test]
    fn clone_shares_state() {
        let (computed1, call_count) = counted(3);
        let computed2 = computed1.clone();

        assert_eq!(computed1.id(), computed2.id());
        computed1.get();
        assert!(computed2.has_value());
        assert_eq!(computed2.get(), 3);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        computed2.mark_dirty();
        assert_eq!(computed1.state(), ComputedState::Dirty);
    }
}
