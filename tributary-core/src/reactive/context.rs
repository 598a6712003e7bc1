//! Dependency Tracker
//!
//! The tracker records which container keys a computed value reads while it
//! evaluates. A single thread-local slot holds the dependency set of the
//! evaluation currently in progress, or nothing when no evaluation is
//! running.
//!
//! # Implementation
//!
//! Entering a [`TrackingScope`] moves whatever occupied the slot into the
//! scope guard and installs a fresh set. Finishing (or dropping) the scope
//! swaps the previous occupant back. Nested evaluations therefore never see
//! or corrupt the outer evaluation's dependencies, and the slot is restored
//! even if the evaluation function panics.

use std::cell::RefCell;

use indexmap::IndexSet;

use super::container::ContainerId;

/// A key read from a container during an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// The container that owns the key.
    pub owner: ContainerId,
    /// The tracking key, e.g. `length`, `index:3` or `items.0.done`.
    pub key: String,
}

/// Ordered set of dependencies collected by one evaluation.
pub type DependencySet = IndexSet<Dependency>;

thread_local! {
    static ACTIVE: RefCell<Option<DependencySet>> = const { RefCell::new(None) };
}

/// Guard for one tracked evaluation.
///
/// Holds the previous slot occupant until the scope ends.
pub struct TrackingScope {
    previous: Option<DependencySet>,
    restored: bool,
}

impl TrackingScope {
    /// Install a fresh dependency set, saving the current one.
    pub fn enter() -> Self {
        let previous = ACTIVE.with(|slot| slot.replace(Some(DependencySet::new())));
        Self {
            previous,
            restored: false,
        }
    }

    /// End the scope and return the dependencies it collected.
    pub fn finish(mut self) -> DependencySet {
        self.restore()
    }

    fn restore(&mut self) -> DependencySet {
        self.restored = true;
        let previous = self.previous.take();
        ACTIVE
            .with(|slot| slot.replace(previous))
            .unwrap_or_default()
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        if !self.restored {
            self.restore();
        }
    }
}

/// Check whether an evaluation is currently collecting dependencies.
pub fn is_tracking() -> bool {
    ACTIVE.with(|slot| slot.borrow().is_some())
}

/// Record a dependency on `key` of `owner`. No-op outside an evaluation.
pub fn track(owner: ContainerId, key: &str) {
    ACTIVE.with(|slot| {
        if let Some(deps) = slot.borrow_mut().as_mut() {
            tracing::trace!(?owner, key, "tracked dependency");
            deps.insert(Dependency {
                owner,
                key: key.to_owned(),
            });
        }
    });
}

/// Like [`track`], but only builds the key when an evaluation is active.
pub fn track_with(owner: ContainerId, key: impl FnOnce() -> String) {
    if is_tracking() {
        track(owner, &key());
    }
}

/// Run `f` with dependency tracking suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct Restore(Option<DependencySet>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            ACTIVE.with(|slot| *slot.borrow_mut() = previous);
        }
    }

    let _restore = Restore(ACTIVE.with(|slot| slot.borrow_mut().take()));
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(deps: &DependencySet) -> Vec<&str> {
        deps.iter().map(|dep| dep.key.as_str()).collect()
    }

    #[test]
    fn track_is_noop_without_scope() {
        assert!(!is_tracking());
        track(ContainerId::new(), "length");
        assert!(!is_tracking());
    }

    #[test]
    fn scope_collects_dependencies() {
        let owner = ContainerId::new();
        let scope = TrackingScope::enter();
        assert!(is_tracking());

        track(owner, "length");
        track(owner, "index:0");
        track(owner, "length");

        let deps = scope.finish();
        assert_eq!(keys(&deps), vec!["length", "index:0"]);
        assert!(!is_tracking());
    }

    #[test]
    fn nested_scopes_restore_outer() {
        let owner = ContainerId::new();
        let outer = TrackingScope::enter();
        track(owner, "a");

        {
            let inner = TrackingScope::enter();
            track(owner, "b");
            let inner_deps = inner.finish();
            assert_eq!(keys(&inner_deps), vec!["b"]);
        }

        track(owner, "c");
        let outer_deps = outer.finish();
        assert_eq!(keys(&outer_deps), vec!["a", "c"]);
    }

    #[test]
    fn dropped_scope_restores_slot() {
        {
            let _scope = TrackingScope::enter();
            assert!(is_tracking());
        }
        assert!(!is_tracking());
    }

    #[test]
    fn untracked_reads_are_not_recorded() {
        let owner = ContainerId::new();
        let scope = TrackingScope::enter();

        untracked(|| {
            assert!(!is_tracking());
            track(owner, "hidden");
        });
        track(owner, "visible");

        assert_eq!(keys(&scope.finish()), vec!["visible"]);
    }

    #[test]
    fn track_with_skips_key_construction_when_idle() {
        let mut built = false;
        track_with(ContainerId::new(), || {
            built = true;
            String::from("index:1")
        });
        assert!(!built);
    }
}
