//! Derived Containers
//!
//! A derived container mirrors a source container through a map or filter.
//! It is filled from the source when created and then subscribes to the
//! source: every source notification, whatever key it carries, re-runs the
//! function over the entire current source sequence, overwrites the derived
//! storage wholesale and announces `derived` on the derived container.
//!
//! The derived container shares the source's configuration, so a batched
//! source yields a batched derived container whose own flush lands in the
//! same microtask drain as the source's.
//!
//! The subscription holds the source weakly and is never removed.

use serde_json::Value;

use super::change::{Change, DerivedSource};
use super::container::Container;

impl Container {
    /// Container holding `f` applied to every element of this one.
    pub fn derived_map<F>(&self, f: F) -> Container
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.derive(DerivedSource::Map, move |values| values.iter().map(&f).collect())
    }

    /// Container holding the elements of this one that satisfy `predicate`.
    pub fn derived_filter<F>(&self, predicate: F) -> Container
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.derive(DerivedSource::Filter, move |values| {
            values.iter().filter(|v| predicate(v)).cloned().collect()
        })
    }

    fn derive<F>(&self, source: DerivedSource, derive: F) -> Container
    where
        F: Fn(&[Value]) -> Vec<Value> + Send + Sync + 'static,
    {
        let derived = Container::new(derive(&self.snapshot()), *self.config());

        let upstream = self.downgrade();
        let target = derived.clone();
        self.subscribe(move |_| {
            let Some(upstream) = upstream.upgrade() else {
                return;
            };
            let values = derive(&upstream.snapshot());
            tracing::debug!(
                source = ?upstream.id(),
                derived = ?target.id(),
                len = values.len(),
                "recomputed derived container"
            );
            target.replace_all(values);
            target.notify("derived", Change::Derived { source });
        });

        derived
    }
}
