//! Reactive Containers
//!
//! This module implements the reactivity engine: containers, the dependency
//! tracker, the notification bus, computed values and derived containers.
//!
//! # Concepts
//!
//! ## Containers
//!
//! A [`Container`] wraps an ordered sequence of JSON values. Reads through
//! the container are tracked under keys such as `length` or `index:3`.
//! Writes and sequence operations bump the container's version and notify
//! its subscribers, either immediately or once per tick when batching is on.
//!
//! ## Computeds
//!
//! A [`Computed`] caches a value derived from a container. It is invalidated
//! by any notification of that container and re-evaluates lazily on the
//! next read. The keys it read are recorded for inspection but do not narrow
//! invalidation.
//!
//! ## Derived Containers
//!
//! `derived_map` and `derived_filter` build containers that recompute from
//! their source on every source notification.
//!
//! # Implementation Notes
//!
//! Dependency tracking uses a thread-local slot holding the dependency set
//! of the evaluation in progress (see [`context`]). Batched flushes run on a
//! thread-local microtask queue (see [`runtime`]) that the host drains at
//! the end of each unit of work.

pub mod context;
pub mod runtime;
mod subscriber;
mod change;
mod bus;
mod computed;
mod container;
mod mutation;
mod object;
mod derived;

pub use subscriber::{Callback, SubscriberId, Subscription};
pub use change::{Change, DerivedSource, MutationKind, MutationRecord, Notification, QueuedChange};
pub use computed::{Computed, ComputedState};
pub use container::{
    Access, Container, ContainerId, ContainerMethod, PropertyKey, MAX_INDEX, MAX_LENGTH,
};
pub use context::Dependency;
pub use mutation::{compare_values, BoundOperation, SequenceOp};
pub use object::{ReactiveObject, ReactiveValue};
pub use runtime::{run_microtasks, tick};
