//! Container Implementation
//!
//! A [`Container`] is the reactive wrapper around an ordered sequence of
//! values. It is the only entry point into the engine: every read goes
//! through it so it can be tracked, every write goes through it so it can be
//! announced.
//!
//! # Access Surface
//!
//! The typed accessors (`len`, `get`, `set`, `set_len`, the sequence
//! operations) are the normal way in. For callers that address the sequence
//! by property name, [`Container::read`], [`Container::write`] and
//! [`Container::has`] classify the key the same way:
//!
//! | key                        | read               | write               |
//! |----------------------------|--------------------|---------------------|
//! | `length`                   | tracks `length`    | truncates / extends |
//! | integer in `0..=MAX_INDEX` | tracks `index:<i>` | stores the element  |
//! | sequence operation name    | bound operation    | rejected            |
//! | container method name      | method             | rejected            |
//! | anything else              | nothing            | rejected            |
//!
//! Indices stop at [`MAX_INDEX`] and lengths at [`MAX_LENGTH`]. Larger
//! integer keys are ordinary numbers, not indices.
//!
//! # Sharing
//!
//! `Container` is a handle. Clones share storage, version, subscribers and
//! computeds.

use std::collections::TryReserveError;
use std::ops::{Bound, RangeBounds};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::Value;

use crate::config::Config;
use crate::error::{Error, Result};

use super::bus::Bus;
use super::change::{Change, Notification};
use super::computed::Computed;
use super::context;
use super::mutation::{BoundOperation, SequenceOp};
use super::object::{ReactiveObject, ReactiveValue};
use super::subscriber::Subscription;

/// Largest writable index.
pub const MAX_INDEX: usize = (u32::MAX - 1) as usize;

/// Largest length a container can be given.
pub const MAX_LENGTH: usize = u32::MAX as usize;

/// Unique identifier for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(u64);

impl ContainerId {
    /// Generate a new unique container ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ContainerId {
    fn default() -> Self {
        Self::new()
    }
}

/// A property key, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKey<'a> {
    /// `length`
    Length,
    /// A numeric key addressing an element.
    Index(usize),
    /// A finite number that cannot address an element (negative or fractional).
    OtherNumber(&'a str),
    /// Any other name.
    Name(&'a str),
}

impl<'a> PropertyKey<'a> {
    pub fn parse(key: &'a str) -> Self {
        if key == "length" {
            return PropertyKey::Length;
        }
        match key.parse::<f64>() {
            Ok(n) if n.is_finite() => {
                if n >= 0.0 && n.fract() == 0.0 && n <= MAX_INDEX as f64 {
                    PropertyKey::Index(n as usize)
                } else {
                    PropertyKey::OtherNumber(key)
                }
            }
            _ => PropertyKey::Name(key),
        }
    }
}

/// Public container methods reachable by name through [`Container::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerMethod {
    Subscribe,
    Computed,
    TryComputed,
    Map,
    Filter,
    Reduce,
    Find,
    FindIndex,
    Includes,
    Slice,
    DerivedMap,
    DerivedFilter,
}

impl ContainerMethod {
    const ALL: [ContainerMethod; 12] = [
        ContainerMethod::Subscribe,
        ContainerMethod::Computed,
        ContainerMethod::TryComputed,
        ContainerMethod::Map,
        ContainerMethod::Filter,
        ContainerMethod::Reduce,
        ContainerMethod::Find,
        ContainerMethod::FindIndex,
        ContainerMethod::Includes,
        ContainerMethod::Slice,
        ContainerMethod::DerivedMap,
        ContainerMethod::DerivedFilter,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|method| method.as_str() == name)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContainerMethod::Subscribe => "subscribe",
            ContainerMethod::Computed => "computed",
            ContainerMethod::TryComputed => "try_computed",
            ContainerMethod::Map => "map",
            ContainerMethod::Filter => "filter",
            ContainerMethod::Reduce => "reduce",
            ContainerMethod::Find => "find",
            ContainerMethod::FindIndex => "find_index",
            ContainerMethod::Includes => "includes",
            ContainerMethod::Slice => "slice",
            ContainerMethod::DerivedMap => "derived_map",
            ContainerMethod::DerivedFilter => "derived_filter",
        }
    }
}

/// Result of reading a key through [`Container::read`].
#[derive(Debug, Clone)]
pub enum Access {
    Length(usize),
    Element(ReactiveValue),
    Operation(BoundOperation),
    Method(ContainerMethod),
}

struct Shared {
    id: ContainerId,
    config: Config,
    data: RwLock<Vec<Value>>,
    bus: Arc<Bus>,
}

/// A reactive ordered sequence of values.
#[derive(Clone)]
pub struct Container {
    shared: Arc<Shared>,
}

/// Non-owning container handle.
#[derive(Clone)]
pub(crate) struct WeakContainer {
    shared: Weak<Shared>,
}

impl WeakContainer {
    pub(crate) fn upgrade(&self) -> Option<Container> {
        self.shared.upgrade().map(|shared| Container { shared })
    }
}

impl Container {
    /// Create a container over `values`.
    pub fn new(values: Vec<Value>, config: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: ContainerId::new(),
                config,
                data: RwLock::new(values),
                bus: Arc::new(Bus::new(config.batch_updates)),
            }),
        }
    }

    /// Create a container with the default configuration.
    pub fn from_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(values.into_iter().map(Into::into).collect(), Config::default())
    }

    /// Create an empty container.
    pub fn with_config(config: Config) -> Self {
        Self::new(Vec::new(), config)
    }

    pub fn id(&self) -> ContainerId {
        self.shared.id
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Number of notifications issued so far.
    pub fn version(&self) -> u64 {
        self.shared.bus.version()
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.bus.subscriber_count()
    }

    /// Whether a batched flush is waiting on the microtask queue.
    pub fn is_flush_scheduled(&self) -> bool {
        self.shared.bus.is_flush_scheduled()
    }

    pub(crate) fn downgrade(&self) -> WeakContainer {
        WeakContainer {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub(crate) fn data(&self) -> RwLockReadGuard<'_, Vec<Value>> {
        self.shared.data.read()
    }

    pub(crate) fn data_mut(&self) -> RwLockWriteGuard<'_, Vec<Value>> {
        self.shared.data.write()
    }

    /// Overwrite the storage without notifying.
    pub(crate) fn replace_all(&self, values: Vec<Value>) {
        *self.data_mut() = values;
    }

    pub(crate) fn track(&self, key: &str) {
        context::track(self.shared.id, key);
    }

    /// Announce a change to subscribers and computeds.
    pub(crate) fn notify(&self, key: impl Into<String>, change: Change) {
        self.shared.bus.notify(key.into(), change);
    }

    // ------------------------------------------------------------------------
    // Subscriptions and computeds
    // ------------------------------------------------------------------------

    /// Register a callback for every notification of this container.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(Arc::new(callback))
    }

    /// Create a computed value invalidated by any change to this container.
    pub fn computed<T, F>(&self, evaluate: F) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.try_computed(move || Ok(evaluate()))
    }

    /// Like [`Container::computed`] for evaluations that can fail.
    pub fn try_computed<T, E, F>(&self, evaluate: F) -> Computed<T, E>
    where
        T: Clone + Send + Sync + 'static,
        E: 'static,
        F: Fn() -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        let computed = Computed::new(evaluate);
        self.shared.bus.register_computed(computed.invalidator());
        computed
    }

    // ------------------------------------------------------------------------
    // Keyed access
    // ------------------------------------------------------------------------

    /// Read a property by name.
    pub fn read(&self, key: &str) -> Option<Access> {
        match PropertyKey::parse(key) {
            PropertyKey::Length => Some(Access::Length(self.len())),
            PropertyKey::Index(index) => self.get(index).map(Access::Element),
            PropertyKey::OtherNumber(raw) => {
                context::track_with(self.shared.id, || format!("index:{raw}"));
                None
            }
            PropertyKey::Name(name) => {
                if let Some(op) = SequenceOp::from_name(name) {
                    Some(Access::Operation(BoundOperation::new(self.clone(), op)))
                } else {
                    ContainerMethod::from_name(name).map(Access::Method)
                }
            }
        }
    }

    /// Write a property by name. Only `length` and indices are writable.
    pub fn write(&self, key: &str, value: Value) -> Result<()> {
        match PropertyKey::parse(key) {
            PropertyKey::Length => {
                let len = value
                    .as_u64()
                    .and_then(|len| usize::try_from(len).ok())
                    .ok_or_else(|| Error::InvalidLength {
                        value: value.clone(),
                    })?;
                self.set_len(len)
            }
            PropertyKey::Index(index) => self.set(index, value),
            PropertyKey::OtherNumber(_) | PropertyKey::Name(_) => {
                tracing::debug!(container = ?self.id(), key, "rejected write");
                Err(Error::RejectedWrite {
                    key: key.to_owned(),
                })
            }
        }
    }

    /// Check whether `key` names something on this container.
    pub fn has(&self, key: &str) -> bool {
        match PropertyKey::parse(key) {
            PropertyKey::Length => true,
            PropertyKey::Index(index) => index < self.data().len(),
            PropertyKey::OtherNumber(_) => false,
            PropertyKey::Name(name) => {
                SequenceOp::from_name(name).is_some() || ContainerMethod::from_name(name).is_some()
            }
        }
    }

    // ------------------------------------------------------------------------
    // Typed access
    // ------------------------------------------------------------------------

    /// Current length. Tracks `length`.
    pub fn len(&self) -> usize {
        self.track("length");
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, wrapped reactively when it is an array or object
    /// and deep reactivity is on. Tracks `index:<i>`.
    pub fn get(&self, index: usize) -> Option<ReactiveValue> {
        let value = self.value_at(index)?;
        if !self.shared.config.deep {
            return Some(ReactiveValue::Value(value));
        }
        Some(match value {
            Value::Array(items) => ReactiveValue::Array(Container::new(items, self.shared.config)),
            Value::Object(_) => {
                ReactiveValue::Object(ReactiveObject::element(self.clone(), index))
            }
            other => ReactiveValue::Value(other),
        })
    }

    /// Raw element at `index`. Tracks `index:<i>`.
    pub fn value_at(&self, index: usize) -> Option<Value> {
        context::track_with(self.shared.id, || format!("index:{index}"));
        self.peek(index)
    }

    /// Store `value` at `index`, padding with nulls past the end.
    ///
    /// Fails without notifying when `index` exceeds [`MAX_INDEX`] or the
    /// storage cannot grow that far.
    pub fn set(&self, index: usize, value: Value) -> Result<()> {
        if index > MAX_INDEX {
            return Err(Error::IndexOutOfRange { index });
        }
        let old_value = {
            let mut data = self.data_mut();
            if index >= data.len() {
                resize_with_nulls(&mut data, index + 1)
                    .map_err(|_| Error::IndexOutOfRange { index })?;
            }
            std::mem::replace(&mut data[index], value.clone())
        };

        self.notify(
            format!("index:{index}"),
            Change::Index {
                index,
                old_value,
                new_value: value,
            },
        );
        Ok(())
    }

    /// Truncate or extend (with nulls) to `len`.
    ///
    /// Fails without notifying when `len` exceeds [`MAX_LENGTH`] or the
    /// storage cannot grow that far.
    pub fn set_len(&self, len: usize) -> Result<()> {
        let invalid = || Error::InvalidLength {
            value: Value::from(len),
        };
        if len > MAX_LENGTH {
            return Err(invalid());
        }
        let old_len = {
            let mut data = self.data_mut();
            let old_len = data.len();
            resize_with_nulls(&mut data, len).map_err(|_| invalid())?;
            old_len
        };

        self.notify(
            "length",
            Change::Length {
                old_value: old_len,
                new_value: len,
            },
        );
        Ok(())
    }

    /// Copy of the current contents. Not tracked.
    pub fn snapshot(&self) -> Vec<Value> {
        self.data().clone()
    }

    /// Element at `index` without tracking.
    pub fn peek(&self, index: usize) -> Option<Value> {
        self.data().get(index).cloned()
    }

    // ------------------------------------------------------------------------
    // Read-only passthroughs, each tracked under its own name
    // ------------------------------------------------------------------------

    pub fn map<U>(&self, f: impl FnMut(&Value) -> U) -> Vec<U> {
        self.track("map");
        self.snapshot().iter().map(f).collect()
    }

    pub fn filter(&self, mut predicate: impl FnMut(&Value) -> bool) -> Vec<Value> {
        self.track("filter");
        self.snapshot().into_iter().filter(|v| predicate(v)).collect()
    }

    pub fn reduce<A>(&self, init: A, mut f: impl FnMut(A, &Value) -> A) -> A {
        self.track("reduce");
        self.snapshot().iter().fold(init, |acc, v| f(acc, v))
    }

    pub fn find(&self, mut predicate: impl FnMut(&Value) -> bool) -> Option<Value> {
        self.track("find");
        self.snapshot().into_iter().find(|v| predicate(v))
    }

    pub fn find_index(&self, predicate: impl FnMut(&Value) -> bool) -> Option<usize> {
        self.track("find_index");
        self.snapshot().iter().position(predicate)
    }

    pub fn includes(&self, value: &Value) -> bool {
        self.track("includes");
        self.data().contains(value)
    }

    /// Copy of the elements in `range`, clamped to the current length.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Vec<Value> {
        self.track("slice");
        let data = self.data();
        let (start, end) = clamp_range(range, data.len());
        data[start..end].to_vec()
    }
}

/// Resize to `len`, reserving first so an impossible length is an error
/// rather than an allocation abort.
pub(crate) fn resize_with_nulls(
    data: &mut Vec<Value>,
    len: usize,
) -> std::result::Result<(), TryReserveError> {
    if len > data.len() {
        data.try_reserve(len - data.len())?;
    }
    data.resize(len, Value::Null);
    Ok(())
}

/// Resolve `range` against `len`, clamping both ends.
pub(crate) fn clamp_range(range: impl RangeBounds<usize>, len: usize) -> (usize, usize) {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    let end = end.min(len);
    (start.min(end), end)
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.shared.id)
            .field("len", &self.data().len())
            .field("version", &self.version())
            .field("subscriber_count", &self.subscriber_count())
            .field("config", &self.shared.config)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
