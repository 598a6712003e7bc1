//! Nested Object Reactivity
//!
//! Values read out of a container may themselves be arrays or objects. With
//! deep reactivity on they are handed out wrapped:
//!
//! - arrays become a [`Container`] over a copy of the elements that shares
//!   the parent's configuration;
//! - objects become a [`ReactiveObject`], a path-tracking view.
//!
//! A `ReactiveObject` tracks and announces keys as dotted paths. Reading
//! `done` from the view at `items.0` records `items.0.done` on the owning
//! container; writing it notifies the owning container with that same key.
//! Objects and arrays nested inside an object view are wrapped as further
//! views, to any depth, so paths keep growing rather than restarting.
//!
//! A view of a container element addresses the element by position. If the
//! sequence is reordered the view follows the position, not the value.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use smallvec::SmallVec;

use crate::error::{Error, Result};

use super::change::Change;
use super::container::{resize_with_nulls, Container, MAX_INDEX};

/// A value read through the reactive layer.
#[derive(Debug, Clone)]
pub enum ReactiveValue {
    /// A primitive, or any value when deep reactivity is off.
    Value(Value),
    /// A nested array.
    Array(Container),
    /// A nested object.
    Object(ReactiveObject),
}

impl ReactiveValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ReactiveValue::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            ReactiveValue::Array(container) => Some(container),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            ReactiveValue::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Plain copy of the wrapped value. Not tracked.
    pub fn to_value(&self) -> Value {
        match self {
            ReactiveValue::Value(value) => value.clone(),
            ReactiveValue::Array(container) => Value::Array(container.snapshot()),
            ReactiveValue::Object(object) => object.to_value().unwrap_or(Value::Null),
        }
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone)]
enum Root {
    /// An element of the owning container's storage.
    Element(usize),
    /// A value handed to `make_reactive`, owned by the view.
    Detached(Arc<RwLock<Value>>),
}

/// Path-tracking view of a nested object (or of an array inside one).
#[derive(Clone)]
pub struct ReactiveObject {
    owner: Container,
    root: Root,
    segments: SmallVec<[Segment; 4]>,
    path: String,
}

fn join(path: &str, prop: &str) -> String {
    if path.is_empty() {
        prop.to_owned()
    } else {
        format!("{path}.{prop}")
    }
}

fn descend<'a>(mut value: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    for segment in segments {
        value = match segment {
            Segment::Key(key) => value.get(key.as_str())?,
            Segment::Index(index) => value.get(*index)?,
        };
    }
    Some(value)
}

fn descend_mut<'a>(mut value: &'a mut Value, segments: &[Segment]) -> Option<&'a mut Value> {
    for segment in segments {
        value = match segment {
            Segment::Key(key) => value.get_mut(key.as_str())?,
            Segment::Index(index) => value.get_mut(*index)?,
        };
    }
    Some(value)
}

/// How `prop` addresses a child of `value`, if it can.
fn child_segment(value: &Value, prop: &str) -> Option<Segment> {
    match value {
        Value::Object(_) => Some(Segment::Key(prop.to_owned())),
        Value::Array(_) => prop.parse().ok().map(Segment::Index),
        _ => None,
    }
}

impl ReactiveObject {
    pub(crate) fn element(owner: Container, index: usize) -> Self {
        Self {
            owner,
            root: Root::Element(index),
            segments: SmallVec::new(),
            path: index.to_string(),
        }
    }

    fn detached(owner: Container, value: Value, path: String) -> Self {
        Self {
            owner,
            root: Root::Detached(Arc::new(RwLock::new(value))),
            segments: SmallVec::new(),
            path,
        }
    }

    /// The dotted path of this view.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The container notified by writes through this view.
    pub fn owner(&self) -> &Container {
        &self.owner
    }

    fn with_target<R>(&self, f: impl FnOnce(Option<&Value>) -> R) -> R {
        match &self.root {
            Root::Element(index) => {
                let data = self.owner.data();
                f(data.get(*index).and_then(|v| descend(v, &self.segments)))
            }
            Root::Detached(cell) => f(descend(&cell.read(), &self.segments)),
        }
    }

    fn with_target_mut<R>(&self, f: impl FnOnce(Option<&mut Value>) -> R) -> R {
        match &self.root {
            Root::Element(index) => {
                let mut data = self.owner.data_mut();
                f(data.get_mut(*index).and_then(|v| descend_mut(v, &self.segments)))
            }
            Root::Detached(cell) => f(descend_mut(&mut cell.write(), &self.segments)),
        }
    }

    /// Read `prop`, tracking `<path>.<prop>`.
    pub fn get(&self, prop: &str) -> Option<ReactiveValue> {
        let key = join(&self.path, prop);
        self.owner.track(&key);

        let (segment, child) = self.with_target(|target| {
            let target = target?;
            let segment = child_segment(target, prop)?;
            let child = match &segment {
                Segment::Key(k) => target.get(k.as_str()),
                Segment::Index(i) => target.get(*i),
            }?;
            Some((segment, child.clone()))
        })?;

        if self.owner.config().deep && (child.is_object() || child.is_array()) {
            let mut segments = self.segments.clone();
            segments.push(segment);
            return Some(ReactiveValue::Object(ReactiveObject {
                owner: self.owner.clone(),
                root: self.root.clone(),
                segments,
                path: key,
            }));
        }
        Some(ReactiveValue::Value(child))
    }

    /// Write `prop` and notify the owner with key `<path>.<prop>`.
    pub fn set(&self, prop: &str, value: Value) -> Result<()> {
        let key = join(&self.path, prop);
        let new_value = value.clone();

        let old_value = self.with_target_mut(|target| match target {
            Some(Value::Object(map)) => Ok(map.insert(prop.to_owned(), value).unwrap_or(Value::Null)),
            Some(Value::Array(items)) => {
                let index = prop
                    .parse::<usize>()
                    .ok()
                    .filter(|&index| index <= MAX_INDEX)
                    .ok_or_else(|| Error::RejectedWrite { key: key.clone() })?;
                if index >= items.len() {
                    resize_with_nulls(items, index + 1)
                        .map_err(|_| Error::IndexOutOfRange { index })?;
                }
                Ok(std::mem::replace(&mut items[index], value))
            }
            _ => Err(Error::Detached {
                path: self.path.clone(),
            }),
        })?;

        self.owner.notify(
            key.clone(),
            Change::Path {
                path: key,
                old_value,
                new_value,
            },
        );
        Ok(())
    }

    /// Property names (or indices) of the viewed value. Not tracked.
    pub fn keys(&self) -> Vec<String> {
        self.with_target(|target| match target {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            Some(Value::Array(items)) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        })
    }

    /// Plain copy of the viewed value, or `None` if it is gone. Not tracked.
    pub fn to_value(&self) -> Option<Value> {
        self.with_target(|target| target.cloned())
    }
}

impl std::fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveObject")
            .field("owner", &self.owner.id())
            .field("path", &self.path)
            .finish()
    }
}

impl Container {
    /// Wrap `value` reactively under `path`.
    ///
    /// Arrays become a new container sharing this container's configuration,
    /// objects become a view whose writes notify this container, and
    /// primitives are returned as they are.
    pub fn make_reactive(&self, value: Value, path: impl Into<String>) -> ReactiveValue {
        match value {
            Value::Array(items) => ReactiveValue::Array(Container::new(items, *self.config())),
            Value::Object(_) => {
                ReactiveValue::Object(ReactiveObject::detached(self.clone(), value, path.into()))
            }
            other => ReactiveValue::Value(other),
        }
    }
}
