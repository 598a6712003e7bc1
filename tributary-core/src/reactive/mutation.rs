//! Mutation-Aware Sequence Operations
//!
//! Every in-place sequence operation runs through [`Container::apply`]. The
//! whitelisted operations (push, pop, shift, unshift, splice, sort, reverse)
//! produce a [`MutationRecord`] holding the call arguments plus the length
//! and full contents before and after, and announce it under the
//! `mutation` key. Operations outside the whitelist (`fill`) change the
//! storage silently. With `track_mutations` off nothing is recorded or
//! announced.
//!
//! Each operation returns what the underlying sequence operation returns.

use std::cmp::Ordering;
use std::ops::RangeBounds;

use serde_json::Value;

use crate::error::{Error, Result};

use super::change::{Change, MutationKind, MutationRecord};
use super::container::{clamp_range, Container};

/// A sequence operation reachable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceOp {
    Push,
    Pop,
    Shift,
    Unshift,
    Splice,
    Sort,
    Reverse,
    Fill,
}

impl SequenceOp {
    const ALL: [SequenceOp; 8] = [
        SequenceOp::Push,
        SequenceOp::Pop,
        SequenceOp::Shift,
        SequenceOp::Unshift,
        SequenceOp::Splice,
        SequenceOp::Sort,
        SequenceOp::Reverse,
        SequenceOp::Fill,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            SequenceOp::Push => "push",
            SequenceOp::Pop => "pop",
            SequenceOp::Shift => "shift",
            SequenceOp::Unshift => "unshift",
            SequenceOp::Splice => "splice",
            SequenceOp::Sort => "sort",
            SequenceOp::Reverse => "reverse",
            SequenceOp::Fill => "fill",
        }
    }

    /// The record kind, or `None` for operations outside the whitelist.
    pub fn mutation_kind(self) -> Option<MutationKind> {
        match self {
            SequenceOp::Push => Some(MutationKind::Append),
            SequenceOp::Pop => Some(MutationKind::RemoveLast),
            SequenceOp::Shift => Some(MutationKind::RemoveFirst),
            SequenceOp::Unshift => Some(MutationKind::InsertFront),
            SequenceOp::Splice => Some(MutationKind::Splice),
            SequenceOp::Sort => Some(MutationKind::Sort),
            SequenceOp::Reverse => Some(MutationKind::Reverse),
            SequenceOp::Fill => None,
        }
    }
}

impl Container {
    /// Run `op` against the storage, recording and announcing it if it is
    /// whitelisted and mutation tracking is on.
    pub(crate) fn apply<R>(
        &self,
        op: SequenceOp,
        args: Vec<Value>,
        run: impl FnOnce(&mut Vec<Value>) -> R,
    ) -> R {
        let kind = op
            .mutation_kind()
            .filter(|_| self.config().track_mutations);

        let (result, record) = {
            let mut data = self.data_mut();
            let before = kind.map(|_| (data.len(), data.clone()));
            let result = run(&mut data);
            let record = kind.zip(before).map(|(kind, (old_length, old_array))| MutationRecord {
                kind,
                args,
                old_length,
                new_length: data.len(),
                old_array,
                new_array: data.clone(),
            });
            (result, record)
        };

        if let Some(record) = record {
            tracing::trace!(container = ?self.id(), op = op.name(), "recorded mutation");
            self.notify("mutation", Change::Mutation(record));
        }
        result
    }

    /// Append `value`. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.apply(SequenceOp::Push, vec![value.clone()], |data| {
            data.push(value);
            data.len()
        })
    }

    /// Remove and return the last element.
    pub fn pop(&self) -> Option<Value> {
        self.apply(SequenceOp::Pop, Vec::new(), Vec::pop)
    }

    /// Remove and return the first element.
    pub fn shift(&self) -> Option<Value> {
        self.apply(SequenceOp::Shift, Vec::new(), |data| {
            if data.is_empty() {
                None
            } else {
                Some(data.remove(0))
            }
        })
    }

    /// Insert `value` at the front. Returns the new length.
    pub fn unshift(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.apply(SequenceOp::Unshift, vec![value.clone()], |data| {
            data.insert(0, value);
            data.len()
        })
    }

    /// Remove `delete_count` elements from `start` and insert `items` in
    /// their place. Returns the removed elements.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let mut args = vec![Value::from(start), Value::from(delete_count)];
        args.extend(items.iter().cloned());
        self.apply(SequenceOp::Splice, args, |data| {
            splice_in_place(data, start, delete_count, items)
        })
    }

    /// Sort in place by [`compare_values`].
    pub fn sort(&self) {
        self.sort_by(compare_values);
    }

    /// Sort in place with a comparator.
    ///
    /// The comparator runs on a copy with no lock held, so it may read this
    /// container. The sorted copy replaces the storage afterwards.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) {
        let mut sorted = self.snapshot();
        sorted.sort_by(compare);
        self.apply(SequenceOp::Sort, Vec::new(), move |data| *data = sorted);
    }

    /// Reverse in place.
    pub fn reverse(&self) {
        self.apply(SequenceOp::Reverse, Vec::new(), |data| data.reverse());
    }

    /// Overwrite the elements in `range` with `value`. Not recorded.
    pub fn fill(&self, value: impl Into<Value>, range: impl RangeBounds<usize>) {
        let value = value.into();
        let args = vec![value.clone()];
        self.apply(SequenceOp::Fill, args, |data| {
            let (start, end) = clamp_range(range, data.len());
            data[start..end].fill(value);
        });
    }
}

fn splice_in_place(
    data: &mut Vec<Value>,
    start: usize,
    delete_count: usize,
    items: Vec<Value>,
) -> Vec<Value> {
    let start = start.min(data.len());
    let end = start.saturating_add(delete_count).min(data.len());
    data.splice(start..end, items).collect()
}

/// Total order over JSON values used by [`Container::sort`].
///
/// null < booleans < numbers < strings < arrays < objects. Numbers compare
/// numerically, strings lexicographically, arrays element-wise; objects of
/// equal rank compare by size.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(x, y)| compare_values(x, y))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// A sequence operation bound to a container, invoked with JSON arguments.
///
/// Returned by [`Container::read`] for operation names.
#[derive(Debug, Clone)]
pub struct BoundOperation {
    container: Container,
    op: SequenceOp,
}

impl BoundOperation {
    pub(crate) fn new(container: Container, op: SequenceOp) -> Self {
        Self { container, op }
    }

    pub fn op(&self) -> SequenceOp {
        self.op
    }

    /// Invoke the operation.
    ///
    /// - `push(items...)`, `unshift(items...)` → new length
    /// - `pop()`, `shift()` → removed element or null
    /// - `splice(start, deleteCount?, items...)` → removed elements; a
    ///   negative `start` counts from the end
    /// - `sort()`, `reverse()` → null
    /// - `fill(value, start?, end?)` → null
    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        let op = self.op;
        let container = &self.container;

        match op {
            SequenceOp::Push => {
                let items = args.clone();
                let len = container.apply(op, args, |data| {
                    data.extend(items);
                    data.len()
                });
                Ok(Value::from(len))
            }
            SequenceOp::Unshift => {
                let items = args.clone();
                let len = container.apply(op, args, |data| {
                    data.splice(0..0, items);
                    data.len()
                });
                Ok(Value::from(len))
            }
            SequenceOp::Pop | SequenceOp::Shift | SequenceOp::Sort | SequenceOp::Reverse => {
                if !args.is_empty() {
                    return Err(invalid(op, format!("expected no arguments, got {}", args.len())));
                }
                Ok(match op {
                    SequenceOp::Pop => container.pop().unwrap_or(Value::Null),
                    SequenceOp::Shift => container.shift().unwrap_or(Value::Null),
                    SequenceOp::Sort => {
                        container.sort();
                        Value::Null
                    }
                    _ => {
                        container.reverse();
                        Value::Null
                    }
                })
            }
            SequenceOp::Splice => {
                let start = int_arg(op, &args, 0)?
                    .ok_or_else(|| invalid(op, "missing start".to_string()))?;
                let delete_count = int_arg(op, &args, 1)?;
                let items: Vec<Value> = args.iter().skip(2).cloned().collect();

                let removed = container.apply(op, args, |data| {
                    let len = data.len() as i64;
                    let start = if start < 0 {
                        (len + start).max(0)
                    } else {
                        start.min(len)
                    };
                    let delete_count = delete_count.unwrap_or(len - start).clamp(0, len - start);
                    splice_in_place(data, start as usize, delete_count as usize, items)
                });
                Ok(Value::Array(removed))
            }
            SequenceOp::Fill => {
                let value = args
                    .first()
                    .cloned()
                    .ok_or_else(|| invalid(op, "missing value".to_string()))?;
                let start = index_arg(op, &args, 1)?.unwrap_or(0);
                let end = index_arg(op, &args, 2)?.unwrap_or(usize::MAX);
                container.fill(value, start..end);
                Ok(Value::Null)
            }
        }
    }
}

fn invalid(op: SequenceOp, reason: String) -> Error {
    Error::InvalidArguments {
        op: op.name(),
        reason,
    }
}

fn int_arg(op: SequenceOp, args: &[Value], pos: usize) -> Result<Option<i64>> {
    match args.get(pos) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(op, format!("argument {pos} must be an integer, got {value}"))),
    }
}

fn index_arg(op: SequenceOp, args: &[Value], pos: usize) -> Result<Option<usize>> {
    match int_arg(op, args, pos)? {
        Some(n) if n < 0 => Err(invalid(op, format!("argument {pos} must not be negative"))),
        other => Ok(other.map(|n| n as usize)),
    }
}
