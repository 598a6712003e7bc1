//! Change Records and Notification Payloads
//!
//! Everything a subscriber can observe is defined here. All payloads
//! serialize with serde into the JSON shapes consumers match against:
//!
//! - immediate dispatch: `{ key, change, version }`
//! - batched flush: `{ mutations: [change, ...], version }`
//! - mutation record: `{ type, args, oldLength, newLength, oldArray, newArray }`

use serde::Serialize;
use serde_json::Value;

/// Kind of a whitelisted, recorded sequence mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// `push`
    Append,
    /// `pop`
    RemoveLast,
    /// `shift`
    RemoveFirst,
    /// `unshift`
    InsertFront,
    Splice,
    Sort,
    Reverse,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Append => "append",
            MutationKind::RemoveLast => "remove_last",
            MutationKind::RemoveFirst => "remove_first",
            MutationKind::InsertFront => "insert_front",
            MutationKind::Splice => "splice",
            MutationKind::Sort => "sort",
            MutationKind::Reverse => "reverse",
        }
    }
}

/// Immutable snapshot of one mutating operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    #[serde(rename = "type")]
    pub kind: MutationKind,
    pub args: Vec<Value>,
    pub old_length: usize,
    pub new_length: usize,
    pub old_array: Vec<Value>,
    pub new_array: Vec<Value>,
}

/// Which factory produced a derived container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivedSource {
    Map,
    Filter,
}

/// Description of a single change carried by a notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Change {
    /// An element was written by index.
    #[serde(rename_all = "camelCase")]
    Index {
        index: usize,
        old_value: Value,
        new_value: Value,
    },

    /// The `length` property was written.
    #[serde(rename_all = "camelCase")]
    Length { old_value: usize, new_value: usize },

    /// A whitelisted sequence operation ran.
    Mutation(MutationRecord),

    /// A property of a nested object was written.
    #[serde(rename_all = "camelCase")]
    Path {
        path: String,
        old_value: Value,
        new_value: Value,
    },

    /// A derived container was recomputed from its source.
    Derived { source: DerivedSource },
}

impl Change {
    /// The mutation record, if this change carries one.
    pub fn as_mutation(&self) -> Option<&MutationRecord> {
        match self {
            Change::Mutation(record) => Some(record),
            _ => None,
        }
    }
}

/// One entry of a batched flush. Serializes as the bare change; the key is
/// kept for Rust callers only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueuedChange {
    #[serde(skip)]
    pub key: String,
    pub change: Change,
}

/// What a subscriber receives.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Notification {
    /// Dispatched synchronously from `notify` when batching is off.
    Immediate {
        key: String,
        change: Change,
        version: u64,
    },

    /// Dispatched once per flush when batching is on.
    Batch {
        mutations: Vec<QueuedChange>,
        version: u64,
    },
}

impl Notification {
    /// The container version at dispatch time.
    pub fn version(&self) -> u64 {
        match self {
            Notification::Immediate { version, .. } | Notification::Batch { version, .. } => {
                *version
            }
        }
    }

    /// Number of changes covered by this notification.
    pub fn change_count(&self) -> usize {
        match self {
            Notification::Immediate { .. } => 1,
            Notification::Batch { mutations, .. } => mutations.len(),
        }
    }
}
