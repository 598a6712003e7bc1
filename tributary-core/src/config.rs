//! Container Configuration
//!
//! Every container carries an immutable [`Config`]. Containers created from
//! another container (nested array views, derived containers) share their
//! parent's configuration.
//!
//! Configuration can be built in code or parsed from a JSON object using the
//! `deep`, `trackMutations` and `batchUpdates` keys. Unknown keys are
//! ignored and missing keys fall back to their defaults.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Behavior switches for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Wrap nested arrays and objects reactively when they are read.
    pub deep: bool,

    /// Build mutation records for whitelisted sequence operations.
    pub track_mutations: bool,

    /// Coalesce notifications into one flush per tick instead of
    /// dispatching them immediately.
    pub batch_updates: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deep: true,
            track_mutations: true,
            batch_updates: false,
        }
    }
}

impl Config {
    /// Parse a configuration from a JSON object.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn track_mutations(mut self, track: bool) -> Self {
        self.track_mutations = track;
        self
    }

    pub fn batch_updates(mut self, batch: bool) -> Self {
        self.batch_updates = batch;
        self
    }
}
