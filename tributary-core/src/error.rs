//! Error types for the reactive container.
//!
//! Only operations that can be refused by the container itself report
//! through [`Error`]. Failures raised by a computed value's evaluation
//! function are the caller's own error type and pass through untouched.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by container operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A write targeted a key that is neither `length` nor a numeric index.
    #[error("cannot write property `{key}`: only `length` and numeric indices are writable")]
    RejectedWrite { key: String },

    /// `length` was assigned something that is not a non-negative integer,
    /// or a length beyond the maximum the container can hold.
    #[error("invalid length {value}")]
    InvalidLength { value: serde_json::Value },

    /// An index write beyond the largest addressable index, or one the
    /// storage could not grow to hold.
    #[error("index {index} is out of range")]
    IndexOutOfRange { index: usize },

    /// A dynamically invoked sequence operation received malformed arguments.
    #[error("invalid arguments for `{op}`: {reason}")]
    InvalidArguments { op: &'static str, reason: String },

    /// A nested object write whose target no longer exists.
    #[error("nested value at `{path}` is no longer reachable")]
    Detached { path: String },

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}
