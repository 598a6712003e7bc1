//! Tributary Core
//!
//! This crate provides a reactive container over an ordered sequence of
//! values, for in-process state management. It implements:
//!
//! - Tracked reads per element, per `length` and per nested object path
//! - Immediate or batched (once per tick) change notifications
//! - Lazily re-evaluated computed values
//! - Derived containers that follow a source through a map or filter
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: containers, dependency tracking, notification and computeds
//! - `config`: per-container behavior switches
//! - `error`: the crate error type
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tributary_core::{Config, Container, run_microtasks};
//!
//! let todos = Container::new(vec![json!(1), json!(2)], Config::default());
//!
//! // A cached value, invalidated by any change to the container
//! let source = todos.clone();
//! let total = todos.computed(move || {
//!     source.reduce(0, |acc, v| acc + v.as_i64().unwrap_or(0))
//! });
//! assert_eq!(total.get(), 3);
//!
//! // A container that follows the source
//! let doubled = todos.derived_map(|v| json!(v.as_i64().unwrap_or(0) * 2));
//!
//! todos.push(3);
//! run_microtasks();
//!
//! assert_eq!(total.get(), 6);
//! assert_eq!(doubled.snapshot(), vec![json!(2), json!(4), json!(6)]);
//! ```

pub mod config;
pub mod error;
pub mod reactive;

pub use config::Config;
pub use error::{Error, Result};
pub use reactive::{
    run_microtasks, tick, Computed, Container, Notification, ReactiveValue, Subscription,
};
