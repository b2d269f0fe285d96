//! # dispatchq
//!
//! Deduplicating, bounded-concurrency work dispatcher.
//!
//! Feed keys into a channel; each distinct key is processed at most once
//! while it is queued or running, in arrival order, with at most
//! `max_concurrency` processor calls in parallel.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod telemetry;

pub use engine::{DispatchQueue, QueueMonitor, QueueSnapshot};
pub use error::{Error, Result};
pub use model::{DispatchKey, InstanceKey};
