//! Dispatch engine: the queue, its bookkeeping, and the command-hook processor.

pub mod dispatch;
pub mod hook;
pub mod state;

pub use dispatch::{DispatchQueue, QueueMonitor};
pub use hook::HookCommand;
pub use state::{Counters, QueueSnapshot, Slot};
