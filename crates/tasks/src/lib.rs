//! Task management for peerchat.
//!
//! - [`TaskExecutor`] spawns named tasks and supervises critical ones.
//! - [`CancelToken`] is the hierarchical cancellation signal every
//!   long-running loop is parented to.

mod cancel;
mod executor;
pub mod metrics;

pub use cancel::CancelToken;
pub use executor::TaskExecutor;
