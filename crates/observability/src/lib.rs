//! Observability for peerchat.
//!
//! - [`args`] - CLI argument struct for logging
//! - [`logging`] - Logging initialization and the startup banner

pub mod args;
pub mod logging;

pub use args::{LogArgs, LogLevel};
pub use logging::{init_logging, print_banner};
