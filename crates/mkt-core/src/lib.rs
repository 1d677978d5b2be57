//! # mkt-core
//!
//! Core crate for the market stream publisher, providing:
//!
//! - **Types** (`types`) — market definitions, match results, batches, reports
//! - **Configuration** (`config`) — JSON config deserialization and validation
//! - **Error types** (`error`) — `StreamError` via thiserror
//! - **Latency** (`latency`) — histogram-based publish latency statistics
//! - **Time utilities** (`time_util`) — timestamp formatting for logs
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod latency;
pub mod logging;
pub mod time_util;
pub mod types;

pub use error::StreamError;
pub use types::*;
