//! Utilkit: a grab-bag of small helpers for scripts and services
//!
//! The crate collects utilities that tend to get rewritten in every project:
//!
//! - Logging setup with a rotating file logger and `p*!` print-and-log macros
//! - Terminal styling, date and duration formatting
//! - HTTP request wrappers (async and blocking) with status checking, download and upload
//! - A SQLite backed key-value store
//! - A lazily growing thread pool and an async batch runner with a progress bar
//! - A TCP relay that can terminate or originate TLS and inspect the traffic
//! - Small data, crypto, OS and URL helpers
//!
//! # Example
//!
//! ```no_run
//! use utilkit::config::RelaySettings;
//! use utilkit::relay::{run_proxy, Passthrough};
//!
//! fn main() -> utilkit::Result<()> {
//!     let mut settings = RelaySettings::new("127.0.0.1:8443", "example.com:443");
//!     settings.tls_upstream = true;
//!     run_proxy(settings, Passthrough)
//! }
//! ```

pub mod batch;
pub mod common;
pub mod config;
pub mod crypt;
pub mod data;
pub mod datetime;
pub mod func;
pub mod http;
pub mod kv;
pub mod os;
pub mod relay;
pub mod style;
pub mod thread;
pub mod timing;
pub mod tls;
pub mod urls;

// Re-export commonly used structures and functions for convenience
pub use common::{init_logger, parse_socket_addr, Result, UtilError};
pub use config::RelaySettings;
pub use func::sneaky;
pub use kv::KvStore;
pub use relay::{run_proxy, run_proxy_async, Relay};

#[doc(hidden)]
pub use log as __log;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
