//! Relay module
//!
//! A TCP relay that forwards every inbound connection to a fixed remote,
//! optionally terminating TLS on the listener and originating TLS towards the
//! remote. A [`Handler`] sees every chunk before it is forwarded.
//!
//! The accept loop is controlled through messages sent over a
//! [`RelayHandle`], so stopping a relay never contends with connection tasks.

mod forwarder;
mod handler;
mod message;
mod server;

pub use forwarder::proxy_data;
pub use handler::{Direction, Flow, Handler, Passthrough};
pub use message::{RelayHandle, RelayMessage, RelayStats};
pub use server::{run_proxy, run_proxy_async, Relay};
