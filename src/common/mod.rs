//! Common module
//!
//! This module contains the shared error type, logging setup and small
//! file/network utilities used throughout the crate.

pub mod error;
pub mod fs;
pub mod log;
pub mod net;
pub mod progress;

// Re-export commonly used types and functions
pub use error::{Result, UtilError};
pub use fs::{check_file_exists, read_file};
pub use self::log::{configure_logging, init_logger, parse_level, RotatingFile};
pub use net::{
    acceptall, bind_reuse_listener, is_port_in_use, is_readable, listener_info, parse_socket_addr,
    recvall, sendall, sock_connect, sockinfo, split_host_port,
};
