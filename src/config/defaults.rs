//! Default configuration values
//!
//! Single source of truth for relay defaults.

/// Environment variable prefix for relay options, e.g. `UTILKIT_RELAY_BUFFER_SIZE`
pub const ENV_PREFIX: &str = "UTILKIT_RELAY";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "utilkit.json";

/// Default listen address
pub const LISTEN_STR: &str = "127.0.0.1:8080";

/// Default remote address
pub const REMOTE_STR: &str = "localhost:80";

/// Default log level
pub const LOG_LEVEL_STR: &str = "info";

pub fn listen() -> String {
    LISTEN_STR.to_string()
}

pub fn remote() -> String {
    REMOTE_STR.to_string()
}

pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default relay read buffer size (4KB)
pub fn buffer_size() -> usize {
    4096
}

/// Default outbound connect timeout in seconds
pub fn connect_timeout() -> u64 {
    30
}
