//! Configuration module
//!
//! Relay settings, their defaults, validation, and loading from a JSON file
//! and `UTILKIT_RELAY_*` environment variables.

mod defaults;
mod loader;

pub use self::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX, LOG_LEVEL_STR};
pub use self::loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::common::{check_file_exists, split_host_port, Result, UtilError};

/// Relay configuration
///
/// Addresses are kept as `host:port` strings so that host names are resolved
/// at connect time and can be used for TLS server name indication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelaySettings {
    /// Address the relay listens on
    pub listen: String,
    /// Address every inbound connection is forwarded to
    pub remote: String,
    /// Originate TLS towards the remote
    pub tls_upstream: bool,
    /// Terminate TLS on the listener; uses a self-signed certificate unless files are given
    pub tls_server: bool,
    /// PEM certificate for the listener
    pub server_cert: Option<PathBuf>,
    /// PEM private key for the listener
    pub server_key: Option<PathBuf>,
    /// Read buffer size per direction
    pub buffer_size: usize,
    /// Outbound connect timeout in seconds
    pub connect_timeout: u64,
    /// Log level used by the command line tool
    pub log_level: String,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            remote: defaults::remote(),
            tls_upstream: false,
            tls_server: false,
            server_cert: None,
            server_key: None,
            buffer_size: defaults::buffer_size(),
            connect_timeout: defaults::connect_timeout(),
            log_level: defaults::log_level(),
        }
    }
}

impl RelaySettings {
    /// Plain relay from `listen` to `remote` with default options
    pub fn new(listen: impl Into<String>, remote: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
            remote: remote.into(),
            ..Self::default()
        }
    }

    /// Whether the listener terminates TLS
    pub fn server_tls_enabled(&self) -> bool {
        self.tls_server || (self.server_cert.is_some() && self.server_key.is_some())
    }

    /// Remote host and port
    pub fn remote_host_port(&self) -> Result<(String, u16)> {
        split_host_port(&self.remote)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Validate the settings
    ///
    /// Certificate and key must come together and exist on disk.
    pub fn validate(&self) -> Result<()> {
        split_host_port(&self.listen)?;
        split_host_port(&self.remote)?;

        if self.buffer_size == 0 {
            return Err(UtilError::Config("buffer_size must be greater than 0".to_string()));
        }

        match (&self.server_cert, &self.server_key) {
            (Some(cert), Some(key)) => {
                check_file_exists(cert)?;
                check_file_exists(key)?;
            }
            (None, None) => {}
            _ => {
                return Err(UtilError::Config(
                    "Both certfile and keyfile are required".to_string(),
                ))
            }
        }

        Ok(())
    }
}

impl fmt::Display for RelaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}){} => ({}){}",
            self.listen,
            if self.server_tls_enabled() { "(TLS)" } else { "" },
            self.remote,
            if self.tls_upstream { "(TLS)" } else { "" },
        )
    }
}
