//! Error handling module
//!
//! This module defines the error type and result alias shared by every helper in the crate.

use std::io;
use thiserror::Error;

/// Utilkit error type
#[derive(Error, Debug)]
pub enum UtilError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// OpenSSL error
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    /// TLS handshake error
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport level HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("HTTP status {status} for {url}")]
    HttpStatus {
        status: u16,
        url: String,
        body: String,
    },

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed lookup path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Encryption/decryption error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Bcrypt error
    #[error("Bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),

    /// An operation did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A pooled task panicked
    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    /// A shell script exited with a non-zero code
    #[error("Subprocess failed ({code}): {output}")]
    ScriptFailed { code: i32, output: String },

    /// Invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Logger could not be installed
    #[error("Logger error: {0}")]
    Logger(String),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl From<config::ConfigError> for UtilError {
    fn from(err: config::ConfigError) -> Self {
        UtilError::Config(err.to_string())
    }
}

impl From<log::SetLoggerError> for UtilError {
    fn from(err: log::SetLoggerError) -> Self {
        UtilError::Logger(err.to_string())
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `UtilError`.
pub type Result<T> = std::result::Result<T, UtilError>;
