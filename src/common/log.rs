//! Logging helpers
//!
//! Console logger setup, a size-rotated file logger, and the `p*!` macros that
//! log a message and echo it to the terminal when the level is enabled.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use log::LevelFilter;

use super::error::{Result, UtilError};

/// Maximum size of one log file before it is rotated (10 MiB)
pub const LOG_FILE_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Number of rotated log files kept next to the active one
pub const LOG_FILE_BACKUPS: usize = 5;

const LOG_TIME_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

/// Initialize the console logger
///
/// `RUST_LOG` takes precedence over `level`. Calling it more than once is harmless.
///
/// # Parameters
///
/// * `level` - Log level
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Parse a log level name (`error`, `warn`, `info`, `debug`, `trace`, `off`)
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    LevelFilter::from_str(level)
        .map_err(|_| UtilError::Config(format!("Invalid log level: {}", level)))
}

/// Route all logging to `<tempdir>/<name>.log`
///
/// The file rotates at [`LOG_FILE_MAX_BYTES`] keeping [`LOG_FILE_BACKUPS`] old files.
/// Lines look like `05/17/2024 09:41:07 PM - my_crate::module - INFO - main - message`.
///
/// # Returns
///
/// The path of the active log file.
pub fn configure_logging(name: &str, level: Option<LevelFilter>) -> Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("{}.log", name));
    let writer = RotatingFile::open(&path, LOG_FILE_MAX_BYTES, LOG_FILE_BACKUPS)?;

    env_logger::Builder::new()
        .filter_level(level.unwrap_or(LevelFilter::Info))
        .target(env_logger::Target::Pipe(Box::new(writer)))
        .format(|buf, record| {
            let thread = std::thread::current();
            writeln!(
                buf,
                "{} - {} - {} - {} - {}",
                Local::now().format(LOG_TIME_FORMAT),
                record.target(),
                record.level(),
                thread.name().unwrap_or("unnamed"),
                record.args()
            )
        })
        .try_init()?;

    Ok(path)
}

/// A file writer that rotates by size, like `name.log`, `name.log.1` ... `name.log.N`
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    /// Open (append) the active file at `path`
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            backups,
            file,
            written,
        })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        let oldest = self.backup_path(self.backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.backups).rev() {
            let from = self.backup_path(index);
            if from.exists() {
                fs::rename(&from, self.backup_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;

        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.backups > 0 && self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Log at info level and print to stdout when info is enabled
#[macro_export]
macro_rules! pinfo {
    ($($arg:tt)+) => {{
        let msg = format!($($arg)+);
        $crate::__log::info!("{}", msg);
        if $crate::__log::log_enabled!($crate::__log::Level::Info) {
            println!("{}", msg);
        }
    }};
}

/// Log at debug level and print to stdout when debug is enabled
#[macro_export]
macro_rules! pdebug {
    ($($arg:tt)+) => {{
        let msg = format!($($arg)+);
        $crate::__log::debug!("{}", msg);
        if $crate::__log::log_enabled!($crate::__log::Level::Debug) {
            println!("{}", msg);
        }
    }};
}

/// Log at warn level and print to stderr when warn is enabled
#[macro_export]
macro_rules! pwarning {
    ($($arg:tt)+) => {{
        let msg = format!($($arg)+);
        $crate::__log::warn!("{}", msg);
        if $crate::__log::log_enabled!($crate::__log::Level::Warn) {
            eprintln!("{}", msg);
        }
    }};
}

/// Log at error level and print to stderr when error is enabled
#[macro_export]
macro_rules! perror {
    ($($arg:tt)+) => {{
        let msg = format!($($arg)+);
        $crate::__log::error!("{}", msg);
        if $crate::__log::log_enabled!($crate::__log::Level::Error) {
            eprintln!("{}", msg);
        }
    }};
}

/// Log at error level, print to stderr and exit with code 1
#[macro_export]
macro_rules! pfatal {
    ($($arg:tt)+) => {{
        let msg = format!($($arg)+);
        $crate::os::bye(&msg, 1)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_init_logger() {
        // Installs the global logger; only checks it does not panic when repeated
        init_logger("debug");
        init_logger("info");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("WARN").unwrap(), LevelFilter::Warn);
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn test_rotating_file_rotates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut writer = RotatingFile::open(&path, 16, 2).unwrap();

        writer.write_all(b"0123456789").unwrap();
        writer.write_all(b"abcdefghij").unwrap();
        writer.write_all(b"ABCDEFGHIJ").unwrap();
        writer.write_all(b"klmnopqrst").unwrap();
        writer.flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "klmnopqrst");
        assert_eq!(fs::read_to_string(dir.path().join("app.log.1")).unwrap(), "ABCDEFGHIJ");
        assert_eq!(fs::read_to_string(dir.path().join("app.log.2")).unwrap(), "abcdefghij");
        assert!(!dir.path().join("app.log.3").exists());
    }

    #[test]
    fn test_echo_macros_compile() {
        crate::pinfo!("hello {}", 1);
        crate::pdebug!("debug {}", 2);
        crate::pwarning!("warning");
        crate::perror!("error {:?}", "x");
    }
}
