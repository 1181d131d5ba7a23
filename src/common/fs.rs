//! File system helpers

use std::fs;
use std::path::Path;

use super::error::{Result, UtilError};

/// Check that `path` exists and is a regular file
///
/// # Returns
///
/// `Ok(())` if the file exists, otherwise a configuration error naming the path.
pub fn check_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(UtilError::Config(format!("File does not exist: {:?}", path)));
    }

    if !path.is_file() {
        return Err(UtilError::Config(format!("Path is not a file: {:?}", path)));
    }

    Ok(())
}

/// Read the whole file after checking it exists
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    check_file_exists(path)?;

    fs::read(path).map_err(UtilError::Io)
}
