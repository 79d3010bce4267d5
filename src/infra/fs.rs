//! Filesystem helpers for reading and atomically writing repository files.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// Reads the entire contents of a file as bytes.
///
/// # Arguments
///
/// * `path` - The path to the file to read.
///
/// # Returns
///
/// The file contents as a byte vector, or `Error::PathNotFound` if the file
/// does not exist.
pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    fs::read(path.as_ref()).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::PathNotFound(path.as_ref().to_path_buf())
        } else {
            Error::Io(e)
        }
    })
}

/// Writes data to a file atomically.
///
/// Writes to a temporary file in the same directory first, then renames it
/// over the target path, so the file is either fully written or untouched.
/// Parent directories are created as needed.
///
/// # Arguments
///
/// * `path` - The path to write to.
/// * `data` - The data to write.
pub fn write_file_atomic<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp_path = {
        let mut temp = path.to_path_buf();
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "temp".to_string());
        temp.set_file_name(format!(".{}.tmp", file_name));
        temp
    };

    {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }

    // Rename is atomic on most filesystems
    fs::rename(&temp_path, path)?;

    Ok(())
}
