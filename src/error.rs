//! Error types for spaghettifs.

use std::fmt;
use std::path::PathBuf;

/// The main error type for spaghettifs operations.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred.
    Io(std::io::Error),

    /// The specified path is not a valid repository.
    NotARepository(PathBuf),

    /// A repository already exists at the specified path.
    AlreadyARepository(PathBuf),

    /// The requested object was not found in the store.
    ObjectNotFound(String),

    /// The requested branch reference was not found.
    RefNotFound(String),

    /// The specified path was not found.
    PathNotFound(PathBuf),

    /// The provided string is not a valid object ID.
    InvalidOid(String),

    /// The object is invalid or corrupted.
    InvalidObject {
        /// The object ID.
        oid: String,
        /// The reason for invalidity.
        reason: String,
    },

    /// Type mismatch when expecting a specific object type.
    TypeMismatch {
        /// The expected type.
        expected: &'static str,
        /// The actual type.
        actual: &'static str,
    },

    /// Invalid UTF-8 sequence encountered.
    InvalidUtf8,

    /// Zlib decompression failed.
    DecompressionFailed,

    /// A directory entry, inode or staged child is missing.
    NotFound(String),

    /// Creating an entry that already exists.
    AlreadyExists(String),

    /// The filename is not acceptable.
    InvalidName(String),

    /// Stored data does not parse (ls line, meta line, feature manifest).
    InvalidFormat(String),

    /// The operation is not permitted on this kind of object.
    NotSupported(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::NotARepository(path) => {
                write!(f, "not a filesystem repository: {}", path.display())
            }
            Error::AlreadyARepository(path) => {
                write!(f, "repository already exists: {}", path.display())
            }
            Error::ObjectNotFound(oid) => write!(f, "object not found: {}", oid),
            Error::RefNotFound(name) => write!(f, "reference not found: {}", name),
            Error::PathNotFound(path) => write!(f, "path not found: {}", path.display()),
            Error::InvalidOid(s) => write!(f, "invalid object id: {}", s),
            Error::InvalidObject { oid, reason } => {
                write!(f, "invalid object {}: {}", oid, reason)
            }
            Error::TypeMismatch { expected, actual } => {
                write!(f, "type mismatch: expected {}, got {}", expected, actual)
            }
            Error::InvalidUtf8 => write!(f, "invalid UTF-8 sequence"),
            Error::DecompressionFailed => write!(f, "zlib decompression failed"),
            Error::NotFound(what) => write!(f, "entry not found: {}", what),
            Error::AlreadyExists(what) => write!(f, "entry already exists: {}", what),
            Error::InvalidName(name) => write!(f, "bad filename: {:?}", name),
            Error::InvalidFormat(reason) => write!(f, "invalid stored data: {}", reason),
            Error::NotSupported(what) => write!(f, "operation not supported: {}", what),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result type alias for spaghettifs operations.
pub type Result<T> = std::result::Result<T, Error>;
