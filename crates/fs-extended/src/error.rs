//! Error types for fs-extended operations
//!
//! Every failing system call is reported exactly once through `tracing` at the
//! point of failure and then surfaced as an [`ExtendedError::Syscall`]. Callers
//! propagate with `?` and never need to log again.

use std::ffi::CString;
use std::fmt::Display;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use thiserror::Error;
use tracing::error;

/// Result alias used throughout fs-extended
pub type Result<T> = std::result::Result<T, ExtendedError>;

/// Errors produced by the syscall-wrap and attribute layers
#[derive(Error, Debug)]
pub enum ExtendedError {
    /// A system call failed
    #[error("{op}: {arg}: {source}")]
    Syscall {
        /// Name of the failing operation (`openat`, `readlinkat`, ...)
        op: &'static str,
        /// The most informative argument: a path, a name or an fd
        arg: String,
        /// The OS error (errno) that was reported
        #[source]
        source: io::Error,
    },

    /// A path or name could not be passed to the kernel
    #[error("invalid path {0:?}: contains an interior NUL byte")]
    InvalidPath(String),

    /// A security label does not fit the fixed-capacity label slot
    #[error("security label is {len} bytes, at most {max} are supported")]
    LabelTooLong {
        /// Length of the rejected label
        len: usize,
        /// Capacity of the label slot
        max: usize,
    },
}

impl ExtendedError {
    /// The raw errno behind this error, if it came from the kernel
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Syscall { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// The `io::ErrorKind` closest to this error
    #[must_use]
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            Self::Syscall { source, .. } => source.kind(),
            Self::InvalidPath(_) | Self::LabelTooLong { .. } => io::ErrorKind::InvalidInput,
        }
    }
}

impl From<ExtendedError> for io::Error {
    fn from(err: ExtendedError) -> Self {
        match err {
            ExtendedError::Syscall { source, .. } => source,
            other => io::Error::new(other.kind(), other),
        }
    }
}

/// Log and wrap the current `errno` for a failed system call
///
/// Must be called immediately after the failing call so nothing clobbers `errno`.
pub(crate) fn syscall_error(op: &'static str, arg: impl Display) -> ExtendedError {
    let source = io::Error::last_os_error();
    os_error(op, arg, source)
}

/// Log and wrap an already captured OS error
pub(crate) fn os_error(op: &'static str, arg: impl Display, source: io::Error) -> ExtendedError {
    let arg = arg.to_string();
    error!(op, arg = %arg, "{op}: {arg}: {source}");
    ExtendedError::Syscall { op, arg, source }
}

/// Convert a path into a NUL-terminated string for libc
pub(crate) fn path_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| ExtendedError::InvalidPath(path.display().to_string()))
}

/// Convert raw bytes into a NUL-terminated string for libc
pub(crate) fn bytes_cstring(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes)
        .map_err(|_| ExtendedError::InvalidPath(String::from_utf8_lossy(bytes).into_owned()))
}
