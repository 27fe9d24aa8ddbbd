//! Error types for tree operations
//!
//! Syscall failures from [`fs_extended`] have already been logged at their
//! origin and pass through unchanged as [`Error::Fs`]. Other I/O failures are
//! logged when [`io_error`] wraps them.

use fs_extended::ExtendedError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

/// Result alias used throughout fstree
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by tree, mapping, reader and process operations
#[derive(Error, Debug)]
pub enum Error {
    /// A primitive filesystem operation failed
    #[error(transparent)]
    Fs(#[from] ExtendedError),

    /// An I/O operation outside the syscall layer failed
    #[error("{context}: {source}")]
    Io {
        /// What was being done, usually including a path
        context: String,
        /// The underlying error
        #[source]
        source: io::Error,
    },

    /// A byte patch was rejected before touching the buffer
    #[error("invalid patch: {0}")]
    InvalidPatch(String),

    /// Spawning, forking or waiting for a process failed
    #[error("process error: {0}")]
    Process(String),

    /// A required path does not exist
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
}

impl Error {
    /// The raw errno behind this error, if any
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Fs(e) => e.raw_os_error(),
            Self::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }
}

/// Log an `io::Error` and wrap it with context
pub(crate) fn io_error(context: impl Into<String>, source: io::Error) -> Error {
    let context = context.into();
    error!(context = %context, "{context}: {source}");
    Error::Io { context, source }
}

/// Create a process error
pub(crate) fn process_error(msg: &str) -> Error {
    Error::Process(msg.to_string())
}
