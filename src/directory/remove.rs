//! Recursive removal

use super::traversal::post_order_walk;
use crate::error::{io_error, Result};
use fs_extended::{DirectoryFd, ExtendedError};
use std::fs;
use std::io;
use std::path::Path;

/// Remove everything inside `dir`, leaving `dir` itself in place
///
/// Removal is best-effort: every entry is attempted even after a failure,
/// and the first failure is returned once the walk is done. The descriptor is
/// closed on return.
///
/// # Errors
///
/// Returns the first `unlinkat` failure, or a listing failure.
pub fn remove_tree(dir: DirectoryFd) -> Result<()> {
    let mut first_err: Option<ExtendedError> = None;
    post_order_walk(dir, |parent, entry| {
        if let Err(e) = parent.unlinkat(entry.name(), entry.is_dir()) {
            first_err.get_or_insert(e);
        }
    })?;
    match first_err {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

/// Remove `path` and, if it is a directory, everything below it
///
/// Symlinks are removed, never followed. A missing path is not an error.
///
/// # Errors
///
/// Returns an error if anything that exists could not be removed.
pub fn rm_rf(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(io_error(format!("lstat {}", path.display()), e)),
    };
    let removed = if meta.is_dir() {
        remove_tree(DirectoryFd::open(path)?)?;
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| io_error(format!("remove {}", path.display()), e))
}
