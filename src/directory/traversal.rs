//! Pre-order and post-order directory walkers
//!
//! Both walkers take the root [`DirectoryFd`] by value. Every descriptor the
//! walk opens, the root included, is closed before the walker returns,
//! whatever the outcome.
//!
//! A subdirectory that cannot be opened is treated as [`WalkResult::Skip`]:
//! the failed `openat` is logged at its call site and the walk moves on.
//! Entries are visited in native `readdir` order.

use crate::error::Result;
use fs_extended::{DirEntry, DirectoryFd};
use tracing::debug;

/// What a pre-order visitor wants to happen next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkResult {
    /// Keep going, descending into the entry if it is a directory
    Continue,
    /// Keep going, but do not descend into this entry
    Skip,
    /// Stop the whole walk
    Abort,
}

/// Open a child directory for descent, or `None` if it should be skipped
fn descend(parent: &DirectoryFd, entry: &DirEntry) -> Option<DirectoryFd> {
    match parent.open_dir_at(entry.name()) {
        Ok(dir) => Some(dir),
        Err(_) => {
            debug!(
                "skipping unreadable subtree {}",
                parent.child_path(entry.name()).display()
            );
            None
        }
    }
}

/// Visit every entry before its children
///
/// The visitor is called with the directory holding the entry and the entry
/// itself. Only when it returns [`WalkResult::Continue`] for a directory is
/// that directory opened and walked.
///
/// Returns [`WalkResult::Abort`] if the visitor aborted, otherwise
/// [`WalkResult::Continue`].
///
/// # Errors
///
/// Returns an error if a directory that was opened cannot be listed.
///
/// # Example
///
/// ```rust,no_run
/// use fs_extended::DirectoryFd;
/// use fstree::directory::traversal::{pre_order_walk, WalkResult};
/// use std::path::Path;
///
/// # fn example() -> fstree::Result<()> {
/// let root = DirectoryFd::open(Path::new("/data/app"))?;
/// pre_order_walk(root, |dir, entry| {
///     println!("{}", dir.child_path(entry.name()).display());
///     WalkResult::Continue
/// })?;
/// # Ok(())
/// # }
/// ```
pub fn pre_order_walk<F>(dir: DirectoryFd, mut visitor: F) -> Result<WalkResult>
where
    F: FnMut(&DirectoryFd, &DirEntry) -> WalkResult,
{
    pre_order(&dir, &mut visitor)
}

fn pre_order<F>(dir: &DirectoryFd, visitor: &mut F) -> Result<WalkResult>
where
    F: FnMut(&DirectoryFd, &DirEntry) -> WalkResult,
{
    for entry in dir.entries()? {
        let entry = entry?;
        match visitor(dir, &entry) {
            WalkResult::Continue => {}
            WalkResult::Skip => continue,
            WalkResult::Abort => return Ok(WalkResult::Abort),
        }
        if entry.is_dir() {
            if let Some(child) = descend(dir, &entry) {
                if pre_order(&child, visitor)? == WalkResult::Abort {
                    return Ok(WalkResult::Abort);
                }
            }
        }
    }
    Ok(WalkResult::Continue)
}

/// Visit every entry after its children
///
/// Directories are walked first, then handed to the visitor, so a visitor
/// that deletes what it sees can remove a whole tree.
///
/// # Errors
///
/// Returns an error if a directory that was opened cannot be listed.
pub fn post_order_walk<F>(dir: DirectoryFd, mut visitor: F) -> Result<()>
where
    F: FnMut(&DirectoryFd, &DirEntry),
{
    post_order(&dir, &mut visitor)
}

fn post_order<F>(dir: &DirectoryFd, visitor: &mut F) -> Result<()>
where
    F: FnMut(&DirectoryFd, &DirEntry),
{
    for entry in dir.entries()? {
        let entry = entry?;
        if entry.is_dir() {
            if let Some(child) = descend(dir, &entry) {
                post_order(&child, visitor)?;
            }
        }
        visitor(dir, &entry);
    }
    Ok(())
}
