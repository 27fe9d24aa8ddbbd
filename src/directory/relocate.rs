//! Merge-moving one tree into another

use crate::error::Result;
use fs_extended::{DirectoryFd, EntryKind};
use tracing::{debug, warn};

/// Move every entry of `src` into `dst`, merging directories
///
/// A source directory whose name already exists in `dst` as a directory is
/// merged recursively and then removed from `src`. If that name is taken by a
/// non-directory the source directory is left in place with a warning.
/// Everything else (files, symlinks, directories missing from `dst`) is moved
/// with `renameat`, which replaces an existing non-directory destination.
/// Other file types stay where they are. Both descriptors are closed on
/// return.
///
/// # Errors
///
/// Returns the first failure; entries already moved stay moved. Moving across
/// file systems fails with `EXDEV`.
pub fn move_tree(src: DirectoryFd, dst: DirectoryFd) -> Result<()> {
    move_entries(&src, &dst)
}

fn move_entries(src: &DirectoryFd, dst: &DirectoryFd) -> Result<()> {
    for entry in src.entries()? {
        let entry = entry?;
        let name = entry.name();
        match entry.kind() {
            EntryKind::Dir if dst.exists_at(name) => {
                if !dst.attr_at(name)?.is_dir() {
                    warn!(
                        "not merging directory {} into non-directory {}",
                        src.child_path(name).display(),
                        dst.child_path(name).display()
                    );
                    continue;
                }
                let src_child = src.open_dir_at(name)?;
                let dst_child = dst.open_dir_at(name)?;
                move_entries(&src_child, &dst_child)?;
                drop(src_child);
                src.unlinkat(name, true)?;
            }
            EntryKind::Dir | EntryKind::File | EntryKind::Symlink => {
                src.renameat(name, dst, name)?;
            }
            _ => debug!("not moving {}", src.child_path(name).display()),
        }
    }
    Ok(())
}
