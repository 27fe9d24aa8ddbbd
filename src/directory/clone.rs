//! Tree copy and hardlink mirroring
//!
//! Both operations take ownership of the source and destination descriptors
//! and close them on return. They stop at the first failing syscall and leave
//! whatever was already created in place.

use crate::error::Result;
use fs_extended::copy::sendfile;
use fs_extended::{DirEntry, DirectoryFd, FileAttr};
use tracing::{debug, trace};

/// How non-directory entries are reproduced in the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mirror {
    /// Copy file contents
    Copy,
    /// Hard-link regular files and special files
    Link,
}

/// Copy every entry of `src` into `dst`
///
/// Directories are created and recursed, regular files have their content
/// copied with `sendfile`, symlinks are recreated with the same target. Each
/// created entry receives the source entry's mode, owner and label. Other
/// file types are ignored. An existing destination file is truncated.
///
/// # Errors
///
/// Returns the first failure; nothing is rolled back.
pub fn clone_tree(src: DirectoryFd, dst: DirectoryFd) -> Result<()> {
    mirror_dir(&src, &dst, Mirror::Copy)
}

/// Mirror `src` into `dst` with hard links
///
/// Directories are created with the source attributes and recursed. Symlinks
/// are recreated rather than linked. Every other entry is hard-linked, so the
/// destination shares inodes with the source.
///
/// # Errors
///
/// Returns the first failure; nothing is rolled back. Linking across file
/// systems fails with `EXDEV`.
pub fn hardlink_tree(src: DirectoryFd, dst: DirectoryFd) -> Result<()> {
    mirror_dir(&src, &dst, Mirror::Link)
}

fn mirror_dir(src: &DirectoryFd, dst: &DirectoryFd, how: Mirror) -> Result<()> {
    for entry in src.entries()? {
        let entry = entry?;
        let attr = src.attr_at(entry.name())?;
        if attr.is_dir() {
            mirror_subdir(src, dst, &entry, &attr, how)?;
        } else if attr.is_symlink() {
            copy_symlink(src, dst, &entry, &attr)?;
        } else if how == Mirror::Link {
            src.linkat(entry.name(), dst, entry.name())?;
            trace!("linked {}", dst.child_path(entry.name()).display());
        } else if attr.is_file() {
            copy_file(src, dst, &entry, &attr)?;
        } else {
            debug!(
                "ignoring special file {}",
                src.child_path(entry.name()).display()
            );
        }
    }
    Ok(())
}

fn mirror_subdir(
    src: &DirectoryFd,
    dst: &DirectoryFd,
    entry: &DirEntry,
    attr: &FileAttr,
    how: Mirror,
) -> Result<()> {
    let name = entry.name();
    dst.mkdirat(name, 0)?;
    dst.set_attr_at(name, attr)?;
    let src_child = src.open_dir_at(name)?;
    let dst_child = dst.open_dir_at(name)?;
    mirror_dir(&src_child, &dst_child, how)
}

/// Copy one regular file's content and attributes
pub(crate) fn copy_file(
    src: &DirectoryFd,
    dst: &DirectoryFd,
    entry: &DirEntry,
    attr: &FileAttr,
) -> Result<()> {
    let name = entry.name();
    let input = src.open_at(name, libc::O_RDONLY, 0)?;
    let output = dst.open_at(name, libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC, 0)?;
    let sent = sendfile(&output, &input, attr.size)?;
    fs_extended::metadata::fset(&output, attr)?;
    trace!("copied {} ({sent} bytes)", dst.child_path(name).display());
    Ok(())
}

fn copy_symlink(
    src: &DirectoryFd,
    dst: &DirectoryFd,
    entry: &DirEntry,
    attr: &FileAttr,
) -> Result<()> {
    let name = entry.name();
    let target = src.readlinkat(name)?;
    dst.symlinkat(&target, name)?;
    dst.set_attr_at(name, attr)?;
    Ok(())
}
