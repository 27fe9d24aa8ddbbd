//! Recursive tree operations
//!
//! Descriptor-level operations consume the [`DirectoryFd`]s they are given and
//! close them before returning. Path-level wrappers open those descriptors
//! themselves.
//!
//! # Module Organization
//!
//! - `traversal`: pre-order and post-order walkers
//! - `remove`: `remove_tree` and `rm_rf`
//! - `clone`: `clone_tree` and `hardlink_tree`
//! - `relocate`: `move_tree`
//! - `mod`: path-level wrappers (this file)

pub mod clone;
pub mod relocate;
pub mod remove;
pub mod traversal;

pub use clone::{clone_tree, hardlink_tree};
pub use relocate::move_tree;
pub use remove::{remove_tree, rm_rf};
pub use traversal::{post_order_walk, pre_order_walk, WalkResult};

use crate::error::{io_error, Result};
use fs_extended::copy::sendfile;
use fs_extended::directory::{mkdirs, rename};
use fs_extended::{io, metadata, symlink, DirectoryFd};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Copy `src` to `dst` with attributes, files and content
///
/// Directories are copied recursively into `dst` (created if missing),
/// regular files replace `dst`, symlinks are recreated with the same target.
/// `dst` finally receives the attributes of `src`.
///
/// # Errors
///
/// Returns an error if the source attributes cannot be read or any copy step
/// fails.
pub fn cp_afc(src: &Path, dst: &Path) -> Result<()> {
    let attr = metadata::get(src)?;

    if attr.is_dir() {
        mkdirs(dst, 0o755)?;
        clone_tree(DirectoryFd::open(src)?, DirectoryFd::open(dst)?)?;
    } else {
        remove_if_present(dst)?;
        if attr.is_file() {
            let input = io::open(src, libc::O_RDONLY, 0)?;
            let output = io::open(dst, libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC, 0)?;
            sendfile(&output, &input, attr.size)?;
        } else if attr.is_symlink() {
            let target = symlink::readlink(src)?;
            symlink::symlink(&target, dst)?;
        }
    }
    metadata::set(dst, &attr)?;
    Ok(())
}

/// Mirror the directory `src` into the existing directory `dst` with hard links
///
/// # Errors
///
/// See [`hardlink_tree`].
pub fn link_path(src: &Path, dst: &Path) -> Result<()> {
    hardlink_tree(DirectoryFd::open(src)?, DirectoryFd::open(dst)?)
}

/// Move `src` to `dst`, merging into an existing destination directory
///
/// A missing destination directory is created with the attributes of `src`.
/// Non-directories are simply renamed.
///
/// # Errors
///
/// Returns an error if the source attributes cannot be read, any move fails,
/// or the emptied source directory cannot be removed.
pub fn mv_path(src: &Path, dst: &Path) -> Result<()> {
    let attr = metadata::get(src)?;

    if !attr.is_dir() {
        rename(src, dst)?;
        return Ok(());
    }

    if fs::symlink_metadata(dst).is_err() {
        mkdirs(dst, 0o755)?;
        metadata::set(dst, &attr)?;
    }
    move_tree(DirectoryFd::open(src)?, DirectoryFd::open(dst)?)?;
    fs::remove_dir(src).map_err(|e| io_error(format!("rmdir {}", src.display()), e))
}

/// Find the install directory of package `pkg` below `root`
///
/// Only `~~`-prefixed directories are descended; the walk stops at the first
/// directory named `<pkg>-<anything>`.
///
/// # Errors
///
/// Returns an error if `root` cannot be opened or listed.
pub fn find_package_dir(root: &Path, pkg: &str) -> Result<Option<PathBuf>> {
    let mut found = None;
    pre_order_walk(DirectoryFd::open(root)?, |dir, entry| {
        if !entry.is_dir() {
            return WalkResult::Skip;
        }
        let name = entry.name().to_bytes();
        let is_package = name
            .strip_prefix(pkg.as_bytes())
            .is_some_and(|rest| rest.first() == Some(&b'-'));
        if is_package {
            found = Some(dir.child_path(entry.name()));
            WalkResult::Abort
        } else if name.starts_with(b"~~") {
            WalkResult::Continue
        } else {
            WalkResult::Skip
        }
    })?;
    debug!("package {pkg} resolved to {found:?}");
    Ok(found)
}

/// Path of the base APK of package `pkg` installed below `root`
///
/// # Errors
///
/// See [`find_package_dir`].
pub fn find_apk_path(root: &Path, pkg: &str) -> Result<Option<PathBuf>> {
    Ok(find_package_dir(root, pkg)?.map(|dir| dir.join("base.apk")))
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(io_error(format!("unlink {}", path.display()), e))
        }
        _ => Ok(()),
    }
}
