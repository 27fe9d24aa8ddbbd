//! In-memory snapshot and restore of a directory tree
//!
//! [`backup_tree`] captures every entry below a root as a [`RawFile`]: its
//! path relative to the root, its attributes and its content (file bytes or
//! symlink target). The list is in pre-order, so [`restore_tree`] always
//! creates parents before their children.
//!
//! # Usage
//!
//! ```rust,no_run
//! use fstree::backup::{backup_tree, restore_tree};
//! use std::path::Path;
//!
//! # fn example() -> fstree::Result<()> {
//! let snapshot = backup_tree(Path::new("/data/adb/modules/foo"))?;
//! // ... risky changes ...
//! restore_tree(Path::new("/data/adb/modules/foo"), &snapshot)?;
//! # Ok(())
//! # }
//! ```

use crate::directory::{pre_order_walk, WalkResult};
use crate::error::{io_error, Result};
use fs_extended::directory::{fd_path_at, mkdirs};
use fs_extended::{io, metadata, symlink, DirEntry, DirectoryFd, FileAttr};
use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One captured filesystem entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    /// Path relative to the backup root, without a leading `/`
    pub path: PathBuf,
    /// Captured attributes
    pub attr: FileAttr,
    /// File content for regular files, link target for symlinks, empty otherwise
    pub content: Vec<u8>,
}

/// Capture the tree below `root`
///
/// Backup is best-effort: an entry that cannot be captured is skipped
/// together with its subtree.
///
/// # Errors
///
/// Returns an error if `root` itself cannot be resolved, opened or listed.
pub fn backup_tree(root: &Path) -> Result<Vec<RawFile>> {
    let root = io::realpath(root)?;
    let mut files = Vec::new();
    pre_order_walk(DirectoryFd::open(&root)?, |dir, entry| {
        match capture(&root, dir, entry) {
            Ok(file) => {
                debug!("captured {}", file.path.display());
                files.push(file);
                WalkResult::Continue
            }
            Err(e) => {
                warn!(
                    "skipping {} in backup: {e}",
                    dir.child_path(entry.name()).display()
                );
                WalkResult::Skip
            }
        }
    })?;
    Ok(files)
}

fn capture(root: &Path, dir: &DirectoryFd, entry: &DirEntry) -> Result<RawFile> {
    let absolute = fd_path_at(dir, entry.name())?;
    let path = absolute
        .strip_prefix(root)
        .map_err(|_| {
            io_error(
                format!("{} is outside {}", absolute.display(), root.display()),
                std::io::ErrorKind::InvalidData.into(),
            )
        })?
        .to_path_buf();

    let attr = dir.attr_at(entry.name())?;
    let content = if attr.is_file() {
        let fd = dir.open_at(entry.name(), libc::O_RDONLY, 0)?;
        io::read_to_end(&fd)?
    } else if attr.is_symlink() {
        dir.readlinkat(entry.name())?
            .into_os_string()
            .into_encoded_bytes()
    } else {
        Vec::new()
    };

    Ok(RawFile {
        path,
        attr,
        content,
    })
}

/// Recreate `files` below `root`
///
/// `root` is created if missing. Directories are created, regular files
/// written (an existing file is truncated), symlinks created from their
/// captured target; each entry then gets its captured attributes. An existing
/// symlink is replaced, and so is an existing file where a symlink was
/// captured.
///
/// Restore is best-effort: a failing entry is logged and skipped.
///
/// # Errors
///
/// Returns the first entry failure after every entry has been tried, or the
/// failure to create `root`.
pub fn restore_tree(root: &Path, files: &[RawFile]) -> Result<()> {
    mkdirs(root, 0o755)?;
    let mut first_err = None;
    for file in files {
        let path = root.join(&file.path);
        if let Err(e) = restore_entry(&path, file) {
            warn!("failed to restore {}: {e}", path.display());
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

fn restore_entry(path: &Path, file: &RawFile) -> Result<()> {
    if file.attr.is_dir() {
        mkdirs(path, 0)?;
    } else if file.attr.is_file() {
        // Never write through a symlink left at the path
        unlink_if(path, |ty| ty.is_symlink())?;
        let fd = io::open(path, libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC, 0o644)?;
        io::write_all(&fd, &file.content)?;
    } else if file.attr.is_symlink() {
        unlink_if(path, |ty| !ty.is_dir())?;
        symlink::symlink(Path::new(OsStr::from_bytes(&file.content)), path)?;
    } else {
        debug!("not restoring special file {}", path.display());
        return Ok(());
    }
    metadata::set(path, &file.attr)?;
    Ok(())
}

/// Unlink whatever is at `path` if its type matches; a missing path is fine
fn unlink_if(path: &Path, matches: impl Fn(fs::FileType) -> bool) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if matches(meta.file_type()) => {
            fs::remove_file(path).map_err(|e| io_error(format!("unlink {}", path.display()), e))
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(format!("lstat {}", path.display()), e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_backup_is_pre_order_with_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("d/e")).unwrap();
        fs::write(root.join("d/e/f"), "x").unwrap();

        let files = backup_tree(root).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();

        assert_eq!(
            paths,
            vec![
                PathBuf::from("d"),
                PathBuf::from("d/e"),
                PathBuf::from("d/e/f")
            ]
        );
        assert_eq!(files[2].content, b"x");
        assert!(files[0].content.is_empty());
    }

    #[test]
    fn test_backup_stores_symlink_target_as_content() {
        let temp_dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink("../elsewhere", temp_dir.path().join("l")).unwrap();

        let files = backup_tree(temp_dir.path()).unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].attr.is_symlink());
        assert_eq!(files[0].content, b"../elsewhere");
    }

    #[test]
    fn test_restore_overwrites_modified_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("f"), "original").unwrap();
        fs::set_permissions(root.join("f"), fs::Permissions::from_mode(0o640)).unwrap();

        let files = backup_tree(root).unwrap();
        fs::write(root.join("f"), "tampered with").unwrap();
        fs::set_permissions(root.join("f"), fs::Permissions::from_mode(0o666)).unwrap();
        restore_tree(root, &files).unwrap();

        assert_eq!(fs::read(root.join("f")).unwrap(), b"original");
        assert_eq!(
            fs::metadata(root.join("f")).unwrap().permissions().mode() & 0o777,
            0o640
        );
    }

    #[test]
    fn test_restore_in_place_replaces_symlinks_and_continues() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::os::unix::fs::symlink("x", root.join("l")).unwrap();
        for i in 0..8 {
            fs::write(root.join(format!("f{i}")), format!("{i}")).unwrap();
        }

        let files = backup_tree(root).unwrap();
        for i in 0..8 {
            fs::write(root.join(format!("f{i}")), "tampered").unwrap();
        }
        fs::remove_file(root.join("l")).unwrap();
        std::os::unix::fs::symlink("elsewhere", root.join("l")).unwrap();
        restore_tree(root, &files).unwrap();

        assert_eq!(fs::read_link(root.join("l")).unwrap(), Path::new("x"));
        for i in 0..8 {
            assert_eq!(
                fs::read_to_string(root.join(format!("f{i}"))).unwrap(),
                format!("{i}")
            );
        }
    }

    #[test]
    fn test_restore_reports_first_failure_after_trying_all() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::create_dir_all(src.join("d")).unwrap();
        fs::write(src.join("d/inner"), "inner").unwrap();
        fs::write(src.join("z"), "z").unwrap();
        let files = backup_tree(&src).unwrap();

        // A file squatting on a captured directory blocks that subtree only
        fs::create_dir(&dst).unwrap();
        fs::write(dst.join("d"), "squatter").unwrap();
        assert!(restore_tree(&dst, &files).is_err());

        assert_eq!(fs::read(dst.join("d")).unwrap(), b"squatter");
        assert_eq!(fs::read(dst.join("z")).unwrap(), b"z");
    }

    #[test]
    fn test_backup_missing_root_fails() {
        let temp_dir = TempDir::new().unwrap();
        assert!(backup_tree(&temp_dir.path().join("missing")).is_err());
    }
}
