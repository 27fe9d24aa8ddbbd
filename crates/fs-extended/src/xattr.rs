//! Security label access through extended attributes
//!
//! The label lives in the `security.selinux` attribute. Path variants never
//! follow symlinks (`lgetxattr`/`lsetxattr` semantics via the `xattr` crate).
//!
//! # Platform Differences
//!
//! Labels only exist on Linux. On other platforms every read yields an empty
//! label and every write is a no-op, so attribute capture and restore behave
//! the same everywhere apart from the label itself.
//!
//! A file system without xattr support (`ENOTSUP`) or a file without a label
//! (`ENODATA`) reads as the empty label rather than an error.

use crate::metadata::SecurityLabel;
use crate::Result;
use std::os::fd::AsFd;
use std::path::Path;

/// Extended attribute holding the security label
pub const LABEL_XATTR: &str = "security.selinux";

/// Whether this platform carries security labels
pub const LABELS_SUPPORTED: bool = cfg!(target_os = "linux");

#[cfg(target_os = "linux")]
mod imp {
    use super::LABEL_XATTR;
    use crate::error::os_error;
    use crate::metadata::SecurityLabel;
    use crate::Result;
    use std::fs::File;
    use std::io;
    use std::os::fd::{AsRawFd, BorrowedFd};
    use std::path::Path;
    use xattr::FileExt;

    /// Map a raw attribute read into a label
    fn to_label(
        value: io::Result<Option<Vec<u8>>>,
        op: &'static str,
        arg: impl std::fmt::Display,
    ) -> Result<SecurityLabel> {
        match value {
            Ok(Some(bytes)) => SecurityLabel::from_bytes(&bytes),
            Ok(None) => Ok(SecurityLabel::empty()),
            Err(e) if is_unlabeled(&e) => Ok(SecurityLabel::empty()),
            Err(e) => Err(os_error(op, arg, e)),
        }
    }

    fn is_unlabeled(err: &io::Error) -> bool {
        matches!(err.raw_os_error(), Some(libc::ENODATA | libc::ENOTSUP))
    }

    /// Owned duplicate of a borrowed descriptor, for the `FileExt` API
    fn dup_file(fd: BorrowedFd<'_>) -> Result<File> {
        fd.try_clone_to_owned()
            .map(File::from)
            .map_err(|e| os_error("dup", format_args!("fd {}", fd.as_raw_fd()), e))
    }

    pub(super) fn get_label(path: &Path) -> Result<SecurityLabel> {
        to_label(xattr::get(path, LABEL_XATTR), "lgetxattr", path.display())
    }

    pub(super) fn fget_label(fd: BorrowedFd<'_>) -> Result<SecurityLabel> {
        let file = dup_file(fd)?;
        let raw = fd.as_raw_fd();
        to_label(file.get_xattr(LABEL_XATTR), "fgetxattr", format_args!("fd {raw}"))
    }

    pub(super) fn set_label(path: &Path, label: &SecurityLabel) -> Result<()> {
        xattr::set(path, LABEL_XATTR, label.as_bytes_with_nul())
            .map_err(|e| os_error("lsetxattr", path.display(), e))
    }

    pub(super) fn fset_label(fd: BorrowedFd<'_>, label: &SecurityLabel) -> Result<()> {
        let file = dup_file(fd)?;
        file.set_xattr(LABEL_XATTR, label.as_bytes_with_nul())
            .map_err(|e| os_error("fsetxattr", format_args!("fd {}", fd.as_raw_fd()), e))
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use crate::metadata::SecurityLabel;
    use crate::Result;
    use std::os::fd::BorrowedFd;
    use std::path::Path;

    pub(super) fn get_label(_path: &Path) -> Result<SecurityLabel> {
        Ok(SecurityLabel::empty())
    }

    pub(super) fn fget_label(_fd: BorrowedFd<'_>) -> Result<SecurityLabel> {
        Ok(SecurityLabel::empty())
    }

    pub(super) fn set_label(_path: &Path, _label: &SecurityLabel) -> Result<()> {
        Ok(())
    }

    pub(super) fn fset_label(_fd: BorrowedFd<'_>, _label: &SecurityLabel) -> Result<()> {
        Ok(())
    }
}

/// Read the security label of `path` without following a final symlink
///
/// # Errors
///
/// Returns an error if the attribute exists but cannot be read, or is longer
/// than [`SecurityLabel::MAX_LEN`].
pub fn get_label(path: &Path) -> Result<SecurityLabel> {
    imp::get_label(path)
}

/// Read the security label of an open descriptor
///
/// # Errors
///
/// Returns an error if the attribute exists but cannot be read.
pub fn fget_label(fd: impl AsFd) -> Result<SecurityLabel> {
    imp::fget_label(fd.as_fd())
}

/// Write the security label of `path` without following a final symlink
///
/// # Errors
///
/// Returns an error if `lsetxattr` fails (typically `EPERM` or `ENOTSUP`).
pub fn set_label(path: &Path, label: &SecurityLabel) -> Result<()> {
    imp::set_label(path, label)
}

/// Write the security label of an open descriptor
///
/// # Errors
///
/// Returns an error if `fsetxattr` fails.
pub fn fset_label(fd: impl AsFd, label: &SecurityLabel) -> Result<()> {
    imp::fset_label(fd.as_fd(), label)
}
