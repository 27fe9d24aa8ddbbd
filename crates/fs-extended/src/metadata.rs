//! File attributes: mode, ownership and security label
//!
//! [`FileAttr`] is the unit of attribute capture and restore. It is a plain
//! `Copy` value that owns no resources. The three entry points stay coherent:
//!
//! - **path**: [`get`] / [`set`]
//! - **directory fd + name**: [`get_at`] / [`set_at`]
//! - **open fd**: [`fget`] / [`fset`]
//!
//! Capture never follows symlinks. Restore applies `mode & 0o777`, then
//! ownership, then the security label when one is present. Any failing step
//! fails the whole operation; nothing is rolled back.
//!
//! # Usage
//!
//! ```rust,no_run
//! use fs_extended::metadata;
//! use std::path::Path;
//!
//! # fn example() -> fs_extended::Result<()> {
//! let attr = metadata::get(Path::new("/system/bin/sh"))?;
//! metadata::set(Path::new("/tmp/sh"), &attr)?;
//! # Ok(())
//! # }
//! ```

use crate::directory::{fd_path_at, DirectoryFd};
use crate::error::{os_error, path_cstring, ExtendedError, Result};
use crate::xattr;
use std::ffi::CStr;
use std::fmt;
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::{AsFd, AsRawFd};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// A security label with fixed inline capacity
///
/// Holds at most [`SecurityLabel::MAX_LEN`] bytes so that [`FileAttr`] stays
/// `Copy`. An empty label means "not present, do not set".
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecurityLabel {
    /// Label bytes, unused tail zeroed
    buf: [u8; SecurityLabel::CAPACITY],
    /// Number of meaningful bytes in `buf`
    len: u8,
}

impl SecurityLabel {
    /// Size of the label slot including the terminator
    pub const CAPACITY: usize = 128;
    /// Largest label that fits
    pub const MAX_LEN: usize = Self::CAPACITY - 1;

    /// The empty label
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            buf: [0; Self::CAPACITY],
            len: 0,
        }
    }

    /// Build a label from raw bytes
    ///
    /// A single trailing NUL (as stored by the kernel) is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ExtendedError::LabelTooLong`] if more than `MAX_LEN` bytes remain.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes = bytes.strip_suffix(&[0]).unwrap_or(bytes);
        if bytes.len() > Self::MAX_LEN {
            return Err(ExtendedError::LabelTooLong {
                len: bytes.len(),
                max: Self::MAX_LEN,
            });
        }
        let mut label = Self::empty();
        label.buf[..bytes.len()].copy_from_slice(bytes);
        // MAX_LEN < 256
        label.len = bytes.len() as u8;
        Ok(label)
    }

    /// Label bytes without terminator
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..usize::from(self.len)]
    }

    /// Label bytes including the trailing NUL, as written to the xattr
    #[must_use]
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.buf[..=usize::from(self.len)]
    }

    /// Whether no label is present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for SecurityLabel {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for SecurityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

impl fmt::Display for SecurityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

impl TryFrom<&str> for SecurityLabel {
    type Error = ExtendedError;

    fn try_from(s: &str) -> Result<Self> {
        Self::from_bytes(s.as_bytes())
    }
}

/// Captured attributes of a filesystem object
///
/// Only `mode & 0o777`, `uid`, `gid` and `label` are restored. `size` and the
/// timestamps are informational.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttr {
    /// File type and permission bits (`st_mode`)
    pub mode: u32,
    /// Owner
    pub uid: u32,
    /// Group
    pub gid: u32,
    /// Size in bytes (`st_size`)
    pub size: u64,
    /// Last modification time
    pub modified: Option<SystemTime>,
    /// Last access time
    pub accessed: Option<SystemTime>,
    /// Security label (empty if none)
    pub label: SecurityLabel,
}

impl FileAttr {
    /// Build from a `stat` buffer and a label
    #[must_use]
    pub fn from_stat(st: &libc::stat, label: SecurityLabel) -> Self {
        Self {
            mode: u32::from(st.st_mode),
            uid: st.st_uid,
            gid: st.st_gid,
            size: u64::try_from(st.st_size).unwrap_or(0),
            modified: timestamp(st.st_mtime, st.st_mtime_nsec),
            accessed: timestamp(st.st_atime, st.st_atime_nsec),
            label,
        }
    }

    /// The `S_IFMT` bits
    #[must_use]
    pub fn file_type(&self) -> u32 {
        self.mode & libc::S_IFMT as u32
    }

    /// Check if this is a regular file
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.file_type() == libc::S_IFREG as u32
    }

    /// Check if this is a directory
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.file_type() == libc::S_IFDIR as u32
    }

    /// Check if this is a symlink
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.file_type() == libc::S_IFLNK as u32
    }

    /// Check if this is a block device
    #[must_use]
    pub fn is_block_device(&self) -> bool {
        self.file_type() == libc::S_IFBLK as u32
    }

    /// Permission bits that get restored (mode & 0o777)
    #[must_use]
    pub fn permissions(&self) -> u32 {
        self.mode & 0o777
    }
}

/// Convert a `(seconds, nanoseconds)` stat pair into a `SystemTime`
fn timestamp(secs: libc::time_t, nsecs: i64) -> Option<SystemTime> {
    let secs = u64::try_from(secs).ok()?;
    let nsecs = u32::try_from(nsecs).ok()?;
    SystemTime::UNIX_EPOCH.checked_add(Duration::new(secs, nsecs))
}

// ============================================================================
// stat family
// ============================================================================

/// `lstat(2)`
///
/// # Errors
///
/// Returns an error if the path cannot be stat'ed.
pub fn lstat(path: &Path) -> Result<libc::stat> {
    let c_path = path_cstring(path)?;
    let mut st = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: c_path is NUL-terminated; st is a valid out pointer
    if unsafe { libc::lstat(c_path.as_ptr(), st.as_mut_ptr()) } < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("lstat", path.display(), err));
    }
    // SAFETY: lstat succeeded and filled st
    Ok(unsafe { st.assume_init() })
}

/// `stat(2)`, following symlinks
///
/// # Errors
///
/// Returns an error if the path cannot be stat'ed.
pub fn stat(path: &Path) -> Result<libc::stat> {
    let c_path = path_cstring(path)?;
    let mut st = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: c_path is NUL-terminated; st is a valid out pointer
    if unsafe { libc::stat(c_path.as_ptr(), st.as_mut_ptr()) } < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("stat", path.display(), err));
    }
    // SAFETY: stat succeeded and filled st
    Ok(unsafe { st.assume_init() })
}

/// `fstat(2)`
///
/// # Errors
///
/// Returns an error if the descriptor cannot be stat'ed.
pub fn fstat(fd: impl AsFd) -> Result<libc::stat> {
    let raw = fd.as_fd().as_raw_fd();
    let mut st = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: raw is a live descriptor; st is a valid out pointer
    if unsafe { libc::fstat(raw, st.as_mut_ptr()) } < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("fstat", format_args!("fd {raw}"), err));
    }
    // SAFETY: fstat succeeded and filled st
    Ok(unsafe { st.assume_init() })
}

/// `fstatat(2)`
///
/// # Errors
///
/// Returns an error if the child cannot be stat'ed.
pub fn fstatat(dirfd: impl AsFd, name: &CStr, flags: libc::c_int) -> Result<libc::stat> {
    let raw = dirfd.as_fd().as_raw_fd();
    let mut st = MaybeUninit::<libc::stat>::uninit();
    // SAFETY: raw is a live descriptor; name is NUL-terminated; st is a valid out pointer
    if unsafe { libc::fstatat(raw, name.as_ptr(), st.as_mut_ptr(), flags) } < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("fstatat", name.to_string_lossy(), err));
    }
    // SAFETY: fstatat succeeded and filled st
    Ok(unsafe { st.assume_init() })
}

// ============================================================================
// get
// ============================================================================

/// Capture the attributes of `path` without following a final symlink
///
/// # Errors
///
/// Returns an error if `lstat` or the label read fails.
pub fn get(path: &Path) -> Result<FileAttr> {
    let st = lstat(path)?;
    let label = xattr::get_label(path)?;
    Ok(FileAttr::from_stat(&st, label))
}

/// Capture the attributes of `name` inside `dir` without following symlinks
///
/// # Errors
///
/// Returns an error if `fstatat` or the label read fails.
pub fn get_at(dir: &DirectoryFd, name: &CStr) -> Result<FileAttr> {
    let st = fstatat(dir, name, libc::AT_SYMLINK_NOFOLLOW)?;
    let label = if xattr::LABELS_SUPPORTED {
        xattr::get_label(&fd_path_at(dir, name)?)?
    } else {
        SecurityLabel::empty()
    };
    Ok(FileAttr::from_stat(&st, label))
}

/// Capture the attributes of an open descriptor
///
/// # Errors
///
/// Returns an error if `fstat` or the label read fails.
pub fn fget(fd: impl AsFd) -> Result<FileAttr> {
    let fd = fd.as_fd();
    let st = fstat(fd)?;
    let label = xattr::fget_label(fd)?;
    Ok(FileAttr::from_stat(&st, label))
}

// ============================================================================
// set
// ============================================================================

/// Apply `attr` to `path`
///
/// Symlinks keep their mode (Linux has no `lchmod`); ownership and label are
/// applied to the link itself.
///
/// # Errors
///
/// Returns an error on the first failing step.
pub fn set(path: &Path, attr: &FileAttr) -> Result<()> {
    let c_path = path_cstring(path)?;
    if !attr.is_symlink() {
        // SAFETY: c_path is NUL-terminated
        if unsafe { libc::chmod(c_path.as_ptr(), attr.permissions() as libc::mode_t) } < 0 {
            let err = io::Error::last_os_error();
            return Err(os_error("chmod", path.display(), err));
        }
    }
    // SAFETY: c_path is NUL-terminated
    if unsafe { libc::lchown(c_path.as_ptr(), attr.uid, attr.gid) } < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("lchown", path.display(), err));
    }
    if !attr.label.is_empty() {
        xattr::set_label(path, &attr.label)?;
    }
    Ok(())
}

/// Apply `attr` to `name` inside `dir`
///
/// # Errors
///
/// Returns an error on the first failing step.
pub fn set_at(dir: &DirectoryFd, name: &CStr, attr: &FileAttr) -> Result<()> {
    let raw = dir.as_raw_fd();
    if !attr.is_symlink() {
        // SAFETY: raw is a live descriptor; name is NUL-terminated
        let ret =
            unsafe { libc::fchmodat(raw, name.as_ptr(), attr.permissions() as libc::mode_t, 0) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            return Err(os_error("fchmodat", dir.child_path(name).display(), err));
        }
    }
    // SAFETY: raw is a live descriptor; name is NUL-terminated
    let ret = unsafe {
        libc::fchownat(raw, name.as_ptr(), attr.uid, attr.gid, libc::AT_SYMLINK_NOFOLLOW)
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("fchownat", dir.child_path(name).display(), err));
    }
    if !attr.label.is_empty() && xattr::LABELS_SUPPORTED {
        xattr::set_label(&fd_path_at(dir, name)?, &attr.label)?;
    }
    Ok(())
}

/// Apply `attr` to an open descriptor
///
/// # Errors
///
/// Returns an error on the first failing step.
pub fn fset(fd: impl AsFd, attr: &FileAttr) -> Result<()> {
    let fd = fd.as_fd();
    let raw = fd.as_raw_fd();
    // SAFETY: raw is a live descriptor
    if unsafe { libc::fchmod(raw, attr.permissions() as libc::mode_t) } < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("fchmod", format_args!("fd {raw}"), err));
    }
    // SAFETY: raw is a live descriptor
    if unsafe { libc::fchown(raw, attr.uid, attr.gid) } < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("fchown", format_args!("fd {raw}"), err));
    }
    if !attr.label.is_empty() {
        xattr::fset_label(fd, &attr.label)?;
    }
    Ok(())
}

/// Copy attributes from `src` to `dest` (paths)
///
/// # Errors
///
/// Returns an error if capture or restore fails.
pub fn clone_attr(src: &Path, dest: &Path) -> Result<()> {
    let attr = get(src)?;
    set(dest, &attr)
}

/// Copy attributes from one open descriptor to another
///
/// # Errors
///
/// Returns an error if capture or restore fails.
pub fn fclone_attr(src: impl AsFd, dest: impl AsFd) -> Result<()> {
    let attr = fget(src)?;
    fset(dest, &attr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::ffi::CString;
    use std::fs;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use tempfile::TempDir;

    #[test]
    fn test_label_capacity() {
        let max = "a".repeat(SecurityLabel::MAX_LEN);
        let label = SecurityLabel::try_from(max.as_str()).unwrap();
        assert_eq!(label.as_bytes().len(), SecurityLabel::MAX_LEN);
        assert_eq!(label.as_bytes_with_nul().last(), Some(&0));

        let too_long = "a".repeat(SecurityLabel::CAPACITY);
        let err = SecurityLabel::try_from(too_long.as_str()).unwrap_err();
        assert!(matches!(err, ExtendedError::LabelTooLong { len: 128, max: 127 }));
    }

    #[test]
    fn test_label_strips_kernel_terminator() {
        let label = SecurityLabel::from_bytes(b"u:object_r:system_file:s0\0").unwrap();
        assert_eq!(label.as_bytes(), b"u:object_r:system_file:s0");
        assert_eq!(label.to_string(), "u:object_r:system_file:s0");
        assert!(SecurityLabel::default().is_empty());
    }

    #[rstest]
    #[case(libc::S_IFDIR as u32 | 0o755, true, false, false)]
    #[case(libc::S_IFREG as u32 | 0o644, false, true, false)]
    #[case(libc::S_IFLNK as u32 | 0o777, false, false, true)]
    fn test_file_attr_type_predicates(
        #[case] mode: u32,
        #[case] dir: bool,
        #[case] file: bool,
        #[case] link: bool,
    ) {
        let attr = FileAttr {
            mode,
            ..FileAttr::default()
        };
        assert_eq!(attr.is_dir(), dir);
        assert_eq!(attr.is_file(), file);
        assert_eq!(attr.is_symlink(), link);
        assert_eq!(attr.permissions(), mode & 0o777);
    }

    #[test]
    fn test_get_does_not_follow_symlinks() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("target");
        let link = temp_dir.path().join("link");
        fs::write(&target, "content").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(get(&link).unwrap().is_symlink());
        assert!(get(&target).unwrap().is_file());
    }

    #[test]
    fn test_entry_points_agree() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f");
        fs::write(&path, "hello").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let by_path = get(&path).unwrap();
        let dir = DirectoryFd::open(temp_dir.path()).unwrap();
        let by_dirfd = get_at(&dir, &CString::new("f").unwrap()).unwrap();
        let by_fd = fget(fs::File::open(&path).unwrap()).unwrap();

        assert_eq!(by_path, by_dirfd);
        assert_eq!(by_path.mode, by_fd.mode);
        assert_eq!(by_path.uid, by_fd.uid);
        assert_eq!(by_path.gid, by_fd.gid);
        assert_eq!(by_path.label, by_fd.label);
        assert_eq!(by_path.size, 5);
        assert_eq!(by_path.permissions(), 0o640);
    }

    #[test]
    fn test_set_applies_mode_and_keeps_owner() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::write(&src, "").unwrap();
        fs::write(&dst, "").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o604)).unwrap();

        clone_attr(&src, &dst).unwrap();

        let meta = fs::metadata(&dst).unwrap();
        assert_eq!(meta.mode() & 0o777, 0o604);
        assert_eq!(meta.uid(), fs::metadata(&src).unwrap().uid());
    }

    #[test]
    fn test_set_at_and_fset() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        fs::write(&a, "").unwrap();
        fs::write(&b, "").unwrap();

        let mut attr = get(&a).unwrap();
        attr.mode = (attr.mode & !0o777) | 0o600;

        let dir = DirectoryFd::open(temp_dir.path()).unwrap();
        set_at(&dir, &CString::new("a").unwrap(), &attr).unwrap();
        fset(fs::File::open(&b).unwrap(), &attr).unwrap();

        assert_eq!(fs::metadata(&a).unwrap().mode() & 0o777, 0o600);
        assert_eq!(fs::metadata(&b).unwrap().mode() & 0o777, 0o600);
    }

    #[test]
    fn test_set_on_symlink_leaves_target_mode() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("target");
        let link = temp_dir.path().join("link");
        fs::write(&target, "").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o644)).unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let attr = get(&link).unwrap();
        set(&link, &attr).unwrap();

        assert_eq!(fs::metadata(&target).unwrap().mode() & 0o777, 0o644);
    }

    #[test]
    fn test_fclone_attr() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        fs::write(&a, "").unwrap();
        fs::write(&b, "").unwrap();
        fs::set_permissions(&a, fs::Permissions::from_mode(0o611)).unwrap();

        fclone_attr(fs::File::open(&a).unwrap(), fs::File::open(&b).unwrap()).unwrap();
        assert_eq!(fs::metadata(&b).unwrap().mode() & 0o777, 0o611);
    }

    #[test]
    fn test_get_missing_path_fails() {
        let err = get(Path::new("/nonexistent/file")).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }
}
