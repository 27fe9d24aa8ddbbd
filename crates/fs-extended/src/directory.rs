//! Directory file descriptor for `*at`-based operations
//!
//! `DirectoryFd` owns an open directory descriptor. All child operations are
//! expressed with the `*at` family relative to it, and listing goes through a
//! private duplicate of the descriptor so the handle stays usable while its
//! entries are being visited.

use crate::error::{bytes_cstring, os_error, path_cstring, syscall_error, Result};
use crate::metadata::{self, FileAttr};
use nix::dir::{Dir, OwningIter, Type};
use std::ffi::{CStr, CString, OsStr};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Flags used for every directory descriptor this crate opens
const DIR_FLAGS: libc::c_int = libc::O_RDONLY | libc::O_DIRECTORY;

/// An owned directory file descriptor
///
/// Dropping it closes the descriptor. Walkers and tree operations take it by
/// value, so a descriptor handed to them is closed exactly once, when they are
/// done with it.
///
/// # Example
///
/// ```rust,no_run
/// use fs_extended::DirectoryFd;
/// use std::path::Path;
///
/// # fn example() -> fs_extended::Result<()> {
/// let dir = DirectoryFd::open(Path::new("/tmp"))?;
/// for entry in dir.entries()? {
///     let entry = entry?;
///     println!("{:?} {:?}", entry.name(), entry.kind());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DirectoryFd {
    /// The underlying descriptor
    fd: OwnedFd,
    /// Where the descriptor came from (for log and error messages only)
    path: PathBuf,
}

impl DirectoryFd {
    /// Open a directory by path
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist, is not a directory, or
    /// cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let fd = crate::io::open(path, DIR_FLAGS, 0)?;
        Ok(Self {
            fd,
            path: path.to_path_buf(),
        })
    }

    /// Take ownership of an already open directory descriptor
    #[must_use]
    pub fn from_owned_fd(fd: OwnedFd) -> Self {
        let path = PathBuf::from(format!("<fd {}>", fd.as_raw_fd()));
        Self { fd, path }
    }

    /// Open the child directory `name`
    ///
    /// # Errors
    ///
    /// Returns an error if `openat(2)` fails.
    pub fn open_dir_at(&self, name: &CStr) -> Result<Self> {
        let fd = crate::io::openat(self, name, DIR_FLAGS, 0)?;
        Ok(Self {
            fd,
            path: self.child_path(name),
        })
    }

    /// Open the child `name` with arbitrary flags (`O_CLOEXEC` is always added)
    ///
    /// # Errors
    ///
    /// Returns an error if `openat(2)` fails.
    pub fn open_at(&self, name: &CStr, flags: libc::c_int, mode: libc::mode_t) -> Result<OwnedFd> {
        crate::io::openat(self, name, flags, mode)
    }

    /// The path this descriptor was opened from (diagnostics only)
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The diagnostic path of a child entry
    #[must_use]
    pub fn child_path(&self, name: &CStr) -> PathBuf {
        self.path.join(OsStr::from_bytes(name.to_bytes()))
    }

    /// Raw descriptor for use with system calls
    #[must_use]
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Give up the handle and return the owned descriptor
    #[must_use]
    pub fn into_owned_fd(self) -> OwnedFd {
        self.fd
    }

    /// Start listing this directory
    ///
    /// `.` and `..` are never yielded. Listing starts from the first entry
    /// regardless of how often the directory has been listed before.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be duplicated or opened as a
    /// directory stream.
    pub fn entries(&self) -> Result<DirEntries> {
        // SAFETY: fcntl on a descriptor we own; the result is a new descriptor
        let dup = unsafe { libc::fcntl(self.as_raw_fd(), libc::F_DUPFD_CLOEXEC, 0) };
        if dup < 0 {
            return Err(syscall_error("fcntl(F_DUPFD_CLOEXEC)", self.path.display()));
        }
        // SAFETY: dup is a fresh descriptor owned by nobody else
        let dup = unsafe { OwnedFd::from_raw_fd(dup) };
        // The duplicate shares the file offset with the original; rewind it.
        // SAFETY: lseek on a descriptor we own
        if unsafe { libc::lseek(dup.as_raw_fd(), 0, libc::SEEK_SET) } < 0 {
            return Err(syscall_error("lseek", self.path.display()));
        }
        let raw = dup.into_raw_fd();
        let dir = Dir::from_fd(raw).map_err(|e| {
            os_error("fdopendir", self.path.display(), io::Error::from(e))
        })?;
        Ok(DirEntries {
            fd: raw,
            path: self.path.clone(),
            iter: dir.into_iter(),
        })
    }

    /// Create the child directory `name`
    ///
    /// An already existing entry is not an error; the caller finds out when it
    /// tries to use it.
    ///
    /// # Errors
    ///
    /// Returns an error if `mkdirat(2)` fails for any reason but `EEXIST`.
    pub fn mkdirat(&self, name: &CStr, mode: u32) -> Result<()> {
        // SAFETY: self is a live descriptor; name is NUL-terminated
        let ret = unsafe { libc::mkdirat(self.as_raw_fd(), name.as_ptr(), mode as libc::mode_t) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(os_error(
                    "mkdirat",
                    format_args!("{} {mode:o}", self.child_path(name).display()),
                    err,
                ));
            }
        }
        Ok(())
    }

    /// Remove the child `name`; `is_dir` selects `AT_REMOVEDIR`
    ///
    /// # Errors
    ///
    /// Returns an error if `unlinkat(2)` fails.
    pub fn unlinkat(&self, name: &CStr, is_dir: bool) -> Result<()> {
        let flags = if is_dir { libc::AT_REMOVEDIR } else { 0 };
        // SAFETY: self is a live descriptor; name is NUL-terminated
        if unsafe { libc::unlinkat(self.as_raw_fd(), name.as_ptr(), flags) } < 0 {
            let err = io::Error::last_os_error();
            return Err(os_error("unlinkat", self.child_path(name).display(), err));
        }
        Ok(())
    }

    /// Rename the child `name` to `new_name` inside `dest`
    ///
    /// # Errors
    ///
    /// Returns an error if `renameat(2)` fails.
    pub fn renameat(&self, name: &CStr, dest: &DirectoryFd, new_name: &CStr) -> Result<()> {
        // SAFETY: both descriptors are live; both names are NUL-terminated
        let ret = unsafe {
            libc::renameat(self.as_raw_fd(), name.as_ptr(), dest.as_raw_fd(), new_name.as_ptr())
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            return Err(os_error(
                "renameat",
                format_args!(
                    "{} -> {}",
                    self.child_path(name).display(),
                    dest.child_path(new_name).display()
                ),
                err,
            ));
        }
        Ok(())
    }

    /// Check that the child `name` exists (`faccessat(F_OK)`), logging failure
    ///
    /// # Errors
    ///
    /// Returns an error if `faccessat(2)` fails.
    pub fn faccessat(&self, name: &CStr) -> Result<()> {
        // SAFETY: self is a live descriptor; name is NUL-terminated
        let ret = unsafe { libc::faccessat(self.as_raw_fd(), name.as_ptr(), libc::F_OK, 0) };
        if ret != 0 {
            let err = io::Error::last_os_error();
            return Err(os_error("faccessat", self.child_path(name).display(), err));
        }
        Ok(())
    }

    /// Whether the child `name` exists, without logging
    #[must_use]
    pub fn exists_at(&self, name: &CStr) -> bool {
        // SAFETY: self is a live descriptor; name is NUL-terminated
        unsafe { libc::faccessat(self.as_raw_fd(), name.as_ptr(), libc::F_OK, 0) == 0 }
    }

    /// Attributes of the child `name`, not following symlinks
    ///
    /// # Errors
    ///
    /// See [`metadata::get_at`].
    pub fn attr_at(&self, name: &CStr) -> Result<FileAttr> {
        metadata::get_at(self, name)
    }

    /// Apply attributes to the child `name`
    ///
    /// # Errors
    ///
    /// See [`metadata::set_at`].
    pub fn set_attr_at(&self, name: &CStr, attr: &FileAttr) -> Result<()> {
        metadata::set_at(self, name, attr)
    }

    /// Read the symlink `name`
    ///
    /// # Errors
    ///
    /// See [`crate::symlink::readlinkat`].
    pub fn readlinkat(&self, name: &CStr) -> Result<PathBuf> {
        crate::symlink::readlinkat(self, name)
    }

    /// Create the symlink `name` pointing at `target`
    ///
    /// # Errors
    ///
    /// See [`crate::symlink::symlinkat`].
    pub fn symlinkat(&self, target: &Path, name: &CStr) -> Result<()> {
        crate::symlink::symlinkat(target, self, name)
    }

    /// Hard-link the child `name` to `new_name` inside `dest`
    ///
    /// # Errors
    ///
    /// See [`crate::hardlink::linkat`].
    pub fn linkat(&self, name: &CStr, dest: &DirectoryFd, new_name: &CStr) -> Result<()> {
        crate::hardlink::linkat(self, name, dest, new_name)
    }
}

impl AsFd for DirectoryFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for DirectoryFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// The kind of a directory entry, as reported by `d_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory
    Dir,
    /// Regular file
    File,
    /// Symbolic link
    Symlink,
    /// Block device
    BlockDevice,
    /// Character device
    CharDevice,
    /// Named pipe
    Fifo,
    /// Unix domain socket
    Socket,
    /// The kernel did not say and `fstatat` could not tell either
    Unknown,
}

impl EntryKind {
    /// Derive the kind from `st_mode` type bits
    #[must_use]
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => Self::Dir,
            m if m == libc::S_IFREG as u32 => Self::File,
            m if m == libc::S_IFLNK as u32 => Self::Symlink,
            m if m == libc::S_IFBLK as u32 => Self::BlockDevice,
            m if m == libc::S_IFCHR as u32 => Self::CharDevice,
            m if m == libc::S_IFIFO as u32 => Self::Fifo,
            m if m == libc::S_IFSOCK as u32 => Self::Socket,
            _ => Self::Unknown,
        }
    }
}

impl From<Type> for EntryKind {
    fn from(t: Type) -> Self {
        match t {
            Type::Directory => Self::Dir,
            Type::File => Self::File,
            Type::Symlink => Self::Symlink,
            Type::BlockDevice => Self::BlockDevice,
            Type::CharacterDevice => Self::CharDevice,
            Type::Fifo => Self::Fifo,
            Type::Socket => Self::Socket,
        }
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name (no path separators)
    name: CString,
    /// Entry kind
    kind: EntryKind,
}

impl DirEntry {
    /// Entry name as passed to `*at` calls
    #[must_use]
    pub fn name(&self) -> &CStr {
        &self.name
    }

    /// Entry name as an `OsStr`
    #[must_use]
    pub fn file_name(&self) -> &OsStr {
        OsStr::from_bytes(self.name.to_bytes())
    }

    /// Entry kind
    #[must_use]
    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Shorthand for `kind() == EntryKind::Dir`
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Streaming directory listing created by [`DirectoryFd::entries`]
///
/// Owns its directory stream; dropping it calls `closedir`.
pub struct DirEntries {
    /// Descriptor backing the stream (owned by `iter`)
    fd: RawFd,
    /// Diagnostic path
    path: PathBuf,
    /// The stream
    iter: OwningIter,
}

impl std::fmt::Debug for DirEntries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirEntries")
            .field("fd", &self.fd)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DirEntries {
    /// Resolve `DT_UNKNOWN` with `fstatat(AT_SYMLINK_NOFOLLOW)`
    fn probe_kind(&self, name: &CStr) -> EntryKind {
        // SAFETY: self.fd stays open for as long as self.iter lives
        let dirfd = unsafe { BorrowedFd::borrow_raw(self.fd) };
        metadata::fstatat(dirfd, name, libc::AT_SYMLINK_NOFOLLOW)
            .map_or(EntryKind::Unknown, |st| EntryKind::from_mode(u32::from(st.st_mode)))
    }
}

impl Iterator for DirEntries {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.iter.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    return Some(Err(os_error("readdir", self.path.display(), io::Error::from(e))));
                }
            };
            let name = entry.file_name();
            if matches!(name.to_bytes(), b"." | b"..") {
                continue;
            }
            let kind = match entry.file_type() {
                Some(t) => EntryKind::from(t),
                None => self.probe_kind(name),
            };
            return Some(Ok(DirEntry {
                name: name.to_owned(),
                kind,
            }));
        }
    }
}

/// Resolve the path an open descriptor refers to
///
/// Linux reads the `/proc/self/fd/<n>` link; macOS asks `fcntl(F_GETPATH)`.
///
/// # Errors
///
/// Returns an error if the reverse lookup fails.
#[cfg(not(target_os = "macos"))]
pub fn fd_path(fd: impl AsFd) -> Result<PathBuf> {
    let link = PathBuf::from(format!("/proc/self/fd/{}", fd.as_fd().as_raw_fd()));
    crate::symlink::readlink(&link)
}

/// Resolve the path an open descriptor refers to
///
/// # Errors
///
/// Returns an error if `fcntl(F_GETPATH)` fails.
#[cfg(target_os = "macos")]
pub fn fd_path(fd: impl AsFd) -> Result<PathBuf> {
    use std::os::unix::ffi::OsStringExt;

    let raw = fd.as_fd().as_raw_fd();
    let mut buf = vec![0u8; libc::PATH_MAX as usize];
    // SAFETY: F_GETPATH writes at most PATH_MAX bytes into buf
    if unsafe { libc::fcntl(raw, libc::F_GETPATH, buf.as_mut_ptr()) } < 0 {
        return Err(syscall_error("fcntl(F_GETPATH)", format_args!("fd {raw}")));
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    buf.truncate(len);
    Ok(PathBuf::from(std::ffi::OsString::from_vec(buf)))
}

/// Resolve the path of `name` inside the directory `dirfd`
///
/// # Errors
///
/// Returns an error if the directory's own path cannot be resolved.
pub fn fd_path_at(dirfd: impl AsFd, name: &CStr) -> Result<PathBuf> {
    Ok(fd_path(dirfd)?.join(OsStr::from_bytes(name.to_bytes())))
}

/// Create `path` and every missing parent with `mode`
///
/// Existing components are left untouched, so calling it twice is harmless.
///
/// # Errors
///
/// Returns an error if a component cannot be created for any reason other
/// than already existing.
pub fn mkdirs(path: &Path, mode: u32) -> Result<()> {
    let bytes = path.as_os_str().as_bytes();
    let prefixes = bytes
        .iter()
        .enumerate()
        .skip(1)
        .filter(|&(_, &b)| b == b'/')
        .map(|(i, _)| &bytes[..i])
        .chain(std::iter::once(bytes));

    for prefix in prefixes {
        if prefix.is_empty() || prefix.ends_with(b"/") {
            continue;
        }
        let c_prefix = bytes_cstring(prefix)?;
        // SAFETY: c_prefix is NUL-terminated
        if unsafe { libc::mkdir(c_prefix.as_ptr(), mode as libc::mode_t) } < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(os_error("mkdirs", path.display(), err));
            }
        }
    }
    Ok(())
}

/// Create a single directory (`mkdir(2)`), treating `EEXIST` as success
///
/// # Errors
///
/// Returns an error if `mkdir(2)` fails for any other reason.
pub fn mkdir(path: &Path, mode: u32) -> Result<()> {
    let c_path = path_cstring(path)?;
    // SAFETY: c_path is NUL-terminated
    if unsafe { libc::mkdir(c_path.as_ptr(), mode as libc::mode_t) } < 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            return Err(os_error("mkdir", format_args!("{} {mode:o}", path.display()), err));
        }
    }
    Ok(())
}

/// Rename a path (`rename(2)`)
///
/// # Errors
///
/// Returns an error if `rename(2)` fails.
pub fn rename(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|e| {
        os_error("rename", format_args!("{} -> {}", from.display(), to.display()), e)
    })
}
