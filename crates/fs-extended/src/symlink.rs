//! Symlink creation and reading
//!
//! `readlink` results are never NUL-terminated by the kernel, so the buffer is
//! zero-filled and only the reported length is trusted. Targets longer than
//! `PATH_MAX - 1` bytes come back truncated; that is not an error.

use crate::directory::DirectoryFd;
use crate::error::{os_error, path_cstring, Result};
use std::ffi::{CStr, OsStr};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Size of the readlink buffer including the terminator slot
const LINK_MAX: usize = libc::PATH_MAX as usize;

/// Turn a `readlink`-style return value into the link target
///
/// Must run before anything else can clobber `errno`.
fn finish_readlink(ret: libc::ssize_t, buf: &[u8]) -> io::Result<PathBuf> {
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    let len = ret.unsigned_abs().min(buf.len());
    Ok(PathBuf::from(OsStr::from_bytes(&buf[..len])))
}

/// Read the target of a symlink at `path`
///
/// # Errors
///
/// Returns an error if `path` is not a symlink or cannot be read.
pub fn readlink(path: &Path) -> Result<PathBuf> {
    let c_path = path_cstring(path)?;
    let mut buf = vec![0u8; LINK_MAX - 1];
    // SAFETY: c_path is NUL-terminated; buf is valid for buf.len() bytes
    let ret = unsafe { libc::readlink(c_path.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
    finish_readlink(ret, &buf).map_err(|e| os_error("readlink", path.display(), e))
}

/// Read the target of the symlink `name` inside `dir`
///
/// # Errors
///
/// Returns an error if the entry is not a symlink or cannot be read.
pub fn readlinkat(dir: &DirectoryFd, name: &CStr) -> Result<PathBuf> {
    let mut buf = vec![0u8; LINK_MAX - 1];
    // SAFETY: dir is a live descriptor; name is NUL-terminated; buf is valid for buf.len() bytes
    let ret = unsafe {
        libc::readlinkat(dir.as_raw_fd(), name.as_ptr(), buf.as_mut_ptr().cast(), buf.len())
    };
    finish_readlink(ret, &buf)
        .map_err(|e| os_error("readlinkat", dir.child_path(name).display(), e))
}

/// Create a symlink at `link` pointing to `target`
///
/// # Errors
///
/// Returns an error if `symlink(2)` fails.
pub fn symlink(target: &Path, link: &Path) -> Result<()> {
    let c_target = path_cstring(target)?;
    let c_link = path_cstring(link)?;
    // SAFETY: both strings are NUL-terminated
    if unsafe { libc::symlink(c_target.as_ptr(), c_link.as_ptr()) } < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("symlink", link.display(), err));
    }
    Ok(())
}

/// Create the symlink `name` inside `dir` pointing to `target`
///
/// `target` is stored verbatim and may be relative or dangling.
///
/// # Errors
///
/// Returns an error if `symlinkat(2)` fails (`EEXIST` when `name` is taken).
pub fn symlinkat(target: &Path, dir: &DirectoryFd, name: &CStr) -> Result<()> {
    let c_target = path_cstring(target)?;
    // SAFETY: strings are NUL-terminated; dir is a live descriptor
    if unsafe { libc::symlinkat(c_target.as_ptr(), dir.as_raw_fd(), name.as_ptr()) } < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("symlinkat", dir.child_path(name).display(), err));
    }
    Ok(())
}
