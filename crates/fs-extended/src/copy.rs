//! In-kernel file-to-file copy with `sendfile(2)`
//!
//! # Platform Differences
//!
//! - **Linux**: `sendfile(out, in, NULL, count)` accepts any output descriptor
//!   and advances the input offset itself.
//! - **macOS**: `sendfile(in, out_socket, offset, &len, ...)` has the argument
//!   order swapped, takes the length in/out and only accepts a socket as the
//!   destination. Regular-file destinations go through a userspace copy.
//! - **Other Unix**: userspace copy.
//!
//! In every case the input offset ends up advanced by the number of bytes
//! transferred, and a short count means the input hit EOF.

use crate::error::{os_error, Result};
use crate::io::{read, write_all, CHUNK_SIZE};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use tracing::trace;

/// Copy up to `count` bytes from `in_fd` to `out_fd`
///
/// Both descriptors are used at their current offsets. Returns the number of
/// bytes transferred, which is less than `count` only if `in_fd` hit EOF.
///
/// # Errors
///
/// Returns an error if the underlying transfer fails.
pub fn sendfile(out_fd: impl AsFd, in_fd: impl AsFd, count: u64) -> Result<u64> {
    let out_fd = out_fd.as_fd();
    let in_fd = in_fd.as_fd();
    let sent = imp::sendfile(out_fd, in_fd, count)?;
    trace!(
        src = in_fd.as_raw_fd(),
        dst = out_fd.as_raw_fd(),
        count,
        sent,
        "sendfile"
    );
    Ok(sent)
}

/// Copy through a userspace buffer until `count` bytes or EOF
///
/// # Errors
///
/// Returns an error if a read or write fails.
pub fn copy_userspace(out_fd: BorrowedFd<'_>, in_fd: BorrowedFd<'_>, count: u64) -> Result<u64> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut done = 0u64;
    while done < count {
        let want = usize::try_from(count - done).map_or(CHUNK_SIZE, |n| n.min(CHUNK_SIZE));
        let n = read(in_fd, &mut buf[..want])?;
        if n == 0 {
            break;
        }
        write_all(out_fd, &buf[..n])?;
        done += n as u64;
    }
    Ok(done)
}

#[cfg(target_os = "linux")]
mod imp {
    use super::*;

    /// Largest transfer the kernel performs in one call
    const MAX_CHUNK: u64 = 0x7fff_f000;

    pub(super) fn sendfile(out_fd: BorrowedFd<'_>, in_fd: BorrowedFd<'_>, count: u64) -> Result<u64> {
        let mut done = 0u64;
        while done < count {
            // Bounded by MAX_CHUNK, fits usize
            let want = (count - done).min(MAX_CHUNK) as usize;
            // SAFETY: both descriptors are live; a NULL offset uses and updates in_fd's offset
            let ret = unsafe {
                libc::sendfile(out_fd.as_raw_fd(), in_fd.as_raw_fd(), std::ptr::null_mut(), want)
            };
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(os_error(
                    "sendfile",
                    format_args!("{} -> {}", in_fd.as_raw_fd(), out_fd.as_raw_fd()),
                    err,
                ));
            }
            if ret == 0 {
                break;
            }
            done += ret.unsigned_abs() as u64;
        }
        Ok(done)
    }
}

#[cfg(target_os = "macos")]
mod imp {
    use super::*;
    use crate::metadata::fstat;

    pub(super) fn sendfile(out_fd: BorrowedFd<'_>, in_fd: BorrowedFd<'_>, count: u64) -> Result<u64> {
        let st = fstat(out_fd)?;
        if st.st_mode & libc::S_IFMT != libc::S_IFSOCK {
            return copy_userspace(out_fd, in_fd, count);
        }

        // SAFETY: in_fd is a live descriptor
        let start = unsafe { libc::lseek(in_fd.as_raw_fd(), 0, libc::SEEK_CUR) };
        if start < 0 {
            let err = io::Error::last_os_error();
            return Err(os_error("lseek", format_args!("fd {}", in_fd.as_raw_fd()), err));
        }

        let mut done = 0u64;
        while done < count {
            let mut len = libc::off_t::try_from(count - done).unwrap_or(libc::off_t::MAX);
            let offset = start + done as libc::off_t;
            // SAFETY: descriptors are live; len is a valid in/out pointer; no header/trailer
            let ret = unsafe {
                libc::sendfile(
                    in_fd.as_raw_fd(),
                    out_fd.as_raw_fd(),
                    offset,
                    &mut len,
                    std::ptr::null_mut(),
                    0,
                )
            };
            // len reports partial progress even when the call fails
            done += len.max(0) as u64;
            if ret < 0 {
                let err = io::Error::last_os_error();
                if matches!(err.raw_os_error(), Some(libc::EINTR | libc::EAGAIN)) {
                    continue;
                }
                return Err(os_error(
                    "sendfile",
                    format_args!("{} -> {}", in_fd.as_raw_fd(), out_fd.as_raw_fd()),
                    err,
                ));
            }
            if len == 0 {
                break;
            }
        }

        let end = start + done as libc::off_t;
        // SAFETY: in_fd is a live descriptor
        if unsafe { libc::lseek(in_fd.as_raw_fd(), end, libc::SEEK_SET) } < 0 {
            let err = io::Error::last_os_error();
            return Err(os_error("lseek", format_args!("fd {}", in_fd.as_raw_fd()), err));
        }
        Ok(done)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
mod imp {
    use super::*;

    pub(super) fn sendfile(out_fd: BorrowedFd<'_>, in_fd: BorrowedFd<'_>, count: u64) -> Result<u64> {
        copy_userspace(out_fd, in_fd, count)
    }
}
