//! Descriptor I/O wrappers
//!
//! `open`/`openat` always add `O_CLOEXEC` and hand back an `OwnedFd`, so every
//! descriptor is released exactly once. The read and write loops treat `EINTR`
//! as transparent.

use crate::error::{os_error, path_cstring, syscall_error, Result};
use std::ffi::CStr;
use std::io;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use std::path::{Path, PathBuf};

/// Size of the bounce buffer used by the read/write loops
pub const CHUNK_SIZE: usize = 4096;

/// Open a path, returning an owned descriptor
///
/// # Errors
///
/// Returns an error if the path contains a NUL byte or `open(2)` fails.
pub fn open(path: &Path, flags: libc::c_int, mode: libc::mode_t) -> Result<OwnedFd> {
    let c_path = path_cstring(path)?;
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
    let fd = unsafe { libc::open(c_path.as_ptr(), flags | libc::O_CLOEXEC, libc::c_uint::from(mode)) };
    if fd < 0 {
        return Err(syscall_error("open", path.display()));
    }
    // SAFETY: fd was just returned by open(2) and is owned by nobody else
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Open `name` relative to `dirfd`, returning an owned descriptor
///
/// # Errors
///
/// Returns an error if `openat(2)` fails.
pub fn openat(
    dirfd: impl AsFd,
    name: &CStr,
    flags: libc::c_int,
    mode: libc::mode_t,
) -> Result<OwnedFd> {
    let raw = dirfd.as_fd().as_raw_fd();
    // SAFETY: raw is a live descriptor borrowed for the call; name is NUL-terminated
    let fd = unsafe {
        libc::openat(raw, name.as_ptr(), flags | libc::O_CLOEXEC, libc::c_uint::from(mode))
    };
    if fd < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("openat", name.to_string_lossy(), err));
    }
    // SAFETY: fd was just returned by openat(2) and is owned by nobody else
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Single `read(2)`; an error other than EOF is logged
///
/// # Errors
///
/// Returns an error if `read(2)` fails.
pub fn read(fd: impl AsFd, buf: &mut [u8]) -> Result<usize> {
    let raw = fd.as_fd().as_raw_fd();
    loop {
        // SAFETY: buf is valid for writes of buf.len() bytes
        let ret = unsafe { libc::read(raw, buf.as_mut_ptr().cast(), buf.len()) };
        if ret >= 0 {
            return Ok(ret.unsigned_abs());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(os_error("read", format_args!("fd {raw}"), err));
        }
    }
}

/// Read exactly `buf.len()` bytes
///
/// # Errors
///
/// Returns an error if `read(2)` fails, or `UnexpectedEof` if the descriptor
/// reached EOF before the buffer was filled.
pub fn read_exact(fd: impl AsFd, buf: &mut [u8]) -> Result<usize> {
    let fd = fd.as_fd();
    let mut done = 0;
    while done < buf.len() {
        match read(fd, &mut buf[done..])? {
            0 => break,
            n => done += n,
        }
    }
    if done != buf.len() {
        return Err(os_error(
            "read",
            format_args!("fd {} ({} != {done})", fd.as_raw_fd(), buf.len()),
            io::ErrorKind::UnexpectedEof.into(),
        ));
    }
    Ok(done)
}

/// Write all of `buf`, looping across short writes and `EINTR`
///
/// # Errors
///
/// Returns an error if `write(2)` fails or stops making progress.
pub fn write_all(fd: impl AsFd, buf: &[u8]) -> Result<usize> {
    let raw = fd.as_fd().as_raw_fd();
    let mut done = 0;
    while done < buf.len() {
        let rest = &buf[done..];
        // SAFETY: rest is valid for reads of rest.len() bytes
        let ret = unsafe { libc::write(raw, rest.as_ptr().cast(), rest.len()) };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(os_error("write", format_args!("fd {raw}"), err));
        }
        if ret == 0 {
            return Err(os_error(
                "write",
                format_args!("fd {raw} ({} != {done})", buf.len()),
                io::ErrorKind::WriteZero.into(),
            ));
        }
        done += ret.unsigned_abs();
    }
    Ok(done)
}

/// Read everything until EOF
///
/// # Errors
///
/// Returns an error if `read(2)` fails.
pub fn read_to_end(fd: impl AsFd) -> Result<Vec<u8>> {
    let fd = fd.as_fd();
    let mut out = Vec::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match read(fd, &mut buf)? {
            0 => return Ok(out),
            n => out.extend_from_slice(&buf[..n]),
        }
    }
}

/// Write `size` zero bytes at the current offset
///
/// # Errors
///
/// Returns an error if any write fails.
pub fn write_zero(fd: impl AsFd, size: u64) -> Result<()> {
    let fd = fd.as_fd();
    let buf = [0u8; CHUNK_SIZE];
    let mut left = size;
    while left > 0 {
        let len = usize::try_from(left).map_or(CHUNK_SIZE, |l| l.min(CHUNK_SIZE));
        write_all(fd, &buf[..len])?;
        left -= len as u64;
    }
    Ok(())
}

/// Resolve a path to its canonical absolute form
///
/// # Errors
///
/// Returns an error if any component does not exist or cannot be resolved.
pub fn realpath(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| os_error("realpath", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_to_end_spans_chunks() {
        let mut tmp = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        tmp.write_all(&data).unwrap();
        tmp.as_file_mut().seek(SeekFrom::Start(0)).unwrap();

        let read_back = read_to_end(tmp.as_file()).unwrap();
        assert_eq!(read_back, data);
    }

    #[test]
    fn test_read_exact_reports_short_read() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"abc").unwrap();
        tmp.as_file_mut().seek(SeekFrom::Start(0)).unwrap();

        let mut buf = [0u8; 8];
        let err = read_exact(tmp.as_file(), &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn test_write_zero_writes_requested_length() {
        let tmp = NamedTempFile::new().unwrap();
        write_all(tmp.as_file(), b"x").unwrap();
        write_zero(tmp.as_file(), CHUNK_SIZE as u64 + 5).unwrap();

        let contents = std::fs::read(tmp.path()).unwrap();
        assert_eq!(contents.len(), CHUNK_SIZE + 6);
        assert_eq!(contents[0], b'x');
        assert!(contents[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_open_missing_path_fails() {
        let err = open(Path::new("/nonexistent/really/not/here"), libc::O_RDONLY, 0).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn test_realpath_resolves_dots() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let resolved = realpath(&dir.path().join("sub/../sub/.")).unwrap();
        assert_eq!(resolved, std::fs::canonicalize(dir.path().join("sub")).unwrap());
    }
}
