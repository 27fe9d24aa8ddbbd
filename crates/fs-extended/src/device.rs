//! Device nodes and block-device size probing
//!
//! # Usage
//!
//! ```rust,no_run
//! use fs_extended::{device, metadata};
//! use std::fs::File;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let file = File::open("/dev/block/by-name/boot")?;
//! let st = metadata::fstat(&file)?;
//! println!("{} bytes", device::probe_size(&file, &st));
//! # Ok(())
//! # }
//! ```

use crate::error::{os_error, Result};
use nix::sys::stat::{self, Mode, SFlag};
use std::io;
use std::os::fd::{AsFd, AsRawFd};
use std::path::Path;
use tracing::debug;

#[cfg(target_os = "linux")]
mod ioctls {
    // BLKGETSIZE64 = _IOR(0x12, 114, size_t)
    nix::ioctl_read!(blkgetsize64, 0x12, 114, u64);
}

#[cfg(target_os = "macos")]
mod ioctls {
    // DKIOCGETBLOCKSIZE = _IOR('d', 24, uint32_t)
    nix::ioctl_read!(dkiocgetblocksize, b'd', 24, u32);
    // DKIOCGETBLOCKCOUNT = _IOR('d', 25, uint64_t)
    nix::ioctl_read!(dkiocgetblockcount, b'd', 25, u64);
}

/// Ask the kernel for the byte size of a block device
///
/// # Errors
///
/// Returns the ioctl error, or `Unsupported` on platforms without a probe.
#[cfg(target_os = "linux")]
pub fn block_device_size(fd: impl AsFd) -> io::Result<u64> {
    let mut size = 0u64;
    // SAFETY: fd is live; size is a valid out pointer of the ioctl's type
    unsafe { ioctls::blkgetsize64(fd.as_fd().as_raw_fd(), &mut size) }?;
    Ok(size)
}

/// Ask the kernel for the byte size of a block device
///
/// # Errors
///
/// Returns the ioctl error, or `Unsupported` on platforms without a probe.
#[cfg(target_os = "macos")]
pub fn block_device_size(fd: impl AsFd) -> io::Result<u64> {
    let raw = fd.as_fd().as_raw_fd();
    let mut block_size = 0u32;
    let mut block_count = 0u64;
    // SAFETY: raw is live; both are valid out pointers of the ioctl's type
    unsafe {
        ioctls::dkiocgetblocksize(raw, &mut block_size)?;
        ioctls::dkiocgetblockcount(raw, &mut block_count)?;
    }
    Ok(block_count.saturating_mul(u64::from(block_size)))
}

/// Ask the kernel for the byte size of a block device
///
/// # Errors
///
/// Returns the ioctl error, or `Unsupported` on platforms without a probe.
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn block_device_size(_fd: impl AsFd) -> io::Result<u64> {
    Err(io::ErrorKind::Unsupported.into())
}

/// Pick the probed size, falling back to `stat_size` when the probe failed
#[must_use]
pub fn size_or_fallback(probed: io::Result<u64>, stat_size: u64) -> u64 {
    match probed {
        Ok(size) => size,
        Err(e) => {
            debug!("block size probe failed ({e}), using stat size {stat_size}");
            stat_size
        }
    }
}

/// Length of the object behind `fd`
///
/// Block devices report 0 through `stat`, so their size is asked from the
/// driver. Everything else, and a failed probe, uses `st_size`.
#[must_use]
pub fn probe_size(fd: impl AsFd, st: &libc::stat) -> u64 {
    let stat_size = u64::try_from(st.st_size).unwrap_or(0);
    if st.st_mode & libc::S_IFMT == libc::S_IFBLK {
        size_or_fallback(block_device_size(fd), stat_size)
    } else {
        stat_size
    }
}

/// Create a filesystem node (device, FIFO or regular file)
///
/// `mode` carries both the `S_IF*` type bits and the permission bits.
///
/// # Errors
///
/// Returns an error if `mknod(2)` fails.
pub fn mknod(path: &Path, mode: u32, dev: u64) -> Result<()> {
    // mode_t is u16 on macOS, u32 on Linux
    let kind = SFlag::from_bits_truncate((mode & !0o7777) as libc::mode_t);
    let perm = Mode::from_bits_truncate((mode & 0o7777) as libc::mode_t);
    stat::mknod(path, kind, perm, dev as libc::dev_t)
        .map_err(|errno| os_error("mknod", path.display(), io::Error::from(errno)))
}
