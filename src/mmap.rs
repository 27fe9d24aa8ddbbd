//! Memory-mapped file regions and in-place byte patching
//!
//! [`MmapData`] maps a whole file or block device. With write intent the
//! mapping is shared, so patches land in the file. With read intent it is a
//! private copy-on-write mapping: the bytes may still be patched in memory,
//! but the file is never modified.
//!
//! [`BytePatch`] works on any byte slice, and therefore on `MmapData`
//! through `DerefMut`.

use crate::error::{io_error, Error, Result};
use fs_extended::{device, metadata};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::ops::{Deref, DerefMut};
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;
use tracing::debug;

/// A mapped file region
///
/// Unmapped on drop. A zero-length object has no mapping and derefs to an
/// empty slice.
#[derive(Debug)]
pub struct MmapData {
    /// The mapping, absent for zero-length objects
    map: Option<MmapMut>,
    /// Whether changes reach the underlying file
    writable: bool,
}

impl MmapData {
    /// Map `path` in full
    ///
    /// The length comes from [`device::probe_size`], so block devices map
    /// their real size rather than the zero reported by `stat`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened, stat'ed or mapped.
    pub fn open(path: &Path, rw: bool) -> Result<Self> {
        Self::open_with_probe(path, rw, |fd, st| device::probe_size(fd, st))
    }

    /// Map `path` with a caller-supplied length probe
    ///
    /// `probe` receives the open descriptor and its `stat` and returns the
    /// number of bytes to map.
    ///
    /// # Errors
    ///
    /// Returns an error if the path cannot be opened, stat'ed or mapped.
    pub fn open_with_probe<P>(path: &Path, rw: bool, probe: P) -> Result<Self>
    where
        P: FnOnce(BorrowedFd<'_>, &libc::stat) -> u64,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(rw)
            .open(path)
            .map_err(|e| io_error(format!("open {}", path.display()), e))?;
        let st = metadata::fstat(&file)?;
        let len = probe(file.as_fd(), &st);
        let map = Self::map(&file, len, rw)
            .map_err(|e| io_error(format!("mmap {} ({len} bytes)", path.display()), e))?;
        debug!("mapped {} ({len} bytes, rw={rw})", path.display());
        // The descriptor closes here; the mapping stays valid
        Ok(Self { map, writable: rw })
    }

    fn map(file: &File, len: u64, rw: bool) -> std::io::Result<Option<MmapMut>> {
        if len == 0 {
            return Ok(None);
        }
        let len = usize::try_from(len).map_err(|_| std::io::ErrorKind::FileTooLarge)?;
        let mut options = MmapOptions::new();
        options.len(len);
        // SAFETY: the mapping's validity depends on nobody truncating the file
        // underneath it, the usual contract for mapped files
        let map = unsafe {
            if rw {
                options.map_mut(file)?
            } else {
                options.map_copy(file)?
            }
        };
        Ok(Some(map))
    }

    /// Number of mapped bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len())
    }

    /// Whether nothing is mapped
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the mapping is shared with the file rather than a private copy
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    /// Flush a shared mapping back to the file
    ///
    /// # Errors
    ///
    /// Returns an error if `msync` fails.
    pub fn flush(&self) -> Result<()> {
        match &self.map {
            Some(map) => map.flush().map_err(|e| io_error("msync", e)),
            None => Ok(()),
        }
    }
}

impl Deref for MmapData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for MmapData {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.map.as_deref_mut().unwrap_or(&mut [])
    }
}

/// Search and patch NUL-terminated strings embedded in binary data
pub trait BytePatch {
    /// Replace every NUL-terminated occurrence of each `from` with its `to`
    ///
    /// At each offset every pair is tried in order. A match requires the
    /// pattern bytes followed by a NUL. The matched bytes are zeroed and `to`
    /// is written over them, so the region keeps its length and the tail of
    /// the old string stays zeroed. Scanning resumes after the replacement.
    ///
    /// Returns the number of replacements.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPatch`] before touching the data if a pattern
    /// is empty or a replacement is longer than its pattern.
    fn patch<F, T>(&mut self, pairs: &[(F, T)], log: bool) -> Result<usize>
    where
        F: AsRef<[u8]>,
        T: AsRef<[u8]>;

    /// Whether `pattern` followed by a NUL occurs anywhere
    fn contains_pattern(&self, pattern: &[u8], log: bool) -> bool;
}

/// Whether `pattern` followed by NUL starts at `data[pos]`
fn matches_at(data: &[u8], pos: usize, pattern: &[u8]) -> bool {
    let end = pos + pattern.len();
    end < data.len() && &data[pos..end] == pattern && data[end] == 0
}

impl BytePatch for [u8] {
    fn patch<F, T>(&mut self, pairs: &[(F, T)], log: bool) -> Result<usize>
    where
        F: AsRef<[u8]>,
        T: AsRef<[u8]>,
    {
        for (from, to) in pairs {
            let (from, to) = (from.as_ref(), to.as_ref());
            if from.is_empty() {
                return Err(Error::InvalidPatch("empty pattern".to_string()));
            }
            if to.len() > from.len() {
                return Err(Error::InvalidPatch(format!(
                    "replacement [{}] is longer than pattern [{}]",
                    String::from_utf8_lossy(to),
                    String::from_utf8_lossy(from)
                )));
            }
        }

        let mut count = 0;
        let mut pos = 0;
        while pos < self.len() {
            for (from, to) in pairs {
                let (from, to) = (from.as_ref(), to.as_ref());
                if matches_at(self, pos, from) {
                    if log {
                        debug!(
                            "Replace [{}] -> [{}]",
                            String::from_utf8_lossy(from),
                            String::from_utf8_lossy(to)
                        );
                    }
                    let region = &mut self[pos..pos + from.len()];
                    region.fill(0);
                    region[..to.len()].copy_from_slice(to);
                    count += 1;
                    pos += from.len();
                }
            }
            pos += 1;
        }
        Ok(count)
    }

    fn contains_pattern(&self, pattern: &[u8], log: bool) -> bool {
        let found = (0..self.len()).any(|pos| matches_at(self, pos, pattern));
        if found && log {
            debug!("Found pattern [{}]", String::from_utf8_lossy(pattern));
        }
        found
    }
}
