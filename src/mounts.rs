//! Mount table reader for `/proc/self/mounts`-style files
//!
//! Lines have the form `fsname dir type opts freq passno`. Fields are
//! separated by whitespace, and the kernel escapes space, tab, newline and
//! backslash inside a field as `\040`, `\011`, `\012` and `\134`. A line with
//! fewer than four fields or non-numeric counters is skipped; missing
//! counters read as 0.

use crate::error::{io_error, Result};
use crate::lines::read_lines;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::trace;

/// Default mount table of the calling process
pub const PROC_MOUNTS: &str = "/proc/self/mounts";

/// One mount table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mounted device or pseudo file system name
    pub fsname: String,
    /// Mount point
    pub dir: String,
    /// File system type
    pub fstype: String,
    /// Comma-separated mount options
    pub opts: String,
    /// Dump frequency
    pub freq: i32,
    /// fsck pass number
    pub passno: i32,
}

impl MountEntry {
    /// Whether the comma-separated options include `opt`
    #[must_use]
    pub fn has_opt(&self, opt: &str) -> bool {
        self.opts.split(',').any(|o| o == opt)
    }

    /// Parse a single mount table line
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_ascii_whitespace();
        let fsname = unescape(fields.next()?);
        let dir = unescape(fields.next()?);
        let fstype = unescape(fields.next()?);
        let opts = unescape(fields.next()?);
        let freq = fields.next().map_or(Some(0), |f| f.parse().ok())?;
        let passno = fields.next().map_or(Some(0), |f| f.parse().ok())?;
        Some(Self {
            fsname,
            dir,
            fstype,
            opts,
            freq,
            passno,
        })
    }
}

/// Decode the kernel's `\ooo` octal escapes
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            if let Some(b) = octal(&bytes[i + 1..i + 4]) {
                out.push(b);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn octal(digits: &[u8]) -> Option<u8> {
    digits.iter().try_fold(0u8, |acc, &d| match d {
        b'0'..=b'7' => acc.checked_mul(8)?.checked_add(d - b'0'),
        _ => None,
    })
}

/// Feed each parseable entry of `reader` to `visitor`
///
/// # Errors
///
/// Returns an error if reading fails.
pub fn parse_mounts<R, F>(reader: R, mut visitor: F) -> io::Result<()>
where
    R: BufRead,
    F: FnMut(&MountEntry) -> bool,
{
    read_lines(true, reader, |line| {
        match MountEntry::parse(&String::from_utf8_lossy(line)) {
            Some(entry) => visitor(&entry),
            None => {
                trace!("skipping malformed mount line");
                true
            }
        }
    })
}

/// [`parse_mounts`] over a file such as [`PROC_MOUNTS`]
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn parse_mounts_path<F>(path: &Path, visitor: F) -> Result<()>
where
    F: FnMut(&MountEntry) -> bool,
{
    let file = File::open(path).map_err(|e| io_error(format!("open {}", path.display()), e))?;
    parse_mounts(BufReader::new(file), visitor)
        .map_err(|e| io_error(format!("read {}", path.display()), e))
}

/// Collect every entry of a mount table file
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn read_mounts(path: &Path) -> Result<Vec<MountEntry>> {
    let mut entries = Vec::new();
    parse_mounts_path(path, |entry| {
        entries.push(entry.clone());
        true
    })?;
    Ok(entries)
}
