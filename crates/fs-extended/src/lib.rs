//! # fs-extended
//!
//! Error-logged POSIX filesystem primitives for tree operations:
//! - `DirectoryFd` with the secure `*at` syscall family
//! - File attributes (mode, ownership, security label) at path, dirfd + name and fd
//! - Symlink and hardlink creation
//! - `sendfile` copy with per-platform handling
//! - Device nodes and block-device size probing
//!
//! Every wrapper returns a [`Result`] and logs exactly one `tracing` error
//! event at the failing call site, so callers only propagate with `?`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fs_extended::{metadata, DirectoryFd};
//! use std::path::Path;
//!
//! # fn example() -> fs_extended::Result<()> {
//! let dir = DirectoryFd::open(Path::new("/data/adb"))?;
//! for entry in dir.entries()? {
//!     let entry = entry?;
//!     let attr = metadata::get_at(&dir, entry.name())?;
//!     println!("{:?} {:o} {}", entry.file_name(), attr.permissions(), attr.label);
//! }
//! dir.mkdirat(c"modules", 0o755)?;
//! # Ok(())
//! # }
//! ```
//!
//! Only Unix targets are supported.

#![cfg(unix)]

pub mod copy;
pub mod device;
pub mod directory;
pub mod error;
pub mod hardlink;
pub mod io;
pub mod metadata;
pub mod symlink;
pub mod xattr;

// Re-export main types
pub use directory::{DirEntry, DirectoryFd, EntryKind};
pub use error::{ExtendedError, Result};
pub use metadata::{FileAttr, SecurityLabel};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
