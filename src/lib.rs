//! # fstree
//!
//! Recursive POSIX file-tree operations with full attribute and
//! security-label fidelity.
//!
//! The primitive layer lives in the [`fs_extended`] crate: directory file
//! descriptors with `*at` syscalls, [`FileAttr`](fs_extended::FileAttr)
//! capture and application, and the errno-logging wrappers. This crate
//! builds the tree operations on top of it.
//!
//! ## Modules
//!
//! - [`directory`]: pre-order/post-order walkers and the remove, copy, link
//!   and move operations built on them
//! - [`backup`]: in-memory snapshot and restore of a tree
//! - [`mmap`]: whole-file mappings (block devices included) and NUL-terminated
//!   string patching
//! - [`lines`] and [`mounts`]: line, property-file and mount-table readers
//! - [`process`]: fork and exec helpers
//! - [`misc`]: string and integer helpers
//! - [`cli`]: argument definitions for the `fstree` binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use fstree::directory::{cp_afc, rm_rf};
//! use std::path::Path;
//!
//! # fn example() -> fstree::Result<()> {
//! cp_afc(Path::new("/data/adb/modules/foo"), Path::new("/data/adb/modules_update/foo"))?;
//! rm_rf(Path::new("/data/adb/modules/foo"))?;
//! # Ok(())
//! # }
//! ```

#![cfg(unix)]

pub mod backup;
pub mod cli;
pub mod directory;
pub mod error;
pub mod lines;
pub mod misc;
pub mod mmap;
pub mod mounts;
pub mod process;

pub use error::{Error, Result};
