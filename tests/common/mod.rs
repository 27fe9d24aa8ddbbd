//! Shared helpers for tree-level integration tests

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Build `root/{f(0644, "hi"), link -> f, sub/g(0600, "")}`
#[allow(dead_code)]
pub fn create_sample_tree(root: &Path) {
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("f"), "hi").unwrap();
    fs::set_permissions(root.join("f"), fs::Permissions::from_mode(0o644)).unwrap();
    std::os::unix::fs::symlink("f", root.join("link")).unwrap();
    fs::write(root.join("sub/g"), "").unwrap();
    fs::set_permissions(root.join("sub/g"), fs::Permissions::from_mode(0o600)).unwrap();
}

/// What a structural compare looks at for one entry
#[derive(Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub path: PathBuf,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub content: Vec<u8>,
}

/// Every entry below `root` in sorted order, without `root` itself
///
/// Symlink permission bits are not compared since they cannot be set.
pub fn snapshot(root: &Path) -> Vec<Snapshot> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let meta = entry.path().symlink_metadata().unwrap();
            let is_symlink = meta.file_type().is_symlink();
            let content = if is_symlink {
                fs::read_link(entry.path())
                    .unwrap()
                    .into_os_string()
                    .into_encoded_bytes()
            } else if meta.is_file() {
                fs::read(entry.path()).unwrap()
            } else {
                Vec::new()
            };
            Snapshot {
                path: entry.path().strip_prefix(root).unwrap().to_path_buf(),
                mode: if is_symlink {
                    meta.mode() & u32::from(libc::S_IFMT)
                } else {
                    meta.mode()
                },
                uid: meta.uid(),
                gid: meta.gid(),
                content,
            }
        })
        .collect()
}

/// Assert that two trees have the same shape, contents, modes and owners
#[allow(dead_code)]
pub fn assert_trees_equal(a: &Path, b: &Path) {
    assert_eq!(snapshot(a), snapshot(b));
}

/// Whether the test runs with root privileges
#[allow(dead_code)]
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}
