//! End-to-end tree operation scenarios
//!
//! Each test builds a scratch tree, runs one public operation on it and
//! checks the resulting structure with a walkdir-based compare.

mod common;

use common::{assert_trees_equal, create_sample_tree, is_root, snapshot};
use fs_extended::DirectoryFd;
use fstree::backup::{backup_tree, restore_tree};
use fstree::directory::{
    clone_tree, cp_afc, hardlink_tree, move_tree, post_order_walk, pre_order_walk, rm_rf,
    WalkResult,
};
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use tempfile::TempDir;
use tracing_test::traced_test;

fn mode_of(path: &Path) -> u32 {
    fs::symlink_metadata(path).unwrap().permissions().mode() & 0o777
}

fn open(path: &Path) -> DirectoryFd {
    DirectoryFd::open(path).unwrap()
}

/// A 16-byte file, an empty directory and a symlink
fn create_clone_source(root: &Path) {
    fs::create_dir_all(root.join("empty")).unwrap();
    fs::write(root.join("data"), b"0123456789abcdef").unwrap();
    fs::set_permissions(root.join("data"), fs::Permissions::from_mode(0o640)).unwrap();
    std::os::unix::fs::symlink("data", root.join("alias")).unwrap();
}

#[test]
fn test_backup_restore_into_new_root() {
    let temp_dir = TempDir::new().unwrap();
    let a = temp_dir.path().join("a");
    let b = temp_dir.path().join("b");
    create_sample_tree(&a);

    let files = backup_tree(&a).unwrap();
    restore_tree(&b, &files).unwrap();

    assert_eq!(mode_of(&b.join("f")), 0o644);
    assert_eq!(fs::read(b.join("f")).unwrap(), b"hi");
    assert!(fs::symlink_metadata(b.join("link"))
        .unwrap()
        .file_type()
        .is_symlink());
    assert_eq!(fs::read_link(b.join("link")).unwrap(), Path::new("f"));
    assert_eq!(mode_of(&b.join("sub/g")), 0o600);
    assert!(fs::read(b.join("sub/g")).unwrap().is_empty());
    assert_trees_equal(&a, &b);
}

#[test]
fn test_clone_tree_is_byte_identical() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    let dst = temp_dir.path().join("dst");
    create_clone_source(&src);
    fs::create_dir(&dst).unwrap();

    clone_tree(open(&src), open(&dst)).unwrap();

    assert_trees_equal(&src, &dst);
    assert_eq!(fs::read(dst.join("data")).unwrap(), b"0123456789abcdef");
}

#[test]
fn test_cp_afc_directory_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    let dst = temp_dir.path().join("nested/dst");
    create_sample_tree(&src);
    fs::set_permissions(&src, fs::Permissions::from_mode(0o711)).unwrap();

    cp_afc(&src, &dst).unwrap();

    assert_trees_equal(&src, &dst);
    assert_eq!(mode_of(&dst), 0o711);
}

#[test]
fn test_hardlink_tree_shares_inodes_and_recreates_symlinks() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    let dst = temp_dir.path().join("dst");
    create_clone_source(&src);
    fs::create_dir(&dst).unwrap();

    hardlink_tree(open(&src), open(&dst)).unwrap();

    let ino = |p: &Path| fs::symlink_metadata(p).unwrap().ino();
    assert_eq!(ino(&src.join("data")), ino(&dst.join("data")));
    assert_ne!(ino(&src.join("alias")), ino(&dst.join("alias")));
    assert_eq!(fs::read_link(dst.join("alias")).unwrap(), Path::new("data"));
    assert_ne!(ino(&src.join("empty")), ino(&dst.join("empty")));
    assert!(dst.join("empty").is_dir());
}

#[test]
fn test_move_tree_merges_into_existing_directory() {
    let temp_dir = TempDir::new().unwrap();
    let x = temp_dir.path().join("x");
    let y = temp_dir.path().join("y");
    fs::create_dir_all(x.join("a/b")).unwrap();
    fs::write(x.join("a/b/c"), "c").unwrap();
    fs::create_dir_all(x.join("empty")).unwrap();
    fs::create_dir_all(y.join("a")).unwrap();
    fs::write(y.join("a/d"), "d").unwrap();

    move_tree(open(&x), open(&y)).unwrap();

    assert_eq!(fs::read(y.join("a/b/c")).unwrap(), b"c");
    assert_eq!(fs::read(y.join("a/d")).unwrap(), b"d");
    assert!(y.join("empty").is_dir());
    assert_eq!(fs::read_dir(&x).unwrap().count(), 0);
}

#[test]
fn test_rm_rf_removes_whole_tree() {
    let temp_dir = TempDir::new().unwrap();
    let a = temp_dir.path().join("a");
    create_sample_tree(&a);

    rm_rf(&a).unwrap();

    let err = fs::symlink_metadata(&a).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
}

#[traced_test]
#[test]
fn test_unreadable_subdirectory_is_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join("locked/inner")).unwrap();
    fs::create_dir_all(root.join("open/inner")).unwrap();
    fs::write(root.join("file"), "x").unwrap();
    fs::set_permissions(root.join("locked"), fs::Permissions::from_mode(0)).unwrap();

    let mut visited = Vec::new();
    let result = pre_order_walk(open(root), |dir, entry| {
        visited.push(dir.child_path(entry.name()));
        WalkResult::Continue
    });

    fs::set_permissions(root.join("locked"), fs::Permissions::from_mode(0o755)).unwrap();
    assert_eq!(result.unwrap(), WalkResult::Continue);

    assert!(visited.contains(&root.join("file")));
    assert!(visited.contains(&root.join("locked")));
    assert!(visited.contains(&root.join("open/inner")));
    // Root bypasses the permission check
    assert_eq!(visited.contains(&root.join("locked/inner")), is_root());

    // The failed open is reported exactly once
    let expected = usize::from(!is_root());
    logs_assert(|lines: &[&str]| {
        let errors = lines
            .iter()
            .filter(|line| line.contains("ERROR") && line.contains("openat: locked: "))
            .count();
        if errors == expected {
            Ok(())
        } else {
            Err(format!("expected {expected} openat errors for locked, got {errors}"))
        }
    });
}

#[test]
fn test_post_order_sees_children_first_across_tree() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("t");
    create_sample_tree(&root);

    let mut order = Vec::new();
    post_order_walk(open(&root), |dir, entry| {
        order.push(dir.child_path(entry.name()));
    })
    .unwrap();

    let pos = |p: &Path| order.iter().position(|o| o == p).unwrap();
    assert!(pos(&root.join("sub/g")) < pos(&root.join("sub")));
    assert_eq!(order.len(), snapshot(&root).len());
}
