//! Command-line smoke tests for the fstree binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn fstree() -> Command {
    Command::cargo_bin("fstree").unwrap()
}

#[test]
fn test_cp_and_rm() {
    let temp_dir = TempDir::new().unwrap();
    let src = temp_dir.path().join("src");
    let dst = temp_dir.path().join("dst");
    fs::create_dir_all(src.join("sub")).unwrap();
    fs::write(src.join("sub/f"), "payload").unwrap();

    fstree().arg("cp").arg(&src).arg(&dst).assert().success();
    assert_eq!(fs::read(dst.join("sub/f")).unwrap(), b"payload");

    fstree().arg("rm").arg(&dst).assert().success();
    assert!(!dst.exists());
    fstree().arg("rm").arg(&dst).assert().success();
}

#[test]
fn test_cp_missing_source_fails() {
    let temp_dir = TempDir::new().unwrap();
    fstree()
        .arg("cp")
        .arg(temp_dir.path().join("none"))
        .arg(temp_dir.path().join("dst"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Source path does not exist"));
}

#[test]
fn test_patch_and_contains() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    fs::write(&bin, b"\0/system/bin/sh\0rest").unwrap();

    fstree()
        .arg("contains")
        .arg(&bin)
        .arg("/system/bin/sh")
        .assert()
        .success();
    fstree()
        .arg("patch")
        .arg(&bin)
        .arg("/system/bin/sh=/bin/sh")
        .assert()
        .success()
        .stdout("1\n");
    fstree()
        .arg("contains")
        .arg(&bin)
        .arg("/system/bin/sh")
        .assert()
        .failure();
    assert_eq!(fs::read(&bin).unwrap(), b"\0/bin/sh\0\0\0\0\0\0\0\0rest");
}

#[test]
fn test_patch_rejects_longer_replacement() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    fs::write(&bin, b"abc\0").unwrap();

    fstree()
        .arg("patch")
        .arg(&bin)
        .arg("abc=abcd")
        .assert()
        .failure()
        .stderr(predicate::str::contains("longer than pattern"));
    assert_eq!(fs::read(&bin).unwrap(), b"abc\0");
}

#[test]
fn test_props_and_mounts() {
    let temp_dir = TempDir::new().unwrap();
    let props = temp_dir.path().join("build.prop");
    fs::write(&props, "# comment\nro.build.id=ABC\nbad line\n").unwrap();
    fstree()
        .arg("props")
        .arg(&props)
        .assert()
        .success()
        .stdout("ro.build.id=ABC\n");

    let table = temp_dir.path().join("mounts");
    fs::write(&table, "tmpfs /mnt\\040x tmpfs rw 0 0\n").unwrap();
    fstree()
        .arg("mounts")
        .arg("--table")
        .arg(&table)
        .assert()
        .success()
        .stdout("tmpfs /mnt x tmpfs rw 0 0\n");
}

#[test]
fn test_backup_lists_entries() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("file"), "x").unwrap();
    fstree()
        .arg("backup")
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::ends_with(" file\n"));
}
