//! Hard link creation

use crate::directory::DirectoryFd;
use crate::error::{os_error, path_cstring, Result};
use std::ffi::CStr;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;

/// Hard link `src_dir/name` as `dest_dir/new_name`
///
/// Symlinks are linked as themselves, never their targets.
///
/// # Errors
///
/// Returns an error if `linkat(2)` fails (`EXDEV` across file systems,
/// `EEXIST` when `new_name` is taken).
pub fn linkat(
    src_dir: &DirectoryFd,
    name: &CStr,
    dest_dir: &DirectoryFd,
    new_name: &CStr,
) -> Result<()> {
    // SAFETY: both descriptors are live; names are NUL-terminated
    let ret = unsafe {
        libc::linkat(
            src_dir.as_raw_fd(),
            name.as_ptr(),
            dest_dir.as_raw_fd(),
            new_name.as_ptr(),
            0,
        )
    };
    if ret < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("linkat", src_dir.child_path(name).display(), err));
    }
    Ok(())
}

/// Hard link `src` as `dest`
///
/// # Errors
///
/// Returns an error if `link(2)` fails.
pub fn link(src: &Path, dest: &Path) -> Result<()> {
    let c_src = path_cstring(src)?;
    let c_dest = path_cstring(dest)?;
    // SAFETY: both strings are NUL-terminated
    if unsafe { libc::link(c_src.as_ptr(), c_dest.as_ptr()) } < 0 {
        let err = io::Error::last_os_error();
        return Err(os_error("link", src.display(), err));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::fs;
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    #[test]
    fn test_linkat_shares_inode() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("a")).unwrap();
        fs::create_dir(temp_dir.path().join("b")).unwrap();
        fs::write(temp_dir.path().join("a/f"), "data").unwrap();

        let a = DirectoryFd::open(&temp_dir.path().join("a")).unwrap();
        let b = DirectoryFd::open(&temp_dir.path().join("b")).unwrap();
        linkat(&a, &CString::new("f").unwrap(), &b, &CString::new("g").unwrap()).unwrap();

        let ino_a = fs::metadata(temp_dir.path().join("a/f")).unwrap().ino();
        let ino_b = fs::metadata(temp_dir.path().join("b/g")).unwrap().ino();
        assert_eq!(ino_a, ino_b);
    }

    #[test]
    fn test_link_existing_destination_fails() {
        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        let dst = temp_dir.path().join("dst");
        fs::write(&src, "").unwrap();
        fs::write(&dst, "").unwrap();
        assert_eq!(link(&src, &dst).unwrap_err().raw_os_error(), Some(libc::EEXIST));
    }
}
