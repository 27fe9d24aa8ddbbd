//! Line and property-file readers
//!
//! Visitors return `true` to keep reading and `false` to stop. Lines are
//! handed out as borrowed views into a single reused buffer.

use crate::error::{io_error, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::error;

/// Trailing characters removed by trimming
const TRAILING: &[u8] = b"\n\r ";

/// Strip trailing newline, carriage-return and space bytes and leading spaces
fn trim_line(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., last] = line {
        if !TRAILING.contains(last) {
            break;
        }
        line = rest;
    }
    while let [b' ', rest @ ..] = line {
        line = rest;
    }
    line
}

/// Feed each line of `reader` to `visitor`
///
/// Without `trim` the line is passed as read, including its newline. With
/// `trim`, trailing `\n`, `\r` and spaces and leading spaces are removed.
///
/// # Errors
///
/// Returns an error if reading fails.
pub fn read_lines<R, F>(trim: bool, mut reader: R, mut visitor: F) -> io::Result<()>
where
    R: BufRead,
    F: FnMut(&[u8]) -> bool,
{
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let line = if trim { trim_line(&buf) } else { &buf[..] };
        if !visitor(line) {
            return Ok(());
        }
    }
}

/// Feed each `key=value` pair of a property file to `visitor`
///
/// Lines are trimmed first. Comment lines (`#...`), lines without `=` and
/// lines starting with `=` are ignored. The split happens at the first `=`;
/// key and value are not trimmed further.
///
/// # Errors
///
/// Returns an error if reading fails.
pub fn read_props<R, F>(reader: R, mut visitor: F) -> io::Result<()>
where
    R: BufRead,
    F: FnMut(&[u8], &[u8]) -> bool,
{
    read_lines(true, reader, |line| {
        if line.first() == Some(&b'#') {
            return true;
        }
        match line.iter().position(|&b| b == b'=') {
            None | Some(0) => true,
            Some(eq) => visitor(&line[..eq], &line[eq + 1..]),
        }
    })
}

/// Open `path` for line reading; a missing file is logged and yields `None`
fn open_optional(path: &Path) -> Result<Option<BufReader<File>>> {
    match File::open(path) {
        Ok(file) => Ok(Some(BufReader::new(file))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            error!("open {}: {e}", path.display());
            Ok(None)
        }
        Err(e) => Err(io_error(format!("open {}", path.display()), e)),
    }
}

/// [`read_lines`] over a file; a missing file visits nothing
///
/// # Errors
///
/// Returns an error if the file exists but cannot be opened or read.
pub fn read_lines_path<F>(trim: bool, path: &Path, visitor: F) -> Result<()>
where
    F: FnMut(&[u8]) -> bool,
{
    match open_optional(path)? {
        Some(reader) => read_lines(trim, reader, visitor)
            .map_err(|e| io_error(format!("read {}", path.display()), e)),
        None => Ok(()),
    }
}

/// [`read_props`] over a file; a missing file visits nothing
///
/// # Errors
///
/// Returns an error if the file exists but cannot be opened or read.
pub fn read_props_path<F>(path: &Path, visitor: F) -> Result<()>
where
    F: FnMut(&[u8], &[u8]) -> bool,
{
    match open_optional(path)? {
        Some(reader) => {
            read_props(reader, visitor).map_err(|e| io_error(format!("read {}", path.display()), e))
        }
        None => Ok(()),
    }
}

/// Read a whole file
///
/// # Errors
///
/// Returns the open or read failure, logged at its origin.
pub fn full_read_path(path: &Path) -> Result<Vec<u8>> {
    let fd = fs_extended::io::open(path, libc::O_RDONLY, 0)?;
    Ok(fs_extended::io::read_to_end(&fd)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn collect_lines(trim: bool, input: &str) -> Vec<String> {
        let mut out = Vec::new();
        read_lines(trim, input.as_bytes(), |line| {
            out.push(String::from_utf8_lossy(line).into_owned());
            true
        })
        .unwrap();
        out
    }

    #[rstest]
    #[case("   key = value \r\n", "key = value")]
    #[case("plain\n", "plain")]
    #[case("  \r\n", "")]
    #[case("no newline  ", "no newline")]
    #[case("\tkeeps tab\n", "\tkeeps tab")]
    fn test_trimmed_lines(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(collect_lines(true, input), vec![expected.to_string()]);
    }

    #[test]
    fn test_untrimmed_lines_keep_newlines() {
        assert_eq!(collect_lines(false, "a\n b\nc"), vec!["a\n", " b\n", "c"]);
    }

    #[test]
    fn test_visitor_can_stop_early() {
        let mut seen = 0;
        read_lines(false, "1\n2\n3\n".as_bytes(), |_| {
            seen += 1;
            seen < 2
        })
        .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_props_filtering() {
        let input = "# comment\nro.a=1\n=nokey\nnoeq\n  ro.b = x=y \nro.c=\n";
        let mut props = Vec::new();
        read_props(input.as_bytes(), |k, v| {
            props.push((
                String::from_utf8_lossy(k).into_owned(),
                String::from_utf8_lossy(v).into_owned(),
            ));
            true
        })
        .unwrap();

        assert_eq!(
            props,
            vec![
                ("ro.a".to_string(), "1".to_string()),
                ("ro.b ".to_string(), " x=y".to_string()),
                ("ro.c".to_string(), String::new()),
            ]
        );
    }

    #[traced_test]
    #[test]
    fn test_missing_file_visits_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut visits = 0;
        read_props_path(&temp_dir.path().join("none.prop"), |_, _| {
            visits += 1;
            true
        })
        .unwrap();
        assert_eq!(visits, 0);
        assert!(logs_contain("none.prop: "));
    }

    #[traced_test]
    #[test]
    fn test_full_read_path_surfaces_open_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data");
        fs::write(&path, "content").unwrap();

        assert_eq!(full_read_path(&path).unwrap(), b"content");
        let err = full_read_path(&temp_dir.path().join("none")).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
        assert!(logs_contain("none: "));
    }
}
