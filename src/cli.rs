//! Command-line interface definitions
//!
//! Each subcommand maps onto one library operation. Output and logging flags
//! are global and shared by all of them.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

/// Recursive file-tree operations with attribute and security-label fidelity
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Operation to run
    #[command(subcommand)]
    pub command: Command,

    /// Output and logging configuration
    #[command(flatten)]
    pub output: OutputConfig,
}

/// Available operations
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Remove a path recursively, ignoring a missing path
    Rm {
        /// Path to remove
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Copy a file, symlink or directory tree with all attributes
    Cp(PathPair),

    /// Mirror a directory tree into an existing directory with hard links
    Ln(PathPair),

    /// Move a path, merging into an existing destination directory
    Mv(PathPair),

    /// Capture a directory tree in memory and list the captured entries
    Backup {
        /// Root of the tree to capture
        #[arg(value_name = "ROOT")]
        root: PathBuf,
    },

    /// Capture a tree in memory and restore it under another root
    CloneTo(PathPair),

    /// Replace NUL-terminated strings inside a file in place
    Patch {
        /// File or block device to patch
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Replacement pairs as FROM=TO
        #[arg(value_name = "FROM=TO", required = true, value_parser = parse_pair)]
        pairs: Vec<(String, String)>,
    },

    /// Check whether a file contains a NUL-terminated string
    Contains {
        /// File or block device to search
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// String to look for
        #[arg(value_name = "PATTERN")]
        pattern: String,
    },

    /// Print the mount table
    Mounts {
        /// Mount table to read
        #[arg(long, default_value = crate::mounts::PROC_MOUNTS)]
        table: PathBuf,
    },

    /// Print the key/value pairs of a property file
    Props {
        /// Property file to read
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Source and destination paths
#[derive(clap::Args, Debug, Clone)]
pub struct PathPair {
    /// Source path
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Destination path
    #[arg(value_name = "DESTINATION")]
    pub destination: PathBuf,
}

/// Output and logging configuration
#[derive(clap::Args, Debug, Clone, Default)]
#[command(next_help_heading = "Output Options")]
pub struct OutputConfig {
    /// Verbose output (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl OutputConfig {
    /// Maximum level for the log subscriber
    #[must_use]
    pub const fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((from, to)) if !from.is_empty() => Ok((from.to_string(), to.to_string())),
        _ => Err(format!("expected FROM=TO with a non-empty FROM, got: {s}")),
    }
}

impl Args {
    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - Both --quiet and --verbose options are used
    /// - A patch replacement is longer than its pattern
    /// - A source path does not exist
    pub fn validate(&self) -> Result<()> {
        if self.output.quiet && self.output.verbose > 0 {
            anyhow::bail!("Cannot use both --quiet and --verbose options");
        }

        match &self.command {
            Command::Patch { pairs, .. } => {
                if let Some((from, to)) = pairs.iter().find(|(from, to)| to.len() > from.len()) {
                    anyhow::bail!("Replacement must not be longer than pattern: {from}={to}");
                }
            }
            Command::Cp(paths) | Command::Ln(paths) | Command::Mv(paths) => {
                if std::fs::symlink_metadata(&paths.source).is_err() {
                    anyhow::bail!("Source path does not exist: {}", paths.source.display());
                }
            }
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("fstree").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_patch_pairs_parse() {
        let args = parse(&["patch", "bin", "/system=/dev", "abc=ab"]);
        match args.command {
            Command::Patch { file, pairs } => {
                assert_eq!(file, PathBuf::from("bin"));
                assert_eq!(
                    pairs,
                    vec![
                        ("/system".to_string(), "/dev".to_string()),
                        ("abc".to_string(), "ab".to_string())
                    ]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Args::try_parse_from(["fstree", "patch", "bin", "=x"]).is_err());
    }

    #[test]
    fn test_validate_rejects_long_replacement() {
        let args = parse(&["patch", "bin", "ab=abc"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_quiet_and_verbose() {
        let args = parse(&["-q", "-v", "mounts"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validate_checks_source() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        let args = parse(&["cp", missing.to_str().unwrap(), "dst"]);
        assert!(args.validate().is_err());

        let args = parse(&["cp", temp_dir.path().to_str().unwrap(), "dst"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_mounts_default_table() {
        match parse(&["mounts"]).command {
            Command::Mounts { table } => assert_eq!(table, PathBuf::from("/proc/self/mounts")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[rstest]
    #[case(&["rm", "x"], Level::WARN)]
    #[case(&["-v", "rm", "x"], Level::INFO)]
    #[case(&["rm", "x", "-vv"], Level::DEBUG)]
    #[case(&["-vvvv", "rm", "x"], Level::TRACE)]
    #[case(&["-q", "rm", "x"], Level::ERROR)]
    fn test_log_level(#[case] argv: &[&str], #[case] level: Level) {
        assert_eq!(parse(argv).output.log_level(), level);
    }
}
