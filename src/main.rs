//! fstree command-line entry point

use anyhow::{Context, Result};
use clap::Parser;
use fstree::backup::{backup_tree, restore_tree};
use fstree::cli::{Args, Command};
use fstree::directory::{cp_afc, link_path, mv_path, rm_rf};
use fstree::lines::read_props_path;
use fstree::mmap::{BytePatch, MmapData};
use fstree::mounts::parse_mounts_path;
use std::process::ExitCode;
use tracing::info;

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.output.log_level())
        .with_writer(std::io::stderr)
        .init();

    args.validate()?;
    run(&args)
}

fn run(args: &Args) -> Result<ExitCode> {
    match &args.command {
        Command::Rm { path } => {
            rm_rf(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Command::Cp(p) => cp_afc(&p.source, &p.destination).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                p.source.display(),
                p.destination.display()
            )
        })?,
        Command::Ln(p) => link_path(&p.source, &p.destination).with_context(|| {
            format!(
                "Failed to link {} into {}",
                p.source.display(),
                p.destination.display()
            )
        })?,
        Command::Mv(p) => mv_path(&p.source, &p.destination).with_context(|| {
            format!(
                "Failed to move {} to {}",
                p.source.display(),
                p.destination.display()
            )
        })?,
        Command::Backup { root } => {
            let files = backup_tree(root)
                .with_context(|| format!("Failed to back up {}", root.display()))?;
            for file in &files {
                println!(
                    "{:06o} {:>5}:{:<5} {:>10} {} {}",
                    file.attr.mode,
                    file.attr.uid,
                    file.attr.gid,
                    file.content.len(),
                    file.attr.label,
                    file.path.display()
                );
            }
        }
        Command::CloneTo(p) => {
            let files = backup_tree(&p.source)
                .with_context(|| format!("Failed to back up {}", p.source.display()))?;
            restore_tree(&p.destination, &files)
                .with_context(|| format!("Failed to restore into {}", p.destination.display()))?;
            info!("restored {} entries", files.len());
        }
        Command::Patch { file, pairs } => {
            let mut data = MmapData::open(file, true)
                .with_context(|| format!("Failed to map {}", file.display()))?;
            let count = data.patch(pairs, args.output.verbose > 0)?;
            data.flush()?;
            println!("{count}");
            if count == 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Contains { file, pattern } => {
            let data = MmapData::open(file, false)
                .with_context(|| format!("Failed to map {}", file.display()))?;
            if !data.contains_pattern(pattern.as_bytes(), args.output.verbose > 0) {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Mounts { table } => {
            parse_mounts_path(table, |entry| {
                println!(
                    "{} {} {} {} {} {}",
                    entry.fsname, entry.dir, entry.fstype, entry.opts, entry.freq, entry.passno
                );
                true
            })
            .with_context(|| format!("Failed to read {}", table.display()))?;
        }
        Command::Props { file } => {
            read_props_path(file, |key, value| {
                println!(
                    "{}={}",
                    String::from_utf8_lossy(key),
                    String::from_utf8_lossy(value)
                );
                true
            })
            .with_context(|| format!("Failed to read {}", file.display()))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
