//! Small helpers shared across the pipeline: external command execution,
//! fasta measurement, genome naming.

use std::path::Path;
use std::process::Command;

use anyhow::{bail, Context, Result};
use bio::io::fasta;

// --------------------------------------------------

/// Genome name for a fasta path: the file name with its final extension
/// stripped, so `genomes/Ecoli_K12.fna` becomes `Ecoli_K12`.
pub fn genome_name_from_path(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Total number of bases across every record in a fasta file.
pub fn fasta_length(path: &str) -> Result<u64> {
    let reader = fasta::Reader::from_file(path)
        .with_context(|| format!("opening fasta {path}"))?;
    let mut length: u64 = 0;
    for record in reader.records() {
        let record = record.with_context(|| format!("reading fasta {path}"))?;
        length += record.seq().len() as u64;
    }
    Ok(length)
}

// --------------------------------------------------

/// Run an external command, logging its rendered form first. With `dry` set
/// the command is printed to stdout instead of run.
pub fn run_cmd(program: &str, args: &[String], dry: bool) -> Result<()> {
    let rendered = render(program, args);
    if dry {
        println!("{rendered}");
        return Ok(());
    }
    log::info!("running: {rendered}");
    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("launching {program}"))?;
    if !status.success() {
        bail!("command failed ({status}): {rendered}");
    }
    Ok(())
}

/// Run an external command and capture its stdout.
pub fn capture_cmd(program: &str, args: &[String]) -> Result<Vec<u8>> {
    let rendered = render(program, args);
    log::info!("running: {rendered}");
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("launching {program}"))?;
    if !output.status.success() {
        bail!("command failed ({}): {rendered}", output.status);
    }
    Ok(output.stdout)
}

fn render(program: &str, args: &[String]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}
