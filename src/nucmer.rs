//! The secondary comparison stage: pairwise whole-genome alignment with the
//! external `nucmer` tool and parsing of its `.delta` output into average
//! nucleotide identity (ANI) and coverage figures.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use glob::glob;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::genomes::GenomeRecord;

// --------------------------------------------------

/// Seed-matching strategy handed to nucmer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignMethod {
    Mum,
    MumReference,
    MaxMatch,
}

impl AlignMethod {
    /// The nucmer flag selecting this strategy.
    pub fn flag(&self) -> &'static str {
        match self {
            AlignMethod::Mum => "--mum",
            AlignMethod::MumReference => "--mumreference",
            AlignMethod::MaxMatch => "--maxmatch",
        }
    }
}

impl FromStr for AlignMethod {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<AlignMethod, Self::Err> {
        match input {
            "mum" => Ok(AlignMethod::Mum),
            "mumreference" => Ok(AlignMethod::MumReference),
            "maxmatch" => Ok(AlignMethod::MaxMatch),
            _ => Err(anyhow!("Invalid alignment method: {}", input)),
        }
    }
}

impl fmt::Display for AlignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let method_str = match self {
            AlignMethod::Mum => "mum",
            AlignMethod::MumReference => "mumreference",
            AlignMethod::MaxMatch => "maxmatch",
        };
        write!(f, "{}", method_str)
    }
}

/// How to invoke nucmer.
#[derive(Debug, Clone)]
pub struct NucmerParams {
    pub exe: String,
    /// `-c`, the minimum cluster length.
    pub min_cluster: u32,
    /// `-g`, the maximum gap between adjacent matches in a cluster.
    pub max_gap: u32,
    pub no_extend: bool,
    pub method: AlignMethod,
}

impl Default for NucmerParams {
    fn default() -> Self {
        Self {
            exe: "nucmer".to_string(),
            min_cluster: 65,
            max_gap: 90,
            no_extend: false,
            method: AlignMethod::Mum,
        }
    }
}

/// One pairwise alignment job. `prefix` is nucmer's `-p` argument; the
/// delta file lands at `<prefix>.delta`.
#[derive(Debug, Clone, PartialEq)]
pub struct NucmerJob {
    pub prefix: PathBuf,
    pub reference: String,
    pub query: String,
}

impl NucmerJob {
    /// Argument vector for this job, without the executable itself.
    pub fn command_args(&self, params: &NucmerParams) -> Vec<String> {
        let mut args = vec![
            params.method.flag().to_string(),
            "-p".to_string(),
            self.prefix.to_string_lossy().into_owned(),
            "-c".to_string(),
            params.min_cluster.to_string(),
            "-g".to_string(),
            params.max_gap.to_string(),
        ];
        if params.no_extend {
            args.push("--noextend".to_string());
        }
        args.push(self.reference.clone());
        args.push(self.query.clone());
        args
    }
}

// --------------------------------------------------

/// Build the full g1-vs-g2 job matrix (self pairs included) for one batch of
/// genomes, with delta prefixes `<outdir>/<g1>_vs_<g2>`.
pub fn pairwise_jobs(genomes: &[GenomeRecord], outdir: &Path) -> Vec<NucmerJob> {
    let mut jobs = Vec::new();
    for g1 in genomes {
        for g2 in genomes {
            jobs.push(NucmerJob {
                prefix: outdir.join(format!("{}_vs_{}", g1.genome, g2.genome)),
                reference: g1.location.clone(),
                query: g2.location.clone(),
            });
        }
    }
    jobs
}

/// Run jobs on a pool of `threads` workers. A failing alignment is logged
/// and skipped, so the pair simply contributes no delta file. With `dry`
/// set the commands are printed instead.
pub fn run_jobs(jobs: &[NucmerJob], params: &NucmerParams, threads: usize, dry: bool) -> Result<()> {
    if dry {
        for job in jobs {
            let mut rendered = params.exe.clone();
            for arg in job.command_args(params) {
                rendered.push(' ');
                rendered.push_str(&arg);
            }
            println!("{rendered}");
        }
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("building the alignment worker pool")?;
    pool.install(|| {
        jobs.par_iter().for_each(|job| {
            match Command::new(&params.exe)
                .args(job.command_args(params))
                .status()
            {
                Ok(status) if status.success() => {}
                Ok(status) => {
                    log::warn!("nucmer exited with {status} for {}", job.prefix.display());
                }
                Err(e) => {
                    log::warn!("failed to launch nucmer for {}: {e}", job.prefix.display());
                }
            }
        });
    });
    Ok(())
}

// --------------------------------------------------

/// Total alignment length and similarity errors summed over every aligned
/// region in a nucmer `.delta` file.
///
/// Region rows carry seven fields; the path header, `NUCMER` and `>`
/// sequence headers, and the offset lines between them are skipped.
pub fn parse_delta(path: &Path) -> Result<(u64, u64)> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut aln_length: u64 = 0;
    let mut sim_errors: u64 = 0;

    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.first() {
            None => continue,
            Some(&"NUCMER") => continue,
            Some(first) if first.starts_with('>') => continue,
            _ => {}
        }
        if fields.len() == 7 {
            let start: i64 = fields[0]
                .parse()
                .with_context(|| format!("bad region row in {}", path.display()))?;
            let end: i64 = fields[1]
                .parse()
                .with_context(|| format!("bad region row in {}", path.display()))?;
            let errors: u64 = fields[4]
                .parse()
                .with_context(|| format!("bad region row in {}", path.display()))?;
            aln_length += start.abs_diff(end);
            sim_errors += errors;
        }
    }
    Ok((aln_length, sim_errors))
}

/// One pairwise ANI measurement parsed from a delta file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AniComparison {
    pub query: String,
    pub reference: String,
    pub alignment_length: u64,
    pub similarity_errors: u64,
    pub ref_coverage: f64,
    pub query_coverage: f64,
    pub ani: f64,
}

/// Parse every `.delta` file in `delta_dir` into ANI rows.
///
/// `genome_lengths` maps genome names to total sequence length and feeds the
/// coverage columns. A pair with no aligned bases gets an ANI of zero rather
/// than failing the whole run; nucmer does this for very distant genomes.
pub fn process_delta_dir(
    delta_dir: &Path,
    genome_lengths: &HashMap<String, u64>,
) -> Result<Vec<AniComparison>> {
    let pattern = delta_dir.join("*.delta");
    let mut rows = Vec::new();

    for entry in glob(&pattern.to_string_lossy())? {
        let path = entry?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("unreadable delta file name: {}", path.display()))?;
        let (qname, sname) = stem.split_once("_vs_").ok_or_else(|| {
            anyhow!(
                "delta file {} does not follow the <query>_vs_<reference> naming",
                path.display()
            )
        })?;

        let (aln_length, sim_errors) = parse_delta(&path)?;
        let query_length = *genome_lengths
            .get(qname)
            .ok_or_else(|| anyhow!("no length recorded for genome {qname}"))?;
        let ref_length = *genome_lengths
            .get(sname)
            .ok_or_else(|| anyhow!("no length recorded for genome {sname}"))?;

        let ani = if aln_length == 0 {
            log::warn!("no aligned bases in {}", path.display());
            0.0
        } else {
            1.0 - sim_errors as f64 / aln_length as f64
        };

        rows.push(AniComparison {
            query: qname.to_string(),
            reference: sname.to_string(),
            alignment_length: aln_length,
            similarity_errors: sim_errors,
            ref_coverage: aln_length as f64 / ref_length as f64,
            query_coverage: aln_length as f64 / query_length as f64,
            ani,
        });
    }
    Ok(rows)
}


// --------------------------------------------------
// Tests for job construction
#[cfg(test)]
mod job_tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use crate::genomes::GenomeRecord;
    use crate::nucmer::{pairwise_jobs, AlignMethod, NucmerParams};

    fn genome(name: &str) -> GenomeRecord {
        GenomeRecord {
            genome: name.to_string(),
            location: format!("/data/{name}.fna"),
        }
    }

    #[test]
    fn test_pairwise_jobs_cover_the_full_matrix() {
        let genomes = vec![genome("a"), genome("b"), genome("c")];
        let jobs = pairwise_jobs(&genomes, Path::new("out"));
        assert_eq!(9, jobs.len());
        assert_eq!(Path::new("out/a_vs_b"), jobs[1].prefix.as_path());
        assert_eq!("/data/a.fna", jobs[1].reference);
        assert_eq!("/data/b.fna", jobs[1].query);
    }

    #[test]
    fn test_command_args_reflect_params() {
        let jobs = pairwise_jobs(&[genome("a")], Path::new("out"));
        let params = NucmerParams {
            no_extend: true,
            method: AlignMethod::MaxMatch,
            ..NucmerParams::default()
        };
        let args = jobs[0].command_args(&params);
        assert_eq!(
            vec![
                "--maxmatch".to_string(),
                "-p".to_string(),
                "out/a_vs_a".to_string(),
                "-c".to_string(),
                "65".to_string(),
                "-g".to_string(),
                "90".to_string(),
                "--noextend".to_string(),
                "/data/a.fna".to_string(),
                "/data/a.fna".to_string(),
            ],
            args
        );
    }
}

// --------------------------------------------------
// Tests for delta parsing
#[cfg(test)]
mod delta_tests {
    use std::collections::HashMap;
    use std::fs;

    use anyhow::Result;
    use pretty_assertions::assert_eq;

    use crate::nucmer::{parse_delta, process_delta_dir};

    const DELTA: &str = "\
/data/a.fasta /data/b.fasta
NUCMER
>contig_1 contig_1 1200 1200
1 500 1 500 12 12 0
-5
0
700 900 700 900 3 3 0
0
";

    #[test]
    fn test_parse_delta_sums_regions() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a_vs_b.delta");
        fs::write(&path, DELTA)?;
        assert_eq!((699, 15), parse_delta(&path)?);
        Ok(())
    }

    #[test]
    fn test_process_delta_dir_computes_ani_and_coverage() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a_vs_b.delta"), DELTA)?;
        let lengths = HashMap::from([("a".to_string(), 1000), ("b".to_string(), 2000)]);

        let rows = process_delta_dir(dir.path(), &lengths)?;
        assert_eq!(1, rows.len());
        let row = &rows[0];
        assert_eq!("a", row.query);
        assert_eq!("b", row.reference);
        assert_eq!(699, row.alignment_length);
        assert_eq!(15, row.similarity_errors);
        assert_eq!(1.0 - 15.0 / 699.0, row.ani);
        assert_eq!(699.0 / 1000.0, row.query_coverage);
        assert_eq!(699.0 / 2000.0, row.ref_coverage);
        Ok(())
    }

    #[test]
    fn test_empty_alignment_yields_zero_ani() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a_vs_b.delta"), "/a /b\nNUCMER\n")?;
        let lengths = HashMap::from([("a".to_string(), 1000), ("b".to_string(), 2000)]);

        let rows = process_delta_dir(dir.path(), &lengths)?;
        assert_eq!(0.0, rows[0].ani);
        assert_eq!(0.0, rows[0].ref_coverage);
        Ok(())
    }

    #[test]
    fn test_misnamed_delta_file_errors() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("weird.delta"), DELTA)?;
        let lengths = HashMap::new();
        assert!(process_delta_dir(dir.path(), &lengths).is_err());
        Ok(())
    }

    #[test]
    fn test_unknown_genome_length_errors() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("a_vs_b.delta"), DELTA)?;
        let lengths = HashMap::from([("a".to_string(), 1000)]);
        assert!(process_delta_dir(dir.path(), &lengths).is_err());
        Ok(())
    }
}
