//! The clustering pipeline: mash pre-clusters, nucmer refines.
//!
//! [`cluster_genomes`] does the actual work on an in-memory genome table.
//! [`run_cluster`] is the command-line wrapper around it: it resolves the
//! genome table against the work directory, runs the pipeline and saves the
//! resulting tables.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use itertools::Itertools;

use crate::cli::ClusterArgs;
use crate::genomes::{self, GenomeRecord};
use crate::mash::{self, MashComparison, MashParams};
use crate::nucmer::{self, AniComparison, NucmerParams};
use crate::utils;
use crate::workdir::WorkDirectory;
use crate::{cluster_anin_table, cluster_mash_table, no_mash_clusters, ClusterRecord};

// --------------------------------------------------

/// Knobs for one clustering run.
#[derive(Debug, Clone)]
pub struct ClusterParams {
    pub mash_ani: f64,
    pub ani: f64,
    pub cov_thresh: f64,
    pub skip_mash: bool,
    pub skip_anin: bool,
    pub dry: bool,
    pub threads: usize,
    pub mash: MashParams,
    pub nucmer: NucmerParams,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            mash_ani: 0.90,
            ani: 0.99,
            cov_thresh: 0.5,
            skip_mash: false,
            skip_anin: false,
            dry: false,
            threads: 10,
            mash: MashParams::default(),
            nucmer: NucmerParams::default(),
        }
    }
}

/// Tables produced by a clustering run.
#[derive(Debug, Default)]
pub struct ClusterOutput {
    pub cdb: Vec<ClusterRecord>,
    pub mdb: Vec<MashComparison>,
    pub ndb: Vec<AniComparison>,
}

// --------------------------------------------------

/// Run both clustering stages over the genome table.
///
/// A dry run stops after printing the commands of the first stage that
/// would execute anything, returning whatever tables exist at that point.
pub fn cluster_genomes(
    bdb: &[GenomeRecord],
    data_folder: &Path,
    params: &ClusterParams,
) -> Result<ClusterOutput> {
    let mut output = ClusterOutput::default();

    if params.skip_mash {
        log::info!("skipping mash; every genome goes into one primary cluster");
        output.cdb = no_mash_clusters(bdb);
    } else {
        log::info!("running all-vs-all mash comparisons for {} genomes", bdb.len());
        output.mdb = mash::all_vs_all_mash(bdb, data_folder, &params.mash, params.dry)?;
        log::info!("forming primary clusters at similarity > {}", params.mash_ani);
        output.cdb = cluster_mash_table(&output.mdb, params.mash_ani);
    }

    if !params.skip_anin {
        let primaries = output.cdb.iter().map(|r| r.mash_cluster).unique().count();
        log::info!("refining {primaries} primary clusters with nucmer");
        output.ndb = anin_on_clusters(bdb, &output.cdb, data_folder, params)?;
        if params.dry {
            return Ok(output);
        }
        log::info!(
            "forming secondary clusters at ANI > {} and coverage > {}",
            params.ani,
            params.cov_thresh
        );
        output.cdb = cluster_anin_table(&output.cdb, &output.ndb, params.ani, params.cov_thresh);
    }

    Ok(output)
}

/// Run pairwise nucmer within every primary cluster and parse the results.
fn anin_on_clusters(
    bdb: &[GenomeRecord],
    cdb: &[ClusterRecord],
    data_folder: &Path,
    params: &ClusterParams,
) -> Result<Vec<AniComparison>> {
    let anin_folder = data_folder.join("anin");
    let clusters: Vec<usize> = cdb.iter().map(|r| r.mash_cluster).unique().collect();

    let mut jobs = Vec::new();
    for &cluster in &clusters {
        let members: Vec<GenomeRecord> = bdb
            .iter()
            .filter(|g| {
                cdb.iter()
                    .any(|r| r.mash_cluster == cluster && r.genome == g.genome)
            })
            .cloned()
            .collect();
        let outdir = anin_folder.join(cluster.to_string());
        if !params.dry {
            fs::create_dir_all(&outdir)
                .with_context(|| format!("creating {}", outdir.display()))?;
        }
        jobs.extend(nucmer::pairwise_jobs(&members, &outdir));
    }

    nucmer::run_jobs(&jobs, &params.nucmer, params.threads, params.dry)?;
    if params.dry {
        return Ok(Vec::new());
    }

    let mut lengths: HashMap<String, u64> = HashMap::new();
    for genome in bdb {
        let length = utils::fasta_length(&genome.location)
            .with_context(|| format!("measuring genome {}", genome.genome))?;
        lengths.insert(genome.genome.clone(), length);
    }

    let mut ndb = Vec::new();
    for &cluster in &clusters {
        let outdir = anin_folder.join(cluster.to_string());
        ndb.extend(nucmer::process_delta_dir(&outdir, &lengths)?);
    }
    Ok(ndb)
}

// --------------------------------------------------

/// Command-line entry for the cluster operation.
pub fn run_cluster(args: &ClusterArgs) -> Result<()> {
    log::info!("loading work directory");
    let workdir = WorkDirectory::open_or_create(&args.work_directory)?;
    log::info!("{workdir}");

    let bdb = resolve_genome_table(args, &workdir)?;

    let params = ClusterParams {
        mash_ani: args.mash_ani,
        ani: args.ani,
        cov_thresh: args.cov_thresh,
        skip_mash: args.skip_mash,
        skip_anin: args.skip_anin,
        dry: args.dry,
        threads: args.threads,
        mash: MashParams {
            exe: args.mash_exe.clone(),
            kmer_size: args.mash_kmer,
            sketch_size: args.sketch_size,
        },
        nucmer: NucmerParams {
            exe: args.nucmer_exe.clone(),
            min_cluster: args.min_cluster,
            max_gap: args.max_gap,
            no_extend: args.no_extend,
            method: args.method,
        },
    };

    let output = cluster_genomes(&bdb, &workdir.data_folder(), &params)?;

    if args.dry {
        log::info!("dry run; no result tables written");
        return Ok(());
    }

    workdir.save_table("Cdb", &output.cdb)?;
    if !output.mdb.is_empty() {
        workdir.save_table("Mdb", &output.mdb)?;
    }
    if !output.ndb.is_empty() {
        workdir.save_table("Ndb", &output.ndb)?;
    }

    let cluster_count = output
        .cdb
        .iter()
        .map(|r| {
            r.anin_cluster
                .clone()
                .unwrap_or_else(|| r.mash_cluster.to_string())
        })
        .unique()
        .count();
    log::info!("{} genomes in {} clusters", output.cdb.len(), cluster_count);
    Ok(())
}

/// Either load genomes named on the command line (first run) or reuse the
/// table a previous run left in the work directory.
fn resolve_genome_table(args: &ClusterArgs, workdir: &WorkDirectory) -> Result<Vec<GenomeRecord>> {
    match &args.genomes {
        Some(paths) => {
            if workdir.has_table("Bdb") {
                bail!("work directory already has a genome table; rerun without --genomes to reuse it");
            }
            let bdb = genomes::load_genomes(paths)?;
            if !args.dry {
                workdir.save_table("Bdb", &bdb)?;
            }
            Ok(bdb)
        }
        None => {
            if !workdir.has_table("Bdb") {
                bail!("no genome table in the work directory; provide one with --genomes");
            }
            workdir.load_table("Bdb")
        }
    }
}
