//! Command-line interface code: the argument grammar, the controller that
//! executes a parsed command, and the dispatch sequence joining them.

use std::ffi::OsString;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::nucmer::AlignMethod;
use crate::pipeline;

// --------------------------------------------------
// Arguments.

/// Top-level arguments: one subcommand per operation.
#[derive(Debug, Parser)]
#[command(about, author, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cluster genomes by pairwise similarity to find replicate sets
    Cluster(ClusterArgs),
}

/// Arguments for the cluster operation.
#[derive(Debug, clap::Args)]
pub struct ClusterArgs {
    #[arg(value_name = "WORK_DIR", help = "Directory where data and results live")]
    pub work_directory: String,

    #[arg(
        short = 'g',
        long,
        num_args = 1..,
        value_name = "FASTA",
        help = "Genomes to cluster; omit to reuse the table saved in WORK_DIR"
    )]
    pub genomes: Option<Vec<String>>,

    #[arg(
        long = "mash-ani",
        default_value_t = 0.90,
        value_name = "ANI",
        help = "Similarity threshold for primary (mash) clusters"
    )]
    pub mash_ani: f64,

    #[arg(
        long = "ani",
        default_value_t = 0.99,
        value_name = "ANI",
        help = "ANI threshold for secondary (alignment) clusters"
    )]
    pub ani: f64,

    #[arg(
        long = "cov-thresh",
        default_value_t = 0.5,
        value_name = "COV",
        help = "Alignment coverage threshold for secondary clusters"
    )]
    pub cov_thresh: f64,

    #[arg(long = "skip-mash", help = "Align every pair instead of pre-clustering with mash")]
    pub skip_mash: bool,

    #[arg(long = "skip-anin", help = "Stop after mash clustering")]
    pub skip_anin: bool,

    #[arg(long, help = "Print the external commands instead of running them")]
    pub dry: bool,

    #[arg(
        short = 't',
        long,
        default_value_t = 10,
        value_name = "INT",
        help = "Worker pool size for nucmer jobs"
    )]
    pub threads: usize,

    #[arg(long = "mash-exe", default_value = "mash", value_name = "PATH")]
    pub mash_exe: String,

    #[arg(long = "mash-kmer", value_name = "INT", help = "K-mer size for mash sketches")]
    pub mash_kmer: Option<u32>,

    #[arg(long = "sketch-size", value_name = "INT", help = "Sketch size for mash sketches")]
    pub sketch_size: Option<u32>,

    #[arg(long = "nucmer-exe", default_value = "nucmer", value_name = "PATH")]
    pub nucmer_exe: String,

    #[arg(
        short = 'c',
        long = "min-cluster",
        default_value_t = 65,
        value_name = "INT",
        help = "Minimum nucmer cluster length"
    )]
    pub min_cluster: u32,

    #[arg(
        long = "maxgap",
        default_value_t = 90,
        value_name = "INT",
        help = "Maximum gap between adjacent nucmer matches"
    )]
    pub max_gap: u32,

    #[arg(long = "noextend", help = "Disable nucmer cluster extension")]
    pub no_extend: bool,

    #[arg(
        long,
        default_value = "mum",
        value_name = "METHOD",
        help = "Nucmer seed-matching method (mum, mumreference, maxmatch)"
    )]
    pub method: AlignMethod,
}

// --------------------------------------------------
// Controller.

/// Something that can execute a parsed command. The entry point only ever
/// talks to this trait, so dispatch can be tested without a real pipeline.
pub trait CommandHandler {
    fn handle(&self, args: Args) -> Result<()>;
}

/// The real controller: routes each command to its pipeline.
#[derive(Debug, Default)]
pub struct Controller;

impl CommandHandler for Controller {
    fn handle(&self, args: Args) -> Result<()> {
        match args.command {
            Command::Cluster(cluster_args) => pipeline::run_cluster(&cluster_args),
        }
    }
}

// --------------------------------------------------
// Dispatch.

/// Parse tokens, then construct the controller and hand it the parsed
/// arguments. Parsing failures (including `--help`) surface before any
/// controller exists.
pub fn run<I, T>(tokens: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    run_with(tokens, Controller::default)
}

/// Dispatch against a caller-supplied controller factory. `run` uses the
/// real [`Controller`]; tests substitute mocks.
pub fn run_with<I, T, H, F>(tokens: I, make_handler: F) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    H: CommandHandler,
    F: FnOnce() -> H,
{
    let args = Args::try_parse_from(tokens)?;
    let handler = make_handler();
    handler.handle(args)
}
