//! The primary comparison stage: all-vs-all genome sketching and distance
//! estimation with the external `mash` tool.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::genomes::GenomeRecord;
use crate::utils::{self, genome_name_from_path};

// --------------------------------------------------

/// How to invoke mash.
#[derive(Debug, Clone)]
pub struct MashParams {
    pub exe: String,
    /// `-k` for `mash sketch`; mash's default when unset.
    pub kmer_size: Option<u32>,
    /// `-s` for `mash sketch`; mash's default when unset.
    pub sketch_size: Option<u32>,
}

impl Default for MashParams {
    fn default() -> Self {
        Self {
            exe: "mash".to_string(),
            kmer_size: None,
            sketch_size: None,
        }
    }
}

/// Raw row of `mash dist` output, in column order.
#[derive(Debug, Deserialize)]
struct MashDistRecord {
    reference: String,
    query: String,
    dist: f64,
    p_value: f64,
    shared_hashes: String,
}

/// One pairwise mash comparison with genome names resolved and similarity
/// derived from the distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MashComparison {
    pub genome1: String,
    pub genome2: String,
    pub dist: f64,
    pub p_value: f64,
    pub shared_hashes: String,
    pub similarity: f64,
}

// --------------------------------------------------

/// Sketch every genome, paste the sketches together and compute all-vs-all
/// distances. Returns the parsed comparison table.
///
/// With `dry` set the commands are printed instead of run and the table
/// comes back empty.
pub fn all_vs_all_mash(
    bdb: &[GenomeRecord],
    data_folder: &Path,
    params: &MashParams,
    dry: bool,
) -> Result<Vec<MashComparison>> {
    let mash_folder = data_folder.join("mash");
    let sketch_folder = mash_folder.join("sketches");
    if !dry {
        // Stale sketches from an interrupted run would poison the paste.
        if sketch_folder.exists() {
            fs::remove_dir_all(&sketch_folder)
                .with_context(|| format!("clearing {}", sketch_folder.display()))?;
        }
        fs::create_dir_all(&sketch_folder)
            .with_context(|| format!("creating {}", sketch_folder.display()))?;
    }

    let mut sketches = Vec::new();
    for record in bdb.iter().unique_by(|r| r.location.as_str()) {
        let sketch = sketch_folder.join(&record.genome);
        let mut args = vec!["sketch".to_string(), record.location.clone()];
        if let Some(k) = params.kmer_size {
            args.push("-k".to_string());
            args.push(k.to_string());
        }
        if let Some(s) = params.sketch_size {
            args.push("-s".to_string());
            args.push(s.to_string());
        }
        args.push("-o".to_string());
        args.push(sketch.to_string_lossy().into_owned());
        utils::run_cmd(&params.exe, &args, dry)?;
        sketches.push(format!("{}.msh", sketch.display()));
    }

    let combined = mash_folder.join("ALL.msh");
    let mut paste_args = vec!["paste".to_string(), combined.to_string_lossy().into_owned()];
    paste_args.extend(sketches);
    utils::run_cmd(&params.exe, &paste_args, dry)?;

    let dist_args = vec![
        "dist".to_string(),
        combined.to_string_lossy().into_owned(),
        combined.to_string_lossy().into_owned(),
    ];
    if dry {
        utils::run_cmd(&params.exe, &dist_args, true)?;
        return Ok(Vec::new());
    }

    let table = mash_folder.join("mash_table.tsv");
    let output = utils::capture_cmd(&params.exe, &dist_args)?;
    fs::write(&table, &output).with_context(|| format!("writing {}", table.display()))?;

    read_mash_table(&table)
}

/// Parse a `mash dist` table into [`MashComparison`] rows.
pub fn read_mash_table(path: &Path) -> Result<Vec<MashComparison>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("reading {}", path.display()))?;

    let mut comparisons = Vec::new();
    for result in rdr.deserialize() {
        let record: MashDistRecord = result?;
        comparisons.push(MashComparison {
            genome1: genome_name_from_path(&record.reference),
            genome2: genome_name_from_path(&record.query),
            similarity: 1.0 - record.dist,
            dist: record.dist,
            p_value: record.p_value,
            shared_hashes: record.shared_hashes,
        });
    }
    Ok(comparisons)
}
