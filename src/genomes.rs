//! The genome table: which genomes are being dereplicated and where their
//! fasta files live.

use std::path::Path;

use anyhow::{bail, Result};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::utils::genome_name_from_path;

/// One genome to dereplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenomeRecord {
    pub genome: String,
    pub location: String,
}

/// Build the genome table from fasta paths supplied on the command line.
///
/// Names come from the file stem; duplicates are rejected because sketch and
/// delta file names are keyed by genome name.
pub fn load_genomes(paths: &[String]) -> Result<Vec<GenomeRecord>> {
    let mut records = Vec::new();
    for path in paths {
        if !Path::new(path).is_file() {
            bail!("genome file not found: {path}");
        }
        records.push(GenomeRecord {
            genome: genome_name_from_path(path),
            location: path.clone(),
        });
    }
    if let Some(duplicate) = records.iter().map(|r| &r.genome).duplicates().next() {
        bail!("duplicate genome name: {duplicate}");
    }
    Ok(records)
}
