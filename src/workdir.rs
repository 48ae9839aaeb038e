//! On-disk layout for a clustering run.
//!
//! A work directory keeps comparison scratch under `data/` and result tables
//! under `data_tables/`, so a later invocation can pick up the genome table
//! an earlier one saved.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct WorkDirectory {
    root: PathBuf,
}

impl WorkDirectory {
    /// Open `root`, creating the expected subdirectories when missing.
    pub fn open_or_create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for sub in ["data", "data_tables"] {
            let dir = root.join(sub);
            fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch space for comparison output (sketches, delta files).
    pub fn data_folder(&self) -> PathBuf {
        self.root.join("data")
    }

    fn table_path(&self, name: &str) -> PathBuf {
        self.root.join("data_tables").join(format!("{name}.csv"))
    }

    /// Whether a table of this name was saved by a previous run.
    pub fn has_table(&self, name: &str) -> bool {
        self.table_path(name).is_file()
    }

    pub fn save_table<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<()> {
        let path = self.table_path(name);
        let mut wtr = WriterBuilder::new()
            .from_path(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn load_table<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let path = self.table_path(name);
        let mut rdr = ReaderBuilder::new()
            .from_path(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let mut rows = Vec::new();
        for result in rdr.deserialize() {
            rows.push(result?);
        }
        Ok(rows)
    }
}

impl fmt::Display for WorkDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "work directory at {}", self.root.display())
    }
}
