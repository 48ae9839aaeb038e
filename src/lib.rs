//! Genome dereplication by two-stage clustering: coarse clusters from
//! all-vs-all [mash](https://github.com/marbl/Mash) distances, refined with
//! pairwise nucmer alignments. The connected components of the resulting
//! similarity graphs are the reported clusters.

use std::collections::HashMap;
use std::collections::HashSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

pub mod cli;
pub mod genomes;
pub mod mash;
pub mod nucmer;
pub mod pipeline;
pub mod utils;
pub mod workdir;

use genomes::GenomeRecord;
use mash::MashComparison;
use nucmer::AniComparison;

// --------------------------------------------------
// Cluster table

/// One row of the cluster table: which primary (mash) cluster a genome sits
/// in, and its secondary (ANI) cluster label once the alignment stage has run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub genome: String,
    pub mash_cluster: usize,
    pub anin_cluster: Option<String>,
}

// --------------------------------------------------
// Union-find

/// Disjoint-set forest backing [`SimilarityGraph::connected_components`].
///
/// Union by rank, path halving during `find`.
pub struct UnionFind {
    parents: Vec<usize>,
    ranks: Vec<u8>,
}

impl UnionFind {
    pub fn new(node_count: usize) -> Self {
        Self {
            parents: (0..node_count).collect(),
            ranks: vec![0; node_count],
        }
    }

    /// Representative of `node`'s set.
    pub fn find(&mut self, node: usize) -> usize {
        let mut current = node;
        while self.parents[current] != current {
            self.parents[current] = self.parents[self.parents[current]];
            current = self.parents[current];
        }
        current
    }

    /// Merge the sets holding `left` and `right`. Returns false when they
    /// were already the same set.
    pub fn union(&mut self, left: usize, right: usize) -> bool {
        let left_root = self.find(left);
        let right_root = self.find(right);
        if left_root == right_root {
            return false;
        }
        let (parent, child) = if self.ranks[left_root] >= self.ranks[right_root] {
            (left_root, right_root)
        } else {
            (right_root, left_root)
        };
        self.parents[child] = parent;
        if self.ranks[left_root] == self.ranks[right_root] {
            self.ranks[parent] += 1;
        }
        true
    }
}

// --------------------------------------------------
// Similarity graph

/// An undirected graph over genome names.
///
/// Nodes are added explicitly so genomes with no passing comparison still
/// come out as singleton clusters.
#[derive(Debug, Default)]
pub struct SimilarityGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<(usize, usize)>,
}

impl SimilarityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `name` if unseen, returning its node id.
    pub fn add_node(&mut self, name: &str) -> usize {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), id);
        id
    }

    /// Link two genomes. Self edges are dropped (a genome compared against
    /// itself says nothing about replication).
    pub fn add_edge(&mut self, a: &str, b: &str) {
        let a = self.add_node(a);
        let b = self.add_node(b);
        if a != b {
            self.edges.push((a, b));
        }
    }

    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Connected components, numbered in order of each component's
    /// first-added member; members keep insertion order. This keeps cluster
    /// ids stable for a given comparison table.
    pub fn connected_components(&self) -> Vec<Vec<String>> {
        let mut forest = UnionFind::new(self.names.len());
        for &(a, b) in &self.edges {
            forest.union(a, b);
        }

        let mut components: Vec<Vec<String>> = Vec::new();
        let mut component_of_root: HashMap<usize, usize> = HashMap::new();
        for id in 0..self.names.len() {
            let root = forest.find(id);
            let slot = *component_of_root.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[slot].push(self.names[id].clone());
        }
        components
    }
}

// --------------------------------------------------
// Clustering operations

/// Group genomes into primary clusters from an all-vs-all mash table.
///
/// Two genomes land in the same cluster when a chain of comparisons with
/// similarity strictly above `threshold` connects them.
pub fn cluster_mash_table(mdb: &[MashComparison], threshold: f64) -> Vec<ClusterRecord> {
    let mut graph = SimilarityGraph::new();
    for row in mdb {
        graph.add_node(&row.genome1);
        graph.add_node(&row.genome2);
        if row.similarity > threshold {
            graph.add_edge(&row.genome1, &row.genome2);
        }
    }

    let mut records = Vec::new();
    for (cluster, component) in graph.connected_components().iter().enumerate() {
        for genome in component {
            records.push(ClusterRecord {
                genome: genome.clone(),
                mash_cluster: cluster,
                anin_cluster: None,
            });
        }
    }
    records
}

/// Split each primary cluster into secondary clusters using nucmer ANI and
/// alignment coverage. A pair is linked when both `ani > ani_thresh` and
/// `ref_coverage > cov_thresh`. Labels read `"<primary>_<secondary>"`.
pub fn cluster_anin_table(
    cdb: &[ClusterRecord],
    ndb: &[AniComparison],
    ani_thresh: f64,
    cov_thresh: f64,
) -> Vec<ClusterRecord> {
    let mut records = Vec::new();
    let clusters: Vec<usize> = cdb.iter().map(|r| r.mash_cluster).unique().collect();

    for cluster in clusters {
        let members: HashSet<&str> = cdb
            .iter()
            .filter(|r| r.mash_cluster == cluster)
            .map(|r| r.genome.as_str())
            .collect();

        let mut graph = SimilarityGraph::new();
        for record in cdb.iter().filter(|r| r.mash_cluster == cluster) {
            graph.add_node(&record.genome);
        }
        for row in ndb {
            if members.contains(row.reference.as_str())
                && members.contains(row.query.as_str())
                && row.ani > ani_thresh
                && row.ref_coverage > cov_thresh
            {
                graph.add_edge(&row.reference, &row.query);
            }
        }

        for (sub, component) in graph.connected_components().iter().enumerate() {
            for genome in component {
                records.push(ClusterRecord {
                    genome: genome.clone(),
                    mash_cluster: cluster,
                    anin_cluster: Some(format!("{cluster}_{sub}")),
                });
            }
        }
    }
    records
}

/// Fallback cluster table when mash is skipped: every genome in one primary
/// cluster, so the alignment stage compares all pairs.
pub fn no_mash_clusters(bdb: &[GenomeRecord]) -> Vec<ClusterRecord> {
    bdb.iter()
        .map(|record| ClusterRecord {
            genome: record.genome.clone(),
            mash_cluster: 0,
            anin_cluster: None,
        })
        .collect()
}



// --------------------------------------------------
// Tests for the clustering operations
#[cfg(test)]
mod cluster_tests {
    use crate::genomes::GenomeRecord;
    use crate::mash::MashComparison;
    use crate::nucmer::AniComparison;
    use crate::{cluster_anin_table, cluster_mash_table, no_mash_clusters, ClusterRecord};
    use pretty_assertions::assert_eq;

    fn mash_row(genome1: &str, genome2: &str, similarity: f64) -> MashComparison {
        MashComparison {
            genome1: genome1.to_string(),
            genome2: genome2.to_string(),
            dist: 1.0 - similarity,
            p_value: 0.0,
            shared_hashes: "900/1000".to_string(),
            similarity,
        }
    }

    fn ani_row(query: &str, reference: &str, ani: f64, coverage: f64) -> AniComparison {
        AniComparison {
            query: query.to_string(),
            reference: reference.to_string(),
            alignment_length: 1000,
            similarity_errors: 5,
            ref_coverage: coverage,
            query_coverage: coverage,
            ani,
        }
    }

    #[test]
    fn test_mash_clustering_respects_threshold() {
        let mdb = vec![
            mash_row("a", "a", 1.0),
            mash_row("a", "b", 0.95),
            mash_row("b", "a", 0.95),
            mash_row("a", "c", 0.70),
            mash_row("c", "c", 1.0),
        ];
        let cdb = cluster_mash_table(&mdb, 0.90);
        assert_eq!(
            vec![
                ClusterRecord {
                    genome: "a".to_string(),
                    mash_cluster: 0,
                    anin_cluster: None,
                },
                ClusterRecord {
                    genome: "b".to_string(),
                    mash_cluster: 0,
                    anin_cluster: None,
                },
                ClusterRecord {
                    genome: "c".to_string(),
                    mash_cluster: 1,
                    anin_cluster: None,
                },
            ],
            cdb
        );
    }

    #[test]
    fn test_mash_clustering_threshold_is_strict() {
        let mdb = vec![mash_row("a", "b", 0.90), mash_row("b", "a", 0.90)];
        let cdb = cluster_mash_table(&mdb, 0.90);
        // Exactly at the threshold does not link.
        assert_eq!(2, cdb.len());
        assert_ne!(cdb[0].mash_cluster, cdb[1].mash_cluster);
    }

    #[test]
    fn test_anin_clustering_splits_a_primary_cluster() {
        let cdb = vec![
            ClusterRecord {
                genome: "a".to_string(),
                mash_cluster: 0,
                anin_cluster: None,
            },
            ClusterRecord {
                genome: "b".to_string(),
                mash_cluster: 0,
                anin_cluster: None,
            },
            ClusterRecord {
                genome: "c".to_string(),
                mash_cluster: 0,
                anin_cluster: None,
            },
        ];
        let ndb = vec![
            ani_row("a", "b", 0.995, 0.9),
            ani_row("b", "a", 0.995, 0.9),
            // c aligns well but is not identical enough
            ani_row("c", "a", 0.95, 0.9),
            ani_row("a", "c", 0.95, 0.9),
        ];
        let refined = cluster_anin_table(&cdb, &ndb, 0.99, 0.5);
        let labels: Vec<(String, String)> = refined
            .iter()
            .map(|r| (r.genome.clone(), r.anin_cluster.clone().unwrap()))
            .collect();
        assert_eq!(
            vec![
                ("a".to_string(), "0_0".to_string()),
                ("b".to_string(), "0_0".to_string()),
                ("c".to_string(), "0_1".to_string()),
            ],
            labels
        );
    }

    #[test]
    fn test_anin_clustering_requires_coverage_too() {
        let cdb = vec![
            ClusterRecord {
                genome: "a".to_string(),
                mash_cluster: 0,
                anin_cluster: None,
            },
            ClusterRecord {
                genome: "b".to_string(),
                mash_cluster: 0,
                anin_cluster: None,
            },
        ];
        // High identity over a sliver of the genome: not a replicate.
        let ndb = vec![ani_row("a", "b", 0.999, 0.1), ani_row("b", "a", 0.999, 0.1)];
        let refined = cluster_anin_table(&cdb, &ndb, 0.99, 0.5);
        assert_ne!(refined[0].anin_cluster, refined[1].anin_cluster);
    }

    #[test]
    fn test_anin_edges_never_cross_primary_clusters() {
        let cdb = vec![
            ClusterRecord {
                genome: "a".to_string(),
                mash_cluster: 0,
                anin_cluster: None,
            },
            ClusterRecord {
                genome: "b".to_string(),
                mash_cluster: 1,
                anin_cluster: None,
            },
        ];
        let ndb = vec![ani_row("a", "b", 0.999, 0.9), ani_row("b", "a", 0.999, 0.9)];
        let refined = cluster_anin_table(&cdb, &ndb, 0.99, 0.5);
        let labels: Vec<String> = refined
            .iter()
            .map(|r| r.anin_cluster.clone().unwrap())
            .collect();
        assert_eq!(vec!["0_0".to_string(), "1_0".to_string()], labels);
    }

    #[test]
    fn test_no_mash_clusters_puts_everything_together() {
        let bdb = vec![
            GenomeRecord {
                genome: "a".to_string(),
                location: "a.fna".to_string(),
            },
            GenomeRecord {
                genome: "b".to_string(),
                location: "b.fna".to_string(),
            },
        ];
        let cdb = no_mash_clusters(&bdb);
        assert!(cdb.iter().all(|r| r.mash_cluster == 0));
        assert_eq!(2, cdb.len());
    }
}
