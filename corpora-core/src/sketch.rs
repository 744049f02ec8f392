//! Sketch Index (C5, §4.5): an external collaborator the Profiler and
//! Augment Matcher consult for Jaccard-approximate column overlap, grounded
//! on the `GeoResolver`-as-trait-boundary idiom already used in
//! [`crate::classify`] and on the original Lazo sketch plumbing in
//! `lib_profiler/datamart_profiler/__init__.py`.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::model::LazoSketch;

const N_PERMUTATIONS: u32 = 128;

#[derive(Debug, Clone)]
pub struct SketchError(pub String);

impl std::fmt::Display for SketchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sketch index error: {}", self.0)
    }
}

impl std::error::Error for SketchError {}

/// External collaborator contract per §4.5 and §9 design notes: the core
/// never depends on a concrete Lazo deployment, only this trait.
pub trait SketchIndex: Send + Sync {
    /// Index a text column's full (non-sampled) values under `(dataset_id, column)`.
    fn index(&self, dataset_id: &str, column: &str, values: &[String]) -> Result<(), SketchError>;

    /// Request sketches back for a set of columns, in *search mode* (the
    /// values never get persisted under a dataset id).
    fn sketch(&self, columns: &[(String, Vec<String>)]) -> Result<Vec<LazoSketch>, SketchError>;

    /// Estimate Jaccard overlap between an indexed column and a probe sketch,
    /// used by the Augment Matcher (§4.7) to score joinable text columns.
    fn overlap(&self, dataset_id: &str, column: &str, probe: &LazoSketch) -> Result<f64, SketchError>;

    /// Drop every column sketch indexed under `dataset_id`, mirroring the
    /// `lazo_client` deletion half of `delete_dataset_from_index` in
    /// `scripts/purge_source.py`.
    fn remove(&self, dataset_id: &str) -> Result<(), SketchError>;
}

/// Reference implementation: a `HashSet<String>` per `(dataset_id, column)`,
/// with a deterministic MinHash-style sample standing in for a real
/// permutation-hashing scheme.
#[derive(Default)]
pub struct InMemorySketchIndex {
    columns: RwLock<HashMap<(String, String), HashSet<String>>>,
}

impl InMemorySketchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn sketch_of(values: &[String]) -> LazoSketch {
        let distinct: HashSet<String> = values
            .iter()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect();
        Self::sketch_of_set(&distinct)
    }

    fn sketch_of_set(distinct: &HashSet<String>) -> LazoSketch {
        let mut hashes: Vec<u64> = distinct.iter().map(|v| fnv1a(v)).collect();
        hashes.sort_unstable();
        hashes.truncate(N_PERMUTATIONS as usize);
        LazoSketch {
            name: String::new(),
            n_permutations: N_PERMUTATIONS,
            hash_values: hashes,
            cardinality: distinct.len(),
        }
    }
}

/// Deterministic, dependency-free 64-bit hash (FNV-1a) standing in for a
/// real MinHash permutation family — only relative ordering matters here.
fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

impl SketchIndex for InMemorySketchIndex {
    fn index(&self, dataset_id: &str, column: &str, values: &[String]) -> Result<(), SketchError> {
        let distinct: HashSet<String> = values
            .iter()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect();
        let mut columns = self
            .columns
            .write()
            .map_err(|_| SketchError("lock poisoned".into()))?;
        columns.insert((dataset_id.to_string(), column.to_string()), distinct);
        Ok(())
    }

    fn sketch(&self, columns: &[(String, Vec<String>)]) -> Result<Vec<LazoSketch>, SketchError> {
        Ok(columns
            .iter()
            .map(|(name, values)| {
                let mut s = Self::sketch_of(values);
                s.name = name.clone();
                s
            })
            .collect())
    }

    fn overlap(&self, dataset_id: &str, column: &str, probe: &LazoSketch) -> Result<f64, SketchError> {
        let columns = self
            .columns
            .read()
            .map_err(|_| SketchError("lock poisoned".into()))?;
        let indexed = match columns.get(&(dataset_id.to_string(), column.to_string())) {
            Some(set) => set,
            None => return Ok(0.0),
        };
        let probe_set: HashSet<u64> = probe.hash_values.iter().copied().collect();
        if probe_set.is_empty() || indexed.is_empty() {
            return Ok(0.0);
        }
        let indexed_hashes: HashSet<u64> = indexed.iter().map(|v| fnv1a(v)).collect();
        let intersection = indexed_hashes.intersection(&probe_set).count();
        let union = indexed_hashes.union(&probe_set).count();
        if union == 0 {
            Ok(0.0)
        } else {
            Ok(intersection as f64 / union as f64)
        }
    }

    fn remove(&self, dataset_id: &str) -> Result<(), SketchError> {
        let mut columns = self
            .columns
            .write()
            .map_err(|_| SketchError("lock poisoned".into()))?;
        columns.retain(|(id, _), _| id != dataset_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_then_sketch_round_trips_cardinality() {
        let index = InMemorySketchIndex::new();
        let values = vec!["a".into(), "b".into(), "a".into(), "c".into()];
        index.index("ds.1", "col", &values).unwrap();
        let probe = InMemorySketchIndex::sketch_of(&values);
        assert_eq!(probe.cardinality, 3);
    }

    #[test]
    fn overlap_is_one_for_identical_columns() {
        let index = InMemorySketchIndex::new();
        let values = vec!["x".into(), "y".into(), "z".into()];
        index.index("ds.1", "col", &values).unwrap();
        let probe = InMemorySketchIndex::sketch_of(&values);
        let overlap = index.overlap("ds.1", "col", &probe).unwrap();
        assert_eq!(overlap, 1.0);
    }

    #[test]
    fn overlap_is_zero_for_unknown_column() {
        let index = InMemorySketchIndex::new();
        let probe = InMemorySketchIndex::sketch_of(&["a".into()]);
        let overlap = index.overlap("nope", "col", &probe).unwrap();
        assert_eq!(overlap, 0.0);
    }

    #[test]
    fn disjoint_values_have_zero_overlap() {
        let index = InMemorySketchIndex::new();
        index
            .index("ds.1", "col", &["a".into(), "b".into()])
            .unwrap();
        let probe = InMemorySketchIndex::sketch_of(&["c".into(), "d".into()]);
        let overlap = index.overlap("ds.1", "col", &probe).unwrap();
        assert_eq!(overlap, 0.0);
    }

    #[test]
    fn remove_drops_all_columns_for_a_dataset() {
        let index = InMemorySketchIndex::new();
        index.index("ds.1", "a", &["x".into()]).unwrap();
        index.index("ds.1", "b", &["y".into()]).unwrap();
        index.index("ds.2", "a", &["z".into()]).unwrap();
        index.remove("ds.1").unwrap();
        let probe = InMemorySketchIndex::sketch_of(&["x".into()]);
        assert_eq!(index.overlap("ds.1", "a", &probe).unwrap(), 0.0);
        let probe = InMemorySketchIndex::sketch_of(&["z".into()]);
        assert_eq!(index.overlap("ds.2", "a", &probe).unwrap(), 1.0);
    }
}
