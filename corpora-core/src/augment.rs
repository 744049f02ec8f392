//! Augment Matcher (C7, §4.7): joinable/unionable candidate discovery
//! between a probe `Profile` and everything in the Catalog, grounded on the
//! `SCORE_THRESHOLD`-gated candidate scoring in `query/query/web.py`
//! (original_source) and on the `Catalog::all`/`CompiledQuery` plumbing
//! already built for search.

use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::error::CoreResult;
use crate::model::{ColumnProfile, DatasetId, Profile, SemanticType};
use crate::query::CompiledQuery;
use crate::sketch::SketchIndex;

const SCORE_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone)]
pub struct JoinColumnPair {
    pub probe_column: String,
    pub catalog_column: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct AugmentCandidate {
    pub id: DatasetId,
    pub score: f64,
    pub metadata: BTreeMap<String, String>,
    pub join_columns: Vec<JoinColumnPair>,
    pub union_columns: Vec<(String, String)>,
}

/// Find augmentation candidates for `probe` across everything the Catalog
/// holds, applying `filter` (from §4.6) as a conjunctive pre-filter. A
/// dataset can appear twice in the result, once as a join candidate and
/// once as a union candidate, each gated independently on
/// `SCORE_THRESHOLD` — mirroring `join_results`/`union_results` being
/// built and appended as two separate lists in the original.
pub fn find_candidates(
    probe: &Profile,
    catalog: &dyn Catalog,
    sketch: &dyn SketchIndex,
    filter: Option<&CompiledQuery>,
) -> CoreResult<Vec<AugmentCandidate>> {
    let mut candidates = Vec::new();

    for candidate in catalog.all()? {
        if candidate.id == probe.id {
            continue;
        }
        if let Some(filter) = filter {
            if !filter.filter.matches(&candidate) {
                continue;
            }
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("name".to_string(), candidate.name.clone());

        let join_columns = joinable_columns(probe, &candidate, sketch);
        let join_score = mean_score(&join_columns.iter().map(|j| j.score).collect::<Vec<_>>());
        if join_score >= SCORE_THRESHOLD {
            candidates.push(AugmentCandidate {
                id: candidate.id.clone(),
                score: join_score,
                metadata: metadata.clone(),
                join_columns,
                union_columns: Vec::new(),
            });
        }

        let (union_columns, union_score) = unionable_columns(probe, &candidate);
        if union_score >= SCORE_THRESHOLD {
            candidates.push(AugmentCandidate {
                id: candidate.id.clone(),
                score: union_score,
                metadata,
                join_columns: Vec::new(),
                union_columns,
            });
        }
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
    Ok(candidates)
}

fn mean_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

fn joinable_columns(
    probe: &Profile,
    candidate: &Profile,
    sketch: &dyn SketchIndex,
) -> Vec<JoinColumnPair> {
    let mut pairs = Vec::new();

    for probe_col in &probe.columns {
        if !probe_col.coverage.is_empty() {
            for cand_col in &candidate.columns {
                if let Some(score) = coverage_overlap(probe_col, cand_col) {
                    if score >= SCORE_THRESHOLD {
                        pairs.push(JoinColumnPair {
                            probe_column: probe_col.name.clone(),
                            catalog_column: cand_col.name.clone(),
                            score,
                        });
                    }
                }
            }
            continue;
        }

        if probe_col.structural_type == Some(crate::model::StructuralType::Text) {
            if let Some(probe_sketch) = probe.lazo.iter().find(|s| s.name == probe_col.name) {
                for cand_col in &candidate.columns {
                    if cand_col.structural_type != Some(crate::model::StructuralType::Text) {
                        continue;
                    }
                    if let Ok(score) = sketch.overlap(&candidate.id, &cand_col.name, probe_sketch) {
                        if score >= SCORE_THRESHOLD {
                            pairs.push(JoinColumnPair {
                                probe_column: probe_col.name.clone(),
                                catalog_column: cand_col.name.clone(),
                                score,
                            });
                        }
                    }
                }
            }
        }
    }

    pairs
}

fn coverage_overlap(a: &ColumnProfile, b: &ColumnProfile) -> Option<f64> {
    if a.coverage.is_empty() || b.coverage.is_empty() {
        return None;
    }
    let overlapping = a
        .coverage
        .iter()
        .any(|ai| b.coverage.iter().any(|bi| ai.intersects(bi)));
    Some(if overlapping { 1.0 } else { 0.0 })
}

fn unionable_columns(probe: &Profile, candidate: &Profile) -> (Vec<(String, String)>, f64) {
    let mut matched = Vec::new();
    for probe_col in &probe.columns {
        if let Some(cand_col) = candidate
            .columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(&probe_col.name) && compatible(probe_col, c))
        {
            matched.push((probe_col.name.clone(), cand_col.name.clone()));
        }
    }
    let score = if probe.columns.is_empty() {
        0.0
    } else {
        matched.len() as f64 / probe.columns.len() as f64
    };
    (matched, score)
}

fn compatible(a: &ColumnProfile, b: &ColumnProfile) -> bool {
    if a.structural_type != b.structural_type {
        return false;
    }
    let overlap: Vec<&SemanticType> = a.semantic_types.intersection(&b.semantic_types).collect();
    a.semantic_types.is_empty() || b.semantic_types.is_empty() || !overlap.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;
    use crate::model::{Interval, StructuralType};
    use crate::sketch::InMemorySketchIndex;
    use chrono::Utc;
    use std::collections::BTreeMap as Map;

    fn profile_with_column(id: &str, col: ColumnProfile) -> Profile {
        Profile {
            id: id.to_string(),
            name: format!("dataset {id}"),
            description: None,
            nb_rows: 10,
            size_bytes: 10,
            columns: vec![col],
            spatial_coverage: vec![],
            materialize: Map::new(),
            indexed_at: Utc::now(),
            lazo: vec![],
        }
    }

    #[test]
    fn joinable_candidate_scores_above_threshold_on_overlap() {
        let catalog = InMemoryCatalog::new();
        let sketch = InMemorySketchIndex::new();

        let mut cand_col = ColumnProfile::new("population");
        cand_col.structural_type = Some(StructuralType::Integer);
        cand_col.coverage = vec![Interval { gte: 0.0, lte: 100.0 }];
        catalog.put(profile_with_column("a.1", cand_col)).unwrap();

        let mut probe_col = ColumnProfile::new("pop_count");
        probe_col.structural_type = Some(StructuralType::Integer);
        probe_col.coverage = vec![Interval { gte: 50.0, lte: 150.0 }];
        let probe = profile_with_column("probe", probe_col);

        let candidates = find_candidates(&probe, &catalog, &sketch, None).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].score >= SCORE_THRESHOLD);
        assert_eq!(candidates[0].join_columns.len(), 1);
    }

    #[test]
    fn non_overlapping_coverage_is_excluded() {
        let catalog = InMemoryCatalog::new();
        let sketch = InMemorySketchIndex::new();

        let mut cand_col = ColumnProfile::new("population");
        cand_col.structural_type = Some(StructuralType::Integer);
        cand_col.coverage = vec![Interval { gte: 0.0, lte: 10.0 }];
        catalog.put(profile_with_column("a.1", cand_col)).unwrap();

        let mut probe_col = ColumnProfile::new("pop_count");
        probe_col.structural_type = Some(StructuralType::Integer);
        probe_col.coverage = vec![Interval { gte: 1000.0, lte: 2000.0 }];
        let probe = profile_with_column("probe", probe_col);

        let candidates = find_candidates(&probe, &catalog, &sketch, None).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn unionable_candidate_matches_by_name_and_type() {
        let catalog = InMemoryCatalog::new();
        let sketch = InMemorySketchIndex::new();

        let mut cand_col = ColumnProfile::new("city");
        cand_col.structural_type = Some(StructuralType::Text);
        catalog.put(profile_with_column("a.1", cand_col)).unwrap();

        let mut probe_col = ColumnProfile::new("city");
        probe_col.structural_type = Some(StructuralType::Text);
        let probe = profile_with_column("probe", probe_col);

        let candidates = find_candidates(&probe, &catalog, &sketch, None).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].union_columns.len(), 1);
    }

    #[test]
    fn dataset_qualifying_as_both_join_and_union_appears_twice() {
        let catalog = InMemoryCatalog::new();
        let sketch = InMemorySketchIndex::new();

        let mut cand_overlap = ColumnProfile::new("population");
        cand_overlap.structural_type = Some(StructuralType::Integer);
        cand_overlap.coverage = vec![Interval { gte: 0.0, lte: 100.0 }];
        let mut cand_union = ColumnProfile::new("city");
        cand_union.structural_type = Some(StructuralType::Text);
        let candidate = Profile {
            id: "a.1".to_string(),
            name: "dataset a.1".to_string(),
            description: None,
            nb_rows: 10,
            size_bytes: 10,
            columns: vec![cand_overlap, cand_union],
            spatial_coverage: vec![],
            materialize: Map::new(),
            indexed_at: Utc::now(),
            lazo: vec![],
        };
        catalog.put(candidate).unwrap();

        let mut probe_overlap = ColumnProfile::new("pop_count");
        probe_overlap.structural_type = Some(StructuralType::Integer);
        probe_overlap.coverage = vec![Interval { gte: 50.0, lte: 150.0 }];
        let mut probe_union = ColumnProfile::new("city");
        probe_union.structural_type = Some(StructuralType::Text);
        let probe = Profile {
            id: "probe".to_string(),
            name: "probe".to_string(),
            description: None,
            nb_rows: 10,
            size_bytes: 10,
            columns: vec![probe_overlap, probe_union],
            spatial_coverage: vec![],
            materialize: Map::new(),
            indexed_at: Utc::now(),
            lazo: vec![],
        };

        let candidates = find_candidates(&probe, &catalog, &sketch, None).unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().any(|c| !c.join_columns.is_empty() && c.union_columns.is_empty()));
        assert!(candidates.iter().any(|c| c.join_columns.is_empty() && !c.union_columns.is_empty()));
    }

    #[test]
    fn self_id_is_never_a_candidate() {
        let catalog = InMemoryCatalog::new();
        let sketch = InMemorySketchIndex::new();
        let mut col = ColumnProfile::new("x");
        col.structural_type = Some(StructuralType::Text);
        let probe = profile_with_column("probe", col);
        catalog.put(probe.clone()).unwrap();
        let candidates = find_candidates(&probe, &catalog, &sketch, None).unwrap();
        assert!(candidates.is_empty());
    }
}
