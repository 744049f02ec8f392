//! Query Compiler (C6, §4.6): translates a user's JSON query into a
//! structured tree the Catalog can evaluate, grounded on the original
//! `query/query/web.py`'s `parse_query`/`parse_query_variables` and on the
//! `Expr`-combination idiom in the teacher's `popgetter::search`.

use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::model::{Interval, Profile, SemanticType, StructuralType};

/// A single matchable clause against a `Profile`.
#[derive(Debug, Clone)]
pub enum QueryNode {
    MatchAll,
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    NameContains(String),
    DescriptionContains(String),
    AnyColumnNameContains(String),
    RequireColumnSemanticType(SemanticType),
    RequireColumnStructuralType(StructuralType),
    ColumnNameEquals(String),
    /// Require some column with the `DateTime` semantic type, and
    /// (independently, not necessarily the same column) some column whose
    /// coverage intersects `[start, end]` — two separate existential
    /// checks, matching the original's two independent Elasticsearch
    /// sub-queries rather than a single column satisfying both.
    TemporalEntity {
        range: Option<Interval>,
    },
    /// Require spatial coverage intersecting the given envelope.
    GeospatialEntity {
        envelope: crate::model::Envelope,
    },
}

impl QueryNode {
    pub fn matches(&self, profile: &Profile) -> bool {
        match self {
            QueryNode::MatchAll => true,
            QueryNode::And(nodes) => nodes.iter().all(|n| n.matches(profile)),
            QueryNode::Or(nodes) => {
                if nodes.is_empty() {
                    true
                } else {
                    nodes.iter().any(|n| n.matches(profile))
                }
            }
            QueryNode::NameContains(text) => contains_ci(&profile.name, text),
            QueryNode::DescriptionContains(text) => profile
                .description
                .as_deref()
                .map(|d| contains_ci(d, text))
                .unwrap_or(false),
            QueryNode::AnyColumnNameContains(text) => profile
                .columns
                .iter()
                .any(|c| contains_ci(&c.name, text)),
            QueryNode::ColumnNameEquals(name) => profile
                .columns
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(name)),
            QueryNode::RequireColumnSemanticType(ty) => {
                profile.columns.iter().any(|c| c.has_semantic(*ty))
            }
            QueryNode::RequireColumnStructuralType(ty) => profile
                .columns
                .iter()
                .any(|c| c.structural_type == Some(*ty)),
            QueryNode::TemporalEntity { range } => {
                let has_datetime_column = profile
                    .columns
                    .iter()
                    .any(|c| c.has_semantic(SemanticType::DateTime));
                if !has_datetime_column {
                    return false;
                }
                match range {
                    None => true,
                    Some(r) => profile
                        .columns
                        .iter()
                        .any(|c| c.coverage.iter().any(|cov| cov.intersects(r))),
                }
            }
            QueryNode::GeospatialEntity { envelope } => profile
                .spatial_coverage
                .iter()
                .any(|sc| sc.ranges.iter().any(|r| r.intersects(envelope))),
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// A compiled query: `filter` must match for a document to be returned,
/// `should` clauses only contribute score (§4.6 "desired_variables").
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub filter: QueryNode,
    pub should: Vec<QueryNode>,
}

impl CompiledQuery {
    pub fn score(&self, profile: &Profile) -> f64 {
        if self.should.is_empty() {
            return 1.0;
        }
        let matched = self.should.iter().filter(|n| n.matches(profile)).count();
        1.0 + matched as f64 / self.should.len() as f64
    }
}

/// Compile the `query` section of a search request. Returns `Ok(None)` if
/// `value` has no usable clauses (caller decides whether that's an error,
/// per §4.6 "at least one of `query` or `data` must be present").
pub fn compile(value: &Value) -> CoreResult<Option<CompiledQuery>> {
    let mut must: Vec<QueryNode> = Vec::new();

    if let Some(dataset) = value.get("dataset") {
        if let Some(node) = compile_dataset_clause(dataset) {
            must.push(node);
        }
    }

    if let Some(required) = value.get("required_variables").and_then(Value::as_array) {
        must.extend(compile_variables(required)?);
    }

    let mut should: Vec<QueryNode> = Vec::new();
    if let Some(desired) = value.get("desired_variables").and_then(Value::as_array) {
        should.extend(compile_variables(desired)?);
    }

    if must.is_empty() && should.is_empty() {
        return Ok(None);
    }

    let filter = if must.is_empty() {
        QueryNode::MatchAll
    } else {
        QueryNode::And(must)
    };

    Ok(Some(CompiledQuery { filter, should }))
}

fn compile_dataset_clause(dataset: &Value) -> Option<QueryNode> {
    let mut clauses: Vec<QueryNode> = Vec::new();

    if let Some(about) = dataset.get("about").and_then(Value::as_str) {
        clauses.push(QueryNode::Or(vec![
            QueryNode::NameContains(about.to_string()),
            QueryNode::DescriptionContains(about.to_string()),
            QueryNode::AnyColumnNameContains(about.to_string()),
        ]));
    }

    if let Some(names) = dataset.get("name").and_then(Value::as_array) {
        let or: Vec<QueryNode> = names
            .iter()
            .filter_map(Value::as_str)
            .map(|s| QueryNode::NameContains(s.to_string()))
            .collect();
        if !or.is_empty() {
            clauses.push(QueryNode::Or(or));
        }
    }

    if let Some(descriptions) = dataset.get("description").and_then(Value::as_array) {
        let or: Vec<QueryNode> = descriptions
            .iter()
            .filter_map(Value::as_str)
            .map(|s| QueryNode::DescriptionContains(s.to_string()))
            .collect();
        if !or.is_empty() {
            clauses.push(QueryNode::Or(or));
        }
    }

    if clauses.is_empty() {
        None
    } else {
        Some(QueryNode::And(clauses))
    }
}

fn compile_variables(variables: &[Value]) -> CoreResult<Vec<QueryNode>> {
    let mut out = Vec::new();
    for variable in variables {
        let kind = variable.get("type").and_then(Value::as_str).unwrap_or("");
        match kind {
            "temporal_entity" => {
                let range = temporal_range(variable);
                out.push(QueryNode::TemporalEntity { range });
            }
            "geospatial_entity" => {
                if let Some(bbox) = variable.get("bounding_box") {
                    if let Some(envelope) = parse_bounding_box(bbox) {
                        out.push(QueryNode::GeospatialEntity { envelope });
                    }
                }
            }
            "generic_entity" => {
                out.extend(generic_entity_clauses(variable));
            }
            _ => {
                // Unknown kind: silently skipped, matching the original
                // `parse_query_variables`'s `if/elif` chain (e.g.
                // `dataframe_columns` has no handling there either).
            }
        }
    }
    Ok(out)
}

fn temporal_range(variable: &Value) -> Option<Interval> {
    let start = variable
        .get("start")
        .and_then(Value::as_str)
        .and_then(|s| crate::temporal::parse_date(s))
        .map(|(instant, _)| instant);
    let end = variable
        .get("end")
        .and_then(Value::as_str)
        .and_then(|s| crate::temporal::parse_date(s))
        .map(|(instant, _)| instant);
    match (start, end) {
        (Some(s), Some(e)) => Some(Interval { gte: s, lte: e }),
        (Some(s), None) => Some(Interval {
            gte: s,
            lte: chrono::Utc::now().timestamp() as f64,
        }),
        (None, Some(e)) => Some(Interval { gte: 0.0, lte: e }),
        (None, None) => None,
    }
}

fn parse_bounding_box(bbox: &Value) -> Option<crate::model::Envelope> {
    let lon1 = bbox.get("longitude1")?.as_f64()?;
    let lon2 = bbox.get("longitude2")?.as_f64()?;
    let lat1 = bbox.get("latitude1")?.as_f64()?;
    let lat2 = bbox.get("latitude2")?.as_f64()?;
    let (min_lon, max_lon) = (lon1.min(lon2), lon1.max(lon2));
    let (min_lat, max_lat) = (lat1.min(lat2), lat1.max(lat2));
    Some(crate::model::Envelope::from_corners(
        min_lon, max_lat, max_lon, min_lat,
    ))
}

fn generic_entity_clauses(variable: &Value) -> Vec<QueryNode> {
    let mut clauses = Vec::new();
    if let Some(names) = variable.get("name").and_then(Value::as_array) {
        let or: Vec<QueryNode> = names
            .iter()
            .filter_map(Value::as_str)
            .map(|s| QueryNode::ColumnNameEquals(s.to_string()))
            .collect();
        if !or.is_empty() {
            clauses.push(QueryNode::Or(or));
        }
    }
    if let Some(types) = variable.get("structural_type").and_then(Value::as_array) {
        let or: Vec<QueryNode> = types
            .iter()
            .filter_map(Value::as_str)
            .filter_map(parse_structural_type)
            .map(QueryNode::RequireColumnStructuralType)
            .collect();
        if !or.is_empty() {
            clauses.push(QueryNode::Or(or));
        }
    }
    if let Some(types) = variable.get("semantic_types").and_then(Value::as_array) {
        let or: Vec<QueryNode> = types
            .iter()
            .filter_map(Value::as_str)
            .filter_map(parse_semantic_type)
            .map(QueryNode::RequireColumnSemanticType)
            .collect();
        if !or.is_empty() {
            clauses.push(QueryNode::Or(or));
        }
    }
    clauses
}

fn parse_structural_type(s: &str) -> Option<StructuralType> {
    Some(match s {
        "MissingData" => StructuralType::MissingData,
        "Integer" => StructuralType::Integer,
        "Float" => StructuralType::Float,
        "Text" => StructuralType::Text,
        "GeoPoint" => StructuralType::GeoPoint,
        "GeoPolygon" => StructuralType::GeoPolygon,
        _ => return None,
    })
}

fn parse_semantic_type(s: &str) -> Option<SemanticType> {
    Some(match s {
        "Boolean" => SemanticType::Boolean,
        "DateTime" => SemanticType::DateTime,
        "Categorical" => SemanticType::Categorical,
        "Latitude" => SemanticType::Latitude,
        "Longitude" => SemanticType::Longitude,
        "Admin" => SemanticType::Admin,
        "Identifier" => SemanticType::Identifier,
        "FreeText" => SemanticType::FreeText,
        _ => return None,
    })
}

/// Validate the top-level request per §4.6: at least one of `query` or
/// `data` must be present.
pub fn require_query_or_data(value: &Value) -> CoreResult<()> {
    let has_query = value.get("query").is_some();
    let has_data = value.get("data").is_some();
    if !has_query && !has_data {
        return Err(CoreError::InvalidQuery(
            "request must include at least one of `query` or `data`".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnProfile;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample_profile() -> Profile {
        let mut col = ColumnProfile::new("population");
        col.structural_type = Some(StructuralType::Integer);
        Profile {
            id: "src.1".into(),
            name: "Census of widgets".into(),
            description: Some("A widget census".into()),
            nb_rows: 10,
            size_bytes: 100,
            columns: vec![col],
            spatial_coverage: vec![],
            materialize: BTreeMap::new(),
            indexed_at: Utc::now(),
            lazo: vec![],
        }
    }

    #[test]
    fn about_matches_name_or_description_or_column() {
        let query = serde_json::json!({ "dataset": { "about": "widget" } });
        let compiled = compile(&query).unwrap().unwrap();
        assert!(compiled.filter.matches(&sample_profile()));
    }

    #[test]
    fn missing_query_and_data_is_rejected() {
        let value = serde_json::json!({});
        assert!(require_query_or_data(&value).is_err());
    }

    #[test]
    fn generic_entity_requires_structural_type() {
        let query = serde_json::json!({
            "required_variables": [
                { "type": "generic_entity", "structural_type": ["Integer"] }
            ]
        });
        let compiled = compile(&query).unwrap().unwrap();
        assert!(compiled.filter.matches(&sample_profile()));
    }

    #[test]
    fn temporal_entity_matches_across_distinct_columns() {
        let mut datetime_col = ColumnProfile::new("recorded_at");
        datetime_col.semantic_types.insert(SemanticType::DateTime);
        let mut coverage_col = ColumnProfile::new("year_built");
        coverage_col.coverage = vec![Interval { gte: 0.0, lte: 10.0 }];

        let mut profile = sample_profile();
        profile.columns = vec![datetime_col, coverage_col];

        let node = QueryNode::TemporalEntity {
            range: Some(Interval { gte: 5.0, lte: 15.0 }),
        };
        assert!(node.matches(&profile));
    }

    #[test]
    fn temporal_entity_requires_a_datetime_column_even_if_another_covers_the_range() {
        let mut coverage_col = ColumnProfile::new("year_built");
        coverage_col.coverage = vec![Interval { gte: 0.0, lte: 10.0 }];

        let mut profile = sample_profile();
        profile.columns = vec![coverage_col];

        let node = QueryNode::TemporalEntity {
            range: Some(Interval { gte: 5.0, lte: 15.0 }),
        };
        assert!(!node.matches(&profile));
    }

    #[test]
    fn unknown_variable_kind_is_skipped() {
        let query = serde_json::json!({
            "required_variables": [ { "type": "dataframe_columns" } ]
        });
        let compiled = compile(&query).unwrap();
        assert!(compiled.is_none());
    }
}
