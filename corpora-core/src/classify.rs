//! Type Classifier (C1, §4.1): one-pass pattern counting over a column
//! sample, then structural and semantic type inference.

use std::collections::BTreeSet;

use regex::Regex;
use std::sync::OnceLock;

use crate::model::{ColumnHint, SemanticType, StructuralType, TemporalResolution};
use crate::temporal::{parse_date, year_as_datetime};

fn re_int() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?[0-9]+(\.0*)?$").unwrap())
}

fn re_float() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?(?:[0-9]+\.[0-9]*|\.[0-9]+)(?:[Ee][0-9]+)?$").unwrap())
}

fn re_point() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^POINT ?\(-?\d{1,3}\.\d{1,15} -?\d{1,3}\.\d{1,15}\)$").unwrap()
    })
}

fn re_polygon() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^POLYGON ?\((\([0-9 .]+\), ?)*\([0-9 .]+\)\)$").unwrap())
}

fn re_geo_combined() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[\p{Lu}\p{P} 0-9]+ \(-?\d{1,3}\.\d{1,15}, ?-?\d{1,3}\.\d{1,15}\)$").unwrap()
    })
}

fn is_bool_literal(s: &str) -> bool {
    matches!(
        s.to_lowercase().as_str(),
        "0" | "1" | "true" | "false" | "y" | "n" | "yes" | "no"
    )
}

#[derive(Default, Debug, Clone, Copy)]
struct PatternCounts {
    num_empty: usize,
    num_int: usize,
    num_float: usize,
    num_point: usize,
    num_polygon: usize,
    num_geo_combined: usize,
    num_text: usize,
    num_bool: usize,
}

fn count_patterns(samples: &[String]) -> PatternCounts {
    let mut c = PatternCounts::default();
    for s in samples {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            c.num_empty += 1;
        } else if re_int().is_match(trimmed) {
            c.num_int += 1;
        } else if re_float().is_match(trimmed) {
            c.num_float += 1;
        } else if re_point().is_match(trimmed) {
            c.num_point += 1;
        } else if re_geo_combined().is_match(trimmed) {
            c.num_geo_combined += 1;
        } else if re_polygon().is_match(trimmed) {
            c.num_polygon += 1;
        } else if trimmed.chars().filter(|ch| ch.is_whitespace()).count() >= 4 {
            c.num_text += 1;
        }
        if is_bool_literal(trimmed) {
            c.num_bool += 1;
        }
    }
    c
}

fn threshold(n: usize, num_empty: usize) -> f64 {
    let n = n as f64;
    let num_empty = num_empty as f64;
    (1.0_f64).max((1.0 - 0.02) * (n - num_empty))
}

fn structural_from_counts(c: &PatternCounts, n: usize, t: f64) -> StructuralType {
    if c.num_empty == n {
        StructuralType::MissingData
    } else if c.num_int as f64 >= t {
        StructuralType::Integer
    } else if (c.num_int + c.num_float) as f64 >= t {
        StructuralType::Float
    } else if c.num_point as f64 >= t || c.num_geo_combined as f64 >= t {
        StructuralType::GeoPoint
    } else if c.num_polygon as f64 >= t {
        StructuralType::GeoPolygon
    } else {
        StructuralType::Text
    }
}

fn unclean_ratio(structural: StructuralType, c: &PatternCounts, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    match structural {
        StructuralType::Integer => (n - c.num_empty as f64 - c.num_int as f64) / n,
        StructuralType::Float => {
            (n - c.num_empty as f64 - c.num_int as f64 - c.num_float as f64) / n
        }
        StructuralType::GeoPoint => (n - c.num_empty as f64 - c.num_point as f64) / n,
        StructuralType::GeoPolygon => (n - c.num_empty as f64 - c.num_polygon as f64) / n,
        StructuralType::MissingData | StructuralType::Text => 0.0,
    }
}

/// Resolves free-text admin-area names (countries, states, etc) to canonical
/// names. External collaborator, narrow contract per §4.1/§9.
pub trait GeoResolver {
    /// Returns one resolved name per input, `None` where resolution failed.
    fn resolve_names(&self, samples: &[String]) -> Vec<Option<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct ColumnMeta {
    pub unclean_values_ratio: f64,
    pub missing_values_ratio: Option<f64>,
    pub num_distinct_values: Option<usize>,
    pub temporal_resolution: Option<TemporalResolution>,
}

#[derive(Debug, Clone, Default)]
pub struct ClassifyResult {
    pub structural_type: StructuralType,
    pub semantic_types: BTreeSet<SemanticType>,
    pub meta: ColumnMeta,
    /// Parsed instants for `DateTime` columns, epoch seconds.
    pub datetime_values: Vec<f64>,
    /// Coarsened (hour-resolution) epoch seconds, for coverage clustering.
    pub datetime_coverage_values: Vec<f64>,
    /// Distinct categorical values, when `Categorical` was asserted.
    pub categorical_values: BTreeSet<String>,
}

impl Default for StructuralType {
    fn default() -> Self {
        StructuralType::Text
    }
}

/// Classify one column from an ordered sample of string cell values.
///
/// `hint`, if present, is a human-in-the-loop override: inference is skipped
/// and only metadata consistent with the provided types is computed.
pub fn classify(
    samples: &[String],
    name: &str,
    hint: Option<&ColumnHint>,
    geo: Option<&dyn GeoResolver>,
) -> ClassifyResult {
    let n = samples.len();
    let counts = count_patterns(samples);
    let t = threshold(n, counts.num_empty);

    if let Some(hint) = hint {
        return classify_with_hint(samples, name, hint, &counts, n, t);
    }

    let mut structural_type = structural_from_counts(&counts, n, t);
    let mut result = ClassifyResult::default();
    result.meta.unclean_values_ratio = unclean_ratio(structural_type, &counts, n);
    if structural_type != StructuralType::MissingData && counts.num_empty > 0 {
        result.meta.missing_values_ratio = Some(counts.num_empty as f64 / n as f64);
    }

    if counts.num_bool as f64 >= t {
        result.semantic_types.insert(SemanticType::Boolean);
    }

    match structural_type {
        StructuralType::Text => {
            let mut categorical = false;
            if let Some(geo) = geo {
                let resolved = geo.resolve_names(samples);
                let hits = resolved.iter().filter(|r| r.is_some()).count();
                if hits as f64 > 0.7 * n as f64 {
                    result.semantic_types.insert(SemanticType::Admin);
                    categorical = true;
                }
            }
            if !categorical && counts.num_text as f64 >= t {
                result.semantic_types.insert(SemanticType::FreeText);
            } else {
                let values: BTreeSet<String> = samples
                    .iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                result.meta.num_distinct_values = Some(values.len());
                let max_categorical = 0.10 * (n - counts.num_empty) as f64;
                if categorical
                    || values.len() as f64 <= max_categorical
                    || result.semantic_types.contains(&SemanticType::Boolean)
                {
                    result.semantic_types.insert(SemanticType::Categorical);
                    result.categorical_values = values;
                }
            }
        }
        StructuralType::Integer => {
            let lower = name.trim().to_lowercase();
            if lower.starts_with("id")
                || lower.ends_with("id")
                || lower.starts_with("identifier")
                || lower.ends_with("identifier")
                || lower.starts_with("index")
                || lower.ends_with("index")
            {
                result.semantic_types.insert(SemanticType::Identifier);
            }
            let values: BTreeSet<String> = samples
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            result.meta.num_distinct_values = Some(values.len());

            if lower == "year" {
                let dates: Vec<f64> = samples
                    .iter()
                    .filter_map(|s| s.trim().parse::<i32>().ok())
                    .filter_map(year_as_datetime)
                    .collect();
                if dates.len() as f64 >= t {
                    result.semantic_types.insert(SemanticType::DateTime);
                    result.meta.temporal_resolution = Some(TemporalResolution::Year);
                    result.datetime_values = dates.clone();
                    result.datetime_coverage_values = dates;
                }
            }
        }
        StructuralType::Float => {
            let lower = name.to_lowercase();
            let mut num_lat = 0usize;
            let mut num_long = 0usize;
            for s in samples {
                if let Ok(v) = s.trim().parse::<f64>() {
                    if (-180.0..=180.0).contains(&v) {
                        num_long += 1;
                        if (-90.0..=90.0).contains(&v) {
                            num_lat += 1;
                        }
                    }
                }
            }
            if num_lat as f64 >= t && lower.contains("lat") {
                result.semantic_types.insert(SemanticType::Latitude);
            }
            if num_long as f64 >= t && lower.contains("lon") {
                result.semantic_types.insert(SemanticType::Longitude);
            }
        }
        StructuralType::MissingData | StructuralType::GeoPoint | StructuralType::GeoPolygon => {}
    }

    // Generic date parsing is always attempted (unless we already settled a
    // resolution-specific year parse above).
    if result.meta.temporal_resolution.is_none() {
        let parsed: Vec<(f64, f64)> = samples
            .iter()
            .filter_map(|s| parse_date(s))
            .map(|(instant, coarsened)| (instant, coarsened))
            .collect();
        if parsed.len() as f64 >= t {
            result.semantic_types.insert(SemanticType::DateTime);
            result.datetime_values = parsed.iter().map(|(i, _)| *i).collect();
            result.datetime_coverage_values = parsed.iter().map(|(_, c)| *c).collect();
            if structural_type == StructuralType::Integer {
                structural_type = StructuralType::Text;
            }
        }
    }

    result.structural_type = structural_type;
    result
}

fn classify_with_hint(
    samples: &[String],
    name: &str,
    hint: &ColumnHint,
    counts: &PatternCounts,
    n: usize,
    t: f64,
) -> ClassifyResult {
    let mut result = ClassifyResult {
        structural_type: hint.structural_type,
        semantic_types: hint.semantic_types.clone(),
        ..Default::default()
    };
    result.meta.unclean_values_ratio = unclean_ratio(hint.structural_type, counts, n);
    if hint.structural_type != StructuralType::MissingData && counts.num_empty > 0 {
        result.meta.missing_values_ratio = Some(counts.num_empty as f64 / n as f64);
    }

    if hint.semantic_types.contains(&SemanticType::DateTime) {
        let parsed: Vec<(f64, f64)> = samples.iter().filter_map(|s| parse_date(s)).collect();
        result.datetime_values = parsed.iter().map(|(i, _)| *i).collect();
        result.datetime_coverage_values = parsed.iter().map(|(_, c)| *c).collect();
    }
    if hint.semantic_types.contains(&SemanticType::Categorical)
        || hint.structural_type == StructuralType::Integer
    {
        let values: BTreeSet<String> = samples
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        result.meta.num_distinct_values = Some(values.len());
        if hint.semantic_types.contains(&SemanticType::Categorical) {
            result.categorical_values = values;
        }
    }
    let _ = (name, t);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pure_integer_column() {
        let vals: Vec<String> = (1..=100).map(|i| i.to_string()).collect();
        let result = classify(&vals, "x", None, None);
        assert_eq!(result.structural_type, StructuralType::Integer);
        assert_eq!(result.meta.unclean_values_ratio, 0.0);
    }

    #[test]
    fn year_column_gets_datetime_semantic() {
        let vals = samples(&["2001", "2002", "2003", "2004"]);
        let result = classify(&vals, "year", None, None);
        assert_eq!(result.structural_type, StructuralType::Integer);
        assert!(result.semantic_types.contains(&SemanticType::DateTime));
        assert_eq!(result.datetime_values.len(), 4);
    }

    #[test]
    fn yyyymmdd_downgrades_to_text() {
        let vals = samples(&["20200101", "20200201", "20200301"]);
        let result = classify(&vals, "date", None, None);
        assert_eq!(result.structural_type, StructuralType::Text);
        assert!(result.semantic_types.contains(&SemanticType::DateTime));
    }

    #[test]
    fn boolean_and_integer_both_asserted() {
        let vals = samples(&["0", "1", "0", "1", "1"]);
        let result = classify(&vals, "flag", None, None);
        assert_eq!(result.structural_type, StructuralType::Integer);
        assert!(result.semantic_types.contains(&SemanticType::Boolean));
    }

    #[test]
    fn identifier_semantic_from_column_name() {
        let vals: Vec<String> = (1..=50).map(|i| i.to_string()).collect();
        let result = classify(&vals, "customer_id", None, None);
        assert!(result.semantic_types.contains(&SemanticType::Identifier));
    }

    #[test]
    fn categorical_detected_for_low_cardinality_text() {
        let vals = samples(&["red", "blue", "red", "green", "blue", "red"]);
        let result = classify(&vals, "color", None, None);
        assert_eq!(result.structural_type, StructuralType::Text);
        assert!(result.semantic_types.contains(&SemanticType::Categorical));
    }

    #[test]
    fn all_empty_is_missing_data() {
        let vals = samples(&["", "", ""]);
        let result = classify(&vals, "blank", None, None);
        assert_eq!(result.structural_type, StructuralType::MissingData);
    }

    #[test]
    fn latitude_longitude_semantics_by_name_and_range() {
        let lat_vals = samples(&["40.7", "40.8", "40.75"]);
        let lat = classify(&lat_vals, "pickup_latitude", None, None);
        assert!(lat.semantic_types.contains(&SemanticType::Latitude));

        let lon_vals = samples(&["-74.0", "-73.9", "-73.95"]);
        let lon = classify(&lon_vals, "pickup_longitude", None, None);
        assert!(lon.semantic_types.contains(&SemanticType::Longitude));
    }

    #[test]
    fn hint_skips_inference() {
        let mut semantic = BTreeSet::new();
        semantic.insert(SemanticType::Identifier);
        let hint = ColumnHint {
            structural_type: StructuralType::Integer,
            semantic_types: semantic,
        };
        let vals: Vec<String> = (1..=10).map(|i| i.to_string()).collect();
        let result = classify(&vals, "id", Some(&hint), None);
        assert_eq!(result.structural_type, StructuralType::Integer);
        assert!(result.semantic_types.contains(&SemanticType::Identifier));
    }
}
