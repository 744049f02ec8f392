//! The document types stored in and served from the Catalog (§3 of the spec).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stable, globally unique dataset identifier, `<source-identifier>.<source-local-id>`.
pub type DatasetId = String;

/// Collapse non-ID-safe characters in a source identifier to `-`, matching the
/// `encode_domain` helper in the original Socrata discoverer.
pub fn encode_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

pub fn dataset_id(source_identifier: &str, source_local_id: &str) -> DatasetId {
    format!("{}.{}", encode_identifier(source_identifier), source_local_id)
}

/// What a `Source` returns for one dataset during discovery.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub source_local_id: String,
    pub name: String,
    pub description: Option<String>,
    pub source_url: String,
    pub last_modified: Option<DateTime<Utc>>,
    /// Opaque record telling the Catalog how to re-fetch raw bytes. Always
    /// carries an `identifier` key naming the source.
    pub materialize: BTreeMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructuralType {
    MissingData,
    Integer,
    Float,
    Text,
    GeoPoint,
    GeoPolygon,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SemanticType {
    Boolean,
    DateTime,
    Categorical,
    Latitude,
    Longitude,
    Admin,
    Identifier,
    FreeText,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalResolution {
    Year,
    Month,
    Day,
}

/// A numeric or temporal summarizing interval, `gte <= lte`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub gte: f64,
    pub lte: f64,
}

impl Interval {
    pub fn intersects(&self, other: &Interval) -> bool {
        self.gte <= other.lte && other.gte <= self.lte
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub structural_type: Option<StructuralType>,
    pub semantic_types: BTreeSet<SemanticType>,
    pub unclean_values_ratio: f64,
    pub missing_values_ratio: Option<f64>,
    pub num_distinct_values: Option<usize>,
    pub mean: Option<f64>,
    pub stddev: Option<f64>,
    /// At most 3 intervals, each satisfying `gte <= lte`.
    pub coverage: Vec<Interval>,
    pub temporal_resolution: Option<TemporalResolution>,
}

impl ColumnProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_semantic(&self, ty: SemanticType) -> bool {
        self.semantic_types.contains(&ty)
    }
}

/// `{nw: [lon, lat], se: [lon, lat]}`. Zero-area envelopes are inflated by
/// ±0.0001° at construction time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub nw: [f64; 2],
    pub se: [f64; 2],
}

const SPATIAL_INFLATE: f64 = 0.0001;

impl Envelope {
    /// Build an envelope from (min_lon, max_lat) / (max_lon, min_lat) corners,
    /// inflating any collapsed axis while preserving the NW/SE corner
    /// invariant (Open Question (c)).
    pub fn from_corners(min_lon: f64, max_lat: f64, max_lon: f64, min_lat: f64) -> Self {
        let (mut min_lon, mut max_lon) = (min_lon, max_lon);
        let (mut min_lat, mut max_lat) = (min_lat, max_lat);
        if (max_lon - min_lon).abs() < f64::EPSILON {
            min_lon -= SPATIAL_INFLATE;
            max_lon += SPATIAL_INFLATE;
        }
        if (max_lat - min_lat).abs() < f64::EPSILON {
            min_lat -= SPATIAL_INFLATE;
            max_lat += SPATIAL_INFLATE;
        }
        Envelope {
            nw: [min_lon, max_lat],
            se: [max_lon, min_lat],
        }
    }

    fn as_rect(&self) -> geo::Rect<f64> {
        geo::Rect::new(
            geo::Coord {
                x: self.nw[0].min(self.se[0]),
                y: self.se[1].min(self.nw[1]),
            },
            geo::Coord {
                x: self.nw[0].max(self.se[0]),
                y: self.nw[1].max(self.se[1]),
            },
        )
    }

    pub fn area(&self) -> f64 {
        use geo::Area;
        self.as_rect().unsigned_area()
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        use geo::Intersects;
        self.as_rect().intersects(&other.as_rect())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpatialCoverage {
    pub lat_column: String,
    pub lon_column: String,
    pub ranges: Vec<Envelope>,
}

/// A Lazo-style sketch attached to a text column in search mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LazoSketch {
    pub name: String,
    pub n_permutations: u32,
    pub hash_values: Vec<u64>,
    pub cardinality: usize,
}

/// The Catalog document produced by the Profiler.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Profile {
    pub id: DatasetId,
    pub name: String,
    pub description: Option<String>,
    pub nb_rows: usize,
    pub size_bytes: u64,
    pub columns: Vec<ColumnProfile>,
    pub spatial_coverage: Vec<SpatialCoverage>,
    pub materialize: BTreeMap<String, String>,
    pub indexed_at: DateTime<Utc>,
    #[serde(default)]
    pub lazo: Vec<LazoSketch>,
}

impl Profile {
    /// The source `identifier` this document belongs to, per the
    /// `materialize.identifier` invariant in §3.
    pub fn source_identifier(&self) -> Option<&str> {
        self.materialize.get("identifier").map(String::as_str)
    }
}

/// Per-source change-detection record (§3 "Pending record").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingRecord {
    pub sha1: String,
}

/// Optional human-in-the-loop override for one column (§4.1 "human-in-the-loop").
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnHint {
    pub structural_type: StructuralType,
    pub semantic_types: BTreeSet<SemanticType>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_non_id_safe_characters() {
        assert_eq!(encode_identifier("data.cityofnewyork.us"), "data-cityofnewyork-us");
        assert_eq!(encode_identifier("Finances.WorldBank.org"), "finances-worldbank-org");
    }

    #[test]
    fn dataset_id_joins_source_and_local_id() {
        assert_eq!(dataset_id("data.cityofnewyork.us", "abcd-1234"), "data-cityofnewyork-us.abcd-1234");
    }

    #[test]
    fn degenerate_envelope_is_inflated_and_nondegenerate() {
        let env = Envelope::from_corners(-74.0, 40.7, -74.0, 40.7);
        assert!(env.area() > 0.0);
        assert!(env.nw[1] > env.se[1], "north stays north after inflation");
        assert!(env.nw[0] < env.se[0], "west stays west after inflation");
    }

    #[test]
    fn interval_intersection() {
        let a = Interval { gte: 0.0, lte: 10.0 };
        let b = Interval { gte: 5.0, lte: 15.0 };
        let c = Interval { gte: 20.0, lte: 30.0 };
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
