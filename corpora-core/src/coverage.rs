//! Coverage Analyzer (C2, §4.2): deterministic k-means clustering over
//! numeric/temporal values and over `(lat, lon)` pairs, trimmed to 5th/95th
//! percentile ranges and capped at 3 clusters.

use crate::model::{Envelope, Interval};

const N_RANGES: usize = 3;

/// Deterministic k-means over a 1-D slice of values, `k = min(3, values.len())`.
/// Initialization picks evenly-spaced seeds from the sorted input, which is
/// reproducible without drawing from an RNG.
fn kmeans_1d(values: &[f64], k: usize) -> Vec<Vec<f64>> {
    if values.is_empty() || k == 0 {
        return vec![];
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let mut centroids: Vec<f64> = (0..k)
        .map(|i| {
            let idx = if k == 1 {
                0
            } else {
                i * (sorted.len() - 1) / (k - 1)
            };
            sorted[idx]
        })
        .collect();

    let mut clusters: Vec<Vec<f64>> = vec![Vec::new(); k];
    for _ in 0..25 {
        let mut next: Vec<Vec<f64>> = vec![Vec::new(); k];
        for &v in values {
            let mut best = 0usize;
            let mut best_dist = f64::MAX;
            for (i, c) in centroids.iter().enumerate() {
                let d = (v - c).abs();
                if d < best_dist {
                    best_dist = d;
                    best = i;
                }
            }
            next[best].push(v);
        }
        let mut changed = false;
        for (i, cluster) in next.iter().enumerate() {
            if cluster.is_empty() {
                continue;
            }
            let mean = cluster.iter().sum::<f64>() / cluster.len() as f64;
            if (mean - centroids[i]).abs() > 1e-9 {
                changed = true;
            }
            centroids[i] = mean;
        }
        clusters = next;
        if !changed {
            break;
        }
    }
    clusters
}

fn percentile_range(mut cluster: Vec<f64>) -> Option<Interval> {
    if cluster.is_empty() {
        return None;
    }
    cluster.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let min_idx = ((0.05 * cluster.len() as f64) as usize).min(cluster.len() - 1);
    let max_idx = ((0.95 * cluster.len() as f64) as usize).min(cluster.len() - 1);
    Some(Interval {
        gte: cluster[min_idx],
        lte: cluster[max_idx],
    })
}

/// Compute up to 3 coverage intervals for a numeric/temporal vector (nulls
/// and out-of-range values already dropped by the caller).
pub fn numerical_coverage(values: &[f64]) -> Vec<Interval> {
    if values.is_empty() {
        return vec![];
    }
    let k = N_RANGES.min(values.len());
    let clusters = kmeans_1d(values, k);
    clusters
        .into_iter()
        .filter_map(percentile_range)
        .take(N_RANGES)
        .collect()
}

/// Deterministic k-means over `(lat, lon)` pairs, `k = min(3, n)`.
fn kmeans_2d(points: &[(f64, f64)], k: usize) -> Vec<Vec<(f64, f64)>> {
    if points.is_empty() || k == 0 {
        return vec![];
    }
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    let mut centroids: Vec<(f64, f64)> = (0..k)
        .map(|i| {
            let idx = if k == 1 {
                0
            } else {
                i * (sorted.len() - 1) / (k - 1)
            };
            sorted[idx]
        })
        .collect();

    let mut clusters: Vec<Vec<(f64, f64)>> = vec![Vec::new(); k];
    for _ in 0..25 {
        let mut next: Vec<Vec<(f64, f64)>> = vec![Vec::new(); k];
        for &(lat, lon) in points {
            let mut best = 0usize;
            let mut best_dist = f64::MAX;
            for (i, c) in centroids.iter().enumerate() {
                let d = (lat - c.0).powi(2) + (lon - c.1).powi(2);
                if d < best_dist {
                    best_dist = d;
                    best = i;
                }
            }
            next[best].push((lat, lon));
        }
        let mut changed = false;
        for (i, cluster) in next.iter().enumerate() {
            if cluster.is_empty() {
                continue;
            }
            let n = cluster.len() as f64;
            let mean_lat = cluster.iter().map(|p| p.0).sum::<f64>() / n;
            let mean_lon = cluster.iter().map(|p| p.1).sum::<f64>() / n;
            if (mean_lat - centroids[i].0).abs() > 1e-9 || (mean_lon - centroids[i].1).abs() > 1e-9 {
                changed = true;
            }
            centroids[i] = (mean_lat, mean_lon);
        }
        clusters = next;
        if !changed {
            break;
        }
    }
    clusters
}

/// Compute up to 3 spatial envelopes for a list of `(lat, lon)` points.
pub fn spatial_coverage(points: &[(f64, f64)]) -> Vec<Envelope> {
    if points.is_empty() {
        return vec![];
    }
    let k = N_RANGES.min(points.len());
    let clusters = kmeans_2d(points, k);

    clusters
        .into_iter()
        .filter_map(|cluster| {
            if cluster.is_empty() {
                return None;
            }
            let mut by_lat = cluster.clone();
            by_lat.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
            let min_idx = ((0.05 * by_lat.len() as f64) as usize).min(by_lat.len() - 1);
            let max_idx = ((0.95 * by_lat.len() as f64) as usize).min(by_lat.len() - 1);
            let min_lat = by_lat[min_idx].0;
            let max_lat = by_lat[max_idx].0;

            let mut by_lon = cluster;
            by_lon.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
            let min_lon = by_lon[min_idx].1;
            let max_lon = by_lon[max_idx].1;

            Some(Envelope::from_corners(min_lon, max_lat, max_lon, min_lat))
        })
        .take(N_RANGES)
        .collect()
}
