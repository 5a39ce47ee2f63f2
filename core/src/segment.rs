//! Customer segmentation — behavioral feature engineering, seeded k-means
//! clustering, and a 2-D PCA projection for visualization.
//!
//! The projection is purely presentational and independent of the
//! clustering: both read the same standardized feature matrix, but
//! neither influences the other.
//!
//! Cluster ids are arbitrary integers, stable only within one run.

use crate::{
    error::{EngineError, EngineResult},
    ingest::TransactionSnapshot,
    params::AnalysisParams,
    rng::{ModuleSlot, RngBank, StreamRng},
    types::CustomerId,
};
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-customer behavioral rollup, recomputed from the snapshot each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub customer_id: CustomerId,
    pub total_spend: f64,
    pub order_count: u64,
    pub first_order_date: NaiveDate,
    pub last_order_date: NaiveDate,
    pub active_lifespan_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub customer_id: CustomerId,
    pub cluster_id: usize,
    pub projected_x: f64,
    pub projected_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationReport {
    pub assignments: Vec<ClusterAssignment>,
    pub cluster_sizes: Vec<usize>,
    /// Within-cluster sum of squares in standardized feature space.
    pub inertia: f64,
    /// Centroids in standardized feature space, one row per cluster:
    /// [total_spend, order_count, active_lifespan_days].
    pub centroids: Vec<Vec<f64>>,
}

/// Build spend/frequency/lifespan profiles, one per customer, ordered by
/// customer id.
pub fn build_profiles(snapshot: &TransactionSnapshot) -> Vec<CustomerProfile> {
    let mut acc: BTreeMap<CustomerId, CustomerProfile> = BTreeMap::new();

    for txn in snapshot.transactions() {
        let day = txn.day();
        let entry = acc
            .entry(txn.customer_id.clone())
            .or_insert_with(|| CustomerProfile {
                customer_id: txn.customer_id.clone(),
                total_spend: 0.0,
                order_count: 0,
                first_order_date: day,
                last_order_date: day,
                active_lifespan_days: 0,
            });
        entry.total_spend += txn.purchase_amount;
        entry.order_count += 1;
        if day < entry.first_order_date {
            entry.first_order_date = day;
        }
        if day > entry.last_order_date {
            entry.last_order_date = day;
        }
    }

    let mut profiles: Vec<CustomerProfile> = acc.into_values().collect();
    for p in &mut profiles {
        p.active_lifespan_days = (p.last_order_date - p.first_order_date).num_days();
    }
    profiles
}

/// Cluster customers on (spend, frequency, lifespan) and attach the 2-D
/// projection. Every input customer lands in exactly one cluster.
pub fn segment(
    snapshot: &TransactionSnapshot,
    params: &AnalysisParams,
) -> EngineResult<SegmentationReport> {
    let profiles = build_profiles(snapshot);
    let k = params.cluster_count;
    if k == 0 || profiles.len() < k {
        return Err(EngineError::InsufficientData {
            observed: profiles.len(),
            required: k.max(1),
        });
    }

    let features = standardize(&feature_matrix(&profiles));
    let mut rng = RngBank::new(params.seed).for_module(ModuleSlot::Segmentation);

    let (labels, centroids, inertia) = kmeans(
        &features,
        k,
        params.kmeans_max_iterations,
        params.kmeans_tolerance,
        &mut rng,
    );
    let projection = pca_project_2d(&features);

    let mut cluster_sizes = vec![0usize; k];
    let assignments: Vec<ClusterAssignment> = profiles
        .iter()
        .enumerate()
        .map(|(i, p)| {
            cluster_sizes[labels[i]] += 1;
            ClusterAssignment {
                customer_id: p.customer_id.clone(),
                cluster_id: labels[i],
                projected_x: projection[[i, 0]],
                projected_y: projection[[i, 1]],
            }
        })
        .collect();

    log::info!(
        "segment: {} customers into {} clusters (inertia {:.3})",
        assignments.len(),
        k,
        inertia
    );

    Ok(SegmentationReport {
        assignments,
        cluster_sizes,
        inertia,
        centroids: centroids.outer_iter().map(|row| row.to_vec()).collect(),
    })
}

fn feature_matrix(profiles: &[CustomerProfile]) -> Array2<f64> {
    let mut data = Vec::with_capacity(profiles.len() * 3);
    for p in profiles {
        data.push(p.total_spend);
        data.push(p.order_count as f64);
        data.push(p.active_lifespan_days as f64);
    }
    Array2::from_shape_vec((profiles.len(), 3), data).expect("profile matrix shape")
}

/// Z-score each column. Zero-variance columns collapse to 0.
pub(crate) fn standardize(features: &Array2<f64>) -> Array2<f64> {
    let n = features.nrows() as f64;
    let mut out = features.clone();
    for col in 0..features.ncols() {
        let mean = features.column(col).sum() / n;
        let var = features
            .column(col)
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / n;
        let std = var.sqrt();
        for row in 0..features.nrows() {
            out[[row, col]] = if std > 0.0 {
                (features[[row, col]] - mean) / std
            } else {
                0.0
            };
        }
    }
    out
}

/// Seeded k-means++ initialization followed by Lloyd iterations.
/// Returns (labels, centroids, inertia).
fn kmeans(
    features: &Array2<f64>,
    k: usize,
    max_iterations: usize,
    tolerance: f64,
    rng: &mut StreamRng,
) -> (Vec<usize>, Array2<f64>, f64) {
    let n = features.nrows();
    let dims = features.ncols();

    // k-means++ seeding: first centroid uniform, the rest proportional
    // to squared distance from the nearest chosen centroid.
    let mut centroids = Array2::<f64>::zeros((k, dims));
    let first = rng.next_index(n);
    centroids.row_mut(0).assign(&features.row(first));

    let mut dist_sq = vec![0.0f64; n];
    for c in 1..k {
        for (i, d) in dist_sq.iter_mut().enumerate() {
            *d = (0..c)
                .map(|j| sq_dist(features, i, &centroids, j))
                .fold(f64::INFINITY, f64::min);
        }
        let total: f64 = dist_sq.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.next_f64() * total;
            let mut chosen = n - 1;
            for (i, d) in dist_sq.iter().enumerate() {
                target -= d;
                if target <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        } else {
            rng.next_index(n)
        };
        centroids.row_mut(c).assign(&features.row(pick));
    }

    let mut labels = vec![0usize; n];
    for _ in 0..max_iterations {
        // Assignment step. Ties break toward the lower cluster id.
        for (i, label) in labels.iter_mut().enumerate() {
            let mut best = 0usize;
            let mut best_d = f64::INFINITY;
            for c in 0..k {
                let d = sq_dist(features, i, &centroids, c);
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            *label = best;
        }

        // Update step.
        let mut sums = Array2::<f64>::zeros((k, dims));
        let mut counts = vec![0usize; k];
        for (i, &label) in labels.iter().enumerate() {
            counts[label] += 1;
            let mut row = sums.row_mut(label);
            row += &features.row(i);
        }

        let mut shift = 0.0f64;
        for c in 0..k {
            if counts[c] == 0 {
                // Re-seed an empty cluster on the point farthest from its
                // current centroid.
                let far = (0..n)
                    .max_by(|&a, &b| {
                        let da = sq_dist(features, a, &centroids, labels[a]);
                        let db = sq_dist(features, b, &centroids, labels[b]);
                        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .unwrap_or(0);
                centroids.row_mut(c).assign(&features.row(far));
                continue;
            }
            let new: Array1<f64> = sums.row(c).mapv(|v| v / counts[c] as f64);
            shift += centroids
                .row(c)
                .iter()
                .zip(new.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>();
            centroids.row_mut(c).assign(&new);
        }

        if shift < tolerance {
            break;
        }
    }

    // Final assignment against the converged centroids.
    let mut inertia = 0.0;
    for (i, label) in labels.iter_mut().enumerate() {
        let mut best = 0usize;
        let mut best_d = f64::INFINITY;
        for c in 0..k {
            let d = sq_dist(features, i, &centroids, c);
            if d < best_d {
                best_d = d;
                best = c;
            }
        }
        *label = best;
        inertia += best_d;
    }

    (labels, centroids, inertia)
}

fn sq_dist(features: &Array2<f64>, i: usize, centroids: &Array2<f64>, c: usize) -> f64 {
    features
        .row(i)
        .iter()
        .zip(centroids.row(c).iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum()
}

/// Project standardized features onto their top two principal components.
/// Eigenvector signs are normalized (largest component positive) so the
/// projection is reproducible across runs.
fn pca_project_2d(features: &Array2<f64>) -> Array2<f64> {
    let n = features.nrows();
    let dims = features.ncols();
    let denom = (n as f64 - 1.0).max(1.0);

    let mut cov = Array2::<f64>::zeros((dims, dims));
    for a in 0..dims {
        for b in a..dims {
            let v = features
                .column(a)
                .iter()
                .zip(features.column(b).iter())
                .map(|(x, y)| x * y)
                .sum::<f64>()
                / denom;
            cov[[a, b]] = v;
            cov[[b, a]] = v;
        }
    }

    let (eigenvalues, eigenvectors) = jacobi_eigen(&cov);
    let mut order: Vec<usize> = (0..dims).collect();
    order.sort_by(|&a, &b| {
        eigenvalues[b]
            .partial_cmp(&eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut projection = Array2::<f64>::zeros((n, 2));
    for (out_col, &comp) in order.iter().take(2).enumerate() {
        let mut axis: Vec<f64> = (0..dims).map(|d| eigenvectors[[d, comp]]).collect();
        // Sign convention: flip so the largest-magnitude loading is positive.
        let dominant = axis
            .iter()
            .cloned()
            .fold(0.0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if dominant < 0.0 {
            for v in &mut axis {
                *v = -*v;
            }
        }
        for row in 0..n {
            projection[[row, out_col]] = features
                .row(row)
                .iter()
                .zip(axis.iter())
                .map(|(x, a)| x * a)
                .sum();
        }
    }
    projection
}

/// Cyclic Jacobi rotation for a small symmetric matrix.
/// Returns (eigenvalues, column eigenvectors).
fn jacobi_eigen(matrix: &Array2<f64>) -> (Vec<f64>, Array2<f64>) {
    let dims = matrix.nrows();
    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(dims);

    for _ in 0..64 {
        let mut off = 0.0;
        for p in 0..dims {
            for q in (p + 1)..dims {
                off += a[[p, q]].powi(2);
            }
        }
        if off < 1e-14 {
            break;
        }

        for p in 0..dims {
            for q in (p + 1)..dims {
                if a[[p, q]].abs() < 1e-18 {
                    continue;
                }
                let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * a[[p, q]]);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for i in 0..dims {
                    let aip = a[[i, p]];
                    let aiq = a[[i, q]];
                    a[[i, p]] = c * aip - s * aiq;
                    a[[i, q]] = s * aip + c * aiq;
                }
                for j in 0..dims {
                    let apj = a[[p, j]];
                    let aqj = a[[q, j]];
                    a[[p, j]] = c * apj - s * aqj;
                    a[[q, j]] = s * apj + c * aqj;
                }
                for i in 0..dims {
                    let vip = v[[i, p]];
                    let viq = v[[i, q]];
                    v[[i, p]] = c * vip - s * viq;
                    v[[i, q]] = s * vip + c * viq;
                }
            }
        }
    }

    ((0..dims).map(|i| a[[i, i]]).collect(), v)
}
