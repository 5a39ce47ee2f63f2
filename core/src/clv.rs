//! Customer Lifetime Value modeling.
//!
//! Observation design: the snapshot's span is cut at a configurable
//! fraction. Features come from behavior before the cutoff (recency at
//! the cutoff, order frequency, average order value, lifespan-so-far);
//! the regression target is realized spend after the cutoff. A seeded
//! shuffle carves out a holdout set for evaluation.
//!
//! The model is ordinary least squares on standardized features, so the
//! feature-importance ranking is the normalized magnitude of the
//! standardized coefficients. Ties break by feature name for a stable
//! ordering.

use crate::{
    error::{EngineError, EngineResult},
    ingest::TransactionSnapshot,
    params::AnalysisParams,
    rng::{ModuleSlot, RngBank},
    segment::standardize,
    types::CustomerId,
};
use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FEATURE_NAMES: [&str; 4] = [
    "recency_days",
    "frequency",
    "average_order_value",
    "lifespan_days",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature_name: String,
    pub importance_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerClv {
    pub customer_id: CustomerId,
    pub predicted_clv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClvReport {
    pub cutoff_date: NaiveDate,
    /// Descending by score; scores sum to 1.0.
    pub feature_importance: Vec<FeatureImportance>,
    pub predictions: Vec<CustomerClv>,
    pub holdout_mae: f64,
    pub train_rows: usize,
    pub holdout_rows: usize,
}

struct Observation {
    customer_id: CustomerId,
    features: [f64; 4],
    target: f64,
}

/// Train the CLV regression and produce importances plus per-customer
/// predictions.
pub fn train(snapshot: &TransactionSnapshot, params: &AnalysisParams) -> EngineResult<ClvReport> {
    let (first_day, last_day) = snapshot.date_span().ok_or(EngineError::InsufficientData {
        observed: 0,
        required: params.min_training_rows,
    })?;
    let span_days = (last_day - first_day).num_days();
    let cutoff_date = first_day
        + chrono::Duration::days((span_days as f64 * params.clv_cutoff_fraction).floor() as i64);

    let observations = build_observations(snapshot, cutoff_date);

    // Seeded shuffle, then the trailing fraction becomes the holdout.
    let mut order: Vec<usize> = (0..observations.len()).collect();
    let mut rng = RngBank::new(params.seed).for_module(ModuleSlot::Clv);
    rng.shuffle(&mut order);

    let holdout_rows =
        ((observations.len() as f64) * params.clv_holdout_fraction).round() as usize;
    let train_rows = observations.len().saturating_sub(holdout_rows);
    if train_rows < params.min_training_rows {
        return Err(EngineError::InsufficientData {
            observed: train_rows,
            required: params.min_training_rows,
        });
    }

    let (train_idx, holdout_idx) = order.split_at(train_rows);

    // Standardization is fit on the full observation set so train and
    // holdout share one feature scale.
    let raw = feature_matrix(&observations);
    let features = standardize(&raw);

    let coefficients = fit_ols(&features, &observations, train_idx);

    // Importance: |standardized coefficient|, normalized to sum 1.
    let magnitudes: Vec<f64> = (0..4).map(|i| coefficients[i + 1].abs()).collect();
    let total: f64 = magnitudes.iter().sum();
    let mut feature_importance: Vec<FeatureImportance> = FEATURE_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| FeatureImportance {
            feature_name: name.to_string(),
            importance_score: if total > 0.0 {
                magnitudes[i] / total
            } else {
                1.0 / 4.0
            },
        })
        .collect();
    feature_importance.sort_by(|a, b| {
        b.importance_score
            .partial_cmp(&a.importance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.feature_name.cmp(&b.feature_name))
    });

    let predict = |row: usize| -> f64 {
        let mut value = coefficients[0];
        for i in 0..4 {
            value += coefficients[i + 1] * features[[row, i]];
        }
        // Future spend cannot be negative.
        value.max(0.0)
    };

    let holdout_mae = if holdout_idx.is_empty() {
        0.0
    } else {
        holdout_idx
            .iter()
            .map(|&i| (predict(i) - observations[i].target).abs())
            .sum::<f64>()
            / holdout_idx.len() as f64
    };

    let predictions: Vec<CustomerClv> = observations
        .iter()
        .enumerate()
        .map(|(i, obs)| CustomerClv {
            customer_id: obs.customer_id.clone(),
            predicted_clv: predict(i),
        })
        .collect();

    log::info!(
        "clv: trained on {} rows, holdout {} rows, MAE {:.2}",
        train_rows,
        holdout_idx.len(),
        holdout_mae
    );

    Ok(ClvReport {
        cutoff_date,
        feature_importance,
        predictions,
        holdout_mae,
        train_rows,
        holdout_rows: holdout_idx.len(),
    })
}

/// One observation per customer with at least one pre-cutoff order,
/// ordered by customer id.
fn build_observations(snapshot: &TransactionSnapshot, cutoff: NaiveDate) -> Vec<Observation> {
    struct Acc {
        spend_before: f64,
        orders_before: u64,
        first_before: NaiveDate,
        last_before: NaiveDate,
        spend_after: f64,
    }

    let mut acc: BTreeMap<CustomerId, Acc> = BTreeMap::new();
    for txn in snapshot.transactions() {
        let day = txn.day();
        if day < cutoff {
            let entry = acc.entry(txn.customer_id.clone()).or_insert(Acc {
                spend_before: 0.0,
                orders_before: 0,
                first_before: day,
                last_before: day,
                spend_after: 0.0,
            });
            entry.spend_before += txn.purchase_amount;
            entry.orders_before += 1;
            if day < entry.first_before {
                entry.first_before = day;
            }
            if day > entry.last_before {
                entry.last_before = day;
            }
        } else if let Some(entry) = acc.get_mut(&txn.customer_id) {
            entry.spend_after += txn.purchase_amount;
        }
        // Customers who only appear after the cutoff have no feature
        // window and are excluded.
    }

    acc.into_iter()
        .map(|(customer_id, a)| Observation {
            customer_id,
            features: [
                (cutoff - a.last_before).num_days() as f64,
                a.orders_before as f64,
                a.spend_before / a.orders_before as f64,
                (a.last_before - a.first_before).num_days() as f64,
            ],
            target: a.spend_after,
        })
        .collect()
}

fn feature_matrix(observations: &[Observation]) -> Array2<f64> {
    let mut data = Vec::with_capacity(observations.len() * 4);
    for obs in observations {
        data.extend_from_slice(&obs.features);
    }
    Array2::from_shape_vec((observations.len(), 4), data).expect("observation matrix shape")
}

/// Least squares with intercept over the training rows: solve the 5x5
/// normal equations by Gaussian elimination with partial pivoting.
fn fit_ols(features: &Array2<f64>, observations: &[Observation], train_idx: &[usize]) -> [f64; 5] {
    const P: usize = 5;
    let design_row = |i: usize| -> [f64; P] {
        [
            1.0,
            features[[i, 0]],
            features[[i, 1]],
            features[[i, 2]],
            features[[i, 3]],
        ]
    };

    let mut xtx = [[0.0f64; P]; P];
    let mut xty = [0.0f64; P];
    for &i in train_idx {
        let x = design_row(i);
        let y = observations[i].target;
        for a in 0..P {
            xty[a] += x[a] * y;
            for b in 0..P {
                xtx[a][b] += x[a] * x[b];
            }
        }
    }
    // Tiny ridge term keeps the system solvable on degenerate designs.
    for (a, row) in xtx.iter_mut().enumerate() {
        row[a] += 1e-9;
    }

    // Gaussian elimination, partial pivoting.
    let mut aug = [[0.0f64; P + 1]; P];
    for a in 0..P {
        aug[a][..P].copy_from_slice(&xtx[a]);
        aug[a][P] = xty[a];
    }
    for col in 0..P {
        let pivot = (col..P)
            .max_by(|&a, &b| {
                aug[a][col]
                    .abs()
                    .partial_cmp(&aug[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        aug.swap(col, pivot);
        let lead = aug[col][col];
        if lead.abs() < 1e-12 {
            continue;
        }
        for row in (col + 1)..P {
            let factor = aug[row][col] / lead;
            for c in col..=P {
                aug[row][c] -= factor * aug[col][c];
            }
        }
    }
    let mut beta = [0.0f64; P];
    for col in (0..P).rev() {
        let mut value = aug[col][P];
        for c in (col + 1)..P {
            value -= aug[col][c] * beta[c];
        }
        beta[col] = if aug[col][col].abs() < 1e-12 {
            0.0
        } else {
            value / aug[col][col]
        };
    }
    beta
}
