//! A/B test engine, single-run mode.
//!
//! For each product category: partition by experiment group, compute
//! conversion rates, and run a pooled two-proportion z-test with a
//! two-sided p-value. Categories where either group is below the
//! configured minimum sample size are skipped and reported, never
//! computed with an unstable statistic.

use crate::{
    error::EngineResult,
    ingest::{ExperimentGroup, Transaction, TransactionSnapshot},
    params::AnalysisParams,
    types::Category,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Exposures and conversions for one experiment group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCounts {
    pub exposures: u64,
    pub conversions: u64,
}

impl GroupCounts {
    pub fn rate(&self) -> f64 {
        if self.exposures == 0 {
            0.0
        } else {
            self.conversions as f64 / self.exposures as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub category: Category,
    pub group_a_conversion_rate: f64,
    pub group_b_conversion_rate: f64,
    /// Relative lift in percent; None when the control rate is zero
    /// (undefined, never reported as 0).
    pub lift_pct: Option<f64>,
    pub test_statistic: f64,
    pub p_value: f64,
    pub significant: bool,
}

/// A category excluded from the result set for having too small a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCategory {
    pub category: Category,
    pub group: String,
    pub observed: usize,
    pub required: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleRunReport {
    pub results: Vec<ExperimentResult>,
    pub skipped: Vec<SkippedCategory>,
    pub significance_threshold: f64,
}

/// The default conversion convention: the exposure resulted in a purchase.
pub fn purchase_conversion(txn: &Transaction) -> bool {
    txn.purchase_amount > 0.0
}

/// Per-category (control, treatment) row indexes into the snapshot.
/// Rows without an experiment group are not exposures and are excluded.
/// BTreeMap keeps category iteration order stable.
pub(crate) fn category_groups(
    snapshot: &TransactionSnapshot,
) -> BTreeMap<Category, (Vec<usize>, Vec<usize>)> {
    let mut groups: BTreeMap<Category, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (i, txn) in snapshot.transactions().iter().enumerate() {
        let Some(group) = txn.experiment_group else {
            continue;
        };
        let entry = groups.entry(txn.product_category.clone()).or_default();
        match group {
            ExperimentGroup::Control => entry.0.push(i),
            ExperimentGroup::Treatment => entry.1.push(i),
        }
    }
    groups
}

pub(crate) fn count_group(
    snapshot: &TransactionSnapshot,
    indexes: &[usize],
    conversion: &dyn Fn(&Transaction) -> bool,
) -> GroupCounts {
    let txns = snapshot.transactions();
    let conversions = indexes.iter().filter(|&&i| conversion(&txns[i])).count() as u64;
    GroupCounts {
        exposures: indexes.len() as u64,
        conversions,
    }
}

/// Run the significance test across every category with both groups
/// adequately sampled.
pub fn single_run(
    snapshot: &TransactionSnapshot,
    params: &AnalysisParams,
    conversion: &dyn Fn(&Transaction) -> bool,
) -> EngineResult<SingleRunReport> {
    let mut results = Vec::new();
    let mut skipped = Vec::new();

    for (category, (control_idx, treatment_idx)) in category_groups(snapshot) {
        if control_idx.len() < params.min_group_size {
            log::warn!(
                "abtest: skipping '{category}' — group A has {} rows, need {}",
                control_idx.len(),
                params.min_group_size
            );
            skipped.push(SkippedCategory {
                category,
                group: "A".to_string(),
                observed: control_idx.len(),
                required: params.min_group_size,
            });
            continue;
        }
        if treatment_idx.len() < params.min_group_size {
            log::warn!(
                "abtest: skipping '{category}' — group B has {} rows, need {}",
                treatment_idx.len(),
                params.min_group_size
            );
            skipped.push(SkippedCategory {
                category,
                group: "B".to_string(),
                observed: treatment_idx.len(),
                required: params.min_group_size,
            });
            continue;
        }

        let a = count_group(snapshot, &control_idx, conversion);
        let b = count_group(snapshot, &treatment_idx, conversion);
        let (z, p_value) = two_proportion_z(a, b);

        let rate_a = a.rate();
        let rate_b = b.rate();
        let lift_pct = lift(rate_a, rate_b).map(|l| l * 100.0);
        let significant = p_value < params.significance_threshold;

        log::debug!(
            "abtest: '{category}' rate_a={rate_a:.4} rate_b={rate_b:.4} z={z:.3} p={p_value:.5}"
        );

        results.push(ExperimentResult {
            category,
            group_a_conversion_rate: rate_a,
            group_b_conversion_rate: rate_b,
            lift_pct,
            test_statistic: z,
            p_value,
            significant,
        });
    }

    Ok(SingleRunReport {
        results,
        skipped,
        significance_threshold: params.significance_threshold,
    })
}

/// Relative lift of B over A; undefined when the control rate is zero.
pub fn lift(rate_a: f64, rate_b: f64) -> Option<f64> {
    if rate_a == 0.0 {
        None
    } else {
        Some((rate_b - rate_a) / rate_a)
    }
}

/// Pooled two-proportion z-test. Returns (z statistic, two-sided p-value).
/// Degenerate pools (all conversions or none) have no variance; the test
/// reports z = 0, p = 1.
pub fn two_proportion_z(a: GroupCounts, b: GroupCounts) -> (f64, f64) {
    let n_a = a.exposures as f64;
    let n_b = b.exposures as f64;
    if n_a == 0.0 || n_b == 0.0 {
        return (0.0, 1.0);
    }

    let pooled = (a.conversions + b.conversions) as f64 / (n_a + n_b);
    let se = (pooled * (1.0 - pooled) * (1.0 / n_a + 1.0 / n_b)).sqrt();
    if se == 0.0 {
        return (0.0, 1.0);
    }

    let z = (b.rate() - a.rate()) / se;
    let p = 2.0 * (1.0 - standard_normal_cdf(z.abs()));
    (z, p.clamp(0.0, 1.0))
}

/// Phi(x) via the Abramowitz & Stegun 7.1.26 erf polynomial
/// (|error| < 1.5e-7, ample for significance thresholds).
pub fn standard_normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}
