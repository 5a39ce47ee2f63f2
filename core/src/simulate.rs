//! A/B test engine, simulation mode.
//!
//! Repeated resampling of each category's control/treatment rows (with
//! replacement, original sizes) to build a lift distribution per category.
//! Trials are independent fork-join work: each (category, trial) pair owns
//! its own RNG stream derived from the master seed, so the result is
//! identical whatever the worker count or scheduling order. The reduction
//! into summary statistics waits on all trials.

use crate::{
    abtest::{category_groups, count_group, lift, SkippedCategory},
    error::EngineResult,
    ingest::{Transaction, TransactionSnapshot},
    params::AnalysisParams,
    rng::{ModuleSlot, RngBank, StreamRng},
    types::Category,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reliability {
    ReliablyPositive,
    ReliablyNegative,
    Inconclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub mean: f64,
    pub std_dev: f64,
    pub p05: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationDistribution {
    pub category: Category,
    /// Lift (percent) per trial, in trial order. Always exactly
    /// trial_count entries.
    pub lifts_pct: Vec<f64>,
    pub summary: SummaryStats,
    /// ReliablyPositive when the 90% interval sits above zero,
    /// ReliablyNegative below, Inconclusive when it straddles.
    pub reliability: Reliability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub distributions: Vec<SimulationDistribution>,
    pub skipped: Vec<SkippedCategory>,
    pub trial_count: usize,
}

/// Run the resampling simulation across every adequately sampled category.
pub fn simulate(
    snapshot: &TransactionSnapshot,
    params: &AnalysisParams,
    conversion: &(dyn Fn(&Transaction) -> bool + Sync),
) -> EngineResult<SimulationReport> {
    let bank = RngBank::new(params.seed);
    let mut distributions = Vec::new();
    let mut skipped = Vec::new();

    for (category_index, (category, (control_idx, treatment_idx))) in
        category_groups(snapshot).into_iter().enumerate()
    {
        if control_idx.len() < params.min_group_size {
            skipped.push(SkippedCategory {
                category,
                group: "A".to_string(),
                observed: control_idx.len(),
                required: params.min_group_size,
            });
            continue;
        }
        if treatment_idx.len() < params.min_group_size {
            skipped.push(SkippedCategory {
                category,
                group: "B".to_string(),
                observed: treatment_idx.len(),
                required: params.min_group_size,
            });
            continue;
        }

        // Fallback lift for the (vanishingly rare) trial whose redraws all
        // land on a zero-conversion control sample.
        let a_full = count_group(snapshot, &control_idx, conversion);
        let b_full = count_group(snapshot, &treatment_idx, conversion);
        let observed_lift = lift(a_full.rate(), b_full.rate()).unwrap_or(0.0) * 100.0;

        // Fork: every trial is an independent task with its own stream.
        let lifts_pct: Vec<f64> = (0..params.trial_count)
            .into_par_iter()
            .map(|trial| {
                let mut rng =
                    bank.for_trial(ModuleSlot::AbSimulation, category_index as u64, trial as u64);
                trial_lift_pct(
                    snapshot,
                    &control_idx,
                    &treatment_idx,
                    conversion,
                    &mut rng,
                )
                .unwrap_or(observed_lift)
            })
            .collect();
        // Join: all trials are in; reduce to summary statistics.

        let summary = summarize(&lifts_pct);
        let reliability = classify(&summary);

        log::info!(
            "simulate: '{category}' {} trials, mean lift {:.2}% ({:?})",
            lifts_pct.len(),
            summary.mean,
            reliability
        );

        distributions.push(SimulationDistribution {
            category,
            lifts_pct,
            summary,
            reliability,
        });
    }

    Ok(SimulationReport {
        distributions,
        skipped,
        trial_count: params.trial_count,
    })
}

/// One trial: resample both groups with replacement at original size and
/// recompute the lift. Redraws (bounded) when the control sample has no
/// conversions, so the lift stays defined.
fn trial_lift_pct(
    snapshot: &TransactionSnapshot,
    control_idx: &[usize],
    treatment_idx: &[usize],
    conversion: &(dyn Fn(&Transaction) -> bool + Sync),
    rng: &mut StreamRng,
) -> Option<f64> {
    const MAX_REDRAWS: usize = 16;
    let txns = snapshot.transactions();

    for _ in 0..MAX_REDRAWS {
        let conv_a = resample_conversions(txns, control_idx, conversion, rng);
        let conv_b = resample_conversions(txns, treatment_idx, conversion, rng);
        if conv_a == 0 {
            continue;
        }
        let rate_a = conv_a as f64 / control_idx.len() as f64;
        let rate_b = conv_b as f64 / treatment_idx.len() as f64;
        return lift(rate_a, rate_b).map(|l| l * 100.0);
    }
    None
}

fn resample_conversions(
    txns: &[Transaction],
    indexes: &[usize],
    conversion: &(dyn Fn(&Transaction) -> bool + Sync),
    rng: &mut StreamRng,
) -> u64 {
    let mut conversions = 0u64;
    for _ in 0..indexes.len() {
        let pick = indexes[rng.next_index(indexes.len())];
        if conversion(&txns[pick]) {
            conversions += 1;
        }
    }
    conversions
}

fn summarize(values: &[f64]) -> SummaryStats {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = if values.len() < 2 {
        0.0
    } else {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
    };

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    SummaryStats {
        mean,
        std_dev: variance.sqrt(),
        p05: quantile(&sorted, 0.05),
        p25: quantile(&sorted, 0.25),
        p50: quantile(&sorted, 0.50),
        p75: quantile(&sorted, 0.75),
        p95: quantile(&sorted, 0.95),
    }
}

/// Linear-interpolation quantile over a pre-sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

fn classify(summary: &SummaryStats) -> Reliability {
    if summary.p05 > 0.0 {
        Reliability::ReliablyPositive
    } else if summary.p95 < 0.0 {
        Reliability::ReliablyNegative
    } else {
        Reliability::Inconclusive
    }
}
