//! Analysis run parameters.
//!
//! One AnalysisParams value drives a whole engine run. Every module reads
//! only the fields it needs; the canonical parameter signature for an
//! artifact is built from exactly those fields (see engine.rs), so two
//! runs that differ only in fields a module ignores share an artifact key.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisParams {
    /// Inclusive analysis window. None means "derive from the snapshot".
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    // A/B testing
    pub significance_threshold: f64,
    /// Minimum rows per experiment group per category. Categories below
    /// this are skipped, never computed with an unstable statistic.
    pub min_group_size: usize,
    pub trial_count: usize,

    // Segmentation
    pub cluster_count: usize,
    pub kmeans_max_iterations: usize,
    pub kmeans_tolerance: f64,

    // CLV
    /// Fraction of the observed span used as the feature window; spend
    /// after the cutoff becomes the prediction target.
    pub clv_cutoff_fraction: f64,
    pub clv_holdout_fraction: f64,
    pub min_training_rows: usize,

    // Forecasting
    pub forecast_horizon_days: usize,
    pub seasonal_period_days: usize,
    pub decomposition: DecompositionMode,
    pub evaluation_window_days: usize,

    /// Master seed for every stochastic step. Same seed + same snapshot
    /// + same parameters = identical artifacts.
    pub seed: u64,

    /// Per-module wall-clock budget. 0 disables the watchdog.
    pub timeout_ms: u64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            significance_threshold: 0.05,
            min_group_size: 50,
            trial_count: 100,
            cluster_count: 4,
            kmeans_max_iterations: 100,
            kmeans_tolerance: 1e-6,
            clv_cutoff_fraction: 0.5,
            clv_holdout_fraction: 0.2,
            min_training_rows: 20,
            forecast_horizon_days: 30,
            seasonal_period_days: 7,
            decomposition: DecompositionMode::Additive,
            evaluation_window_days: 14,
            seed: 42,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionMode {
    Additive,
    Multiplicative,
}

impl DecompositionMode {
    pub fn name(self) -> &'static str {
        match self {
            Self::Additive => "additive",
            Self::Multiplicative => "multiplicative",
        }
    }
}

/// Canonical encoding of a parameter subset: keys sorted ascending,
/// joined as `key=value` pairs with `&`. This string is the artifact
/// cache key component, so its format must stay stable.
pub fn canonical_signature(mut pairs: Vec<(&'static str, String)>) -> String {
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Signature-friendly rendering of the optional date bounds.
pub fn date_token(d: Option<NaiveDate>) -> String {
    d.map_or_else(|| "auto".to_string(), |d| d.format("%Y-%m-%d").to_string())
}
