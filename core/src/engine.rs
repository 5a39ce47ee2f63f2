//! The analytics engine — dispatch, parameter signatures, and artifact
//! production.
//!
//! RULES:
//!   - Every module reads the same immutable snapshot; nothing mutates it.
//!   - A module's signature covers exactly the parameters it reads, so
//!     identical (snapshot, parameters) always map to the same artifact
//!     key and an identical payload (idempotence).
//!   - Modules are independent: any subset may run, in any order, and
//!     run_all stops at the first failure rather than running dependents
//!     of a failed stage.
//!   - Module runs are watched by a wall-clock budget; an overrun
//!     surfaces as a Timeout error instead of a hang.

use crate::{
    abtest, clv,
    error::{EngineError, EngineResult},
    forecast,
    ingest::{Transaction, TransactionSnapshot},
    kpi::{self, DateRange},
    params::{canonical_signature, date_token, AnalysisParams},
    segment, simulate,
    store::{ArtifactStore, RunArtifact},
};
use std::sync::{mpsc, Arc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisModule {
    Kpi,
    AbSingle,
    AbSimulation,
    Segmentation,
    Clv,
    Forecasting,
}

impl AnalysisModule {
    pub const ALL: [Self; 6] = [
        Self::Kpi,
        Self::AbSingle,
        Self::AbSimulation,
        Self::Segmentation,
        Self::Clv,
        Self::Forecasting,
    ];

    /// Stable name — the artifact key component the display layer uses.
    pub fn name(self) -> &'static str {
        match self {
            Self::Kpi => "kpi",
            Self::AbSingle => "ab_single",
            Self::AbSimulation => "ab_simulation",
            Self::Segmentation => "segmentation",
            Self::Clv => "clv",
            Self::Forecasting => "forecasting",
        }
    }
}

pub struct AnalyticsEngine {
    snapshot: Arc<TransactionSnapshot>,
    params: AnalysisParams,
    store: ArtifactStore,
    /// Conversion convention for the A/B modules. Plain fn pointer so
    /// module runs can move to a watchdog thread.
    conversion: fn(&Transaction) -> bool,
}

impl AnalyticsEngine {
    pub fn new(snapshot: TransactionSnapshot, params: AnalysisParams, store: ArtifactStore) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            params,
            store,
            conversion: abtest::purchase_conversion,
        }
    }

    pub fn with_conversion(mut self, conversion: fn(&Transaction) -> bool) -> Self {
        self.conversion = conversion;
        self
    }

    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// The inclusive analysis window: explicit bounds when configured,
    /// otherwise the snapshot's observed span.
    pub fn analysis_range(&self) -> EngineResult<DateRange> {
        let span = self.snapshot.date_span();
        let start = self.params.start_date.or(span.map(|(s, _)| s));
        let end = self.params.end_date.or(span.map(|(_, e)| e));
        match (start, end) {
            (Some(start), Some(end)) => DateRange::new(start, end),
            _ => Err(EngineError::InsufficientData {
                observed: 0,
                required: 1,
            }),
        }
    }

    /// Run one module to completion: compute the payload, stamp and store
    /// the artifact, return it.
    pub fn run(&self, module: AnalysisModule) -> EngineResult<RunArtifact> {
        let range = self.analysis_range()?;
        let signature = self.signature(module, range);
        log::info!("engine: running {} ({signature})", module.name());

        let payload = self.compute_with_watchdog(module, range)?;

        let artifact = RunArtifact {
            module_name: module.name().to_string(),
            parameter_signature: signature,
            payload,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.store.put(&artifact)?;
        Ok(artifact)
    }

    /// Run the given modules in order, stopping at the first failure.
    /// A failed stage's dependents never start.
    pub fn run_all(&self, modules: &[AnalysisModule]) -> EngineResult<Vec<RunArtifact>> {
        let mut artifacts = Vec::with_capacity(modules.len());
        for &module in modules {
            artifacts.push(self.run(module)?);
        }
        Ok(artifacts)
    }

    /// Canonical signature for the parameters this module actually reads.
    pub fn signature(&self, module: AnalysisModule, range: DateRange) -> String {
        let p = &self.params;
        let start = date_token(Some(range.start));
        let end = date_token(Some(range.end));
        let pairs: Vec<(&'static str, String)> = match module {
            AnalysisModule::Kpi => vec![("start", start), ("end", end)],
            AnalysisModule::AbSingle => vec![
                ("start", start),
                ("end", end),
                ("threshold", p.significance_threshold.to_string()),
                ("min_group", p.min_group_size.to_string()),
            ],
            AnalysisModule::AbSimulation => vec![
                ("start", start),
                ("end", end),
                ("trials", p.trial_count.to_string()),
                ("min_group", p.min_group_size.to_string()),
                ("seed", p.seed.to_string()),
            ],
            AnalysisModule::Segmentation => vec![
                ("start", start),
                ("end", end),
                ("clusters", p.cluster_count.to_string()),
                ("seed", p.seed.to_string()),
            ],
            AnalysisModule::Clv => vec![
                ("start", start),
                ("end", end),
                ("cutoff", p.clv_cutoff_fraction.to_string()),
                ("holdout", p.clv_holdout_fraction.to_string()),
                ("min_rows", p.min_training_rows.to_string()),
                ("seed", p.seed.to_string()),
            ],
            AnalysisModule::Forecasting => vec![
                ("start", start),
                ("end", end),
                ("horizon", p.forecast_horizon_days.to_string()),
                ("period", p.seasonal_period_days.to_string()),
                ("mode", p.decomposition.name().to_string()),
                ("eval_window", p.evaluation_window_days.to_string()),
            ],
        };
        canonical_signature(pairs)
    }

    /// Compute on a worker thread and await it under the configured
    /// budget. timeout_ms = 0 runs inline (tests and trusted callers).
    fn compute_with_watchdog(
        &self,
        module: AnalysisModule,
        range: DateRange,
    ) -> EngineResult<serde_json::Value> {
        if self.params.timeout_ms == 0 {
            return compute(&self.snapshot, &self.params, self.conversion, module, range);
        }

        let snapshot = Arc::clone(&self.snapshot);
        let params = self.params.clone();
        let conversion = self.conversion;
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(compute(&snapshot, &params, conversion, module, range));
        });

        match rx.recv_timeout(Duration::from_millis(self.params.timeout_ms)) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!(
                    "engine: {} exceeded {} ms, abandoning run",
                    module.name(),
                    self.params.timeout_ms
                );
                Err(EngineError::Timeout {
                    module: module.name().to_string(),
                    limit_ms: self.params.timeout_ms,
                })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(EngineError::Other(
                anyhow::anyhow!("{} worker terminated without a result", module.name()),
            )),
        }
    }
}

/// The uniform module contract: (snapshot, parameters) in, payload out.
fn compute(
    snapshot: &TransactionSnapshot,
    params: &AnalysisParams,
    conversion: fn(&Transaction) -> bool,
    module: AnalysisModule,
    range: DateRange,
) -> EngineResult<serde_json::Value> {
    // Every module sees only the analysis window.
    let window = snapshot.restrict(range.start, range.end);
    let payload = match module {
        AnalysisModule::Kpi => serde_json::to_value(kpi::compute(snapshot, range)?)?,
        AnalysisModule::AbSingle => {
            serde_json::to_value(abtest::single_run(&window, params, &conversion)?)?
        }
        AnalysisModule::AbSimulation => {
            serde_json::to_value(simulate::simulate(&window, params, &conversion)?)?
        }
        AnalysisModule::Segmentation => serde_json::to_value(segment::segment(&window, params)?)?,
        AnalysisModule::Clv => serde_json::to_value(clv::train(&window, params)?)?,
        AnalysisModule::Forecasting => serde_json::to_value(forecast::forecast(&window, params)?)?,
    };
    Ok(payload)
}
