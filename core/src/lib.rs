//! commerce-core — the batch analytics computation engine behind the
//! ecommerce intelligence dashboard.
//!
//! Ingests raw transaction CSVs and produces the derived artifacts the
//! display layer renders: KPI aggregates, A/B significance results and
//! simulated lift distributions, customer segments, CLV feature rankings,
//! and sales forecasts. Every module is a pure function of an immutable
//! transaction snapshot plus explicit parameters; with a fixed seed, a
//! run is reproducible bit for bit.

pub mod abtest;
pub mod clv;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod ingest;
pub mod kpi;
pub mod params;
pub mod rng;
pub mod segment;
pub mod simulate;
pub mod store;
pub mod types;

pub use engine::{AnalysisModule, AnalyticsEngine};
pub use error::{EngineError, EngineResult};
pub use ingest::{ingest_csv, ingest_csv_path, IngestReport, Transaction, TransactionSnapshot};
pub use params::AnalysisParams;
pub use store::{ArtifactStore, RunArtifact};
