use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error(
        "Insufficient sample for category '{category}' group {group}: \
         {observed} rows, need at least {required}"
    )]
    InsufficientSample {
        category: String,
        group: String,
        observed: usize,
        required: usize,
    },

    #[error("Insufficient data: {observed} rows, need at least {required}")]
    InsufficientData { observed: usize, required: usize },

    #[error(
        "Insufficient history: {observed_days} days observed, \
         need at least {required_days} (two full seasonal periods)"
    )]
    InsufficientHistory {
        observed_days: usize,
        required_days: usize,
    },

    #[error("Module '{module}' timed out after {limit_ms} ms")]
    Timeout { module: String, limit_ms: u64 },

    #[error("No artifact found for ({module}, {signature})")]
    NotFound { module: String, signature: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
