//! Shared primitive types used across the entire engine.

/// Unique identifier of a single transaction row.
pub type TransactionId = String;

/// Stable customer identifier.
pub type CustomerId = String;

/// Product category label, taken verbatim from the dataset
/// ("Beauty", "Electronics", ...). The set is open-ended, so it stays a
/// string rather than a closed enum.
pub type Category = String;
