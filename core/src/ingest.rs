//! Ingestion and normalization of raw transaction data.
//!
//! RULES:
//!   - Missing or misnamed columns are fatal (SchemaError).
//!   - Bad rows are dropped, counted, and logged — never silently kept.
//!   - The output snapshot is immutable and date-sorted; every module
//!     takes it by reference. There is no ambient "current dataset".

use crate::{
    error::{EngineError, EngineResult},
    types::{Category, CustomerId, TransactionId},
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentGroup {
    Control,
    Treatment,
}

impl ExperimentGroup {
    /// Accepts the spellings seen in exported datasets.
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "a" | "control" | "group a" => Some(Self::Control),
            "b" | "treatment" | "group b" => Some(Self::Treatment),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Control => "A",
            Self::Treatment => "B",
        }
    }
}

/// One validated transaction row. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub purchase_date: NaiveDateTime,
    pub purchase_amount: f64,
    pub product_category: Category,
    pub payment_method: String,
    pub experiment_group: Option<ExperimentGroup>,
}

impl Transaction {
    pub fn day(&self) -> NaiveDate {
        self.purchase_date.date()
    }
}

/// Row counts for one ingestion batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub dropped_rows: usize,
}

/// An immutable, date-sorted view of one ingestion batch.
/// All modules read from this; none mutate it.
#[derive(Debug, Clone, Default)]
pub struct TransactionSnapshot {
    transactions: Vec<Transaction>,
}

impl TransactionSnapshot {
    /// Build a snapshot from already-validated rows. Sorts by
    /// (purchase_date, transaction_id) so iteration order is stable
    /// regardless of input order.
    pub fn from_transactions(mut transactions: Vec<Transaction>) -> Self {
        transactions.sort_by(|a, b| {
            (a.purchase_date, &a.transaction_id).cmp(&(b.purchase_date, &b.transaction_id))
        });
        Self { transactions }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// First and last calendar day covered, None when empty.
    pub fn date_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.transactions.first()?;
        let last = self.transactions.last()?;
        Some((first.day(), last.day()))
    }

    /// A new snapshot restricted to days inside the inclusive range.
    /// Order is preserved, so the result is still date-sorted.
    pub fn restrict(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            transactions: self
                .transactions
                .iter()
                .filter(|t| t.day() >= start && t.day() <= end)
                .cloned()
                .collect(),
        }
    }

    /// Sorted, de-duplicated category labels.
    pub fn categories(&self) -> Vec<Category> {
        let mut cats: Vec<Category> = self
            .transactions
            .iter()
            .map(|t| t.product_category.clone())
            .collect();
        cats.sort();
        cats.dedup();
        cats
    }
}

const REQUIRED_COLUMNS: [&str; 6] = [
    "transaction_id",
    "customer_id",
    "purchase_date",
    "purchase_amount",
    "product_category",
    "payment_method",
];

struct ColumnMap {
    transaction_id: usize,
    customer_id: usize,
    purchase_date: usize,
    purchase_amount: usize,
    product_category: usize,
    payment_method: usize,
    experiment_group: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> EngineResult<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .filter(|&&c| find(c).is_none())
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::Schema(format!(
                "missing required columns: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            transaction_id: find("transaction_id").unwrap_or_default(),
            customer_id: find("customer_id").unwrap_or_default(),
            purchase_date: find("purchase_date").unwrap_or_default(),
            purchase_amount: find("purchase_amount").unwrap_or_default(),
            product_category: find("product_category").unwrap_or_default(),
            payment_method: find("payment_method").unwrap_or_default(),
            experiment_group: find("experiment_group"),
        })
    }
}

/// Ingest a CSV stream: validate the header, parse rows, drop and count
/// the bad ones, and return the sorted snapshot plus the report.
pub fn ingest_csv<R: Read>(reader: R) -> EngineResult<(TransactionSnapshot, IngestReport)> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let cols = ColumnMap::from_headers(&headers)?;

    let mut valid = Vec::new();
    let mut total = 0usize;
    let mut dropped = 0usize;

    for record in rdr.records() {
        total += 1;
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                dropped += 1;
                log::warn!("row {total}: malformed record dropped: {e}");
                continue;
            }
        };
        match parse_row(&cols, &record) {
            Ok(txn) => valid.push(txn),
            Err(reason) => {
                dropped += 1;
                log::warn!("row {total}: dropped: {reason}");
            }
        }
    }

    let report = IngestReport {
        total_rows: total,
        valid_rows: valid.len(),
        dropped_rows: dropped,
    };
    log::info!(
        "ingest complete: {} total, {} valid, {} dropped",
        report.total_rows,
        report.valid_rows,
        report.dropped_rows
    );

    Ok((TransactionSnapshot::from_transactions(valid), report))
}

pub fn ingest_csv_path<P: AsRef<Path>>(
    path: P,
) -> EngineResult<(TransactionSnapshot, IngestReport)> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| EngineError::Schema(format!("cannot open {}: {e}", path.as_ref().display())))?;
    ingest_csv(file)
}

fn parse_row(cols: &ColumnMap, record: &csv::StringRecord) -> Result<Transaction, String> {
    let field = |i: usize| record.get(i).unwrap_or("").trim();

    let transaction_id = field(cols.transaction_id);
    if transaction_id.is_empty() {
        return Err("empty transaction_id".to_string());
    }
    let customer_id = field(cols.customer_id);
    if customer_id.is_empty() {
        return Err("empty customer_id".to_string());
    }

    let raw_date = field(cols.purchase_date);
    let purchase_date =
        parse_datetime(raw_date).ok_or_else(|| format!("unparsable purchase_date '{raw_date}'"))?;

    let raw_amount = field(cols.purchase_amount);
    let purchase_amount: f64 = raw_amount
        .parse()
        .map_err(|_| format!("unparsable purchase_amount '{raw_amount}'"))?;
    if !purchase_amount.is_finite() || purchase_amount < 0.0 {
        return Err(format!("negative or non-finite purchase_amount {purchase_amount}"));
    }

    let experiment_group = cols
        .experiment_group
        .map(|i| field(i))
        .filter(|s| !s.is_empty())
        .and_then(ExperimentGroup::parse);

    Ok(Transaction {
        transaction_id: transaction_id.to_string(),
        customer_id: customer_id.to_string(),
        purchase_date,
        purchase_amount,
        product_category: field(cols.product_category).to_string(),
        payment_method: field(cols.payment_method).to_string(),
        experiment_group,
    })
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, or a bare date.
fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
