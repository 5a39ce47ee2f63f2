use chrono::NaiveDate;
use commerce_core::{
    clv,
    error::EngineError,
    ingest::{Transaction, TransactionSnapshot},
    params::AnalysisParams,
};

fn txn(id: &str, customer: &str, day: NaiveDate, amount: f64) -> Transaction {
    Transaction {
        transaction_id: id.to_string(),
        customer_id: customer.to_string(),
        purchase_date: day.and_hms_opt(9, 0, 0).unwrap(),
        purchase_amount: amount,
        product_category: "Home Goods".to_string(),
        payment_method: "Card".to_string(),
        experiment_group: None,
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 30 customers over Jan-Feb 2024. January behavior predicts February
/// spend: heavier early buyers keep spending more.
fn training_snapshot() -> TransactionSnapshot {
    let mut rows = Vec::new();
    for c in 0..30 {
        let customer = format!("cust-{c:02}");
        let weight = 1.0 + c as f64;
        // Pre-cutoff: a few January orders.
        for o in 0..(2 + c % 4) {
            rows.push(txn(
                &format!("{customer}-jan-{o}"),
                &customer,
                day(2024, 1, 2 + ((c + o * 7) % 27) as u32),
                10.0 * weight,
            ));
        }
        // Post-cutoff: February spend proportional to January appetite.
        rows.push(txn(
            &format!("{customer}-feb"),
            &customer,
            day(2024, 2, 10 + (c % 18) as u32),
            25.0 * weight,
        ));
    }
    TransactionSnapshot::from_transactions(rows)
}

fn params(seed: u64) -> AnalysisParams {
    AnalysisParams {
        seed,
        min_training_rows: 20,
        ..AnalysisParams::default()
    }
}

#[test]
fn importances_normalize_to_one() {
    let report = clv::train(&training_snapshot(), &params(42)).expect("train");

    assert_eq!(report.feature_importance.len(), 4);
    let total: f64 = report
        .feature_importance
        .iter()
        .map(|f| f.importance_score)
        .sum();
    assert!((total - 1.0).abs() < 1e-9, "importances sum to {total}");
    assert!(report
        .feature_importance
        .iter()
        .all(|f| f.importance_score >= 0.0));
}

#[test]
fn importance_ranking_is_descending() {
    let report = clv::train(&training_snapshot(), &params(42)).expect("train");
    let scores: Vec<f64> = report
        .feature_importance
        .iter()
        .map(|f| f.importance_score)
        .collect();
    for pair in scores.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
}

#[test]
fn tied_importances_break_by_feature_name() {
    // No post-cutoff spend at all: every coefficient is zero, so all four
    // features tie at 0.25 and the ordering must be alphabetical.
    let mut rows = Vec::new();
    for c in 0..40 {
        let customer = format!("cust-{c:02}");
        for o in 0..3 {
            rows.push(txn(
                &format!("{customer}-{o}"),
                &customer,
                day(2024, 1, 1 + ((c + o * 5) % 20) as u32),
                20.0 + c as f64,
            ));
        }
        // A single trailing marker keeps the span long enough for a cutoff,
        // with zero spend after it.
        rows.push(txn(
            &format!("{customer}-late"),
            &customer,
            day(2024, 2, 20),
            0.0,
        ));
    }
    let snapshot = TransactionSnapshot::from_transactions(rows);

    let report = clv::train(&snapshot, &params(42)).expect("train");
    let names: Vec<&str> = report
        .feature_importance
        .iter()
        .map(|f| f.feature_name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "average_order_value",
            "frequency",
            "lifespan_days",
            "recency_days"
        ]
    );
}

#[test]
fn same_seed_is_deterministic() {
    let snapshot = training_snapshot();
    let first = clv::train(&snapshot, &params(7)).expect("train");
    let second = clv::train(&snapshot, &params(7)).expect("train");
    assert_eq!(first, second);
}

#[test]
fn predictions_cover_feature_window_customers() {
    let report = clv::train(&training_snapshot(), &params(42)).expect("train");
    assert_eq!(report.predictions.len(), 30);
    assert!(report.predictions.iter().all(|p| p.predicted_clv >= 0.0));
    assert!(report.holdout_mae.is_finite() && report.holdout_mae >= 0.0);
}

#[test]
fn too_small_training_set_is_refused() {
    let mut rows = Vec::new();
    for c in 0..5 {
        let customer = format!("cust-{c}");
        rows.push(txn(&format!("{customer}-a"), &customer, day(2024, 1, 5), 10.0));
        rows.push(txn(&format!("{customer}-b"), &customer, day(2024, 2, 5), 15.0));
    }
    let snapshot = TransactionSnapshot::from_transactions(rows);

    let err = clv::train(&snapshot, &params(42)).expect_err("must refuse");
    match err {
        EngineError::InsufficientData { observed, required } => {
            assert!(observed < required);
            assert_eq!(required, 20);
        }
        other => panic!("expected InsufficientData, got {other:?}"),
    }
}
