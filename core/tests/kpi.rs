use chrono::NaiveDate;
use commerce_core::{
    error::EngineError,
    ingest::{Transaction, TransactionSnapshot},
    kpi::{self, DateRange},
};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
}

fn txn(id: &str, day: &str, amount: f64) -> Transaction {
    Transaction {
        transaction_id: id.to_string(),
        customer_id: format!("cust-{id}"),
        purchase_date: date(day).and_hms_opt(12, 0, 0).unwrap(),
        purchase_amount: amount,
        product_category: "Toys".to_string(),
        payment_method: "Card".to_string(),
        experiment_group: None,
    }
}

fn snapshot(rows: Vec<Transaction>) -> TransactionSnapshot {
    TransactionSnapshot::from_transactions(rows)
}

#[test]
fn five_transaction_scenario() {
    // 5 transactions on 2024-01-01..2024-01-05 with amounts 10..50.
    let rows = (1..=5)
        .map(|i| txn(&format!("t{i}"), &format!("2024-01-0{i}"), (i * 10) as f64))
        .collect();
    let range = DateRange::new(date("2024-01-01"), date("2024-01-05")).unwrap();

    let summary = kpi::compute(&snapshot(rows), range).expect("kpi");
    assert_eq!(summary.total_revenue, 150.0);
    assert_eq!(summary.order_count, 5);
    assert_eq!(summary.average_order_value, 30.0);
}

#[test]
fn daily_series_is_contiguous_and_zero_filled() {
    let rows = vec![txn("t1", "2024-01-01", 10.0), txn("t2", "2024-01-04", 40.0)];
    let range = DateRange::new(date("2024-01-01"), date("2024-01-05")).unwrap();

    let summary = kpi::compute(&snapshot(rows), range).expect("kpi");
    assert_eq!(summary.daily_revenue.len(), 5);
    let revenues: Vec<f64> = summary.daily_revenue.iter().map(|d| d.revenue).collect();
    assert_eq!(revenues, vec![10.0, 0.0, 0.0, 40.0, 0.0]);

    // Total revenue equals the sum of the daily series.
    assert!((summary.total_revenue - revenues.iter().sum::<f64>()).abs() < 1e-9);
}

#[test]
fn aov_times_orders_recovers_revenue() {
    let rows = vec![
        txn("t1", "2024-01-01", 13.37),
        txn("t2", "2024-01-02", 29.99),
        txn("t3", "2024-01-02", 7.5),
    ];
    let range = DateRange::new(date("2024-01-01"), date("2024-01-02")).unwrap();

    let summary = kpi::compute(&snapshot(rows), range).expect("kpi");
    let recovered = summary.average_order_value * summary.order_count as f64;
    assert!((recovered - summary.total_revenue).abs() < 1e-9);
}

#[test]
fn empty_range_has_zero_aov_not_nan() {
    let rows = vec![txn("t1", "2024-03-01", 10.0)];
    let range = DateRange::new(date("2024-01-01"), date("2024-01-31")).unwrap();

    let summary = kpi::compute(&snapshot(rows), range).expect("kpi");
    assert_eq!(summary.order_count, 0);
    assert_eq!(summary.total_revenue, 0.0);
    assert_eq!(summary.average_order_value, 0.0);
    // The series still spans the whole range.
    assert_eq!(summary.daily_revenue.len(), 31);
}

#[test]
fn customer_spend_quantiles_are_ordered() {
    // Four customers spending 10, 20, 30, 40 in total.
    let rows = (1..=4)
        .map(|i| txn(&format!("t{i}"), "2024-01-01", (i * 10) as f64))
        .collect();
    let range = DateRange::new(date("2024-01-01"), date("2024-01-01")).unwrap();

    let summary = kpi::compute(&snapshot(rows), range).expect("kpi");
    let q = summary.customer_spend_quantiles;
    assert!((q.p50 - 25.0).abs() < 1e-9);
    assert!(q.p25 <= q.p50 && q.p50 <= q.p75 && q.p75 <= q.p90);
    assert!(q.p25 >= 10.0 && q.p90 <= 40.0);
}

#[test]
fn inverted_range_is_rejected() {
    let err = DateRange::new(date("2024-02-01"), date("2024-01-01")).expect_err("must fail");
    assert!(matches!(err, EngineError::InvalidRange { .. }));
}

#[test]
fn transactions_outside_range_are_excluded() {
    let rows = vec![
        txn("t1", "2023-12-31", 99.0),
        txn("t2", "2024-01-01", 10.0),
        txn("t3", "2024-01-02", 20.0),
        txn("t4", "2024-01-03", 99.0),
    ];
    let range = DateRange::new(date("2024-01-01"), date("2024-01-02")).unwrap();

    let summary = kpi::compute(&snapshot(rows), range).expect("kpi");
    assert_eq!(summary.order_count, 2);
    assert_eq!(summary.total_revenue, 30.0);
}

#[test]
fn category_and_payment_breakdowns_sort_descending() {
    let mut rows = vec![
        txn("t1", "2024-01-01", 10.0),
        txn("t2", "2024-01-01", 20.0),
    ];
    rows[0].product_category = "Beauty".to_string();
    rows[0].payment_method = "Crypto".to_string();
    let range = DateRange::new(date("2024-01-01"), date("2024-01-01")).unwrap();

    let summary = kpi::compute(&snapshot(rows), range).expect("kpi");
    assert_eq!(summary.revenue_by_category[0].category, "Toys");
    assert_eq!(summary.revenue_by_category[0].revenue, 20.0);
    assert_eq!(summary.revenue_by_category[1].category, "Beauty");
    assert_eq!(summary.orders_by_payment_method.len(), 2);
}
