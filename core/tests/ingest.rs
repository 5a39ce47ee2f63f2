use commerce_core::{
    error::EngineError,
    ingest::{ingest_csv, ExperimentGroup},
};
use std::io::Cursor;

const HEADER: &str =
    "transaction_id,customer_id,purchase_date,purchase_amount,product_category,payment_method,experiment_group";

fn ingest(body: &str) -> (commerce_core::TransactionSnapshot, commerce_core::IngestReport) {
    let csv = format!("{HEADER}\n{body}");
    ingest_csv(Cursor::new(csv)).expect("ingest")
}

#[test]
fn valid_rows_ingest_and_sort_by_date() {
    let (snapshot, report) = ingest(
        "t3,c1,2024-01-03,30.0,Toys,Card,A\n\
         t1,c1,2024-01-01,10.0,Toys,Card,A\n\
         t2,c2,2024-01-02,20.0,Beauty,PayPal,B",
    );

    assert_eq!(report.total_rows, 3);
    assert_eq!(report.valid_rows, 3);
    assert_eq!(report.dropped_rows, 0);

    let ids: Vec<&str> = snapshot
        .transactions()
        .iter()
        .map(|t| t.transaction_id.as_str())
        .collect();
    assert_eq!(ids, vec!["t1", "t2", "t3"]);
}

#[test]
fn missing_required_column_is_a_schema_error() {
    let csv = "transaction_id,customer_id,purchase_amount,product_category,payment_method\n\
               t1,c1,10.0,Toys,Card";
    let err = ingest_csv(Cursor::new(csv)).expect_err("must fail");
    match err {
        EngineError::Schema(msg) => assert!(msg.contains("purchase_date"), "got: {msg}"),
        other => panic!("expected Schema error, got {other:?}"),
    }
}

#[test]
fn bad_rows_are_dropped_and_counted_not_fatal() {
    let (snapshot, report) = ingest(
        "t1,c1,2024-01-01,10.0,Toys,Card,A\n\
         t2,c2,not-a-date,20.0,Toys,Card,A\n\
         t3,c3,2024-01-02,-5.0,Toys,Card,B\n\
         t4,c4,2024-01-03,abc,Toys,Card,B\n\
         ,c5,2024-01-04,15.0,Toys,Card,\n\
         t6,c6,2024-01-05,25.0,Beauty,Crypto,B",
    );

    assert_eq!(report.total_rows, 6);
    assert_eq!(report.valid_rows, 2);
    assert_eq!(report.dropped_rows, 4);
    assert_eq!(snapshot.len(), 2);
}

#[test]
fn experiment_group_spellings_parse() {
    let (snapshot, _) = ingest(
        "t1,c1,2024-01-01,10.0,Toys,Card,A\n\
         t2,c2,2024-01-01,10.0,Toys,Card,Treatment\n\
         t3,c3,2024-01-01,10.0,Toys,Card,control\n\
         t4,c4,2024-01-01,10.0,Toys,Card,",
    );

    let groups: Vec<Option<ExperimentGroup>> = snapshot
        .transactions()
        .iter()
        .map(|t| t.experiment_group)
        .collect();
    assert_eq!(
        groups,
        vec![
            Some(ExperimentGroup::Control),
            Some(ExperimentGroup::Treatment),
            Some(ExperimentGroup::Control),
            None,
        ]
    );
}

#[test]
fn datetime_and_bare_date_both_parse() {
    let (snapshot, report) = ingest(
        "t1,c1,2024-01-01 13:45:00,10.0,Toys,Card,A\n\
         t2,c2,2024-01-02,20.0,Toys,Card,B",
    );
    assert_eq!(report.valid_rows, 2);
    assert_eq!(
        snapshot.transactions()[0].day(),
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    );
}
