use chrono::NaiveDate;
use commerce_core::{
    error::EngineError,
    forecast,
    ingest::{Transaction, TransactionSnapshot},
    params::{AnalysisParams, DecompositionMode},
};

fn day(offset: u64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .checked_add_days(chrono::Days::new(offset))
        .unwrap()
}

/// `days` of history with a mild upward trend and a weekly rhythm
/// (weekends sell more).
fn history_snapshot(days: u64) -> TransactionSnapshot {
    let rows = (0..days)
        .map(|d| {
            let weekday_boost = if d % 7 >= 5 { 60.0 } else { 0.0 };
            Transaction {
                transaction_id: format!("t{d}"),
                customer_id: format!("cust-{}", d % 11),
                purchase_date: day(d).and_hms_opt(15, 0, 0).unwrap(),
                purchase_amount: 100.0 + d as f64 * 1.5 + weekday_boost,
                product_category: "Clothing".to_string(),
                payment_method: "Gift Card".to_string(),
                experiment_group: None,
            }
        })
        .collect();
    TransactionSnapshot::from_transactions(rows)
}

fn params(mode: DecompositionMode, horizon: usize) -> AnalysisParams {
    AnalysisParams {
        decomposition: mode,
        forecast_horizon_days: horizon,
        seasonal_period_days: 7,
        evaluation_window_days: 14,
        ..AnalysisParams::default()
    }
}

#[test]
fn horizon_length_matches_configuration() {
    let snapshot = history_snapshot(84);
    let report =
        forecast::forecast(&snapshot, &params(DecompositionMode::Additive, 30)).expect("forecast");

    assert_eq!(report.horizon_days, 30);
    let future: Vec<_> = report.points.iter().filter(|p| p.actual.is_none()).collect();
    assert_eq!(future.len(), 30);

    // Horizon dates are consecutive and start the day after history ends.
    assert_eq!(future[0].date, day(84));
    assert_eq!(future[29].date, day(113));
}

#[test]
fn bounds_bracket_the_point_forecast() {
    let snapshot = history_snapshot(84);
    let report =
        forecast::forecast(&snapshot, &params(DecompositionMode::Additive, 14)).expect("forecast");

    for p in &report.points {
        assert!(p.lower_bound <= p.predicted, "lower > point at {}", p.date);
        assert!(p.predicted <= p.upper_bound, "point > upper at {}", p.date);
        assert!(p.lower_bound >= 0.0);
    }
}

#[test]
fn accuracy_metrics_are_finite_and_non_negative() {
    for mode in [DecompositionMode::Additive, DecompositionMode::Multiplicative] {
        let snapshot = history_snapshot(70);
        let report = forecast::forecast(&snapshot, &params(mode, 30)).expect("forecast");
        assert!(report.mae.is_finite() && report.mae >= 0.0);
        assert!(report.rmse.is_finite() && report.rmse >= 0.0);
    }
}

#[test]
fn weekly_pattern_shows_up_in_the_seasonal_component() {
    let snapshot = history_snapshot(84);
    let report =
        forecast::forecast(&snapshot, &params(DecompositionMode::Additive, 7)).expect("forecast");

    let d = &report.decomposition;
    assert_eq!(d.dates.len(), 84);
    assert_eq!(d.trend.len(), 84);
    assert_eq!(d.seasonal.len(), 84);
    assert_eq!(d.residual.len(), 84);

    // Weekend phases (5, 6) carry a higher seasonal index than weekdays.
    let weekend = (d.seasonal[5] + d.seasonal[6]) / 2.0;
    let weekday = (0..5).map(|i| d.seasonal[i]).sum::<f64>() / 5.0;
    assert!(weekend > weekday + 20.0, "weekend {weekend} vs weekday {weekday}");
}

#[test]
fn trend_follows_the_upward_drift() {
    let snapshot = history_snapshot(84);
    let report =
        forecast::forecast(&snapshot, &params(DecompositionMode::Additive, 30)).expect("forecast");

    let future: Vec<_> = report.points.iter().filter(|p| p.actual.is_none()).collect();
    // Revenue drifts up by 1.5/day; four weeks out should be clearly
    // above one week out.
    assert!(future[29].predicted > future[1].predicted + 20.0);
}

#[test]
fn short_history_is_refused() {
    let snapshot = history_snapshot(10); // < 2 * 7 days
    let err = forecast::forecast(&snapshot, &params(DecompositionMode::Additive, 30))
        .expect_err("must refuse");
    match err {
        EngineError::InsufficientHistory {
            observed_days,
            required_days,
        } => {
            assert_eq!(observed_days, 10);
            assert_eq!(required_days, 14);
        }
        other => panic!("expected InsufficientHistory, got {other:?}"),
    }
}
