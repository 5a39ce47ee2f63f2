//! KPI aggregation — revenue, order, and purchase-behavior rollups.
//!
//! Pure functions of (snapshot, range). No hidden state, no RNG.

use crate::{
    error::{EngineError, EngineResult},
    ingest::TransactionSnapshot,
    types::{Category, CustomerId},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive calendar date range. Construction enforces start <= end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> EngineResult<Self> {
        if start > end {
            return Err(EngineError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    /// Number of calendar days spanned, inclusive.
    pub fn num_days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRevenue {
    pub category: Category,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethodCount {
    pub payment_method: String,
    pub orders: u64,
}

/// Quantiles of total spend per customer over the range. All zero when the
/// range holds no orders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpendQuantiles {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub range: DateRange,
    pub total_revenue: f64,
    pub order_count: u64,
    /// total_revenue / order_count; 0 when there are no orders.
    pub average_order_value: f64,
    /// One point per calendar day in the range. Days without transactions
    /// appear with revenue 0 so the series stays contiguous for charting.
    pub daily_revenue: Vec<DailyRevenue>,
    /// Revenue contribution per product category, descending.
    pub revenue_by_category: Vec<CategoryRevenue>,
    /// Order volume per payment method, descending.
    pub orders_by_payment_method: Vec<PaymentMethodCount>,
    pub customer_spend_quantiles: SpendQuantiles,
}

/// Aggregate KPIs over the inclusive date range.
pub fn compute(snapshot: &TransactionSnapshot, range: DateRange) -> EngineResult<KpiSummary> {
    let mut total_revenue = 0.0;
    let mut order_count = 0u64;
    let mut by_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    let mut by_category: BTreeMap<Category, f64> = BTreeMap::new();
    let mut by_method: BTreeMap<String, u64> = BTreeMap::new();
    let mut by_customer: BTreeMap<CustomerId, f64> = BTreeMap::new();

    for txn in snapshot.transactions() {
        let day = txn.day();
        if !range.contains(day) {
            continue;
        }
        total_revenue += txn.purchase_amount;
        order_count += 1;
        *by_day.entry(day).or_insert(0.0) += txn.purchase_amount;
        *by_category.entry(txn.product_category.clone()).or_insert(0.0) += txn.purchase_amount;
        *by_method.entry(txn.payment_method.clone()).or_insert(0) += 1;
        *by_customer.entry(txn.customer_id.clone()).or_insert(0.0) += txn.purchase_amount;
    }

    let average_order_value = if order_count == 0 {
        0.0
    } else {
        total_revenue / order_count as f64
    };

    // Contiguous daily series, zero-filled.
    let mut daily_revenue = Vec::with_capacity(range.num_days());
    let mut day = range.start;
    loop {
        daily_revenue.push(DailyRevenue {
            date: day,
            revenue: by_day.get(&day).copied().unwrap_or(0.0),
        });
        if day == range.end {
            break;
        }
        day = match day.succ_opt() {
            Some(d) => d,
            None => break,
        };
    }

    let mut revenue_by_category: Vec<CategoryRevenue> = by_category
        .into_iter()
        .map(|(category, revenue)| CategoryRevenue { category, revenue })
        .collect();
    revenue_by_category
        .sort_by(|a, b| b.revenue.partial_cmp(&a.revenue).unwrap_or(std::cmp::Ordering::Equal));

    let mut orders_by_payment_method: Vec<PaymentMethodCount> = by_method
        .into_iter()
        .map(|(payment_method, orders)| PaymentMethodCount {
            payment_method,
            orders,
        })
        .collect();
    orders_by_payment_method.sort_by(|a, b| b.orders.cmp(&a.orders));

    let mut spends: Vec<f64> = by_customer.into_values().collect();
    spends.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let customer_spend_quantiles = SpendQuantiles {
        p25: quantile(&spends, 0.25),
        p50: quantile(&spends, 0.50),
        p75: quantile(&spends, 0.75),
        p90: quantile(&spends, 0.90),
    };

    log::info!(
        "kpi: {} orders, revenue {:.2} over {} days",
        order_count,
        total_revenue,
        daily_revenue.len()
    );

    Ok(KpiSummary {
        range,
        total_revenue,
        order_count,
        average_order_value,
        daily_revenue,
        revenue_by_category,
        orders_by_payment_method,
        customer_spend_quantiles,
    })
}

/// Linear-interpolation quantile over a pre-sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = pos - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}
