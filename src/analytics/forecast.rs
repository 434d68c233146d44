use std::collections::BTreeMap;

use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;

use crate::models::{FinanceTransaction, TransactionKind};

pub const HISTORY_MONTHS: u32 = 6;
pub const FORECAST_MONTHS: u32 = 3;
/// Upper bound for either window, ten years.
pub const MAX_MONTHS: u32 = 120;
/// How many of the latest observed months feed the average delta.
const TREND_SPAN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FinanceHealth {
    #[serde(rename = "안정")]
    Stable,
    #[serde(rename = "주의")]
    Caution,
    #[serde(rename = "위험")]
    Risk,
}

impl FinanceHealth {
    pub fn label(self) -> &'static str {
        match self {
            FinanceHealth::Stable => "안정",
            FinanceHealth::Caution => "주의",
            FinanceHealth::Risk => "위험",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyFinance {
    pub month: String,
    pub label: String,
    pub income: i64,
    pub expense: i64,
    pub net: i64,
    pub is_forecast: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinanceForecast {
    pub months: Vec<MonthlyFinance>,
    pub projected_balance: i64,
    pub health: FinanceHealth,
}

#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    income: i64,
    expense: i64,
}

/// Monthly income/expense for the trailing history window, followed by a
/// linear projection for future months that have no recorded transactions.
/// Both windows are clamped to `MAX_MONTHS`.
pub fn forecast_finances(
    transactions: &[FinanceTransaction],
    today: NaiveDate,
    history_months: u32,
    forecast_months: u32,
) -> FinanceForecast {
    let history_months = history_months.clamp(1, MAX_MONTHS);
    let forecast_months = forecast_months.min(MAX_MONTHS);
    let current = first_of_month(today);
    let start = current
        .checked_sub_months(Months::new(history_months - 1))
        .unwrap_or(NaiveDate::MIN);
    let end = current
        .checked_add_months(Months::new(forecast_months))
        .unwrap_or(NaiveDate::MAX);

    let mut buckets: BTreeMap<NaiveDate, Totals> = BTreeMap::new();
    for tx in transactions {
        let month = first_of_month(tx.transaction_date);
        if month < start || month > end {
            continue;
        }
        let entry = buckets.entry(month).or_default();
        match tx.kind {
            TransactionKind::Income => entry.income += tx.amount,
            TransactionKind::Expense => entry.expense += tx.amount,
        }
    }

    let observed: Vec<(NaiveDate, Totals)> = buckets
        .range(start..=current)
        .map(|(month, totals)| (*month, *totals))
        .collect();
    let trend = Trend::from_observed(&observed);

    let mut months = Vec::new();
    let mut month = start;
    while month <= end {
        let entry = match buckets.get(&month) {
            Some(totals) => monthly(month, *totals, false),
            None if month > current => monthly(month, trend.project(month), true),
            None => monthly(month, Totals::default(), false),
        };
        months.push(entry);
        match month.checked_add_months(Months::new(1)) {
            Some(next) => month = next,
            None => break,
        }
    }

    let projected_balance: i64 = months.iter().map(|m| m.net).sum();
    let latest_observed_negative = observed
        .last()
        .map(|(_, totals)| totals.income - totals.expense < 0)
        .unwrap_or(false);
    let forecast_negative = months.iter().any(|m| m.is_forecast && m.net < 0);

    let health = if projected_balance < 0 {
        FinanceHealth::Risk
    } else if forecast_negative || latest_observed_negative {
        FinanceHealth::Caution
    } else {
        FinanceHealth::Stable
    };

    FinanceForecast {
        months,
        projected_balance,
        health,
    }
}

struct Trend {
    anchor: Option<(NaiveDate, Totals)>,
    income_delta: f64,
    expense_delta: f64,
}

impl Trend {
    fn from_observed(observed: &[(NaiveDate, Totals)]) -> Self {
        let recent = &observed[observed.len().saturating_sub(TREND_SPAN)..];
        let steps = recent.len().saturating_sub(1);
        let (income_delta, expense_delta) = if steps == 0 {
            (0.0, 0.0)
        } else {
            let first = recent[0].1;
            let last = recent[recent.len() - 1].1;
            (
                (last.income - first.income) as f64 / steps as f64,
                (last.expense - first.expense) as f64 / steps as f64,
            )
        };

        Trend {
            anchor: recent.last().copied(),
            income_delta,
            expense_delta,
        }
    }

    fn project(&self, month: NaiveDate) -> Totals {
        let Some((anchor_month, base)) = self.anchor else {
            return Totals::default();
        };
        let k = months_between(anchor_month, month) as f64;
        Totals {
            income: (base.income as f64 + self.income_delta * k).round().max(0.0) as i64,
            expense: (base.expense as f64 + self.expense_delta * k).round().max(0.0) as i64,
        }
    }
}

fn monthly(month: NaiveDate, totals: Totals, is_forecast: bool) -> MonthlyFinance {
    MonthlyFinance {
        month: month.format("%Y-%m").to_string(),
        label: format!("{}월", month.month()),
        income: totals.income,
        expense: totals.expense,
        net: totals.income - totals.expense,
        is_forecast,
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    (to.year() - from.year()) * 12 + to.month() as i32 - from.month() as i32
}
