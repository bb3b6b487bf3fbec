//! Annual financial-statement snapshots, most recent first.
//!
//! Every line item is optional: data providers routinely omit fields, and
//! the normalizer decides per field whether absence is fatal or defaults
//! to zero.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::FairValueResult;

/// Minimum number of annual periods the engine works with.
pub const MIN_PERIODS: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncomeStatement {
    pub total_revenue: Option<Money>,
    pub ebit: Option<Money>,
    pub pretax_income: Option<Money>,
    pub net_income: Option<Money>,
    pub interest_expense: Option<Money>,
    /// Effective tax rate as a fraction.
    pub tax_rate_for_calcs: Option<Rate>,
    pub diluted_average_shares: Option<Decimal>,
    pub diluted_eps: Option<Money>,
    pub research_and_development: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceSheet {
    pub current_assets: Option<Money>,
    pub current_liabilities: Option<Money>,
    pub current_debt: Option<Money>,
    pub cash_and_equivalents: Option<Money>,
    pub net_ppe: Option<Money>,
    pub total_debt: Option<Money>,
    pub stockholders_equity: Option<Money>,
    pub invested_capital: Option<Money>,
    pub goodwill_and_intangibles: Option<Money>,
}

/// Cash-flow items keep the provider's sign convention: outflows such as
/// dividends, capex and acquisitions are negative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CashFlowStatement {
    pub depreciation_amortization: Option<Money>,
    pub capital_expenditure: Option<Money>,
    pub purchase_of_business: Option<Money>,
    pub cash_dividends_paid: Option<Money>,
}

/// One fiscal period across all three statements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementSnapshot {
    pub period_end: Option<NaiveDate>,
    pub income: IncomeStatement,
    pub balance: BalanceSheet,
    /// `None` when the provider has no cash-flow statement for the period.
    pub cash_flow: Option<CashFlowStatement>,
}

/// Ordered annual history, most recent period first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StatementSnapshot>", into = "Vec<StatementSnapshot>")]
pub struct StatementHistory {
    periods: Vec<StatementSnapshot>,
}

impl StatementHistory {
    /// Build a history, requiring at least `MIN_PERIODS` snapshots of which
    /// the most recent `MIN_PERIODS` all carry a cash-flow statement.
    pub fn new(periods: Vec<StatementSnapshot>) -> FairValueResult<Self> {
        Self::with_min_periods(periods, MIN_PERIODS)
    }

    pub fn with_min_periods(
        periods: Vec<StatementSnapshot>,
        min_periods: usize,
    ) -> FairValueResult<Self> {
        if periods.len() < min_periods {
            return Err(ValuationError::InsufficientData(format!(
                "{} annual periods available, at least {min_periods} required",
                periods.len()
            )));
        }
        let cash_flow_periods = periods
            .iter()
            .take_while(|p| p.cash_flow.is_some())
            .count();
        if cash_flow_periods < min_periods {
            return Err(ValuationError::InsufficientData(format!(
                "{cash_flow_periods} consecutive cash-flow periods available, at least {min_periods} required"
            )));
        }
        if periods
            .windows(2)
            .any(|w| matches!((w[0].period_end, w[1].period_end), (Some(a), Some(b)) if a <= b))
        {
            return Err(ValuationError::InvalidInput {
                field: "periods".into(),
                reason: "statement periods must be ordered most recent first".into(),
            });
        }
        Ok(Self { periods })
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    pub fn periods(&self) -> &[StatementSnapshot] {
        &self.periods
    }

    pub fn latest(&self) -> &StatementSnapshot {
        // Construction guarantees at least one period.
        &self.periods[0]
    }

    /// Period `index` (0 = most recent), or `InsufficientData` when the
    /// history is shorter than the window a helper asked for.
    pub fn period(&self, index: usize) -> FairValueResult<&StatementSnapshot> {
        self.periods.get(index).ok_or_else(|| {
            ValuationError::InsufficientData(format!(
                "period {index} requested but only {} available",
                self.periods.len()
            ))
        })
    }

    /// The first `n` periods, failing if fewer exist.
    pub fn window(&self, n: usize) -> FairValueResult<&[StatementSnapshot]> {
        if n > self.periods.len() {
            return Err(ValuationError::InsufficientData(format!(
                "{n} periods requested but only {} available",
                self.periods.len()
            )));
        }
        Ok(&self.periods[..n])
    }

    pub fn cash_flow(&self, index: usize) -> FairValueResult<&CashFlowStatement> {
        self.period(index)?.cash_flow.as_ref().ok_or_else(|| {
            ValuationError::InsufficientData(format!("no cash-flow statement for period {index}"))
        })
    }
}

impl TryFrom<Vec<StatementSnapshot>> for StatementHistory {
    type Error = ValuationError;

    fn try_from(periods: Vec<StatementSnapshot>) -> Result<Self, Self::Error> {
        Self::new(periods)
    }
}

impl From<StatementHistory> for Vec<StatementSnapshot> {
    fn from(h: StatementHistory) -> Self {
        h.periods
    }
}

/// Unwrap a required line item or report which one is missing.
pub fn require(value: Option<Decimal>, field: &str, period: usize) -> FairValueResult<Decimal> {
    value.ok_or_else(|| ValuationError::MissingField {
        field: field.to_string(),
        period,
    })
}
