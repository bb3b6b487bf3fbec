//! Statement normalizer.
//!
//! Turns raw, inconsistently populated statement snapshots into the averaged
//! and adjusted aggregates the cost-of-capital and valuation models consume.
//!
//! Documented zero defaults: missing current debt, R&D, acquisition spend
//! and goodwill. Any other absent line item inside a helper's window is a
//! `MissingField` error; fallbacks (e.g. pretax income for EBIT) are the
//! caller's business.

use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::config::ValuationAssumptions;
use crate::error::ValuationError;
use crate::statements::{require, BalanceSheet, StatementHistory};
use crate::types::{Money, Rate};
use crate::FairValueResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Normalized reinvestment needs of the latest year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReinvestment {
    pub average_ebit: Money,
    pub average_adjusted_net_capex: Money,
    /// Net capex scaled to the latest EBIT via the historical capex/EBIT ratio.
    pub net_capex: Money,
    pub net_working_capital: Money,
    /// NWC intensity of revenue applied to the latest revenue change.
    pub delta_nwc: Money,
}

impl NormalizedReinvestment {
    pub fn total(&self) -> Money {
        self.net_capex + self.delta_nwc
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn mean(values: &[Decimal]) -> FairValueResult<Decimal> {
    if values.is_empty() {
        return Err(ValuationError::InsufficientData(
            "cannot average an empty window".into(),
        ));
    }
    Ok(values.iter().sum::<Decimal>() / Decimal::from(values.len()))
}

fn divide(numerator: Decimal, denominator: Decimal, context: &str) -> FairValueResult<Decimal> {
    if denominator.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: context.to_string(),
        });
    }
    Ok(numerator / denominator)
}

/// Mean of invested capital plus goodwill/intangibles over the most recent
/// `periods` balance sheets.
pub fn average_invested_capital(history: &StatementHistory, periods: usize) -> FairValueResult<Money> {
    let values = history
        .window(periods)?
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let ic = require(p.balance.invested_capital, "invested_capital", i)?;
            Ok(ic + p.balance.goodwill_and_intangibles.unwrap_or(Decimal::ZERO))
        })
        .collect::<FairValueResult<Vec<_>>>()?;
    mean(&values)
}

/// Non-cash working capital of the latest period:
/// current assets − cash − (current liabilities − current debt).
pub fn net_working_capital(history: &StatementHistory) -> FairValueResult<Money> {
    let bs = &history.latest().balance;
    let current_assets = require(bs.current_assets, "current_assets", 0)?;
    let cash = require(bs.cash_and_equivalents, "cash_and_equivalents", 0)?;
    let current_liabilities = require(bs.current_liabilities, "current_liabilities", 0)?;
    let current_debt = bs.current_debt.unwrap_or(Decimal::ZERO);
    Ok(current_assets - cash - (current_liabilities - current_debt))
}

/// Change in net PP&E between two balance sheets. `period` is the index of
/// `now`, used for error reporting.
pub fn unadjusted_net_capex(
    now: &BalanceSheet,
    then: &BalanceSheet,
    period: usize,
) -> FairValueResult<Money> {
    let ppe_now = require(now.net_ppe, "net_ppe", period)?;
    let ppe_then = require(then.net_ppe, "net_ppe", period + 1)?;
    Ok(ppe_now - ppe_then)
}

/// Average over `periods` consecutive year pairs of
/// `ΔnetPPE + R&D × (1 − rd_amortization) + acquisitions × (1 − acquisition_amortization)`.
pub fn average_adjusted_net_capex(
    history: &StatementHistory,
    periods: usize,
    rd_amortization: Rate,
    acquisition_amortization: Rate,
) -> FairValueResult<Money> {
    // Each pair needs the following year's balance sheet as well.
    history.window(periods + 1)?;

    let mut values = Vec::with_capacity(periods);
    for i in 0..periods {
        let now = history.period(i)?;
        let then = history.period(i + 1)?;
        let rd = now
            .income
            .research_and_development
            .unwrap_or(Decimal::ZERO);
        // Acquisitions are reported as an outflow.
        let acquisitions = history
            .cash_flow(i)?
            .purchase_of_business
            .map(|v| -v)
            .unwrap_or(Decimal::ZERO);
        let unadjusted = unadjusted_net_capex(&now.balance, &then.balance, i)?;
        values.push(
            unadjusted
                + rd * (Decimal::ONE - rd_amortization)
                + acquisitions * (Decimal::ONE - acquisition_amortization),
        );
    }
    mean(&values)
}

/// Arithmetic mean of EBIT. No pretax-income substitution here.
pub fn average_ebit(history: &StatementHistory, periods: usize) -> FairValueResult<Money> {
    let values = history
        .window(periods)?
        .iter()
        .enumerate()
        .map(|(i, p)| require(p.income.ebit, "ebit", i))
        .collect::<FairValueResult<Vec<_>>>()?;
    mean(&values)
}

/// Mean of `−dividends paid / net income`.
pub fn average_payout_ratio(history: &StatementHistory, periods: usize) -> FairValueResult<Rate> {
    history.window(periods)?;
    let mut values = Vec::with_capacity(periods);
    for i in 0..periods {
        let ni = require(history.period(i)?.income.net_income, "net_income", i)?;
        let dividends = require(history.cash_flow(i)?.cash_dividends_paid, "cash_dividends_paid", i)?;
        values.push(divide(-dividends, ni, "payout ratio (net income)")?);
    }
    mean(&values)
}

/// Four-year compound growth of net income, `(NI₀ / NI₃)^(1/3) − 1`.
///
/// Returns `Ok(None)` when the growth is undefined: a non-positive base
/// year or a sign flip between the endpoints.
pub fn net_income_cagr(history: &StatementHistory) -> FairValueResult<Option<Rate>> {
    let ni_now = require(history.period(0)?.income.net_income, "net_income", 0)?;
    let ni_then = require(history.period(3)?.income.net_income, "net_income", 3)?;
    if ni_then <= Decimal::ZERO {
        return Ok(None);
    }
    let ratio = ni_now / ni_then;
    if ratio <= Decimal::ZERO {
        return Ok(None);
    }
    Ok(ratio
        .checked_powd(Decimal::ONE / dec!(3))
        .map(|g| g - Decimal::ONE))
}

/// Mean of `net income / stockholders' equity`.
pub fn normalized_roe(history: &StatementHistory, periods: usize) -> FairValueResult<Rate> {
    let values = history
        .window(periods)?
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let ni = require(p.income.net_income, "net_income", i)?;
            let equity = require(p.balance.stockholders_equity, "stockholders_equity", i)?;
            divide(ni, equity, "ROE (stockholders' equity)")
        })
        .collect::<FairValueResult<Vec<_>>>()?;
    mean(&values)
}

/// Mean diluted EPS.
pub fn average_diluted_eps(history: &StatementHistory, periods: usize) -> FairValueResult<Money> {
    let values = history
        .window(periods)?
        .iter()
        .enumerate()
        .map(|(i, p)| require(p.income.diluted_eps, "diluted_eps", i))
        .collect::<FairValueResult<Vec<_>>>()?;
    mean(&values)
}

/// Total debt / stockholders' equity per period.
pub fn leverage_ratios(history: &StatementHistory, periods: usize) -> FairValueResult<Vec<Decimal>> {
    history
        .window(periods)?
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let debt = require(p.balance.total_debt, "total_debt", i)?;
            let equity = require(p.balance.stockholders_equity, "stockholders_equity", i)?;
            divide(debt, equity, "leverage ratio (stockholders' equity)")
        })
        .collect()
}

/// Population coefficient of variation over the signed mean, so a negative
/// mean gives a negative ratio. `None` when the mean is zero.
pub fn coefficient_of_variation(values: &[Decimal]) -> FairValueResult<Option<Decimal>> {
    let m = mean(values)?;
    if m.is_zero() {
        return Ok(None);
    }
    let n = Decimal::from(values.len());
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<Decimal>() / n;
    let std_dev = variance.sqrt().ok_or_else(|| ValuationError::InvalidInput {
        field: "variance".into(),
        reason: "square root of variance is undefined".into(),
    })?;
    Ok(Some(std_dev / m))
}

/// True when the ratios' coefficient of variation is below `threshold`.
/// A zero mean (no debt in any period) counts as unstable.
pub fn is_leverage_stable(ratios: &[Decimal], threshold: Decimal) -> FairValueResult<bool> {
    Ok(matches!(coefficient_of_variation(ratios)?, Some(cv) if cv < threshold))
}

/// Regime-selection signal: is the debt/equity ratio stable over `periods`?
pub fn leverage_stability(
    history: &StatementHistory,
    periods: usize,
    threshold: Decimal,
) -> FairValueResult<bool> {
    is_leverage_stable(&leverage_ratios(history, periods)?, threshold)
}

/// Latest-year reinvestment normalized against history. `ebit` is the
/// latest operating income after any top-level fallback.
pub fn normalized_reinvestment(
    history: &StatementHistory,
    ebit: Money,
    assumptions: &ValuationAssumptions,
) -> FairValueResult<NormalizedReinvestment> {
    let average_ebit = average_ebit(history, assumptions.windows.ebit)?;
    let average_adjusted_net_capex = average_adjusted_net_capex(
        history,
        assumptions.windows.net_capex,
        assumptions.rd_amortization,
        assumptions.acquisition_amortization,
    )?;
    let net_capex = divide(
        average_adjusted_net_capex,
        average_ebit,
        "net capex / EBIT ratio (average EBIT)",
    )? * ebit;

    let nwc = net_working_capital(history)?;
    let revenue_now = require(history.period(0)?.income.total_revenue, "total_revenue", 0)?;
    let revenue_prev = require(history.period(1)?.income.total_revenue, "total_revenue", 1)?;
    let delta_nwc = divide(nwc, revenue_now, "NWC intensity (latest revenue)")?
        * (revenue_now - revenue_prev);

    Ok(NormalizedReinvestment {
        average_ebit,
        average_adjusted_net_capex,
        net_capex,
        net_working_capital: nwc,
        delta_nwc,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statements::{
        CashFlowStatement, IncomeStatement, StatementSnapshot,
    };

    fn approx(a: Decimal, b: Decimal, eps: Decimal) -> bool {
        (a - b).abs() < eps
    }

    fn history_with(f: impl Fn(usize, &mut StatementSnapshot)) -> StatementHistory {
        let periods = (0..4)
            .map(|i| {
                let mut s = StatementSnapshot {
                    cash_flow: Some(CashFlowStatement::default()),
                    ..Default::default()
                };
                f(i, &mut s);
                s
            })
            .collect();
        StatementHistory::new(periods).unwrap()
    }

    #[test]
    fn test_average_ebit() {
        let ebits = [dec!(100), dec!(95), dec!(90), dec!(85)];
        let h = history_with(|i, s| s.income.ebit = Some(ebits[i]));
        assert_eq!(average_ebit(&h, 4).unwrap(), dec!(92.5));
    }

    #[test]
    fn test_average_ebit_missing_period() {
        let h = history_with(|i, s| {
            if i != 2 {
                s.income.ebit = Some(dec!(10));
            }
        });
        assert_eq!(
            average_ebit(&h, 4).unwrap_err(),
            ValuationError::MissingField {
                field: "ebit".into(),
                period: 2
            }
        );
    }

    #[test]
    fn test_net_working_capital() {
        let h = history_with(|_, s| {
            s.balance.current_assets = Some(dec!(500));
            s.balance.cash_and_equivalents = Some(dec!(50));
            s.balance.current_liabilities = Some(dec!(300));
            s.balance.current_debt = Some(dec!(20));
        });
        assert_eq!(net_working_capital(&h).unwrap(), dec!(170));
    }

    #[test]
    fn test_net_working_capital_missing_current_debt_is_zero() {
        let h = history_with(|_, s| {
            s.balance.current_assets = Some(dec!(500));
            s.balance.cash_and_equivalents = Some(dec!(50));
            s.balance.current_liabilities = Some(dec!(300));
        });
        assert_eq!(net_working_capital(&h).unwrap(), dec!(150));
    }

    #[test]
    fn test_average_invested_capital_defaults_goodwill() {
        let h = history_with(|i, s| {
            s.balance.invested_capital = Some(dec!(1000) - Decimal::from(i as i64) * dec!(100));
            if i == 0 {
                s.balance.goodwill_and_intangibles = Some(dec!(50));
            }
        });
        // ((1000 + 50) + 900) / 2
        assert_eq!(average_invested_capital(&h, 2).unwrap(), dec!(975));
    }

    #[test]
    fn test_unadjusted_net_capex() {
        let now = BalanceSheet {
            net_ppe: Some(dec!(120)),
            ..Default::default()
        };
        let then = BalanceSheet {
            net_ppe: Some(dec!(100)),
            ..Default::default()
        };
        assert_eq!(unadjusted_net_capex(&now, &then, 0).unwrap(), dec!(20));
    }

    #[test]
    fn test_average_adjusted_net_capex() {
        let ppe = [dec!(130), dec!(120), dec!(110), dec!(100)];
        let h = history_with(|i, s| {
            s.balance.net_ppe = Some(ppe[i]);
            s.income = IncomeStatement {
                research_and_development: if i == 0 { Some(dec!(50)) } else { None },
                ..Default::default()
            };
            s.cash_flow = Some(CashFlowStatement {
                purchase_of_business: if i == 1 { Some(dec!(-40)) } else { None },
                ..Default::default()
            });
        });
        // pair 0: 10 + 50*0.8 = 50; pair 1: 10 + 40*0.925 = 47; pair 2: 10
        let avg = average_adjusted_net_capex(&h, 3, dec!(0.20), dec!(0.075)).unwrap();
        assert_eq!(avg, dec!(107) / dec!(3));
    }

    #[test]
    fn test_average_payout_ratio() {
        let h = history_with(|_, s| {
            s.income.net_income = Some(dec!(100));
            s.cash_flow = Some(CashFlowStatement {
                cash_dividends_paid: Some(dec!(-40)),
                ..Default::default()
            });
        });
        assert_eq!(average_payout_ratio(&h, 4).unwrap(), dec!(0.4));
    }

    #[test]
    fn test_net_income_cagr() {
        let ni = [dec!(133.1), dec!(121), dec!(110), dec!(100)];
        let h = history_with(|i, s| s.income.net_income = Some(ni[i]));
        let g = net_income_cagr(&h).unwrap().unwrap();
        assert!(approx(g, dec!(0.10), dec!(0.000001)), "got {g}");
    }

    #[test]
    fn test_net_income_cagr_undefined_for_non_positive_base() {
        let ni = [dec!(100), dec!(50), dec!(10), dec!(-20)];
        let h = history_with(|i, s| s.income.net_income = Some(ni[i]));
        assert_eq!(net_income_cagr(&h).unwrap(), None);

        let ni = [dec!(-100), dec!(50), dec!(10), dec!(20)];
        let h = history_with(|i, s| s.income.net_income = Some(ni[i]));
        assert_eq!(net_income_cagr(&h).unwrap(), None);
    }

    #[test]
    fn test_leverage_stable() {
        let ratios = [dec!(0.50), dec!(0.52), dec!(0.49), dec!(0.51)];
        let cv = coefficient_of_variation(&ratios).unwrap().unwrap();
        assert!(approx(cv, dec!(0.0221), dec!(0.001)), "cv {cv}");
        assert!(is_leverage_stable(&ratios, dec!(0.10)).unwrap());
    }

    #[test]
    fn test_leverage_unstable() {
        let ratios = [dec!(0.3), dec!(0.9), dec!(0.2), dec!(1.1)];
        assert!(!is_leverage_stable(&ratios, dec!(0.10)).unwrap());
    }

    #[test]
    fn test_negative_equity_leverage_is_stable() {
        let ratios = [dec!(-0.3), dec!(-0.9), dec!(-0.2), dec!(-1.1)];
        let cv = coefficient_of_variation(&ratios).unwrap().unwrap();
        assert!(cv.is_sign_negative(), "cv {cv}");
        assert!(is_leverage_stable(&ratios, dec!(0.10)).unwrap());
    }

    #[test]
    fn test_leverage_zero_debt_is_unstable() {
        let ratios = [dec!(0); 4];
        assert!(!is_leverage_stable(&ratios, dec!(0.10)).unwrap());
    }

    #[test]
    fn test_leverage_stability_from_statements() {
        let debt = [dec!(50), dec!(52), dec!(49), dec!(51)];
        let h = history_with(|i, s| {
            s.balance.total_debt = Some(debt[i]);
            s.balance.stockholders_equity = Some(dec!(100));
        });
        assert!(leverage_stability(&h, 4, dec!(0.10)).unwrap());
    }

    #[test]
    fn test_normalized_roe() {
        let h = history_with(|i, s| {
            s.income.net_income = Some(if i % 2 == 0 { dec!(10) } else { dec!(20) });
            s.balance.stockholders_equity = Some(dec!(100));
        });
        assert_eq!(normalized_roe(&h, 4).unwrap(), dec!(0.15));
    }

    #[test]
    fn test_average_diluted_eps() {
        let eps = [dec!(4), dec!(3), dec!(2), dec!(1)];
        let h = history_with(|i, s| s.income.diluted_eps = Some(eps[i]));
        assert_eq!(average_diluted_eps(&h, 4).unwrap(), dec!(2.5));
    }

    #[test]
    fn test_normalized_reinvestment() {
        let h = history_with(|i, s| {
            s.income.ebit = Some(dec!(100));
            s.income.total_revenue = Some(if i == 0 { dec!(1100) } else { dec!(1000) });
            s.balance.net_ppe = Some(dec!(500) - Decimal::from(i as i64) * dec!(20));
            s.balance.current_assets = Some(dec!(400));
            s.balance.cash_and_equivalents = Some(dec!(100));
            s.balance.current_liabilities = Some(dec!(80));
        });
        let r = normalized_reinvestment(&h, dec!(100), &ValuationAssumptions::default()).unwrap();
        assert_eq!(r.net_capex, dec!(20));
        assert_eq!(r.net_working_capital, dec!(220));
        // 220 / 1100 * 100 = 20
        assert_eq!(r.delta_nwc, dec!(20));
        assert_eq!(r.total(), dec!(40));
    }
}
