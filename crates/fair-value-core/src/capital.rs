//! Capital-structure estimator: cost of debt, cost of equity, WACC and the
//! return-on-capital measures.
//!
//! All outputs are percentages (8.5 = 8.5%). Callers convert with
//! `percent_to_rate` before feeding any of them into projection math.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ValuationAssumptions;
use crate::error::ValuationError;
use crate::normalize::average_invested_capital;
use crate::profile::CompanyProfile;
use crate::reference::{CompanyType, ReferenceTables};
use crate::statements::{require, IncomeStatement, StatementHistory};
use crate::types::{Money, Percent, Rate};
use crate::FairValueResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Where the operating income figure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingIncomeSource {
    Ebit,
    /// EBIT was not reported; pretax income stands in.
    PretaxIncome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostOfDebt {
    /// `None` when the market-cap backup table was used.
    pub company_type: Option<CompanyType>,
    /// `None` when interest expense is absent or zero.
    pub interest_coverage_ratio: Option<Decimal>,
    pub synthetic_rating: String,
    pub spread: Percent,
    pub cost_of_debt: Percent,
}

/// Market-value capital structure of one valuation run.
///
/// `enterprise_value == total_debt + equity_value` by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalStructure {
    pub cost_of_debt: Percent,
    pub cost_of_equity: Percent,
    pub wacc: Percent,
    pub enterprise_value: Money,
    pub equity_value: Money,
    pub total_debt: Money,
}

/// Everything the estimator derives for one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalEstimate {
    pub structure: CapitalStructure,
    pub debt: CostOfDebt,
    pub operating_income: Money,
    pub operating_income_source: OperatingIncomeSource,
    pub effective_tax_rate: Rate,
    pub nopat: Money,
    pub diluted_shares: Decimal,
    pub roic: Percent,
    pub roc: Percent,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl CapitalStructure {
    pub fn new(
        cost_of_debt: Percent,
        cost_of_equity: Percent,
        total_debt: Money,
        equity_value: Money,
    ) -> FairValueResult<Self> {
        let enterprise_value = total_debt + equity_value;
        if enterprise_value.is_zero() {
            return Err(ValuationError::DivisionByZero {
                context: "WACC weights (enterprise value)".into(),
            });
        }
        let wacc = cost_of_debt * (total_debt / enterprise_value)
            + cost_of_equity * (equity_value / enterprise_value);
        Ok(Self {
            cost_of_debt,
            cost_of_equity,
            wacc,
            enterprise_value,
            equity_value,
            total_debt,
        })
    }

    pub fn debt_weight(&self) -> Rate {
        self.total_debt / self.enterprise_value
    }

    pub fn equity_weight(&self) -> Rate {
        self.equity_value / self.enterprise_value
    }
}

/// Bucket a firm for the coverage-ratio spread tables.
pub fn classify_company(profile: &CompanyProfile, assumptions: &ValuationAssumptions) -> CompanyType {
    if profile.sector == assumptions.financial_sector {
        CompanyType::Financial
    } else if profile.market_cap < assumptions.small_cap_threshold {
        CompanyType::SmallNonFinancial
    } else {
        CompanyType::LargeNonFinancial
    }
}

/// EBIT of the latest period, falling back to pretax income.
pub fn resolve_operating_income(
    income: &IncomeStatement,
) -> FairValueResult<(Money, OperatingIncomeSource)> {
    match (income.ebit, income.pretax_income) {
        (Some(ebit), _) => Ok((ebit, OperatingIncomeSource::Ebit)),
        (None, Some(pretax)) => {
            warn!("EBIT not reported; using pretax income as operating income");
            Ok((pretax, OperatingIncomeSource::PretaxIncome))
        }
        (None, None) => Err(ValuationError::MissingField {
            field: "ebit".into(),
            period: 0,
        }),
    }
}

/// Cost of debt = default spread + risk-free rate.
///
/// With interest expense reported, the spread comes from the coverage table
/// for the firm's bucket; otherwise from the market-cap backup table.
pub fn estimate_cost_of_debt(
    operating_income: Money,
    interest_expense: Option<Money>,
    profile: &CompanyProfile,
    risk_free_rate: Percent,
    tables: &ReferenceTables,
    assumptions: &ValuationAssumptions,
) -> FairValueResult<CostOfDebt> {
    let (company_type, coverage, lookup) = match interest_expense {
        None => {
            warn!(
                market_cap = %profile.market_cap,
                "interest expense not reported; using market-cap backup spread"
            );
            (None, None, tables.spread_backup(profile.market_cap)?)
        }
        Some(interest) => {
            let company_type = classify_company(profile, assumptions);
            let coverage = if interest.is_zero() {
                None
            } else {
                Some(operating_income / interest)
            };
            let lookup = tables.spread_for_coverage(coverage, company_type)?;
            (Some(company_type), coverage, lookup)
        }
    };

    debug!(
        rating = %lookup.rating,
        spread = %lookup.spread,
        "synthetic rating resolved"
    );

    Ok(CostOfDebt {
        company_type,
        interest_coverage_ratio: coverage,
        synthetic_rating: lookup.rating,
        spread: lookup.spread,
        cost_of_debt: lookup.spread + risk_free_rate,
    })
}

/// Cost of equity = Rf + β × ERP + country risk premium.
pub fn estimate_cost_of_equity(
    risk_free_rate: Percent,
    beta: Decimal,
    country: &str,
    tables: &ReferenceTables,
    equity_risk_premium: Percent,
) -> FairValueResult<Percent> {
    let crp = tables.country_risk_premium(country)?;
    Ok(risk_free_rate + beta * equity_risk_premium + crp)
}

/// Return on invested capital, in percent.
pub fn roic(nopat: Money, average_invested_capital: Money) -> FairValueResult<Percent> {
    if average_invested_capital.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: "ROIC (average invested capital)".into(),
        });
    }
    Ok(nopat / average_invested_capital * dec!(100))
}

/// Return on capital after the country marginal tax, in percent.
pub fn roc(
    operating_income: Money,
    marginal_tax_rate: Rate,
    stockholders_equity: Money,
    total_debt: Money,
) -> FairValueResult<Percent> {
    let capital = stockholders_equity + total_debt;
    if capital.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: "ROC (book debt plus equity)".into(),
        });
    }
    Ok(operating_income * (Decimal::ONE - marginal_tax_rate) / capital * dec!(100))
}

/// Run the full estimator on the latest statements and live quote.
pub fn estimate_capital(
    history: &StatementHistory,
    profile: &CompanyProfile,
    risk_free_rate: Percent,
    tables: &ReferenceTables,
    assumptions: &ValuationAssumptions,
) -> FairValueResult<CapitalEstimate> {
    let latest = history.latest();
    let income = &latest.income;
    let balance = &latest.balance;

    let diluted_shares = require(income.diluted_average_shares, "diluted_average_shares", 0)?;
    let total_debt = require(balance.total_debt, "total_debt", 0)?;
    let effective_tax_rate = require(income.tax_rate_for_calcs, "tax_rate_for_calcs", 0)?;
    let (operating_income, operating_income_source) = resolve_operating_income(income)?;
    let nopat = operating_income * (Decimal::ONE - effective_tax_rate);

    let debt = estimate_cost_of_debt(
        operating_income,
        income.interest_expense,
        profile,
        risk_free_rate,
        tables,
        assumptions,
    )?;
    let cost_of_equity = estimate_cost_of_equity(
        risk_free_rate,
        profile.beta,
        &profile.country,
        tables,
        assumptions.equity_risk_premium,
    )?;

    let equity_value = diluted_shares * profile.regular_market_price;
    let structure = CapitalStructure::new(debt.cost_of_debt, cost_of_equity, total_debt, equity_value)?;

    let avg_ic = average_invested_capital(history, assumptions.windows.invested_capital)?;
    let roic = roic(nopat, avg_ic)?;

    let equity_book = require(balance.stockholders_equity, "stockholders_equity", 0)?;
    let marginal_tax = tables.country_tax_rate(&profile.country)?;
    let roc = roc(operating_income, marginal_tax, equity_book, total_debt)?;

    debug!(
        cost_of_debt = %structure.cost_of_debt,
        cost_of_equity = %structure.cost_of_equity,
        wacc = %structure.wacc,
        roic = %roic,
        roc = %roc,
        "capital structure estimated"
    );

    Ok(CapitalEstimate {
        structure,
        debt,
        operating_income,
        operating_income_source,
        effective_tax_rate,
        nopat,
        diluted_shares,
        roic,
        roc,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
