//! Top-level operations: fair value per share and market-implied growth.
//!
//! The free functions are pure over their inputs. `FairValueEngine` wires
//! them to a data provider and, optionally, a result cache.

use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::{CacheKey, InMemoryResultCache, ResultCache};
use crate::capital::{estimate_capital, CapitalEstimate, OperatingIncomeSource};
use crate::config::{ReturnOnCapitalBasis, ValuationAssumptions};
use crate::error::ValuationError;
use crate::normalize::{
    average_diluted_eps, average_payout_ratio, net_income_cagr, normalized_reinvestment,
    normalized_roe,
};
use crate::profile::CompanyProfile;
use crate::provider::{normalize_ticker, FinancialDataProvider};
use crate::reference::ReferenceTables;
use crate::statements::{require, StatementHistory};
use crate::types::{percent_to_rate, rate_to_percent, with_metadata, ComputationOutput, Money, Percent, Rate};
use crate::valuation::dcf::ProjectionPath;
use crate::valuation::excess_return::{terminal_roe, ExcessReturnModel};
use crate::valuation::fcfe::FcfeModel;
use crate::valuation::fcff::FcffModel;
use crate::valuation::regime::{select_regime, ValuationRegime};
use crate::valuation::reverse_dcf::{graham_value, solve_implied_growth, ReverseDcfModel};
use crate::valuation::{ModelDetail, ValuationModel};
use crate::FairValueResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything one company's valuation reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationInputs {
    pub profile: CompanyProfile,
    pub statements: StatementHistory,
    /// Percent.
    pub risk_free_rate: Percent,
}

/// Headline result of a fair-value run. Rates are in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub ticker: String,
    pub regime: ValuationRegime,
    pub cost_of_equity: Percent,
    pub cost_of_debt: Percent,
    pub wacc: Percent,
    pub roic: Percent,
    pub roc: Percent,
    pub fair_value_per_share: Money,
    pub expected_growth_rate: Percent,
}

/// Headline result plus the derivation behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairValueReport {
    pub valuation: ValuationResult,
    pub capital: CapitalEstimate,
    pub model: ModelDetail,
}

/// Growth the market price implies, and the Graham value it supports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpliedGrowthResult {
    pub ticker: String,
    /// Percent.
    pub implied_growth_rate: Percent,
    /// Percent.
    pub wacc: Percent,
    pub graham_fair_value: Money,
    pub average_diluted_eps: Money,
    pub enterprise_value: Money,
    pub reinvestment_rate: Rate,
    pub terminal_growth_rate: Rate,
    pub high_growth_period: u32,
}

#[derive(Serialize)]
struct FairValueAssumptions<'a> {
    high_growth_period: u32,
    stable_growth_period: u32,
    #[serde(flatten)]
    assumptions: &'a ValuationAssumptions,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Value one company: estimate capital costs, select the regime, run it.
pub fn compute_fair_value(
    ticker: &str,
    inputs: &ValuationInputs,
    high_growth_period: u32,
    stable_growth_period: u32,
    tables: &ReferenceTables,
    assumptions: &ValuationAssumptions,
) -> FairValueResult<ComputationOutput<FairValueReport>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let report = fair_value_report(
        ticker,
        inputs,
        high_growth_period,
        stable_growth_period,
        tables,
        assumptions,
        &mut warnings,
    )
    .map_err(ValuationError::into_top_level)?;

    info!(
        ticker = %report.valuation.ticker,
        regime = %report.valuation.regime,
        fair_value = %report.valuation.fair_value_per_share,
        "fair value computed"
    );

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology(report.valuation.regime),
        &FairValueAssumptions {
            high_growth_period,
            stable_growth_period,
            assumptions,
        },
        warnings,
        elapsed,
        report,
    ))
}

/// Solve for the constant growth that reproduces today's enterprise value.
///
/// `terminal_growth_rate` is a fraction.
pub fn compute_implied_growth(
    ticker: &str,
    inputs: &ValuationInputs,
    terminal_growth_rate: Rate,
    high_growth_period: u32,
    tables: &ReferenceTables,
    assumptions: &ValuationAssumptions,
) -> FairValueResult<ComputationOutput<ImpliedGrowthResult>> {
    let start = Instant::now();
    let mut warnings = Vec::new();

    let result = implied_growth_result(
        ticker,
        inputs,
        terminal_growth_rate,
        high_growth_period,
        tables,
        assumptions,
        &mut warnings,
    )
    .map_err(ValuationError::into_top_level)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Reverse DCF (Newton root-finding) with Graham formula",
        &serde_json::json!({
            "terminal_growth_rate": terminal_growth_rate.to_string(),
            "high_growth_period": high_growth_period,
            "solver": assumptions.solver,
            "equity_risk_premium": assumptions.equity_risk_premium.to_string(),
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Cost of capital and returns on capital, without running a model.
pub fn compute_capital(
    inputs: &ValuationInputs,
    tables: &ReferenceTables,
    assumptions: &ValuationAssumptions,
) -> FairValueResult<ComputationOutput<CapitalEstimate>> {
    let start = Instant::now();
    let mut warnings = Vec::new();
    let estimate = checked_preconditions(inputs, tables, assumptions)
        .and_then(|_| {
            estimate_capital(
                &inputs.statements,
                &inputs.profile,
                inputs.risk_free_rate,
                tables,
                assumptions,
            )
        })
        .map_err(ValuationError::into_top_level)?;
    capital_warnings(&estimate, &mut warnings);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "WACC with synthetic-rating cost of debt and CAPM cost of equity",
        assumptions,
        warnings,
        elapsed,
        estimate,
    ))
}

/// Which valuation path the company would take.
pub fn compute_regime(
    inputs: &ValuationInputs,
    assumptions: &ValuationAssumptions,
) -> FairValueResult<ValuationRegime> {
    select_regime(&inputs.profile, &inputs.statements, assumptions)
        .map_err(ValuationError::into_top_level)
}

/// Build the concrete model for `regime` from normalized inputs.
pub fn build_model(
    regime: ValuationRegime,
    inputs: &ValuationInputs,
    capital: &CapitalEstimate,
    high_growth_period: u32,
    stable_growth_period: u32,
    assumptions: &ValuationAssumptions,
) -> FairValueResult<ValuationModel> {
    let history = &inputs.statements;
    let latest = history.latest();

    let model = match regime {
        ValuationRegime::Fcff => {
            let return_on_capital = match assumptions.fcff_return_on_capital {
                ReturnOnCapitalBasis::Roc => capital.roc,
                ReturnOnCapitalBasis::Roic => capital.roic,
            };
            ValuationModel::Fcff(FcffModel {
                nopat: capital.nopat,
                reinvestment: normalized_reinvestment(history, capital.operating_income, assumptions)?,
                return_on_capital: percent_to_rate(return_on_capital),
                wacc: percent_to_rate(capital.structure.wacc),
                diluted_shares: capital.diluted_shares,
                terminal_growth_cap: assumptions.fcff_terminal_growth_cap,
                high_growth_period,
                stable_growth_period,
            })
        }
        ValuationRegime::Fcfe => ValuationModel::Fcfe(FcfeModel {
            net_income: require(latest.income.net_income, "net_income", 0)?,
            stockholders_equity: require(latest.balance.stockholders_equity, "stockholders_equity", 0)?,
            total_debt: capital.structure.total_debt,
            market_cap: inputs.profile.market_cap,
            reinvestment: normalized_reinvestment(history, capital.operating_income, assumptions)?,
            cost_of_equity: percent_to_rate(capital.structure.cost_of_equity),
            diluted_shares: capital.diluted_shares,
            terminal_roe: assumptions.fcfe_terminal_roe,
            terminal_growth_cap: assumptions.fcfe_terminal_growth_cap,
            high_growth_period,
            stable_growth_period,
        }),
        ValuationRegime::ExcessReturn => {
            let roe = normalized_roe(history, assumptions.windows.roe)?;
            let payout = average_payout_ratio(history, assumptions.windows.payout_ratio)?;
            let direct = assumptions.is_direct_roe_industry(&inputs.profile.industry_key);
            let cagr = if direct { None } else { net_income_cagr(history)? };
            ValuationModel::ExcessReturn(ExcessReturnModel {
                book_equity: require(latest.balance.stockholders_equity, "stockholders_equity", 0)?,
                cost_of_equity: percent_to_rate(capital.structure.cost_of_equity),
                normalized_roe: roe,
                payout_ratio: payout,
                terminal_roe: terminal_roe(roe, cagr, payout, direct),
                terminal_growth_rate: assumptions.excess_return_terminal_growth,
                high_growth_period,
                diluted_shares: capital.diluted_shares,
            })
        }
    };
    Ok(model)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs the top-level operations against a data provider.
#[derive(Debug)]
pub struct FairValueEngine<P> {
    provider: P,
    tables: ReferenceTables,
    assumptions: ValuationAssumptions,
    cache: Option<InMemoryResultCache<ComputationOutput<FairValueReport>>>,
}

impl<P: FinancialDataProvider> FairValueEngine<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            tables: ReferenceTables::default(),
            assumptions: ValuationAssumptions::default(),
            cache: None,
        }
    }

    pub fn with_tables(mut self, tables: ReferenceTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_assumptions(mut self, assumptions: ValuationAssumptions) -> Self {
        self.assumptions = assumptions;
        self
    }

    /// Memoize fair values per (ticker, horizons).
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(InMemoryResultCache::new());
        self
    }

    pub fn assumptions(&self) -> &ValuationAssumptions {
        &self.assumptions
    }

    pub fn tables(&self) -> &ReferenceTables {
        &self.tables
    }

    pub fn inputs(&self, ticker: &str) -> FairValueResult<ValuationInputs> {
        Ok(ValuationInputs {
            profile: self.provider.profile(ticker)?,
            statements: self.provider.statement_history(ticker)?,
            risk_free_rate: self.provider.risk_free_rate()?,
        })
    }

    pub fn fair_value(
        &self,
        ticker: &str,
        high_growth_period: u32,
        stable_growth_period: u32,
    ) -> FairValueResult<ComputationOutput<FairValueReport>> {
        let run = || {
            let inputs = self.inputs(ticker)?;
            compute_fair_value(
                &normalize_ticker(ticker),
                &inputs,
                high_growth_period,
                stable_growth_period,
                &self.tables,
                &self.assumptions,
            )
        };
        match &self.cache {
            Some(cache) => cache.get_or_compute(
                &CacheKey::new(ticker, high_growth_period, stable_growth_period),
                run,
            ),
            None => run(),
        }
    }

    /// Never cached: the answer moves with the live price.
    pub fn implied_growth(
        &self,
        ticker: &str,
        terminal_growth_rate: Rate,
        high_growth_period: u32,
    ) -> FairValueResult<ComputationOutput<ImpliedGrowthResult>> {
        let inputs = self.inputs(ticker)?;
        compute_implied_growth(
            &normalize_ticker(ticker),
            &inputs,
            terminal_growth_rate,
            high_growth_period,
            &self.tables,
            &self.assumptions,
        )
    }

    pub fn capital(&self, ticker: &str) -> FairValueResult<ComputationOutput<CapitalEstimate>> {
        compute_capital(&self.inputs(ticker)?, &self.tables, &self.assumptions)
    }

    pub fn regime(&self, ticker: &str) -> FairValueResult<ValuationRegime> {
        compute_regime(&self.inputs(ticker)?, &self.assumptions)
    }

    pub fn invalidate(&self, ticker: &str, high_growth_period: u32, stable_growth_period: u32) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&CacheKey::new(ticker, high_growth_period, stable_growth_period));
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn checked_preconditions(
    inputs: &ValuationInputs,
    tables: &ReferenceTables,
    assumptions: &ValuationAssumptions,
) -> FairValueResult<()> {
    assumptions.validate()?;
    tables.validate()?;
    let needed = assumptions.required_periods();
    if inputs.statements.len() < needed {
        return Err(ValuationError::InsufficientData(format!(
            "{needed} annual periods required, {} available",
            inputs.statements.len()
        )));
    }
    Ok(())
}

fn fair_value_report(
    ticker: &str,
    inputs: &ValuationInputs,
    high_growth_period: u32,
    stable_growth_period: u32,
    tables: &ReferenceTables,
    assumptions: &ValuationAssumptions,
    warnings: &mut Vec<String>,
) -> FairValueResult<FairValueReport> {
    checked_preconditions(inputs, tables, assumptions)?;

    let capital = estimate_capital(
        &inputs.statements,
        &inputs.profile,
        inputs.risk_free_rate,
        tables,
        assumptions,
    )?;
    capital_warnings(&capital, warnings);

    let regime = select_regime(&inputs.profile, &inputs.statements, assumptions)?;
    let model = build_model(
        regime,
        inputs,
        &capital,
        high_growth_period,
        stable_growth_period,
        assumptions,
    )?;
    let outcome = model.compute()?;
    model_warnings(&outcome.detail, warnings);

    let structure = &capital.structure;
    let valuation = ValuationResult {
        ticker: ticker.to_string(),
        regime,
        cost_of_equity: structure.cost_of_equity,
        cost_of_debt: structure.cost_of_debt,
        wacc: structure.wacc,
        roic: capital.roic,
        roc: capital.roc,
        fair_value_per_share: outcome.fair_value_per_share,
        expected_growth_rate: rate_to_percent(outcome.expected_growth_rate),
    };

    Ok(FairValueReport {
        valuation,
        capital,
        model: outcome.detail,
    })
}

fn implied_growth_result(
    ticker: &str,
    inputs: &ValuationInputs,
    terminal_growth_rate: Rate,
    high_growth_period: u32,
    tables: &ReferenceTables,
    assumptions: &ValuationAssumptions,
    warnings: &mut Vec<String>,
) -> FairValueResult<ImpliedGrowthResult> {
    checked_preconditions(inputs, tables, assumptions)?;

    let capital = estimate_capital(
        &inputs.statements,
        &inputs.profile,
        inputs.risk_free_rate,
        tables,
        assumptions,
    )?;
    capital_warnings(&capital, warnings);

    let reinvestment =
        normalized_reinvestment(&inputs.statements, capital.operating_income, assumptions)?;
    if capital.nopat.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: "reverse DCF reinvestment rate (NOPAT)".into(),
        });
    }
    let reinvestment_rate = reinvestment.total() / capital.nopat;
    let wacc = percent_to_rate(capital.structure.wacc);

    let model = ReverseDcfModel::new(
        capital.nopat,
        reinvestment_rate,
        wacc,
        terminal_growth_rate,
        high_growth_period,
    )?;
    let solved = solve_implied_growth(&model, capital.structure.enterprise_value, &assumptions.solver)?;

    let average_eps = average_diluted_eps(&inputs.statements, assumptions.windows.eps)?;
    let implied_growth_rate = rate_to_percent(solved.implied_growth_rate);
    if implied_growth_rate < Decimal::ZERO {
        warnings.push("Market price implies negative growth".into());
    }

    Ok(ImpliedGrowthResult {
        ticker: ticker.to_string(),
        implied_growth_rate,
        wacc: capital.structure.wacc,
        graham_fair_value: graham_value(average_eps, implied_growth_rate),
        average_diluted_eps: average_eps,
        enterprise_value: capital.structure.enterprise_value,
        reinvestment_rate,
        terminal_growth_rate,
        high_growth_period,
    })
}

fn capital_warnings(capital: &CapitalEstimate, warnings: &mut Vec<String>) {
    if capital.operating_income_source == OperatingIncomeSource::PretaxIncome {
        warnings.push("EBIT not reported; pretax income used as operating income".into());
    }
    if capital.debt.company_type.is_none() {
        warnings.push("Interest expense not reported; cost of debt from market-cap backup table".into());
    }
}

fn model_warnings(detail: &ModelDetail, warnings: &mut Vec<String>) {
    let path = match detail {
        ModelDetail::Fcff(v) => Some(v.projection.path),
        ModelDetail::Fcfe(v) => Some(v.projection.path),
        ModelDetail::ExcessReturn(_) => None,
    };
    if path == Some(ProjectionPath::NegativeFcfAdjusted) {
        warn!("reinvestment rate at or above 100%; growth fades through the high-growth phase");
        warnings.push("Reinvestment rate >= 100%: negative-FCF adjusted projection used".into());
    }
}

fn methodology(regime: ValuationRegime) -> &'static str {
    match regime {
        ValuationRegime::Fcff => "Two-stage FCFF discounted at WACC",
        ValuationRegime::Fcfe => "Two-stage FCFE discounted at cost of equity",
        ValuationRegime::ExcessReturn => "Excess-return model on book equity",
    }
}
