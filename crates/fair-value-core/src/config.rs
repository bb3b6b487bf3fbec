//! Tunable valuation assumptions.
//!
//! Every constant the models lean on (equity risk premium, amortization
//! fractions, terminal ROE, growth caps, regime threshold) lives here and is
//! threaded into each computation explicitly. `Default` reproduces the
//! documented values.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{Money, Percent, Rate};
use crate::FairValueResult;

/// Which return-on-capital measure drives FCFF expected growth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnOnCapitalBasis {
    /// EBIT after the country marginal tax over book debt plus equity.
    #[default]
    Roc,
    /// NOPAT over average invested capital.
    Roic,
}

/// Number of historical periods each averaging helper consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AveragingWindows {
    pub ebit: usize,
    pub invested_capital: usize,
    pub net_capex: usize,
    pub payout_ratio: usize,
    pub roe: usize,
    pub leverage: usize,
    pub eps: usize,
}

impl Default for AveragingWindows {
    fn default() -> Self {
        Self {
            ebit: 4,
            invested_capital: 2,
            net_capex: 3,
            payout_ratio: 4,
            roe: 4,
            leverage: 4,
            eps: 4,
        }
    }
}

/// Bounded Newton iteration settings for the reverse-DCF solver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub initial_guess: Rate,
    pub max_iterations: u32,
    /// Convergence threshold on the growth-rate step.
    pub tolerance: Decimal,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            initial_guess: dec!(0.10),
            max_iterations: 100,
            tolerance: dec!(0.000001),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValuationAssumptions {
    /// Mature-market equity risk premium, in percent.
    pub equity_risk_premium: Percent,
    /// Fraction of R&D treated as amortized (not capitalized) each year.
    pub rd_amortization: Rate,
    /// Fraction of acquisition spend treated as amortized each year.
    pub acquisition_amortization: Rate,
    /// Long-run ROE assumed for the FCFE stable reinvestment rate.
    pub fcfe_terminal_roe: Rate,
    pub fcfe_terminal_growth_cap: Rate,
    pub fcff_terminal_growth_cap: Rate,
    pub excess_return_terminal_growth: Rate,
    /// Debt/equity coefficient-of-variation threshold below which leverage
    /// counts as stable.
    pub leverage_cv_threshold: Decimal,
    /// Market capitalization below which a non-financial firm uses the
    /// small-firm spread table.
    pub small_cap_threshold: Money,
    pub financial_sector: String,
    pub financial_sector_key: String,
    /// Industries whose terminal ROE is the normalized ROE itself.
    pub direct_roe_industries: Vec<String>,
    pub fcff_return_on_capital: ReturnOnCapitalBasis,
    pub windows: AveragingWindows,
    pub solver: SolverConfig,
}

impl Default for ValuationAssumptions {
    fn default() -> Self {
        Self {
            equity_risk_premium: dec!(4.02),
            rd_amortization: dec!(0.20),
            acquisition_amortization: dec!(0.075),
            fcfe_terminal_roe: dec!(0.20),
            fcfe_terminal_growth_cap: dec!(0.04),
            fcff_terminal_growth_cap: dec!(0.05),
            excess_return_terminal_growth: dec!(0.05),
            leverage_cv_threshold: dec!(0.10),
            small_cap_threshold: dec!(2_000_000_000),
            financial_sector: "Financial Services".into(),
            financial_sector_key: "financial-services".into(),
            direct_roe_industries: vec![
                "banks-diversified".into(),
                "banks-regional".into(),
                "capital-markets".into(),
            ],
            fcff_return_on_capital: ReturnOnCapitalBasis::Roc,
            windows: AveragingWindows::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl ValuationAssumptions {
    /// Reject assumption sets that would make the models meaningless.
    pub fn validate(&self) -> FairValueResult<()> {
        let unit = |field: &str, v: Rate| -> FairValueResult<()> {
            if v < Decimal::ZERO || v > Decimal::ONE {
                return Err(ValuationError::Configuration(format!(
                    "{field} must be between 0 and 1, got {v}"
                )));
            }
            Ok(())
        };
        unit("rd_amortization", self.rd_amortization)?;
        unit("acquisition_amortization", self.acquisition_amortization)?;

        if self.equity_risk_premium < Decimal::ZERO {
            return Err(ValuationError::Configuration(
                "equity_risk_premium cannot be negative".into(),
            ));
        }
        if self.fcfe_terminal_roe <= Decimal::ZERO {
            return Err(ValuationError::Configuration(
                "fcfe_terminal_roe must be positive".into(),
            ));
        }
        if self.leverage_cv_threshold <= Decimal::ZERO {
            return Err(ValuationError::Configuration(
                "leverage_cv_threshold must be positive".into(),
            ));
        }
        let w = &self.windows;
        if [w.ebit, w.invested_capital, w.net_capex, w.payout_ratio, w.roe, w.leverage, w.eps]
            .contains(&0)
        {
            return Err(ValuationError::Configuration(
                "averaging windows must cover at least one period".into(),
            ));
        }
        if self.solver.max_iterations == 0 || self.solver.tolerance <= Decimal::ZERO {
            return Err(ValuationError::Configuration(
                "solver needs a positive iteration budget and tolerance".into(),
            ));
        }
        Ok(())
    }

    /// Longest history (in periods) any helper will read.
    pub fn required_periods(&self) -> usize {
        let w = &self.windows;
        [
            w.ebit,
            w.invested_capital,
            w.net_capex + 1,
            w.payout_ratio,
            w.roe,
            w.leverage,
            w.eps,
            // NI CAGR compares period 0 against period 3.
            4,
        ]
        .into_iter()
        .max()
        .unwrap_or(4)
    }

    pub fn is_direct_roe_industry(&self, industry_key: &str) -> bool {
        self.direct_roe_industries.iter().any(|i| i == industry_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let a = ValuationAssumptions::default();
        assert_eq!(a.equity_risk_premium, dec!(4.02));
        assert_eq!(a.rd_amortization, dec!(0.20));
        assert_eq!(a.acquisition_amortization, dec!(0.075));
        assert_eq!(a.fcfe_terminal_roe, dec!(0.20));
        assert_eq!(a.leverage_cv_threshold, dec!(0.10));
        assert_eq!(a.solver.max_iterations, 100);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_required_periods_default_is_four() {
        assert_eq!(ValuationAssumptions::default().required_periods(), 4);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let a: ValuationAssumptions =
            serde_json::from_str(r#"{"equity_risk_premium": "5.5"}"#).unwrap();
        assert_eq!(a.equity_risk_premium, dec!(5.5));
        assert_eq!(a.fcff_terminal_growth_cap, dec!(0.05));
        assert_eq!(a.windows.ebit, 4);
    }

    #[test]
    fn test_invalid_amortization_rejected() {
        let a = ValuationAssumptions {
            rd_amortization: dec!(1.5),
            ..Default::default()
        };
        assert!(matches!(a.validate(), Err(ValuationError::Configuration(_))));
    }

    #[test]
    fn test_direct_roe_industry() {
        let a = ValuationAssumptions::default();
        assert!(a.is_direct_roe_industry("banks-regional"));
        assert!(!a.is_direct_roe_industry("insurance-life"));
    }
}
