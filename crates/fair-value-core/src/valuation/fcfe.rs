//! Free cash flow to equity: net-income based, discounted at the cost of
//! equity. Used for non-financial firms with stable leverage.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValuationError;
use crate::normalize::NormalizedReinvestment;
use crate::types::{Money, Rate};
use crate::FairValueResult;

use super::dcf::{run_two_stage, GrowthFadeSchedule, TwoStageInput, TwoStageOutput};
use super::per_share;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcfeModel {
    pub net_income: Money,
    pub stockholders_equity: Money,
    pub total_debt: Money,
    pub market_cap: Money,
    pub reinvestment: NormalizedReinvestment,
    /// Fraction.
    pub cost_of_equity: Rate,
    pub diluted_shares: Decimal,
    pub terminal_roe: Rate,
    pub terminal_growth_cap: Rate,
    pub high_growth_period: u32,
    pub stable_growth_period: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcfeValuation {
    pub net_income: Money,
    pub debt_issued: Money,
    pub normalized_fcfe: Money,
    pub roe: Rate,
    pub reinvestment_rate: Rate,
    pub expected_growth_rate: Rate,
    pub schedule: GrowthFadeSchedule,
    pub projection: TwoStageOutput,
    pub value_of_equity: Money,
    pub value_per_share: Money,
}

impl FcfeModel {
    /// Share of reinvestment funded by new debt at the market debt ratio.
    pub fn debt_issued(&self) -> FairValueResult<Money> {
        let capital = self.total_debt + self.market_cap;
        if capital.is_zero() {
            return Err(ValuationError::DivisionByZero {
                context: "FCFE debt ratio (debt plus market cap)".into(),
            });
        }
        Ok(self.reinvestment.total() * (self.total_debt / capital))
    }

    pub fn compute(&self) -> FairValueResult<FcfeValuation> {
        if self.net_income.is_zero() {
            return Err(ValuationError::DivisionByZero {
                context: "FCFE reinvestment rate (net income)".into(),
            });
        }
        if self.stockholders_equity.is_zero() {
            return Err(ValuationError::DivisionByZero {
                context: "ROE (stockholders' equity)".into(),
            });
        }

        let debt_issued = self.debt_issued()?;
        let normalized_fcfe = self.net_income - self.reinvestment.net_capex
            - self.reinvestment.delta_nwc
            + debt_issued;
        let reinvestment_rate = Decimal::ONE - normalized_fcfe / self.net_income;
        let roe = self.net_income / self.stockholders_equity;
        let expected_growth_rate = reinvestment_rate * roe;

        let schedule = GrowthFadeSchedule::new(
            self.high_growth_period,
            self.stable_growth_period,
            expected_growth_rate,
            self.terminal_growth_cap,
        )?;

        debug!(
            roe = %roe,
            reinvestment_rate = %reinvestment_rate,
            expected_growth = %expected_growth_rate,
            "FCFE projection"
        );

        let projection = run_two_stage(&TwoStageInput {
            base: self.net_income,
            reinvestment_rate,
            return_on_capital: roe,
            terminal_return_on_capital: self.terminal_roe,
            discount_rate: self.cost_of_equity,
            schedule: schedule.clone(),
        })?;

        let value_of_equity = projection.value;
        Ok(FcfeValuation {
            net_income: self.net_income,
            debt_issued,
            normalized_fcfe,
            roe,
            reinvestment_rate,
            expected_growth_rate,
            schedule,
            value_per_share: per_share(value_of_equity, self.diluted_shares)?,
            projection,
            value_of_equity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn model() -> FcfeModel {
        FcfeModel {
            net_income: dec!(500),
            stockholders_equity: dec!(2500),
            total_debt: dec!(1000),
            market_cap: dec!(9000),
            reinvestment: NormalizedReinvestment {
                average_ebit: dec!(800),
                average_adjusted_net_capex: dec!(200),
                net_capex: dec!(200),
                net_working_capital: dec!(300),
                delta_nwc: dec!(50),
            },
            cost_of_equity: dec!(0.10),
            diluted_shares: dec!(50),
            terminal_roe: dec!(0.20),
            terminal_growth_cap: dec!(0.04),
            high_growth_period: 5,
            stable_growth_period: 5,
        }
    }

    #[test]
    fn test_fcfe_components() {
        let v = model().compute().unwrap();
        // debt ratio 0.1 of 250 reinvestment
        assert_eq!(v.debt_issued, dec!(25));
        // 500 - 200 - 50 + 25
        assert_eq!(v.normalized_fcfe, dec!(275));
        assert_eq!(v.reinvestment_rate, dec!(0.45));
        assert_eq!(v.roe, dec!(0.2));
        assert_eq!(v.expected_growth_rate, dec!(0.09));
        assert_eq!(v.schedule.terminal_growth_rate, dec!(0.04));
        // 0.04 / 0.20 = 0.2 < 0.45
        assert_eq!(v.projection.stable_reinvestment_rate, dec!(0.2));
        assert_eq!(v.value_per_share, v.value_of_equity / dec!(50));
    }

    #[test]
    fn test_cost_of_equity_below_terminal_growth_diverges() {
        let mut m = model();
        m.cost_of_equity = dec!(0.03);
        assert!(matches!(
            m.compute(),
            Err(ValuationError::DivergentTerminalValue { .. })
        ));
    }

    #[test]
    fn test_zero_net_income_rejected() {
        let mut m = model();
        m.net_income = Decimal::ZERO;
        assert!(m.compute().is_err());
    }
}
