//! Free cash flow to the firm: NOPAT-based, discounted at WACC. Used for
//! non-financial firms whose leverage moves around.

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
pub struct FcffModel {
    pub nopat: Money,
    pub reinvestment: NormalizedReinvestment,
    /// Fraction; ROC or ROIC depending on configuration.
    pub return_on_capital: Rate,
    /// Fraction.
    pub wacc: Rate,
    pub diluted_shares: Decimal,
    pub terminal_growth_cap: Rate,
    pub high_growth_period: u32,
    pub stable_growth_period: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcffValuation {
    pub nopat: Money,
    pub reinvestment_rate: Rate,
    pub expected_growth_rate: Rate,
    pub schedule: GrowthFadeSchedule,
    pub projection: TwoStageOutput,
    pub value_of_firm: Money,
    pub value_per_share: Money,
}

impl FcffModel {
    /// Reinvestment rate = (ΔNWC + net capex) / NOPAT.
    pub fn reinvestment_rate(&self) -> FairValueResult<Rate> {
        if self.nopat.is_zero() {
            return Err(ValuationError::DivisionByZero {
                context: "FCFF reinvestment rate (NOPAT)".into(),
            });
        }
        Ok(self.reinvestment.total() / self.nopat)
    }

    pub fn compute(&self) -> FairValueResult<FcffValuation> {
        let reinvestment_rate = self.reinvestment_rate()?;
        let expected_growth_rate = reinvestment_rate * self.return_on_capital;
        let schedule = GrowthFadeSchedule::new(
            self.high_growth_period,
            self.stable_growth_period,
            expected_growth_rate,
            self.terminal_growth_cap,
        )?;

        debug!(
            reinvestment_rate = %reinvestment_rate,
            expected_growth = %expected_growth_rate,
            terminal_growth = %schedule.terminal_growth_rate,
            "FCFF projection"
        );

        let projection = run_two_stage(&TwoStageInput {
            base: self.nopat,
            reinvestment_rate,
            return_on_capital: self.return_on_capital,
            terminal_return_on_capital: self.wacc,
            discount_rate: self.wacc,
            schedule: schedule.clone(),
        })?;

        let value_of_firm = projection.value;
        Ok(FcffValuation {
            nopat: self.nopat,
            reinvestment_rate,
            expected_growth_rate,
            schedule,
            value_per_share: per_share(value_of_firm, self.diluted_shares)?,
            projection,
            value_of_firm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::dcf::ProjectionPath;
    use rust_decimal_macros::dec;

    fn model() -> FcffModel {
        FcffModel {
            nopat: dec!(1000),
            reinvestment: NormalizedReinvestment {
                average_ebit: dec!(1200),
                average_adjusted_net_capex: dec!(300),
                net_capex: dec!(300),
                net_working_capital: dec!(400),
                delta_nwc: dec!(100),
            },
            return_on_capital: dec!(0.20),
            wacc: dec!(0.09),
            diluted_shares: dec!(100),
            terminal_growth_cap: dec!(0.05),
            high_growth_period: 5,
            stable_growth_period: 5,
        }
    }

    #[test]
    fn test_reinvestment_and_growth() {
        let v = model().compute().unwrap();
        assert_eq!(v.reinvestment_rate, dec!(0.4));
        assert_eq!(v.expected_growth_rate, dec!(0.08));
        assert_eq!(v.schedule.terminal_growth_rate, dec!(0.05));
        assert_eq!(v.projection.path, ProjectionPath::Standard);
        assert_eq!(v.value_per_share, v.value_of_firm / dec!(100));
    }

    #[test]
    fn test_low_growth_caps_terminal_rate() {
        let mut m = model();
        m.reinvestment.net_capex = dec!(50);
        m.reinvestment.delta_nwc = dec!(50);
        let v = m.compute().unwrap();
        // rr 0.1 * 0.2 = 0.02 < 0.05 cap
        assert_eq!(v.schedule.terminal_growth_rate, dec!(0.02));
    }

    #[test]
    fn test_heavy_reinvestment_uses_negative_path() {
        let mut m = model();
        m.reinvestment.net_capex = dec!(1100);
        let v = m.compute().unwrap();
        assert!(v.reinvestment_rate >= Decimal::ONE);
        assert_eq!(v.projection.path, ProjectionPath::NegativeFcfAdjusted);
    }

    #[test]
    fn test_zero_nopat_rejected() {
        let mut m = model();
        m.nopat = Decimal::ZERO;
        assert!(m.compute().is_err());
    }
}
