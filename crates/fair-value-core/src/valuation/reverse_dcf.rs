//! Reverse DCF: the constant high-growth rate the market price implies,
//! and the Graham value that rate supports.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SolverConfig;
use crate::error::ValuationError;
use crate::time_value::{checked_grow, discount_factor, newton_solve};
use crate::types::{Money, Multiple, Rate};
use crate::FairValueResult;

/// One-stage-then-terminal FCFF model with the growth rate left free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseDcfModel {
    pub nopat: Money,
    pub reinvestment_rate: Rate,
    /// Fraction.
    pub wacc: Rate,
    pub terminal_growth_rate: Rate,
    pub high_growth_period: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpliedGrowth {
    pub implied_growth_rate: Rate,
    pub observed_enterprise_value: Money,
    pub projected_enterprise_value: Money,
}

impl ReverseDcfModel {
    pub fn new(
        nopat: Money,
        reinvestment_rate: Rate,
        wacc: Rate,
        terminal_growth_rate: Rate,
        high_growth_period: u32,
    ) -> FairValueResult<Self> {
        if high_growth_period < 1 {
            return Err(ValuationError::InvalidInput {
                field: "high_growth_period".into(),
                reason: "High-growth period must be at least 1 year".into(),
            });
        }
        if wacc <= terminal_growth_rate {
            return Err(ValuationError::DivergentTerminalValue {
                discount_rate: wacc,
                terminal_growth: terminal_growth_rate,
            });
        }
        if reinvestment_rate == Decimal::ONE {
            return Err(ValuationError::DivisionByZero {
                context: "terminal FCFF (1 - reinvestment rate)".into(),
            });
        }
        Ok(Self {
            nopat,
            reinvestment_rate,
            wacc,
            terminal_growth_rate,
            high_growth_period,
        })
    }

    pub fn base_fcff(&self) -> Money {
        self.nopat * (Decimal::ONE - self.reinvestment_rate)
    }

    /// Reinvestment needed to sustain terminal growth at a return equal to WACC.
    pub fn stable_reinvestment_rate(&self) -> Rate {
        self.terminal_growth_rate / self.wacc
    }

    /// Enterprise value if FCFF compounds at `growth` through the high-growth
    /// years and then grows at the terminal rate forever.
    pub fn projected_enterprise_value(&self, growth: Rate) -> FairValueResult<Money> {
        let mut fcff = self.base_fcff();
        let mut sum = Decimal::ZERO;
        for year in 1..=self.high_growth_period {
            fcff = checked_grow(fcff, growth)?;
            sum += fcff * discount_factor(self.wacc, year)?;
        }

        let terminal_fcff = checked_grow(fcff, self.terminal_growth_rate)?
            / (Decimal::ONE - self.reinvestment_rate)
            * (Decimal::ONE - self.stable_reinvestment_rate());
        let terminal_value = terminal_fcff / (self.wacc - self.terminal_growth_rate);
        Ok(sum + terminal_value * discount_factor(self.wacc, self.high_growth_period)?)
    }
}

/// Solve `projected_enterprise_value(g) = observed` for `g`.
pub fn solve_implied_growth(
    model: &ReverseDcfModel,
    observed_enterprise_value: Money,
    solver: &SolverConfig,
) -> FairValueResult<ImpliedGrowth> {
    let implied_growth_rate = newton_solve(
        "implied_growth",
        |g| Ok(model.projected_enterprise_value(g)? - observed_enterprise_value),
        solver.initial_guess,
        solver.max_iterations,
        solver.tolerance,
    )?;
    let projected_enterprise_value = model.projected_enterprise_value(implied_growth_rate)?;
    debug!(
        implied_growth = %implied_growth_rate,
        observed = %observed_enterprise_value,
        "implied growth solved"
    );
    Ok(ImpliedGrowth {
        implied_growth_rate,
        observed_enterprise_value,
        projected_enterprise_value,
    })
}

/// P/E Graham assigned a no-growth company.
const GRAHAM_BASE_MULTIPLE: Multiple = dec!(8.5);

/// Graham's formula, `EPS × (8.5 + 2g)` with `g` in percent.
pub fn graham_value(average_eps: Money, growth_percent: Decimal) -> Money {
    average_eps * (GRAHAM_BASE_MULTIPLE + dec!(2) * growth_percent)
}
