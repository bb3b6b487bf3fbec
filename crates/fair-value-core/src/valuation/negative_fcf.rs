//! Projection for firms reinvesting 100% or more of their earnings.
//!
//! Holding a ≥100% reinvestment rate constant would yield a permanently
//! negative cash-flow stream. Instead the growth rate fades linearly from the
//! expected rate toward the terminal rate over the high-growth years, and
//! each year's reinvestment rate is derived as `growth / return on capital`,
//! so free cash flow turns positive as growth cools. The transition years
//! then grow at the terminal rate while holding the last faded reinvestment
//! rate, and the terminal value follows the usual Gordon structure.

use rust_decimal::Decimal;
use tracing::debug;

use crate::error::ValuationError;
use crate::time_value::{checked_grow, period_discount};
use crate::types::Rate;
use crate::FairValueResult;

use super::dcf::{
    finish, projected_year, stable_reinvestment_rate, ProjectionPath, ProjectionPhase,
    TwoStageInput, TwoStageOutput,
};

pub fn project(input: &TwoStageInput) -> FairValueResult<TwoStageOutput> {
    let roc = input.return_on_capital;
    if roc.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: "negative-FCF reinvestment rate (return on capital)".into(),
        });
    }

    let schedule = &input.schedule;
    let g_high = schedule.expected_growth_rate;
    let g_stable = schedule.terminal_growth_rate;
    let fade = (g_high - g_stable) / Decimal::from(schedule.high_growth_period + 1);
    let step = period_discount(input.discount_rate)?;

    debug!(
        reinvestment_rate = %input.reinvestment_rate,
        fade = %fade,
        "reinvestment at or above 100%; fading growth and reinvestment together"
    );

    let mut projections = Vec::with_capacity(schedule.horizon() as usize);
    let mut base = input.base;
    let mut df = Decimal::ONE;
    let mut growth = g_high;
    let mut reinvestment: Rate = input.reinvestment_rate;

    for year in 1..=schedule.high_growth_period {
        reinvestment = growth / roc;
        base = checked_grow(base, growth)?;
        df *= step;
        projections.push(projected_year(
            year,
            ProjectionPhase::HighGrowth,
            growth,
            reinvestment,
            base,
            df,
        ));
        growth -= fade;
    }

    for year in schedule.high_growth_period + 1..=schedule.horizon() {
        base = checked_grow(base, g_stable)?;
        df *= step;
        projections.push(projected_year(
            year,
            ProjectionPhase::Transition,
            g_stable,
            reinvestment,
            base,
            df,
        ));
    }

    let rr_stable = stable_reinvestment_rate(g_stable, roc, input.reinvestment_rate)?;
    finish(
        input,
        ProjectionPath::NegativeFcfAdjusted,
        projections,
        base,
        df,
        rr_stable,
    )
}
