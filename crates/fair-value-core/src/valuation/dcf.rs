use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::time_value::{checked_grow, gordon_terminal_value, period_discount};
use crate::types::{Money, Rate};
use crate::FairValueResult;

use super::negative_fcf;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Two-stage horizon: constant high growth, then a linear fade to the
/// terminal rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthFadeSchedule {
    pub high_growth_period: u32,
    pub stable_growth_period: u32,
    pub expected_growth_rate: Rate,
    /// Never above `expected_growth_rate`.
    pub terminal_growth_rate: Rate,
}

/// Which projection produced the cash flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionPath {
    Standard,
    /// Reinvestment rate at or above 100%: growth and reinvestment fade together.
    NegativeFcfAdjusted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionPhase {
    HighGrowth,
    Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedYear {
    pub year: u32,
    pub phase: ProjectionPhase,
    pub growth_rate: Rate,
    pub reinvestment_rate: Rate,
    /// Compounded earnings base (NOPAT or net income).
    pub base: Money,
    pub free_cash_flow: Money,
    pub discount_factor: Decimal,
    pub present_value: Money,
}

/// Inputs shared by the FCFF and FCFE projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoStageInput {
    /// Base-year NOPAT (FCFF) or net income (FCFE).
    pub base: Money,
    pub reinvestment_rate: Rate,
    /// ROC (FCFF) or ROE (FCFE); drives the negative-FCF fade.
    pub return_on_capital: Rate,
    /// Return on capital in stable growth: WACC for FCFF, assumed ROE for FCFE.
    pub terminal_return_on_capital: Rate,
    pub discount_rate: Rate,
    pub schedule: GrowthFadeSchedule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoStageOutput {
    pub path: ProjectionPath,
    pub projections: Vec<ProjectedYear>,
    pub stable_reinvestment_rate: Rate,
    pub terminal_base: Money,
    pub terminal_cash_flow: Money,
    pub terminal_value: Money,
    pub pv_of_projections: Money,
    pub pv_of_terminal: Money,
    /// PV(projections) + PV(terminal value).
    pub value: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl GrowthFadeSchedule {
    /// Build a schedule, capping the terminal rate at `terminal_growth_cap`
    /// and never letting it exceed the expected growth rate.
    pub fn new(
        high_growth_period: u32,
        stable_growth_period: u32,
        expected_growth_rate: Rate,
        terminal_growth_cap: Rate,
    ) -> FairValueResult<Self> {
        if high_growth_period == 0 {
            return Err(ValuationError::InvalidInput {
                field: "high_growth_period".into(),
                reason: "High growth period must be at least 1 year".into(),
            });
        }
        if stable_growth_period == 0 {
            return Err(ValuationError::InvalidInput {
                field: "stable_growth_period".into(),
                reason: "Stable growth period must be at least 1 year".into(),
            });
        }
        Ok(Self {
            high_growth_period,
            stable_growth_period,
            expected_growth_rate,
            terminal_growth_rate: terminal_growth_cap.min(expected_growth_rate),
        })
    }

    /// Per-year decrement of the growth rate during the transition phase.
    pub fn fade_step(&self) -> Rate {
        (self.expected_growth_rate - self.terminal_growth_rate)
            / Decimal::from(self.stable_growth_period)
    }

    pub fn horizon(&self) -> u32 {
        self.high_growth_period + self.stable_growth_period
    }
}

/// Stable-phase reinvestment rate g / ROC, never above the high-growth rate.
pub fn stable_reinvestment_rate(
    terminal_growth_rate: Rate,
    terminal_return_on_capital: Rate,
    reinvestment_rate: Rate,
) -> FairValueResult<Rate> {
    if terminal_return_on_capital.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: "stable reinvestment rate (terminal return on capital)".into(),
        });
    }
    Ok((terminal_growth_rate / terminal_return_on_capital).min(reinvestment_rate))
}

/// Project, discount and sum a two-stage growth-fade cash-flow stream.
///
/// A reinvestment rate of 100% or more routes to the negative-FCF path.
pub fn run_two_stage(input: &TwoStageInput) -> FairValueResult<TwoStageOutput> {
    validate_input(input)?;

    if input.reinvestment_rate >= Decimal::ONE {
        return negative_fcf::project(input);
    }

    let schedule = &input.schedule;
    let step = period_discount(input.discount_rate)?;
    let rr = input.reinvestment_rate;

    let mut projections = Vec::with_capacity(schedule.horizon() as usize);
    let mut base = input.base;
    let mut df = Decimal::ONE;

    // High growth: constant growth and reinvestment.
    for year in 1..=schedule.high_growth_period {
        base = checked_grow(base, schedule.expected_growth_rate)?;
        df *= step;
        projections.push(projected_year(
            year,
            ProjectionPhase::HighGrowth,
            schedule.expected_growth_rate,
            rr,
            base,
            df,
        ));
    }

    // Transition: growth fades linearly, reinvestment held.
    let fade = schedule.fade_step();
    let mut growth = schedule.expected_growth_rate;
    for year in schedule.high_growth_period + 1..=schedule.horizon() {
        growth -= fade;
        base = checked_grow(base, growth)?;
        df *= step;
        projections.push(projected_year(year, ProjectionPhase::Transition, growth, rr, base, df));
    }

    let rr_stable = stable_reinvestment_rate(
        schedule.terminal_growth_rate,
        input.terminal_return_on_capital,
        rr,
    )?;
    finish(input, ProjectionPath::Standard, projections, base, df, rr_stable)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn validate_input(input: &TwoStageInput) -> FairValueResult<()> {
    let s = &input.schedule;
    if s.high_growth_period == 0 || s.stable_growth_period == 0 {
        return Err(ValuationError::InvalidInput {
            field: "schedule".into(),
            reason: "Both growth periods must be at least 1 year".into(),
        });
    }
    if s.terminal_growth_rate > s.expected_growth_rate {
        return Err(ValuationError::InvalidInput {
            field: "terminal_growth_rate".into(),
            reason: "Terminal growth cannot exceed expected growth".into(),
        });
    }
    if input.discount_rate <= s.terminal_growth_rate {
        return Err(ValuationError::DivergentTerminalValue {
            discount_rate: input.discount_rate,
            terminal_growth: s.terminal_growth_rate,
        });
    }
    Ok(())
}

pub(super) fn projected_year(
    year: u32,
    phase: ProjectionPhase,
    growth_rate: Rate,
    reinvestment_rate: Rate,
    base: Money,
    discount_factor: Decimal,
) -> ProjectedYear {
    let free_cash_flow = base * (Decimal::ONE - reinvestment_rate);
    ProjectedYear {
        year,
        phase,
        growth_rate,
        reinvestment_rate,
        base,
        free_cash_flow,
        discount_factor,
        present_value: free_cash_flow * discount_factor,
    }
}

/// Terminal year at the stable rate, Gordon growth, discounted over the
/// full horizon.
pub(super) fn finish(
    input: &TwoStageInput,
    path: ProjectionPath,
    projections: Vec<ProjectedYear>,
    final_base: Money,
    horizon_discount: Decimal,
    stable_reinvestment_rate: Rate,
) -> FairValueResult<TwoStageOutput> {
    let g = input.schedule.terminal_growth_rate;
    let terminal_base = checked_grow(final_base, g)?;
    let terminal_cash_flow = terminal_base * (Decimal::ONE - stable_reinvestment_rate);
    let terminal_value = gordon_terminal_value(terminal_cash_flow, input.discount_rate, g)?;
    let pv_of_terminal = terminal_value * horizon_discount;
    let pv_of_projections: Money = projections.iter().map(|p| p.present_value).sum();

    Ok(TwoStageOutput {
        path,
        projections,
        stable_reinvestment_rate,
        terminal_base,
        terminal_cash_flow,
        terminal_value,
        pv_of_projections,
        pv_of_terminal,
        value: pv_of_projections + pv_of_terminal,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn approx(a: Decimal, b: Decimal, eps: Decimal) -> bool {
        (a - b).abs() < eps
    }

    fn sample_input() -> TwoStageInput {
        TwoStageInput {
            base: dec!(100),
            reinvestment_rate: dec!(0.5),
            return_on_capital: dec!(0.20),
            terminal_return_on_capital: dec!(0.08),
            discount_rate: dec!(0.08),
            schedule: GrowthFadeSchedule::new(5, 5, dec!(0.10), dec!(0.05)).unwrap(),
        }
    }

    #[test]
    fn test_schedule_clamps_terminal_to_expected() {
        let s = GrowthFadeSchedule::new(5, 5, dec!(0.03), dec!(0.05)).unwrap();
        assert_eq!(s.terminal_growth_rate, dec!(0.03));
        assert_eq!(s.fade_step(), Decimal::ZERO);

        let s = GrowthFadeSchedule::new(5, 5, dec!(0.12), dec!(0.05)).unwrap();
        assert_eq!(s.terminal_growth_rate, dec!(0.05));
        assert_eq!(s.fade_step(), dec!(0.014));
    }

    #[test]
    fn test_schedule_rejects_zero_periods() {
        assert!(GrowthFadeSchedule::new(0, 5, dec!(0.1), dec!(0.05)).is_err());
        assert!(GrowthFadeSchedule::new(5, 0, dec!(0.1), dec!(0.05)).is_err());
    }

    #[test]
    fn test_stable_reinvestment_rate_clamped() {
        assert_eq!(
            stable_reinvestment_rate(dec!(0.05), dec!(0.10), dec!(0.8)).unwrap(),
            dec!(0.5)
        );
        assert_eq!(
            stable_reinvestment_rate(dec!(0.05), dec!(0.10), dec!(0.3)).unwrap(),
            dec!(0.3)
        );
    }

    #[test]
    fn test_standard_projection() {
        let out = run_two_stage(&sample_input()).unwrap();
        assert_eq!(out.path, ProjectionPath::Standard);
        assert_eq!(out.projections.len(), 10);

        let y1 = &out.projections[0];
        assert_eq!(y1.base, dec!(110.0));
        assert_eq!(y1.free_cash_flow, dec!(55.00));
        assert!(approx(y1.present_value, dec!(50.925925), dec!(0.00001)));

        // Growth fades 0.01 per year down to exactly the terminal rate
        assert_eq!(out.projections[5].growth_rate, dec!(0.09));
        assert_eq!(out.projections[9].growth_rate, dec!(0.05));
        assert!(out.projections[5..]
            .iter()
            .all(|p| p.reinvestment_rate == dec!(0.5)));

        // rr_stable = 0.05 / 0.08 = 0.625, clamped to 0.5
        assert_eq!(out.stable_reinvestment_rate, dec!(0.5));
        assert_eq!(out.value, out.pv_of_projections + out.pv_of_terminal);
        assert!(out.value > Decimal::ZERO);
    }

    #[test]
    fn test_terminal_value_gordon() {
        let out = run_two_stage(&sample_input()).unwrap();
        let last = out.projections.last().unwrap();
        let expected_tv = last.base * dec!(1.05) * dec!(0.5) / dec!(0.03);
        assert!(approx(out.terminal_value, expected_tv, dec!(0.0001)));
        assert!(approx(
            out.pv_of_terminal,
            out.terminal_value * last.discount_factor,
            dec!(0.0001)
        ));
    }

    #[test]
    fn test_single_year_periods_finite() {
        let mut input = sample_input();
        input.schedule = GrowthFadeSchedule::new(1, 1, dec!(0.10), dec!(0.05)).unwrap();
        let out = run_two_stage(&input).unwrap();
        assert_eq!(out.projections.len(), 2);
        assert!(out.value > Decimal::ZERO);
    }

    #[test]
    fn test_divergent_terminal_value() {
        let mut input = sample_input();
        input.discount_rate = dec!(0.05);
        assert!(matches!(
            run_two_stage(&input),
            Err(ValuationError::DivergentTerminalValue { .. })
        ));
    }

    #[test]
    fn test_full_reinvestment_routes_to_negative_path() {
        let mut input = sample_input();
        input.reinvestment_rate = Decimal::ONE;
        input.schedule = GrowthFadeSchedule::new(5, 5, dec!(0.20), dec!(0.05)).unwrap();
        let out = run_two_stage(&input).unwrap();
        assert_eq!(out.path, ProjectionPath::NegativeFcfAdjusted);
    }

    #[test]
    fn test_rr_stable_never_exceeds_rr() {
        for rr in [dec!(0.1), dec!(0.4), dec!(0.9), dec!(1.0), dec!(1.5)] {
            let mut input = sample_input();
            input.reinvestment_rate = rr;
            input.schedule =
                GrowthFadeSchedule::new(3, 3, rr * input.return_on_capital, dec!(0.05)).unwrap();
            let out = run_two_stage(&input).unwrap();
            assert!(out.stable_reinvestment_rate <= rr, "rr {rr}");
        }
    }
}
