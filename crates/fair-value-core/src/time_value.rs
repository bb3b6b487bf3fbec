use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::FairValueResult;

/// Step used for the central-difference derivative in `newton_solve`.
const DERIVATIVE_STEP: Decimal = dec!(0.000001);
/// Iterates are kept inside this band to stop Newton steps from running off.
const MIN_RATE: Decimal = dec!(-0.99);
const MAX_RATE: Decimal = dec!(10);
/// Halvings tried when `f` fails at a Newton candidate.
const MAX_BACKTRACKS: u32 = 60;

/// Multiplier that discounts one period at `rate`: 1 / (1 + rate).
pub fn period_discount(rate: Rate) -> FairValueResult<Decimal> {
    if rate <= dec!(-1) {
        return Err(ValuationError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }
    Ok(Decimal::ONE / (Decimal::ONE + rate))
}

/// Discount factor for `years` whole periods: 1 / (1 + rate)^years.
pub fn discount_factor(rate: Rate, years: u32) -> FairValueResult<Decimal> {
    let step = period_discount(rate)?;
    Ok((0..years).fold(Decimal::ONE, |df, _| df * step))
}

/// Present value of `amount` received `years` periods from now.
pub fn present_value(amount: Money, rate: Rate, years: u32) -> FairValueResult<Money> {
    Ok(amount * discount_factor(rate, years)?)
}

/// Gordon growth value of a perpetuity whose first flow is `next_flow`.
pub fn gordon_terminal_value(
    next_flow: Money,
    discount_rate: Rate,
    growth_rate: Rate,
) -> FairValueResult<Money> {
    if discount_rate <= growth_rate {
        return Err(ValuationError::DivergentTerminalValue {
            discount_rate,
            terminal_growth: growth_rate,
        });
    }
    Ok(next_flow / (discount_rate - growth_rate))
}

/// Multiply, surfacing overflow as an input error instead of a panic.
pub fn checked_grow(amount: Money, growth_rate: Rate) -> FairValueResult<Money> {
    amount
        .checked_mul(Decimal::ONE + growth_rate)
        .ok_or_else(|| ValuationError::InvalidInput {
            field: "growth_rate".into(),
            reason: format!("compounding at {growth_rate} overflows decimal range"),
        })
}

/// Find a root of `f` with Newton's method and a numerical derivative.
///
/// Converges when the step falls below `tolerance`. A candidate where `f`
/// fails is pulled halfway back toward the last good iterate. Fails with
/// `NoConvergence` once `max_iterations` is spent, the derivative vanishes or
/// cannot be evaluated, or every backtrack still fails.
pub fn newton_solve<F>(
    function: &str,
    f: F,
    guess: Rate,
    max_iterations: u32,
    tolerance: Decimal,
) -> FairValueResult<Rate>
where
    F: Fn(Rate) -> FairValueResult<Decimal>,
{
    let no_convergence = |iterations: u32, last_delta: Decimal| ValuationError::NoConvergence {
        function: function.into(),
        iterations,
        last_delta,
    };

    let mut x = guess;
    let mut fx = f(x)?;

    for i in 0..max_iterations {
        if fx.is_zero() {
            return Ok(x);
        }

        let derivative = match (f(x + DERIVATIVE_STEP), f(x - DERIVATIVE_STEP)) {
            (Ok(up), Ok(down)) => (up - down) / (DERIVATIVE_STEP * dec!(2)),
            _ => return Err(no_convergence(i, fx)),
        };
        if derivative.is_zero() {
            return Err(no_convergence(i, fx));
        }

        let target = x - fx / derivative;
        let mut next = target.clamp(MIN_RATE, MAX_RATE);
        let mut backtracks = 0;
        let f_next = loop {
            match f(next) {
                Ok(value) => break value,
                Err(err) if backtracks < MAX_BACKTRACKS => {
                    debug!(function, candidate = %next, error = %err, "halving Newton step");
                    next = x + (next - x) / dec!(2);
                    backtracks += 1;
                }
                Err(_) => return Err(no_convergence(i + 1, fx)),
            }
        };

        let moved = (next - x).abs();
        x = next;
        fx = f_next;

        if moved < tolerance {
            if next != target {
                // Clamped or backtracked, not at a root.
                return Err(no_convergence(i + 1, fx));
            }
            return Ok(x);
        }
    }

    Err(no_convergence(max_iterations, fx))
}
