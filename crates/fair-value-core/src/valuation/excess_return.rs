//! Excess-return valuation for financial-sector firms, where book equity
//! rather than free cash flow drives value.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ValuationError;
use crate::time_value::{discount_factor, gordon_terminal_value};
use crate::types::{Money, Rate};
use crate::FairValueResult;

use super::per_share;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcessReturnModel {
    /// Latest stockholders' equity.
    pub book_equity: Money,
    /// Fraction.
    pub cost_of_equity: Rate,
    pub normalized_roe: Rate,
    pub payout_ratio: Rate,
    pub terminal_roe: Rate,
    pub terminal_growth_rate: Rate,
    pub high_growth_period: u32,
    pub diluted_shares: Decimal,
}

/// One year of the book-equity projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcessReturnYear {
    pub year: u32,
    pub roe: Rate,
    pub opening_book_equity: Money,
    pub net_income: Money,
    pub equity_charge: Money,
    pub excess_return: Money,
    pub present_value: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcessReturnValuation {
    pub normalized_roe: Rate,
    pub terminal_roe: Rate,
    pub roe_fade_step: Rate,
    pub payout_ratio: Rate,
    /// Sustainable book-equity growth, `normalized ROE × retention`.
    pub expected_growth_rate: Rate,
    pub projections: Vec<ExcessReturnYear>,
    pub terminal_book_equity: Money,
    pub terminal_value: Money,
    pub pv_of_excess_returns: Money,
    pub pv_of_terminal: Money,
    pub value_of_equity: Money,
    pub value_per_share: Money,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Long-run ROE the projection fades toward.
///
/// Direct-ROE industries (banks, capital markets) keep the normalized ROE.
/// Everyone else uses net-income CAGR grossed up by retention, falling back
/// to normalized ROE when the CAGR is undefined or not positive.
pub fn terminal_roe(
    normalized_roe: Rate,
    net_income_cagr: Option<Rate>,
    payout_ratio: Rate,
    direct_roe_industry: bool,
) -> Rate {
    if direct_roe_industry {
        return normalized_roe;
    }
    let retention = Decimal::ONE - payout_ratio;
    match net_income_cagr {
        Some(cagr) if cagr > Decimal::ZERO && !retention.is_zero() => cagr / retention,
        Some(cagr) if cagr > Decimal::ZERO => {
            warn!("payout ratio is 100%; terminal ROE falls back to normalized ROE");
            normalized_roe
        }
        Some(_) => normalized_roe,
        None => {
            warn!("net income CAGR undefined; terminal ROE falls back to normalized ROE");
            normalized_roe
        }
    }
}

impl ExcessReturnModel {
    pub fn roe_fade_step(&self) -> Rate {
        (self.normalized_roe - self.terminal_roe) / Decimal::from(self.high_growth_period + 1)
    }

    pub fn compute(&self) -> FairValueResult<ExcessReturnValuation> {
        if self.high_growth_period < 1 {
            return Err(ValuationError::InvalidInput {
                field: "high_growth_period".into(),
                reason: "High-growth period must be at least 1 year".into(),
            });
        }
        if self.cost_of_equity <= self.terminal_growth_rate {
            return Err(ValuationError::DivergentTerminalValue {
                discount_rate: self.cost_of_equity,
                terminal_growth: self.terminal_growth_rate,
            });
        }

        let retention = Decimal::ONE - self.payout_ratio;
        let step = self.roe_fade_step();

        // First retained-earnings step before the explicit projection.
        let mut book_equity =
            self.book_equity + self.book_equity * self.normalized_roe * retention;
        let mut roe = self.normalized_roe;
        let mut projections = Vec::with_capacity(self.high_growth_period as usize);
        let mut pv_of_excess_returns = Decimal::ZERO;

        for year in 1..=self.high_growth_period {
            let net_income = book_equity * roe;
            let equity_charge = book_equity * self.cost_of_equity;
            let excess_return = net_income - equity_charge;
            let present_value = excess_return * discount_factor(self.cost_of_equity, year)?;
            pv_of_excess_returns += present_value;

            projections.push(ExcessReturnYear {
                year,
                roe,
                opening_book_equity: book_equity,
                net_income,
                equity_charge,
                excess_return,
                present_value,
            });

            book_equity += net_income * retention;
            roe -= step;
        }

        let terminal_value = gordon_terminal_value(
            (self.terminal_roe - self.cost_of_equity) * book_equity,
            self.cost_of_equity,
            self.terminal_growth_rate,
        )?;
        let pv_of_terminal =
            terminal_value * discount_factor(self.cost_of_equity, self.high_growth_period + 1)?;
        let value_of_equity = pv_of_excess_returns + pv_of_terminal;

        debug!(
            normalized_roe = %self.normalized_roe,
            terminal_roe = %self.terminal_roe,
            value = %value_of_equity,
            "excess-return valuation"
        );

        Ok(ExcessReturnValuation {
            normalized_roe: self.normalized_roe,
            terminal_roe: self.terminal_roe,
            roe_fade_step: step,
            payout_ratio: self.payout_ratio,
            expected_growth_rate: self.normalized_roe * retention,
            projections,
            terminal_book_equity: book_equity,
            terminal_value,
            pv_of_excess_returns,
            pv_of_terminal,
            value_of_equity,
            value_per_share: per_share(value_of_equity, self.diluted_shares)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
