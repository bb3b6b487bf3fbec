//! Valuation models and the regime dispatch that picks between them.

pub mod dcf;
pub mod excess_return;
pub mod fcfe;
pub mod fcff;
pub mod negative_fcf;
pub mod regime;
pub mod reverse_dcf;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Money, Rate};
use crate::FairValueResult;

use self::excess_return::{ExcessReturnModel, ExcessReturnValuation};
use self::fcfe::{FcfeModel, FcfeValuation};
use self::fcff::{FcffModel, FcffValuation};
use self::regime::ValuationRegime;

/// Model-specific detail behind a fair value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelDetail {
    Fcfe(FcfeValuation),
    Fcff(FcffValuation),
    ExcessReturn(ExcessReturnValuation),
}

/// What every valuation model produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutcome {
    pub fair_value_per_share: Money,
    /// High-growth-phase growth rate as a fraction.
    pub expected_growth_rate: Rate,
    pub detail: ModelDetail,
}

/// The closed set of valuation paths. Built by the regime selector.
#[derive(Debug, Clone, PartialEq)]
pub enum ValuationModel {
    Fcfe(FcfeModel),
    Fcff(FcffModel),
    ExcessReturn(ExcessReturnModel),
}

impl ValuationModel {
    pub fn regime(&self) -> ValuationRegime {
        match self {
            ValuationModel::Fcfe(_) => ValuationRegime::Fcfe,
            ValuationModel::Fcff(_) => ValuationRegime::Fcff,
            ValuationModel::ExcessReturn(_) => ValuationRegime::ExcessReturn,
        }
    }

    pub fn compute(&self) -> FairValueResult<ModelOutcome> {
        match self {
            ValuationModel::Fcfe(m) => {
                let v = m.compute()?;
                Ok(ModelOutcome {
                    fair_value_per_share: v.value_per_share,
                    expected_growth_rate: v.expected_growth_rate,
                    detail: ModelDetail::Fcfe(v),
                })
            }
            ValuationModel::Fcff(m) => {
                let v = m.compute()?;
                Ok(ModelOutcome {
                    fair_value_per_share: v.value_per_share,
                    expected_growth_rate: v.expected_growth_rate,
                    detail: ModelDetail::Fcff(v),
                })
            }
            ValuationModel::ExcessReturn(m) => {
                let v = m.compute()?;
                Ok(ModelOutcome {
                    fair_value_per_share: v.value_per_share,
                    expected_growth_rate: v.expected_growth_rate,
                    detail: ModelDetail::ExcessReturn(v),
                })
            }
        }
    }
}

/// Divide a total value by diluted shares.
pub(crate) fn per_share(value: Money, diluted_shares: Decimal) -> FairValueResult<Money> {
    if diluted_shares <= Decimal::ZERO {
        return Err(crate::error::ValuationError::InvalidInput {
            field: "diluted_average_shares".into(),
            reason: "Diluted shares must be positive".into(),
        });
    }
    Ok(value / diluted_shares)
}
