use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::ValuationAssumptions;
use crate::normalize::leverage_stability;
use crate::profile::CompanyProfile;
use crate::statements::StatementHistory;
use crate::FairValueResult;

/// Which valuation path a firm takes. Exactly one per firm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationRegime {
    ExcessReturn,
    Fcfe,
    Fcff,
}

impl fmt::Display for ValuationRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValuationRegime::ExcessReturn => "excess_return",
            ValuationRegime::Fcfe => "fcfe",
            ValuationRegime::Fcff => "fcff",
        };
        f.write_str(name)
    }
}

/// Pure dispatch on the two measured signals.
pub fn regime_for(is_financial: bool, stable_leverage: bool) -> ValuationRegime {
    match (is_financial, stable_leverage) {
        (true, _) => ValuationRegime::ExcessReturn,
        (false, true) => ValuationRegime::Fcfe,
        (false, false) => ValuationRegime::Fcff,
    }
}

/// Financial sector first, then leverage stability.
///
/// Financial firms never read the leverage history, so missing debt data
/// cannot fail their selection.
pub fn select_regime(
    profile: &CompanyProfile,
    history: &StatementHistory,
    assumptions: &ValuationAssumptions,
) -> FairValueResult<ValuationRegime> {
    let is_financial = profile.sector_key == assumptions.financial_sector_key;
    let stable = if is_financial {
        false
    } else {
        leverage_stability(
            history,
            assumptions.windows.leverage,
            assumptions.leverage_cv_threshold,
        )?
    };
    let regime = regime_for(is_financial, stable);
    debug!(sector_key = %profile.sector_key, stable_leverage = stable, regime = %regime, "regime selected");
    Ok(regime)
}
