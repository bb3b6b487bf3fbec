use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Money;

/// Point-in-time descriptive and market attributes of a listed company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub market_cap: Money,
    pub beta: Decimal,
    pub country: String,
    pub sector: String,
    #[serde(default)]
    pub industry: String,
    pub regular_market_price: Money,
    /// Normalized sector slug, e.g. "financial-services".
    pub sector_key: String,
    /// Normalized industry slug, e.g. "banks-regional".
    #[serde(default)]
    pub industry_key: String,
}
