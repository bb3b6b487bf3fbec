pub mod cache;
pub mod capital;
pub mod config;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod profile;
pub mod provider;
pub mod reference;
pub mod statements;
pub mod time_value;
pub mod types;
pub mod valuation;

pub use engine::{
    compute_capital, compute_fair_value, compute_implied_growth, compute_regime,
    FairValueEngine, FairValueReport, ImpliedGrowthResult, ValuationInputs, ValuationResult,
};
pub use error::ValuationError;
pub use types::*;

/// Standard result type for all valuation operations
pub type FairValueResult<T> = Result<T, ValuationError>;
