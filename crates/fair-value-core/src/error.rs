use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValuationError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Missing field: {field} is absent in period {period}")]
    MissingField { field: String, period: usize },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Divergent terminal value: discount rate ({discount_rate}) must exceed terminal growth rate ({terminal_growth})")]
    DivergentTerminalValue {
        discount_rate: Decimal,
        terminal_growth: Decimal,
    },

    #[error("No convergence: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    NoConvergence {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ValuationError {
    /// Fold a `MissingField` into `InsufficientData`; every other variant
    /// passes through unchanged.
    pub fn into_top_level(self) -> Self {
        match self {
            ValuationError::MissingField { field, period } => ValuationError::InsufficientData(
                format!("required line item '{field}' is absent in period {period}"),
            ),
            other => other,
        }
    }
}

impl From<serde_json::Error> for ValuationError {
    fn from(e: serde_json::Error) -> Self {
        ValuationError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_folds_into_insufficient_data() {
        let err = ValuationError::MissingField {
            field: "ebit".into(),
            period: 2,
        }
        .into_top_level();
        match err {
            ValuationError::InsufficientData(msg) => assert!(msg.contains("ebit")),
            e => panic!("Expected InsufficientData, got {e:?}"),
        }
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = ValuationError::Configuration("unmapped country".into());
        assert_eq!(err.clone().into_top_level(), err);
    }
}
