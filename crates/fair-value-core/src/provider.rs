//! Data-provider seam: where statements, quotes and the risk-free rate
//! come from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::profile::CompanyProfile;
use crate::statements::StatementHistory;
use crate::types::Percent;
use crate::FairValueResult;

/// Source of the market and accounting data one valuation needs.
pub trait FinancialDataProvider {
    /// At least four annual snapshots, most recent first.
    fn statement_history(&self, ticker: &str) -> FairValueResult<StatementHistory>;

    fn profile(&self, ticker: &str) -> FairValueResult<CompanyProfile>;

    /// Ten-year treasury yield, in percent.
    fn risk_free_rate(&self) -> FairValueResult<Percent>;
}

impl<P: FinancialDataProvider + ?Sized> FinancialDataProvider for &P {
    fn statement_history(&self, ticker: &str) -> FairValueResult<StatementHistory> {
        (**self).statement_history(ticker)
    }

    fn profile(&self, ticker: &str) -> FairValueResult<CompanyProfile> {
        (**self).profile(ticker)
    }

    fn risk_free_rate(&self) -> FairValueResult<Percent> {
        (**self).risk_free_rate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyData {
    pub profile: CompanyProfile,
    pub statements: StatementHistory,
}

/// Snapshot of everything a batch of valuations reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataset {
    pub risk_free_rate: Percent,
    pub companies: HashMap<String, CompanyData>,
}

/// Serves a fixed `MarketDataset`. Ticker lookups are case-insensitive.
#[derive(Debug, Clone)]
pub struct StaticDataProvider {
    risk_free_rate: Percent,
    companies: HashMap<String, CompanyData>,
}

impl StaticDataProvider {
    pub fn new(dataset: MarketDataset) -> Self {
        let companies = dataset
            .companies
            .into_iter()
            .map(|(ticker, data)| (normalize_ticker(&ticker), data))
            .collect();
        Self {
            risk_free_rate: dataset.risk_free_rate,
            companies,
        }
    }

    pub fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.companies.keys().cloned().collect();
        tickers.sort();
        tickers
    }

    fn company(&self, ticker: &str) -> FairValueResult<&CompanyData> {
        self.companies
            .get(&normalize_ticker(ticker))
            .ok_or_else(|| ValuationError::InsufficientData(format!("no data for ticker '{ticker}'")))
    }
}

impl From<MarketDataset> for StaticDataProvider {
    fn from(dataset: MarketDataset) -> Self {
        Self::new(dataset)
    }
}

impl FinancialDataProvider for StaticDataProvider {
    fn statement_history(&self, ticker: &str) -> FairValueResult<StatementHistory> {
        Ok(self.company(ticker)?.statements.clone())
    }

    fn profile(&self, ticker: &str) -> FairValueResult<CompanyProfile> {
        Ok(self.company(ticker)?.profile.clone())
    }

    fn risk_free_rate(&self) -> FairValueResult<Percent> {
        Ok(self.risk_free_rate)
    }
}

pub fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}
