//! Static reference data: country risk premiums, country marginal tax rates
//! and synthetic-rating credit spreads.
//!
//! The tables are plain data and injectable; `ReferenceTables::default()`
//! carries a built-in Damodaran-style snapshot. Spreads and country risk
//! premiums are in percent, tax rates are fractions.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{Money, Percent, Rate};
use crate::FairValueResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Firm bucket used to pick a coverage-ratio spread table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyType {
    Financial,
    SmallNonFinancial,
    LargeNonFinancial,
}

/// One row of an interest-coverage spread table. The row applies when the
/// coverage ratio is at least `min_coverage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageBand {
    pub min_coverage: Decimal,
    pub rating: String,
    pub spread: Percent,
}

/// One row of the market-cap backup table, used when interest expense is
/// not reported. Applies when market cap is at least `min_market_cap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketCapBand {
    pub min_market_cap: Money,
    pub rating: String,
    pub spread: Percent,
}

/// Spread resolved from one of the tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadLookup {
    pub rating: String,
    pub spread: Percent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceTables {
    /// Country name -> country risk premium (percent).
    pub country_risk_premium: BTreeMap<String, Percent>,
    /// Country name -> marginal corporate tax rate (fraction).
    pub country_tax_rate: BTreeMap<String, Rate>,
    /// Coverage tables, each sorted by `min_coverage` descending.
    pub coverage_spreads: BTreeMap<CompanyType, Vec<CoverageBand>>,
    /// Backup table sorted by `min_market_cap` descending.
    pub market_cap_spreads: Vec<MarketCapBand>,
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

impl ReferenceTables {
    pub fn country_risk_premium(&self, country: &str) -> FairValueResult<Percent> {
        self.country_risk_premium
            .get(country)
            .copied()
            .ok_or_else(|| {
                ValuationError::Configuration(format!(
                    "no country risk premium mapped for '{country}'"
                ))
            })
    }

    pub fn country_tax_rate(&self, country: &str) -> FairValueResult<Rate> {
        self.country_tax_rate.get(country).copied().ok_or_else(|| {
            ValuationError::Configuration(format!("no marginal tax rate mapped for '{country}'"))
        })
    }

    /// Spread for an interest coverage ratio. `None` means the coverage is
    /// unbounded (zero interest expense) and maps to the best band.
    pub fn spread_for_coverage(
        &self,
        coverage: Option<Decimal>,
        company_type: CompanyType,
    ) -> FairValueResult<SpreadLookup> {
        let table = self
            .coverage_spreads
            .get(&company_type)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ValuationError::Configuration(format!(
                    "no coverage spread table for {company_type:?}"
                ))
            })?;

        let band = match coverage {
            None => table.first(),
            Some(icr) => table
                .iter()
                .find(|b| icr >= b.min_coverage)
                .or_else(|| table.last()),
        };
        band.map(|b| SpreadLookup {
            rating: b.rating.clone(),
            spread: b.spread,
        })
        .ok_or_else(|| {
            ValuationError::Configuration(format!("empty coverage table for {company_type:?}"))
        })
    }

    /// Spread from the market-cap backup table.
    pub fn spread_backup(&self, market_cap: Money) -> FairValueResult<SpreadLookup> {
        self.market_cap_spreads
            .iter()
            .find(|b| market_cap >= b.min_market_cap)
            .or_else(|| self.market_cap_spreads.last())
            .map(|b| SpreadLookup {
                rating: b.rating.clone(),
                spread: b.spread,
            })
            .ok_or_else(|| {
                ValuationError::Configuration("market-cap backup spread table is empty".into())
            })
    }

    /// Check every table is non-empty and sorted the way the lookups expect.
    pub fn validate(&self) -> FairValueResult<()> {
        for company_type in [
            CompanyType::Financial,
            CompanyType::SmallNonFinancial,
            CompanyType::LargeNonFinancial,
        ] {
            let table = self.coverage_spreads.get(&company_type).ok_or_else(|| {
                ValuationError::Configuration(format!(
                    "missing coverage spread table for {company_type:?}"
                ))
            })?;
            if table.is_empty() {
                return Err(ValuationError::Configuration(format!(
                    "coverage spread table for {company_type:?} is empty"
                )));
            }
            if table.windows(2).any(|w| w[0].min_coverage < w[1].min_coverage) {
                return Err(ValuationError::Configuration(format!(
                    "coverage spread table for {company_type:?} must be sorted descending"
                )));
            }
        }
        if self.market_cap_spreads.is_empty() {
            return Err(ValuationError::Configuration(
                "market-cap backup spread table is empty".into(),
            ));
        }
        if self
            .market_cap_spreads
            .windows(2)
            .any(|w| w[0].min_market_cap < w[1].min_market_cap)
        {
            return Err(ValuationError::Configuration(
                "market-cap backup spread table must be sorted descending".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Built-in data
// ---------------------------------------------------------------------------

const RATINGS: [(&str, Decimal); 15] = [
    ("AAA", dec!(0.59)),
    ("AA", dec!(0.70)),
    ("A+", dec!(0.92)),
    ("A", dec!(1.07)),
    ("A-", dec!(1.21)),
    ("BBB", dec!(1.47)),
    ("BB+", dec!(1.77)),
    ("BB", dec!(2.21)),
    ("B+", dec!(2.94)),
    ("B", dec!(3.57)),
    ("B-", dec!(4.36)),
    ("CCC", dec!(7.04)),
    ("CC", dec!(8.99)),
    ("C", dec!(11.00)),
    ("D", dec!(15.08)),
];

fn coverage_table(lower_bounds: [Decimal; 15]) -> Vec<CoverageBand> {
    RATINGS
        .iter()
        .zip(lower_bounds)
        .map(|((rating, spread), min_coverage)| CoverageBand {
            min_coverage,
            rating: (*rating).to_string(),
            spread: *spread,
        })
        .collect()
}

impl Default for ReferenceTables {
    fn default() -> Self {
        let below_everything = Decimal::MIN;

        let mut coverage_spreads = BTreeMap::new();
        coverage_spreads.insert(
            CompanyType::LargeNonFinancial,
            coverage_table([
                dec!(8.5),
                dec!(6.5),
                dec!(5.5),
                dec!(4.25),
                dec!(3.0),
                dec!(2.5),
                dec!(2.25),
                dec!(2.0),
                dec!(1.75),
                dec!(1.5),
                dec!(1.25),
                dec!(0.8),
                dec!(0.65),
                dec!(0.2),
                below_everything,
            ]),
        );
        coverage_spreads.insert(
            CompanyType::SmallNonFinancial,
            coverage_table([
                dec!(12.5),
                dec!(9.5),
                dec!(7.5),
                dec!(6.0),
                dec!(4.5),
                dec!(4.0),
                dec!(3.5),
                dec!(3.0),
                dec!(2.5),
                dec!(2.0),
                dec!(1.5),
                dec!(1.25),
                dec!(0.8),
                dec!(0.5),
                below_everything,
            ]),
        );
        coverage_spreads.insert(
            CompanyType::Financial,
            coverage_table([
                dec!(3.0),
                dec!(2.5),
                dec!(2.0),
                dec!(1.5),
                dec!(1.25),
                dec!(1.0),
                dec!(0.9),
                dec!(0.8),
                dec!(0.7),
                dec!(0.6),
                dec!(0.5),
                dec!(0.4),
                dec!(0.3),
                dec!(0.2),
                below_everything,
            ]),
        );

        let market_cap_spreads = [
            (dec!(200_000_000_000), "AA", dec!(0.70)),
            (dec!(10_000_000_000), "A-", dec!(1.21)),
            (dec!(2_000_000_000), "BBB", dec!(1.47)),
            (dec!(300_000_000), "BB", dec!(2.21)),
            (below_everything, "B", dec!(3.57)),
        ]
        .into_iter()
        .map(|(min_market_cap, rating, spread)| MarketCapBand {
            min_market_cap,
            rating: rating.to_string(),
            spread,
        })
        .collect();

        // (country, CRP %, marginal tax)
        let countries: [(&str, Decimal, Decimal); 30] = [
            ("United States", dec!(0.00), dec!(0.25)),
            ("Canada", dec!(0.00), dec!(0.265)),
            ("United Kingdom", dec!(0.63), dec!(0.25)),
            ("Germany", dec!(0.00), dec!(0.2983)),
            ("France", dec!(0.63), dec!(0.2583)),
            ("Netherlands", dec!(0.00), dec!(0.258)),
            ("Switzerland", dec!(0.00), dec!(0.1961)),
            ("Ireland", dec!(0.77), dec!(0.125)),
            ("Luxembourg", dec!(0.00), dec!(0.2494)),
            ("Belgium", dec!(0.77), dec!(0.25)),
            ("Sweden", dec!(0.00), dec!(0.206)),
            ("Denmark", dec!(0.00), dec!(0.22)),
            ("Norway", dec!(0.00), dec!(0.22)),
            ("Finland", dec!(0.63), dec!(0.20)),
            ("Spain", dec!(1.77), dec!(0.25)),
            ("Italy", dec!(2.14), dec!(0.24)),
            ("Japan", dec!(0.85), dec!(0.3062)),
            ("China", dec!(0.85), dec!(0.25)),
            ("Hong Kong", dec!(0.63), dec!(0.165)),
            ("Taiwan", dec!(0.63), dec!(0.20)),
            ("South Korea", dec!(0.63), dec!(0.24)),
            ("Singapore", dec!(0.00), dec!(0.17)),
            ("Australia", dec!(0.00), dec!(0.30)),
            ("India", dec!(2.92), dec!(0.2517)),
            ("Israel", dec!(1.08), dec!(0.23)),
            ("Brazil", dec!(3.47), dec!(0.34)),
            ("Mexico", dec!(2.48), dec!(0.30)),
            ("South Africa", dec!(3.47), dec!(0.27)),
            ("Bermuda", dec!(1.08), dec!(0.00)),
            ("Cayman Islands", dec!(0.95), dec!(0.00)),
        ];
        let country_risk_premium = countries
            .iter()
            .map(|(c, crp, _)| ((*c).to_string(), *crp))
            .collect();
        let country_tax_rate = countries
            .iter()
            .map(|(c, _, tax)| ((*c).to_string(), *tax))
            .collect();

        Self {
            country_risk_premium,
            country_tax_rate,
            coverage_spreads,
            market_cap_spreads,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables_are_valid() {
        assert!(ReferenceTables::default().validate().is_ok());
    }

    #[test]
    fn test_unmapped_country_is_configuration_error() {
        let tables = ReferenceTables::default();
        assert!(matches!(
            tables.country_risk_premium("Atlantis"),
            Err(ValuationError::Configuration(_))
        ));
        assert!(matches!(
            tables.country_tax_rate("Atlantis"),
            Err(ValuationError::Configuration(_))
        ));
    }

    #[test]
    fn test_us_lookups() {
        let tables = ReferenceTables::default();
        assert_eq!(tables.country_risk_premium("United States").unwrap(), dec!(0));
        assert_eq!(tables.country_tax_rate("United States").unwrap(), dec!(0.25));
    }

    #[test]
    fn test_large_firm_coverage_bands() {
        let tables = ReferenceTables::default();
        let aaa = tables
            .spread_for_coverage(Some(dec!(20)), CompanyType::LargeNonFinancial)
            .unwrap();
        assert_eq!(aaa.rating, "AAA");
        assert_eq!(aaa.spread, dec!(0.59));

        // Lower bound is inclusive
        let bbb = tables
            .spread_for_coverage(Some(dec!(2.5)), CompanyType::LargeNonFinancial)
            .unwrap();
        assert_eq!(bbb.rating, "BBB");

        let d = tables
            .spread_for_coverage(Some(dec!(-3)), CompanyType::LargeNonFinancial)
            .unwrap();
        assert_eq!(d.rating, "D");
    }

    #[test]
    fn test_small_firm_needs_more_coverage() {
        let tables = ReferenceTables::default();
        let large = tables
            .spread_for_coverage(Some(dec!(7)), CompanyType::LargeNonFinancial)
            .unwrap();
        let small = tables
            .spread_for_coverage(Some(dec!(7)), CompanyType::SmallNonFinancial)
            .unwrap();
        assert!(small.spread > large.spread);
    }

    #[test]
    fn test_unbounded_coverage_maps_to_best_band() {
        let tables = ReferenceTables::default();
        let s = tables
            .spread_for_coverage(None, CompanyType::Financial)
            .unwrap();
        assert_eq!(s.rating, "AAA");
    }

    #[test]
    fn test_backup_spread_by_market_cap() {
        let tables = ReferenceTables::default();
        assert_eq!(tables.spread_backup(dec!(500_000_000_000)).unwrap().rating, "AA");
        assert_eq!(tables.spread_backup(dec!(5_000_000_000)).unwrap().rating, "BBB");
        assert_eq!(tables.spread_backup(dec!(50_000_000)).unwrap().rating, "B");
    }

    #[test]
    fn test_unsorted_table_rejected() {
        let mut tables = ReferenceTables::default();
        tables.market_cap_spreads.reverse();
        assert!(tables.validate().is_err());
    }
}
