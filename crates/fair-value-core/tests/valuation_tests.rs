use std::collections::HashMap;

use fair_value_core::config::ValuationAssumptions;
use fair_value_core::profile::CompanyProfile;
use fair_value_core::provider::{CompanyData, MarketDataset, StaticDataProvider};
use fair_value_core::statements::{
    BalanceSheet, CashFlowStatement, IncomeStatement, StatementHistory, StatementSnapshot,
};
use fair_value_core::valuation::dcf::ProjectionPath;
use fair_value_core::valuation::regime::ValuationRegime;
use fair_value_core::valuation::ModelDetail;
use fair_value_core::{FairValueEngine, ValuationError};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Fixtures
// ===========================================================================

const BILLION: Decimal = dec!(1_000_000_000);

fn b(x: Decimal) -> Decimal {
    x * BILLION
}

/// Large US industrial, figures in dollars. `debt` and `equity` are the
/// four balance-sheet values, most recent first.
fn statements(debt: [Decimal; 4], equity: [Decimal; 4]) -> StatementHistory {
    let revenue = [dec!(40), dec!(36), dec!(33), dec!(30)];
    let ebit = [dec!(8), dec!(7.5), dec!(7), dec!(6.5)];
    let net_income = [dec!(6), dec!(5.5), dec!(5), dec!(4.5)];
    let net_ppe = [dec!(20), dec!(19), dec!(18), dec!(17)];
    let invested_capital = [dec!(40), dec!(38), dec!(36), dec!(34)];

    let periods = (0..4)
        .map(|i| StatementSnapshot {
            period_end: chrono::NaiveDate::from_ymd_opt(2024 - i as i32, 12, 31),
            income: IncomeStatement {
                total_revenue: Some(b(revenue[i])),
                ebit: Some(b(ebit[i])),
                pretax_income: Some(b(ebit[i] - dec!(0.4))),
                net_income: Some(b(net_income[i])),
                interest_expense: Some(b(dec!(0.4))),
                tax_rate_for_calcs: Some(dec!(0.21)),
                diluted_average_shares: Some(dec!(500_000_000)),
                diluted_eps: Some(b(net_income[i]) / dec!(500_000_000)),
                research_and_development: Some(b(dec!(1))),
            },
            balance: BalanceSheet {
                current_assets: Some(b(dec!(15))),
                current_liabilities: Some(b(dec!(8))),
                current_debt: Some(b(dec!(1))),
                cash_and_equivalents: Some(b(dec!(5))),
                net_ppe: Some(b(net_ppe[i])),
                total_debt: Some(b(debt[i])),
                stockholders_equity: Some(b(equity[i])),
                invested_capital: Some(b(invested_capital[i])),
                goodwill_and_intangibles: None,
            },
            cash_flow: Some(CashFlowStatement {
                depreciation_amortization: Some(b(dec!(1.5))),
                capital_expenditure: Some(b(dec!(-2.5))),
                purchase_of_business: None,
                cash_dividends_paid: Some(b(dec!(-2))),
            }),
        })
        .collect();
    StatementHistory::new(periods).unwrap()
}

fn volatile_leverage() -> StatementHistory {
    statements(
        [dec!(10), dec!(6), dec!(3), dec!(8)],
        [dec!(30), dec!(28), dec!(26), dec!(24)],
    )
}

fn stable_leverage() -> StatementHistory {
    statements(
        [dec!(10), dec!(9.4), dec!(8.8), dec!(8.2)],
        [dec!(30), dec!(28.2), dec!(26.4), dec!(24.6)],
    )
}

fn industrial_profile() -> CompanyProfile {
    CompanyProfile {
        market_cap: b(dec!(50)),
        beta: dec!(1.1),
        country: "United States".into(),
        sector: "Industrials".into(),
        industry: "Specialty Industrial Machinery".into(),
        regular_market_price: dec!(100),
        sector_key: "industrials".into(),
        industry_key: "specialty-industrial-machinery".into(),
    }
}

fn bank_profile() -> CompanyProfile {
    CompanyProfile {
        sector: "Financial Services".into(),
        industry: "Banks - Regional".into(),
        sector_key: "financial-services".into(),
        industry_key: "banks-regional".into(),
        ..industrial_profile()
    }
}

fn dataset() -> MarketDataset {
    let mut companies = HashMap::new();
    companies.insert(
        "FCFF".to_string(),
        CompanyData {
            profile: industrial_profile(),
            statements: volatile_leverage(),
        },
    );
    companies.insert(
        "FCFE".to_string(),
        CompanyData {
            profile: industrial_profile(),
            statements: stable_leverage(),
        },
    );
    companies.insert(
        "BANK".to_string(),
        CompanyData {
            profile: bank_profile(),
            statements: stable_leverage(),
        },
    );
    MarketDataset {
        risk_free_rate: dec!(4.2),
        companies,
    }
}

fn engine() -> FairValueEngine<StaticDataProvider> {
    FairValueEngine::new(StaticDataProvider::new(dataset()))
}

fn engine_with(ticker: &str, data: CompanyData, risk_free_rate: Decimal) -> FairValueEngine<StaticDataProvider> {
    let mut companies = HashMap::new();
    companies.insert(ticker.to_string(), data);
    FairValueEngine::new(StaticDataProvider::new(MarketDataset {
        risk_free_rate,
        companies,
    }))
}

// ===========================================================================
// Regime dispatch
// ===========================================================================

#[test]
fn test_regime_dispatch() {
    let e = engine();
    assert_eq!(e.regime("FCFF").unwrap(), ValuationRegime::Fcff);
    assert_eq!(e.regime("FCFE").unwrap(), ValuationRegime::Fcfe);
    assert_eq!(e.regime("BANK").unwrap(), ValuationRegime::ExcessReturn);
}

#[test]
fn test_each_regime_produces_matching_detail() {
    let e = engine();
    for (ticker, regime) in [
        ("FCFF", ValuationRegime::Fcff),
        ("FCFE", ValuationRegime::Fcfe),
        ("BANK", ValuationRegime::ExcessReturn),
    ] {
        let out = e.fair_value(ticker, 5, 5).unwrap();
        let report = out.result;
        assert_eq!(report.valuation.regime, regime);
        let detail_regime = match report.model {
            ModelDetail::Fcff(_) => ValuationRegime::Fcff,
            ModelDetail::Fcfe(_) => ValuationRegime::Fcfe,
            ModelDetail::ExcessReturn(_) => ValuationRegime::ExcessReturn,
        };
        assert_eq!(detail_regime, regime);
        assert!(report.valuation.fair_value_per_share > Decimal::ZERO, "{ticker}");
    }
}

// ===========================================================================
// Fair value
// ===========================================================================

#[test]
fn test_fair_value_is_idempotent() {
    let e = engine();
    let first = e.fair_value("FCFF", 5, 5).unwrap().result.valuation;
    let second = e.fair_value("fcff", 5, 5).unwrap().result.valuation;
    assert_eq!(first, second);
    assert_eq!(first.ticker, "FCFF");
}

#[test]
fn test_cached_engine_returns_same_result() {
    let e = engine().with_cache();
    let first = e.fair_value("FCFE", 5, 5).unwrap().result;
    let second = e.fair_value("FCFE", 5, 5).unwrap().result;
    assert_eq!(first, second);
}

#[test]
fn test_capital_structure_invariant() {
    let out = engine().capital("FCFF").unwrap();
    let s = out.result.structure;
    assert_eq!(s.enterprise_value, s.total_debt + s.equity_value);
    // 500M shares at $100
    assert_eq!(s.equity_value, b(dec!(50)));
    // coverage 20x: AAA spread over 4.2
    assert_eq!(s.cost_of_debt, dec!(4.79));
    // 4.2 + 1.1 * 4.02
    assert_eq!(s.cost_of_equity, dec!(8.622));
    let expected_wacc = s.cost_of_debt * s.debt_weight() + s.cost_of_equity * s.equity_weight();
    assert_eq!(s.wacc, expected_wacc);
}

#[test]
fn test_fcff_reports_rates_in_percent() {
    let v = engine().fair_value("FCFF", 5, 5).unwrap().result.valuation;
    // EBIT 8B at 25% marginal tax over 40B book capital
    assert_eq!(v.roc, dec!(15));
    assert!(v.wacc > dec!(5) && v.wacc < dec!(10), "wacc {}", v.wacc);
    assert!(v.expected_growth_rate > dec!(5) && v.expected_growth_rate < dec!(6));
}

#[test]
fn test_shortest_horizon_is_finite() {
    let v = engine().fair_value("FCFF", 1, 1).unwrap().result.valuation;
    assert!(v.fair_value_per_share > Decimal::ZERO);
}

#[test]
fn test_fcfe_projection_detail() {
    let report = engine().fair_value("FCFE", 3, 2).unwrap().result;
    let ModelDetail::Fcfe(fcfe) = report.model else {
        panic!("expected FCFE detail");
    };
    assert_eq!(fcfe.projection.path, ProjectionPath::Standard);
    assert_eq!(fcfe.projection.projections.len(), 5);
    assert_eq!(fcfe.schedule.terminal_growth_rate, dec!(0.04));
    assert!(fcfe.projection.stable_reinvestment_rate <= fcfe.reinvestment_rate);
}

#[test]
fn test_heavy_reinvestment_takes_negative_fcf_path() {
    let mut statements = volatile_leverage();
    let mut periods: Vec<StatementSnapshot> = statements.periods().to_vec();
    for (i, p) in periods.iter_mut().enumerate() {
        // PP&E growing 8B a year swamps NOPAT
        p.balance.net_ppe = Some(b(dec!(60) - Decimal::from(i as i64) * dec!(8)));
    }
    statements = StatementHistory::new(periods).unwrap();
    let e = engine_with(
        "GROW",
        CompanyData {
            profile: industrial_profile(),
            statements,
        },
        dec!(4.2),
    );
    let out = e.fair_value("GROW", 5, 5).unwrap();
    let ModelDetail::Fcff(fcff) = &out.result.model else {
        panic!("expected FCFF detail");
    };
    assert!(fcff.reinvestment_rate >= Decimal::ONE);
    assert_eq!(fcff.projection.path, ProjectionPath::NegativeFcfAdjusted);
    assert!(!out.warnings.is_empty());
}

// ===========================================================================
// Failure modes
// ===========================================================================

#[test]
fn test_missing_operating_income_is_insufficient_data() {
    let mut periods: Vec<StatementSnapshot> = volatile_leverage().periods().to_vec();
    periods[0].income.ebit = None;
    periods[0].income.pretax_income = None;
    let e = engine_with(
        "GAP",
        CompanyData {
            profile: industrial_profile(),
            statements: StatementHistory::new(periods).unwrap(),
        },
        dec!(4.2),
    );
    assert!(matches!(
        e.fair_value("GAP", 5, 5),
        Err(ValuationError::InsufficientData(_))
    ));
}

#[test]
fn test_pretax_income_fallback_warns() {
    let mut periods: Vec<StatementSnapshot> = volatile_leverage().periods().to_vec();
    periods[0].income.ebit = None;
    let e = engine_with(
        "PRETAX",
        CompanyData {
            profile: industrial_profile(),
            statements: StatementHistory::new(periods).unwrap(),
        },
        dec!(4.2),
    );
    // Averaged EBIT still needs every period, so only the capital step runs.
    let out = e.capital("PRETAX").unwrap();
    assert!(out.warnings.iter().any(|w| w.contains("pretax")));
}

#[test]
fn test_unknown_ticker_is_insufficient_data() {
    assert!(matches!(
        engine().fair_value("NOPE", 5, 5),
        Err(ValuationError::InsufficientData(_))
    ));
}

#[test]
fn test_unmapped_country_is_configuration_error() {
    let mut profile = industrial_profile();
    profile.country = "Atlantis".into();
    let e = engine_with(
        "ATL",
        CompanyData {
            profile,
            statements: volatile_leverage(),
        },
        dec!(4.2),
    );
    assert!(matches!(
        e.fair_value("ATL", 5, 5),
        Err(ValuationError::Configuration(_))
    ));
}

#[test]
fn test_low_discount_rate_diverges() {
    let mut profile = industrial_profile();
    profile.beta = dec!(0.1);
    let e = engine_with(
        "LOW",
        CompanyData {
            profile,
            statements: volatile_leverage(),
        },
        dec!(0.5),
    );
    assert!(matches!(
        e.fair_value("LOW", 5, 5),
        Err(ValuationError::DivergentTerminalValue { .. })
    ));
}

#[test]
fn test_longer_windows_than_history_is_insufficient_data() {
    let mut assumptions = ValuationAssumptions::default();
    assumptions.windows.ebit = 6;
    let e = engine().with_assumptions(assumptions);
    assert!(matches!(
        e.fair_value("FCFF", 5, 5),
        Err(ValuationError::InsufficientData(_))
    ));
}

// ===========================================================================
// Implied growth
// ===========================================================================

#[test]
fn test_implied_growth_reproduces_enterprise_value() {
    let out = engine().implied_growth("FCFF", dec!(0.03), 5).unwrap();
    let r = out.result;
    assert_eq!(r.ticker, "FCFF");
    assert_eq!(r.enterprise_value, b(dec!(60)));
    let rel = ((r.enterprise_value - out_projected(&r)) / r.enterprise_value).abs();
    assert!(rel < dec!(0.000001), "relative miss {rel}");
    // Graham: average EPS 10.5 * (8.5 + 2g)
    assert_eq!(r.average_diluted_eps, dec!(10.5));
    assert_eq!(
        r.graham_fair_value,
        dec!(10.5) * (dec!(8.5) + dec!(2) * r.implied_growth_rate)
    );
}

fn out_projected(r: &fair_value_core::ImpliedGrowthResult) -> Decimal {
    use fair_value_core::types::percent_to_rate;
    use fair_value_core::valuation::reverse_dcf::ReverseDcfModel;
    let model = ReverseDcfModel::new(
        dec!(6.32) * BILLION,
        r.reinvestment_rate,
        percent_to_rate(r.wacc),
        r.terminal_growth_rate,
        r.high_growth_period,
    )
    .unwrap();
    model
        .projected_enterprise_value(fair_value_core::types::percent_to_rate(r.implied_growth_rate))
        .unwrap()
}

#[test]
fn test_implied_growth_rejects_terminal_above_wacc() {
    assert!(matches!(
        engine().implied_growth("FCFF", dec!(0.20), 5),
        Err(ValuationError::DivergentTerminalValue { .. })
    ));
}
