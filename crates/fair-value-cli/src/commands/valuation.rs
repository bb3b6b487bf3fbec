use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use fair_value_core::config::ValuationAssumptions;
use fair_value_core::provider::{normalize_ticker, FinancialDataProvider, MarketDataset, StaticDataProvider};
use fair_value_core::reference::ReferenceTables;
use fair_value_core::types::percent_to_rate;
use fair_value_core::{FairValueEngine, ValuationResult};

use crate::input;
use crate::SourceArgs;

/// Arguments for a fair-value run
#[derive(Args)]
pub struct FairValueArgs {
    /// Ticker symbol (case-insensitive)
    #[arg(long)]
    pub ticker: String,

    /// Years of high growth before the fade
    #[arg(long, default_value = "5")]
    pub high_growth_period: u32,

    /// Years over which growth fades to the terminal rate
    #[arg(long, default_value = "5")]
    pub stable_growth_period: u32,
}

/// Arguments for the reverse DCF
#[derive(Args)]
#[command(allow_hyphen_values = true)]
pub struct ImpliedGrowthArgs {
    /// Ticker symbol (case-insensitive)
    #[arg(long)]
    pub ticker: String,

    /// Terminal growth rate in percent (e.g. 5 for 5%)
    #[arg(long, default_value = "5")]
    pub terminal_growth: Decimal,

    /// Years of growth at the implied rate
    #[arg(long, default_value = "8")]
    pub high_growth_period: u32,
}

/// Arguments for single-ticker lookups
#[derive(Args)]
pub struct TickerArgs {
    /// Ticker symbol (case-insensitive)
    #[arg(long)]
    pub ticker: String,
}

/// Arguments for valuing the whole dataset
#[derive(Args)]
pub struct BatchArgs {
    /// Comma-separated tickers; every ticker in the dataset when omitted
    #[arg(long, value_delimiter = ',')]
    pub tickers: Vec<String>,

    #[arg(long, default_value = "5")]
    pub high_growth_period: u32,

    #[arg(long, default_value = "5")]
    pub stable_growth_period: u32,
}

/// One line of a batch run. Failed tickers keep their row with the error.
#[derive(Serialize)]
struct BatchRow {
    ticker: String,
    regime: Option<String>,
    fair_value_per_share: Option<Decimal>,
    expected_growth_rate: Option<Decimal>,
    wacc: Option<Decimal>,
    error: Option<String>,
}

impl From<ValuationResult> for BatchRow {
    fn from(v: ValuationResult) -> Self {
        Self {
            ticker: v.ticker,
            regime: Some(v.regime.to_string()),
            fair_value_per_share: Some(v.fair_value_per_share),
            expected_growth_rate: Some(v.expected_growth_rate),
            wacc: Some(v.wacc),
            error: None,
        }
    }
}

pub fn run_fair_value(sources: &SourceArgs, args: FairValueArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (engine, _) = load_engine(sources)?;
    let result = engine.fair_value(&args.ticker, args.high_growth_period, args.stable_growth_period)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_implied_growth(
    sources: &SourceArgs,
    args: ImpliedGrowthArgs,
) -> Result<Value, Box<dyn std::error::Error>> {
    if args.terminal_growth.abs() < dec!(1) && !args.terminal_growth.is_zero() {
        warn!(
            terminal_growth = %args.terminal_growth,
            "--terminal-growth is in percent; did you mean {}?",
            args.terminal_growth * dec!(100)
        );
    }
    let (engine, _) = load_engine(sources)?;
    let result = engine.implied_growth(
        &args.ticker,
        percent_to_rate(args.terminal_growth),
        args.high_growth_period,
    )?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_capital(sources: &SourceArgs, args: TickerArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (engine, _) = load_engine(sources)?;
    Ok(serde_json::to_value(engine.capital(&args.ticker)?)?)
}

pub fn run_regime(sources: &SourceArgs, args: TickerArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (engine, _) = load_engine(sources)?;
    let regime = engine.regime(&args.ticker)?;
    Ok(serde_json::json!({
        "result": {
            "ticker": args.ticker.to_uppercase(),
            "regime": regime,
        }
    }))
}

pub fn run_batch(sources: &SourceArgs, args: BatchArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let (engine, tickers) = load_engine(sources)?;
    // Repeated tickers are valued once
    let engine = engine.with_cache();
    let tickers = if args.tickers.is_empty() { tickers } else { args.tickers };

    let results = value_batch(&engine, &tickers, args.high_growth_period, args.stable_growth_period);
    Ok(serde_json::json!({ "results": results }))
}

fn value_batch<P: FinancialDataProvider>(
    engine: &FairValueEngine<P>,
    tickers: &[String],
    high_growth_period: u32,
    stable_growth_period: u32,
) -> Vec<BatchRow> {
    tickers
        .iter()
        .map(|ticker| match engine.fair_value(ticker, high_growth_period, stable_growth_period) {
            Ok(out) => BatchRow::from(out.result.valuation),
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "valuation failed");
                BatchRow {
                    ticker: normalize_ticker(ticker),
                    regime: None,
                    fair_value_per_share: None,
                    expected_growth_rate: None,
                    wacc: None,
                    error: Some(e.to_string()),
                }
            }
        })
        .collect()
}

/// Build an engine from the dataset plus any overrides. Also returns the
/// dataset's tickers in sorted order.
fn load_engine(
    sources: &SourceArgs,
) -> Result<(FairValueEngine<StaticDataProvider>, Vec<String>), Box<dyn std::error::Error>> {
    let dataset: MarketDataset = if let Some(ref path) = sources.dataset {
        input::file::read_structured(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--dataset is required (or pipe a dataset on stdin)".into());
    };

    let provider = StaticDataProvider::new(dataset);
    let tickers = provider.tickers();
    let mut engine = FairValueEngine::new(provider);

    if let Some(ref path) = sources.assumptions {
        let assumptions: ValuationAssumptions = input::file::read_structured(path)?;
        engine = engine.with_assumptions(assumptions);
    }
    if let Some(ref path) = sources.tables {
        let tables: ReferenceTables = input::file::read_structured(path)?;
        engine = engine.with_tables(tables);
    }
    Ok((engine, tickers))
}
