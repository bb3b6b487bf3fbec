mod commands;
mod input;
mod output;

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::valuation::{BatchArgs, FairValueArgs, ImpliedGrowthArgs, TickerArgs};

/// Fair value per share from financial statements
#[derive(Parser)]
#[command(
    name = "fairval",
    version,
    about = "Fair value per share from financial statements",
    long_about = "A CLI for valuing listed companies with decimal precision. Picks between \
                  FCFF, FCFE and excess-return models from the firm's sector and leverage \
                  history, and solves for the growth rate implied by the market price."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log debug detail to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    sources: SourceArgs,
}

/// Where market data, assumptions and reference tables come from.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Market dataset (JSON or YAML); read from stdin when omitted
    #[arg(long, global = true)]
    pub dataset: Option<String>,

    /// Valuation assumptions overriding the defaults (JSON or YAML)
    #[arg(long, global = true)]
    pub assumptions: Option<String>,

    /// Reference tables overriding the built-in data (JSON or YAML)
    #[arg(long, global = true)]
    pub tables: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fair value per share under the regime the firm qualifies for
    FairValue(FairValueArgs),
    /// Growth rate implied by the market price, with the Graham value
    ImpliedGrowth(ImpliedGrowthArgs),
    /// Cost of debt, cost of equity, WACC, ROIC and ROC
    Capital(TickerArgs),
    /// Which valuation regime the firm falls into
    Regime(TickerArgs),
    /// Fair value for every ticker in the dataset
    Batch(BatchArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let sources = cli.sources;
    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::FairValue(args) => commands::valuation::run_fair_value(&sources, args),
        Commands::ImpliedGrowth(args) => commands::valuation::run_implied_growth(&sources, args),
        Commands::Capital(args) => commands::valuation::run_capital(&sources, args),
        Commands::Regime(args) => commands::valuation::run_regime(&sources, args),
        Commands::Batch(args) => commands::valuation::run_batch(&sources, args),
        Commands::Version => {
            println!("fairval {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
