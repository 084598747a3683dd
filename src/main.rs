//! # Run a backtest over a chains CSV
//! lattice-backtest run --chains data/chains.csv --config config/default.toml
//!
//! # Price a single contract on the lattice
//! lattice-backtest price --spot 100 --strike 100 --vol 0.2 --option-type put

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use lattice_backtest::backtest::{BacktestConfig, Backtester};
use lattice_backtest::data::{ChainLoader, InMemoryHistory, OptionChain, OptionType, YahooClient};
use lattice_backtest::pricing::AmericanBinomial;
use lattice_backtest::volatility::{lookback_start, GarchForecaster};

#[derive(Parser)]
#[command(name = "lattice-backtest")]
#[command(about = "American option lattice pricing and mispricing backtest")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest over historical option chains
    Run {
        /// Path to the chains CSV
        #[arg(short = 'i', long)]
        chains: PathBuf,

        /// Path to configuration file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Write per-contract trade records as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Price a single American option on the lattice
    Price {
        #[arg(long)]
        spot: f64,

        #[arg(long)]
        strike: f64,

        /// One-period volatility
        #[arg(long)]
        vol: f64,

        /// Per-step risk-free rate
        #[arg(long, default_value_t = 0.0)]
        rate: f64,

        #[arg(long, default_value_t = 1)]
        steps: usize,

        /// Maturity in lattice time units
        #[arg(long, default_value_t = 1.0)]
        maturity: f64,

        /// "call" or "put"
        #[arg(long)]
        option_type: String,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<BacktestConfig> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
        }
        None => Ok(BacktestConfig::default()),
    }
}

/// Prefetch daily paths and monthly return history for every chain.
async fn prefetch_history(
    chains: &[OptionChain],
    config: &BacktestConfig,
) -> Result<InMemoryHistory> {
    let mut client = YahooClient::new();
    let mut history = InMemoryHistory::new();

    let pb = ProgressBar::new(chains.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    for chain in chains {
        pb.set_message(format!("{} {}", chain.ticker, chain.valuation_date));
        let Some(expiry) = chain.strike_date() else {
            pb.inc(1);
            continue;
        };

        match client
            .daily_history(&chain.ticker, chain.valuation_date, expiry)
            .await
        {
            Ok(bars) => history.insert_daily(&chain.ticker, bars),
            Err(e) => warn!(ticker = %chain.ticker, "daily history fetch failed: {e}"),
        }

        let start = lookback_start(chain.valuation_date, config.garch.lookback_years);
        match client
            .monthly_history(&chain.ticker, start, chain.valuation_date)
            .await
        {
            Ok(bars) => history.insert_monthly(&chain.ticker, bars),
            Err(e) => warn!(ticker = %chain.ticker, "monthly history fetch failed: {e}"),
        }

        pb.inc(1);
    }

    pb.finish_with_message(format!("{} requests", client.request_count()));
    Ok(history)
}

async fn cmd_run(
    chains_path: &PathBuf,
    config_path: Option<&PathBuf>,
    output: Option<&PathBuf>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let chains_str = chains_path
        .to_str()
        .with_context(|| format!("non-UTF-8 path {}", chains_path.display()))?;
    let chains = ChainLoader::new(chains_str).load_chains()?;
    println!("Loaded {} chains from {}", chains.len(), chains_path.display());

    let history = prefetch_history(&chains, &config).await?;
    let forecaster = GarchForecaster::new(&history, config.garch.clone());
    let backtester = Backtester::new(config, &history, &forecaster);

    let result = backtester.run(&chains);
    println!("{}", result.summary());

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&result.records)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {} trade records to {}", result.records.len(), path.display());
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lattice_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            chains,
            config,
            output,
        } => {
            cmd_run(&chains, config.as_ref(), output.as_ref()).await?;
        }
        Commands::Price {
            spot,
            strike,
            vol,
            rate,
            steps,
            maturity,
            option_type,
        } => {
            let Some(option_type) = OptionType::from_str(&option_type) else {
                bail!("unknown option type {:?}, expected \"call\" or \"put\"", option_type);
            };
            let pricer = AmericanBinomial { rate, steps };
            let value = pricer.price(spot, strike, maturity, vol, option_type)?;
            println!("{:.6}", value);
        }
    }

    Ok(())
}
