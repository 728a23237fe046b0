//! Command line interface for the CLMM LP backtester.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use clmm_backtest_domain::PoolConfig;
use clmm_backtest_engine::prelude::*;
use prettytable::{Table, row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "clmm-backtest")]
#[command(about = "Backtester for concentrated-liquidity LP strategies", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest over historical prices and swaps
    Backtest {
        /// Price series CSV with columns: time,price
        #[arg(long)]
        prices: PathBuf,

        /// Swap log CSV with columns:
        /// time,tick,token_in,traded_in,virtual_liquidity
        #[arg(long)]
        swaps: Option<PathBuf>,

        /// USD quotes for token 0, CSV with columns: time,price
        #[arg(long)]
        usd: Option<PathBuf>,

        /// Pool fee tier as a fraction (e.g. 0.0003)
        #[arg(long, default_value = "0.003")]
        fee_tier: Decimal,

        /// Decimals of token 0
        #[arg(long, default_value_t = 6)]
        decimals_0: u32,

        /// Decimals of token 1
        #[arg(long, default_value_t = 18)]
        decimals_1: u32,

        /// Initial token 0 balance
        #[arg(long, default_value = "1000")]
        initial_0: Decimal,

        /// Initial token 1 balance
        #[arg(long, default_value = "0")]
        initial_1: Decimal,

        /// Rebalance policy
        #[arg(long, value_enum, default_value_t = PolicyKind::Fixed)]
        policy: PolicyKind,

        /// Base range width parameter
        #[arg(long, default_value = "0.1")]
        alpha: Decimal,

        /// Reset band width parameter
        #[arg(long, default_value = "0.2")]
        tau: Decimal,

        /// Target ratio for the limit-imbalance trigger
        #[arg(long, default_value = "0.5")]
        limit_parameter: Decimal,

        /// Volatility collapse ratio (forecast policy)
        #[arg(long, default_value = "0.5")]
        vol_reset_ratio: Decimal,

        /// Minutes between volatility re-checks (forecast policy)
        #[arg(long, default_value_t = 60)]
        check_interval: i64,

        /// Write records, rebalances and the summary as JSON
        #[arg(long)]
        json_out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PolicyKind {
    /// Fixed proportional bands around the placement price
    Fixed,
    /// AR(1) + EWMA forecast-driven bands
    Forecast,
    /// Bands from the empirical return distribution
    Quantile,
}

#[derive(Debug, Deserialize)]
struct UsdRow {
    time: DateTime<Utc>,
    price: Decimal,
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    summary: &'a StrategySummary,
    rebalances: &'a [RebalanceEvent],
    records: &'a [StepRecord],
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest {
            prices,
            swaps,
            usd,
            fee_tier,
            decimals_0,
            decimals_1,
            initial_0,
            initial_1,
            policy,
            alpha,
            tau,
            limit_parameter,
            vol_reset_ratio,
            check_interval,
            json_out,
        } => {
            let price_series = load_prices(&prices)?;
            let swap_series = match &swaps {
                Some(path) => load_swaps(path)?,
                None => SwapSeries::empty(),
            };
            let usd_series = match &usd {
                Some(path) => Some(load_usd(path)?),
                None => None,
            };
            let pool = PoolConfig::new(fee_tier, decimals_0, decimals_1);

            let mut policy = build_policy(
                policy,
                alpha,
                tau,
                limit_parameter,
                vol_reset_ratio,
                check_interval,
                &price_series,
            )?;

            let output = run(
                &price_series,
                &swap_series,
                &pool,
                initial_0,
                initial_1,
                policy.as_mut(),
            )?;

            let records = build_series(&output.states, usd_series.as_deref());
            let summary = analyze(&records).map_err(|e| anyhow::anyhow!(e))?;

            print_summary(&summary);

            if let Some(path) = json_out {
                let file = File::create(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                serde_json::to_writer_pretty(
                    file,
                    &RunReport {
                        summary: &summary,
                        rebalances: &output.rebalances,
                        records: &records,
                    },
                )?;
                info!(path = %path.display(), "report written");
            }
            Ok(())
        }
    }
}

fn build_policy(
    kind: PolicyKind,
    alpha: Decimal,
    tau: Decimal,
    limit_parameter: Decimal,
    vol_reset_ratio: Decimal,
    check_interval: i64,
    prices: &PriceSeries,
) -> Result<Box<dyn RebalancePolicy>> {
    let policy: Box<dyn RebalancePolicy> = match kind {
        PolicyKind::Fixed => Box::new(RangeExitPolicy::new(alpha, tau, limit_parameter)),
        PolicyKind::Forecast => Box::new(
            ForecastPolicy::new(
                alpha,
                tau,
                limit_parameter,
                vol_reset_ratio,
                Ar1EwmaForecaster::default(),
                prices.returns(),
            )
            .with_check_interval(check_interval),
        ),
        PolicyKind::Quantile => {
            let returns: Vec<f64> = prices.returns().into_iter().map(|(_, r)| r).collect();
            if returns.is_empty() {
                bail!("quantile policy needs at least two price observations");
            }
            let ecdf = EmpiricalCdf::fit(&returns).map_err(|e| anyhow::anyhow!(e))?;
            Box::new(QuantilePolicy::new(alpha, tau, limit_parameter, ecdf))
        }
    };
    Ok(policy)
}

fn load_prices(path: &Path) -> Result<PriceSeries> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening price series {}", path.display()))?;
    let mut points = Vec::new();
    for row in reader.deserialize::<PricePoint>() {
        points.push(row.with_context(|| format!("parsing {}", path.display()))?);
    }
    info!(path = %path.display(), points = points.len(), "price series loaded");
    Ok(PriceSeries::new(points)?)
}

fn load_swaps(path: &Path) -> Result<SwapSeries> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening swap log {}", path.display()))?;
    let mut events = Vec::new();
    for row in reader.deserialize::<SwapEvent>() {
        events.push(row.with_context(|| format!("parsing {}", path.display()))?);
    }
    info!(path = %path.display(), events = events.len(), "swap log loaded");
    Ok(SwapSeries::new(events)?)
}

fn load_usd(path: &Path) -> Result<Vec<(DateTime<Utc>, Decimal)>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening USD quotes {}", path.display()))?;
    let mut quotes = Vec::new();
    for row in reader.deserialize::<UsdRow>() {
        let row = row.with_context(|| format!("parsing {}", path.display()))?;
        quotes.push((row.time, row.price));
    }
    if !quotes.is_sorted_by_key(|(t, _)| *t) {
        bail!("USD quotes in {} are not time-sorted", path.display());
    }
    Ok(quotes)
}

fn print_summary(summary: &StrategySummary) {
    let mut table = Table::new();
    table.add_row(row!["metric", "value"]);
    for (name, value) in summary.as_map() {
        table.add_row(row![name, format!("{value:.6}")]);
    }
    table.printstd();
}
