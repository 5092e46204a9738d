use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use tradeguard::backtest::SyntheticFeed;
use tradeguard::config::load_config;
use tradeguard::dry_run::DryRunEngine;
use tradeguard::strategy::strategy_by_name;

/// Paper-trade against a seeded synthetic exchange
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Number of decision rounds to run
    #[arg(long, default_value_t = 50)]
    rounds: usize,

    /// Wall-clock seconds between rounds
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    throttle_secs: u64,

    /// Simulated minutes that pass per round
    #[arg(long, default_value_t = 5)]
    candle_minutes: i64,

    /// Seed for the synthetic market
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Strategy name (ma_cross, buy_and_hold)
    #[arg(long, default_value = "ma_cross")]
    strategy: String,

    /// Stake per trade, in stake currency
    #[arg(long, default_value_t = 100.0)]
    stake_amount: f64,
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tradeguard=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    setup_logging();

    let config = load_config(args.config.as_deref()).context("loading configuration")?;
    let strategy = strategy_by_name(&args.strategy)?;

    tracing::info!(
        run_mode = ?config.run_mode,
        stake_currency = %config.stake_currency,
        strategy = strategy.name(),
        rounds = args.rounds,
        "tradeguard starting"
    );

    let feed = Arc::new(SyntheticFeed::with_default_markets(args.seed, args.candle_minutes));
    // Warm up enough history for the strategy's first signals
    for _ in 0..strategy.min_candles_required() {
        feed.advance()?;
    }

    let mut engine = DryRunEngine::new(&config, strategy, feed.clone(), args.stake_amount)
        .context("building dry-run engine")?;

    let throttle = std::time::Duration::from_secs(args.throttle_secs);
    let summaries = engine
        .run_rounds(args.rounds, throttle, || feed.advance())
        .await?;

    let closed = engine
        .positions()
        .all_positions()
        .iter()
        .filter(|p| !p.is_open())
        .count();
    println!("\n=== DRY RUN SUMMARY ===\n");
    println!("Rounds completed:  {}", summaries.len());
    println!("Closed trades:     {}", closed);
    println!("Open positions:    {}", engine.positions().open_positions().len());
    println!("Pending orders:    {}", engine.pending_orders().len());
    println!("Realized profit:   {:.4} {}", engine.positions().total_profit(), config.stake_currency);
    println!("Final whitelist:   {}", engine.pairlist().whitelist().join(", "));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_throttle_rejected_by_parser() {
        assert!(Args::try_parse_from(["tradeguard", "--throttle-secs", "0"]).is_err());
        let args = Args::try_parse_from(["tradeguard", "--throttle-secs", "2"]).unwrap();
        assert_eq!(args.throttle_secs, 2);
    }
}
