use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::collections::BTreeMap;
use tracing_subscriber::EnvFilter;

use tradeguard::backtest::{
    loss_by_name, BacktestMetrics, BacktestRunner, MarketScenario, SyntheticDataGenerator,
};
use tradeguard::config::load_config;
use tradeguard::strategy::strategy_by_name;

/// Replay synthetic scenarios through the exit engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Scenario to run; all scenarios when omitted
    #[arg(long)]
    scenario: Option<String>,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 500)]
    candles: usize,

    #[arg(long, default_value_t = 5)]
    candle_minutes: i64,

    /// Strategy name (ma_cross, buy_and_hold)
    #[arg(long, default_value = "ma_cross")]
    strategy: String,

    /// Loss function used to score each run (only_profit, sharpe, short_trade_duration)
    #[arg(long, default_value = "sharpe")]
    loss: String,

    #[arg(long, default_value_t = 100.0)]
    stake_amount: f64,
}

const ALL_SCENARIOS: [MarketScenario; 6] = [
    MarketScenario::Uptrend,
    MarketScenario::Downtrend,
    MarketScenario::Sideways,
    MarketScenario::Volatile,
    MarketScenario::WithGaps,
    MarketScenario::Drawdown,
];

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tradeguard=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_config(args.config.as_deref()).context("loading configuration")?;
    let strategy = strategy_by_name(&args.strategy)?;
    let loss = loss_by_name(&args.loss)?;
    let runner = BacktestRunner::new(&config, strategy, args.stake_amount)
        .context("building backtest runner")?;

    let scenarios = match &args.scenario {
        Some(name) => vec![MarketScenario::from_name(name)?],
        None => ALL_SCENARIOS.to_vec(),
    };

    let start = Utc::now();
    let mut results = Vec::new();
    for scenario in scenarios {
        let pair = format!("SYNTH/{}", config.stake_currency);
        let candles = SyntheticDataGenerator::new(args.seed)
            .with_pair(pair.clone())
            .generate_from(start, scenario, args.candles, args.candle_minutes);
        let data = BTreeMap::from([(pair, candles)]);

        match runner.run(&data) {
            Ok(result) => {
                let score = loss.loss(&result.metrics.trades, result.start, result.end);
                println!("\n--- {:?} ---", scenario);
                result.metrics.print_report();
                results.push((scenario, score, result.metrics));
            }
            Err(e) => eprintln!("Backtest failed for {:?}: {}", scenario, e),
        }
    }

    print_summary(&results, loss.name());
    Ok(())
}

fn print_summary(results: &[(MarketScenario, f64, BacktestMetrics)], loss_name: &str) {
    println!("\n=== SCENARIO COMPARISON ===\n");
    println!(
        "{:<12} {:>12} {:>8} {:>8} {:>12}",
        "Scenario", "Profit", "Trades", "Win%", loss_name
    );
    println!("{}", "-".repeat(56));

    for (scenario, score, metrics) in results {
        println!(
            "{:<12} {:>12.4} {:>8} {:>8.1} {:>12.4}",
            format!("{:?}", scenario),
            metrics.total_profit_abs,
            metrics.total_trades,
            metrics.win_rate,
            score
        );
    }

    if let Some((best, score, _)) = results.iter().min_by(|a, b| a.1.total_cmp(&b.1)) {
        println!("\nBest by {}: {:?} ({:.4})", loss_name, best, score);
    }
}
