use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use tradeguard::backtest::SyntheticFeed;
use tradeguard::config::{load_from_str, StageConfig, StoplossConfig, VolumePairListConfig};
use tradeguard::dry_run::DryRunEngine;
use tradeguard::execution::{
    select_order_price, ExecutionAction, Executor, ExitReason, HoldReason, Position, PositionBook,
    RoundInputs, TimeoutHook,
};
use tradeguard::risk::{RoiTable, StoplossPolicy};
use tradeguard::strategy::{BuyAndHoldStrategy, MaCrossStrategy, Strategy};
use tradeguard::{
    BookLevel, BookSide, EngineConfig, OrderBookSnapshot, OrderSide, PendingOrder, RunMode,
    Signals, Ticker,
};

fn ticker(pair: &str, bid: f64, ask: f64, last: Option<f64>) -> Ticker {
    Ticker {
        pair: pair.to_string(),
        bid,
        ask,
        last,
        quote_volume: None,
        bid_volume: None,
        ask_volume: None,
        timestamp: Utc::now(),
    }
}

fn book(pair: &str, bids: &[f64], asks: &[f64]) -> OrderBookSnapshot {
    let levels = |prices: &[f64]| -> Vec<BookLevel> {
        prices
            .iter()
            .map(|&price| BookLevel {
                price,
                quantity: 1.0,
            })
            .collect()
    };
    OrderBookSnapshot {
        pair: pair.to_string(),
        bids: levels(bids),
        asks: levels(asks),
        timestamp: Utc::now(),
    }
}

struct Round {
    tickers: HashMap<String, Ticker>,
    books: HashMap<String, OrderBookSnapshot>,
    signals: HashMap<String, Signals>,
}

impl Round {
    fn at_price(pair: &str, price: f64) -> Self {
        Self {
            tickers: HashMap::from([(pair.to_string(), ticker(pair, price, price, Some(price)))]),
            books: HashMap::new(),
            signals: HashMap::new(),
        }
    }

    fn inputs(&self, now: DateTime<Utc>) -> RoundInputs<'_> {
        RoundInputs {
            now,
            tickers: &self.tickers,
            books: &self.books,
            signals: &self.signals,
        }
    }
}

#[test]
fn test_trailing_stop_lifecycle() {
    let config = EngineConfig {
        stoploss: StoplossConfig {
            stoploss: -0.10,
            trailing_stop: true,
            trailing_stop_positive: Some(0.02),
            trailing_stop_positive_offset: 0.05,
            trailing_only_offset_is_reached: true,
        },
        ..EngineConfig::default()
    };
    config.validate().unwrap();

    let executor = Executor::new(config.clone()).unwrap();
    let policy = StoplossPolicy::new(&config.stoploss).unwrap();
    let mut positions = PositionBook::new(config.fees, policy);
    let start = Utc::now();
    positions.open_position("ETH/USDT", 100.0, 1.0, start).unwrap();

    // Below the offset the stop stays at 90
    for (minute, price) in [(1, 103.0), (2, 101.0), (3, 104.0)] {
        let round = Round::at_price("ETH/USDT", price);
        let report = executor
            .evaluate_exits(positions.positions_mut(), &round.inputs(start + Duration::minutes(minute)))
            .unwrap();
        assert_eq!(report.exits().count(), 0);
        let stop = positions.all_positions()[0].stoploss.current_stop_price;
        assert!((stop - 90.0).abs() < 1e-9);
    }

    // Offset reached at 110: trail 2% below the new high
    let round = Round::at_price("ETH/USDT", 110.0);
    executor
        .evaluate_exits(positions.positions_mut(), &round.inputs(start + Duration::minutes(4)))
        .unwrap();
    let state = &positions.all_positions()[0].stoploss;
    assert!(state.trailing_activated);
    assert!((state.current_stop_price - 107.8).abs() < 1e-9);

    // Pullback through the trailing stop
    let round = Round::at_price("ETH/USDT", 107.0);
    let report = executor
        .evaluate_exits(positions.positions_mut(), &round.inputs(start + Duration::minutes(5)))
        .unwrap();
    let exit = report.exits().next().unwrap();
    assert_eq!(
        exit.action,
        ExecutionAction::Exit {
            reason: ExitReason::TrailingStopLoss,
            price: 107.0
        }
    );
}

#[test]
fn test_round_skips_pairs_without_data() {
    let config = EngineConfig::default();
    let executor = Executor::new(config.clone()).unwrap();
    let now = Utc::now();
    let policy = StoplossPolicy::new(&config.stoploss).unwrap();
    let mut positions = vec![
        Position::open("ETH/USDT", 100.0, 1.0, now, &config.fees, &policy).unwrap(),
        Position::open("SOL/USDT", 20.0, 1.0, now, &config.fees, &policy).unwrap(),
    ];

    let round = Round::at_price("SOL/USDT", 21.0);
    let report = executor.evaluate_exits(&mut positions, &round.inputs(now)).unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].pair, "ETH/USDT");
    assert_eq!(report.decisions.len(), 1);
    assert_eq!(
        report.decisions[0].action,
        ExecutionAction::Hold(HoldReason::NoExitCondition)
    );
}

#[test]
fn test_exit_priced_from_first_roi_level() {
    let toml = r#"
        [minimal_roi]
        "0" = 0.03

        [exit]
        use_order_book = true
        price_side = "ask"
        order_book_min = 1
        order_book_max = 3
    "#;
    let config = load_from_str(toml).unwrap();
    let executor = Executor::new(config.clone()).unwrap();
    let now = Utc::now();
    let policy = StoplossPolicy::new(&config.stoploss).unwrap();
    let mut positions =
        vec![Position::open("ETH/USDT", 100.0, 1.0, now, &config.fees, &policy).unwrap()];

    let mut round = Round::at_price("ETH/USDT", 101.0);
    round.tickers.insert("ETH/USDT".to_string(), ticker("ETH/USDT", 103.5, 103.6, Some(103.5)));
    round.books.insert(
        "ETH/USDT".to_string(),
        book("ETH/USDT", &[103.5, 103.4], &[102.0, 102.9, 103.2]),
    );

    let report = executor.evaluate_exits(&mut positions, &round.inputs(now)).unwrap();
    match &report.decisions[0].action {
        ExecutionAction::Exit { reason, price } => {
            assert_eq!(*reason, ExitReason::Roi);
            // Level 1 is 2% profit, level 3 is the first at or above 3%
            assert_eq!(*price, 103.2);
        }
        other => panic!("expected an exit, got {:?}", other),
    }
}

#[test]
fn test_entry_price_from_order_book() {
    let toml = r#"
        [entry]
        use_order_book = true
        order_book_top = 2
    "#;
    let config = load_from_str(toml).unwrap();
    let t = ticker("ETH/USDT", 99.0, 100.0, Some(99.5));
    let b = book("ETH/USDT", &[99.0, 98.0], &[100.0, 100.5]);

    let price = select_order_price(OrderSide::Entry, &config, "ETH/USDT", Some(&t), Some(&b), |_| true);
    assert_eq!(price.unwrap(), 100.5);
    assert_eq!(b.price_at(BookSide::Bid, 2), Some(98.0));
}

struct CancelWhenAskMovedAway;

impl TimeoutHook for CancelWhenAskMovedAway {
    fn check_timeout(
        &self,
        _pair: &str,
        _position: Option<&Position>,
        order: &PendingOrder,
        book: Option<&OrderBookSnapshot>,
    ) -> bool {
        book.and_then(|b| b.price_at(BookSide::Ask, 1))
            .is_some_and(|ask| ask > order.price * 1.01)
    }
}

#[test]
fn test_timeout_hook_replaces_elapsed_rule() {
    let now = Utc::now();
    let order = |id: &str, pair: &str, price: f64| PendingOrder {
        id: id.to_string(),
        pair: pair.to_string(),
        side: OrderSide::Entry,
        price,
        quantity: 1.0,
        // Long past the 10 minute default
        submitted_at: now - Duration::hours(2),
        timeout_minutes: None,
    };
    let orders = vec![order("a", "ETH/USDT", 100.0), order("b", "SOL/USDT", 20.0)];

    let round = Round {
        tickers: HashMap::new(),
        books: HashMap::from([
            ("ETH/USDT".to_string(), book("ETH/USDT", &[102.0], &[102.5])),
            ("SOL/USDT".to_string(), book("SOL/USDT", &[19.9], &[20.1])),
        ]),
        signals: HashMap::new(),
    };

    let plain = Executor::new(EngineConfig::default()).unwrap();
    assert_eq!(plain.expired_orders(&orders, &[], &round.inputs(now)), vec!["a", "b"]);

    let hooked = Executor::new(EngineConfig::default())
        .unwrap()
        .with_timeout_hook(Arc::new(CancelWhenAskMovedAway));
    assert_eq!(hooked.expired_orders(&orders, &[], &round.inputs(now)), vec!["a"]);
}

#[test]
fn test_backtest_mode_never_times_out() {
    let config = EngineConfig {
        run_mode: RunMode::Backtest,
        ..EngineConfig::default()
    };
    let executor = Executor::new(config).unwrap();
    let now = Utc::now();
    let orders = vec![PendingOrder {
        id: "old".to_string(),
        pair: "ETH/USDT".to_string(),
        side: OrderSide::Exit,
        price: 100.0,
        quantity: 1.0,
        submitted_at: now - Duration::days(3),
        timeout_minutes: Some(1),
    }];
    let round = Round::at_price("ETH/USDT", 100.0);
    assert!(executor.expired_orders(&orders, &[], &round.inputs(now)).is_empty());
}

#[test]
fn test_strategy_overrides_resolve_config() {
    let strategy = MaCrossStrategy::default()
        .with_stoploss(-0.04)
        .with_minimal_roi(RoiTable::new([(0, 0.01)]).unwrap());
    let config = EngineConfig::default()
        .with_strategy_overrides(&strategy)
        .unwrap();

    assert_eq!(config.stoploss.stoploss, -0.04);
    assert_eq!(config.minimal_roi.required_profit(0.0), Some(0.01));

    let broken = MaCrossStrategy::default().with_stoploss(0.02);
    assert!(EngineConfig::default().with_strategy_overrides(&broken).is_err());
    assert_eq!(strategy.name(), "MaCross");
}

#[tokio::test]
async fn test_dry_run_rounds() {
    let _ = tracing_subscriber::fmt::try_init();

    let mut config = EngineConfig::default();
    config.pairlist.stages = vec![StageConfig::VolumePairList(VolumePairListConfig {
        number_assets: 5,
        ..VolumePairListConfig::default()
    })];
    config.pairlist.blacklist = vec!["DOGE/USDT".to_string()];

    let feed = Arc::new(SyntheticFeed::with_default_markets(7, 5));
    let mut engine =
        DryRunEngine::new(&config, Arc::new(BuyAndHoldStrategy), feed.clone(), 100.0).unwrap();

    let summaries = engine
        .run_rounds(40, std::time::Duration::from_millis(1), || feed.advance())
        .await
        .unwrap();

    assert_eq!(summaries.len(), 40);
    for summary in &summaries {
        assert!(!summary.whitelist.contains(&"DOGE/USDT".to_string()));
        assert!(!summary.whitelist.contains(&"OLD/USDT".to_string()));
        assert!(!summary.whitelist.contains(&"ETH/BTC".to_string()));
    }

    let filled: usize = summaries.iter().map(|s| s.filled).sum();
    assert!(filled > 0, "no simulated entry ever filled");
    assert!(engine.positions().all_positions().len() >= filled);

    // At most one open position per pair
    let mut open = engine.positions().open_pairs();
    let count = open.len();
    open.sort();
    open.dedup();
    assert_eq!(open.len(), count);
}
