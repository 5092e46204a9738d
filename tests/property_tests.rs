//! Property tests for the risk and pairlist invariants.
//!
//! 1. Stop prices never decrease and the high-water mark tracks the running
//!    maximum, for any price path and trailing setup
//! 2. Trailing activation is one-way
//! 3. A fixed stop never moves
//! 4. ROI decisions are deterministic and monotone in profit
//! 5. A seeded shuffle is reproducible and is a permutation
//! 6. Blacklisted and inactive pairs never reach the whitelist

use chrono::Utc;
use proptest::prelude::*;
use std::collections::HashMap;

use tradeguard::config::{ShuffleFilterConfig, StageConfig, StaticPairListConfig, StoplossConfig};
use tradeguard::execution::Position;
use tradeguard::pairlist::{PairlistContext, PairlistManager, ShuffleFilter};
use tradeguard::risk::roi::RoiDecision;
use tradeguard::risk::{RoiTable, StoplossPolicy};
use tradeguard::{EngineConfig, Market, MarketCatalog};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price_path() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..500.0_f64, 1..60)
}

fn arb_trailing_config() -> impl Strategy<Value = StoplossConfig> {
    (
        -0.5..-0.01_f64,
        prop::option::of(0.005..0.2_f64),
        0.0..0.3_f64,
        any::<bool>(),
    )
        .prop_filter_map("invalid trailing combination", |(sl, positive, offset, only)| {
            let config = StoplossConfig {
                stoploss: sl,
                trailing_stop: true,
                trailing_stop_positive: positive,
                trailing_stop_positive_offset: offset,
                trailing_only_offset_is_reached: only,
            };
            StoplossPolicy::new(&config).ok().map(|_| config)
        })
}

fn arb_roi_table() -> impl Strategy<Value = RoiTable> {
    prop::collection::btree_map(0u32..600, -0.5..0.5_f64, 1..6)
        .prop_filter_map("valid table", |entries| RoiTable::new(entries).ok())
}

fn pair_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("P{}/USDT", i)).collect()
}

// ── 1-3. Stoploss ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn stop_never_decreases(config in arb_trailing_config(), path in arb_price_path(), entry in 10.0..200.0_f64) {
        let policy = StoplossPolicy::new(&config).unwrap();
        let mut state = policy.initial_state(entry);
        let mut last_stop = state.current_stop_price;
        let mut expected_high = entry;

        for price in path {
            let profit = price / entry - 1.0;
            let was_activated = state.trailing_activated;
            let update = state.apply_tick("P/USDT", price, profit);
            prop_assert!(update.is_ok());
            let update = update.unwrap();
            prop_assert!(update.stop_price >= last_stop);
            prop_assert_eq!(update.triggered, price <= update.stop_price);
            last_stop = update.stop_price;

            // Waiting for the offset freezes the mark at entry; crossing it
            // restarts the mark at that tick's price
            if config.trailing_only_offset_is_reached && !was_activated {
                if update.trailing_activated {
                    expected_high = price;
                }
            } else {
                expected_high = expected_high.max(price);
            }
            prop_assert_eq!(state.high_water_price, expected_high);
        }
    }

    #[test]
    fn trailing_activation_is_one_way(config in arb_trailing_config(), path in arb_price_path()) {
        let entry = 100.0;
        let policy = StoplossPolicy::new(&config).unwrap();
        let mut state = policy.initial_state(entry);
        let mut activated = false;

        for price in path {
            let update = state.apply_tick("P/USDT", price, price / entry - 1.0).unwrap();
            if activated {
                prop_assert!(update.trailing_activated);
            }
            activated = update.trailing_activated;
        }
    }

    #[test]
    fn fixed_stop_never_moves(sl in -0.9..-0.001_f64, path in arb_price_path()) {
        let entry = 100.0;
        let policy = StoplossPolicy::fixed(sl).unwrap();
        let mut state = policy.initial_state(entry);
        let initial = state.current_stop_price;

        for price in path {
            let update = state.apply_tick("P/USDT", price, price / entry - 1.0).unwrap();
            prop_assert_eq!(update.stop_price, initial);
            prop_assert!(!update.trailing_activated);
        }
    }

    #[test]
    fn zero_fee_profit_matches_price_change(entry in 0.01..1000.0_f64, rate in 0.01..1000.0_f64) {
        let position = Position::open(
            "P/USDT",
            entry,
            1.0,
            Utc::now(),
            &Default::default(),
            &StoplossPolicy::fixed(-0.1).unwrap(),
        )
        .unwrap();
        prop_assert!((position.profit_ratio(rate) - (rate / entry - 1.0)).abs() < 1e-9);
    }
}

// ── 4. ROI ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn roi_is_deterministic(table in arb_roi_table(), minutes in 0.0..1000.0_f64, profit in -1.0..1.0_f64) {
        prop_assert_eq!(table.evaluate(minutes, profit), table.evaluate(minutes, profit));
    }

    #[test]
    fn more_profit_never_turns_exit_into_hold(
        table in arb_roi_table(),
        minutes in 0.0..1000.0_f64,
        profit in -1.0..1.0_f64,
        extra in 0.0..1.0_f64,
    ) {
        if table.evaluate(minutes, profit) == RoiDecision::Exit {
            prop_assert_eq!(table.evaluate(minutes, profit + extra), RoiDecision::Exit);
        }
    }
}

// ── 5-6. Pairlist ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn seeded_shuffle_is_reproducible_permutation(seed in any::<u64>(), n in 0usize..30) {
        let pairs = pair_names(n);
        let first = ShuffleFilter::new(Some(seed)).filter(&pairs);
        let second = ShuffleFilter::new(Some(seed)).filter(&pairs);
        prop_assert_eq!(&first, &second);

        let mut sorted = first.clone();
        sorted.sort();
        let mut expected = pairs.clone();
        expected.sort();
        prop_assert_eq!(sorted, expected);
    }

    #[test]
    fn whitelist_excludes_blacklisted_and_inactive(
        flags in prop::collection::vec((any::<bool>(), any::<bool>(), any::<bool>()), 1..20),
        seed in any::<u64>(),
    ) {
        // Per pair: blacklisted, inactive, has an open position
        let pairs = pair_names(flags.len());
        let mut markets = MarketCatalog::new();
        let mut blacklist = Vec::new();
        let mut open = Vec::new();
        for (pair, (blacklisted, inactive, has_position)) in pairs.iter().zip(&flags) {
            let base = pair.trim_end_matches("/USDT");
            let mut market = Market::new(base, "USDT", 0.01);
            market.active = !inactive;
            markets.insert(pair.clone(), market);
            if *blacklisted {
                blacklist.push(pair.clone());
            }
            if *has_position {
                open.push(pair.clone());
            }
        }

        let mut config = EngineConfig::default();
        config.pairlist.whitelist = pairs.clone();
        config.pairlist.blacklist = blacklist.clone();
        config.pairlist.stages = vec![
            StageConfig::StaticPairList(StaticPairListConfig::default()),
            StageConfig::ShuffleFilter(ShuffleFilterConfig { seed: Some(seed), refresh_period: 0 }),
        ];
        let mut manager = PairlistManager::new(&config).unwrap();

        let tickers = HashMap::new();
        let performance = HashMap::new();
        let daily_candles = HashMap::new();
        let ctx = PairlistContext {
            markets: &markets,
            tickers: &tickers,
            open_pairs: &open,
            performance: &performance,
            daily_candles: &daily_candles,
        };
        let whitelist = manager.refresh_pairlist(Utc::now(), &ctx).unwrap();

        for (pair, (blacklisted, inactive, _)) in pairs.iter().zip(&flags) {
            let listed = whitelist.contains(pair);
            prop_assert_eq!(listed, !blacklisted && !inactive, "pair {}", pair);
        }
        let mut deduped = whitelist.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(deduped.len(), whitelist.len());
    }
}
