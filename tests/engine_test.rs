//! End-to-end runs of the engine over synthetic candle sequences, using the
//! paper exchange and the in-memory store.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crossbot::db::{self, MemoryStore, StateStore};
use crossbot::exchange::{PaperExchange, SymbolFilters};
use crossbot::execution::{Engine, OrderExecutor};
use crossbot::models::{DailyStats, Position, PricePoint, TradeReason, TradeSide};
use crossbot::notify::LogNotifier;
use crossbot::risk::{DailyLimits, ExitRules};
use crossbot::strategy::{CrossoverConfig, CrossoverStrategy, MaKind};

const BOT_ID: &str = "e2e-bot";

fn filters() -> SymbolFilters {
    SymbolFilters {
        tick_size: 0.01,
        step_size: 0.001,
        min_notional: 10.0,
        price_precision: 2,
        quantity_precision: 3,
    }
}

struct Rig {
    paper: Arc<PaperExchange>,
    store: Arc<MemoryStore>,
    engine: Engine<PaperExchange>,
    clock: DateTime<Utc>,
}

impl Rig {
    async fn start(quote_balance: f64) -> Self {
        let paper = Arc::new(PaperExchange::new("BTCUSDT", "BTC", "USDT", filters()));
        paper.deposit("USDT", quote_balance);
        let store = Arc::new(MemoryStore::new());
        let clock = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();

        Self::assemble(paper, store, clock).await
    }

    /// Build the engine from whatever the store currently holds, the way a
    /// process restart would.
    async fn assemble(
        paper: Arc<PaperExchange>,
        store: Arc<MemoryStore>,
        clock: DateTime<Utc>,
    ) -> Self {
        let (position, stats) = db::load_state(store.as_ref(), BOT_ID, "BTC", "USDT", clock)
            .await
            .expect("load_state");

        let strategy = CrossoverStrategy::new(CrossoverConfig {
            kind: MaKind::Simple,
            short_period: 2,
            long_period: 3,
        });
        let exits = ExitRules {
            stop_loss_pct: -0.05,
            take_profit_pct: 0.5,
            trailing_stop_pct: 0.03,
        };
        let limits = DailyLimits {
            max_daily_loss: 1_000.0,
            max_daily_trades: 10,
        };
        let executor = OrderExecutor::new(
            paper.clone(),
            store.clone() as Arc<dyn StateStore>,
            BOT_ID,
            "BTCUSDT",
            "USDT",
            filters(),
        );

        let engine = Engine::new(
            BOT_ID,
            100.0,
            strategy,
            exits,
            limits,
            executor,
            store.clone() as Arc<dyn StateStore>,
            Arc::new(LogNotifier),
            position,
            stats,
        );

        Self {
            paper,
            store,
            engine,
            clock,
        }
    }

    async fn tick(&mut self, price: f64) {
        self.clock += Duration::minutes(5);
        self.paper.set_mark_price(price);
        self.engine
            .on_price(PricePoint {
                price,
                close_time: self.clock,
            })
            .await;
    }
}

#[tokio::test]
async fn test_full_cycle_entry_to_trailing_exit() {
    let mut rig = Rig::start(1_000.0).await;

    // Descending prices keep the short average under the long one.
    for price in [100.0, 99.0, 98.0, 98.0] {
        rig.tick(price).await;
        assert!(!rig.engine.position().holding);
        assert_eq!(rig.paper.orders_placed(), 0);
    }

    // Upward crossover: exactly one entry.
    rig.tick(120.0).await;
    let entry_price = {
        let position = rig.engine.position();
        assert!(position.holding);
        assert!(position.amount > 0.0);
        position.entry_price
    };
    assert_eq!(rig.paper.orders_placed(), 1);
    assert_eq!(rig.engine.stats().trade_count, 1);
    assert_eq!(rig.engine.stats().profit, 0.0);

    // New high raises the trailing floor to 125 * 0.97 = 121.25.
    rig.tick(125.0).await;
    assert!(rig.engine.position().holding);
    assert_eq!(rig.engine.position().highest_price, 125.0);

    // The pullback trips the trailing stop above entry: a profitable exit.
    rig.tick(121.0).await;
    let position = rig.engine.position();
    assert!(!position.holding);
    assert_eq!(position.amount, 0.0);
    assert_eq!(position.highest_price, 0.0);

    let stats = rig.engine.stats();
    assert_eq!(stats.trade_count, 2);
    assert!(stats.profit > 0.0);
    assert!((121.0 - entry_price) > 0.0);

    // Both fills hit the trade log, the sell tagged with its reason.
    let mut trades = rig.store.trades_for(BOT_ID);
    trades.sort_by_key(|t| t.order_id);
    assert_eq!(trades.len(), 2);
    assert_eq!(trades[0].side, TradeSide::Buy);
    assert_eq!(trades[0].reason, TradeReason::Signal);
    assert_eq!(trades[1].side, TradeSide::Sell);
    assert_eq!(trades[1].reason, TradeReason::TrailingStop);
    assert!(trades[1].profit > 0.0);

    // Write-through: the store already reflects the flat position.
    let (saved_position, saved_stats) = rig.store.load(BOT_ID).await.unwrap().unwrap();
    assert!(!saved_position.holding);
    assert_eq!(saved_stats.trade_count, 2);
}

#[tokio::test]
async fn test_restart_recovers_open_position_and_exits() {
    let paper = Arc::new(PaperExchange::new("BTCUSDT", "BTC", "USDT", filters()));
    paper.deposit("BTC", 1.0);
    let store = Arc::new(MemoryStore::new());
    let clock = Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap();

    // A previous session left an open position behind.
    let mut position = Position::flat("BTC", "USDT");
    position.open(1.0, 100.0);
    let mut stats = DailyStats::new(clock);
    stats.record_trade(0.0);
    store.save(BOT_ID, &position, &stats).await.unwrap();

    let mut rig = Rig::assemble(paper, store, clock).await;
    assert!(rig.engine.position().holding);
    assert_eq!(rig.engine.position().entry_price, 100.0);

    // First candles after the restart breach the -5% stop.
    rig.tick(90.0).await;

    assert!(!rig.engine.position().holding);
    let trades = rig.store.trades_for(BOT_ID);
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].reason, TradeReason::StopLoss);
    assert!((trades[0].profit - (-10.0)).abs() < 1e-9);
    assert_eq!(rig.engine.stats().trade_count, 2);
}

#[tokio::test]
async fn test_day_change_between_sessions_archives_once() {
    let store = Arc::new(MemoryStore::new());
    let yesterday = Utc.with_ymd_and_hms(2024, 8, 1, 20, 0, 0).unwrap();

    let mut stats = DailyStats::new(yesterday);
    stats.record_trade(0.0);
    stats.record_trade(17.5);
    let position = Position::flat("BTC", "USDT");
    store.save(BOT_ID, &position, &stats).await.unwrap();

    // Overnight restart.
    let today = Utc.with_ymd_and_hms(2024, 8, 2, 6, 0, 0).unwrap();
    let (_, stats) = db::load_state(store.as_ref(), BOT_ID, "BTC", "USDT", today)
        .await
        .unwrap();

    assert_eq!(stats.trade_count, 0);
    assert_eq!(stats.profit, 0.0);
    assert_eq!(stats.history.len(), 1);
    assert_eq!(stats.history[0].day, yesterday.date_naive());
    assert_eq!(stats.history[0].profit, 17.5);

    // The archived reset was persisted before being returned: a second load
    // the same day changes nothing.
    let (_, again) = db::load_state(store.as_ref(), BOT_ID, "BTC", "USDT", today)
        .await
        .unwrap();
    assert_eq!(again.history.len(), 1);
    assert_eq!(again.trade_count, 0);
}

#[tokio::test]
async fn test_entry_rejection_leaves_no_trace() {
    // Balance below one trade's notional: the buy is rejected before any
    // order reaches the exchange and the position stays flat.
    let mut rig = Rig::start(20.0).await;

    for price in [100.0, 99.0, 98.0, 98.0, 120.0] {
        rig.tick(price).await;
    }

    assert!(!rig.engine.position().holding);
    assert_eq!(rig.paper.orders_placed(), 0);
    assert_eq!(rig.engine.stats().trade_count, 0);
    assert!(rig.store.trades_for(BOT_ID).is_empty());
}
