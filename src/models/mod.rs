use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Days of archived profit kept in memory. Older entries stay in the store.
const HISTORY_CAP: usize = 90;

/// A single closed-candle observation from the price feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub close_time: DateTime<Utc>,
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(TradeSide::Buy),
            "SELL" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// Why an order was submitted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeReason {
    Signal,
    StopLoss,
    TakeProfit,
    TrailingStop,
}

impl TradeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeReason::Signal => "SIGNAL",
            TradeReason::StopLoss => "STOP_LOSS",
            TradeReason::TakeProfit => "TAKE_PROFIT",
            TradeReason::TrailingStop => "TRAILING_STOP",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SIGNAL" => Some(TradeReason::Signal),
            "STOP_LOSS" => Some(TradeReason::StopLoss),
            "TAKE_PROFIT" => Some(TradeReason::TakeProfit),
            "TRAILING_STOP" => Some(TradeReason::TrailingStop),
            _ => None,
        }
    }
}

/// The single position this bot may hold.
///
/// Invariant: `holding == false` implies `amount`, `entry_price` and
/// `highest_price` are all zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub holding: bool,
    pub amount: f64,
    pub base_asset: String,
    pub quote_asset: String,
    pub entry_price: f64,
    pub highest_price: f64,
}

impl Position {
    /// A flat (non-holding) position for the given pair.
    pub fn flat(base_asset: &str, quote_asset: &str) -> Self {
        Self {
            holding: false,
            amount: 0.0,
            base_asset: base_asset.to_string(),
            quote_asset: quote_asset.to_string(),
            entry_price: 0.0,
            highest_price: 0.0,
        }
    }

    /// Mark the position as held after a confirmed entry fill.
    pub fn open(&mut self, amount: f64, entry_price: f64) {
        self.holding = true;
        self.amount = amount;
        self.entry_price = entry_price;
        self.highest_price = entry_price;
    }

    /// Reset to flat after a confirmed exit fill.
    pub fn clear(&mut self) {
        self.holding = false;
        self.amount = 0.0;
        self.entry_price = 0.0;
        self.highest_price = 0.0;
    }
}

/// Realized profit archived for one calendar day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DailyRecord {
    pub day: NaiveDate,
    pub profit: f64,
}

/// Trade count and realized profit for the current calendar day, plus the
/// archive of prior days.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStats {
    pub trade_count: u32,
    pub profit: f64,
    pub start_time: DateTime<Utc>,
    pub history: Vec<DailyRecord>,
}

impl DailyStats {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            trade_count: 0,
            profit: 0.0,
            start_time: now,
            history: Vec::new(),
        }
    }

    /// Archive the tracked day and reset counters if `now` falls on a later
    /// calendar day than `start_time`. Returns whether a rollover happened.
    pub fn rollover_if_new_day(&mut self, now: DateTime<Utc>) -> bool {
        let tracked = self.start_time.date_naive();
        if now.date_naive() == tracked {
            return false;
        }

        self.history.push(DailyRecord {
            day: tracked,
            profit: self.profit,
        });
        if self.history.len() > HISTORY_CAP {
            let excess = self.history.len() - HISTORY_CAP;
            self.history.drain(..excess);
        }

        self.trade_count = 0;
        self.profit = 0.0;
        self.start_time = now;
        true
    }

    /// Account for one confirmed execution. Entry fills carry zero profit.
    pub fn record_trade(&mut self, realized_profit: f64) {
        self.trade_count += 1;
        self.profit += realized_profit;
    }
}

/// Immutable record of a confirmed execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub order_id: i64,
    pub side: TradeSide,
    pub quantity: f64,
    pub avg_price: f64,
    pub quote_amount: f64,
    pub profit: f64,
    pub reason: TradeReason,
    pub executed_at: DateTime<Utc>,
}
