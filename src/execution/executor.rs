use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::db::{RecordOutcome, StateStore};
use crate::exchange::{ExchangeClient, ExchangeError, SymbolFilters};
use crate::models::{DailyStats, Position, Trade, TradeReason, TradeSide};

/// Quantized values are rounded to this many decimals to strip float
/// artifacts; exchanges do not use steps finer than 1e-8.
const DISPLAY_DECIMALS: i32 = 8;

/// Guard against float division landing a hair under an exact step multiple.
const QUANT_EPS: f64 = 1e-9;

/// Floor a quantity to the exchange step size: `floor(value / step) * step`.
pub fn apply_step_size(value: f64, step_size: f64) -> f64 {
    if step_size <= 0.0 {
        return value;
    }
    let steps = value / step_size;
    // Relative guard: an exact multiple must not floor one step down just
    // because the division landed a few ulps under the integer.
    let floored = (steps + steps.abs() * QUANT_EPS + QUANT_EPS).floor();
    round_display(floored * step_size)
}

/// Floor a price to the exchange tick size. Market orders carry no price,
/// but any explicitly priced request must pass through this.
pub fn apply_tick_size(price: f64, tick_size: f64) -> f64 {
    apply_step_size(price, tick_size)
}

fn round_display(value: f64) -> f64 {
    round_to(value, DISPLAY_DECIMALS)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// A confirmed execution, normalized from the exchange's order result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillReport {
    pub order_id: i64,
    pub quantity: f64,
    pub avg_price: f64,
    pub quote_amount: f64,
    /// Zero for entries.
    pub profit: f64,
}

/// Why an order was not sent (or not filled). None of these touch position
/// state.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// Another order is still in flight.
    InFlight,
    /// Quantization left nothing to trade.
    ZeroQuantity,
    BelowMinNotional { notional: f64, min_notional: f64 },
    InsufficientBalance { required: f64, available: f64 },
    /// The exchange refused the order outright.
    Exchange(String),
    /// The exchange accepted the order but nothing executed.
    NothingExecuted,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InFlight => write!(f, "an order is already in flight"),
            RejectReason::ZeroQuantity => write!(f, "quantized quantity is zero"),
            RejectReason::BelowMinNotional {
                notional,
                min_notional,
            } => write!(
                f,
                "notional {notional:.8} below exchange minimum {min_notional:.8}"
            ),
            RejectReason::InsufficientBalance {
                required,
                available,
            } => write!(
                f,
                "insufficient balance: required {required:.8}, available {available:.8}"
            ),
            RejectReason::Exchange(msg) => write!(f, "exchange rejection: {msg}"),
            RejectReason::NothingExecuted => write!(f, "order expired with nothing executed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    Filled(FillReport),
    Rejected(RejectReason),
}

/// Submits quantized market orders with a single-flight guarantee.
///
/// The in-flight flag is set before validation begins and cleared on every
/// exit path; a call made while it is set is rejected without touching the
/// exchange. Ambiguous transport failures propagate as errors so the caller
/// can leave position state untouched.
pub struct OrderExecutor<E: ExchangeClient> {
    exchange: Arc<E>,
    store: Arc<dyn StateStore>,
    bot_id: String,
    symbol: String,
    quote_asset: String,
    filters: SymbolFilters,
    in_flight: bool,
}

impl<E: ExchangeClient> OrderExecutor<E> {
    pub fn new(
        exchange: Arc<E>,
        store: Arc<dyn StateStore>,
        bot_id: &str,
        symbol: &str,
        quote_asset: &str,
        filters: SymbolFilters,
    ) -> Self {
        Self {
            exchange,
            store,
            bot_id: bot_id.to_string(),
            symbol: symbol.to_string(),
            quote_asset: quote_asset.to_string(),
            filters,
            in_flight: false,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Floor to the step size, then round to the pair's quantity precision.
    fn quantize_quantity(&self, value: f64) -> f64 {
        round_to(
            apply_step_size(value, self.filters.step_size),
            self.filters.quantity_precision as i32,
        )
    }

    /// Submit a market buy for roughly `quote_amount` of quote currency at
    /// the given reference price.
    pub async fn buy(
        &mut self,
        quote_amount: f64,
        price: f64,
        stats: &mut DailyStats,
    ) -> Result<OrderOutcome, ExchangeError> {
        if self.in_flight {
            tracing::warn!(symbol = %self.symbol, "buy rejected: an order is already in flight");
            return Ok(OrderOutcome::Rejected(RejectReason::InFlight));
        }

        self.in_flight = true;
        let outcome = self.buy_inner(quote_amount, price, stats).await;
        self.in_flight = false;
        outcome
    }

    /// Submit a market sell closing the held position.
    pub async fn sell(
        &mut self,
        position: &Position,
        price: f64,
        reason: TradeReason,
        stats: &mut DailyStats,
    ) -> Result<OrderOutcome, ExchangeError> {
        if self.in_flight {
            tracing::warn!(symbol = %self.symbol, "sell rejected: an order is already in flight");
            return Ok(OrderOutcome::Rejected(RejectReason::InFlight));
        }

        self.in_flight = true;
        let outcome = self.sell_inner(position, price, reason, stats).await;
        self.in_flight = false;
        outcome
    }

    async fn buy_inner(
        &mut self,
        quote_amount: f64,
        price: f64,
        stats: &mut DailyStats,
    ) -> Result<OrderOutcome, ExchangeError> {
        let quantity = self.quantize_quantity(quote_amount / price);
        if quantity <= 0.0 {
            return Ok(OrderOutcome::Rejected(RejectReason::ZeroQuantity));
        }

        let notional = quantity * price;
        if notional < self.filters.min_notional {
            return Ok(OrderOutcome::Rejected(RejectReason::BelowMinNotional {
                notional,
                min_notional: self.filters.min_notional,
            }));
        }

        let available = self.exchange.free_balance(&self.quote_asset).await?;
        if notional > available {
            return Ok(OrderOutcome::Rejected(RejectReason::InsufficientBalance {
                required: notional,
                available,
            }));
        }

        let result = match self.submit(TradeSide::Buy, quantity).await? {
            Submitted::Result(result) => result,
            Submitted::Rejected(reject) => return Ok(OrderOutcome::Rejected(reject)),
        };

        if result.executed_qty <= 0.0 {
            return Ok(OrderOutcome::Rejected(RejectReason::NothingExecuted));
        }

        let avg_price = result.avg_fill_price();
        let trade = Trade {
            id: Uuid::new_v4(),
            order_id: result.order_id,
            side: TradeSide::Buy,
            quantity: result.executed_qty,
            avg_price,
            quote_amount: result.cum_quote,
            profit: 0.0,
            reason: TradeReason::Signal,
            executed_at: Utc::now(),
        };
        self.record(&trade, stats).await;

        Ok(OrderOutcome::Filled(FillReport {
            order_id: result.order_id,
            quantity: result.executed_qty,
            avg_price,
            quote_amount: result.cum_quote,
            profit: 0.0,
        }))
    }

    async fn sell_inner(
        &mut self,
        position: &Position,
        price: f64,
        reason: TradeReason,
        stats: &mut DailyStats,
    ) -> Result<OrderOutcome, ExchangeError> {
        let mut quantity = self.quantize_quantity(position.amount);

        let available = self.exchange.free_balance(&position.base_asset).await?;
        if available < quantity {
            // Fees or dust can leave the account short of the tracked
            // amount; sell what the balance actually covers.
            let reduced = self.quantize_quantity(available);
            tracing::warn!(
                tracked = quantity,
                available,
                reduced,
                "free balance below position amount, re-quantizing sell"
            );
            quantity = reduced;
        }

        if quantity <= 0.0 {
            return Ok(OrderOutcome::Rejected(RejectReason::ZeroQuantity));
        }

        let notional = quantity * price;
        if notional < self.filters.min_notional {
            return Ok(OrderOutcome::Rejected(RejectReason::BelowMinNotional {
                notional,
                min_notional: self.filters.min_notional,
            }));
        }

        let result = match self.submit(TradeSide::Sell, quantity).await? {
            Submitted::Result(result) => result,
            Submitted::Rejected(reject) => return Ok(OrderOutcome::Rejected(reject)),
        };

        if result.executed_qty <= 0.0 {
            return Ok(OrderOutcome::Rejected(RejectReason::NothingExecuted));
        }

        let avg_price = result.avg_fill_price();
        let profit = (avg_price - position.entry_price) * result.executed_qty;
        let trade = Trade {
            id: Uuid::new_v4(),
            order_id: result.order_id,
            side: TradeSide::Sell,
            quantity: result.executed_qty,
            avg_price,
            quote_amount: result.cum_quote,
            profit,
            reason,
            executed_at: Utc::now(),
        };
        self.record(&trade, stats).await;

        Ok(OrderOutcome::Filled(FillReport {
            order_id: result.order_id,
            quantity: result.executed_qty,
            avg_price,
            quote_amount: result.cum_quote,
            profit,
        }))
    }

    /// Place the order, separating clean exchange rejections from ambiguous
    /// transport failures. An ambiguous failure is logged distinctly and
    /// propagated: the order may have executed, so it must not be retried
    /// within this tick.
    async fn submit(
        &self,
        side: TradeSide,
        quantity: f64,
    ) -> Result<Submitted, ExchangeError> {
        match self
            .exchange
            .market_order(&self.symbol, side, quantity)
            .await
        {
            Ok(result) => {
                tracing::info!(
                    symbol = %self.symbol,
                    side = side.as_str(),
                    quantity,
                    order_id = result.order_id,
                    executed = result.executed_qty,
                    "market order submitted"
                );
                Ok(Submitted::Result(result))
            }
            Err(ExchangeError::Rejected(msg)) => {
                tracing::warn!(
                    symbol = %self.symbol,
                    side = side.as_str(),
                    "exchange rejected order: {msg}"
                );
                Ok(Submitted::Rejected(RejectReason::Exchange(msg)))
            }
            Err(e) if e.is_ambiguous() => {
                tracing::error!(
                    symbol = %self.symbol,
                    side = side.as_str(),
                    error = %e,
                    "order outcome AMBIGUOUS: the exchange may have executed it; not resubmitting"
                );
                Err(e)
            }
            Err(e) => {
                tracing::error!(
                    symbol = %self.symbol,
                    side = side.as_str(),
                    error = %e,
                    "order submission failed"
                );
                Err(e)
            }
        }
    }

    /// Hand the confirmed fill to the store and bump daily statistics.
    /// Duplicates are retry artifacts, not errors; a store failure leaves
    /// in-memory state authoritative.
    async fn record(&self, trade: &Trade, stats: &mut DailyStats) {
        stats.record_trade(trade.profit);

        match self.store.record_trade(&self.bot_id, trade).await {
            Ok(RecordOutcome::Inserted) => {}
            Ok(RecordOutcome::Duplicate) => {
                tracing::debug!(
                    order_id = trade.order_id,
                    "trade already recorded, discarding duplicate"
                );
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    order_id = trade.order_id,
                    "failed to persist trade record; in-memory state remains authoritative"
                );
            }
        }
    }
}

enum Submitted {
    Result(crate::exchange::OrderResult),
    Rejected(RejectReason),
}
