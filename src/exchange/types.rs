use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pair constraints supplied by the exchange, loaded once at startup and
/// read-only afterwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SymbolFilters {
    pub tick_size: f64,
    pub step_size: f64,
    pub min_notional: f64,
    /// Decimal places implied by `tick_size`, for display and order fields.
    pub price_precision: u32,
    /// Decimal places implied by `step_size`.
    pub quantity_precision: u32,
}

impl SymbolFilters {
    /// Build filters from the decimal strings the exchange reports
    /// (e.g. `"0.00100000"`). Parsed exactly so the implied precision is
    /// derived from the digits, not from float formatting.
    pub fn from_strings(
        tick_size: &str,
        step_size: &str,
        min_notional: &str,
    ) -> Result<Self, ExchangeError> {
        let tick = parse_decimal("tickSize", tick_size)?;
        let step = parse_decimal("stepSize", step_size)?;
        let notional = parse_decimal("minNotional", min_notional)?;

        Ok(Self {
            tick_size: decimal_to_f64("tickSize", tick)?,
            step_size: decimal_to_f64("stepSize", step)?,
            min_notional: decimal_to_f64("minNotional", notional)?,
            price_precision: tick.normalize().scale(),
            quantity_precision: step.normalize().scale(),
        })
    }

    /// Loose defaults for paper runs when the exchange is unreachable.
    pub fn permissive() -> Self {
        Self {
            tick_size: 0.01,
            step_size: 0.00001,
            min_notional: 5.0,
            price_precision: 2,
            quantity_precision: 5,
        }
    }
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, ExchangeError> {
    raw.parse::<Decimal>()
        .map_err(|e| ExchangeError::Malformed(format!("{field} {raw:?}: {e}")))
}

fn decimal_to_f64(field: &str, value: Decimal) -> Result<f64, ExchangeError> {
    value
        .to_f64()
        .ok_or_else(|| ExchangeError::Malformed(format!("{field} {value} out of range")))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    Filled,
    PartiallyFilled,
    Expired,
}

/// Normalized result of a market-order submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: i64,
    pub executed_qty: f64,
    /// Cumulative quote amount across all fills of the order.
    pub cum_quote: f64,
    pub status: OrderStatus,
}

impl OrderResult {
    /// Average fill price across partial fills.
    pub fn avg_fill_price(&self) -> f64 {
        if self.executed_qty > 0.0 {
            self.cum_quote / self.executed_qty
        } else {
            0.0
        }
    }
}

#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The exchange understood the request and refused it (insufficient
    /// balance, filter violation, invalid symbol). The order was not placed.
    #[error("exchange rejected request: {0}")]
    Rejected(String),

    /// The request may or may not have reached the exchange.
    #[error("transport failure talking to exchange: {0}")]
    Transport(#[from] reqwest::Error),

    /// The request was sent but no answer arrived in time.
    #[error("exchange call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed exchange response: {0}")]
    Malformed(String),

    #[error("unknown symbol {0}")]
    UnknownSymbol(String),
}

impl ExchangeError {
    /// Whether the outcome on the exchange side is unknown. An ambiguous
    /// order submission must not be retried blindly: it may have executed.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            ExchangeError::Transport(_) | ExchangeError::Timeout(_)
        )
    }
}
