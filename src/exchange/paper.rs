use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use super::types::{ExchangeError, OrderResult, OrderStatus, SymbolFilters};
use super::ExchangeClient;
use crate::models::TradeSide;

/// Failure mode injected before the next order, for tests and drills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperFailure {
    /// Clean exchange-side rejection; the order was not placed.
    Reject,
    /// Ambiguous timeout; the caller cannot know whether the order filled.
    Timeout,
}

/// Simulated exchange account: immediate full fills at the current mark
/// price, per-asset balances, no fees.
///
/// Stands in for the live signed exchange client, which is an external
/// collaborator. The run loop sets the mark price from each closed candle
/// before the engine processes it.
pub struct PaperExchange {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    filters: SymbolFilters,
    mark_price: RwLock<f64>,
    balances: RwLock<HashMap<String, f64>>,
    next_order_id: AtomicI64,
    fail_next: RwLock<Option<PaperFailure>>,
}

impl PaperExchange {
    pub fn new(symbol: &str, base_asset: &str, quote_asset: &str, filters: SymbolFilters) -> Self {
        Self {
            symbol: symbol.to_string(),
            base_asset: base_asset.to_string(),
            quote_asset: quote_asset.to_string(),
            filters,
            mark_price: RwLock::new(0.0),
            balances: RwLock::new(HashMap::new()),
            next_order_id: AtomicI64::new(1),
            fail_next: RwLock::new(None),
        }
    }

    /// Credit an asset balance (initial funding).
    pub fn deposit(&self, asset: &str, amount: f64) {
        let mut balances = self.balances.write().unwrap();
        *balances.entry(asset.to_string()).or_insert(0.0) += amount;
    }

    /// Update the price the next market order fills at.
    pub fn set_mark_price(&self, price: f64) {
        *self.mark_price.write().unwrap() = price;
    }

    /// Inject a failure into the next `market_order` call.
    pub fn fail_next(&self, failure: PaperFailure) {
        *self.fail_next.write().unwrap() = Some(failure);
    }

    /// Number of orders accepted so far.
    pub fn orders_placed(&self) -> i64 {
        self.next_order_id.load(Ordering::SeqCst) - 1
    }

    fn take_injected_failure(&self) -> Option<PaperFailure> {
        self.fail_next.write().unwrap().take()
    }

    fn balance_of(&self, asset: &str) -> f64 {
        *self.balances.read().unwrap().get(asset).unwrap_or(&0.0)
    }
}

#[async_trait::async_trait]
impl ExchangeClient for PaperExchange {
    async fn filters(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError> {
        if symbol != self.symbol {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        }
        Ok(self.filters)
    }

    async fn free_balance(&self, asset: &str) -> Result<f64, ExchangeError> {
        Ok(self.balance_of(asset))
    }

    async fn market_order(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: f64,
    ) -> Result<OrderResult, ExchangeError> {
        if symbol != self.symbol {
            return Err(ExchangeError::UnknownSymbol(symbol.to_string()));
        }

        match self.take_injected_failure() {
            Some(PaperFailure::Reject) => {
                return Err(ExchangeError::Rejected("injected rejection".into()));
            }
            Some(PaperFailure::Timeout) => {
                return Err(ExchangeError::Timeout(Duration::from_secs(10)));
            }
            None => {}
        }

        if quantity <= 0.0 {
            return Err(ExchangeError::Rejected(format!(
                "invalid quantity {quantity}"
            )));
        }

        let price = *self.mark_price.read().unwrap();
        if price <= 0.0 {
            return Err(ExchangeError::Rejected("no mark price available".into()));
        }

        let notional = quantity * price;
        let mut balances = self.balances.write().unwrap();

        match side {
            TradeSide::Buy => {
                let quote = balances.entry(self.quote_asset.clone()).or_insert(0.0);
                if *quote < notional {
                    return Err(ExchangeError::Rejected(format!(
                        "insufficient {} balance: need {notional:.8}, have {quote:.8}",
                        self.quote_asset
                    )));
                }
                *quote -= notional;
                *balances.entry(self.base_asset.clone()).or_insert(0.0) += quantity;
            }
            TradeSide::Sell => {
                let base = balances.entry(self.base_asset.clone()).or_insert(0.0);
                if *base < quantity {
                    return Err(ExchangeError::Rejected(format!(
                        "insufficient {} balance: need {quantity:.8}, have {base:.8}",
                        self.base_asset
                    )));
                }
                *base -= quantity;
                *balances.entry(self.quote_asset.clone()).or_insert(0.0) += notional;
            }
        }

        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            order_id,
            side = side.as_str(),
            quantity,
            price,
            "paper order filled"
        );

        Ok(OrderResult {
            order_id,
            executed_qty: quantity,
            cum_quote: notional,
            status: OrderStatus::Filled,
        })
    }
}
