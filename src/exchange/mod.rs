// Exchange integration: ports, public REST market data, paper trading
pub mod paper;
pub mod rest;
pub mod types;

use async_trait::async_trait;

pub use paper::PaperExchange;
pub use rest::RestMarketData;
pub use types::{ExchangeError, OrderResult, OrderStatus, SymbolFilters};

use crate::models::{PricePoint, TradeSide};

/// Public market data: pair constraints and closed candles.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn filters(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError>;

    /// Most recent closed candles, oldest first. Candles still in progress
    /// are never returned.
    async fn closed_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<PricePoint>, ExchangeError>;
}

/// Trading operations against an exchange account.
///
/// Exchange-side rejections surface as [`ExchangeError::Rejected`];
/// transport failures as the ambiguous class (see
/// [`ExchangeError::is_ambiguous`]). A live signed implementation is an
/// external collaborator; [`PaperExchange`] is the in-crate one.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn filters(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError>;

    async fn free_balance(&self, asset: &str) -> Result<f64, ExchangeError>;

    async fn market_order(
        &self,
        symbol: &str,
        side: TradeSide,
        quantity: f64,
    ) -> Result<OrderResult, ExchangeError>;
}
