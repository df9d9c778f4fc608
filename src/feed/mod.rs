// Closed-candle delivery, clock-aligned to the candle interval
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use thiserror::Error;
use tokio::time::Duration;

use crate::exchange::{ExchangeError, MarketData};
use crate::models::PricePoint;

/// Delay past the candle boundary before fetching, giving the exchange time
/// to finalize the bar.
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("market data error: {0}")]
    Exchange(#[from] ExchangeError),
}

/// Source of closed candles in strictly increasing close-time order.
/// Reconnection and retry policy belong to the feed, not the engine.
#[async_trait]
pub trait PriceFeed: Send {
    async fn next_candle(&mut self) -> Result<PricePoint, FeedError>;
}

/// Polls the REST klines endpoint once per interval, aligned to wall-clock
/// boundaries (XX:00, XX:05, ... for a 5-minute interval), and deduplicates
/// by close time.
pub struct RestPollingFeed<M: MarketData> {
    market: Arc<M>,
    symbol: String,
    interval: String,
    interval_minutes: u64,
    last_close: Option<DateTime<Utc>>,
}

impl<M: MarketData> RestPollingFeed<M> {
    pub fn new(market: Arc<M>, symbol: &str, interval: &str, interval_minutes: u64) -> Self {
        Self {
            market,
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            interval_minutes,
            last_close: None,
        }
    }

    /// Seconds until the next interval boundary (XX:00, XX:05, ...).
    fn seconds_to_boundary(&self, now: DateTime<Utc>) -> u64 {
        let cycle = self.interval_minutes * 60;
        let into_cycle = (now.minute() as u64 % self.interval_minutes) * 60 + now.second() as u64;
        cycle - into_cycle
    }
}

#[async_trait]
impl<M: MarketData> PriceFeed for RestPollingFeed<M> {
    async fn next_candle(&mut self) -> Result<PricePoint, FeedError> {
        loop {
            let wait = Duration::from_secs(self.seconds_to_boundary(Utc::now())) + POLL_GRACE;
            tracing::debug!(wait_secs = wait.as_secs(), "sleeping until next candle close");
            tokio::time::sleep(wait).await;

            let candles = self
                .market
                .closed_candles(&self.symbol, &self.interval, 2)
                .await?;

            let fresh = candles
                .into_iter()
                .filter(|c| match self.last_close {
                    Some(last) => c.close_time > last,
                    None => true,
                })
                .last();

            match fresh {
                Some(point) => {
                    self.last_close = Some(point.close_time);
                    return Ok(point);
                }
                None => {
                    // Nothing newer yet (clock skew or a slow exchange);
                    // wait for the next boundary.
                    tracing::debug!("no new closed candle yet");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct NoopMarket;

    #[async_trait]
    impl MarketData for NoopMarket {
        async fn filters(
            &self,
            _symbol: &str,
        ) -> Result<crate::exchange::SymbolFilters, ExchangeError> {
            unimplemented!("not used by these tests")
        }

        async fn closed_candles(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: u32,
        ) -> Result<Vec<PricePoint>, ExchangeError> {
            Ok(Vec::new())
        }
    }

    fn feed(interval_minutes: u64) -> RestPollingFeed<NoopMarket> {
        RestPollingFeed::new(Arc::new(NoopMarket), "BTCUSDT", "5m", interval_minutes)
    }

    #[test]
    fn test_boundary_from_mid_interval() {
        let f = feed(5);
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 10, 2, 30).unwrap();
        // 2m30s into a 5m cycle leaves 2m30s.
        assert_eq!(f.seconds_to_boundary(now), 150);
    }

    #[test]
    fn test_boundary_exactly_on_boundary() {
        let f = feed(5);
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 10, 5, 0).unwrap();
        // A full cycle: the candle closing now is fetched after the grace
        // delay, the next wake-up targets the following close.
        assert_eq!(f.seconds_to_boundary(now), 300);
    }

    #[test]
    fn test_boundary_for_one_minute_interval() {
        let f = feed(1);
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 10, 7, 59).unwrap();
        assert_eq!(f.seconds_to_boundary(now), 1);
    }

    #[test]
    fn test_boundary_for_hourly_interval() {
        let f = feed(60);
        let now = Utc.with_ymd_and_hms(2024, 7, 1, 10, 45, 0).unwrap();
        assert_eq!(f.seconds_to_boundary(now), 900);
    }
}
