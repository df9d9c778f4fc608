use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;

use super::types::{ExchangeError, SymbolFilters};
use super::MarketData;
use crate::models::PricePoint;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the exchange's unauthenticated market-data endpoints
/// (Binance-compatible REST: `/api/v3/exchangeInfo`, `/api/v3/klines`).
///
/// Signing, rate limiting and account endpoints live in the external
/// exchange-client collaborator, not here.
#[derive(Clone)]
pub struct RestMarketData {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    filters: Vec<RawFilter>,
}

/// The subset of exchange filters this engine cares about. Everything else
/// falls through to `Other`.
#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum RawFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    Price { tick_size: String },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize { step_size: String },
    #[serde(rename = "MIN_NOTIONAL", rename_all = "camelCase")]
    MinNotional { min_notional: String },
    #[serde(rename = "NOTIONAL", rename_all = "camelCase")]
    Notional { min_notional: String },
    #[serde(other)]
    Other,
}

impl RestMarketData {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_exchange_info(&self, symbol: &str) -> Result<SymbolInfo, ExchangeError> {
        let url = format!("{}/api/v3/exchangeInfo?symbol={}", self.base_url, symbol);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Rejected(format!(
                "exchangeInfo {status}: {body}"
            )));
        }

        let info: ExchangeInfoResponse = response.json().await?;
        info.symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ExchangeError::UnknownSymbol(symbol.to_string()))
    }
}

#[async_trait::async_trait]
impl MarketData for RestMarketData {
    async fn filters(&self, symbol: &str) -> Result<SymbolFilters, ExchangeError> {
        let info = self.fetch_exchange_info(symbol).await?;

        let mut tick_size = None;
        let mut step_size = None;
        let mut min_notional = None;

        for filter in &info.filters {
            match filter {
                RawFilter::Price { tick_size: t } => tick_size = Some(t.as_str()),
                RawFilter::LotSize { step_size: s } => step_size = Some(s.as_str()),
                RawFilter::MinNotional { min_notional: m }
                | RawFilter::Notional { min_notional: m } => min_notional = Some(m.as_str()),
                RawFilter::Other => {}
            }
        }

        let (Some(tick), Some(step), Some(notional)) = (tick_size, step_size, min_notional) else {
            return Err(ExchangeError::Malformed(format!(
                "exchangeInfo for {symbol} is missing price/lot/notional filters"
            )));
        };

        let filters = SymbolFilters::from_strings(tick, step, notional)?;
        tracing::info!(
            symbol,
            tick = filters.tick_size,
            step = filters.step_size,
            min_notional = filters.min_notional,
            "loaded symbol filters"
        );
        Ok(filters)
    }

    async fn closed_candles(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<PricePoint>, ExchangeError> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Rejected(format!("klines {status}: {body}")));
        }

        let rows: Vec<Vec<serde_json::Value>> = response.json().await?;
        let now = Utc::now();

        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let point = parse_kline_row(&row)?;
            // The newest row is usually the candle still in progress.
            if point.close_time <= now {
                candles.push(point);
            }
        }

        Ok(candles)
    }
}

/// Kline rows are positional arrays; index 4 is the close price (string),
/// index 6 the close time in epoch milliseconds.
fn parse_kline_row(row: &[serde_json::Value]) -> Result<PricePoint, ExchangeError> {
    let close_str = row
        .get(4)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExchangeError::Malformed("kline row missing close price".into()))?;
    let close_ms = row
        .get(6)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ExchangeError::Malformed("kline row missing close time".into()))?;

    let price: f64 = close_str
        .parse()
        .map_err(|_| ExchangeError::Malformed(format!("bad close price {close_str:?}")))?;
    let close_time = millis_to_datetime(close_ms)?;

    Ok(PricePoint { price, close_time })
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, ExchangeError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ExchangeError::Malformed(format!("bad close time {ms}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXCHANGE_INFO_BODY: &str = r#"{
        "symbols": [{
            "symbol": "BTCUSDT",
            "filters": [
                {"filterType": "PRICE_FILTER", "minPrice": "0.01000000", "maxPrice": "1000000.00000000", "tickSize": "0.01000000"},
                {"filterType": "LOT_SIZE", "minQty": "0.00001000", "maxQty": "9000.00000000", "stepSize": "0.00001000"},
                {"filterType": "NOTIONAL", "minNotional": "5.00000000", "applyMinToMarket": true},
                {"filterType": "MAX_NUM_ORDERS", "maxNumOrders": 200}
            ]
        }]
    }"#;

    #[tokio::test]
    async fn test_filters_parsed_from_exchange_info() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(mockito::Matcher::UrlEncoded(
                "symbol".into(),
                "BTCUSDT".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(EXCHANGE_INFO_BODY)
            .create_async()
            .await;

        let market = RestMarketData::new(&server.url());
        let filters = market.filters("BTCUSDT").await.unwrap();

        assert_eq!(filters.tick_size, 0.01);
        assert_eq!(filters.step_size, 0.00001);
        assert_eq!(filters.min_notional, 5.0);
        assert_eq!(filters.quantity_precision, 5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_distinguishable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"symbols": []}"#)
            .create_async()
            .await;

        let market = RestMarketData::new(&server.url());
        let err = market.filters("NOPEUSDT").await.unwrap_err();
        assert!(matches!(err, ExchangeError::UnknownSymbol(_)));
    }

    #[tokio::test]
    async fn test_rejected_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
            .create_async()
            .await;

        let market = RestMarketData::new(&server.url());
        let err = market.filters("BTCUSDT").await.unwrap_err();
        match err {
            ExchangeError::Rejected(msg) => assert!(msg.contains("-1121")),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_klines_drop_unclosed_candle() {
        let past_close = Utc::now().timestamp_millis() - 60_000;
        let future_close = Utc::now().timestamp_millis() + 60_000;
        let body = format!(
            r#"[
                [0, "1.0", "1.2", "0.9", "101.50000000", "12.0", {past_close}, "0", 5, "0", "0", "0"],
                [0, "1.0", "1.2", "0.9", "102.00000000", "9.0", {future_close}, "0", 4, "0", "0", "0"]
            ]"#
        );

        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let market = RestMarketData::new(&server.url());
        let candles = market.closed_candles("BTCUSDT", "5m", 2).await.unwrap();

        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].price, 101.5);
    }

    #[tokio::test]
    async fn test_malformed_kline_row() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[[0, "1.0"]]"#)
            .create_async()
            .await;

        let market = RestMarketData::new(&server.url());
        let err = market.closed_candles("BTCUSDT", "5m", 1).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Malformed(_)));
    }
}
