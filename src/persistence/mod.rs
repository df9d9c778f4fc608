use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

use crate::models::PricePoint;
use crate::Result;

/// Recent close prices in Redis, used to warm the signal engine after a
/// restart so the moving averages do not start cold.
///
/// One sorted set per symbol (`prices:{symbol}`) with the candle close time
/// as score, so range queries and trimming are cheap.
pub struct PriceHistory {
    conn: ConnectionManager,
}

impl PriceHistory {
    /// Connect to Redis, bounded by a 5 second timeout.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("connected to Redis price history at {}", redis_url);

        Ok(Self { conn })
    }

    /// Append one closed candle.
    pub async fn append(&mut self, symbol: &str, point: &PricePoint) -> Result<()> {
        let key = history_key(symbol);
        let value = serde_json::to_string(point)?;
        let score = point.close_time.timestamp() as f64;

        self.conn.zadd::<_, _, _, ()>(&key, value, score).await?;
        Ok(())
    }

    /// The most recent `limit` prices, oldest first.
    pub async fn recent(&mut self, symbol: &str, limit: usize) -> Result<Vec<PricePoint>> {
        let key = history_key(symbol);

        let raw: Vec<String> = self
            .conn
            .zrange(&key, -(limit as isize), -1)
            .await?;

        let mut points = Vec::with_capacity(raw.len());
        for entry in raw {
            let point: PricePoint = serde_json::from_str(&entry)?;
            points.push(point);
        }

        tracing::info!(
            symbol,
            count = points.len(),
            "loaded price history for warm start"
        );
        Ok(points)
    }

    /// Drop entries older than `keep_hours`, bounding the set's growth.
    pub async fn trim_older_than(&mut self, symbol: &str, keep_hours: u64) -> Result<usize> {
        let key = history_key(symbol);
        let cutoff = Utc::now() - chrono::Duration::hours(keep_hours as i64);

        let removed: usize = self
            .conn
            .zrembyscore(&key, "-inf", cutoff.timestamp() as f64)
            .await?;

        if removed > 0 {
            tracing::debug!(symbol, removed, "trimmed old price history");
        }
        Ok(removed)
    }
}

fn history_key(symbol: &str) -> String {
    format!("prices:{}", symbol)
}
