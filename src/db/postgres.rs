use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::{RecordOutcome, StateStore, StoreError};
use crate::models::{DailyRecord, DailyStats, Position, Trade};

/// Postgres-backed state store.
///
/// One `bot_state` row per bot id, archived day profits in `daily_history`,
/// and an append-only `trades` log whose primary key enforces order-id
/// idempotency.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("connected to Postgres state store");
        Ok(Self { pool })
    }
}

#[async_trait]
impl StateStore for PostgresStore {
    async fn load(&self, bot_id: &str) -> Result<Option<(Position, DailyStats)>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT holding, amount, base_asset, quote_asset, entry_price,
                   highest_price, day_start, daily_trades, daily_profit
            FROM bot_state
            WHERE bot_id = $1
            "#,
        )
        .bind(bot_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let position = Position {
            holding: row.get("holding"),
            amount: row.get("amount"),
            base_asset: row.get("base_asset"),
            quote_asset: row.get("quote_asset"),
            entry_price: row.get("entry_price"),
            highest_price: row.get("highest_price"),
        };

        let history_rows = sqlx::query(
            "SELECT day, profit FROM daily_history WHERE bot_id = $1 ORDER BY day ASC",
        )
        .bind(bot_id)
        .fetch_all(&self.pool)
        .await?;

        let history = history_rows
            .iter()
            .map(|r| DailyRecord {
                day: r.get("day"),
                profit: r.get("profit"),
            })
            .collect();

        let stats = DailyStats {
            trade_count: row.get::<i32, _>("daily_trades") as u32,
            profit: row.get("daily_profit"),
            start_time: row.get("day_start"),
            history,
        };

        Ok(Some((position, stats)))
    }

    async fn save(
        &self,
        bot_id: &str,
        position: &Position,
        stats: &DailyStats,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO bot_state (
                bot_id, holding, amount, base_asset, quote_asset,
                entry_price, highest_price, day_start, daily_trades, daily_profit
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (bot_id) DO UPDATE SET
                holding = EXCLUDED.holding,
                amount = EXCLUDED.amount,
                base_asset = EXCLUDED.base_asset,
                quote_asset = EXCLUDED.quote_asset,
                entry_price = EXCLUDED.entry_price,
                highest_price = EXCLUDED.highest_price,
                day_start = EXCLUDED.day_start,
                daily_trades = EXCLUDED.daily_trades,
                daily_profit = EXCLUDED.daily_profit,
                updated_at = NOW()
            "#,
        )
        .bind(bot_id)
        .bind(position.holding)
        .bind(position.amount)
        .bind(&position.base_asset)
        .bind(&position.quote_asset)
        .bind(position.entry_price)
        .bind(position.highest_price)
        .bind(stats.start_time)
        .bind(stats.trade_count as i32)
        .bind(stats.profit)
        .execute(&mut *tx)
        .await?;

        for record in &stats.history {
            sqlx::query(
                r#"
                INSERT INTO daily_history (bot_id, day, profit)
                VALUES ($1, $2, $3)
                ON CONFLICT (bot_id, day) DO UPDATE SET profit = EXCLUDED.profit
                "#,
            )
            .bind(bot_id)
            .bind(record.day)
            .bind(record.profit)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(bot_id, holding = position.holding, "saved bot state");
        Ok(())
    }

    async fn record_trade(
        &self,
        bot_id: &str,
        trade: &Trade,
    ) -> Result<RecordOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (
                bot_id, order_id, id, side, quantity, avg_price,
                quote_amount, profit, reason, executed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (bot_id, order_id) DO NOTHING
            "#,
        )
        .bind(bot_id)
        .bind(trade.order_id)
        .bind(trade.id)
        .bind(trade.side.as_str())
        .bind(trade.quantity)
        .bind(trade.avg_price)
        .bind(trade.quote_amount)
        .bind(trade.profit)
        .bind(trade.reason.as_str())
        .bind(trade.executed_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                bot_id,
                order_id = trade.order_id,
                "trade already recorded, discarding duplicate"
            );
            return Ok(RecordOutcome::Duplicate);
        }

        Ok(RecordOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::load_state;
    use crate::models::{TradeReason, TradeSide};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn test_database_url() -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/crossbot_test".to_string())
    }

    fn sample_trade(order_id: i64, profit: f64) -> Trade {
        Trade {
            id: Uuid::new_v4(),
            order_id,
            side: TradeSide::Sell,
            quantity: 0.5,
            avg_price: 101.0,
            quote_amount: 50.5,
            profit,
            reason: TradeReason::TakeProfit,
            executed_at: Utc::now(),
        }
    }

    // These tests need a running Postgres; set DATABASE_URL to run them.

    #[tokio::test]
    #[ignore]
    async fn test_state_round_trip_live() {
        let store = PostgresStore::connect(&test_database_url()).await.unwrap();
        let bot_id = format!("test-{}", Uuid::new_v4());

        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let (mut position, mut stats) = load_state(&store, &bot_id, "BTC", "USDT", now)
            .await
            .unwrap();
        assert!(!position.holding);

        position.open(0.75, 25_000.0);
        stats.record_trade(0.0);
        store.save(&bot_id, &position, &stats).await.unwrap();

        let (loaded, loaded_stats) = store.load(&bot_id).await.unwrap().unwrap();
        assert!(loaded.holding);
        assert_eq!(loaded.amount, 0.75);
        assert_eq!(loaded_stats.trade_count, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_trade_idempotency_live() {
        let store = PostgresStore::connect(&test_database_url()).await.unwrap();
        let bot_id = format!("test-{}", Uuid::new_v4());

        let trade = sample_trade(1001, 4.5);
        assert_eq!(
            store.record_trade(&bot_id, &trade).await.unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(
            store.record_trade(&bot_id, &trade).await.unwrap(),
            RecordOutcome::Duplicate
        );
    }
}
