// Durable position / daily-statistics store
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::models::{DailyStats, Position, Trade};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Outcome of recording a trade keyed by exchange order id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted,
    /// The order id was already recorded; expected after a retried
    /// submission and silently discarded.
    Duplicate,
}

/// Key-value persistence of the bot's position and daily statistics, plus
/// an append-only trade log.
///
/// `save` is write-through: it is called synchronously after every
/// state-changing event so the persisted state is never more than one event
/// behind memory.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, bot_id: &str) -> Result<Option<(Position, DailyStats)>, StoreError>;

    async fn save(
        &self,
        bot_id: &str,
        position: &Position,
        stats: &DailyStats,
    ) -> Result<(), StoreError>;

    async fn record_trade(&self, bot_id: &str, trade: &Trade)
        -> Result<RecordOutcome, StoreError>;
}

/// Load state at startup, initializing defaults on first run and performing
/// the day-boundary rollover exactly once: if the persisted day differs from
/// today, the old day's profit is archived, counters reset, and the reset
/// state persisted before it is returned.
pub async fn load_state(
    store: &dyn StateStore,
    bot_id: &str,
    base_asset: &str,
    quote_asset: &str,
    now: DateTime<Utc>,
) -> Result<(Position, DailyStats), StoreError> {
    match store.load(bot_id).await? {
        Some((position, mut stats)) => {
            if stats.rollover_if_new_day(now) {
                tracing::info!(
                    bot_id,
                    archived_days = stats.history.len(),
                    "rolled daily statistics over to a new day at load"
                );
                store.save(bot_id, &position, &stats).await?;
            }
            tracing::info!(
                bot_id,
                holding = position.holding,
                daily_trades = stats.trade_count,
                "restored state from store"
            );
            Ok((position, stats))
        }
        None => {
            let position = Position::flat(base_asset, quote_asset);
            let stats = DailyStats::new(now);
            store.save(bot_id, &position, &stats).await?;
            tracing::info!(bot_id, "no persisted state found, starting flat");
            Ok((position, stats))
        }
    }
}
