use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{RecordOutcome, StateStore, StoreError};
use crate::models::{DailyStats, Position, Trade};

/// In-memory store for tests and database-less runs. State dies with the
/// process, so crash recovery does not apply; everything else behaves like
/// the Postgres store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<HashMap<String, (Position, DailyStats)>>,
    trades: Mutex<HashMap<(String, i64), Trade>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded trades for a bot, in no particular order.
    pub fn trades_for(&self, bot_id: &str) -> Vec<Trade> {
        self.trades
            .lock()
            .unwrap()
            .iter()
            .filter(|((bot, _), _)| bot == bot_id)
            .map(|(_, trade)| trade.clone())
            .collect()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load(&self, bot_id: &str) -> Result<Option<(Position, DailyStats)>, StoreError> {
        Ok(self.state.lock().unwrap().get(bot_id).cloned())
    }

    async fn save(
        &self,
        bot_id: &str,
        position: &Position,
        stats: &DailyStats,
    ) -> Result<(), StoreError> {
        self.state
            .lock()
            .unwrap()
            .insert(bot_id.to_string(), (position.clone(), stats.clone()));
        Ok(())
    }

    async fn record_trade(
        &self,
        bot_id: &str,
        trade: &Trade,
    ) -> Result<RecordOutcome, StoreError> {
        let mut trades = self.trades.lock().unwrap();
        let key = (bot_id.to_string(), trade.order_id);

        if trades.contains_key(&key) {
            return Ok(RecordOutcome::Duplicate);
        }

        trades.insert(key, trade.clone());
        Ok(RecordOutcome::Inserted)
    }
}
