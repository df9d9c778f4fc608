use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::DailyStats;

/// Caps on new entries for a single calendar day.
///
/// Gates entries only: an existing position is never force-closed by these
/// limits, and exits always remain allowed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyLimits {
    /// Maximum realized loss for the day, as a positive quote amount.
    pub max_daily_loss: f64,
    /// Maximum number of executions (entries and exits) for the day.
    pub max_daily_trades: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LimitBreach {
    DailyLoss { loss: f64, cap: f64 },
    TradeCount { count: u32, cap: u32 },
}

impl fmt::Display for LimitBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitBreach::DailyLoss { loss, cap } => {
                write!(f, "daily loss {:.2} reached cap {:.2}", loss, cap)
            }
            LimitBreach::TradeCount { count, cap } => {
                write!(f, "daily trade count {} reached cap {}", count, cap)
            }
        }
    }
}

impl DailyLimits {
    /// Check whether a new entry is allowed today.
    pub fn check(&self, stats: &DailyStats) -> Result<(), LimitBreach> {
        if stats.profit <= -self.max_daily_loss {
            return Err(LimitBreach::DailyLoss {
                loss: -stats.profit,
                cap: self.max_daily_loss,
            });
        }

        if stats.trade_count >= self.max_daily_trades {
            return Err(LimitBreach::TradeCount {
                count: stats.trade_count,
                cap: self.max_daily_trades,
            });
        }

        Ok(())
    }
}
