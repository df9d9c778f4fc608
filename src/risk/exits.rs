use serde::{Deserialize, Serialize};

use crate::models::{Position, TradeReason};

/// Absolute guard for float comparisons at rule boundaries.
const EPS: f64 = 1e-9;

/// Why a held position must be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TrailingStop,
}

impl From<ExitReason> for TradeReason {
    fn from(reason: ExitReason) -> Self {
        match reason {
            ExitReason::StopLoss => TradeReason::StopLoss,
            ExitReason::TakeProfit => TradeReason::TakeProfit,
            ExitReason::TrailingStop => TradeReason::TrailingStop,
        }
    }
}

/// Per-position exit thresholds, all expressed as fractions of entry price.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExitRules {
    /// Negative, e.g. -0.02 closes at a 2% loss.
    pub stop_loss_pct: f64,
    /// Positive, e.g. 0.04 closes at a 4% gain.
    pub take_profit_pct: f64,
    /// Fractional drop from the highest price seen since entry.
    pub trailing_stop_pct: f64,
}

impl ExitRules {
    /// Evaluate exit conditions for a held position at the current price.
    ///
    /// Checked in fixed order: stop-loss, take-profit, trailing stop; the
    /// first match wins. The caller updates `highest_price` before calling
    /// so a fresh high participates in the trailing calculation on the same
    /// tick.
    pub fn check_exit(&self, position: &Position, current_price: f64) -> Option<ExitReason> {
        if !position.holding {
            return None;
        }

        let pnl_pct = (current_price - position.entry_price) / position.entry_price;

        if pnl_pct <= self.stop_loss_pct + EPS {
            return Some(ExitReason::StopLoss);
        }

        if pnl_pct >= self.take_profit_pct - EPS {
            return Some(ExitReason::TakeProfit);
        }

        if position.highest_price > position.entry_price {
            let trailing_floor = position.highest_price * (1.0 - self.trailing_stop_pct);
            if current_price <= trailing_floor + EPS {
                return Some(ExitReason::TrailingStop);
            }
        }

        None
    }
}
