// Risk management: per-position exit rules and the daily entry gate
pub mod daily_limits;
pub mod exits;

pub use daily_limits::{DailyLimits, LimitBreach};
pub use exits::{ExitReason, ExitRules};
