// Moving-average math used by the signal engine
pub mod moving_average;

pub use moving_average::{ema, sma};
