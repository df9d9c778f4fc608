// Order execution and per-tick orchestration
pub mod engine;
pub mod executor;

pub use engine::Engine;
pub use executor::{
    apply_step_size, apply_tick_size, FillReport, OrderExecutor, OrderOutcome, RejectReason,
};
