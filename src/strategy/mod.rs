// Signal generation: moving-average crossover detection
pub mod crossover;

pub use crossover::{CrossoverConfig, CrossoverStrategy, MaKind};
