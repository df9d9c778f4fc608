// Core modules
pub mod config;
pub mod db;
pub mod exchange;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod notify;
pub mod persistence;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use config::Config;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
