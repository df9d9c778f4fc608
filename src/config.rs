use std::path::Path;

use anyhow::{ensure, Context};
use config::{Environment, File};
use serde::Deserialize;

use crate::strategy::MaKind;

/// Complete runtime configuration, built once at process start and passed
/// into each component. Every field is enumerated here with a default;
/// values layer as defaults < `crossbot.toml` < `CROSSBOT_*` environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Identifier the store keys persisted state by.
    pub bot_id: String,

    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,

    /// Candle interval, e.g. "1m", "5m", "1h".
    pub interval: String,

    pub ma_kind: MaKind,
    pub short_period: usize,
    pub long_period: usize,

    /// Quote currency spent per entry.
    pub quote_per_trade: f64,

    /// Negative fraction, e.g. -0.02 for a 2% stop.
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub trailing_stop_pct: f64,

    /// Positive quote amount of realized loss that halts new entries.
    pub max_daily_loss: f64,
    pub max_daily_trades: u32,

    pub rest_base_url: String,

    /// Starting quote balance for the simulated account.
    pub paper_quote_balance: f64,

    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Config {
    /// Load and validate configuration. `path` overrides the default
    /// `crossbot.toml` lookup.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("bot_id", "crossbot")?
            .set_default("symbol", "BTCUSDT")?
            .set_default("base_asset", "BTC")?
            .set_default("quote_asset", "USDT")?
            .set_default("interval", "5m")?
            .set_default("ma_kind", "exponential")?
            .set_default("short_period", 9)?
            .set_default("long_period", 21)?
            .set_default("quote_per_trade", 100.0)?
            .set_default("stop_loss_pct", -0.02)?
            .set_default("take_profit_pct", 0.04)?
            .set_default("trailing_stop_pct", 0.015)?
            .set_default("max_daily_loss", 50.0)?
            .set_default("max_daily_trades", 10)?
            .set_default("rest_base_url", "https://api.binance.com")?
            .set_default("paper_quote_balance", 1_000.0)?;

        builder = match path {
            Some(p) => builder.add_source(File::from(p.to_path_buf())),
            None => builder.add_source(File::with_name("crossbot").required(false)),
        };
        builder = builder.add_source(Environment::with_prefix("CROSSBOT"));

        let cfg: Config = builder
            .build()
            .context("assembling configuration sources")?
            .try_deserialize()
            .context("deserializing configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Single validation pass over every field.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.bot_id.is_empty(), "bot_id must not be empty");
        ensure!(!self.symbol.is_empty(), "symbol must not be empty");
        ensure!(
            !self.base_asset.is_empty() && !self.quote_asset.is_empty(),
            "base_asset and quote_asset must not be empty"
        );

        ensure!(
            parse_interval(&self.interval).is_some(),
            "unsupported interval {:?} (expected one of 1m, 3m, 5m, 15m, 30m, 1h)",
            self.interval
        );

        ensure!(self.short_period >= 1, "short_period must be at least 1");
        ensure!(
            self.short_period < self.long_period,
            "short_period ({}) must be smaller than long_period ({})",
            self.short_period,
            self.long_period
        );

        ensure!(
            self.quote_per_trade > 0.0,
            "quote_per_trade must be positive"
        );
        ensure!(
            self.stop_loss_pct < 0.0,
            "stop_loss_pct must be negative (it is a loss threshold)"
        );
        ensure!(
            self.take_profit_pct > 0.0,
            "take_profit_pct must be positive"
        );
        ensure!(
            self.trailing_stop_pct > 0.0 && self.trailing_stop_pct < 1.0,
            "trailing_stop_pct must be within (0, 1)"
        );

        ensure!(self.max_daily_loss > 0.0, "max_daily_loss must be positive");
        ensure!(
            self.max_daily_trades >= 1,
            "max_daily_trades must be at least 1"
        );
        ensure!(
            self.paper_quote_balance > 0.0,
            "paper_quote_balance must be positive"
        );

        Ok(())
    }

    /// Interval length in minutes; validated at load time.
    pub fn interval_minutes(&self) -> u64 {
        parse_interval(&self.interval).expect("interval validated at load")
    }
}

/// Supported candle intervals: the clock-aligned poller needs them to divide
/// an hour evenly.
pub fn parse_interval(interval: &str) -> Option<u64> {
    match interval {
        "1m" => Some(1),
        "3m" => Some(3),
        "5m" => Some(5),
        "15m" => Some(15),
        "30m" => Some(30),
        "1h" => Some(60),
        _ => None,
    }
}
