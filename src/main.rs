use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;

use crossbot::config::Config;
use crossbot::db::{self, MemoryStore, PostgresStore, StateStore};
use crossbot::exchange::{MarketData, PaperExchange, RestMarketData, SymbolFilters};
use crossbot::execution::{Engine, OrderExecutor};
use crossbot::feed::{PriceFeed, RestPollingFeed};
use crossbot::notify::{LogNotifier, Notifier, WebhookNotifier};
use crossbot::persistence::PriceHistory;
use crossbot::risk::{DailyLimits, ExitRules};
use crossbot::strategy::{CrossoverConfig, CrossoverStrategy};

#[derive(Parser)]
#[command(name = "crossbot", about = "Moving-average crossover trading bot")]
struct Cli {
    /// Path to a TOML configuration file (defaults to crossbot.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the paper account's starting quote balance
    #[arg(long)]
    paper_balance: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    setup_logging();

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(balance) = cli.paper_balance {
        cfg.paper_quote_balance = balance;
        cfg.validate()?;
    }

    tracing::info!("🚀 crossbot starting");
    tracing::info!(
        "  Symbol: {} ({}/{}), interval {}",
        cfg.symbol,
        cfg.base_asset,
        cfg.quote_asset,
        cfg.interval
    );
    tracing::info!(
        "  Averages: {:?} {}/{} | per-trade {:.2} {}",
        cfg.ma_kind,
        cfg.short_period,
        cfg.long_period,
        cfg.quote_per_trade,
        cfg.quote_asset
    );
    tracing::info!(
        "  Exits: stop {:.2}% | take {:.2}% | trail {:.2}%",
        cfg.stop_loss_pct * 100.0,
        cfg.take_profit_pct * 100.0,
        cfg.trailing_stop_pct * 100.0
    );
    tracing::info!(
        "  Daily caps: loss {:.2} {} | {} trades",
        cfg.max_daily_loss,
        cfg.quote_asset,
        cfg.max_daily_trades
    );

    let market = Arc::new(RestMarketData::new(&cfg.rest_base_url));
    let filters = load_filters(market.as_ref(), &cfg.symbol).await;

    let store = connect_store(&cfg).await;
    let notifier = build_notifier(&cfg);

    let paper = Arc::new(PaperExchange::new(
        &cfg.symbol,
        &cfg.base_asset,
        &cfg.quote_asset,
        filters,
    ));
    paper.deposit(&cfg.quote_asset, cfg.paper_quote_balance);
    tracing::info!(
        "  Paper account funded with {:.2} {}",
        cfg.paper_quote_balance,
        cfg.quote_asset
    );

    let (position, stats) = db::load_state(
        store.as_ref(),
        &cfg.bot_id,
        &cfg.base_asset,
        &cfg.quote_asset,
        Utc::now(),
    )
    .await?;

    let mut strategy = CrossoverStrategy::new(CrossoverConfig {
        kind: cfg.ma_kind,
        short_period: cfg.short_period,
        long_period: cfg.long_period,
    });

    let mut history = connect_history(&cfg).await;
    if let Some(history) = history.as_mut() {
        match history.recent(&cfg.symbol, cfg.long_period * 2).await {
            Ok(points) => {
                let prices: Vec<f64> = points.iter().map(|p| p.price).collect();
                strategy.warm_up(&prices);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load price history, starting cold");
            }
        }
    }

    let executor = OrderExecutor::new(
        paper.clone(),
        store.clone(),
        &cfg.bot_id,
        &cfg.symbol,
        &cfg.quote_asset,
        filters,
    );
    let exits = ExitRules {
        stop_loss_pct: cfg.stop_loss_pct,
        take_profit_pct: cfg.take_profit_pct,
        trailing_stop_pct: cfg.trailing_stop_pct,
    };
    let limits = DailyLimits {
        max_daily_loss: cfg.max_daily_loss,
        max_daily_trades: cfg.max_daily_trades,
    };

    let mut engine = Engine::new(
        &cfg.bot_id,
        cfg.quote_per_trade,
        strategy,
        exits,
        limits,
        executor,
        store.clone(),
        notifier,
        position,
        stats,
    );

    let mut feed = RestPollingFeed::new(
        market.clone(),
        &cfg.symbol,
        &cfg.interval,
        cfg.interval_minutes(),
    );
    let retention_hours = price_history_retention_hours(&cfg);

    tracing::info!("Entering candle loop, press Ctrl+C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C, shutting down");
                break;
            }
            next = feed.next_candle() => match next {
                Ok(point) => {
                    if let Some(history) = history.as_mut() {
                        if let Err(e) = history.append(&cfg.symbol, &point).await {
                            tracing::warn!(error = %e, "failed to append price history");
                        }
                        if let Err(e) = history.trim_older_than(&cfg.symbol, retention_hours).await {
                            tracing::debug!(error = %e, "failed to trim price history");
                        }
                    }

                    paper.set_mark_price(point.price);
                    engine.on_price(point).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "price feed error, waiting for next candle");
                }
            }
        }
    }

    engine.shutdown().await;
    tracing::info!("👋 crossbot stopped");
    Ok(())
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crossbot=info".into()),
        )
        .init();
}

/// Symbol filters come from the exchange once at startup. A paper session
/// with no connectivity falls back to permissive defaults.
async fn load_filters(market: &RestMarketData, symbol: &str) -> SymbolFilters {
    match market.filters(symbol).await {
        Ok(filters) => filters,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "could not fetch symbol filters, using permissive paper defaults"
            );
            SymbolFilters::permissive()
        }
    }
}

async fn connect_store(cfg: &Config) -> Arc<dyn StateStore> {
    let database_url = cfg
        .database_url
        .clone()
        .or_else(|| std::env::var("DATABASE_URL").ok());

    let Some(database_url) = database_url else {
        tracing::warn!("no DATABASE_URL configured, state will not survive restarts");
        return Arc::new(MemoryStore::new());
    };

    match PostgresStore::connect(&database_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "failed to connect to Postgres, continuing with in-memory state"
            );
            Arc::new(MemoryStore::new())
        }
    }
}

async fn connect_history(cfg: &Config) -> Option<PriceHistory> {
    let redis_url = cfg
        .redis_url
        .clone()
        .or_else(|| std::env::var("REDIS_URL").ok());

    let Some(redis_url) = redis_url else {
        tracing::info!("no REDIS_URL configured, signal engine starts cold after restarts");
        return None;
    };

    match PriceHistory::connect(&redis_url).await {
        Ok(history) => Some(history),
        Err(e) => {
            tracing::warn!(error = %e, "failed to connect to Redis, starting cold");
            None
        }
    }
}

fn build_notifier(cfg: &Config) -> Arc<dyn Notifier> {
    match &cfg.webhook_url {
        Some(url) => {
            tracing::info!("notifications go to the configured webhook");
            Arc::new(WebhookNotifier::new(url))
        }
        None => Arc::new(LogNotifier),
    }
}

/// Keep enough history to refill the signal buffer, with a one-day floor.
fn price_history_retention_hours(cfg: &Config) -> u64 {
    let needed_minutes = cfg.long_period as u64 * 2 * cfg.interval_minutes();
    (needed_minutes / 60 + 1).max(24)
}
