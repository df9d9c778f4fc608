use std::sync::Arc;

use anyhow::Context;

use crate::db::StateStore;
use crate::exchange::ExchangeClient;
use crate::execution::executor::{OrderExecutor, OrderOutcome};
use crate::models::{DailyStats, Position, PricePoint, Signal, TradeReason};
use crate::notify::Notifier;
use crate::risk::{DailyLimits, ExitReason, ExitRules};
use crate::strategy::CrossoverStrategy;

/// Per-tick orchestrator: serializes each closed candle into signal
/// evaluation, exit checks, entry checks and persistence, in that fixed
/// order.
///
/// Owns the position and daily statistics exclusively; the governor and
/// executor receive the relevant slice of state as parameters. A failure
/// while processing one candle is logged and notified but never stops the
/// next candle from being processed.
pub struct Engine<E: ExchangeClient> {
    bot_id: String,
    quote_per_trade: f64,
    strategy: CrossoverStrategy,
    exits: ExitRules,
    limits: DailyLimits,
    executor: OrderExecutor<E>,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    position: Position,
    stats: DailyStats,
}

impl<E: ExchangeClient> Engine<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bot_id: &str,
        quote_per_trade: f64,
        strategy: CrossoverStrategy,
        exits: ExitRules,
        limits: DailyLimits,
        executor: OrderExecutor<E>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        position: Position,
        stats: DailyStats,
    ) -> Self {
        Self {
            bot_id: bot_id.to_string(),
            quote_per_trade,
            strategy,
            exits,
            limits,
            executor,
            store,
            notifier,
            position,
            stats,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn stats(&self) -> &DailyStats {
        &self.stats
    }

    /// Process one closed candle to completion. Errors are contained here:
    /// the engine is resilient per tick, not per session.
    pub async fn on_price(&mut self, point: PricePoint) {
        if let Err(e) = self.process(point).await {
            tracing::error!(
                error = format!("{e:#}"),
                price = point.price,
                "price event processing failed; continuing with next candle"
            );
            self.notifier
                .notify(&format!("tick processing failed: {e:#}"))
                .await;
        }
    }

    /// Persist current state on shutdown.
    pub async fn shutdown(&self) {
        self.save().await;
        tracing::info!(bot_id = %self.bot_id, "engine state saved on shutdown");
    }

    async fn process(&mut self, point: PricePoint) -> anyhow::Result<()> {
        let price = point.price;

        // A process running across midnight archives and resets exactly once
        // per boundary; restarts handle the same transition at load time.
        if self.stats.rollover_if_new_day(point.close_time) {
            tracing::info!("daily statistics rolled over to a new day");
            self.save().await;
        }

        let signal = self.strategy.observe(price);
        if signal != Signal::Hold {
            tracing::info!(?signal, price, "moving-average crossover detected");
        }

        if self.position.holding {
            // A fresh high must be visible to the trailing-stop rule on this
            // same tick.
            if price > self.position.highest_price {
                self.position.highest_price = price;
            }

            if let Some(exit) = self.exits.check_exit(&self.position, price) {
                self.close_position(exit, price).await?;
                return Ok(());
            }

            if signal == Signal::Sell {
                // Crossunders do not close positions; exits belong to the
                // risk rules alone.
                tracing::debug!(price, "sell crossover while holding, no exit rule met");
            }
        } else if signal == Signal::Buy {
            self.open_position(price).await?;
        }

        Ok(())
    }

    async fn close_position(&mut self, exit: ExitReason, price: f64) -> anyhow::Result<()> {
        let reason: TradeReason = exit.into();
        tracing::info!(
            reason = reason.as_str(),
            price,
            entry = self.position.entry_price,
            highest = self.position.highest_price,
            "exit condition met"
        );

        let outcome = self
            .executor
            .sell(&self.position, price, reason, &mut self.stats)
            .await
            .with_context(|| format!("closing position ({})", reason.as_str()))?;

        match outcome {
            OrderOutcome::Filled(fill) => {
                self.position.clear();
                self.save().await;
                self.notifier
                    .notify(&format!(
                        "SELL {} {:.8} @ {:.8} [{}] pnl {:+.4} {}",
                        self.executor.symbol(),
                        fill.quantity,
                        fill.avg_price,
                        reason.as_str(),
                        fill.profit,
                        self.position.quote_asset,
                    ))
                    .await;
            }
            OrderOutcome::Rejected(reject) => {
                tracing::warn!(%reject, "exit order rejected, position unchanged");
            }
        }

        Ok(())
    }

    async fn open_position(&mut self, price: f64) -> anyhow::Result<()> {
        if let Err(breach) = self.limits.check(&self.stats) {
            tracing::info!(%breach, "entry blocked by daily limits");
            self.notifier
                .notify(&format!("entry signal skipped: {breach}"))
                .await;
            return Ok(());
        }

        let outcome = self
            .executor
            .buy(self.quote_per_trade, price, &mut self.stats)
            .await
            .context("opening position")?;

        match outcome {
            OrderOutcome::Filled(fill) => {
                self.position.open(fill.quantity, fill.avg_price);
                self.save().await;
                self.notifier
                    .notify(&format!(
                        "BUY {} {:.8} @ {:.8} [SIGNAL] spent {:.4} {}",
                        self.executor.symbol(),
                        fill.quantity,
                        fill.avg_price,
                        fill.quote_amount,
                        self.position.quote_asset,
                    ))
                    .await;
            }
            OrderOutcome::Rejected(reject) => {
                tracing::warn!(%reject, "entry order rejected");
            }
        }

        Ok(())
    }

    /// Write-through save. A failure is escalated but does not stop trading:
    /// in-memory state stays authoritative for the session.
    async fn save(&self) {
        if let Err(e) = self
            .store
            .save(&self.bot_id, &self.position, &self.stats)
            .await
        {
            tracing::error!(
                error = %e,
                "state save FAILED; crash recovery is degraded until the next successful save"
            );
            self.notifier
                .notify(&format!("WARNING: state persistence failed: {e}"))
                .await;
        }
    }
}
