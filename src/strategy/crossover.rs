use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::indicators::{ema, sma};
use crate::models::Signal;

/// Which moving-average family drives the crossover.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MaKind {
    Simple,
    Exponential,
}

#[derive(Debug, Clone)]
pub struct CrossoverConfig {
    pub kind: MaKind,
    pub short_period: usize,
    pub long_period: usize,
}

/// Moving-average crossover signal engine.
///
/// Feeds every observed close price into a bounded rolling buffer, computes
/// the short and long averages, and compares the current pair against the
/// previous one: a BUY when the short average crosses above the long, a SELL
/// when it crosses below. Emits `Hold` until `long_period` prices have been
/// seen and at least two average pairs exist.
pub struct CrossoverStrategy {
    config: CrossoverConfig,
    prices: VecDeque<f64>,
    capacity: usize,
    previous: Option<(f64, f64)>,
}

impl CrossoverStrategy {
    pub fn new(config: CrossoverConfig) -> Self {
        // Twice the long window keeps the EMA tail stable while bounding
        // memory.
        let capacity = config.long_period * 2;
        Self {
            config,
            prices: VecDeque::with_capacity(capacity),
            capacity,
            previous: None,
        }
    }

    /// Observe one closed price and return the resulting signal.
    pub fn observe(&mut self, price: f64) -> Signal {
        self.prices.push_back(price);
        while self.prices.len() > self.capacity {
            self.prices.pop_front();
        }

        if self.prices.len() < self.config.long_period {
            return Signal::Hold;
        }

        let window: Vec<f64> = self.prices.iter().copied().collect();
        let (Some(short), Some(long)) = (
            self.average(&window, self.config.short_period),
            self.average(&window, self.config.long_period),
        ) else {
            return Signal::Hold;
        };

        let signal = match self.previous {
            Some((prev_short, prev_long)) => {
                if prev_short <= prev_long && short > long {
                    Signal::Buy
                } else if prev_short >= prev_long && short < long {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
            None => Signal::Hold,
        };

        self.previous = Some((short, long));
        signal
    }

    /// Replay persisted history so a restart does not begin cold. Signals
    /// produced during replay are discarded.
    pub fn warm_up(&mut self, prices: &[f64]) {
        for price in prices {
            let _ = self.observe(*price);
        }
        if !prices.is_empty() {
            tracing::info!(
                replayed = prices.len(),
                ready = self.is_ready(),
                "warmed signal engine from persisted history"
            );
        }
    }

    /// Whether enough history has accumulated for signals to fire.
    pub fn is_ready(&self) -> bool {
        self.previous.is_some()
    }

    pub fn observed(&self) -> usize {
        self.prices.len()
    }

    fn average(&self, window: &[f64], period: usize) -> Option<f64> {
        match self.config.kind {
            MaKind::Simple => sma(window, period),
            MaKind::Exponential => ema(window, period),
        }
    }
}
