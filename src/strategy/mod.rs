//! Strategy capability and bundled strategies
//!
//! A strategy consumes per-symbol candle history and emits entry signals.
//! It owns nothing but its internal state and must not perform I/O; the
//! engine handles sizing, placement, and exits.

pub mod indicators;
pub mod rsi_bbands;

use std::collections::HashMap;

use crate::engine::history::CandleHistory;
use crate::types::{OrderParams, Signal};

pub use rsi_bbands::{RsiBbandsConfig, RsiBbandsStrategy};

pub trait Strategy: Send {
    /// Minimum completed candles per symbol before `analyze` can produce
    /// output for it. Symbols below the threshold are silently skipped.
    fn warmup_period(&self) -> usize;

    /// Evaluate the latest snapshot of every symbol's history. May mutate
    /// internal per-symbol state; must be deterministic for a given
    /// (state, histories) pair.
    fn analyze(&mut self, histories: &HashMap<&str, &CandleHistory>) -> Vec<Signal>;

    /// Risk/exit configuration for orders this strategy originates.
    fn order_params(&self) -> OrderParams;
}
