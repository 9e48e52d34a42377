//! Bounded columnar candle history
//!
//! Indicators consume contiguous `&[f64]` slices, so completed candles are
//! stored column-wise rather than as a row vector. Appends evict the oldest
//! row once the cap is reached; timestamps stay strictly monotonic.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::types::Candle;

/// Default number of completed candles retained per symbol.
pub const DEFAULT_HISTORY_SIZE: usize = 240;

#[derive(Debug, Clone)]
pub struct CandleHistory {
    capacity: usize,
    symbol: String,
    timestamps: Vec<DateTime<Utc>>,
    opens: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
    closes: Vec<f64>,
    volumes: Vec<f64>,
}

impl CandleHistory {
    pub fn new(symbol: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            symbol: symbol.into(),
            timestamps: Vec::with_capacity(capacity),
            opens: Vec::with_capacity(capacity),
            highs: Vec::with_capacity(capacity),
            lows: Vec::with_capacity(capacity),
            closes: Vec::with_capacity(capacity),
            volumes: Vec::with_capacity(capacity),
        }
    }

    /// Append a completed candle, evicting the oldest once full.
    ///
    /// Candles must arrive in timestamp order; an out-of-order candle is
    /// dropped rather than corrupting the series.
    pub fn push(&mut self, candle: &Candle) {
        if let Some(last) = self.timestamps.last() {
            if candle.timestamp <= *last {
                warn!(
                    "{}: dropping out-of-order candle at {} (last {})",
                    self.symbol, candle.timestamp, last
                );
                return;
            }
        }

        self.timestamps.push(candle.timestamp);
        self.opens.push(candle.open);
        self.highs.push(candle.high);
        self.lows.push(candle.low);
        self.closes.push(candle.close);
        self.volumes.push(candle.volume);

        while self.timestamps.len() > self.capacity {
            self.timestamps.remove(0);
            self.opens.remove(0);
            self.highs.remove(0);
            self.lows.remove(0);
            self.closes.remove(0);
            self.volumes.remove(0);
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn opens(&self) -> &[f64] {
        &self.opens
    }

    pub fn highs(&self) -> &[f64] {
        &self.highs
    }

    pub fn lows(&self) -> &[f64] {
        &self.lows
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    /// Reassemble the candle at `index` (0 = oldest).
    pub fn candle(&self, index: usize) -> Option<Candle> {
        if index >= self.len() {
            return None;
        }
        Some(Candle {
            symbol: self.symbol.clone(),
            timestamp: self.timestamps[index],
            open: self.opens[index],
            high: self.highs[index],
            low: self.lows[index],
            close: self.closes[index],
            volume: self.volumes[index],
        })
    }

    pub fn last(&self) -> Option<Candle> {
        self.len().checked_sub(1).and_then(|i| self.candle(i))
    }
}
