//! Folds 1-minute bars into N-minute candles
//!
//! Boundaries are count-based: every N bars fed for a symbol complete one
//! candle, regardless of wall-clock alignment. Gaps in the feed are
//! tolerated; missing bars are never synthesized.

use tracing::debug;

use super::history::CandleHistory;
use crate::types::{Bar, Candle};

#[derive(Debug)]
pub struct BarAggregator {
    timeframe_minutes: usize,
    buffer: Vec<Bar>,
    history: CandleHistory,
}

impl BarAggregator {
    pub fn new(symbol: impl Into<String>, timeframe_minutes: usize, history_size: usize) -> Self {
        let timeframe_minutes = timeframe_minutes.max(1);
        Self {
            timeframe_minutes,
            buffer: Vec::with_capacity(timeframe_minutes),
            history: CandleHistory::new(symbol, history_size),
        }
    }

    /// Add a 1-minute bar. Returns `true` when the bar completed a candle,
    /// which is then already committed to history.
    pub fn add(&mut self, bar: &Bar) -> bool {
        self.buffer.push(bar.clone());
        if self.buffer.len() < self.timeframe_minutes {
            return false;
        }

        let candle = self.fold();
        debug!(
            "{}: completed {}m candle @ {} close {:.2}",
            candle.symbol, self.timeframe_minutes, candle.timestamp, candle.close
        );
        self.history.push(&candle);
        self.buffer.clear();
        true
    }

    /// Collapse the full buffer into one candle. Caller guarantees the
    /// buffer holds exactly `timeframe_minutes` bars.
    fn fold(&self) -> Candle {
        let first = &self.buffer[0];
        let last = &self.buffer[self.buffer.len() - 1];

        let mut high = f64::MIN;
        let mut low = f64::MAX;
        let mut volume = 0.0;
        for bar in &self.buffer {
            high = high.max(bar.high);
            low = low.min(bar.low);
            volume += bar.volume;
        }

        Candle {
            symbol: first.symbol.clone(),
            timestamp: last.timestamp,
            open: first.open,
            high,
            low,
            close: last.close,
            volume,
        }
    }

    pub fn history(&self) -> &CandleHistory {
        &self.history
    }

    pub fn timeframe_minutes(&self) -> usize {
        self.timeframe_minutes
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn bar(minute: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Bar {
        let base: DateTime<Utc> = Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap();
        Bar {
            symbol: "MSFT".to_string(),
            timestamp: base + Duration::minutes(minute),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn incomplete_buffer_produces_nothing() {
        let mut agg = BarAggregator::new("MSFT", 5, 240);
        for i in 0..4 {
            assert!(!agg.add(&bar(i, 100.0, 101.0, 99.0, 100.5, 10.0)));
            assert_eq!(agg.buffered(), (i + 1) as usize);
            assert!(agg.history().is_empty());
        }
    }

    #[test]
    fn fifth_bar_completes_candle_and_clears_buffer() {
        let mut agg = BarAggregator::new("MSFT", 5, 240);
        agg.add(&bar(0, 100.0, 102.0, 99.5, 101.0, 10.0));
        agg.add(&bar(1, 101.0, 101.5, 100.0, 100.5, 20.0));
        agg.add(&bar(2, 100.5, 103.0, 100.5, 102.5, 30.0));
        agg.add(&bar(3, 102.5, 102.5, 98.0, 99.0, 15.0));
        assert!(agg.add(&bar(4, 99.0, 100.0, 98.5, 99.5, 25.0)));

        assert_eq!(agg.buffered(), 0);
        assert_eq!(agg.history().len(), 1);

        let candle = agg.history().last().unwrap();
        assert_eq!(candle.open, 100.0); // first bar's open
        assert_eq!(candle.high, 103.0); // max high
        assert_eq!(candle.low, 98.0); // min low
        assert_eq!(candle.close, 99.5); // last bar's close
        assert_eq!(candle.volume, 100.0); // summed
        assert_eq!(candle.timestamp, bar(4, 0.0, 0.0, 0.0, 0.0, 0.0).timestamp);
    }

    #[test]
    fn candle_ohlc_invariant_holds() {
        let mut agg = BarAggregator::new("MSFT", 3, 240);
        agg.add(&bar(0, 100.0, 105.0, 95.0, 102.0, 10.0));
        agg.add(&bar(1, 102.0, 104.0, 101.0, 103.0, 10.0));
        agg.add(&bar(2, 103.0, 106.0, 102.0, 104.0, 10.0));

        let c = agg.history().last().unwrap();
        assert!(c.low <= c.open.min(c.close));
        assert!(c.open.max(c.close) <= c.high);
        assert!(c.volume >= 0.0);
    }

    #[test]
    fn history_stays_bounded() {
        let mut agg = BarAggregator::new("MSFT", 2, 3);
        for i in 0..20 {
            agg.add(&bar(i, 100.0, 101.0, 99.0, 100.0, 1.0));
            assert!(agg.history().len() <= 3);
        }
        assert_eq!(agg.history().len(), 3);
    }

    #[test]
    fn unaligned_timestamps_use_bar_count() {
        // A 7-minute feed gap must not split or synthesize candles.
        let mut agg = BarAggregator::new("MSFT", 3, 240);
        assert!(!agg.add(&bar(0, 100.0, 101.0, 99.0, 100.0, 1.0)));
        assert!(!agg.add(&bar(1, 100.0, 101.0, 99.0, 100.0, 1.0)));
        assert!(agg.add(&bar(8, 100.0, 101.0, 99.0, 100.0, 1.0)));
        assert_eq!(agg.history().len(), 1);
    }

    #[test]
    fn replay_is_deterministic() {
        let bars: Vec<Bar> = (0..30)
            .map(|i| {
                let price = 100.0 + (i as f64 * 0.37).sin();
                bar(i, price, price + 0.4, price - 0.4, price + 0.1, 10.0 + i as f64)
            })
            .collect();

        let mut first = BarAggregator::new("MSFT", 5, 240);
        let mut second = BarAggregator::new("MSFT", 5, 240);
        for b in &bars {
            first.add(b);
            second.add(b);
        }

        assert_eq!(first.history().len(), second.history().len());
        assert_eq!(first.history().closes(), second.history().closes());
        assert_eq!(first.history().volumes(), second.history().volumes());
        assert_eq!(first.history().timestamps(), second.history().timestamps());
    }
}
