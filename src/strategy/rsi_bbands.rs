//! Two-stage RSI + Bollinger Band mean-reversion strategy
//!
//! Stage 1 arms a symbol when price breaks below the lower band while RSI is
//! oversold. Stage 2 waits for a controlled recovery: RSI back inside a
//! narrow band, volatility expanding (bandwidth rate of change), and a
//! bullish engulfing candle. Only then does it emit a BUY at the close.
//! A recovery that overshoots the RSI exit zone disarms silently.

use std::collections::HashMap;
use tracing::debug;

use super::indicators::{bbands, roc, rsi};
use super::Strategy;
use crate::engine::history::CandleHistory;
use crate::types::{OrderParams, Signal};

#[derive(Debug, Clone)]
pub struct RsiBbandsConfig {
    pub bb_period: usize,
    pub bb_std_dev: f64,
    pub rsi_period: usize,
    pub roc_period: usize,
    /// Stage 1 arms at RSI at or below this.
    pub stage1_rsi_threshold: f64,
    /// Stage 2 entry window: `stage2_rsi_entry <= rsi < stage2_rsi_exit`.
    pub stage2_rsi_entry: f64,
    pub stage2_rsi_exit: f64,
    /// Minimum bandwidth rate of change for a stage 2 entry.
    pub stage2_min_roc: f64,
}

impl Default for RsiBbandsConfig {
    fn default() -> Self {
        Self {
            bb_period: 20,
            bb_std_dev: 2.0,
            rsi_period: 14,
            roc_period: 9,
            stage1_rsi_threshold: 30.0,
            stage2_rsi_entry: 30.0,
            stage2_rsi_exit: 40.0,
            stage2_min_roc: 0.15,
        }
    }
}

pub struct RsiBbandsStrategy {
    config: RsiBbandsConfig,
    order_params: OrderParams,
    /// Per-symbol stage 1 flag. Missing entry means disarmed.
    armed: HashMap<String, bool>,
}

impl RsiBbandsStrategy {
    pub fn new(config: RsiBbandsConfig) -> Self {
        Self {
            config,
            order_params: OrderParams::new(0.02, 1.5, 0.9),
            armed: HashMap::new(),
        }
    }

    pub fn is_armed(&self, symbol: &str) -> bool {
        self.armed.get(symbol).copied().unwrap_or(false)
    }

    /// Stage 1: close strictly below the lower band while RSI is oversold.
    /// NaN in either indicator fails the comparison and leaves state alone.
    fn stage1_arms(close: f64, lower: f64, rsi_value: f64, threshold: f64) -> bool {
        close < lower && rsi_value <= threshold
    }

    /// Stage 2 RSI window, strict on the upper bound.
    fn stage2_in_entry_range(rsi_value: f64, entry: f64, exit: f64) -> bool {
        entry <= rsi_value && rsi_value < exit
    }

    /// Current green body fully covers the prior red body.
    fn is_bullish_engulfing(prev_open: f64, prev_close: f64, open: f64, close: f64) -> bool {
        prev_close < prev_open && close > open && open < prev_close && close > prev_open
    }

    fn evaluate(&mut self, symbol: &str, history: &CandleHistory) -> Option<Signal> {
        let closes = history.closes();
        let opens = history.opens();
        let n = closes.len();

        let (upper, _middle, lower) = bbands(closes, self.config.bb_period, self.config.bb_std_dev);
        let rsi_series = rsi(closes, self.config.rsi_period);
        let bandwidth: Vec<f64> = upper.iter().zip(&lower).map(|(u, l)| u - l).collect();
        let bandwidth_roc = roc(&bandwidth, self.config.roc_period);

        let close = closes[n - 1];
        let lower_band = lower[n - 1];
        let rsi_value = rsi_series[n - 1];
        let roc_value = bandwidth_roc[n - 1];

        let armed = self.armed.entry(symbol.to_string()).or_insert(false);

        if !*armed {
            if Self::stage1_arms(close, lower_band, rsi_value, self.config.stage1_rsi_threshold) {
                *armed = true;
                debug!(
                    "{}: stage 1 armed, close {:.2} below band {:.2}, rsi {:.1}",
                    symbol, close, lower_band, rsi_value
                );
            }
            return None;
        }

        // Armed: a recovery past the exit zone invalidates the setup.
        if rsi_value > self.config.stage2_rsi_exit + 5.0 {
            *armed = false;
            debug!("{}: disarmed, rsi {:.1} overshot recovery zone", symbol, rsi_value);
            return None;
        }

        if !Self::stage2_in_entry_range(rsi_value, self.config.stage2_rsi_entry, self.config.stage2_rsi_exit) {
            return None;
        }
        if roc_value.is_nan() || roc_value <= self.config.stage2_min_roc {
            return None;
        }
        if n < 2 || !Self::is_bullish_engulfing(opens[n - 2], closes[n - 2], opens[n - 1], close) {
            return None;
        }

        *armed = false;
        debug!("{}: stage 2 confirmed, buy @ {:.2}", symbol, close);
        Some(Signal::buy(symbol, close))
    }
}

impl Strategy for RsiBbandsStrategy {
    fn warmup_period(&self) -> usize {
        self.config
            .bb_period
            .max(self.config.rsi_period)
            .max(self.config.roc_period)
            + 1
    }

    fn analyze(&mut self, histories: &HashMap<&str, &CandleHistory>) -> Vec<Signal> {
        let mut signals = Vec::new();

        // Sorted iteration keeps replay output deterministic.
        let mut symbols: Vec<&&str> = histories.keys().collect();
        symbols.sort();

        for &symbol in symbols {
            let history = histories[symbol];
            if history.len() < self.warmup_period() {
                continue;
            }
            if let Some(signal) = self.evaluate(symbol, history) {
                signals.push(signal);
            }
        }
        signals
    }

    fn order_params(&self) -> OrderParams {
        self.order_params.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Candle, SignalKind};
    use chrono::{Duration, TimeZone, Utc};

    fn candle(minute: i64, open: f64, close: f64) -> Candle {
        let base = Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap();
        Candle {
            symbol: "TEST".to_string(),
            timestamp: base + Duration::minutes(minute * 5),
            open,
            high: open.max(close) + 0.5,
            low: open.min(close) - 0.5,
            close,
            volume: 1000.0,
        }
    }

    /// 24 noisy-flat candles, a crash through the lower band, then a
    /// controlled recovery ending in a bullish engulfing candle. Indicator
    /// values along the way: arm at index 24 (rsi 15.6, close 85 < band
    /// 92.83); recovery rsi 23.1 / 29.9 / 35.9 / 35.1; fire candle rsi 39.5
    /// with bandwidth roc ~20.2.
    fn scenario_candles(engulfing: bool) -> Vec<Candle> {
        let mut candles = Vec::new();
        let mut prev_close = 100.25;
        for i in 0..24 {
            let close = if i % 2 == 0 { 100.0 } else { 100.5 };
            candles.push(candle(i, prev_close, close));
            prev_close = close;
        }
        candles.push(candle(24, 100.0, 85.0)); // crash: arms stage 1
        candles.push(candle(25, 85.0, 87.0));
        candles.push(candle(26, 87.0, 89.0));
        candles.push(candle(27, 89.0, 91.0));
        candles.push(candle(28, 91.0, 90.5)); // small red setup candle
        let fire_open = if engulfing { 90.0 } else { 90.6 };
        candles.push(candle(29, fire_open, 92.0));
        candles
    }

    fn run(strategy: &mut RsiBbandsStrategy, candles: &[Candle], upto: usize) -> Vec<Signal> {
        let mut history = CandleHistory::new("TEST", 240);
        for c in &candles[..=upto] {
            history.push(c);
        }
        let histories = HashMap::from([("TEST", &history)]);
        strategy.analyze(&histories)
    }

    #[test]
    fn short_history_produces_nothing_and_no_state() {
        let mut strategy = RsiBbandsStrategy::new(RsiBbandsConfig::default());
        let candles = scenario_candles(true);

        // 20 candles < warmup of 21
        let signals = run(&mut strategy, &candles, 19);
        assert!(signals.is_empty());
        assert!(!strategy.is_armed("TEST"));
    }

    #[test]
    fn crash_candle_arms_without_signal() {
        let mut strategy = RsiBbandsStrategy::new(RsiBbandsConfig::default());
        let candles = scenario_candles(true);

        let signals = run(&mut strategy, &candles, 24);
        assert!(signals.is_empty());
        assert!(strategy.is_armed("TEST"));
    }

    #[test]
    fn full_two_stage_fire() {
        let mut strategy = RsiBbandsStrategy::new(RsiBbandsConfig::default());
        let candles = scenario_candles(true);

        for i in 24..29 {
            let signals = run(&mut strategy, &candles, i);
            assert!(signals.is_empty(), "unexpected signal at candle {}", i);
            assert!(strategy.is_armed("TEST"), "disarmed early at candle {}", i);
        }

        let signals = run(&mut strategy, &candles, 29);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Buy);
        assert_eq!(signals[0].symbol, "TEST");
        assert_eq!(signals[0].price, 92.0);
        assert!(!strategy.is_armed("TEST"));
    }

    #[test]
    fn missing_engulfing_blocks_fire() {
        let mut strategy = RsiBbandsStrategy::new(RsiBbandsConfig::default());
        let candles = scenario_candles(false);

        run(&mut strategy, &candles, 24);
        let signals = run(&mut strategy, &candles, 29);

        assert!(signals.is_empty());
        assert!(strategy.is_armed("TEST"));
    }

    #[test]
    fn recovery_overshoot_disarms_silently() {
        let mut strategy = RsiBbandsStrategy::new(RsiBbandsConfig::default());
        let mut candles = scenario_candles(true);
        candles.truncate(25);
        candles.push(candle(25, 85.0, 100.0)); // rsi jumps to ~51

        run(&mut strategy, &candles, 24);
        assert!(strategy.is_armed("TEST"));

        let signals = run(&mut strategy, &candles, 25);
        assert!(signals.is_empty());
        assert!(!strategy.is_armed("TEST"));
    }

    #[test]
    fn replay_with_fresh_state_is_identical() {
        let candles = scenario_candles(true);

        let collect = || {
            let mut strategy = RsiBbandsStrategy::new(RsiBbandsConfig::default());
            let mut all = Vec::new();
            for i in 21..candles.len() {
                all.extend(run(&mut strategy, &candles, i));
            }
            all
        };

        assert_eq!(collect(), collect());
        assert_eq!(collect().len(), 1);
    }

    #[test]
    fn close_exactly_on_band_does_not_arm() {
        assert!(!RsiBbandsStrategy::stage1_arms(100.0, 100.0, 28.0, 30.0));
        assert!(RsiBbandsStrategy::stage1_arms(99.99, 100.0, 28.0, 30.0));
        // RSI boundary is inclusive on stage 1.
        assert!(RsiBbandsStrategy::stage1_arms(95.0, 100.0, 30.0, 30.0));
        // NaN never arms.
        assert!(!RsiBbandsStrategy::stage1_arms(95.0, f64::NAN, 28.0, 30.0));
        assert!(!RsiBbandsStrategy::stage1_arms(95.0, 100.0, f64::NAN, 30.0));
    }

    #[test]
    fn rsi_at_exit_bound_fails_entry_range() {
        assert!(!RsiBbandsStrategy::stage2_in_entry_range(40.0, 30.0, 40.0));
        assert!(RsiBbandsStrategy::stage2_in_entry_range(30.0, 30.0, 40.0));
        assert!(RsiBbandsStrategy::stage2_in_entry_range(39.999, 30.0, 40.0));
        assert!(!RsiBbandsStrategy::stage2_in_entry_range(f64::NAN, 30.0, 40.0));
    }

    #[test]
    fn engulfing_requires_all_four_conditions() {
        // prior red 91 -> 90.5, current green 90 -> 92
        assert!(RsiBbandsStrategy::is_bullish_engulfing(91.0, 90.5, 90.0, 92.0));
        // prior candle green
        assert!(!RsiBbandsStrategy::is_bullish_engulfing(90.0, 90.5, 90.0, 92.0));
        // current candle red
        assert!(!RsiBbandsStrategy::is_bullish_engulfing(91.0, 90.5, 92.0, 90.0));
        // open does not dip below prior close
        assert!(!RsiBbandsStrategy::is_bullish_engulfing(91.0, 90.5, 90.5, 92.0));
        // close does not clear prior open
        assert!(!RsiBbandsStrategy::is_bullish_engulfing(91.0, 90.5, 90.0, 91.0));
    }

    #[test]
    fn symbols_are_independent() {
        let mut strategy = RsiBbandsStrategy::new(RsiBbandsConfig::default());
        let candles = scenario_candles(true);

        let mut crashed = CandleHistory::new("A", 240);
        for c in &candles[..=24] {
            crashed.push(c);
        }
        let mut flat = CandleHistory::new("B", 240);
        for c in &candles[..=23] {
            flat.push(c);
        }
        flat.push(&candle(24, 100.5, 100.0));

        let histories = HashMap::from([("A", &crashed), ("B", &flat)]);
        let signals = strategy.analyze(&histories);

        assert!(signals.is_empty());
        assert!(strategy.is_armed("A"));
        assert!(!strategy.is_armed("B"));
    }

    #[test]
    fn default_order_params() {
        let strategy = RsiBbandsStrategy::new(RsiBbandsConfig::default());
        let params = strategy.order_params();
        assert_eq!(params.risk_percentage, 0.02);
        assert_eq!(params.tp_multiplier, 1.5);
        assert_eq!(params.sl_multiplier, 0.9);
        assert!(!params.use_trailing_stop);
    }

    #[test]
    fn warmup_period_covers_longest_indicator() {
        let strategy = RsiBbandsStrategy::new(RsiBbandsConfig::default());
        assert_eq!(strategy.warmup_period(), 21);
    }
}
