use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineError;

/// Inbound 1-minute OHLCV bar from the market data stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Reject bars the pipeline cannot safely consume. A bad bar is dropped
    /// and logged, never propagated.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.symbol.is_empty() {
            return Err(EngineError::MalformedBar("empty symbol".to_string()));
        }
        for (name, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::MalformedBar(format!(
                    "{} has non-positive or non-finite {} ({})",
                    self.symbol, name, value
                )));
            }
        }
        if !self.volume.is_finite() || self.volume <= 0.0 {
            return Err(EngineError::MalformedBar(format!(
                "{} has non-positive volume ({})",
                self.symbol, self.volume
            )));
        }
        Ok(())
    }
}

/// Aggregated N-minute candle. Produced only by the bar aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    /// Timestamp of the last 1-minute bar folded into this candle.
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Entry intent emitted by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Buy,
    /// Reserved. The bundled strategy never emits it; exits are mechanical.
    Sell,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Buy => write!(f, "BUY"),
            SignalKind::Sell => write!(f, "SELL"),
        }
    }
}

/// A trading signal: what to do, on which symbol, at what observed price.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub kind: SignalKind,
    pub symbol: String,
    pub price: f64,
}

impl Signal {
    pub fn buy(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            kind: SignalKind::Buy,
            symbol: symbol.into(),
            price,
        }
    }
}

/// Risk and exit configuration attached to every order a strategy originates.
#[derive(Debug, Clone)]
pub struct OrderParams {
    /// Fraction of capital committed per trade, in (0, 1].
    pub risk_percentage: f64,
    /// Take-profit level as a multiple of entry price, > 1.
    pub tp_multiplier: f64,
    /// Stop-loss level as a multiple of entry price, in (0, 1).
    pub sl_multiplier: f64,
    /// Present for future strategies; the engine does not trail stops.
    pub use_trailing_stop: bool,
    /// Strategy-specific extras (lot size overrides, venue hints, ...).
    pub extra: HashMap<String, String>,
}

impl OrderParams {
    pub fn new(risk_percentage: f64, tp_multiplier: f64, sl_multiplier: f64) -> Self {
        Self {
            risk_percentage,
            tp_multiplier,
            sl_multiplier,
            use_trailing_stop: false,
            extra: HashMap::new(),
        }
    }

    /// Fatal at construction: an engine must never run with params that
    /// would invert the bracket.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(self.risk_percentage > 0.0 && self.risk_percentage <= 1.0) {
            return Err(EngineError::InvalidParams(format!(
                "risk_percentage must be in (0, 1], got {}",
                self.risk_percentage
            )));
        }
        if !(self.tp_multiplier > 1.0) {
            return Err(EngineError::InvalidParams(format!(
                "tp_multiplier must be > 1, got {}",
                self.tp_multiplier
            )));
        }
        if !(self.sl_multiplier > 0.0 && self.sl_multiplier < 1.0) {
            return Err(EngineError::InvalidParams(format!(
                "sl_multiplier must be in (0, 1), got {}",
                self.sl_multiplier
            )));
        }
        Ok(())
    }
}

impl Default for OrderParams {
    fn default() -> Self {
        Self::new(0.02, 1.5, 0.9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(close: f64, volume: f64) -> Bar {
        Bar {
            symbol: "AAPL".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 6, 2, 14, 30, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    #[test]
    fn valid_bar_passes() {
        assert!(bar(187.25, 1200.0).validate().is_ok());
    }

    #[test]
    fn non_finite_price_rejected() {
        let mut b = bar(187.25, 1200.0);
        b.close = f64::NAN;
        assert!(b.validate().is_err());
    }

    #[test]
    fn zero_volume_rejected() {
        assert!(bar(187.25, 0.0).validate().is_err());
    }

    #[test]
    fn empty_symbol_rejected() {
        let mut b = bar(187.25, 1200.0);
        b.symbol.clear();
        assert!(b.validate().is_err());
    }

    #[test]
    fn default_params_are_valid() {
        assert!(OrderParams::default().validate().is_ok());
    }

    #[test]
    fn inverted_bracket_rejected() {
        assert!(OrderParams::new(0.02, 0.9, 1.5).validate().is_err());
        assert!(OrderParams::new(0.0, 1.5, 0.9).validate().is_err());
        assert!(OrderParams::new(0.02, 1.5, 1.0).validate().is_err());
    }
}
