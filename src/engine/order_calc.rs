//! Position sizing and exit-level math
//!
//! Pure and time-independent: the same (capital, entry, params) always
//! yields the same levels.

use crate::error::EngineError;
use crate::types::OrderParams;

/// Computed sizing and bracket for one entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderLevels {
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Stateless calculator with a pluggable lot size.
///
/// `lot_size: None` keeps fractional quantities (Alpaca accepts them for
/// most equities); `Some(step)` truncates the quantity down to a multiple
/// of `step`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderCalculator {
    lot_size: Option<f64>,
}

impl OrderCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lot_size(lot_size: f64) -> Self {
        Self {
            lot_size: Some(lot_size),
        }
    }

    pub fn levels(
        &self,
        capital: f64,
        entry_price: f64,
        params: &OrderParams,
    ) -> Result<OrderLevels, EngineError> {
        if !(entry_price > 0.0) || !entry_price.is_finite() {
            return Err(EngineError::InvalidParams(format!(
                "entry price must be positive and finite, got {}",
                entry_price
            )));
        }
        params.validate()?;

        let raw_quantity = (capital * params.risk_percentage) / entry_price;
        let quantity = match self.lot_size {
            Some(step) if step > 0.0 => (raw_quantity / step).floor() * step,
            _ => raw_quantity,
        };

        Ok(OrderLevels {
            quantity,
            stop_loss: entry_price * params.sl_multiplier,
            take_profit: entry_price * params.tp_multiplier,
        })
    }
}
