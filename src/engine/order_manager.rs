//! Order lifecycle: entry placement, exit monitoring, position reconciliation
//!
//! One active order per symbol, tracked in memory only. Exits are
//! edge-triggered market closes checked against every incoming price; a
//! failed close stays tracked and is re-evaluated on the next bar.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::order_calc::OrderCalculator;
use crate::broker::{BrokerClient, MarketOrderRequest, OrderSide, PositionSide};
use crate::error::EngineError;
use crate::types::{OrderParams, Signal};

/// How an active order entered the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderOrigin {
    /// Placed by this engine in response to a signal.
    Placed,
    /// Adopted from a pre-existing broker position at startup.
    Adopted,
}

/// An entry currently being monitored for exit. Immutable once created;
/// removal is the only terminal transition.
#[derive(Debug, Clone)]
pub struct ActiveOrder {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub opened_at: DateTime<Utc>,
    pub origin: OrderOrigin,
}

/// Why a placement was refused without contacting the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// An order for this symbol is already active.
    DuplicatePosition,
}

/// Result of a placement attempt.
#[derive(Debug, Clone)]
pub enum PlaceOutcome {
    Accepted(ActiveOrder),
    Rejected(RejectReason),
    Failed(String),
}

pub struct OrderManager {
    broker: Arc<dyn BrokerClient>,
    order_params: OrderParams,
    calculator: OrderCalculator,
    /// order id -> order; at most one entry per symbol.
    active: HashMap<String, ActiveOrder>,
}

impl OrderManager {
    pub fn new(broker: Arc<dyn BrokerClient>, order_params: OrderParams) -> Result<Self, EngineError> {
        order_params.validate()?;
        Ok(Self {
            broker,
            order_params,
            calculator: OrderCalculator::new(),
            active: HashMap::new(),
        })
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &ActiveOrder> {
        self.active.values()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.active.values().any(|o| o.symbol == symbol)
    }

    /// Place a market entry for `signal`, sized against `capital`.
    pub async fn place(&mut self, signal: &Signal, capital: f64) -> PlaceOutcome {
        if self.has_position(&signal.symbol) {
            debug!("{}: rejecting entry, position already active", signal.symbol);
            return PlaceOutcome::Rejected(RejectReason::DuplicatePosition);
        }

        let levels = match self.calculator.levels(capital, signal.price, &self.order_params) {
            Ok(levels) => levels,
            Err(e) => return PlaceOutcome::Failed(e.to_string()),
        };

        let request = MarketOrderRequest::new(&signal.symbol, OrderSide::Buy, levels.quantity);
        let ack = match self.broker.submit_market_order(&request).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!("{}: entry order failed: {:#}", signal.symbol, e);
                return PlaceOutcome::Failed(e.to_string());
            }
        };

        let order = ActiveOrder {
            id: ack.order_id,
            symbol: signal.symbol.clone(),
            side: OrderSide::Buy,
            quantity: levels.quantity,
            entry_price: signal.price,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            opened_at: Utc::now(),
            origin: OrderOrigin::Placed,
        };

        info!(
            "{}: entry {} qty {:.4} @ {:.2} | SL {:.2} | TP {:.2}",
            order.symbol, order.id, order.quantity, order.entry_price, order.stop_loss, order.take_profit
        );
        self.active.insert(order.id.clone(), order.clone());
        PlaceOutcome::Accepted(order)
    }

    /// Check every active order against the latest prices and close those
    /// that crossed a threshold. Stop-loss wins when a bar straddles both.
    pub async fn monitor(&mut self, prices: &HashMap<String, f64>) {
        let mut exits: Vec<(String, &'static str, f64)> = Vec::new();

        for order in self.active.values() {
            if order.side != OrderSide::Buy {
                continue;
            }
            let Some(&price) = prices.get(&order.symbol) else {
                continue;
            };
            if !price.is_finite() {
                continue;
            }

            if price <= order.stop_loss {
                exits.push((order.id.clone(), "stop-loss", price));
            } else if price >= order.take_profit {
                exits.push((order.id.clone(), "take-profit", price));
            }
        }

        for (order_id, reason, price) in exits {
            let Some(order) = self.active.get(&order_id) else {
                continue;
            };
            let request = MarketOrderRequest::new(&order.symbol, OrderSide::Sell, order.quantity);
            match self.broker.submit_market_order(&request).await {
                Ok(ack) => {
                    info!(
                        "{}: {} hit @ {:.2} (entry {:.2}), closed qty {:.4} via {}",
                        order.symbol, reason, price, order.entry_price, order.quantity, ack.order_id
                    );
                    self.active.remove(&order_id);
                }
                Err(e) => {
                    // Keep the order; the next bar re-evaluates the same exit.
                    warn!("{}: {} close failed, will retry on next bar: {:#}", order.symbol, reason, e);
                }
            }
        }
    }

    /// Adopt broker positions the engine does not know about. Called once
    /// after warmup, before streaming; repeat calls with a stable broker
    /// view are no-ops.
    pub async fn sync_positions(&mut self) -> anyhow::Result<usize> {
        let positions = self.broker.get_all_positions().await?;
        let mut adopted = 0;

        for position in positions {
            if self.has_position(&position.symbol) {
                debug!("{}: position already tracked, skipping", position.symbol);
                continue;
            }
            if position.side != PositionSide::Long {
                warn!("{}: short position left unmanaged", position.symbol);
                continue;
            }

            let entry = position.avg_entry_price;
            let order = ActiveOrder {
                id: format!("sync:{}:{}", position.symbol, position.position_id),
                symbol: position.symbol.clone(),
                side: OrderSide::Buy,
                quantity: position.quantity,
                entry_price: entry,
                stop_loss: entry * self.order_params.sl_multiplier,
                take_profit: entry * self.order_params.tp_multiplier,
                opened_at: Utc::now(),
                origin: OrderOrigin::Adopted,
            };

            info!(
                "{}: adopted position qty {:.4} @ {:.2} | SL {:.2} | TP {:.2}",
                order.symbol, order.quantity, order.entry_price, order.stop_loss, order.take_profit
            );
            self.active.insert(order.id.clone(), order);
            adopted += 1;
        }

        Ok(adopted)
    }
}
