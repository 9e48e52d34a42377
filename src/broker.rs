//! Broker and market-data capabilities consumed by the engine
//!
//! The engine never talks to a venue SDK directly; it is written against
//! these traits. The `alpaca` module provides the production implementation,
//! tests provide mocks.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Bar;

/// Order side for entries and closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Time in force. The engine only submits GTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Gtc,
    Day,
}

/// Side of an open broker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

/// An open position as reported by the broker.
#[derive(Debug, Clone)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub side: PositionSide,
    /// Broker-assigned stable id for the position (asset id on Alpaca).
    pub position_id: String,
}

/// A market order submission.
#[derive(Debug, Clone)]
pub struct MarketOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub time_in_force: TimeInForce,
}

impl MarketOrderRequest {
    pub fn new(symbol: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            time_in_force: TimeInForce::Gtc,
        }
    }
}

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone)]
pub struct OrderAck {
    pub order_id: String,
}

/// REST-side broker capability: history, screener, positions, orders.
///
/// Errors are transport-level (`anyhow`); callers decide whether a failure
/// is fatal (construction), skippable (warmup), or retried next bar
/// (monitoring).
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Top `top` symbols by rolling volume.
    async fn most_actives(&self, top: usize) -> Result<Vec<String>>;

    /// 1-minute bars for `symbols` in `[start, end]`, timestamps in UTC.
    /// Ordering across symbols is unspecified; within a symbol it is
    /// chronological.
    async fn historical_bars(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>>;

    /// All currently open positions on the account.
    async fn get_all_positions(&self) -> Result<Vec<Position>>;

    /// Submit a market order. Returns the broker-assigned order id.
    async fn submit_market_order(&self, request: &MarketOrderRequest) -> Result<OrderAck>;
}

/// Live market-data capability delivering 1-minute bars.
///
/// Pull-based: the engine drives the loop with `next_bar`, which serializes
/// bar handling by construction. `Ok(None)` means the stream ended cleanly.
#[async_trait]
pub trait MarketDataStream: Send {
    async fn subscribe(&mut self, symbols: &[String]) -> Result<()>;

    async fn next_bar(&mut self) -> Result<Option<Bar>>;
}
