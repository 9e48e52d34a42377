//! Alpaca API data models
//!
//! Request and response types for the Alpaca Markets data, screener, and
//! trading endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::broker::{OrderSide, TimeInForce};

// ============================================================================
// Screener
// ============================================================================

/// Ranking criterion for the most-actives screener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MostActivesBy {
    Volume,
    Trades,
}

impl MostActivesBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MostActivesBy::Volume => "volume",
            MostActivesBy::Trades => "trades",
        }
    }
}

/// One row from the most-actives screener.
#[derive(Debug, Deserialize)]
pub struct MostActiveStock {
    pub symbol: String,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub trade_count: f64,
}

/// Response from `/v1beta1/screener/stocks/most-actives`.
#[derive(Debug, Deserialize)]
pub struct MostActivesResponse {
    #[serde(default)]
    pub most_actives: Vec<MostActiveStock>,
}

// ============================================================================
// Historical bars
// ============================================================================

/// A single OHLCV bar as returned by the data API.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBar {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
}

/// Response from `/v2/stocks/bars`, keyed by symbol. `next_page_token`
/// drives pagination.
#[derive(Debug, Deserialize)]
pub struct StockBarsResponse {
    #[serde(default)]
    pub bars: HashMap<String, Vec<RawBar>>,
    pub next_page_token: Option<String>,
}

// ============================================================================
// Positions
// ============================================================================

/// An open position from `/v2/positions`. Numeric fields arrive as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    pub asset_id: String,
    pub symbol: String,
    pub qty: String,
    pub avg_entry_price: String,
    pub side: String,
}

// ============================================================================
// Orders
// ============================================================================

/// Order type. The engine only ever submits market orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
}

/// Request body for `POST /v2/orders`.
#[derive(Debug, Serialize)]
pub struct CreateOrderRequest {
    pub symbol: String,
    /// Decimal quantity as a string, per the trading API contract.
    pub qty: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub client_order_id: String,
}

/// Response from order submission. Only the fields the engine reads.
#[derive(Debug, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bars_response_parses_symbol_map() {
        let json = r#"{
            "bars": {
                "AAPL": [
                    {"t": "2025-06-02T14:30:00Z", "o": 100.0, "h": 101.0, "l": 99.5, "c": 100.5, "v": 1200}
                ]
            },
            "next_page_token": "abc123"
        }"#;
        let parsed: StockBarsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.bars["AAPL"].len(), 1);
        assert_eq!(parsed.bars["AAPL"][0].close, 100.5);
        assert_eq!(parsed.next_page_token.as_deref(), Some("abc123"));
    }

    #[test]
    fn bars_response_tolerates_null_bars() {
        let json = r#"{"next_page_token": null}"#;
        let parsed: StockBarsResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.bars.is_empty());
        assert!(parsed.next_page_token.is_none());
    }

    #[test]
    fn order_request_serializes_typed_enums() {
        let request = CreateOrderRequest {
            symbol: "NVDA".to_string(),
            qty: "2.5".to_string(),
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Gtc,
            client_order_id: "bnd-12345678".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["side"], "buy");
        assert_eq!(json["type"], "market");
        assert_eq!(json["time_in_force"], "gtc");
    }

    #[test]
    fn position_parses_string_numbers() {
        let json = r#"{
            "asset_id": "904837e3-3b76-47ec-b432-046db621571b",
            "symbol": "AAPL",
            "qty": "5",
            "avg_entry_price": "200.00",
            "side": "long"
        }"#;
        let parsed: RawPosition = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.symbol, "AAPL");
        assert_eq!(parsed.qty.parse::<f64>().unwrap(), 5.0);
    }
}
