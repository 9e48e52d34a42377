//! Alpaca REST client
//!
//! Covers the four calls the engine needs: most-actives screener,
//! historical 1-minute bars, open positions, and market order submission.
//! Credentials travel in the `APCA-API-KEY-ID` / `APCA-API-SECRET-KEY`
//! headers on every request.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::*;
use crate::broker::{BrokerClient, MarketOrderRequest, OrderAck, Position, PositionSide};
use crate::error::EngineError;
use crate::types::Bar;

/// Paper trading endpoint (default).
pub const PAPER_TRADING_URL: &str = "https://paper-api.alpaca.markets";
/// Live trading endpoint.
pub const LIVE_TRADING_URL: &str = "https://api.alpaca.markets";
/// Market data endpoint (shared by both tiers).
pub const DATA_URL: &str = "https://data.alpaca.markets";

/// Page size for historical bar requests.
const BARS_PAGE_LIMIT: usize = 10_000;

pub struct AlpacaClient {
    client: Client,
    api_key: String,
    api_secret: String,
    trading_url: String,
    data_url: String,
}

impl AlpacaClient {
    /// Create a client. `paper` selects the paper-trading host; market data
    /// always goes to the shared data host.
    pub fn new(api_key: String, api_secret: String, paper: bool) -> Result<Self, EngineError> {
        if api_key.is_empty() || api_secret.is_empty() {
            return Err(EngineError::Config(
                "alpaca_key / alpaca_secret must be set".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EngineError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            api_secret,
            trading_url: if paper { PAPER_TRADING_URL } else { LIVE_TRADING_URL }.to_string(),
            data_url: DATA_URL.to_string(),
        })
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
    }

    async fn parse<R: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<R> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} failed ({}): {}", endpoint, status, body));
        }
        response
            .json()
            .await
            .with_context(|| format!("failed to parse response from {}", endpoint))
    }
}

#[async_trait]
impl BrokerClient for AlpacaClient {
    async fn most_actives(&self, top: usize) -> Result<Vec<String>> {
        debug!("fetching top {} most-active symbols", top);
        let top_param = top.to_string();
        let response = self
            .get(format!(
                "{}/v1beta1/screener/stocks/most-actives",
                self.data_url
            ))
            .query(&[
                ("by", MostActivesBy::Volume.as_str()),
                ("top", top_param.as_str()),
            ])
            .send()
            .await
            .context("most-actives request failed")?;

        let parsed: MostActivesResponse = Self::parse(response, "most-actives").await?;
        // The screener occasionally pads symbols with whitespace.
        Ok(parsed
            .most_actives
            .into_iter()
            .map(|s| s.symbol.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    async fn historical_bars(
        &self,
        symbols: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>> {
        let joined = symbols.join(",");
        let start_str = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end_str = end.to_rfc3339_opts(SecondsFormat::Secs, true);

        let mut bars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .get(format!("{}/v2/stocks/bars", self.data_url))
                .query(&[
                    ("symbols", joined.as_str()),
                    ("timeframe", "1Min"),
                    ("start", start_str.as_str()),
                    ("end", end_str.as_str()),
                ])
                .query(&[("limit", BARS_PAGE_LIMIT)]);
            if let Some(token) = &page_token {
                request = request.query(&[("page_token", token.as_str())]);
            }

            let response = request.send().await.context("bars request failed")?;
            let page: StockBarsResponse = Self::parse(response, "stocks/bars").await?;

            for (symbol, raw_bars) in page.bars {
                bars.extend(raw_bars.into_iter().map(|raw| Bar {
                    symbol: symbol.clone(),
                    timestamp: raw.timestamp,
                    open: raw.open,
                    high: raw.high,
                    low: raw.low,
                    close: raw.close,
                    volume: raw.volume,
                }));
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        // Pages interleave symbols; hand back a single chronological feed.
        bars.sort_by_key(|b| b.timestamp);
        debug!("fetched {} historical bars for {} symbols", bars.len(), symbols.len());
        Ok(bars)
    }

    async fn get_all_positions(&self) -> Result<Vec<Position>> {
        let response = self
            .get(format!("{}/v2/positions", self.trading_url))
            .send()
            .await
            .context("positions request failed")?;

        let raw: Vec<RawPosition> = Self::parse(response, "positions").await?;
        let mut positions = Vec::with_capacity(raw.len());
        for p in raw {
            let side = match p.side.as_str() {
                "long" => PositionSide::Long,
                "short" => PositionSide::Short,
                other => {
                    warn!("{}: unknown position side '{}', skipping", p.symbol, other);
                    continue;
                }
            };
            positions.push(Position {
                quantity: p
                    .qty
                    .parse()
                    .with_context(|| format!("{}: bad qty '{}'", p.symbol, p.qty))?,
                avg_entry_price: p.avg_entry_price.parse().with_context(|| {
                    format!("{}: bad avg_entry_price '{}'", p.symbol, p.avg_entry_price)
                })?,
                symbol: p.symbol,
                side,
                position_id: p.asset_id,
            });
        }
        Ok(positions)
    }

    async fn submit_market_order(&self, request: &MarketOrderRequest) -> Result<OrderAck> {
        let body = CreateOrderRequest {
            symbol: request.symbol.clone(),
            qty: request.quantity.to_string(),
            side: request.side,
            order_type: OrderType::Market,
            time_in_force: request.time_in_force,
            client_order_id: format!("bnd-{}", &Uuid::new_v4().to_string()[..8]),
        };

        let response = self
            .client
            .post(format!("{}/v2/orders", self.trading_url))
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
            .json(&body)
            .send()
            .await
            .context("order submission failed")?;

        let order: OrderResponse = Self::parse(response, "orders").await?;
        debug!(
            "{}: {} order {} accepted (status {})",
            request.symbol, request.side, order.id, order.status
        );
        Ok(OrderAck { order_id: order.id })
    }
}

impl std::fmt::Debug for AlpacaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlpacaClient")
            .field("trading_url", &self.trading_url)
            .field("data_url", &self.data_url)
            .finish_non_exhaustive()
    }
}
