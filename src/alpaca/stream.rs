//! Alpaca market-data WebSocket stream
//!
//! Speaks the v2 stream protocol: connect, authenticate, subscribe to
//! minute bars, then deliver bars one at a time through the pull interface.
//! Control frames and non-bar messages are handled internally.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::broker::MarketDataStream;
use crate::types::Bar;

/// IEX feed (free tier). SIP requires a paid subscription.
pub const IEX_STREAM_URL: &str = "wss://stream.data.alpaca.markets/v2/iex";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One minute bar as it appears on the wire.
#[derive(Debug, Deserialize)]
struct WsBar {
    #[serde(rename = "S")]
    symbol: String,
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

impl From<WsBar> for Bar {
    fn from(raw: WsBar) -> Self {
        Bar {
            symbol: raw.symbol,
            timestamp: raw.timestamp,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
        }
    }
}

/// Every stream message is an array of tagged events.
#[derive(Debug, Deserialize)]
#[serde(tag = "T")]
enum StreamEvent {
    #[serde(rename = "success")]
    Success { msg: String },
    #[serde(rename = "error")]
    Error { code: i64, msg: String },
    #[serde(rename = "subscription")]
    Subscription {
        #[serde(default)]
        bars: Vec<String>,
    },
    #[serde(rename = "b")]
    MinuteBar(WsBar),
    /// Trades, quotes, corrections - subscribed elsewhere, not by us.
    #[serde(other)]
    Other,
}

pub struct AlpacaBarStream {
    ws: WsStream,
    pending: VecDeque<Bar>,
}

impl AlpacaBarStream {
    /// Connect to the IEX feed and authenticate.
    pub async fn connect(api_key: &str, api_secret: &str) -> Result<Self> {
        Self::connect_to(IEX_STREAM_URL, api_key, api_secret).await
    }

    pub async fn connect_to(url: &str, api_key: &str, api_secret: &str) -> Result<Self> {
        info!("connecting to market data stream {}", url);
        let (ws, _) = connect_async(url)
            .await
            .context("websocket connection failed")?;
        let mut stream = Self {
            ws,
            pending: VecDeque::new(),
        };

        let auth = json!({
            "action": "auth",
            "key": api_key,
            "secret": api_secret,
        });
        stream
            .ws
            .send(Message::Text(auth.to_string()))
            .await
            .context("failed to send auth message")?;

        stream.wait_for_success("authenticated").await?;
        info!("market data stream authenticated");
        Ok(stream)
    }

    /// Read events until a success message with `expected` arrives.
    async fn wait_for_success(&mut self, expected: &str) -> Result<()> {
        loop {
            for event in self.read_events().await?.ok_or_else(|| {
                anyhow!("stream closed while waiting for '{}'", expected)
            })? {
                match event {
                    StreamEvent::Success { msg } if msg == expected => return Ok(()),
                    StreamEvent::Success { msg } => debug!("stream: {}", msg),
                    StreamEvent::Error { code, msg } => {
                        bail!("stream error {} while waiting for '{}': {}", code, expected, msg)
                    }
                    StreamEvent::MinuteBar(raw) => self.pending.push_back(raw.into()),
                    _ => {}
                }
            }
        }
    }

    /// Read one frame and parse its event array. `Ok(None)` when the
    /// connection is gone.
    async fn read_events(&mut self) -> Result<Option<Vec<StreamEvent>>> {
        loop {
            let Some(message) = self.ws.next().await else {
                return Ok(None);
            };
            match message.context("websocket read failed")? {
                Message::Text(text) => {
                    let events: Vec<StreamEvent> = serde_json::from_str(&text)
                        .with_context(|| format!("unparseable stream message: {}", text))?;
                    return Ok(Some(events));
                }
                Message::Ping(payload) => {
                    self.ws
                        .send(Message::Pong(payload))
                        .await
                        .context("failed to answer ping")?;
                }
                Message::Close(frame) => {
                    debug!("stream closed by server: {:?}", frame);
                    return Ok(None);
                }
                other => debug!("ignoring non-text frame: {:?}", other),
            }
        }
    }
}

#[async_trait]
impl MarketDataStream for AlpacaBarStream {
    async fn subscribe(&mut self, symbols: &[String]) -> Result<()> {
        let request = json!({
            "action": "subscribe",
            "bars": symbols,
        });
        self.ws
            .send(Message::Text(request.to_string()))
            .await
            .context("failed to send subscribe message")?;

        // Confirmation echoes the full bar subscription list.
        loop {
            for event in self
                .read_events()
                .await?
                .ok_or_else(|| anyhow!("stream closed during subscribe"))?
            {
                match event {
                    StreamEvent::Subscription { bars } => {
                        info!("subscribed to bars for {:?}", bars);
                        return Ok(());
                    }
                    StreamEvent::Error { code, msg } => {
                        bail!("subscribe rejected ({}): {}", code, msg)
                    }
                    StreamEvent::MinuteBar(raw) => self.pending.push_back(raw.into()),
                    _ => {}
                }
            }
        }
    }

    async fn next_bar(&mut self) -> Result<Option<Bar>> {
        loop {
            if let Some(bar) = self.pending.pop_front() {
                return Ok(Some(bar));
            }
            let Some(events) = self.read_events().await? else {
                return Ok(None);
            };
            for event in events {
                match event {
                    StreamEvent::MinuteBar(raw) => self.pending.push_back(raw.into()),
                    StreamEvent::Error { code, msg } => {
                        warn!("stream error {}: {}", code, msg);
                    }
                    StreamEvent::Success { msg } => debug!("stream: {}", msg),
                    StreamEvent::Subscription { bars } => {
                        debug!("subscription update: {:?}", bars)
                    }
                    StreamEvent::Other => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minute_bar_event() {
        let json = r#"[{"T":"b","S":"AAPL","o":100.0,"h":101.2,"l":99.8,"c":100.9,"v":4521,"t":"2025-06-02T14:30:00Z","n":320,"vw":100.4}]"#;
        let events: Vec<StreamEvent> = serde_json::from_str(json).unwrap();
        assert_eq!(events.len(), 1);
        let StreamEvent::MinuteBar(bar) = &events[0] else {
            panic!("expected a bar event");
        };
        assert_eq!(bar.symbol, "AAPL");
        assert_eq!(bar.close, 100.9);
        assert_eq!(bar.volume, 4521.0);
    }

    #[test]
    fn parses_control_events() {
        let json = r#"[{"T":"success","msg":"authenticated"},{"T":"subscription","trades":[],"quotes":[],"bars":["AAPL","MSFT"]}]"#;
        let events: Vec<StreamEvent> = serde_json::from_str(json).unwrap();
        assert!(matches!(&events[0], StreamEvent::Success { msg } if msg == "authenticated"));
        assert!(matches!(&events[1], StreamEvent::Subscription { bars } if bars.len() == 2));
    }

    #[test]
    fn parses_error_event() {
        let json = r#"[{"T":"error","code":402,"msg":"auth failed"}]"#;
        let events: Vec<StreamEvent> = serde_json::from_str(json).unwrap();
        assert!(matches!(&events[0], StreamEvent::Error { code: 402, .. }));
    }

    #[test]
    fn unknown_event_types_ignored() {
        let json = r#"[{"T":"q","S":"AAPL","bp":100.0,"ap":100.1}]"#;
        let events: Vec<StreamEvent> = serde_json::from_str(json).unwrap();
        assert!(matches!(&events[0], StreamEvent::Other));
    }
}
