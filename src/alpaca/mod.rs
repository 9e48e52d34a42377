//! Alpaca Markets integration
//!
//! REST client for screener / history / positions / orders, and the
//! WebSocket minute-bar stream. Everything above this module talks to the
//! capability traits in `broker`, never to Alpaca types directly.

pub mod client;
pub mod models;
pub mod stream;

pub use client::{AlpacaClient, DATA_URL, LIVE_TRADING_URL, PAPER_TRADING_URL};
pub use stream::{AlpacaBarStream, IEX_STREAM_URL};
