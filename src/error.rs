//! Typed error kinds for the trading engine
//!
//! Transport failures from the broker layer stay `anyhow::Error` and are
//! handled at the call site (skip, log, or retry next bar). This enum covers
//! the failures that are the engine's own fault.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or unusable configuration. Fatal at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// Order parameters that cannot produce a valid bracket.
    #[error("invalid order parameters: {0}")]
    InvalidParams(String),

    /// A bar that failed validation (non-finite price, bad volume, ...).
    /// The bar is dropped and the stream continues.
    #[error("malformed bar: {0}")]
    MalformedBar(String),
}
