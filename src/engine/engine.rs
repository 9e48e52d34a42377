//! Trading engine orchestration
//!
//! Two-phase execution: an async setup phase (historical warmup, position
//! reconciliation) followed by a pull loop over the live bar stream. Bar
//! handling is strictly serialized; inside one bar, exit monitoring always
//! runs before aggregation and entry evaluation, so an entry decided at a
//! candle close can never be stopped out by the bar that produced it.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use chrono_tz::America::New_York;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::aggregator::BarAggregator;
use super::history::CandleHistory;
use super::order_manager::{OrderManager, PlaceOutcome};
use crate::broker::{BrokerClient, MarketDataStream};
use crate::error::EngineError;
use crate::strategy::Strategy;
use crate::types::{Bar, SignalKind};

/// Minutes the warmup window is shifted back from now. The free data tier
/// rejects queries touching the most recent 15 minutes.
const RECENT_DATA_EMBARGO_MINUTES: i64 = 16;

pub struct TradingEngine {
    broker: Arc<dyn BrokerClient>,
    order_manager: OrderManager,
    strategy: Box<dyn Strategy>,
    aggregators: HashMap<String, BarAggregator>,
    symbols: Vec<String>,
    capital: f64,
    timeframe_minutes: usize,
}

impl TradingEngine {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        strategy: Box<dyn Strategy>,
        symbols: Vec<String>,
        capital: f64,
        timeframe_minutes: usize,
        history_size: usize,
    ) -> Result<Self, EngineError> {
        if symbols.is_empty() {
            return Err(EngineError::Config("no symbols to trade".to_string()));
        }
        if !(capital > 0.0) || !capital.is_finite() {
            return Err(EngineError::Config(format!(
                "capital must be positive, got {}",
                capital
            )));
        }

        let order_manager = OrderManager::new(broker.clone(), strategy.order_params())?;
        let aggregators = symbols
            .iter()
            .map(|s| {
                (
                    s.clone(),
                    BarAggregator::new(s.clone(), timeframe_minutes, history_size),
                )
            })
            .collect();

        Ok(Self {
            broker,
            order_manager,
            strategy,
            aggregators,
            symbols,
            capital,
            timeframe_minutes: timeframe_minutes.max(1),
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn order_manager(&self) -> &OrderManager {
        &self.order_manager
    }

    pub fn history(&self, symbol: &str) -> Option<&CandleHistory> {
        self.aggregators.get(symbol).map(|a| a.history())
    }

    /// Pre-seed candle history from the broker's historical bars.
    ///
    /// Best-effort: a transport failure leaves the engine with whatever
    /// accumulated; the strategy declines signals until enough live candles
    /// exist.
    pub async fn warmup(&mut self) -> Result<()> {
        let lookback_minutes =
            (self.strategy.warmup_period() as f64 * self.timeframe_minutes as f64 * 1.5).ceil()
                as i64;

        let now = Utc::now().with_timezone(&New_York);
        let end = now - Duration::minutes(RECENT_DATA_EMBARGO_MINUTES);
        let start = end - Duration::minutes(lookback_minutes);
        info!(
            "warmup: fetching {} minutes of 1m bars for {} symbols (until {})",
            lookback_minutes,
            self.symbols.len(),
            end.format("%H:%M %Z")
        );

        let bars = match self
            .broker
            .historical_bars(
                &self.symbols,
                start.with_timezone(&Utc),
                end.with_timezone(&Utc),
            )
            .await
        {
            Ok(bars) => bars,
            Err(e) => {
                warn!("warmup fetch failed, starting with empty history: {:#}", e);
                return Ok(());
            }
        };

        let mut by_symbol: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
        for bar in bars {
            by_symbol.entry(bar.symbol.clone()).or_default().push(bar);
        }

        let warmup_period = self.strategy.warmup_period();
        for (symbol, mut bars) in by_symbol {
            let Some(aggregator) = self.aggregators.get_mut(&symbol) else {
                debug!("{}: warmup returned unsubscribed symbol, ignoring", symbol);
                continue;
            };
            bars.sort_by_key(|b| b.timestamp);
            for bar in &bars {
                if let Err(e) = bar.validate() {
                    debug!("warmup: {}", e);
                    continue;
                }
                aggregator.add(bar);
            }

            let candles = aggregator.history().len();
            if candles < warmup_period {
                warn!(
                    "{}: warmup produced {} candles (< {}), signals delayed until live data fills in",
                    symbol, candles, warmup_period
                );
            } else {
                info!("{}: warmup seeded {} candles", symbol, candles);
            }
        }
        Ok(())
    }

    /// Adopt pre-existing broker positions. Must run after warmup, before
    /// the stream starts.
    pub async fn sync_positions(&mut self) -> Result<usize> {
        let adopted = self
            .order_manager
            .sync_positions()
            .await
            .context("position reconciliation failed")?;
        info!(
            "reconciliation: adopted {} position(s), {} active order(s) total",
            adopted,
            self.order_manager.active_count()
        );
        Ok(adopted)
    }

    /// Subscribe and consume the stream until it ends. Per-bar failures are
    /// logged and swallowed; only the stream itself can end this loop.
    pub async fn run<S: MarketDataStream>(&mut self, stream: &mut S) -> Result<()> {
        stream
            .subscribe(&self.symbols)
            .await
            .context("bar subscription failed")?;
        info!("streaming 1m bars for {:?}", self.symbols);

        while let Some(bar) = stream.next_bar().await? {
            self.on_bar(bar).await;
        }

        warn!("bar stream ended");
        Ok(())
    }

    /// Handle one 1-minute bar. Never propagates an error: the stream loop
    /// must survive anything a single bar can throw at it.
    pub async fn on_bar(&mut self, bar: Bar) {
        if let Err(e) = bar.validate() {
            warn!("dropping bar @ {}: {}", bar.timestamp, e);
            return;
        }

        // Exit checks come first, against every tick.
        let prices = HashMap::from([(bar.symbol.clone(), bar.close)]);
        self.order_manager.monitor(&prices).await;

        let Some(aggregator) = self.aggregators.get_mut(&bar.symbol) else {
            debug!("{}: bar for unsubscribed symbol, ignoring", bar.symbol);
            return;
        };
        if !aggregator.add(&bar) {
            return;
        }

        let histories: HashMap<&str, &CandleHistory> = self
            .aggregators
            .iter()
            .map(|(symbol, agg)| (symbol.as_str(), agg.history()))
            .collect();
        let signals = self.strategy.analyze(&histories);
        drop(histories);

        for signal in signals {
            if signal.kind != SignalKind::Buy {
                debug!("{}: ignoring {} signal", signal.symbol, signal.kind);
                continue;
            }
            match self.order_manager.place(&signal, self.capital).await {
                PlaceOutcome::Accepted(order) => {
                    info!("{}: signal filled as order {}", signal.symbol, order.id);
                }
                PlaceOutcome::Rejected(reason) => {
                    info!("{}: signal rejected: {:?}", signal.symbol, reason);
                }
                PlaceOutcome::Failed(reason) => {
                    warn!("{}: signal placement failed: {}", signal.symbol, reason);
                }
            }
        }
    }
}
