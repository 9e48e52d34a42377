use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use bandbot::alpaca::{AlpacaBarStream, AlpacaClient};
use bandbot::broker::BrokerClient;
use bandbot::engine::{TradingEngine, DEFAULT_HISTORY_SIZE};
use bandbot::strategy::{RsiBbandsConfig, RsiBbandsStrategy};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Alpaca API key
    #[arg(long, env = "alpaca_key", hide_env_values = true)]
    alpaca_key: String,

    /// Alpaca API secret
    #[arg(long, env = "alpaca_secret", hide_env_values = true)]
    alpaca_secret: String,

    /// Symbols to trade (comma-separated). Defaults to the most-actives
    /// screener when omitted.
    #[arg(short, long)]
    symbols: Option<String>,

    /// How many most-active symbols to pick when --symbols is not given
    #[arg(short, long, default_value = "5")]
    top: usize,

    /// Trading capital in dollars
    #[arg(short, long, default_value = "10000")]
    capital: f64,

    /// Candle timeframe in minutes
    #[arg(long, default_value = "5")]
    timeframe: usize,

    /// Completed candles retained per symbol
    #[arg(long, default_value_t = DEFAULT_HISTORY_SIZE)]
    history_size: usize,

    /// Use the live trading endpoint instead of paper
    #[arg(long)]
    live: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bandbot=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    info!("Starting bandbot trading engine");
    info!("Capital: ${:.2}", args.capital);
    info!("Timeframe: {}m", args.timeframe);
    info!("Endpoint: {}", if args.live { "live" } else { "paper" });

    let client = Arc::new(AlpacaClient::new(
        args.alpaca_key.clone(),
        args.alpaca_secret.clone(),
        !args.live,
    )?);

    let symbols: Vec<String> = match &args.symbols {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect(),
        None => client.most_actives(args.top).await?,
    };
    info!("Trading symbols: {:?}", symbols);

    let strategy = RsiBbandsStrategy::new(RsiBbandsConfig::default());
    let mut engine = TradingEngine::new(
        client,
        Box::new(strategy),
        symbols,
        args.capital,
        args.timeframe,
        args.history_size,
    )?;

    engine.warmup().await?;
    engine.sync_positions().await?;

    let mut stream = AlpacaBarStream::connect(&args.alpaca_key, &args.alpaca_secret).await?;

    tokio::select! {
        result = engine.run(&mut stream) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
        }
    }

    Ok(())
}
