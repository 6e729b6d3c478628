//! perp-bot: signal-fusion perpetual futures trading bot.
//!
//! Usage:
//!   perp-bot [OPTIONS]
//!
//! Options:
//!   -m, --mode <MODE>       Trading mode: dry-run, live
//!   -c, --config <FILE>     Config file path (default: config/bot.toml)
//!   --symbols <SYMBOLS>     Comma-separated symbols (overrides config)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use chrono::Utc;
use perp_bot::bot::TradingBot;
use perp_bot::config::{BotConfig, TradingMode};
use perp_bot::exchange::SimulatedExchange;
use perp_bot::risk::RiskChecker;
use perp_bot::signal::SignalProvider;
use perp_bot::strategy::create_strategy;
use perp_common::market::Ticker;

/// CLI arguments for perp-bot.
#[derive(Parser, Debug)]
#[command(name = "perp-bot")]
#[command(about = "Signal-fusion perpetual futures trading bot")]
#[command(version)]
struct Args {
    /// Trading mode: dry-run, live
    #[arg(short, long)]
    mode: Option<String>,

    /// Config file path
    #[arg(short, long, default_value = "config/bot.toml")]
    config: PathBuf,

    /// Comma-separated symbols to trade (e.g. "BTC,ETH")
    #[arg(long, value_delimiter = ',')]
    symbols: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let mut config = if args.config.exists() {
        BotConfig::from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else {
        eprintln!(
            "Config file not found at {:?}, using defaults",
            args.config
        );
        BotConfig::default()
    };
    config.apply_env_overrides();
    config.apply_cli_overrides(args.mode, args.symbols);

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    config.validate().context("Configuration validation failed")?;

    info!("Starting perp-bot");
    info!("Mode: {}", config.mode);
    info!("Symbols: {:?}", config.symbols);
    info!("Strategy: {}", config.strategy.name);
    if config.mode == TradingMode::DryRun {
        info!("Running in DRY-RUN mode, no real orders will be placed");
    } else {
        warn!("Running in LIVE mode, real orders will be placed!");
    }

    // Vendor gateways are wired in deployment builds; the core ships only the
    // paper venue.
    if config.mode == TradingMode::Live {
        bail!("live mode requires an exchange adapter; this build ships only the paper venue");
    }
    let exchange = Arc::new(SimulatedExchange::new());

    // Signal provider. Sources without credentials stay disabled; the fuser
    // degrades to whatever is available.
    let provider = Arc::new(SignalProvider::new(config.provider_config()));
    for (name, key) in [
        ("derivatives", &config.sources.derivatives_api_key),
        ("whale", &config.sources.whale_api_key),
        ("sentiment", &config.sources.sentiment_api_key),
        ("macro", &config.sources.macro_api_key),
    ] {
        if key.is_empty() {
            info!("{} source not configured, skipping", name);
        } else {
            // Adapter construction happens in deployment builds.
            warn!("{} source configured but no adapter is linked in this build", name);
        }
    }

    let strategy = create_strategy(&config.strategy.name)
        .with_context(|| format!("Unknown strategy {:?}", config.strategy.name))?;
    let risk = Arc::new(RiskChecker::new(config.risk_config()));

    let bot = Arc::new(
        TradingBot::new(
            exchange.clone(),
            strategy,
            risk.clone(),
            config.primary_symbol(),
            config.mode == TradingMode::DryRun,
        )
        .with_strategy_params(config.strategy.params.clone()),
    );

    provider.subscribe(bot.signal_handler());
    provider.start().await;
    bot.start().await.context("Failed to start bot")?;

    // Paper sessions synthesize their own ticks so the pipeline runs without
    // a live feed.
    let feed = tokio::spawn(synthetic_feed(
        exchange.clone(),
        config.primary_symbol().to_string(),
    ));

    wait_for_shutdown().await?;
    info!("Shutting down...");

    feed.abort();
    if let Err(e) = bot.stop().await {
        warn!("Bot stop error: {}", e);
    }
    provider.stop().await;

    info!(risk_status = ?risk.status(), "Bot stopped");
    Ok(())
}

/// Deterministic random-walk ticker for paper sessions.
async fn synthetic_feed(exchange: Arc<SimulatedExchange>, symbol: String) {
    let mut price = dec!(50_000);
    let mut lcg_state: u64 = 0x2545F4914F6CDD1D;
    let mut interval = tokio::time::interval(Duration::from_secs(1));

    loop {
        interval.tick().await;

        // LCG step in [-50, +50] bps.
        lcg_state = lcg_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let bps = ((lcg_state >> 33) % 101) as i64 - 50;
        price += price * Decimal::new(bps, 4);
        if price <= Decimal::ZERO {
            price = dec!(50_000);
        }

        let spread = price * dec!(0.0001);
        exchange.push_ticker(Ticker {
            symbol: symbol.clone(),
            bid: price - spread,
            bid_size: Decimal::ONE,
            ask: price + spread,
            ask_size: Decimal::ONE,
            last: price,
            volume_24h: Decimal::ZERO,
            timestamp: Utc::now(),
        });
    }
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
