//! Signal-fusion perpetual futures trading bot.
//!
//! Consumes heterogeneous market data streams (derivatives metrics, on-chain
//! whale flows, social sentiment, macro indicators), fuses them into a
//! bounded bias/strength/confidence signal, and drives a position lifecycle
//! state machine that emits risk-gated orders to a derivatives exchange.
//!
//! ## Pipeline
//!
//! ```text
//! sources -> signal cache -> fuser -> provider broadcast
//!                                          |
//! exchange ticks ----------------> bot dispatcher -> strategy -> risk -> orders
//! exchange order updates ---------^                                       |
//!          ^--------------------------------------------------------------+
//! ```
//!
//! ## Modules
//!
//! - `config`: TOML configuration with env/CLI overrides
//! - `signal`: cache, fuser, and multi-source provider
//! - `strategy`: strategy trait plus the signal-driven and mean-reversion
//!   implementations
//! - `risk`: the pre-trade risk gate
//! - `exchange`: gateway trait and the simulated paper venue
//! - `bot`: the event dispatcher tying it all together

pub mod bot;
pub mod config;
pub mod datasource;
pub mod exchange;
pub mod risk;
pub mod signal;
pub mod state;
pub mod strategy;

pub use bot::{BotError, TradingBot};
pub use config::{BotConfig, TradingMode};
pub use datasource::{
    DerivativesSource, MacroSource, SentimentSource, SourceError, WhaleSource,
};
pub use exchange::{ExchangeError, ExchangeGateway, SimulatedExchange};
pub use risk::{RiskChecker, RiskConfig, RiskDecision, RiskStatus};
pub use signal::{ProviderConfig, SignalCache, SignalProvider};
pub use state::{BotMetrics, MetricsSnapshot};
pub use strategy::{
    create_strategy, MarketState, MeanReversionStrategy, Signal, SignalStrategy, Strategy,
    StrategyError,
};
