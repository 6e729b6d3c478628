//! Trading strategies.
//!
//! A `Strategy` is a synchronous state machine: it receives market state
//! snapshots and emits trade intents. Strategies never perform I/O and never
//! fail on the tick path; only `init` can reject bad configuration.
//!
//! Two sibling strategies share the interface:
//! - `SignalStrategy`: entries from the fused market signal, exits via
//!   take-profit / stop-loss / trailing stop / signal reversal.
//! - `MeanReversionStrategy`: RSI + Bollinger entries, fixed exits plus a
//!   hard hold-time timeout.

pub mod indicators;
pub mod mean_reversion;
pub mod signal_driven;

use std::sync::Arc;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

use perp_common::market::{Order, OrderBook, Position, Ticker};
use perp_common::signal::MarketSignal;
use perp_common::types::Side;

pub use mean_reversion::{MeanReversionConfig, MeanReversionStrategy};
pub use signal_driven::{SignalStrategy, SignalStrategyConfig, StrategyStats};

/// Strategy-level errors. Only lifecycle operations produce these.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("Unknown strategy: {0}")]
    Unknown(String),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParam { name: &'static str, reason: String },
}

/// A trade intent emitted by a strategy. Ephemeral, not persisted.
#[derive(Debug, Clone)]
pub struct Signal {
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Human-readable explanation, logged alongside the order.
    pub reason: String,
}

/// Snapshot of market state handed to a strategy on each tick.
#[derive(Debug, Clone)]
pub struct MarketState {
    pub ticker: Ticker,
    pub order_book: Option<OrderBook>,
    pub position: Option<Position>,
    pub orders: Vec<Order>,
    /// Latest fused signal, possibly stale by up to one broadcast interval.
    pub market_signal: Option<Arc<MarketSignal>>,
}

impl MarketState {
    pub fn new(ticker: Ticker) -> Self {
        Self {
            ticker,
            order_book: None,
            position: None,
            orders: Vec::new(),
            market_signal: None,
        }
    }

    /// Returns true if a non-flat position is held.
    pub fn has_position(&self) -> bool {
        self.position.as_ref().is_some_and(|p| !p.is_flat())
    }
}

/// The capability set every strategy provides.
///
/// Implementations keep their own internal state; callers serialize
/// invocations per symbol.
pub trait Strategy: Send + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Initialize with a loose option table (typed configs with defaults
    /// underneath; the table is only accepted at this boundary).
    fn init(&mut self, params: &toml::value::Table) -> Result<(), StrategyError>;

    /// Evaluate one market tick. Returns zero or more trade intents.
    fn on_tick(&mut self, state: &MarketState) -> Vec<Signal>;

    /// Notification of an order transitioning to open or a terminal status.
    fn on_order_update(&mut self, order: &Order);

    /// Notification of a position size change.
    fn on_position_update(&mut self, position: &Position);

    /// Release buffers. The strategy emits nothing afterwards.
    fn stop(&mut self);
}

/// Create a strategy instance by name.
pub fn create_strategy(name: &str) -> Result<Box<dyn Strategy>, StrategyError> {
    match name {
        "signal" => Ok(Box::new(SignalStrategy::new())),
        "mean_reversion" => Ok(Box::new(MeanReversionStrategy::new())),
        _ => Err(StrategyError::Unknown(name.to_string())),
    }
}

/// Names accepted by `create_strategy`.
pub fn available_strategies() -> &'static [&'static str] {
    &["signal", "mean_reversion"]
}

// Loose-table accessors shared by strategy `init` implementations. TOML
// numbers may arrive as either float or integer.

pub(crate) fn param_f64(params: &toml::value::Table, key: &str) -> Option<f64> {
    params
        .get(key)
        .and_then(|v| v.as_float().or_else(|| v.as_integer().map(|i| i as f64)))
}

pub(crate) fn param_decimal(params: &toml::value::Table, key: &str) -> Option<Decimal> {
    param_f64(params, key).and_then(Decimal::from_f64)
}

pub(crate) fn param_u64(params: &toml::value::Table, key: &str) -> Option<u64> {
    params
        .get(key)
        .and_then(|v| v.as_integer())
        .and_then(|i| u64::try_from(i).ok())
}

pub(crate) fn param_bool(params: &toml::value::Table, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.as_bool())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_known_strategies() {
        for name in available_strategies() {
            assert_eq!(create_strategy(name).unwrap().name(), *name);
        }
    }

    #[test]
    fn test_factory_unknown_strategy() {
        let err = create_strategy("momentum").unwrap_err();
        assert!(matches!(err, StrategyError::Unknown(_)));
        assert!(format!("{}", err).contains("momentum"));
    }

    #[test]
    fn test_param_accessors() {
        let table: toml::value::Table = toml::from_str(
            r#"
            max_position_size = 2000
            min_confidence = 0.5
            trailing_stop = false
            cooldown_secs = 600
            "#,
        )
        .unwrap();

        assert_eq!(param_f64(&table, "max_position_size"), Some(2000.0));
        assert_eq!(param_f64(&table, "min_confidence"), Some(0.5));
        assert_eq!(param_bool(&table, "trailing_stop"), Some(false));
        assert_eq!(param_u64(&table, "cooldown_secs"), Some(600));
        assert_eq!(param_f64(&table, "missing"), None);
    }
}
