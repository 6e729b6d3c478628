//! Shared domain records for the perp trading bot.
//!
//! CRITICAL: All prices, quantities, and PnL use `rust_decimal::Decimal`.
//! NEVER use f64 for financial math. Dimensionless scores (signal strength,
//! confidence, probabilities, funding rates) are plain `f64`.
//!
//! This crate contains:
//! - Core enums (`Side`, `OrderType`, `OrderStatus`, `SignalBias`)
//! - Trading records (`Ticker`, `OrderBook`, `Order`, `Position`)
//! - Vendor-neutral market data records (`FundingRate`, `WhaleAlert`, ...)
//! - Fused signal records (`MarketSignal`, `MacroSignal`)

pub mod market;
pub mod records;
pub mod signal;
pub mod types;

pub use market::{Candle, Order, OrderBook, OrderBookLevel, Position, Ticker};
pub use records::{
    EconomicEvent, EconomicIndicator, FedWatchData, FundingRate, FOMCMeeting, Liquidation,
    LongShortRatio, OpenInterest, SocialSentiment, WhaleAlert, WhaleFlow,
};
pub use signal::{MacroSignal, MarketSignal};
pub use types::{OrderStatus, OrderType, PositionSide, Side, SignalBias};
