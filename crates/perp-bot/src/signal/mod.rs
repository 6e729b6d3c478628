//! Signal fusion pipeline: cache, fuser, and the multi-source provider.
//!
//! Data flows: vendor sources -> pollers -> `SignalCache` -> `fuse()` ->
//! `SignalProvider` broadcast -> subscribers (the trading bot).

pub mod cache;
pub mod fuse;
pub mod provider;

pub use cache::{blockchain_symbol, CacheSnapshot, SignalCache};
pub use fuse::{analyze_macro, fed_bias, fuse, Fusion};
pub use provider::{ProviderConfig, SignalHandler, SignalProvider};
