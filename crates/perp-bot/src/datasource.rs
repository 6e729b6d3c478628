//! External data source contracts.
//!
//! Each vendor adapter implements one of these traits and is handed to the
//! signal provider. The traits are pull-shaped: several vendors only expose
//! polling APIs, so the provider layers its own polling-to-push adapters with
//! per-source cadence and de-duplication on top (see `signal::provider`).
//!
//! Operations a vendor cannot serve return `SourceError::Unsupported` rather
//! than silently succeeding.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use perp_common::records::{
    EconomicEvent, EconomicIndicator, FedWatchData, FundingRate, Liquidation, LongShortRatio,
    OpenInterest, SocialSentiment, WhaleAlert,
};

/// Errors surfaced by data source adapters.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Operation not supported: {0}")]
    Unsupported(&'static str),
}

impl SourceError {
    /// Returns true for permanent failures (401/403-class). The provider
    /// treats such a source as absent instead of retrying it.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SourceError::Auth(_) | SourceError::Unsupported(_))
    }
}

/// Derivatives metrics source: funding, open interest, positioning,
/// liquidations.
#[async_trait]
pub trait DerivativesSource: Send + Sync {
    async fn connect(&self) -> Result<(), SourceError>;
    async fn disconnect(&self) -> Result<(), SourceError>;

    async fn funding_rate(&self, symbol: &str) -> Result<FundingRate, SourceError>;
    async fn open_interest(&self, symbol: &str) -> Result<OpenInterest, SourceError>;
    async fn long_short_ratio(&self, symbol: &str) -> Result<LongShortRatio, SourceError>;

    /// Recent liquidations for a symbol, newest last. The provider
    /// de-duplicates by timestamp across polls.
    async fn liquidations(&self, symbol: &str) -> Result<Vec<Liquidation>, SourceError>;
}

/// Large on-chain transfer source.
#[async_trait]
pub trait WhaleSource: Send + Sync {
    async fn connect(&self) -> Result<(), SourceError>;
    async fn disconnect(&self) -> Result<(), SourceError>;

    /// Recent transfers at or above `min_value_usd`. The provider
    /// de-duplicates by alert id across polls.
    async fn transactions(&self, min_value_usd: Decimal) -> Result<Vec<WhaleAlert>, SourceError>;
}

/// Social sentiment source.
#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn connect(&self) -> Result<(), SourceError>;
    async fn disconnect(&self) -> Result<(), SourceError>;

    async fn sentiment(&self, symbol: &str) -> Result<SocialSentiment, SourceError>;
}

/// Macro data source: FedWatch probabilities and economic indicators.
#[async_trait]
pub trait MacroSource: Send + Sync {
    async fn connect(&self) -> Result<(), SourceError>;
    async fn disconnect(&self) -> Result<(), SourceError>;

    async fn fed_watch(&self) -> Result<FedWatchData, SourceError>;
    async fn indicators(&self) -> Result<Vec<EconomicIndicator>, SourceError>;

    /// Scheduled releases. Optional; vendors without a calendar endpoint keep
    /// the default.
    async fn upcoming_events(&self) -> Result<Vec<EconomicEvent>, SourceError> {
        Err(SourceError::Unsupported("upcoming_events"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_errors() {
        assert!(SourceError::Auth("401".to_string()).is_permanent());
        assert!(SourceError::Unsupported("x").is_permanent());
        assert!(!SourceError::RateLimited.is_permanent());
        assert!(!SourceError::Connection("down".to_string()).is_permanent());
    }

    #[test]
    fn test_error_display() {
        let err = SourceError::Unsupported("upcoming_events");
        assert!(format!("{}", err).contains("upcoming_events"));
    }
}
