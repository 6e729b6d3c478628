//! Vendor-neutral market data records.
//!
//! These are the typed payloads produced by the external data sources
//! (derivatives metrics, on-chain whale transfers, social sentiment, macro
//! calendars). Wire parsing for each vendor lives outside the core; the
//! engine only sees these records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::PositionSide;

/// Owners treated as exchange-controlled addresses when categorizing whale
/// transfers. Matching is case-insensitive.
const EXCHANGE_OWNERS: &[&str] = &[
    "binance", "coinbase", "kraken", "bitfinex", "bybit", "okx", "huobi", "kucoin", "gate.io",
];

/// Perpetual funding rate snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingRate {
    pub symbol: String,
    /// Current rate. Positive means longs pay shorts.
    pub rate: f64,
    pub predicted_rate: f64,
    pub next_funding_time: DateTime<Utc>,
    pub exchange: String,
    pub timestamp: DateTime<Utc>,
}

/// Open interest snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenInterest {
    pub symbol: String,
    /// Total outstanding contract value in USD.
    pub open_interest: Decimal,
    /// 24h change, percent.
    pub change_24h: f64,
    pub exchange: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate long/short positioning ratio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LongShortRatio {
    pub symbol: String,
    pub long_ratio: f64,
    pub short_ratio: f64,
    /// long_ratio / short_ratio.
    pub ratio: f64,
    pub exchange: String,
    pub timestamp: DateTime<Utc>,
}

/// A forced position closure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidation {
    pub symbol: String,
    pub side: PositionSide,
    pub price: Decimal,
    pub quantity: Decimal,
    /// USD value of the liquidated position.
    pub value_usd: Decimal,
    pub exchange: String,
    pub timestamp: DateTime<Utc>,
}

/// Categorization of a whale transfer by its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhaleFlow {
    /// Deposit to an exchange (historically bearish).
    ExchangeInflow,
    /// Withdrawal from an exchange (historically bullish).
    ExchangeOutflow,
    /// Wallet-to-wallet move, neither side exchange-owned.
    WalletTransfer,
    /// Both sides exchange-owned, or otherwise unclassifiable.
    Unknown,
}

/// A large on-chain transfer above a configured USD threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhaleAlert {
    pub id: String,
    pub blockchain: String,
    pub symbol: String,
    pub amount: Decimal,
    pub amount_usd: Decimal,
    pub from_address: String,
    pub to_address: String,
    /// Named owner of the source address, e.g. "binance" or "unknown".
    pub from_owner: String,
    pub to_owner: String,
    pub tx_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl WhaleAlert {
    /// Categorize this transfer by whether its endpoints are exchange-owned.
    ///
    /// Every alert maps to exactly one `WhaleFlow` variant.
    pub fn flow(&self) -> WhaleFlow {
        let from_exchange = Self::is_exchange_owner(&self.from_owner);
        let to_exchange = Self::is_exchange_owner(&self.to_owner);
        match (from_exchange, to_exchange) {
            (false, true) => WhaleFlow::ExchangeInflow,
            (true, false) => WhaleFlow::ExchangeOutflow,
            (false, false) => WhaleFlow::WalletTransfer,
            (true, true) => WhaleFlow::Unknown,
        }
    }

    fn is_exchange_owner(owner: &str) -> bool {
        let owner = owner.to_lowercase();
        EXCHANGE_OWNERS.iter().any(|e| *e == owner)
    }

    /// Sum exchange inflow and outflow USD values over a set of alerts.
    ///
    /// Returns `(inflow, outflow)`. Wallet transfers and unknown flows do not
    /// contribute to either side.
    pub fn net_flows(alerts: &[WhaleAlert]) -> (Decimal, Decimal) {
        let mut inflow = Decimal::ZERO;
        let mut outflow = Decimal::ZERO;
        for alert in alerts {
            match alert.flow() {
                WhaleFlow::ExchangeInflow => inflow += alert.amount_usd,
                WhaleFlow::ExchangeOutflow => outflow += alert.amount_usd,
                WhaleFlow::WalletTransfer | WhaleFlow::Unknown => {}
            }
        }
        (inflow, outflow)
    }
}

/// Aggregate social sentiment for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialSentiment {
    pub symbol: String,
    /// Originating vendor, e.g. "lunarcrush".
    pub source: String,
    /// 0..=1 scale; 0.5 is neutral.
    pub sentiment: f64,
    /// -1..=1 scale; negative is bearish.
    pub sentiment_score: f64,
    pub positive_ratio: f64,
    pub negative_ratio: f64,
    pub neutral_ratio: f64,
    /// Number of posts in the window.
    pub social_volume: i64,
    pub interactions: i64,
    pub contributors: i64,
    /// Vendor-specific composite, passed through opaquely.
    #[serde(default)]
    pub galaxy_score: f64,
    /// Vendor-specific rank, passed through opaquely.
    #[serde(default)]
    pub alt_rank: i32,
    pub timestamp: DateTime<Utc>,
}

/// An FOMC meeting with market-implied rate probabilities.
///
/// `cut_prob + hold_prob + hike_prob` sums to 1 within float tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FOMCMeeting {
    pub meeting_date: DateTime<Utc>,
    pub current_rate: f64,
    pub most_likely_rate: f64,
    pub most_likely_prob: f64,
    /// Probability of any change.
    pub rate_change_prob: f64,
    pub hike_prob: f64,
    pub cut_prob: f64,
    pub hold_prob: f64,
    pub timestamp: DateTime<Utc>,
}

impl FOMCMeeting {
    /// Returns true if the cut/hold/hike probabilities sum to 1 within `tol`.
    pub fn probabilities_normalized(&self, tol: f64) -> bool {
        ((self.cut_prob + self.hold_prob + self.hike_prob) - 1.0).abs() <= tol
    }
}

/// Aggregated FedWatch view: current rate plus upcoming meetings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FedWatchData {
    pub current_rate: f64,
    pub next_meeting: Option<FOMCMeeting>,
    pub upcoming_meetings: Vec<FOMCMeeting>,
    pub timestamp: DateTime<Utc>,
}

/// An economic indicator reading (CPI, GDP, unemployment, PCE, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicIndicator {
    pub country: String,
    /// e.g. "CPI", "GDP", "Unemployment".
    pub category: String,
    pub name: String,
    pub value: f64,
    pub previous: f64,
    pub forecast: f64,
    pub unit: String,
    /// e.g. "Monthly", "Quarterly".
    pub frequency: String,
    pub last_update: DateTime<Utc>,
    pub next_release: DateTime<Utc>,
    /// "high", "medium", "low".
    pub importance: String,
    pub timestamp: DateTime<Utc>,
}

/// A scheduled economic event or data release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub id: String,
    pub country: String,
    pub category: String,
    pub event: String,
    pub date: DateTime<Utc>,
    pub actual: Option<f64>,
    pub previous: f64,
    pub forecast: f64,
    pub importance: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn alert(from_owner: &str, to_owner: &str, amount_usd: Decimal) -> WhaleAlert {
        WhaleAlert {
            id: "a1".to_string(),
            blockchain: "bitcoin".to_string(),
            symbol: "BTC".to_string(),
            amount: dec!(100),
            amount_usd,
            from_address: "bc1qfrom".to_string(),
            to_address: "bc1qto".to_string(),
            from_owner: from_owner.to_string(),
            to_owner: to_owner.to_string(),
            tx_hash: "deadbeef".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_whale_flow_inflow() {
        assert_eq!(
            alert("unknown", "binance", dec!(1)).flow(),
            WhaleFlow::ExchangeInflow
        );
    }

    #[test]
    fn test_whale_flow_outflow() {
        assert_eq!(
            alert("coinbase", "unknown", dec!(1)).flow(),
            WhaleFlow::ExchangeOutflow
        );
    }

    #[test]
    fn test_whale_flow_wallet_transfer() {
        assert_eq!(
            alert("unknown", "unknown", dec!(1)).flow(),
            WhaleFlow::WalletTransfer
        );
    }

    #[test]
    fn test_whale_flow_exchange_to_exchange() {
        assert_eq!(
            alert("binance", "coinbase", dec!(1)).flow(),
            WhaleFlow::Unknown
        );
    }

    #[test]
    fn test_whale_flow_case_insensitive() {
        assert_eq!(
            alert("unknown", "Binance", dec!(1)).flow(),
            WhaleFlow::ExchangeInflow
        );
    }

    #[test]
    fn test_net_flows() {
        let alerts = vec![
            alert("unknown", "binance", dec!(10_000_000)),
            alert("kraken", "unknown", dec!(50_000_000)),
            alert("unknown", "unknown", dec!(99_000_000)),
            alert("unknown", "okx", dec!(5_000_000)),
        ];
        let (inflow, outflow) = WhaleAlert::net_flows(&alerts);
        assert_eq!(inflow, dec!(15_000_000));
        assert_eq!(outflow, dec!(50_000_000));
    }

    #[test]
    fn test_fomc_probabilities_normalized() {
        let meeting = FOMCMeeting {
            meeting_date: Utc::now(),
            current_rate: 5.25,
            most_likely_rate: 5.0,
            most_likely_prob: 0.7,
            rate_change_prob: 0.8,
            hike_prob: 0.1,
            cut_prob: 0.7,
            hold_prob: 0.2,
            timestamp: Utc::now(),
        };
        assert!(meeting.probabilities_normalized(1e-9));
    }
}
