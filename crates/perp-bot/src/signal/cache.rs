//! Per-symbol sliding-window cache for streamed signal inputs.
//!
//! The provider owns one `SignalCache` and is the only writer; snapshots are
//! taken by the build loop and by tests. Whale alerts and liquidations are
//! retained for a bounded window, evicted both on insert and on read so the
//! retention property holds even without further writes. Sentiment and the
//! macro signal are latest-value slots.

use chrono::{Duration, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;

use perp_common::records::{Liquidation, SocialSentiment, WhaleAlert};
use perp_common::signal::MacroSignal;

/// Whale alerts older than this are evicted.
const WHALE_RETENTION_MINS: i64 = 30;

/// Liquidations older than this are evicted.
const LIQUIDATION_RETENTION_MINS: i64 = 10;

/// Map a whale-alert blockchain name to a trading symbol.
///
/// Alerts for unmapped chains are dropped by the cache.
pub fn blockchain_symbol(blockchain: &str) -> Option<&'static str> {
    match blockchain {
        "bitcoin" => Some("BTC"),
        "ethereum" => Some("ETH"),
        "solana" => Some("SOL"),
        "tron" => Some("TRX"),
        _ => None,
    }
}

/// An internally consistent read of the cache for one symbol.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub whale_alerts: Vec<WhaleAlert>,
    pub liquidations: Vec<Liquidation>,
    pub sentiment: Option<SocialSentiment>,
    pub macro_signal: Option<MacroSignal>,
}

/// Sliding-window store of signal inputs.
///
/// Safe for one writer per data kind concurrent with many readers: each
/// per-symbol collection is guarded by its own map shard, so evictions and
/// appends appear atomic to snapshot readers.
#[derive(Debug, Default)]
pub struct SignalCache {
    whale_alerts: DashMap<String, Vec<WhaleAlert>>,
    liquidations: DashMap<String, Vec<Liquidation>>,
    sentiment: DashMap<String, SocialSentiment>,
    macro_signal: RwLock<Option<MacroSignal>>,
}

impl SignalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a whale alert, mapping its blockchain to a symbol.
    ///
    /// Returns the symbol the alert was stored under, or `None` if the
    /// blockchain is unmapped and the alert was dropped. Entries older than
    /// the retention window are evicted on every insert.
    pub fn insert_whale(&self, alert: WhaleAlert) -> Option<&'static str> {
        let symbol = blockchain_symbol(&alert.blockchain)?;
        let cutoff = Utc::now() - Duration::minutes(WHALE_RETENTION_MINS);
        let mut alerts = self.whale_alerts.entry(symbol.to_string()).or_default();
        alerts.retain(|a| a.timestamp > cutoff);
        alerts.push(alert);
        Some(symbol)
    }

    /// Insert a liquidation, evicting entries past the retention window.
    pub fn insert_liquidation(&self, symbol: &str, liquidation: Liquidation) {
        let cutoff = Utc::now() - Duration::minutes(LIQUIDATION_RETENTION_MINS);
        let mut liqs = self.liquidations.entry(symbol.to_string()).or_default();
        liqs.retain(|l| l.timestamp > cutoff);
        liqs.push(liquidation);
    }

    /// Overwrite the latest sentiment for a symbol.
    pub fn set_sentiment(&self, symbol: &str, sentiment: SocialSentiment) {
        self.sentiment.insert(symbol.to_string(), sentiment);
    }

    /// Overwrite the latest macro signal.
    pub fn set_macro(&self, signal: MacroSignal) {
        *self.macro_signal.write() = Some(signal);
    }

    /// Latest macro signal, if any.
    pub fn macro_signal(&self) -> Option<MacroSignal> {
        self.macro_signal.read().clone()
    }

    /// Take an owned snapshot for one symbol.
    ///
    /// Retention windows are applied on read as well, so a snapshot never
    /// contains expired entries even if nothing was inserted since.
    pub fn snapshot(&self, symbol: &str) -> CacheSnapshot {
        let now = Utc::now();
        let whale_cutoff = now - Duration::minutes(WHALE_RETENTION_MINS);
        let liq_cutoff = now - Duration::minutes(LIQUIDATION_RETENTION_MINS);

        let whale_alerts = self
            .whale_alerts
            .get(symbol)
            .map(|alerts| {
                alerts
                    .iter()
                    .filter(|a| a.timestamp > whale_cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let liquidations = self
            .liquidations
            .get(symbol)
            .map(|liqs| {
                liqs.iter()
                    .filter(|l| l.timestamp > liq_cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        CacheSnapshot {
            whale_alerts,
            liquidations,
            sentiment: self.sentiment.get(symbol).map(|s| s.value().clone()),
            macro_signal: self.macro_signal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perp_common::types::PositionSide;
    use rust_decimal_macros::dec;

    fn whale(blockchain: &str, age_mins: i64) -> WhaleAlert {
        WhaleAlert {
            id: format!("{}-{}", blockchain, age_mins),
            blockchain: blockchain.to_string(),
            symbol: String::new(),
            amount: dec!(100),
            amount_usd: dec!(5_000_000),
            from_address: String::new(),
            to_address: String::new(),
            from_owner: "unknown".to_string(),
            to_owner: "binance".to_string(),
            tx_hash: String::new(),
            timestamp: Utc::now() - Duration::minutes(age_mins),
        }
    }

    fn liquidation(age_mins: i64) -> Liquidation {
        Liquidation {
            symbol: "BTC".to_string(),
            side: PositionSide::Long,
            price: dec!(50000),
            quantity: dec!(1),
            value_usd: dec!(50000),
            exchange: "test".to_string(),
            timestamp: Utc::now() - Duration::minutes(age_mins),
        }
    }

    fn sentiment(symbol: &str, score: f64) -> SocialSentiment {
        SocialSentiment {
            symbol: symbol.to_string(),
            source: "test".to_string(),
            sentiment: 0.5,
            sentiment_score: score,
            positive_ratio: 0.0,
            negative_ratio: 0.0,
            neutral_ratio: 0.0,
            social_volume: 0,
            interactions: 0,
            contributors: 0,
            galaxy_score: 0.0,
            alt_rank: 0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_blockchain_mapping() {
        assert_eq!(blockchain_symbol("bitcoin"), Some("BTC"));
        assert_eq!(blockchain_symbol("ethereum"), Some("ETH"));
        assert_eq!(blockchain_symbol("solana"), Some("SOL"));
        assert_eq!(blockchain_symbol("tron"), Some("TRX"));
        assert_eq!(blockchain_symbol("dogecoin"), None);
    }

    #[test]
    fn test_insert_whale_maps_symbol() {
        let cache = SignalCache::new();
        assert_eq!(cache.insert_whale(whale("bitcoin", 0)), Some("BTC"));
        assert_eq!(cache.insert_whale(whale("dogecoin", 0)), None);

        let snap = cache.snapshot("BTC");
        assert_eq!(snap.whale_alerts.len(), 1);
    }

    #[test]
    fn test_whale_retention_on_insert() {
        let cache = SignalCache::new();
        cache.insert_whale(whale("bitcoin", 45));
        cache.insert_whale(whale("bitcoin", 0));

        let snap = cache.snapshot("BTC");
        assert_eq!(snap.whale_alerts.len(), 1);
    }

    #[test]
    fn test_whale_retention_on_snapshot_without_insert() {
        let cache = SignalCache::new();
        cache.insert_whale(whale("bitcoin", 31));

        // No further inserts; the snapshot still filters by retention.
        let snap = cache.snapshot("BTC");
        assert!(snap.whale_alerts.is_empty());
    }

    #[test]
    fn test_liquidation_retention() {
        let cache = SignalCache::new();
        cache.insert_liquidation("BTC", liquidation(15));
        cache.insert_liquidation("BTC", liquidation(0));

        let snap = cache.snapshot("BTC");
        assert_eq!(snap.liquidations.len(), 1);
    }

    #[test]
    fn test_sentiment_overwrite() {
        let cache = SignalCache::new();
        cache.set_sentiment("BTC", sentiment("BTC", 0.1));
        cache.set_sentiment("BTC", sentiment("BTC", 0.9));

        let snap = cache.snapshot("BTC");
        assert_eq!(snap.sentiment.unwrap().sentiment_score, 0.9);
    }

    #[test]
    fn test_macro_overwrite() {
        let cache = SignalCache::new();
        assert!(cache.macro_signal().is_none());

        let mut m = MacroSignal::empty();
        m.strength = 0.4;
        cache.set_macro(m);
        let mut m2 = MacroSignal::empty();
        m2.strength = 0.8;
        cache.set_macro(m2);

        assert_eq!(cache.macro_signal().unwrap().strength, 0.8);
        assert_eq!(cache.snapshot("BTC").macro_signal.unwrap().strength, 0.8);
    }

    #[test]
    fn test_snapshot_unknown_symbol_is_empty() {
        let cache = SignalCache::new();
        let snap = cache.snapshot("XRP");
        assert!(snap.whale_alerts.is_empty());
        assert!(snap.liquidations.is_empty());
        assert!(snap.sentiment.is_none());
    }

    #[test]
    fn test_per_symbol_isolation() {
        let cache = SignalCache::new();
        cache.insert_whale(whale("bitcoin", 0));
        cache.insert_whale(whale("ethereum", 0));

        assert_eq!(cache.snapshot("BTC").whale_alerts.len(), 1);
        assert_eq!(cache.snapshot("ETH").whale_alerts.len(), 1);
        assert!(cache.snapshot("SOL").whale_alerts.is_empty());
    }
}
