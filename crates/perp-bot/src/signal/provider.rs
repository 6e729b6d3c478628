//! Multi-source signal provider.
//!
//! Owns the signal cache, adapts pull-only vendors into push streams via
//! per-source polling tasks with de-duplication, and runs the periodic
//! build-and-broadcast loop that fans fused `MarketSignal`s out to
//! subscribers.
//!
//! ## Task layout
//!
//! - build loop: every 30 s, synthesize one signal per configured symbol and
//!   broadcast it to subscribers in registration order.
//! - liquidation poller: 30 s cadence, de-duplicated by `last_seen` timestamp
//!   per symbol.
//! - whale poller: 60 s cadence, de-duplicated by alert id.
//! - sentiment poller: 5 min cadence, latest-value overwrite.
//! - macro poller: 15 min cadence; merges FedWatch and indicator data into a
//!   `MacroSignal`, scores it, and stores it in the cache.
//!
//! All tasks select against a broadcast shutdown channel. Subscriber handlers
//! run on the build-loop task, outside every cache lock, so a slow handler
//! cannot stall cache writes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use perp_common::signal::{MacroSignal, MarketSignal};

use crate::datasource::{DerivativesSource, MacroSource, SentimentSource, WhaleSource};
use crate::signal::cache::SignalCache;
use crate::signal::fuse::{analyze_macro, fuse};

const LIQUIDATION_POLL_SECS: u64 = 30;
const WHALE_POLL_SECS: u64 = 60;
const SENTIMENT_POLL_SECS: u64 = 300;
const MACRO_POLL_SECS: u64 = 900;

/// Bounded grace period when joining background tasks on stop.
const STOP_GRACE: Duration = Duration::from_secs(30);

/// Upper bound on the whale de-duplication set before it is reset.
const MAX_SEEN_IDS: usize = 10_000;

/// Handler invoked for every broadcast signal, in registration order.
pub type SignalHandler = Arc<dyn Fn(&MarketSignal) + Send + Sync>;

/// Provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Symbols to build signals for.
    pub symbols: Vec<String>,
    /// Minimum USD value for whale transactions.
    pub whale_min_value: Decimal,
    /// Build-and-broadcast period.
    pub build_interval: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC".to_string(), "ETH".to_string()],
            whale_min_value: dec!(1_000_000),
            build_interval: Duration::from_secs(30),
        }
    }
}

/// Aggregates optional data sources into fused market signals.
///
/// Cheap to clone; clones share the cache, subscriber list, and lifecycle
/// state, so background tasks hold their own handle.
#[derive(Clone)]
pub struct SignalProvider {
    config: Arc<ProviderConfig>,
    derivatives: Option<Arc<dyn DerivativesSource>>,
    whales: Option<Arc<dyn WhaleSource>>,
    sentiment: Option<Arc<dyn SentimentSource>>,
    macro_source: Option<Arc<dyn MacroSource>>,

    cache: Arc<SignalCache>,
    handlers: Arc<RwLock<Vec<SignalHandler>>>,
    running: Arc<AtomicBool>,
    shutdown: broadcast::Sender<()>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl SignalProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            config: Arc::new(config),
            derivatives: None,
            whales: None,
            sentiment: None,
            macro_source: None,
            cache: Arc::new(SignalCache::new()),
            handlers: Arc::new(RwLock::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_derivatives(mut self, source: Arc<dyn DerivativesSource>) -> Self {
        self.derivatives = Some(source);
        self
    }

    pub fn with_whales(mut self, source: Arc<dyn WhaleSource>) -> Self {
        self.whales = Some(source);
        self
    }

    pub fn with_sentiment(mut self, source: Arc<dyn SentimentSource>) -> Self {
        self.sentiment = Some(source);
        self
    }

    pub fn with_macro(mut self, source: Arc<dyn MacroSource>) -> Self {
        self.macro_source = Some(source);
        self
    }

    /// The cache owned by this provider (shared for inspection).
    pub fn cache(&self) -> Arc<SignalCache> {
        self.cache.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Register a subscriber. Handlers are append-only within a run and are
    /// invoked sequentially from the broadcast task.
    pub fn subscribe(&self, handler: SignalHandler) {
        self.handlers.write().push(handler);
    }

    /// Connect the configured sources and spawn the background tasks.
    ///
    /// Idempotent: a second call on a running provider is a no-op. A source
    /// that fails to connect is logged and skipped; the others keep running.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(src) = &self.derivatives {
            if let Err(e) = src.connect().await {
                warn!("Derivatives source connect failed, continuing without: {}", e);
            }
        }
        if let Some(src) = &self.whales {
            if let Err(e) = src.connect().await {
                warn!("Whale source connect failed, continuing without: {}", e);
            }
        }
        if let Some(src) = &self.sentiment {
            if let Err(e) = src.connect().await {
                warn!("Sentiment source connect failed, continuing without: {}", e);
            }
        }
        if let Some(src) = &self.macro_source {
            if let Err(e) = src.connect().await {
                warn!("Macro source connect failed, continuing without: {}", e);
            }
        }

        let mut tasks = self.tasks.lock();

        // Build-and-broadcast loop.
        {
            let provider = self.clone();
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(provider.config.build_interval);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            for symbol in provider.config.symbols.clone() {
                                let signal = provider.build_signal(&symbol).await;
                                provider.broadcast(&signal);
                            }
                        }
                        _ = shutdown.recv() => break,
                    }
                }
            }));
        }

        if self.derivatives.is_some() {
            let provider = self.clone();
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut interval =
                    tokio::time::interval(Duration::from_secs(LIQUIDATION_POLL_SECS));
                let mut last_seen: HashMap<String, DateTime<Utc>> = HashMap::new();
                loop {
                    tokio::select! {
                        _ = interval.tick() => provider.poll_liquidations_once(&mut last_seen).await,
                        _ = shutdown.recv() => break,
                    }
                }
            }));
        }

        if self.whales.is_some() {
            let provider = self.clone();
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(WHALE_POLL_SECS));
                let mut seen_ids = HashSet::new();
                loop {
                    tokio::select! {
                        _ = interval.tick() => provider.poll_whales_once(&mut seen_ids).await,
                        _ = shutdown.recv() => break,
                    }
                }
            }));
        }

        if self.sentiment.is_some() {
            let provider = self.clone();
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(SENTIMENT_POLL_SECS));
                loop {
                    tokio::select! {
                        _ = interval.tick() => provider.poll_sentiment_once().await,
                        _ = shutdown.recv() => break,
                    }
                }
            }));
        }

        if self.macro_source.is_some() {
            let provider = self.clone();
            let mut shutdown = self.shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(MACRO_POLL_SECS));
                loop {
                    tokio::select! {
                        _ = interval.tick() => provider.poll_macro_once().await,
                        _ = shutdown.recv() => break,
                    }
                }
            }));
        }
        drop(tasks);

        info!(
            symbols = ?self.config.symbols,
            derivatives = self.derivatives.is_some(),
            whales = self.whales.is_some(),
            sentiment = self.sentiment.is_some(),
            macro_data = self.macro_source.is_some(),
            "Signal provider started"
        );
    }

    /// Halt the build loop and pollers, then disconnect sources.
    ///
    /// In-flight builds may complete; no new ones are scheduled. Joins each
    /// task under a bounded grace period.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }

        let _ = self.shutdown.send(());
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
                warn!("Provider task did not stop within grace period");
            }
        }

        if let Some(src) = &self.derivatives {
            let _ = src.disconnect().await;
        }
        if let Some(src) = &self.whales {
            let _ = src.disconnect().await;
        }
        if let Some(src) = &self.sentiment {
            let _ = src.disconnect().await;
        }
        if let Some(src) = &self.macro_source {
            let _ = src.disconnect().await;
        }

        info!("Signal provider stopped");
    }

    /// Synthesize a fused market signal for one symbol.
    ///
    /// Pulls current derivatives metrics and sentiment, merges in cached
    /// whale/liquidation/macro data, and runs the fuser. Failed pulls degrade
    /// to absent inputs; the result is always a valid signal.
    pub async fn build_signal(&self, symbol: &str) -> MarketSignal {
        let mut signal = MarketSignal::empty(symbol);

        if let Some(src) = &self.derivatives {
            match src.funding_rate(symbol).await {
                Ok(fr) => signal.funding_rate = Some(fr),
                Err(e) => debug!(symbol, "Funding rate unavailable: {}", e),
            }
            match src.open_interest(symbol).await {
                Ok(oi) => signal.open_interest = Some(oi),
                Err(e) => debug!(symbol, "Open interest unavailable: {}", e),
            }
            match src.long_short_ratio(symbol).await {
                Ok(lsr) => signal.long_short_ratio = Some(lsr),
                Err(e) => debug!(symbol, "Long/short ratio unavailable: {}", e),
            }
        }

        if let Some(src) = &self.sentiment {
            match src.sentiment(symbol).await {
                Ok(s) => signal.social_sentiment = Some(s),
                Err(e) => debug!(symbol, "Sentiment unavailable: {}", e),
            }
        }

        let snapshot = self.cache.snapshot(symbol);
        signal.recent_whale_alerts = snapshot.whale_alerts;
        signal.recent_liquidations = snapshot.liquidations;
        // Cached sentiment backs up a failed pull.
        if signal.social_sentiment.is_none() {
            signal.social_sentiment = snapshot.sentiment;
        }
        if let Some(macro_signal) = &snapshot.macro_signal {
            signal.fed_cut_prob = macro_signal.next_cut_prob();
            signal.fed_hike_prob = macro_signal.next_hike_prob();
        }

        let fusion = fuse(&signal);
        signal.bias = fusion.bias;
        signal.strength = fusion.strength;
        signal.confidence = fusion.confidence;
        signal
    }

    fn broadcast(&self, signal: &MarketSignal) {
        // Clone the handler list so the lock is released before any handler
        // runs.
        let handlers: Vec<SignalHandler> = self.handlers.read().clone();
        for handler in handlers {
            handler(signal);
        }
    }

    async fn poll_liquidations_once(&self, last_seen: &mut HashMap<String, DateTime<Utc>>) {
        let Some(src) = &self.derivatives else { return };
        for symbol in &self.config.symbols {
            match src.liquidations(symbol).await {
                Ok(liquidations) => {
                    let watermark = last_seen
                        .entry(symbol.clone())
                        .or_insert(DateTime::<Utc>::MIN_UTC);
                    let mut newest = *watermark;
                    for liq in liquidations {
                        if liq.timestamp > *watermark {
                            if liq.timestamp > newest {
                                newest = liq.timestamp;
                            }
                            self.cache.insert_liquidation(symbol, liq);
                        }
                    }
                    *watermark = newest;
                }
                Err(e) => debug!(symbol = %symbol, "Liquidation poll failed: {}", e),
            }
        }
    }

    async fn poll_whales_once(&self, seen_ids: &mut HashSet<String>) {
        let Some(src) = &self.whales else { return };
        match src.transactions(self.config.whale_min_value).await {
            Ok(alerts) => {
                if seen_ids.len() > MAX_SEEN_IDS {
                    seen_ids.clear();
                }
                for alert in alerts {
                    if seen_ids.insert(alert.id.clone()) {
                        self.cache.insert_whale(alert);
                    }
                }
            }
            Err(e) => debug!("Whale poll failed: {}", e),
        }
    }

    async fn poll_sentiment_once(&self) {
        let Some(src) = &self.sentiment else { return };
        for symbol in &self.config.symbols {
            match src.sentiment(symbol).await {
                Ok(s) => self.cache.set_sentiment(symbol, s),
                Err(e) => debug!(symbol = %symbol, "Sentiment poll failed: {}", e),
            }
        }
    }

    async fn poll_macro_once(&self) {
        let Some(src) = &self.macro_source else { return };
        let mut signal = MacroSignal::empty();

        match src.fed_watch().await {
            Ok(fed_watch) => signal.fed_watch = Some(fed_watch),
            Err(e) => debug!("FedWatch poll failed: {}", e),
        }

        match src.indicators().await {
            Ok(indicators) => {
                for indicator in indicators {
                    match indicator.category.to_lowercase().as_str() {
                        "cpi" => signal.cpi = Some(indicator),
                        "gdp" => signal.gdp = Some(indicator),
                        "unemployment" => signal.unemployment = Some(indicator),
                        "pce" => signal.pce = Some(indicator),
                        _ => {}
                    }
                }
            }
            Err(e) => debug!("Indicator poll failed: {}", e),
        }

        if let Ok(events) = src.upcoming_events().await {
            signal.upcoming_events = events;
        }

        if signal.fed_watch.is_none() && signal.cpi.is_none() && signal.gdp.is_none() {
            // Nothing fetched; keep whatever is cached.
            return;
        }

        let fusion = analyze_macro(&signal);
        signal.bias = fusion.bias;
        signal.strength = fusion.strength;
        signal.confidence = fusion.confidence;
        self.cache.set_macro(signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use perp_common::records::{
        EconomicIndicator, FOMCMeeting, FedWatchData, FundingRate, Liquidation, LongShortRatio,
        OpenInterest, SocialSentiment, WhaleAlert,
    };
    use perp_common::types::{PositionSide, SignalBias};
    use crate::datasource::SourceError;

    struct MockDerivatives {
        rate: f64,
        ratio: f64,
        liquidations: Mutex<Vec<Liquidation>>,
    }

    #[async_trait]
    impl DerivativesSource for MockDerivatives {
        async fn connect(&self) -> Result<(), SourceError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), SourceError> {
            Ok(())
        }
        async fn funding_rate(&self, symbol: &str) -> Result<FundingRate, SourceError> {
            Ok(FundingRate {
                symbol: symbol.to_string(),
                rate: self.rate,
                predicted_rate: self.rate,
                next_funding_time: Utc::now(),
                exchange: "mock".to_string(),
                timestamp: Utc::now(),
            })
        }
        async fn open_interest(&self, symbol: &str) -> Result<OpenInterest, SourceError> {
            Ok(OpenInterest {
                symbol: symbol.to_string(),
                open_interest: dec!(1_000_000_000),
                change_24h: 1.0,
                exchange: "mock".to_string(),
                timestamp: Utc::now(),
            })
        }
        async fn long_short_ratio(&self, symbol: &str) -> Result<LongShortRatio, SourceError> {
            Ok(LongShortRatio {
                symbol: symbol.to_string(),
                long_ratio: 0.0,
                short_ratio: 0.0,
                ratio: self.ratio,
                exchange: "mock".to_string(),
                timestamp: Utc::now(),
            })
        }
        async fn liquidations(&self, _symbol: &str) -> Result<Vec<Liquidation>, SourceError> {
            Ok(self.liquidations.lock().clone())
        }
    }

    struct MockWhales {
        alerts: Vec<WhaleAlert>,
    }

    #[async_trait]
    impl WhaleSource for MockWhales {
        async fn connect(&self) -> Result<(), SourceError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), SourceError> {
            Ok(())
        }
        async fn transactions(&self, _min: Decimal) -> Result<Vec<WhaleAlert>, SourceError> {
            Ok(self.alerts.clone())
        }
    }

    struct MockMacro;

    #[async_trait]
    impl MacroSource for MockMacro {
        async fn connect(&self) -> Result<(), SourceError> {
            Ok(())
        }
        async fn disconnect(&self) -> Result<(), SourceError> {
            Ok(())
        }
        async fn fed_watch(&self) -> Result<FedWatchData, SourceError> {
            Ok(FedWatchData {
                current_rate: 5.25,
                next_meeting: Some(FOMCMeeting {
                    meeting_date: Utc::now(),
                    current_rate: 5.25,
                    most_likely_rate: 5.0,
                    most_likely_prob: 0.7,
                    rate_change_prob: 0.8,
                    hike_prob: 0.1,
                    cut_prob: 0.7,
                    hold_prob: 0.2,
                    timestamp: Utc::now(),
                }),
                upcoming_meetings: Vec::new(),
                timestamp: Utc::now(),
            })
        }
        async fn indicators(&self) -> Result<Vec<EconomicIndicator>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn whale_alert(id: &str) -> WhaleAlert {
        WhaleAlert {
            id: id.to_string(),
            blockchain: "bitcoin".to_string(),
            symbol: "BTC".to_string(),
            amount: dec!(100),
            amount_usd: dec!(60_000_000),
            from_address: String::new(),
            to_address: String::new(),
            from_owner: "kraken".to_string(),
            to_owner: "unknown".to_string(),
            tx_hash: String::new(),
            timestamp: Utc::now(),
        }
    }

    fn config() -> ProviderConfig {
        ProviderConfig {
            symbols: vec!["BTC".to_string()],
            whale_min_value: dec!(1_000_000),
            build_interval: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_build_signal_no_sources_is_neutral() {
        let provider = SignalProvider::new(config());
        let signal = provider.build_signal("BTC").await;
        assert_eq!(signal.symbol, "BTC");
        assert_eq!(signal.bias, SignalBias::Neutral);
        assert_eq!(signal.strength, 0.0);
        assert_eq!(signal.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_build_signal_with_derivatives() {
        let provider = SignalProvider::new(config()).with_derivatives(Arc::new(MockDerivatives {
            rate: -0.001,
            ratio: 0.5,
            liquidations: Mutex::new(Vec::new()),
        }));

        let signal = provider.build_signal("BTC").await;
        assert!(signal.funding_rate.is_some());
        assert!(signal.open_interest.is_some());
        assert_eq!(signal.bias, SignalBias::Bullish);
        assert_eq!(signal.confidence, 2.0 / 5.0);
    }

    #[tokio::test]
    async fn test_build_signal_includes_fed_probs_from_macro_cache() {
        let provider = Arc::new(SignalProvider::new(config()).with_macro(Arc::new(MockMacro)));
        provider.poll_macro_once().await;

        let signal = provider.build_signal("BTC").await;
        assert_eq!(signal.fed_cut_prob, Some(0.7));
        assert_eq!(signal.fed_hike_prob, Some(0.1));
        assert_eq!(signal.bias, SignalBias::Bullish);

        let cached = provider.cache().macro_signal().unwrap();
        assert_eq!(cached.bias, SignalBias::Bullish);
    }

    #[tokio::test]
    async fn test_whale_poller_dedup() {
        let provider = SignalProvider::new(config()).with_whales(Arc::new(MockWhales {
            alerts: vec![whale_alert("a"), whale_alert("b")],
        }));

        let mut seen = HashSet::new();
        provider.poll_whales_once(&mut seen).await;
        provider.poll_whales_once(&mut seen).await;

        let snap = provider.cache.snapshot("BTC");
        assert_eq!(snap.whale_alerts.len(), 2);
    }

    #[tokio::test]
    async fn test_liquidation_poller_dedup_by_timestamp() {
        let old = Liquidation {
            symbol: "BTC".to_string(),
            side: PositionSide::Long,
            price: dec!(50000),
            quantity: dec!(1),
            value_usd: dec!(50000),
            exchange: "mock".to_string(),
            timestamp: Utc::now() - chrono::Duration::seconds(60),
        };
        let source = Arc::new(MockDerivatives {
            rate: 0.0,
            ratio: 1.0,
            liquidations: Mutex::new(vec![old.clone()]),
        });
        let provider = SignalProvider::new(config()).with_derivatives(source.clone());

        let mut last_seen = HashMap::new();
        provider.poll_liquidations_once(&mut last_seen).await;
        // Second poll returns the same record plus a fresh one.
        let mut fresh = old.clone();
        fresh.timestamp = Utc::now();
        source.liquidations.lock().push(fresh);
        provider.poll_liquidations_once(&mut last_seen).await;

        let snap = provider.cache.snapshot("BTC");
        assert_eq!(snap.liquidations.len(), 2);
    }

    #[tokio::test]
    async fn test_fan_out_in_registration_order() {
        let provider = SignalProvider::new(config());
        let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3u32 {
            let order = order.clone();
            provider.subscribe(Arc::new(move |_signal| {
                order.lock().push(i);
            }));
        }

        provider.broadcast(&MarketSignal::empty("BTC"));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let provider = Arc::new(SignalProvider::new(config()));
        provider.start().await;
        assert!(provider.is_running());
        provider.start().await; // no-op
        assert!(provider.is_running());

        provider.stop().await;
        assert!(!provider.is_running());
        provider.stop().await; // no-op
    }

    #[tokio::test]
    async fn test_broadcast_loop_delivers_signals() {
        let provider = Arc::new(SignalProvider::new(config()));
        let received: Arc<Mutex<Vec<MarketSignal>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        provider.subscribe(Arc::new(move |signal| {
            sink.lock().push(signal.clone());
        }));

        provider.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        provider.stop().await;

        let received = received.lock();
        assert!(!received.is_empty());
        assert_eq!(received[0].symbol, "BTC");
    }
}
