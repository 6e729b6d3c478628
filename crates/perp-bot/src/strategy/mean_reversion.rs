//! Mean-reversion strategy: RSI + Bollinger band entries with fixed exits.
//!
//! Sibling to `SignalStrategy` behind the same interface, with divergent exit
//! policy: fixed take-profit / stop-loss against the entry price plus a hard
//! hold-time timeout. The two exit policies are intentionally not merged.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use perp_common::market::{Order, Position};
use perp_common::types::{OrderStatus, Side};

use super::indicators::{bollinger_bands, rsi};
use super::{param_decimal, param_f64, param_u64, MarketState, Signal, Strategy, StrategyError};

/// Depth of the strategy's own price buffer.
const MAX_HISTORY: usize = 100;

/// Configuration for the mean-reversion strategy.
#[derive(Debug, Clone)]
pub struct MeanReversionConfig {
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,

    pub bb_period: usize,
    pub bb_std_dev: f64,

    /// Take-profit as a fraction of entry price.
    pub take_profit_pct: Decimal,
    /// Stop-loss as a fraction of entry price.
    pub stop_loss_pct: Decimal,
    /// Close any position held longer than this.
    pub max_hold_time: Duration,

    /// Quantity per trade.
    pub position_size: Decimal,
}

impl Default for MeanReversionConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            rsi_oversold: 25.0,
            rsi_overbought: 75.0,
            bb_period: 20,
            bb_std_dev: 2.5,
            take_profit_pct: dec!(0.004),
            stop_loss_pct: dec!(0.0025),
            max_hold_time: Duration::from_secs(1800),
            position_size: dec!(0.001),
        }
    }
}

/// RSI + Bollinger mean-reversion over a sliding price buffer.
#[derive(Debug)]
pub struct MeanReversionStrategy {
    config: MeanReversionConfig,
    price_history: Vec<f64>,

    has_position: bool,
    entry_price: Decimal,
    entry_time: Option<DateTime<Utc>>,
    entry_side: Option<Side>,

    symbols: Vec<&'static str>,
}

impl MeanReversionStrategy {
    pub fn new() -> Self {
        Self::with_config(MeanReversionConfig::default())
    }

    pub fn with_config(config: MeanReversionConfig) -> Self {
        Self {
            config,
            price_history: Vec::with_capacity(MAX_HISTORY),
            has_position: false,
            entry_price: Decimal::ZERO,
            entry_time: None,
            entry_side: None,
            symbols: vec!["BTC", "ETH", "XRP"],
        }
    }

    pub fn config(&self) -> &MeanReversionConfig {
        &self.config
    }

    pub fn has_position(&self) -> bool {
        self.has_position
    }

    /// Accepts bare symbols and common venue suffixes (BTC, BTC/USDC,
    /// BTC-PERP, BTCUSDC).
    fn symbol_supported(&self, symbol: &str) -> bool {
        self.symbols.iter().any(|s| {
            symbol == *s
                || symbol == format!("{}/USDC", s)
                || symbol == format!("{}-PERP", s)
                || symbol == format!("{}USDC", s)
        })
    }

    fn push_price(&mut self, price: f64) {
        self.price_history.push(price);
        if self.price_history.len() > MAX_HISTORY {
            self.price_history.remove(0);
        }
    }

    fn check_entry(&self, state: &MarketState, price: f64) -> Vec<Signal> {
        if self.price_history.len() < self.config.bb_period {
            return Vec::new();
        }

        let rsi_value = rsi(&self.price_history, self.config.rsi_period);
        let bands = bollinger_bands(
            &self.price_history,
            self.config.bb_period,
            self.config.bb_std_dev,
        );

        let mut signals = Vec::new();

        if rsi_value < self.config.rsi_oversold && price < bands.lower {
            signals.push(Signal {
                symbol: state.ticker.symbol.clone(),
                side: Side::Buy,
                price: state.ticker.ask,
                quantity: self.config.position_size,
                reason: format!(
                    "Long entry: RSI={:.1} (<{:.1}), price={:.2} (<BB lower={:.2})",
                    rsi_value, self.config.rsi_oversold, price, bands.lower
                ),
            });
        }

        if rsi_value > self.config.rsi_overbought && price > bands.upper {
            signals.push(Signal {
                symbol: state.ticker.symbol.clone(),
                side: Side::Sell,
                price: state.ticker.bid,
                quantity: self.config.position_size,
                reason: format!(
                    "Short entry: RSI={:.1} (>{:.1}), price={:.2} (>BB upper={:.2})",
                    rsi_value, self.config.rsi_overbought, price, bands.upper
                ),
            });
        }

        signals
    }

    fn check_exit(&self, state: &MarketState) -> Vec<Signal> {
        let current = state.ticker.last;
        let entry = self.entry_price;
        if entry <= Decimal::ZERO {
            return Vec::new();
        }

        let mut exit_reason: Option<String> = None;

        match self.entry_side {
            Some(Side::Buy) => {
                let take_profit = entry * (Decimal::ONE + self.config.take_profit_pct);
                let stop_loss = entry * (Decimal::ONE - self.config.stop_loss_pct);
                if current >= take_profit {
                    exit_reason = Some(format!(
                        "Take profit: entry={} current={} target={}",
                        entry, current, take_profit
                    ));
                } else if current <= stop_loss {
                    exit_reason = Some(format!(
                        "Stop loss: entry={} current={} stop={}",
                        entry, current, stop_loss
                    ));
                }
            }
            Some(Side::Sell) => {
                let take_profit = entry * (Decimal::ONE - self.config.take_profit_pct);
                let stop_loss = entry * (Decimal::ONE + self.config.stop_loss_pct);
                if current <= take_profit {
                    exit_reason = Some(format!(
                        "Take profit: entry={} current={} target={}",
                        entry, current, take_profit
                    ));
                } else if current >= stop_loss {
                    exit_reason = Some(format!(
                        "Stop loss: entry={} current={} stop={}",
                        entry, current, stop_loss
                    ));
                }
            }
            None => return Vec::new(),
        }

        if exit_reason.is_none() {
            if let Some(entry_time) = self.entry_time {
                let held = Utc::now().signed_duration_since(entry_time);
                let max_hold = chrono::Duration::from_std(self.config.max_hold_time)
                    .unwrap_or(chrono::TimeDelta::MAX);
                if held > max_hold {
                    exit_reason = Some(format!(
                        "Timeout exit: held {}s, max {}s",
                        held.num_seconds(),
                        self.config.max_hold_time.as_secs()
                    ));
                }
            }
        }

        let Some(reason) = exit_reason else {
            return Vec::new();
        };

        let (side, price) = match self.entry_side {
            Some(Side::Buy) => (Side::Sell, state.ticker.bid),
            _ => (Side::Buy, state.ticker.ask),
        };

        vec![Signal {
            symbol: state.ticker.symbol.clone(),
            side,
            price,
            quantity: self.config.position_size,
            reason,
        }]
    }
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &'static str {
        "mean_reversion"
    }

    fn init(&mut self, params: &toml::value::Table) -> Result<(), StrategyError> {
        if let Some(v) = param_u64(params, "rsi_period") {
            self.config.rsi_period = v as usize;
        }
        if let Some(v) = param_f64(params, "rsi_oversold") {
            self.config.rsi_oversold = v;
        }
        if let Some(v) = param_f64(params, "rsi_overbought") {
            self.config.rsi_overbought = v;
        }
        if let Some(v) = param_u64(params, "bb_period") {
            self.config.bb_period = v as usize;
        }
        if let Some(v) = param_f64(params, "bb_std_dev") {
            self.config.bb_std_dev = v;
        }
        if let Some(v) = param_decimal(params, "take_profit_pct") {
            self.config.take_profit_pct = v;
        }
        if let Some(v) = param_decimal(params, "stop_loss_pct") {
            self.config.stop_loss_pct = v;
        }
        if let Some(v) = param_u64(params, "max_hold_time_secs") {
            self.config.max_hold_time = Duration::from_secs(v);
        }
        if let Some(v) = param_decimal(params, "position_size") {
            self.config.position_size = v;
        }

        if self.config.rsi_oversold >= self.config.rsi_overbought {
            return Err(StrategyError::InvalidParam {
                name: "rsi_oversold",
                reason: "must be below rsi_overbought".to_string(),
            });
        }

        self.price_history = Vec::with_capacity(MAX_HISTORY);
        Ok(())
    }

    fn on_tick(&mut self, state: &MarketState) -> Vec<Signal> {
        if !self.symbol_supported(&state.ticker.symbol) {
            return Vec::new();
        }
        let Some(price) = state.ticker.last.to_f64() else {
            return Vec::new();
        };

        self.push_price(price);

        if self.has_position {
            self.check_exit(state)
        } else {
            self.check_entry(state, price)
        }
    }

    fn on_order_update(&mut self, order: &Order) {
        if order.status != OrderStatus::Filled {
            return;
        }

        if self.has_position {
            // A fill on the opposite side is our exit.
            if Some(order.side) != self.entry_side {
                self.has_position = false;
                self.entry_price = Decimal::ZERO;
                self.entry_time = None;
                self.entry_side = None;
            }
        } else {
            self.has_position = true;
            self.entry_price = order.price;
            self.entry_time = Some(Utc::now());
            self.entry_side = Some(order.side);
        }
    }

    fn on_position_update(&mut self, position: &Position) {
        if position.is_flat() {
            self.has_position = false;
            self.entry_price = Decimal::ZERO;
            self.entry_time = None;
            self.entry_side = None;
        } else {
            self.has_position = true;
            self.entry_price = position.entry_price;
            self.entry_side = Some(position.side);
            if self.entry_time.is_none() {
                self.entry_time = Some(Utc::now());
            }
        }
    }

    fn stop(&mut self) {
        self.price_history.clear();
        self.has_position = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perp_common::market::Ticker;
    use perp_common::types::OrderType;

    fn ticker(symbol: &str, last: Decimal) -> Ticker {
        Ticker {
            symbol: symbol.to_string(),
            bid: last - dec!(1),
            bid_size: dec!(1),
            ask: last + dec!(1),
            ask_size: dec!(1),
            last,
            volume_24h: dec!(1000),
            timestamp: Utc::now(),
        }
    }

    fn filled_order(side: Side, price: Decimal) -> Order {
        Order {
            id: "1".to_string(),
            client_id: "c1".to_string(),
            symbol: "BTC".to_string(),
            side,
            order_type: OrderType::Limit,
            price,
            quantity: dec!(0.001),
            filled_qty: dec!(0.001),
            status: OrderStatus::Filled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn strategy() -> MeanReversionStrategy {
        let mut s = MeanReversionStrategy::new();
        s.init(&toml::value::Table::new()).unwrap();
        s
    }

    #[test]
    fn test_symbol_support() {
        let s = strategy();
        assert!(s.symbol_supported("BTC"));
        assert!(s.symbol_supported("BTC/USDC"));
        assert!(s.symbol_supported("ETH-PERP"));
        assert!(s.symbol_supported("XRPUSDC"));
        assert!(!s.symbol_supported("DOGE"));
    }

    #[test]
    fn test_unsupported_symbol_ignored() {
        let mut s = strategy();
        let state = MarketState::new(ticker("DOGE", dec!(0.1)));
        assert!(s.on_tick(&state).is_empty());
        assert!(s.price_history.is_empty());
    }

    #[test]
    fn test_no_entry_without_enough_history() {
        let mut s = strategy();
        for _ in 0..5 {
            let state = MarketState::new(ticker("BTC", dec!(50000)));
            assert!(s.on_tick(&state).is_empty());
        }
    }

    #[test]
    fn test_history_bounded() {
        let mut s = strategy();
        for _ in 0..250 {
            let state = MarketState::new(ticker("BTC", dec!(50000)));
            s.on_tick(&state);
        }
        assert_eq!(s.price_history.len(), MAX_HISTORY);
    }

    #[test]
    fn test_long_entry_on_oversold_break() {
        let mut s = strategy();
        // Stable prices, then a steep slide far below the lower band.
        for _ in 0..30 {
            s.on_tick(&MarketState::new(ticker("BTC", dec!(50000))));
        }
        let mut signals = Vec::new();
        for i in 1..=10 {
            let price = dec!(50000) - Decimal::from(i * 400);
            signals = s.on_tick(&MarketState::new(ticker("BTC", price)));
            if !signals.is_empty() {
                break;
            }
        }
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Buy);
        assert!(signals[0].reason.contains("Long entry"));
    }

    #[test]
    fn test_short_entry_on_overbought_break() {
        let mut s = strategy();
        for _ in 0..30 {
            s.on_tick(&MarketState::new(ticker("BTC", dec!(50000))));
        }
        let mut signals = Vec::new();
        for i in 1..=10 {
            let price = dec!(50000) + Decimal::from(i * 400);
            signals = s.on_tick(&MarketState::new(ticker("BTC", price)));
            if !signals.is_empty() {
                break;
            }
        }
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Sell);
        assert!(signals[0].reason.contains("Short entry"));
    }

    #[test]
    fn test_take_profit_exit() {
        let mut s = strategy();
        s.on_order_update(&filled_order(Side::Buy, dec!(50000)));
        assert!(s.has_position());

        // +0.5% > 0.4% take profit.
        let state = MarketState::new(ticker("BTC", dec!(50250)));
        let signals = s.on_tick(&state);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Sell);
        assert!(signals[0].reason.contains("Take profit"));
    }

    #[test]
    fn test_stop_loss_exit() {
        let mut s = strategy();
        s.on_order_update(&filled_order(Side::Buy, dec!(50000)));

        // -0.5% < -0.25% stop loss.
        let state = MarketState::new(ticker("BTC", dec!(49750)));
        let signals = s.on_tick(&state);
        assert_eq!(signals.len(), 1);
        assert!(signals[0].reason.contains("Stop loss"));
    }

    #[test]
    fn test_short_exit_directions() {
        let mut s = strategy();
        s.on_order_update(&filled_order(Side::Sell, dec!(50000)));

        // Price fell: short take profit, closed with a buy at the ask.
        let state = MarketState::new(ticker("BTC", dec!(49750)));
        let signals = s.on_tick(&state);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Buy);
        assert!(signals[0].reason.contains("Take profit"));
    }

    #[test]
    fn test_timeout_exit() {
        let mut s = MeanReversionStrategy::with_config(MeanReversionConfig {
            max_hold_time: Duration::from_secs(1),
            ..MeanReversionConfig::default()
        });
        s.init(&toml::value::Table::new()).unwrap();
        s.on_order_update(&filled_order(Side::Buy, dec!(50000)));
        // Backdate the entry past the hold limit.
        s.entry_time = Some(Utc::now() - chrono::Duration::seconds(5));

        // Price within the TP/SL band: only the timeout can fire.
        let state = MarketState::new(ticker("BTC", dec!(50000)));
        let signals = s.on_tick(&state);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Sell);
        assert!(signals[0].reason.contains("Timeout"));
    }

    #[test]
    fn test_exit_fill_clears_position() {
        let mut s = strategy();
        s.on_order_update(&filled_order(Side::Buy, dec!(50000)));
        assert!(s.has_position());

        s.on_order_update(&filled_order(Side::Sell, dec!(50250)));
        assert!(!s.has_position());
        assert_eq!(s.entry_price, Decimal::ZERO);
    }

    #[test]
    fn test_init_rejects_inverted_rsi_bounds() {
        let mut s = MeanReversionStrategy::new();
        let table: toml::value::Table =
            toml::from_str("rsi_oversold = 80.0\nrsi_overbought = 20.0").unwrap();
        assert!(matches!(
            s.init(&table),
            Err(StrategyError::InvalidParam { .. })
        ));
    }

    #[test]
    fn test_stop_releases_buffers() {
        let mut s = strategy();
        for _ in 0..30 {
            s.on_tick(&MarketState::new(ticker("BTC", dec!(50000))));
        }
        s.stop();
        assert!(s.price_history.is_empty());
        assert!(!s.has_position());
    }
}
