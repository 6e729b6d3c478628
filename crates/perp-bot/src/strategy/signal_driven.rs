//! Signal-driven strategy: position lifecycle state machine over the fused
//! market signal.
//!
//! Entries require the fused signal to clear strength and confidence
//! thresholds; position size scales with both. Exits are evaluated in strict
//! priority order: take-profit, stop-loss, trailing stop, signal reversal.
//! Proposed transitions only become state when a position update confirms the
//! fill.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use perp_common::market::{Order, Position};
use perp_common::records::WhaleAlert;
use perp_common::signal::MarketSignal;
use perp_common::types::{OrderStatus, Side, SignalBias};

use super::{
    param_bool, param_decimal, param_f64, param_u64, MarketState, Signal, Strategy, StrategyError,
};

/// Configuration for the signal-driven strategy.
#[derive(Debug, Clone)]
pub struct SignalStrategyConfig {
    /// Maximum position size in USD.
    pub max_position_size: Decimal,
    /// Position size is floored to a multiple of this step.
    pub position_size_step: Decimal,
    /// Minimum fused signal strength to enter, in [0, 1].
    pub min_signal_strength: f64,
    /// Minimum fused signal confidence to enter, in [0, 1].
    pub min_confidence: f64,
    /// Take-profit threshold as a fraction of entry price.
    pub take_profit_percent: Decimal,
    /// Stop-loss threshold as a fraction of entry price.
    pub stop_loss_percent: Decimal,
    /// Enable the trailing stop exit.
    pub trailing_stop: bool,
    /// Trailing drawdown threshold from the running extremum.
    pub trailing_percent: Decimal,
    /// After a losing run, no entries until this much time has passed since
    /// the last trade.
    pub cooldown_period: Duration,

    // Per-source fusion weights, reserved for future weighted scoring.
    pub weight_derivatives: f64,
    pub weight_whale: f64,
    pub weight_sentiment: f64,
    pub weight_macro: f64,
}

impl Default for SignalStrategyConfig {
    fn default() -> Self {
        Self {
            max_position_size: dec!(1000),
            position_size_step: dec!(100),
            min_signal_strength: 0.3,
            min_confidence: 0.4,
            take_profit_percent: dec!(0.02),
            stop_loss_percent: dec!(0.01),
            trailing_stop: true,
            trailing_percent: dec!(0.005),
            cooldown_period: Duration::from_secs(30 * 60),
            weight_derivatives: 0.30,
            weight_whale: 0.20,
            weight_sentiment: 0.25,
            weight_macro: 0.25,
        }
    }
}

/// Performance snapshot for monitoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategyStats {
    pub total_pnl: Decimal,
    pub peak_equity: Decimal,
    /// Current drawdown from peak equity, zero when peak is non-positive.
    pub drawdown: Decimal,
    pub running: bool,
}

/// State machine: FLAT -> LONG/SHORT on confirmed fills, back to FLAT on
/// confirmed exits.
#[derive(Debug)]
pub struct SignalStrategy {
    config: SignalStrategyConfig,
    running: bool,

    entry_price: Decimal,
    entry_side: Option<Side>,
    /// Running best price since entry: highest for longs, lowest for shorts.
    highest_price: Decimal,
    last_signal: Option<Arc<MarketSignal>>,
    last_trade_time: Option<DateTime<Utc>>,
    total_pnl: Decimal,
    peak_equity: Decimal,
}

impl SignalStrategy {
    pub fn new() -> Self {
        Self::with_config(SignalStrategyConfig::default())
    }

    pub fn with_config(config: SignalStrategyConfig) -> Self {
        Self {
            config,
            running: false,
            entry_price: Decimal::ZERO,
            entry_side: None,
            highest_price: Decimal::ZERO,
            last_signal: None,
            last_trade_time: None,
            total_pnl: Decimal::ZERO,
            peak_equity: Decimal::ZERO,
        }
    }

    pub fn config(&self) -> &SignalStrategyConfig {
        &self.config
    }

    pub fn stats(&self) -> StrategyStats {
        let drawdown = if self.peak_equity > Decimal::ZERO {
            (self.peak_equity - self.total_pnl) / self.peak_equity
        } else {
            Decimal::ZERO
        };
        StrategyStats {
            total_pnl: self.total_pnl,
            peak_equity: self.peak_equity,
            drawdown,
            running: self.running,
        }
    }

    fn in_cooldown(&self) -> bool {
        if self.total_pnl >= Decimal::ZERO {
            return false;
        }
        let Some(last_trade) = self.last_trade_time else {
            return false;
        };
        let cooldown = chrono::Duration::from_std(self.config.cooldown_period)
            .unwrap_or(chrono::TimeDelta::MAX);
        Utc::now().signed_duration_since(last_trade) < cooldown
    }

    /// Size an entry from signal strength and confidence, floored to the
    /// configured step and capped at the maximum.
    fn position_size(&self, signal: &MarketSignal) -> Decimal {
        let scale =
            Decimal::from_f64(signal.strength * signal.confidence).unwrap_or(Decimal::ZERO);
        let base = self.config.max_position_size * scale;
        if self.config.position_size_step <= Decimal::ZERO {
            return base.min(self.config.max_position_size);
        }
        let steps = (base / self.config.position_size_step).floor();
        (steps * self.config.position_size_step).min(self.config.max_position_size)
    }

    fn evaluate_entry(&self, state: &MarketState, price: Decimal) -> Option<Signal> {
        let signal = self.last_signal.as_ref()?;

        if signal.strength < self.config.min_signal_strength {
            return None;
        }
        if signal.confidence < self.config.min_confidence {
            return None;
        }

        let size = self.position_size(signal);
        if size <= Decimal::ZERO {
            return None;
        }

        let (side, direction) = match signal.bias {
            SignalBias::Bullish => (Side::Buy, "LONG"),
            SignalBias::Bearish => (Side::Sell, "SHORT"),
            SignalBias::Neutral => return None,
        };

        Some(Signal {
            symbol: state.ticker.symbol.clone(),
            side,
            price,
            quantity: size / price,
            reason: entry_reason(signal, direction),
        })
    }

    fn manage_position(&mut self, state: &MarketState, price: Decimal) -> Vec<Signal> {
        let Some(position) = &state.position else {
            return Vec::new();
        };
        if position.is_flat() {
            return Vec::new();
        }

        let is_long = position.is_long();
        let entry_price = position.entry_price;
        if entry_price <= Decimal::ZERO {
            return Vec::new();
        }

        // Track the best price seen since entry.
        if is_long && price > self.highest_price {
            self.highest_price = price;
        } else if !is_long && (self.highest_price.is_zero() || price < self.highest_price) {
            self.highest_price = price;
        }

        let pnl_pct = if is_long {
            (price - entry_price) / entry_price
        } else {
            (entry_price - price) / entry_price
        };

        if pnl_pct >= self.config.take_profit_percent {
            return vec![exit_signal(
                state,
                position,
                price,
                format!("Take Profit: {}% gain", pct(pnl_pct)),
            )];
        }

        if pnl_pct <= -self.config.stop_loss_percent {
            return vec![exit_signal(
                state,
                position,
                price,
                format!("Stop Loss: {}% loss", pct(pnl_pct)),
            )];
        }

        if self.config.trailing_stop && !self.highest_price.is_zero() {
            let trailing_pnl = if is_long {
                (price - self.highest_price) / self.highest_price
            } else {
                (self.highest_price - price) / self.highest_price
            };
            if trailing_pnl <= -self.config.trailing_percent {
                return vec![exit_signal(
                    state,
                    position,
                    price,
                    format!("Trailing Stop: {}% from high", pct(trailing_pnl)),
                )];
            }
        }

        if let Some(signal) = &self.last_signal {
            if signal.strength > 0.5 {
                if is_long && signal.bias == SignalBias::Bearish {
                    return vec![exit_signal(
                        state,
                        position,
                        price,
                        "Signal Reversal: strong bearish signal".to_string(),
                    )];
                }
                if !is_long && signal.bias == SignalBias::Bullish {
                    return vec![exit_signal(
                        state,
                        position,
                        price,
                        "Signal Reversal: strong bullish signal".to_string(),
                    )];
                }
            }
        }

        Vec::new()
    }
}

impl Default for SignalStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for SignalStrategy {
    fn name(&self) -> &'static str {
        "signal"
    }

    fn init(&mut self, params: &toml::value::Table) -> Result<(), StrategyError> {
        if let Some(v) = param_decimal(params, "max_position_size") {
            self.config.max_position_size = v;
        }
        if let Some(v) = param_decimal(params, "position_size_step") {
            self.config.position_size_step = v;
        }
        if let Some(v) = param_f64(params, "min_signal_strength") {
            if !(0.0..=1.0).contains(&v) {
                return Err(StrategyError::InvalidParam {
                    name: "min_signal_strength",
                    reason: format!("{} is outside [0, 1]", v),
                });
            }
            self.config.min_signal_strength = v;
        }
        if let Some(v) = param_f64(params, "min_confidence") {
            if !(0.0..=1.0).contains(&v) {
                return Err(StrategyError::InvalidParam {
                    name: "min_confidence",
                    reason: format!("{} is outside [0, 1]", v),
                });
            }
            self.config.min_confidence = v;
        }
        if let Some(v) = param_decimal(params, "take_profit_percent") {
            self.config.take_profit_percent = v;
        }
        if let Some(v) = param_decimal(params, "stop_loss_percent") {
            self.config.stop_loss_percent = v;
        }
        if let Some(v) = param_bool(params, "trailing_stop") {
            self.config.trailing_stop = v;
        }
        if let Some(v) = param_decimal(params, "trailing_percent") {
            self.config.trailing_percent = v;
        }
        if let Some(v) = param_u64(params, "cooldown_secs") {
            self.config.cooldown_period = Duration::from_secs(v);
        }

        self.running = true;
        Ok(())
    }

    fn on_tick(&mut self, state: &MarketState) -> Vec<Signal> {
        if !self.running {
            return Vec::new();
        }

        if let Some(signal) = &state.market_signal {
            self.last_signal = Some(signal.clone());
        }

        if self.in_cooldown() {
            return Vec::new();
        }

        let price = state.ticker.last;
        if price <= Decimal::ZERO {
            return Vec::new();
        }

        if state.has_position() {
            self.manage_position(state, price)
        } else {
            self.evaluate_entry(state, price).into_iter().collect()
        }
    }

    fn on_order_update(&mut self, order: &Order) {
        if order.status != OrderStatus::Filled {
            return;
        }

        self.last_trade_time = Some(Utc::now());

        // A fill opposing the held side realizes PnL.
        if let Some(entry_side) = self.entry_side {
            if order.side != entry_side && self.entry_price > Decimal::ZERO {
                let mut pnl = (order.price - self.entry_price) * order.filled_qty;
                if entry_side == Side::Sell {
                    pnl = -pnl;
                }
                self.total_pnl += pnl;
                if self.total_pnl > self.peak_equity {
                    self.peak_equity = self.total_pnl;
                }
            }
        }
    }

    fn on_position_update(&mut self, position: &Position) {
        if position.is_flat() {
            self.entry_price = Decimal::ZERO;
            self.highest_price = Decimal::ZERO;
            self.entry_side = None;
        } else {
            self.entry_price = position.entry_price;
            self.highest_price = position.entry_price;
            self.entry_side = Some(position.side);
        }
    }

    fn stop(&mut self) {
        self.running = false;
        self.last_signal = None;
    }
}

fn exit_signal(state: &MarketState, position: &Position, price: Decimal, reason: String) -> Signal {
    let side = if position.is_long() {
        Side::Sell
    } else {
        Side::Buy
    };
    Signal {
        symbol: state.ticker.symbol.clone(),
        side,
        price,
        quantity: position.size.abs(),
        reason: format!("EXIT: {}", reason),
    }
}

fn entry_reason(signal: &MarketSignal, direction: &str) -> String {
    let mut parts = vec![format!(
        "{} entry | strength {:.0}% confidence {:.0}%",
        direction,
        signal.strength * 100.0,
        signal.confidence * 100.0
    )];

    if let Some(fr) = &signal.funding_rate {
        let pressure = if fr.rate > 0.0 { "bearish" } else { "bullish" };
        parts.push(format!("funding {:.4}% ({})", fr.rate * 100.0, pressure));
    }
    if let Some(lsr) = &signal.long_short_ratio {
        parts.push(format!("l/s ratio {:.2}", lsr.ratio));
    }
    if !signal.recent_whale_alerts.is_empty() {
        let (inflow, outflow) = WhaleAlert::net_flows(&signal.recent_whale_alerts);
        parts.push(format!("whales ${} in / ${} out", inflow, outflow));
    }
    if let Some(sentiment) = &signal.social_sentiment {
        parts.push(format!("sentiment {:.2}", sentiment.sentiment_score));
    }
    if let (Some(cut), Some(hike)) = (signal.fed_cut_prob, signal.fed_hike_prob) {
        parts.push(format!(
            "fed cut {:.0}% / hike {:.0}%",
            cut * 100.0,
            hike * 100.0
        ));
    }

    parts.join(" | ")
}

/// Format a fractional Decimal as a percentage rounded to two places.
fn pct(fraction: Decimal) -> Decimal {
    (fraction * dec!(100)).round_dp(2)
}
