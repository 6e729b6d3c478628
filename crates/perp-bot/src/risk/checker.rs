//! Pre-trade risk checks and loss accounting.
//!
//! The checker is consulted before order emission and fed realized PnL after
//! fills. All mutable state sits behind a single `RwLock`, so `record_trade`
//! calls are linearizable: two concurrent calls produce the same final
//! `daily_pnl` regardless of interleaving. Checks take the read lock only.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Risk configuration.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Maximum order quantity accepted by `check_size`.
    pub max_position_size: Decimal,
    /// Daily loss threshold as a signed fraction; trading stops once
    /// `daily_pnl` falls below its negation.
    pub max_daily_loss: Decimal,
    /// Consecutive losing trades before a cooldown is imposed.
    pub max_consecutive_losses: u32,
    /// Length of the imposed cooldown.
    pub cooldown_duration: Duration,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: Decimal::ONE,
            max_daily_loss: dec!(0.05),
            max_consecutive_losses: 3,
            cooldown_duration: Duration::from_secs(5 * 60),
        }
    }
}

/// Outcome of a risk check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskDecision {
    /// Trade may proceed.
    Approved,
    /// Trade is blocked.
    Denied { reason: String },
}

impl RiskDecision {
    pub fn denied(reason: impl Into<String>) -> Self {
        RiskDecision::Denied {
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskDecision::Approved)
    }
}

impl std::fmt::Display for RiskDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskDecision::Approved => write!(f, "approved"),
            RiskDecision::Denied { reason } => write!(f, "denied: {}", reason),
        }
    }
}

/// Point-in-time view of the risk state, for logging and monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct RiskStatus {
    pub halted: bool,
    pub halt_reason: Option<String>,
    pub daily_pnl: Decimal,
    pub consecutive_losses: u32,
    pub in_cooldown: bool,
    pub cooldown_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct RiskState {
    daily_pnl: Decimal,
    consecutive_losses: u32,
    cooldown_until: Option<DateTime<Utc>>,
    halted: bool,
    halt_reason: Option<String>,
}

/// Stateful pre-trade gate.
#[derive(Debug)]
pub struct RiskChecker {
    config: RiskConfig,
    state: RwLock<RiskState>,
}

impl RiskChecker {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            state: RwLock::new(RiskState::default()),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Check whether any trade is currently allowed.
    ///
    /// Denies while halted, during an imposed cooldown, and after the daily
    /// loss limit is breached.
    pub fn can_trade(&self) -> RiskDecision {
        let state = self.state.read();

        if state.halted {
            let reason = state.halt_reason.as_deref().unwrap_or("unspecified");
            return RiskDecision::denied(format!("trading halted: {}", reason));
        }

        if let Some(until) = state.cooldown_until {
            if Utc::now() < until {
                return RiskDecision::denied(format!("in cooldown until {}", until.to_rfc3339()));
            }
        }

        if state.daily_pnl < -self.config.max_daily_loss {
            return RiskDecision::denied("daily loss limit exceeded");
        }

        RiskDecision::Approved
    }

    /// Validate an order quantity against the position size cap.
    pub fn check_size(&self, quantity: Decimal) -> RiskDecision {
        if quantity > self.config.max_position_size {
            return RiskDecision::denied(format!(
                "position size {} exceeds maximum {}",
                quantity, self.config.max_position_size
            ));
        }
        RiskDecision::Approved
    }

    /// Record a realized trade result.
    ///
    /// A loss increments the consecutive-loss counter; reaching the limit
    /// imposes a cooldown and resets the counter. Any non-negative result
    /// resets the counter.
    pub fn record_trade(&self, pnl: Decimal) {
        let mut state = self.state.write();
        state.daily_pnl += pnl;

        if pnl < Decimal::ZERO {
            state.consecutive_losses += 1;
            if state.consecutive_losses >= self.config.max_consecutive_losses {
                let until = Utc::now()
                    + chrono::Duration::from_std(self.config.cooldown_duration)
                        .unwrap_or(chrono::TimeDelta::MAX);
                state.cooldown_until = Some(until);
                state.consecutive_losses = 0;
                warn!(
                    cooldown_until = %until.to_rfc3339(),
                    "Consecutive loss limit reached, imposing cooldown"
                );
            }
        } else {
            state.consecutive_losses = 0;
        }
    }

    /// Hard stop. Every subsequent `can_trade` is denied until `resume`.
    pub fn halt(&self, reason: impl Into<String>) {
        let mut state = self.state.write();
        state.halted = true;
        state.halt_reason = Some(reason.into());
    }

    /// Clear the halt flag and the consecutive-loss counter.
    pub fn resume(&self) {
        let mut state = self.state.write();
        state.halted = false;
        state.halt_reason = None;
        state.consecutive_losses = 0;
    }

    /// Zero the daily PnL. Intended caller: a once-per-day scheduler.
    pub fn reset_daily(&self) {
        self.state.write().daily_pnl = Decimal::ZERO;
    }

    /// Snapshot of the current state.
    pub fn status(&self) -> RiskStatus {
        let state = self.state.read();
        RiskStatus {
            halted: state.halted,
            halt_reason: state.halt_reason.clone(),
            daily_pnl: state.daily_pnl,
            consecutive_losses: state.consecutive_losses,
            in_cooldown: state
                .cooldown_until
                .is_some_and(|until| Utc::now() < until),
            cooldown_until: state.cooldown_until,
        }
    }
}

impl Default for RiskChecker {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}
