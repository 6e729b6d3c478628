//! Shared counters for observability.
//!
//! Plain atomics so the dispatcher can record events without locking.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters maintained by the dispatcher.
#[derive(Debug, Default)]
pub struct BotMetrics {
    pub ticks_processed: AtomicU64,
    pub signals_emitted: AtomicU64,
    pub orders_placed: AtomicU64,
    pub orders_failed: AtomicU64,
    pub risk_denials: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks_processed: u64,
    pub signals_emitted: u64,
    pub orders_placed: u64,
    pub orders_failed: u64,
    pub risk_denials: u64,
}

impl BotMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_tick(&self) {
        self.ticks_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_signal(&self) {
        self.signals_emitted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_order_placed(&self) {
        self.orders_placed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_order_failed(&self) {
        self.orders_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_risk_denial(&self) {
        self.risk_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_processed: self.ticks_processed.load(Ordering::Relaxed),
            signals_emitted: self.signals_emitted.load(Ordering::Relaxed),
            orders_placed: self.orders_placed.load(Ordering::Relaxed),
            orders_failed: self.orders_failed.load(Ordering::Relaxed),
            risk_denials: self.risk_denials.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = BotMetrics::new();
        metrics.record_tick();
        metrics.record_tick();
        metrics.record_signal();
        metrics.record_order_placed();
        metrics.record_risk_denial();

        let snap = metrics.snapshot();
        assert_eq!(snap.ticks_processed, 2);
        assert_eq!(snap.signals_emitted, 1);
        assert_eq!(snap.orders_placed, 1);
        assert_eq!(snap.orders_failed, 0);
        assert_eq!(snap.risk_denials, 1);
    }
}
