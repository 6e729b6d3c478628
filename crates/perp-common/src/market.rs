//! Exchange-facing trading records: tickers, order books, orders, positions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{OrderStatus, OrderType, Side};

/// Market ticker, exchange-agnostic.
///
/// Tickers are continuously overwritten downstream; no history is retained
/// beyond what a strategy buffers itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub bid: Decimal,
    pub bid_size: Decimal,
    pub ask: Decimal,
    pub ask_size: Decimal,
    pub last: Decimal,
    pub volume_24h: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    /// Bid-ask spread.
    #[inline]
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// Mid price.
    #[inline]
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Spread in basis points. Returns zero when the mid is zero.
    pub fn spread_bps(&self) -> Decimal {
        let mid = self.mid();
        if mid.is_zero() {
            return Decimal::ZERO;
        }
        self.spread() / mid * Decimal::new(10_000, 0)
    }
}

/// A single price level in an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl OrderBookLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Order book snapshot, exchange-agnostic.
///
/// Bids are sorted by price descending, asks ascending (best level first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    /// Best bid level, if any.
    #[inline]
    pub fn best_bid(&self) -> Option<&OrderBookLevel> {
        self.bids.first()
    }

    /// Best ask level, if any.
    #[inline]
    pub fn best_ask(&self) -> Option<&OrderBookLevel> {
        self.asks.first()
    }
}

/// OHLCV candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Candle {
    /// High-low range.
    #[inline]
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// Returns true if the candle closed above its open.
    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

/// A trading order, exchange-agnostic.
///
/// Invariants: `0 <= filled_qty <= quantity`; once `Filled`,
/// `filled_qty == quantity`; terminal statuses are never left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned order id (empty until acknowledged).
    pub id: String,
    /// Client-assigned id, set at creation.
    pub client_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_qty: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns true if the order is completely filled.
    #[inline]
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Returns true if the order reached a terminal status.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Unfilled quantity.
    #[inline]
    pub fn remaining_qty(&self) -> Decimal {
        self.quantity - self.filled_qty
    }
}

/// A derivatives position, exchange-agnostic.
///
/// Signed-size convention: `size > 0` long, `size < 0` short, `size == 0`
/// flat. A flat position is equivalent to absence; the record may linger with
/// zero size after a closing fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub leverage: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    #[inline]
    pub fn is_long(&self) -> bool {
        self.size > Decimal::ZERO
    }

    #[inline]
    pub fn is_short(&self) -> bool {
        self.size < Decimal::ZERO
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }

    /// Position notional at the mark price.
    #[inline]
    pub fn notional(&self) -> Decimal {
        self.size.abs() * self.mark_price
    }
}
