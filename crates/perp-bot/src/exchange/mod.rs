//! Exchange gateway abstraction.
//!
//! The bot talks to a venue only through `ExchangeGateway`. Real vendor
//! adapters (HTTP/WebSocket wire handling) live outside the core; the
//! in-crate `SimulatedExchange` provides a paper venue for dry-run sessions
//! and tests.
//!
//! Subscription handlers are invoked from the gateway's own task and must be
//! thread-safe; the bot forwards them into its event channel immediately.

pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use perp_common::market::{Order, OrderBook, Position, Ticker};

pub use simulated::SimulatedExchange;

/// Errors surfaced by exchange gateways.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Request failed: {0}")]
    Request(String),
}

/// Handler for ticker updates, invoked from the gateway's task.
pub type TickerHandler = Arc<dyn Fn(Ticker) + Send + Sync>;

/// Handler for order book updates.
pub type OrderBookHandler = Arc<dyn Fn(OrderBook) + Send + Sync>;

/// Handler for order status updates.
pub type OrderHandler = Arc<dyn Fn(Order) + Send + Sync>;

/// Venue contract consumed by the dispatcher.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn connect(&self) -> Result<(), ExchangeError>;
    async fn disconnect(&self) -> Result<(), ExchangeError>;

    /// Submit an order. Returns the order with its exchange-assigned id and
    /// current status.
    async fn place_order(&self, order: Order) -> Result<Order, ExchangeError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError>;
    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError>;

    async fn get_order(&self, order_id: &str) -> Result<Order, ExchangeError>;
    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<Order>, ExchangeError>;
    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, ExchangeError>;
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;
    async fn get_order_book(&self, symbol: &str, depth: usize)
        -> Result<OrderBook, ExchangeError>;

    async fn subscribe_ticker(
        &self,
        symbol: &str,
        handler: TickerHandler,
    ) -> Result<(), ExchangeError>;

    async fn subscribe_orderbook(
        &self,
        symbol: &str,
        handler: OrderBookHandler,
    ) -> Result<(), ExchangeError>;

    async fn subscribe_orders(&self, handler: OrderHandler) -> Result<(), ExchangeError>;
}
