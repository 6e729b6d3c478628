//! Simulated exchange for paper sessions and tests.
//!
//! Orders fill immediately at their limit price and are delivered through the
//! order subscription, so the same bot code path runs against paper and live
//! venues. Tickers are injected by the caller via `push_ticker`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use perp_common::market::{Order, OrderBook, Position, Ticker};
use perp_common::types::{OrderStatus, Side};

use super::{ExchangeError, ExchangeGateway, OrderBookHandler, OrderHandler, TickerHandler};

/// In-memory paper venue.
#[derive(Default)]
pub struct SimulatedExchange {
    connected: AtomicBool,
    next_order_id: AtomicU64,

    orders: DashMap<String, Order>,
    positions: DashMap<String, Position>,
    tickers: DashMap<String, Ticker>,
    books: DashMap<String, OrderBook>,

    ticker_handlers: RwLock<HashMap<String, Vec<TickerHandler>>>,
    book_handlers: RwLock<HashMap<String, Vec<OrderBookHandler>>>,
    order_handlers: RwLock<Vec<OrderHandler>>,
}

impl SimulatedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Inject a ticker: stored as the latest and fanned out to subscribers.
    pub fn push_ticker(&self, ticker: Ticker) {
        self.tickers.insert(ticker.symbol.clone(), ticker.clone());
        let handlers = self
            .ticker_handlers
            .read()
            .get(&ticker.symbol)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(ticker.clone());
        }
    }

    /// Inject an order book snapshot.
    pub fn push_order_book(&self, book: OrderBook) {
        self.books.insert(book.symbol.clone(), book.clone());
        let handlers = self
            .book_handlers
            .read()
            .get(&book.symbol)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(book.clone());
        }
    }

    fn notify_order(&self, order: &Order) {
        let handlers = self.order_handlers.read().clone();
        for handler in handlers {
            handler(order.clone());
        }
    }

    /// Track the venue-side position as fills occur, averaging the entry
    /// price on adds.
    fn apply_fill(&self, order: &Order) {
        let signed = match order.side {
            Side::Buy => order.filled_qty,
            Side::Sell => -order.filled_qty,
        };

        let mut entry = self.positions.entry(order.symbol.clone()).or_insert_with(|| Position {
            symbol: order.symbol.clone(),
            side: order.side,
            size: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            mark_price: order.price,
            leverage: Decimal::ONE,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            updated_at: order.updated_at,
        });

        let position = entry.value_mut();
        let same_direction = position.is_flat() || (position.size > Decimal::ZERO) == (signed > Decimal::ZERO);
        if same_direction {
            let old_notional = position.entry_price * position.size.abs();
            let add_notional = order.price * order.filled_qty;
            let new_size = position.size + signed;
            if !new_size.is_zero() {
                position.entry_price = (old_notional + add_notional) / new_size.abs();
            }
            if position.is_flat() {
                position.side = order.side;
            }
            position.size = new_size;
        } else {
            let close_qty = order.filled_qty.min(position.size.abs());
            let mut pnl = (order.price - position.entry_price) * close_qty;
            if position.is_short() {
                pnl = -pnl;
            }
            position.realized_pnl += pnl;
            position.size = if position.is_long() {
                position.size - close_qty
            } else {
                position.size + close_qty
            };
        }
        position.mark_price = order.price;
        position.updated_at = order.updated_at;
    }
}

#[async_trait]
impl ExchangeGateway for SimulatedExchange {
    async fn connect(&self) -> Result<(), ExchangeError> {
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ExchangeError> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    async fn place_order(&self, mut order: Order) -> Result<Order, ExchangeError> {
        if !self.is_connected() {
            return Err(ExchangeError::NotConnected);
        }
        if order.quantity <= Decimal::ZERO {
            return Err(ExchangeError::Rejected("non-positive quantity".to_string()));
        }

        let id = self.next_order_id.fetch_add(1, Ordering::AcqRel) + 1;
        order.id = format!("sim-{}", id);
        order.status = OrderStatus::Filled;
        order.filled_qty = order.quantity;
        order.updated_at = Utc::now();

        self.orders.insert(order.id.clone(), order.clone());
        self.apply_fill(&order);
        self.notify_order(&order);
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExchangeError> {
        let Some(mut order) = self.orders.get_mut(order_id) else {
            return Err(ExchangeError::OrderNotFound(order_id.to_string()));
        };
        if !order.is_terminal() {
            order.status = OrderStatus::Canceled;
            order.updated_at = Utc::now();
            let snapshot = order.value().clone();
            drop(order);
            self.notify_order(&snapshot);
        }
        Ok(())
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        let ids: Vec<String> = self
            .orders
            .iter()
            .filter(|entry| entry.symbol == symbol && !entry.is_terminal())
            .map(|entry| entry.id.clone())
            .collect();
        for id in ids {
            self.cancel_order(&id).await?;
        }
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Order, ExchangeError> {
        self.orders
            .get(order_id)
            .map(|o| o.value().clone())
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<Order>, ExchangeError> {
        Ok(self
            .orders
            .iter()
            .filter(|entry| entry.symbol == symbol && entry.status == OrderStatus::Open)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>, ExchangeError> {
        Ok(self.positions.get(symbol).map(|p| p.value().clone()))
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        self.tickers
            .get(symbol)
            .map(|t| t.value().clone())
            .ok_or_else(|| ExchangeError::Request(format!("no ticker for {}", symbol)))
    }

    async fn get_order_book(
        &self,
        symbol: &str,
        depth: usize,
    ) -> Result<OrderBook, ExchangeError> {
        let mut book = self
            .books
            .get(symbol)
            .map(|b| b.value().clone())
            .ok_or_else(|| ExchangeError::Request(format!("no order book for {}", symbol)))?;
        book.bids.truncate(depth);
        book.asks.truncate(depth);
        Ok(book)
    }

    async fn subscribe_ticker(
        &self,
        symbol: &str,
        handler: TickerHandler,
    ) -> Result<(), ExchangeError> {
        self.ticker_handlers
            .write()
            .entry(symbol.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn subscribe_orderbook(
        &self,
        symbol: &str,
        handler: OrderBookHandler,
    ) -> Result<(), ExchangeError> {
        self.book_handlers
            .write()
            .entry(symbol.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn subscribe_orders(&self, handler: OrderHandler) -> Result<(), ExchangeError> {
        self.order_handlers.write().push(handler);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use perp_common::types::OrderType;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn order(side: Side, price: Decimal, qty: Decimal) -> Order {
        Order {
            id: String::new(),
            client_id: "c1".to_string(),
            symbol: "BTC".to_string(),
            side,
            order_type: OrderType::Limit,
            price,
            quantity: qty,
            filled_qty: Decimal::ZERO,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn ticker(last: Decimal) -> Ticker {
        Ticker {
            symbol: "BTC".to_string(),
            bid: last - dec!(5),
            bid_size: dec!(1),
            ask: last + dec!(5),
            ask_size: dec!(1),
            last,
            volume_24h: dec!(100),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_place_order_requires_connection() {
        let exchange = SimulatedExchange::new();
        let err = exchange
            .place_order(order(Side::Buy, dec!(50000), dec!(0.01)))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::NotConnected));
    }

    #[tokio::test]
    async fn test_orders_fill_and_notify() {
        let exchange = SimulatedExchange::new();
        exchange.connect().await.unwrap();

        let fills: Arc<Mutex<Vec<Order>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = fills.clone();
        exchange
            .subscribe_orders(Arc::new(move |o| sink.lock().push(o)))
            .await
            .unwrap();

        let placed = exchange
            .place_order(order(Side::Buy, dec!(50000), dec!(0.01)))
            .await
            .unwrap();
        assert_eq!(placed.status, OrderStatus::Filled);
        assert_eq!(placed.filled_qty, dec!(0.01));
        assert!(placed.id.starts_with("sim-"));

        let fills = fills.lock();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].id, placed.id);
    }

    #[tokio::test]
    async fn test_position_tracking_with_average_entry() {
        let exchange = SimulatedExchange::new();
        exchange.connect().await.unwrap();

        exchange
            .place_order(order(Side::Buy, dec!(50000), dec!(0.01)))
            .await
            .unwrap();
        exchange
            .place_order(order(Side::Buy, dec!(51000), dec!(0.01)))
            .await
            .unwrap();

        let position = exchange.get_position("BTC").await.unwrap().unwrap();
        assert_eq!(position.size, dec!(0.02));
        assert_eq!(position.entry_price, dec!(50500));

        // Closing sell realizes PnL and flattens.
        exchange
            .place_order(order(Side::Sell, dec!(52000), dec!(0.02)))
            .await
            .unwrap();
        let position = exchange.get_position("BTC").await.unwrap().unwrap();
        assert!(position.is_flat());
        assert_eq!(position.realized_pnl, dec!(30));
    }

    #[tokio::test]
    async fn test_push_ticker_delivers_to_subscribers() {
        let exchange = SimulatedExchange::new();
        let seen: Arc<Mutex<Vec<Ticker>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        exchange
            .subscribe_ticker("BTC", Arc::new(move |t| sink.lock().push(t)))
            .await
            .unwrap();

        exchange.push_ticker(ticker(dec!(50000)));
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(
            exchange.get_ticker("BTC").await.unwrap().last,
            dec!(50000)
        );
    }

    #[tokio::test]
    async fn test_order_book_snapshots() {
        use perp_common::market::{OrderBook, OrderBookLevel};

        let exchange = SimulatedExchange::new();
        let seen: Arc<Mutex<Vec<OrderBook>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        exchange
            .subscribe_orderbook("BTC", Arc::new(move |b| sink.lock().push(b)))
            .await
            .unwrap();

        exchange.push_order_book(OrderBook {
            symbol: "BTC".to_string(),
            bids: vec![
                OrderBookLevel::new(dec!(49990), dec!(1)),
                OrderBookLevel::new(dec!(49980), dec!(2)),
                OrderBookLevel::new(dec!(49970), dec!(3)),
            ],
            asks: vec![OrderBookLevel::new(dec!(50010), dec!(1))],
            timestamp: Utc::now(),
        });

        assert_eq!(seen.lock().len(), 1);
        let book = exchange.get_order_book("BTC", 2).await.unwrap();
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.best_bid().unwrap().price, dec!(49990));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_quantity() {
        let exchange = SimulatedExchange::new();
        exchange.connect().await.unwrap();
        let err = exchange
            .place_order(order(Side::Buy, dec!(50000), Decimal::ZERO))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Rejected(_)));
    }
}
