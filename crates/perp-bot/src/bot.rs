//! The trading bot: event dispatcher sequencing ticks, signals, and order
//! updates into the strategy -> risk -> exchange pipeline.
//!
//! ## Ordering
//!
//! Ticker updates, order updates, and fused-signal broadcasts arrive from
//! distinct upstream tasks. All of them are funneled through one event
//! channel consumed by a single run task, so strategy invocations and
//! `(position, orders)` mutations are fully serialized. Snapshots for the
//! strategy are taken under a brief read lock; the strategy itself runs under
//! a short mutex and never across an await point.
//!
//! ## Modes
//!
//! Dry-run never touches the exchange's order path: orders are synthesized as
//! immediately filled and fed back through the same order-update handling.
//! Live mode submits through the gateway; a submission failure records a
//! small-loss sentinel (-0.001) so consecutive-loss accounting still
//! advances.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use perp_common::market::{Order, Position, Ticker};
use perp_common::signal::MarketSignal;
use perp_common::types::{OrderStatus, OrderType, Side};

use crate::exchange::{ExchangeError, ExchangeGateway};
use crate::risk::RiskChecker;
use crate::signal::SignalHandler;
use crate::state::{BotMetrics, MetricsSnapshot};
use crate::strategy::{MarketState, Signal, Strategy, StrategyError};

/// Grace period for the run task to drain on stop.
const STOP_GRACE: Duration = Duration::from_secs(30);

/// Small-loss sentinel recorded on live order submission failure.
const ORDER_FAILURE_SENTINEL: Decimal = dec!(-0.001);

/// Bot lifecycle errors.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Bot is already running")]
    AlreadyRunning,

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),
}

/// Events consumed by the run task.
enum BotEvent {
    Tick(Ticker),
    OrderUpdate(Order),
    Signal(MarketSignal),
    Shutdown,
}

#[derive(Default)]
struct DispatchState {
    running: bool,
    position: Option<Position>,
    orders: Vec<Order>,
    latest_signal: Option<Arc<MarketSignal>>,
}

/// Orchestrates one symbol: subscriptions, strategy, risk gate, execution.
///
/// Cheap to clone; clones share the strategy, dispatcher state, and metrics,
/// so subscription handlers and the run task hold their own handle.
#[derive(Clone)]
pub struct TradingBot {
    exchange: Arc<dyn ExchangeGateway>,
    strategy: Arc<Mutex<Box<dyn Strategy>>>,
    risk: Arc<RiskChecker>,
    metrics: Arc<BotMetrics>,
    symbol: String,
    dry_run: bool,
    strategy_params: toml::value::Table,

    state: Arc<RwLock<DispatchState>>,
    events: Arc<Mutex<Option<mpsc::UnboundedSender<BotEvent>>>>,
    run_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TradingBot {
    pub fn new(
        exchange: Arc<dyn ExchangeGateway>,
        strategy: Box<dyn Strategy>,
        risk: Arc<RiskChecker>,
        symbol: impl Into<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            exchange,
            strategy: Arc::new(Mutex::new(strategy)),
            risk,
            metrics: Arc::new(BotMetrics::new()),
            symbol: symbol.into(),
            dry_run,
            strategy_params: toml::value::Table::new(),
            state: Arc::new(RwLock::new(DispatchState::default())),
            events: Arc::new(Mutex::new(None)),
            run_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Loose strategy options forwarded to `Strategy::init` on start.
    pub fn with_strategy_params(mut self, params: toml::value::Table) -> Self {
        self.strategy_params = params;
        self
    }

    pub fn is_running(&self) -> bool {
        self.state.read().running
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Current position snapshot (None when flat since inception).
    pub fn position(&self) -> Option<Position> {
        self.state.read().position.clone()
    }

    /// Tracked orders snapshot.
    pub fn orders(&self) -> Vec<Order> {
        self.state.read().orders.clone()
    }

    /// Handler to register with the signal provider. Forwards fused signals
    /// for this bot's symbol into the event channel.
    pub fn signal_handler(&self) -> SignalHandler {
        let bot = self.clone();
        Arc::new(move |signal: &MarketSignal| {
            if signal.symbol != bot.symbol {
                return;
            }
            let sender = bot.events.lock().clone();
            if let Some(sender) = sender {
                let _ = sender.send(BotEvent::Signal(signal.clone()));
            }
        })
    }

    /// Initialize the strategy, connect the exchange, subscribe to market
    /// data, and spawn the run task.
    ///
    /// Returns `AlreadyRunning` when called on a running bot, leaving its
    /// state untouched.
    pub async fn start(&self) -> Result<(), BotError> {
        {
            let mut state = self.state.write();
            if state.running {
                return Err(BotError::AlreadyRunning);
            }
            state.running = true;
        }

        if let Err(e) = self.strategy.lock().init(&self.strategy_params) {
            self.state.write().running = false;
            return Err(e.into());
        }

        if let Err(e) = self.exchange.connect().await {
            self.state.write().running = false;
            return Err(e.into());
        }

        let (sender, mut receiver) = mpsc::unbounded_channel();
        *self.events.lock() = Some(sender.clone());

        let tick_sender = sender.clone();
        self.exchange
            .subscribe_ticker(
                &self.symbol,
                Arc::new(move |ticker| {
                    let _ = tick_sender.send(BotEvent::Tick(ticker));
                }),
            )
            .await?;

        let order_sender = sender.clone();
        self.exchange
            .subscribe_orders(Arc::new(move |order| {
                let _ = order_sender.send(BotEvent::OrderUpdate(order));
            }))
            .await?;

        let bot = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match event {
                    BotEvent::Shutdown => break,
                    other => bot.handle_event(other).await,
                }
            }
        });
        *self.run_task.lock() = Some(handle);

        info!(
            symbol = %self.symbol,
            strategy = self.strategy.lock().name(),
            dry_run = self.dry_run,
            "Bot started"
        );
        Ok(())
    }

    /// Stop the strategy, cancel open orders (live mode), and disconnect.
    ///
    /// Waits up to a bounded grace period for the run task to drain. A stop
    /// on a non-running bot is a no-op.
    pub async fn stop(&self) -> Result<(), BotError> {
        {
            let mut state = self.state.write();
            if !state.running {
                return Ok(());
            }
            state.running = false;
        }

        self.strategy.lock().stop();

        if !self.dry_run {
            if let Err(e) = self.exchange.cancel_all_orders(&self.symbol).await {
                error!("Failed to cancel open orders: {}", e);
            }
        }

        if let Some(sender) = self.events.lock().take() {
            let _ = sender.send(BotEvent::Shutdown);
        }
        let handle = self.run_task.lock().take();
        if let Some(handle) = handle {
            if tokio::time::timeout(STOP_GRACE, handle).await.is_err() {
                warn!("Run task did not drain within grace period");
            }
        }

        if let Err(e) = self.exchange.disconnect().await {
            error!("Failed to disconnect exchange: {}", e);
        }

        info!(metrics = ?self.metrics.snapshot(), "Bot stopped");
        Ok(())
    }

    async fn handle_event(&self, event: BotEvent) {
        match event {
            BotEvent::Tick(ticker) => self.handle_tick(ticker).await,
            BotEvent::OrderUpdate(order) => self.handle_order_update(order),
            BotEvent::Signal(signal) => {
                self.state.write().latest_signal = Some(Arc::new(signal));
            }
            BotEvent::Shutdown => {}
        }
    }

    async fn handle_tick(&self, ticker: Ticker) {
        self.metrics.record_tick();

        let (running, position, orders, latest_signal) = {
            let state = self.state.read();
            (
                state.running,
                state.position.clone(),
                state.orders.clone(),
                state.latest_signal.clone(),
            )
        };
        if !running {
            return;
        }

        let mut market_state = MarketState::new(ticker);
        market_state.position = position;
        market_state.orders = orders;
        market_state.market_signal = latest_signal;

        // Strategy runs under its own lock, outside the state lock and off
        // the await path.
        let signals = {
            let mut strategy = self.strategy.lock();
            strategy.on_tick(&market_state)
        };

        for signal in signals {
            self.metrics.record_signal();
            self.process_signal(signal).await;
        }
    }

    async fn process_signal(&self, signal: Signal) {
        info!(
            symbol = %signal.symbol,
            side = %signal.side,
            price = %signal.price,
            quantity = %signal.quantity,
            reason = %signal.reason,
            "Trade signal"
        );

        let decision = self.risk.can_trade();
        if !decision.is_approved() {
            warn!("Risk check failed: {}", decision);
            self.metrics.record_risk_denial();
            return;
        }

        let size_check = self.risk.check_size(signal.quantity);
        if !size_check.is_approved() {
            warn!("Position size check failed: {}", size_check);
            self.metrics.record_risk_denial();
            return;
        }

        self.execute_order(signal).await;
    }

    async fn execute_order(&self, signal: Signal) {
        let now = Utc::now();
        let mut order = Order {
            id: String::new(),
            client_id: Uuid::new_v4().to_string(),
            symbol: signal.symbol,
            side: signal.side,
            order_type: OrderType::Limit,
            price: signal.price,
            quantity: signal.quantity,
            filled_qty: Decimal::ZERO,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        if self.dry_run {
            // Synthesize an immediate fill; the exchange is never contacted.
            order.id = format!("dry-{}", order.client_id);
            order.status = OrderStatus::Filled;
            order.filled_qty = order.quantity;
            order.updated_at = Utc::now();
            info!(
                side = %order.side,
                price = %order.price,
                quantity = %order.quantity,
                "[dry-run] Order filled"
            );
            self.metrics.record_order_placed();
            self.handle_order_update(order);
            return;
        }

        match self.exchange.place_order(order).await {
            Ok(placed) => {
                info!(id = %placed.id, status = %placed.status, "Order placed");
                self.metrics.record_order_placed();
            }
            Err(e) => {
                error!("Failed to place order: {}", e);
                self.risk.record_trade(ORDER_FAILURE_SENTINEL);
                self.metrics.record_order_failed();
            }
        }
    }

    /// Merge an order update into the tracked slice, notify the strategy, and
    /// run fill accounting. Invoked only from the run task, so mutations are
    /// serialized with tick handling.
    fn handle_order_update(&self, order: Order) {
        {
            let mut state = self.state.write();
            if let Some(existing) = state.orders.iter_mut().find(|o| o.id == order.id) {
                *existing = order.clone();
            } else if order.status == OrderStatus::Open {
                state.orders.push(order.clone());
            }
        }

        self.strategy.lock().on_order_update(&order);

        if order.status == OrderStatus::Filled {
            self.apply_fill(&order);
        }
    }

    /// Derive the tracked position from a fill. An entry fill opens or adds
    /// to the position with a weighted-average entry price; an opposing fill
    /// realizes PnL, records it to the risk gate, and reduces toward flat.
    fn apply_fill(&self, order: &Order) {
        let fill_qty = order.filled_qty;
        if fill_qty <= Decimal::ZERO {
            return;
        }

        let signed = match order.side {
            Side::Buy => fill_qty,
            Side::Sell => -fill_qty,
        };

        let mut realized: Option<Decimal> = None;
        let position_update = {
            let mut state = self.state.write();
            match &mut state.position {
                Some(position) if !position.is_flat() => {
                    let same_direction = (position.size > Decimal::ZERO) == (signed > Decimal::ZERO);
                    if same_direction {
                        let old_notional = position.entry_price * position.size.abs();
                        let add_notional = order.price * fill_qty;
                        let new_size = position.size + signed;
                        position.entry_price = (old_notional + add_notional) / new_size.abs();
                        position.size = new_size;
                    } else {
                        let close_qty = fill_qty.min(position.size.abs());
                        let mut pnl = (order.price - position.entry_price) * close_qty;
                        if position.is_short() {
                            pnl = -pnl;
                        }
                        realized = Some(pnl);
                        position.size = if position.is_long() {
                            position.size - close_qty
                        } else {
                            position.size + close_qty
                        };
                        position.realized_pnl += pnl;
                    }
                    position.mark_price = order.price;
                    position.updated_at = order.updated_at;
                    position.clone()
                }
                _ => {
                    let position = Position {
                        symbol: order.symbol.clone(),
                        side: order.side,
                        size: signed,
                        entry_price: order.price,
                        mark_price: order.price,
                        leverage: Decimal::ONE,
                        unrealized_pnl: Decimal::ZERO,
                        realized_pnl: Decimal::ZERO,
                        updated_at: order.updated_at,
                    };
                    state.position = Some(position.clone());
                    position
                }
            }
        };

        if let Some(pnl) = realized {
            self.risk.record_trade(pnl);
            info!(pnl = %pnl, "Trade closed");
        }

        self.strategy.lock().on_position_update(&position_update);
    }
}
