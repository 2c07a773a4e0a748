use std::collections::HashMap;
use std::sync::Arc;

use crate::api::ExchangeApi;
use crate::models::{
    ExecutionReport, Order, OrderRequest, OrderSide, OrderStatus, PnlPriceSource,
};
use crate::persistence::OrderStore;

/// Per-symbol order book of the engine
///
/// Tracks whether the symbol is held, the last buy and sell orders, and
/// adjusts the order size by the realized PnL of each closed round trip.
/// Invariant: `holding` is true iff the last buy reached Filled or
/// PartiallyFilled and no later sell did.
pub struct PositionBook {
    api: Arc<dyn ExchangeApi>,
    store: Arc<dyn OrderStore>,
    symbol: String,
    quantity: f64,
    holding: bool,
    orders: HashMap<u64, Order>,
    last_buy_order_id: Option<u64>,
    last_sell_order_id: Option<u64>,
    /// Buy the last sell closes, fixed when the sell is placed
    closed_buy_id: Option<u64>,
    /// Sell whose PnL was applied, with the quantity it was applied to
    settled_sell: Option<(u64, f64)>,
    pnl_source: PnlPriceSource,
}

fn round5(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}

/// Reached Filled/PartiallyFilled, even if it later expired or was cancelled
fn has_executed(order: &Order) -> bool {
    order.status.is_filled() || order.filled_quantity > 0.0
}

impl PositionBook {
    /// Create a book and recover the last stored order for `symbol`
    ///
    /// A recovered BUY becomes the last buy; it counts as held when it had
    /// (partially) filled.
    pub async fn new(
        api: Arc<dyn ExchangeApi>,
        store: Arc<dyn OrderStore>,
        symbol: &str,
        quantity: f64,
        pnl_source: PnlPriceSource,
    ) -> Self {
        let mut book = Self {
            api,
            store,
            symbol: symbol.to_string(),
            quantity,
            holding: false,
            orders: HashMap::new(),
            last_buy_order_id: None,
            last_sell_order_id: None,
            closed_buy_id: None,
            settled_sell: None,
            pnl_source,
        };

        match book.store.find_latest_order(symbol).await {
            Ok(Some(order)) if order.side == OrderSide::Buy => {
                tracing::info!(
                    symbol = %book.symbol,
                    "Retrieving last BUY order {} ({})",
                    order.order_id,
                    order.status
                );
                book.holding = order.status.is_filled();
                book.last_buy_order_id = Some(order.order_id);
                book.orders.insert(order.order_id, order);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(symbol = %book.symbol, "Could not recover last order: {}", e);
            }
        }

        book
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn holding(&self) -> bool {
        self.holding
    }

    /// Current nominal order size
    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn last_buy_order_id(&self) -> Option<u64> {
        self.last_buy_order_id
    }

    pub fn last_sell_order_id(&self) -> Option<u64> {
        self.last_sell_order_id
    }

    pub fn settled_sell_id(&self) -> Option<u64> {
        self.settled_sell.map(|(id, _)| id)
    }

    pub fn order(&self, order_id: u64) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Buy `quantity` at `price` unless already holding
    ///
    /// An unfilled previous buy is cancelled first; if that cancel fails
    /// nothing is sent. Returns true iff the venue accepted the order.
    pub async fn buy(&mut self, price: f64) -> bool {
        if self.holding {
            tracing::debug!(symbol = %self.symbol, "Already holding, skipping buy");
            return false;
        }

        if !self.cancel_stale(OrderSide::Buy).await {
            return false;
        }

        let request = OrderRequest::limit(&self.symbol, OrderSide::Buy, self.quantity, price);
        let order = match self.api.place_order(&request).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(symbol = %self.symbol, "Could not send BUY order: {}", e);
                return false;
            }
        };

        tracing::info!(
            symbol = %self.symbol,
            "Order sent: BUY {} @ {} (id {}, {})",
            order.quantity,
            order.price,
            order.order_id,
            order.status
        );

        if order.status.is_filled() {
            self.holding = true;
        }
        self.last_buy_order_id = Some(order.order_id);
        self.record_new(order).await;

        true
    }

    /// Sell the bought quantity at `price`
    ///
    /// Only possible while holding a buy that executed at least in part;
    /// otherwise returns false without calling the venue.
    pub async fn sell(&mut self, price: f64) -> bool {
        let buy = match self.last_buy_order_id.and_then(|id| self.orders.get(&id)) {
            Some(buy) if self.holding && has_executed(buy) => buy,
            _ => {
                tracing::debug!(symbol = %self.symbol, "Nothing to sell");
                return false;
            }
        };

        let buy_id = buy.order_id;
        let quantity = if buy.filled_quantity > 0.0 {
            buy.filled_quantity
        } else {
            self.quantity
        };

        if !self.cancel_stale(OrderSide::Sell).await {
            return false;
        }

        let request = OrderRequest::limit(&self.symbol, OrderSide::Sell, quantity, price);
        let order = match self.api.place_order(&request).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(symbol = %self.symbol, "Could not send SELL order: {}", e);
                return false;
            }
        };

        tracing::info!(
            symbol = %self.symbol,
            "Order sent: SELL {} @ {} (id {}, {})",
            order.quantity,
            order.price,
            order.order_id,
            order.status
        );

        let filled = order.status.is_filled();
        self.last_sell_order_id = Some(order.order_id);
        self.closed_buy_id = Some(buy_id);
        self.record_new(order).await;

        if filled {
            self.holding = false;
            self.recompute_pnl();
        }

        true
    }

    /// Apply an execution report to a tracked order
    pub async fn update_order(&mut self, report: ExecutionReport) {
        let order = match report.into_order() {
            Ok(order) => order,
            Err(e) => {
                tracing::warn!(symbol = %self.symbol, "Dropping undecodable execution report: {}", e);
                return;
            }
        };
        let order_id = order.order_id;

        let Some(previous) = self.orders.get(&order_id) else {
            tracing::info!(symbol = %self.symbol, "Unknown order {} ({})", order_id, order.status);
            return;
        };

        // Late duplicates must not move an order backwards
        let regresses = (previous.status.is_terminal() && previous.status != order.status)
            || order.filled_quantity < previous.filled_quantity;
        if regresses {
            tracing::debug!(
                symbol = %self.symbol,
                "Ignoring stale report for order {}: {} after {}",
                order_id,
                order.status,
                previous.status
            );
            return;
        }
        if order.status == previous.status && order.filled_quantity == previous.filled_quantity {
            tracing::debug!(symbol = %self.symbol, "Duplicate report for order {}", order_id);
            return;
        }

        let newly_filled = order.status.is_filled() && !previous.status.is_filled();
        let is_filled = order.status.is_filled();

        if let Err(e) = self.store.replace_order(order_id, &order).await {
            tracing::error!(symbol = %self.symbol, "Could not persist order {}: {}", order_id, e);
        }
        tracing::info!(
            symbol = %self.symbol,
            "Order updated {}: {} filled {}/{}",
            order_id,
            order.status,
            order.filled_quantity,
            order.quantity
        );
        self.orders.insert(order_id, order);

        if self.last_sell_order_id == Some(order_id) && is_filled {
            if newly_filled {
                self.holding = false;
            }
            self.recompute_pnl();
        }

        if self.last_buy_order_id == Some(order_id) && newly_filled {
            self.holding = true;
        }
    }

    /// Resize `quantity` by the PnL of the last sell and the buy it closed
    ///
    /// Applied once per sell order; later reports for the same sell refine the
    /// result from the quantity it was first applied to.
    pub fn recompute_pnl(&mut self) {
        let (Some(buy_id), Some(sell_id)) = (self.closed_buy_id, self.last_sell_order_id) else {
            return;
        };
        let (Some(buy), Some(sell)) = (self.orders.get(&buy_id), self.orders.get(&sell_id)) else {
            return;
        };
        if !has_executed(buy) || !has_executed(sell) {
            return;
        }

        let buy_price = buy.effective_price(self.pnl_source);
        let sell_price = sell.effective_price(self.pnl_source);
        if buy_price <= 0.0 {
            tracing::warn!(symbol = %self.symbol, "Buy price {} unusable for PnL", buy_price);
            return;
        }

        let base = match self.settled_sell {
            Some((id, base)) if id == sell_id => base,
            _ => self.quantity,
        };

        let pnl = (sell_price - buy_price) / buy_price * 100.0;
        self.quantity = round5(base * (1.0 + pnl / 100.0));
        self.settled_sell = Some((sell_id, base));

        tracing::info!(
            symbol = %self.symbol,
            "PnL {:.4}%, new quantity {}",
            pnl,
            self.quantity
        );
    }

    /// Cancel the previous order of `side` if it is still resting unfilled
    ///
    /// Returns false when a needed cancel failed.
    async fn cancel_stale(&mut self, side: OrderSide) -> bool {
        let last_id = match side {
            OrderSide::Buy => self.last_buy_order_id,
            OrderSide::Sell => self.last_sell_order_id,
        };
        let Some(order_id) = last_id else {
            return true;
        };
        let still_open = self
            .orders
            .get(&order_id)
            .map(|o| o.status.is_unfilled_open())
            .unwrap_or(false);
        if !still_open {
            return true;
        }

        tracing::info!(symbol = %self.symbol, "Cancelling last unfilled {} order {}", side, order_id);
        if let Err(e) = self.api.cancel_order(&self.symbol, order_id).await {
            tracing::error!(symbol = %self.symbol, "Could not cancel order {}: {}", order_id, e);
            return false;
        }
        tracing::info!(symbol = %self.symbol, "Successfully cancelled order {}", order_id);

        if let Some(order) = self.orders.get_mut(&order_id) {
            order.status = OrderStatus::Canceled;
            if let Err(e) = self.store.replace_order(order_id, order).await {
                tracing::error!(symbol = %self.symbol, "Could not persist order {}: {}", order_id, e);
            }
        }
        match side {
            OrderSide::Buy => self.last_buy_order_id = None,
            OrderSide::Sell => self.last_sell_order_id = None,
        }

        true
    }

    async fn record_new(&mut self, order: Order) {
        if let Err(e) = self.store.insert_order(&order).await {
            tracing::error!(symbol = %self.symbol, "Could not persist order {}: {}", order.order_id, e);
        }
        self.orders.insert(order.order_id, order);
    }
}
