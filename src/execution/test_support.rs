use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};

use crate::api::ExchangeApi;
use crate::models::{Candle, Order, OrderRequest, OrderStatus};
use crate::{Error, Result};

/// Scriptable exchange double recording every call
pub struct FakeExchange {
    pub placed: Mutex<Vec<OrderRequest>>,
    pub cancelled: Mutex<Vec<u64>>,
    pub renewals: Mutex<Vec<String>>,
    pub candles: Mutex<Vec<Candle>>,
    ack_status: Mutex<OrderStatus>,
    pub fail_orders: AtomicBool,
    pub fail_cancel: AtomicBool,
    pub fail_renew: AtomicBool,
    next_id: AtomicU64,
}

impl FakeExchange {
    pub fn new() -> Self {
        Self {
            placed: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            renewals: Mutex::new(Vec::new()),
            candles: Mutex::new(Vec::new()),
            ack_status: Mutex::new(OrderStatus::New),
            fail_orders: AtomicBool::new(false),
            fail_cancel: AtomicBool::new(false),
            fail_renew: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        }
    }

    /// Status carried by subsequent synchronous acks
    pub fn set_ack_status(&self, status: OrderStatus) {
        *self.ack_status.lock().unwrap() = status;
    }

    pub fn with_candles(self, candles: Vec<Candle>) -> Self {
        *self.candles.lock().unwrap() = candles;
        self
    }

    pub fn placed(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<u64> {
        self.cancelled.lock().unwrap().clone()
    }

    pub fn renewals(&self) -> usize {
        self.renewals.lock().unwrap().len()
    }
}

#[async_trait]
impl ExchangeApi for FakeExchange {
    async fn get_candles(&self, _symbol: &str, _interval: &str, limit: usize) -> Result<Vec<Candle>> {
        let candles = self.candles.lock().unwrap();
        let skip = candles.len().saturating_sub(limit);
        Ok(candles[skip..].to_vec())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(Error::Rejected {
                status: 400,
                body: "insufficient balance".to_string(),
            });
        }
        self.placed.lock().unwrap().push(request.clone());

        let status = *self.ack_status.lock().unwrap();
        let filled = if status.is_filled() { request.quantity } else { 0.0 };
        Ok(Order {
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            status,
            price: request.price,
            quantity: request.quantity,
            filled_quantity: filled,
            avg_fill_price: status.is_filled().then_some(request.price),
            order_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            client_order_id: None,
            transact_time: Utc::now(),
        })
    }

    async fn cancel_order(&self, _symbol: &str, order_id: u64) -> Result<()> {
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(Error::Rejected {
                status: 400,
                body: "unknown order".to_string(),
            });
        }
        self.cancelled.lock().unwrap().push(order_id);
        Ok(())
    }

    async fn create_session(&self) -> Result<String> {
        Ok("listen-key".to_string())
    }

    async fn renew_session(&self, session_key: &str) -> Result<()> {
        if self.fail_renew.load(Ordering::SeqCst) {
            return Err(Error::Transport("renewal timed out".to_string()));
        }
        self.renewals.lock().unwrap().push(session_key.to_string());
        Ok(())
    }
}

/// `executionReport` payload for an order
pub fn execution_report(order: &Order, status: &str, filled: f64, avg_price: f64, event_ms: i64) -> Value {
    json!({
        "e": "executionReport",
        "E": event_ms,
        "s": order.symbol,
        "c": "client",
        "S": order.side.as_str(),
        "o": order.order_type.as_str(),
        "f": "GTC",
        "q": order.quantity.to_string(),
        "p": order.price.to_string(),
        "X": status,
        "i": order.order_id,
        "z": filled.to_string(),
        "Z": (filled * avg_price).to_string(),
        "T": event_ms
    })
}

/// `kline` payload for minute `minute` of the test day
pub fn kline(symbol: &str, minute: i64, open: f64, close: f64, event_ms: i64) -> Value {
    let open_time = minute_time(minute);
    json!({
        "e": "kline",
        "E": event_ms,
        "s": symbol,
        "k": {
            "t": open_time.timestamp_millis(),
            "s": symbol,
            "i": "1m",
            "o": open.to_string(),
            "h": open.max(close).to_string(),
            "l": open.min(close).to_string(),
            "c": close.to_string(),
            "v": "10",
            "x": false
        }
    })
}

pub fn minute_time(minute: i64) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
}

/// Minute candles opening at the given prices, starting at minute 0
pub fn history(opens: &[f64]) -> Vec<Candle> {
    opens
        .iter()
        .enumerate()
        .map(|(i, &open)| Candle {
            open_time: minute_time(i as i64),
            open,
            high: open,
            low: open,
            close: open,
            volume: 10.0,
        })
        .collect()
}
