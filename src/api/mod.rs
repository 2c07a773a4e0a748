pub mod binance;
pub mod binance_ws;

use async_trait::async_trait;

use crate::models::{Candle, Order, OrderRequest, StreamEvent};
use crate::Result;

pub use binance::BinanceClient;
pub use binance_ws::BinanceEventSource;

/// REST side of an exchange: market data, order entry and the session key
/// that authorizes the private event stream.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Historical candles, oldest first
    async fn get_candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>>;

    /// Submit an order; the returned order reflects the synchronous ack
    async fn place_order(&self, request: &OrderRequest) -> Result<Order>;

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()>;

    /// Obtain a fresh session (listen) key
    async fn create_session(&self) -> Result<String>;

    /// Keep an existing session key alive
    async fn renew_session(&self, session_key: &str) -> Result<()>;
}

/// Opens the long-lived event subscription
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn connect(&self, session_key: &str) -> Result<Box<dyn EventSubscription>>;
}

#[async_trait]
pub trait EventSubscription: Send {
    /// Next decoded frame; `Ok(None)` once the remote closed the stream
    async fn next_event(&mut self) -> Result<Option<StreamEvent>>;
}
