pub mod events;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use events::{ExecutionReport, KlineEvent, StreamEvent};

/// OHLCV candlestick for one interval of one symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Desired position state produced by a strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    /// Be in the market
    Long,
    /// Stay out of the market
    Flat,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    StopLoss,
    StopLossLimit,
    TakeProfit,
    TakeProfitLimit,
    LimitMaker,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    #[serde(alias = "EXPIRED_IN_MATCH")]
    Expired,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::StopLoss => "STOP_LOSS",
            OrderType::StopLossLimit => "STOP_LOSS_LIMIT",
            OrderType::TakeProfit => "TAKE_PROFIT",
            OrderType::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
            OrderType::LimitMaker => "LIMIT_MAKER",
        }
    }
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::PendingCancel => "PENDING_CANCEL",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        }
    }

    /// No further updates are expected for the order
    pub fn is_terminal(&self) -> bool {
        match self {
            OrderStatus::Filled
            | OrderStatus::Canceled
            | OrderStatus::Rejected
            | OrderStatus::Expired => true,
            OrderStatus::New | OrderStatus::PartiallyFilled | OrderStatus::PendingCancel => false,
        }
    }

    /// At least part of the order has executed
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::PartiallyFilled)
    }

    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Resting on the book with nothing executed yet
    pub fn is_unfilled_open(&self) -> bool {
        self.is_open() && !self.is_filled()
    }
}

macro_rules! impl_wire_name {
    ($ty:ty, $($variant:expr),+) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = crate::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| crate::Error::Decode(format!("unknown {} '{}'", stringify!($ty), s)))
            }
        }
    };
}

impl_wire_name!(OrderSide, OrderSide::Buy, OrderSide::Sell);
impl_wire_name!(
    OrderType,
    OrderType::Limit,
    OrderType::Market,
    OrderType::StopLoss,
    OrderType::StopLossLimit,
    OrderType::TakeProfit,
    OrderType::TakeProfitLimit,
    OrderType::LimitMaker
);
impl_wire_name!(
    OrderStatus,
    OrderStatus::New,
    OrderStatus::PartiallyFilled,
    OrderStatus::Filled,
    OrderStatus::Canceled,
    OrderStatus::PendingCancel,
    OrderStatus::Rejected,
    OrderStatus::Expired
);

/// An order as known to the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: f64, // Requested limit price
    pub quantity: f64,
    pub filled_quantity: f64,
    pub avg_fill_price: Option<f64>, // None until something executes
    pub order_id: u64,
    pub client_order_id: Option<String>,
    pub transact_time: DateTime<Utc>,
}

impl Order {
    /// Price to use for PnL: the average execution price when known
    pub fn effective_price(&self, source: PnlPriceSource) -> f64 {
        match source {
            PnlPriceSource::Filled => self.avg_fill_price.unwrap_or(self.price),
            PnlPriceSource::Requested => self.price,
        }
    }
}

/// Which order price feeds the PnL computation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PnlPriceSource {
    #[default]
    Filled,
    Requested,
}

/// A new order command sent to the venue
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: f64,
}

impl OrderRequest {
    pub fn limit(symbol: &str, side: OrderSide, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price,
        }
    }
}

/// Convert a venue millisecond timestamp
pub fn datetime_from_millis(ms: i64) -> crate::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| crate::Error::Decode(format!("timestamp out of range: {}", ms)))
}
