use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{datetime_from_millis, Candle, Order, OrderSide, OrderStatus, OrderType};
use crate::Result;

/// One frame of the combined stream: `{"stream": "...", "data": {...}}`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StreamEvent {
    pub stream: String,
    pub data: Value,
}

/// `kline` payload
#[derive(Debug, Clone, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: Kline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Kline {
    #[serde(rename = "t")]
    pub open_time: i64,
    #[serde(rename = "o", deserialize_with = "de_str_f64")]
    pub open: f64,
    #[serde(rename = "h", deserialize_with = "de_str_f64")]
    pub high: f64,
    #[serde(rename = "l", deserialize_with = "de_str_f64")]
    pub low: f64,
    #[serde(rename = "c", deserialize_with = "de_str_f64")]
    pub close: f64,
    #[serde(rename = "v", deserialize_with = "de_str_f64")]
    pub volume: f64,
    #[serde(rename = "x", default)]
    pub is_closed: bool,
}

impl KlineEvent {
    pub fn to_candle(&self) -> Result<Candle> {
        Ok(Candle {
            open_time: datetime_from_millis(self.kline.open_time)?,
            open: self.kline.open,
            high: self.kline.high,
            low: self.kline.low,
            close: self.kline.close,
            volume: self.kline.volume,
        })
    }
}

/// `executionReport` payload describing a change to one order
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionReport {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: OrderSide,
    #[serde(rename = "o")]
    pub order_type: OrderType,
    #[serde(rename = "X")]
    pub status: OrderStatus,
    #[serde(rename = "p", deserialize_with = "de_str_f64")]
    pub price: f64,
    #[serde(rename = "q", deserialize_with = "de_str_f64")]
    pub quantity: f64,
    #[serde(rename = "z", deserialize_with = "de_str_f64")]
    pub cumulative_filled: f64,
    #[serde(rename = "Z", deserialize_with = "de_str_f64", default)]
    pub cumulative_quote: f64,
    #[serde(rename = "i")]
    pub order_id: u64,
    #[serde(rename = "c", default)]
    pub client_order_id: Option<String>,
    #[serde(rename = "T")]
    pub transact_time: i64,
}

impl ExecutionReport {
    pub fn avg_fill_price(&self) -> Option<f64> {
        if self.cumulative_filled > 0.0 {
            Some(self.cumulative_quote / self.cumulative_filled)
        } else {
            None
        }
    }

    pub fn into_order(self) -> Result<Order> {
        let avg_fill_price = self.avg_fill_price();
        Ok(Order {
            transact_time: datetime_from_millis(self.transact_time)?,
            symbol: self.symbol,
            side: self.side,
            order_type: self.order_type,
            status: self.status,
            price: self.price,
            quantity: self.quantity,
            filled_quantity: self.cumulative_filled,
            avg_fill_price,
            order_id: self.order_id,
            client_order_id: self.client_order_id,
        })
    }
}

/// Venue decimals arrive as strings ("0.00100000"); accept bare numbers too
pub(crate) fn de_str_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(f64),
    }

    match StrOrNum::deserialize(deserializer)? {
        StrOrNum::Str(s) => s.parse::<f64>().map_err(serde::de::Error::custom),
        StrOrNum::Num(n) => Ok(n),
    }
}
