use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use rand::Rng;
use reqwest::{Client, Method, Response};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use super::ExchangeApi;
use crate::config::ExchangeConfig;
use crate::models::events::de_str_f64;
use crate::models::{
    datetime_from_millis, Candle, Order, OrderRequest, OrderSide, OrderStatus, OrderType,
};
use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

// Type alias for the rate limiter to simplify signatures
type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Binance spot REST client
///
/// Signed endpoints carry `timestamp` and an HMAC-SHA256 `signature` of the
/// query string. In test mode orders are validated by `/api/v3/order/test`
/// and never reach the matching engine.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    test_mode: bool,
    rate_limiter: Arc<BinanceRateLimiter>,
}

/// `newOrderRespType=FULL` acknowledgement
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    symbol: String,
    order_id: u64,
    client_order_id: Option<String>,
    transact_time: i64,
    #[serde(deserialize_with = "de_str_f64")]
    price: f64,
    #[serde(deserialize_with = "de_str_f64")]
    orig_qty: f64,
    #[serde(deserialize_with = "de_str_f64")]
    executed_qty: f64,
    #[serde(deserialize_with = "de_str_f64")]
    cummulative_quote_qty: f64,
    status: OrderStatus,
    #[serde(rename = "type")]
    order_type: OrderType,
    side: OrderSide,
}

impl OrderAck {
    fn into_order(self) -> Result<Order> {
        let avg_fill_price = if self.executed_qty > 0.0 {
            Some(self.cummulative_quote_qty / self.executed_qty)
        } else {
            None
        };

        Ok(Order {
            symbol: self.symbol,
            side: self.side,
            order_type: self.order_type,
            status: self.status,
            price: self.price,
            quantity: self.orig_qty,
            filled_quantity: self.executed_qty,
            avg_fill_price,
            order_id: self.order_id,
            client_order_id: self.client_order_id,
            transact_time: datetime_from_millis(self.transact_time)?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListenKeyResponse {
    listen_key: String,
}

impl BinanceClient {
    /// Create a client from exchange settings
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).ok_or_else(|| {
            Error::Config("exchange.requests_per_minute must be positive".to_string())
        })?;
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            test_mode: config.test_mode,
            rate_limiter,
        })
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    /// Hex HMAC-SHA256 of `payload` keyed with the secret
    fn signature(&self, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| Error::Config(format!("invalid secret key: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Append `timestamp` and `signature` to a query string
    fn signed_query(&self, params: &str) -> Result<String> {
        let timestamp = Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("timestamp={}", timestamp)
        } else {
            format!("{}&timestamp={}", params, timestamp)
        };
        let signature = self.signature(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    async fn send(&self, method: Method, path: &str, query: &str) -> Result<Response> {
        self.rate_limiter.until_ready().await;

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Test-endpoint acks are empty; fabricate the order the venue would have filled
    fn synthetic_fill(request: &OrderRequest, client_order_id: String) -> Order {
        let order_id = rand::thread_rng().gen_range(1_000_000..u32::MAX as u64);

        Order {
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            status: OrderStatus::Filled,
            price: request.price,
            quantity: request.quantity,
            filled_quantity: request.quantity,
            avg_fill_price: Some(request.price),
            order_id,
            client_order_id: Some(client_order_id),
            transact_time: Utc::now(),
        }
    }
}

fn parse_kline_row(row: &[Value]) -> Result<Candle> {
    let field = |i: usize| -> Result<f64> {
        row.get(i)
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| Error::Decode(format!("kline field {} missing or invalid", i)))
    };

    let open_time = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Decode("kline open time missing".to_string()))?;

    Ok(Candle {
        open_time: datetime_from_millis(open_time)?,
        open: field(1)?,
        high: field(2)?,
        low: field(3)?,
        close: field(4)?,
        volume: field(5)?,
    })
}

#[async_trait]
impl ExchangeApi for BinanceClient {
    async fn get_candles(&self, symbol: &str, interval: &str, limit: usize) -> Result<Vec<Candle>> {
        // Venue caps a single klines page at 1000
        let query = format!(
            "symbol={}&interval={}&limit={}",
            symbol,
            interval,
            limit.min(1000)
        );
        let rows: Vec<Vec<Value>> = self
            .send(Method::GET, "/api/v3/klines", &query)
            .await?
            .json()
            .await?;

        let candles = rows
            .iter()
            .map(|row| parse_kline_row(row))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!("Fetched {} candles for {} {}", candles.len(), symbol, interval);
        Ok(candles)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order> {
        let client_order_id = uuid::Uuid::new_v4().simple().to_string();
        let mut params = format!(
            "symbol={}&side={}&type={}&quantity={}&newClientOrderId={}&newOrderRespType=FULL",
            request.symbol,
            request.side,
            request.order_type,
            request.quantity,
            client_order_id
        );
        if request.order_type != OrderType::Market {
            params.push_str(&format!("&timeInForce=GTC&price={}", request.price));
        }

        let path = if self.test_mode {
            "/api/v3/order/test"
        } else {
            "/api/v3/order"
        };
        let query = self.signed_query(&params)?;
        let response = self.send(Method::POST, path, &query).await?;

        if self.test_mode {
            let order = Self::synthetic_fill(request, client_order_id);
            tracing::info!(
                "🧪 TEST ORDER: {} {} {} @ {} (id {})",
                order.side,
                order.quantity,
                order.symbol,
                order.price,
                order.order_id
            );
            return Ok(order);
        }

        let ack: OrderAck = response.json().await?;
        ack.into_order()
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<()> {
        if self.test_mode {
            tracing::info!("🧪 TEST CANCEL: {} order {}", symbol, order_id);
            return Ok(());
        }

        let params = format!("symbol={}&orderId={}", symbol, order_id);
        let query = self.signed_query(&params)?;
        self.send(Method::DELETE, "/api/v3/order", &query).await?;
        Ok(())
    }

    async fn create_session(&self) -> Result<String> {
        let response = self
            .send(Method::POST, "/api/v3/userDataStream", "")
            .await
            .map_err(|e| match e {
                Error::Rejected { status: 401, body } | Error::Rejected { status: 403, body } => {
                    Error::Auth(body)
                }
                other => other,
            })?;

        let key: ListenKeyResponse = response.json().await?;
        Ok(key.listen_key)
    }

    async fn renew_session(&self, session_key: &str) -> Result<()> {
        let query = format!("listenKey={}", session_key);
        self.send(Method::PUT, "/api/v3/userDataStream", &query).await?;
        Ok(())
    }
}
