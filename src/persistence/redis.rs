use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

use super::OrderStore;
use crate::models::Order;
use crate::{Error, Result};

/// Redis order store
///
/// Each order is stored as JSON under `order:{symbol}:{id}`; a sorted set
/// `orders:{symbol}` scored by transact time indexes them per symbol.
#[derive(Clone)]
pub struct RedisOrderStore {
    conn: ConnectionManager,
}

fn order_key(symbol: &str, order_id: u64) -> String {
    format!("order:{}:{}", symbol, order_id)
}

fn symbol_key(symbol: &str) -> String {
    format!("orders:{}", symbol)
}

impl RedisOrderStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| Error::Store("Redis connection timeout after 5 seconds".to_string()))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    async fn write(&self, order: &Order) -> Result<()> {
        let mut conn = self.conn.clone();
        let value = serde_json::to_string(order)?;
        let score = order.transact_time.timestamp_millis() as f64;

        let _: () = redis::pipe()
            .atomic()
            .set(order_key(&order.symbol, order.order_id), value)
            .ignore()
            .zadd(symbol_key(&order.symbol), order.order_id, score)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for RedisOrderStore {
    async fn find_latest_order(&self, symbol: &str) -> Result<Option<Order>> {
        let mut conn = self.conn.clone();

        let ids: Vec<u64> = conn.zrevrange(symbol_key(symbol), 0, 0).await?;
        let Some(order_id) = ids.first() else {
            return Ok(None);
        };

        let json: Option<String> = conn.get(order_key(symbol, *order_id)).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => {
                tracing::warn!("Order {} indexed for {} but missing", order_id, symbol);
                Ok(None)
            }
        }
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.write(order).await?;
        tracing::debug!("Stored order {} for {}", order.order_id, order.symbol);
        Ok(())
    }

    async fn replace_order(&self, order_id: u64, order: &Order) -> Result<()> {
        if order_id != order.order_id {
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(order_key(&order.symbol, order_id)).await?;
            conn.zrem::<_, _, ()>(symbol_key(&order.symbol), order_id).await?;
        }
        self.write(order).await
    }
}
