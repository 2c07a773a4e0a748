pub mod redis;

use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::Order;
use crate::{Error, Result};

pub use self::redis::RedisOrderStore;

/// Durable mirror of the orders a book has issued
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Most recent order for `symbol` by transact time
    async fn find_latest_order(&self, symbol: &str) -> Result<Option<Order>>;

    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Overwrite the stored order with id `order_id`
    async fn replace_order(&self, order_id: u64, order: &Order) -> Result<()>;
}

/// In-process store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: Mutex<Vec<Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored order, in insertion order
    pub fn orders(&self) -> Vec<Order> {
        self.orders
            .lock()
            .map(|orders| orders.clone())
            .unwrap_or_default()
    }
}

fn poisoned() -> Error {
    Error::Store("memory store lock poisoned".to_string())
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_latest_order(&self, symbol: &str) -> Result<Option<Order>> {
        let orders = self.orders.lock().map_err(|_| poisoned())?;
        Ok(orders
            .iter()
            .filter(|o| o.symbol == symbol)
            .max_by_key(|o| o.transact_time)
            .cloned())
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.lock().map_err(|_| poisoned())?;
        orders.push(order.clone());
        Ok(())
    }

    async fn replace_order(&self, order_id: u64, order: &Order) -> Result<()> {
        let mut orders = self.orders.lock().map_err(|_| poisoned())?;
        match orders
            .iter_mut()
            .find(|o| o.order_id == order_id && o.symbol == order.symbol)
        {
            Some(stored) => *stored = order.clone(),
            None => orders.push(order.clone()),
        }
        Ok(())
    }
}
