use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::models::Order;
use crate::persistence::OrderStore;
use crate::{Error, Result};

/// Postgres persistence for orders
pub struct PostgresOrderStore {
    pool: PgPool,
}

fn to_decimal(value: f64) -> Result<Decimal> {
    Decimal::from_f64(value).ok_or_else(|| Error::Store(format!("{} is not a valid decimal", value)))
}

fn to_f64(value: Decimal) -> Result<f64> {
    value
        .to_f64()
        .ok_or_else(|| Error::Store(format!("{} does not fit in f64", value)))
}

fn to_db_id(order_id: u64) -> Result<i64> {
    i64::try_from(order_id).map_err(|_| Error::Store(format!("order id {} out of range", order_id)))
}

fn order_from_row(row: &PgRow) -> Result<Order> {
    let order_id: i64 = row.try_get("order_id")?;
    let side: String = row.try_get("side")?;
    let order_type: String = row.try_get("order_type")?;
    let status: String = row.try_get("status")?;
    let price: Decimal = row.try_get("price")?;
    let quantity: Decimal = row.try_get("quantity")?;
    let filled_quantity: Decimal = row.try_get("filled_quantity")?;
    let avg_fill_price: Option<Decimal> = row.try_get("avg_fill_price")?;
    let transact_time: DateTime<Utc> = row.try_get("transact_time")?;

    Ok(Order {
        symbol: row.try_get("symbol")?,
        side: side.parse()?,
        order_type: order_type.parse()?,
        status: status.parse()?,
        price: to_f64(price)?,
        quantity: to_f64(quantity)?,
        filled_quantity: to_f64(filled_quantity)?,
        avg_fill_price: avg_fill_price.map(to_f64).transpose()?,
        order_id: u64::try_from(order_id)
            .map_err(|_| Error::Store(format!("negative order id {}", order_id)))?,
        client_order_id: row.try_get("client_order_id")?,
        transact_time,
    })
}

impl PostgresOrderStore {
    /// Connect to Postgres and apply migrations
    ///
    /// # Arguments
    /// * `database_url` - Postgres connection URL
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres");

        Ok(Self { pool })
    }

    async fn upsert(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                symbol, order_id, side, order_type, status, price, quantity,
                filled_quantity, avg_fill_price, client_order_id, transact_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (symbol, order_id) DO UPDATE SET
                side = EXCLUDED.side,
                order_type = EXCLUDED.order_type,
                status = EXCLUDED.status,
                price = EXCLUDED.price,
                quantity = EXCLUDED.quantity,
                filled_quantity = EXCLUDED.filled_quantity,
                avg_fill_price = EXCLUDED.avg_fill_price,
                client_order_id = EXCLUDED.client_order_id,
                transact_time = EXCLUDED.transact_time,
                updated_at = NOW()
            "#,
        )
        .bind(&order.symbol)
        .bind(to_db_id(order.order_id)?)
        .bind(order.side.as_str())
        .bind(order.order_type.as_str())
        .bind(order.status.as_str())
        .bind(to_decimal(order.price)?)
        .bind(to_decimal(order.quantity)?)
        .bind(to_decimal(order.filled_quantity)?)
        .bind(order.avg_fill_price.map(to_decimal).transpose()?)
        .bind(&order.client_order_id)
        .bind(order.transact_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn find_latest_order(&self, symbol: &str) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT symbol, order_id, side, order_type, status, price, quantity,
                   filled_quantity, avg_fill_price, client_order_id, transact_time
            FROM orders
            WHERE symbol = $1
            ORDER BY transact_time DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.upsert(order).await?;
        tracing::debug!("Saved order {} for {} to Postgres", order.order_id, order.symbol);
        Ok(())
    }

    async fn replace_order(&self, order_id: u64, order: &Order) -> Result<()> {
        if order_id != order.order_id {
            sqlx::query("DELETE FROM orders WHERE symbol = $1 AND order_id = $2")
                .bind(&order.symbol)
                .bind(to_db_id(order_id)?)
                .execute(&self.pool)
                .await?;
        }
        self.upsert(order).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, OrderStatus, OrderType};

    fn create_test_order(symbol: &str, order_id: u64, minutes_ago: i64) -> Order {
        Order {
            symbol: symbol.to_string(),
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            status: OrderStatus::PartiallyFilled,
            price: 7000.0,
            quantity: 0.1,
            filled_quantity: 0.05,
            avg_fill_price: Some(7001.5),
            order_id,
            client_order_id: Some("abc".to_string()),
            transact_time: Utc::now() - chrono::Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_decimal_conversion() {
        assert_eq!(to_f64(to_decimal(0.10769).unwrap()).unwrap(), 0.10769);
        assert!(to_decimal(f64::NAN).is_err());
        assert!(to_db_id(u64::MAX).is_err());
    }

    #[tokio::test]
    #[ignore] // Requires Postgres running
    async fn test_upsert_and_latest() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set");
        let store = PostgresOrderStore::new(&url).await.unwrap();

        sqlx::query("DELETE FROM orders WHERE symbol = 'TESTPG'")
            .execute(&store.pool)
            .await
            .unwrap();

        store.insert_order(&create_test_order("TESTPG", 1, 10)).await.unwrap();
        let newer = create_test_order("TESTPG", 2, 1);
        store.insert_order(&newer).await.unwrap();

        let filled = Order {
            status: OrderStatus::Filled,
            filled_quantity: 0.1,
            ..newer
        };
        store.replace_order(2, &filled).await.unwrap();

        let latest = store.find_latest_order("TESTPG").await.unwrap().unwrap();
        assert_eq!(latest.order_id, 2);
        assert_eq!(latest.status, OrderStatus::Filled);
        assert_eq!(latest.avg_fill_price, Some(7001.5));
    }
}
