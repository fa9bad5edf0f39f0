use async_trait::async_trait;
use chrono::{DateTime, Utc};
use farebox_core::repository::{OrderRepository, RepoResult};
use farebox_domain::{Order, OrderStatus, Payment};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    schedule_id: Uuid,
    customer_id: Option<String>,
    contact: serde_json::Value,
    created_by: String,
    total_cents: i64,
    currency: String,
    status: String,
    ticket: serde_json::Value,
    payment: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> RepoResult<Order> {
        Ok(Order {
            id: self.id,
            schedule_id: self.schedule_id,
            customer_id: self.customer_id,
            contact: serde_json::from_value(self.contact)?,
            created_by: self.created_by,
            total_cents: self.total_cents,
            currency: self.currency,
            status: OrderStatus::from_str(&self.status)?,
            ticket: serde_json::from_value(self.ticket)?,
            payment: self.payment.map(serde_json::from_value).transpose()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, schedule_id, customer_id, contact, created_by, total_cents, \
                             currency, status, ticket, payment, created_at, updated_at";

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, schedule_id, customer_id, contact, created_by, total_cents,
                                currency, status, ticket, payment, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id)
        .bind(order.schedule_id)
        .bind(&order.customer_id)
        .bind(serde_json::to_value(&order.contact)?)
        .bind(&order.created_by)
        .bind(order.total_cents)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(serde_json::to_value(&order.ticket)?)
        .bind(order.payment.as_ref().map(serde_json::to_value).transpose()?)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(OrderRow::into_order).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> RepoResult<()> {
        sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_payment(&self, order_id: Uuid, payment: &Payment) -> RepoResult<()> {
        sqlx::query("UPDATE orders SET payment = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(serde_json::to_value(payment)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepoResult<()> {
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_pending_created_before(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE status = 'PENDING' AND created_at <= $1",
            ORDER_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }

    async fn list_confirmed(&self) -> RepoResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE status = 'CONFIRMED'",
            ORDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OrderRow::into_order).collect()
    }
}
