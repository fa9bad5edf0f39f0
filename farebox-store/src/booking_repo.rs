use async_trait::async_trait;
use chrono::{DateTime, Utc};
use farebox_core::repository::{BookingRepository, RepoResult};
use farebox_domain::{Booking, BookingStatus};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    order_id: Uuid,
    schedule_id: Uuid,
    seat_number: String,
    user_id: Option<String>,
    passenger: serde_json::Value,
    fare_cents: i64,
    status: String,
    created_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
}

impl BookingRow {
    fn into_booking(self) -> RepoResult<Booking> {
        Ok(Booking {
            id: self.id,
            order_id: self.order_id,
            schedule_id: self.schedule_id,
            seat_number: self.seat_number,
            user_id: self.user_id,
            passenger: serde_json::from_value(self.passenger)?,
            fare_cents: self.fare_cents,
            status: BookingStatus::from_str(&self.status)?,
            created_at: self.created_at,
            cancelled_at: self.cancelled_at,
            cancel_reason: self.cancel_reason,
        })
    }
}

const BOOKING_COLUMNS: &str = "id, order_id, schedule_id, seat_number, user_id, passenger, \
                               fare_cents, status, created_at, cancelled_at, cancel_reason";

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert_many(&self, bookings: &[Booking]) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        for booking in bookings {
            sqlx::query(
                r#"
                INSERT INTO bookings (id, order_id, schedule_id, seat_number, user_id, passenger,
                                      fare_cents, status, created_at, cancelled_at, cancel_reason)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(booking.id)
            .bind(booking.order_id)
            .bind(booking.schedule_id)
            .bind(&booking.seat_number)
            .bind(&booking.user_id)
            .bind(serde_json::to_value(&booking.passenger)?)
            .bind(booking.fare_cents)
            .bind(booking.status.as_str())
            .bind(booking.created_at)
            .bind(booking.cancelled_at)
            .bind(&booking.cancel_reason)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(BookingRow::into_booking).transpose()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> RepoResult<()> {
        let cancelled_at = (status == BookingStatus::Cancelled).then_some(at);
        sqlx::query(
            r#"
            UPDATE bookings
            SET status = $2,
                cancel_reason = COALESCE($3, cancel_reason),
                cancelled_at = COALESCE($4, cancelled_at)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(reason)
        .bind(cancelled_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_by_order(&self, order_id: Uuid) -> RepoResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE order_id = $1 ORDER BY seat_number",
            BOOKING_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(BookingRow::into_booking).collect()
    }

    async fn list_active_by_schedule(&self, schedule_id: Uuid) -> RepoResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE schedule_id = $1 AND status = 'BOOKED' ORDER BY seat_number",
            BOOKING_COLUMNS
        ))
        .bind(schedule_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(BookingRow::into_booking).collect()
    }

    async fn delete_by_order(&self, order_id: Uuid) -> RepoResult<()> {
        sqlx::query("DELETE FROM bookings WHERE order_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
