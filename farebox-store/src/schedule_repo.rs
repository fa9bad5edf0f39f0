use async_trait::async_trait;
use chrono::{DateTime, Utc};
use farebox_core::repository::{RepoResult, ScheduleRepository};
use farebox_domain::{Schedule, Seat, SeatClass, SeatStatus};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

pub struct PgScheduleRepository {
    pool: PgPool,
}

impl PgScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    id: Uuid,
    route: String,
    bus: String,
    departure_at: DateTime<Utc>,
    base_fare_cents: i64,
    currency: String,
    is_return: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ScheduleRow> for Schedule {
    fn from(row: ScheduleRow) -> Self {
        Schedule {
            id: row.id,
            route: row.route,
            bus: row.bus,
            departure_at: row.departure_at,
            base_fare_cents: row.base_fare_cents,
            currency: row.currency,
            is_return: row.is_return,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
        }
    }
}

const SCHEDULE_COLUMNS: &str =
    "id, route, bus, departure_at, base_fare_cents, currency, is_return, deleted_at, created_at";

#[async_trait]
impl ScheduleRepository for PgScheduleRepository {
    async fn insert(&self, schedule: &Schedule, layout: Vec<Seat>) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO schedules (id, route, bus, departure_at, base_fare_cents, currency, is_return, deleted_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(schedule.id)
        .bind(&schedule.route)
        .bind(&schedule.bus)
        .bind(schedule.departure_at)
        .bind(schedule.base_fare_cents)
        .bind(&schedule.currency)
        .bind(schedule.is_return)
        .bind(schedule.deleted_at)
        .bind(schedule.created_at)
        .execute(&mut *tx)
        .await?;

        // Seat rows double as layout and live state; seeding here means the
        // ledger's register call is a no-op later.
        for seat in &layout {
            sqlx::query(
                r#"
                INSERT INTO seats (schedule_id, seat_number, seat_class, fare_cents, status)
                VALUES ($1, $2, $3, $4, 'AVAILABLE')
                ON CONFLICT (schedule_id, seat_number) DO NOTHING
                "#,
            )
            .bind(schedule.id)
            .bind(&seat.number)
            .bind(seat.class.as_str())
            .bind(seat.fare_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Schedule>> {
        let row: Option<ScheduleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM schedules WHERE id = $1",
            SCHEDULE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Schedule::from))
    }

    async fn seat_layout(&self, id: Uuid) -> RepoResult<Vec<Seat>> {
        #[derive(sqlx::FromRow)]
        struct LayoutRow {
            seat_number: String,
            seat_class: String,
            fare_cents: i64,
        }

        let rows: Vec<LayoutRow> = sqlx::query_as(
            r#"
            SELECT seat_number, seat_class, fare_cents
            FROM seats
            WHERE schedule_id = $1
            ORDER BY seat_number
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut seats = Vec::with_capacity(rows.len());
        for row in rows {
            seats.push(Seat {
                number: row.seat_number,
                class: SeatClass::from_str(&row.seat_class)?,
                fare_cents: row.fare_cents,
                status: SeatStatus::Available,
                hold_token: None,
                hold_expires_at: None,
            });
        }
        Ok(seats)
    }

    async fn list_departed_before(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM schedules WHERE departure_at <= $1",
            SCHEDULE_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Schedule::from).collect())
    }

    async fn list_deleted(&self) -> RepoResult<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(&format!(
            "SELECT {} FROM schedules WHERE deleted_at IS NOT NULL",
            SCHEDULE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Schedule::from).collect())
    }

    async fn mark_deleted(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        sqlx::query("UPDATE schedules SET deleted_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
