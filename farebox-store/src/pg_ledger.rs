use async_trait::async_trait;
use chrono::{DateTime, Utc};
use farebox_domain::{Seat, SeatClass, SeatStatus};
use farebox_inventory::{HoldStamp, LedgerError, SeatLedger};
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

/// Postgres-backed seat ledger. The all-or-nothing contract rides on a
/// single conditional UPDATE per call: the row set is constrained by
/// schedule, seat number and current status (plus hold token where it
/// matters), and the transaction commits only when the affected row count
/// equals the requested seat count.
pub struct PgSeatLedger {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    seat_number: String,
    seat_class: String,
    fare_cents: i64,
    status: String,
    hold_token: Option<Uuid>,
    hold_expires_at: Option<DateTime<Utc>>,
}

impl SeatRow {
    fn into_seat(self) -> Result<Seat, LedgerError> {
        Ok(Seat {
            number: self.seat_number,
            class: SeatClass::from_str(&self.seat_class).map_err(LedgerError::Backend)?,
            fare_cents: self.fare_cents,
            status: SeatStatus::from_str(&self.status).map_err(LedgerError::Backend)?,
            hold_token: self.hold_token,
            hold_expires_at: self.hold_expires_at,
        })
    }
}

fn backend(err: sqlx::Error) -> LedgerError {
    LedgerError::Backend(err.to_string())
}

impl PgSeatLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lazy reclamation, same as the in-memory ledger: every mutating call
    /// folds lapsed holds back to available first.
    async fn reclaim_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        schedule_id: Uuid,
    ) -> Result<u64, LedgerError> {
        let result = sqlx::query(
            r#"
            UPDATE seats
            SET status = 'AVAILABLE', hold_token = NULL, hold_expires_at = NULL
            WHERE schedule_id = $1 AND status = 'HELD' AND hold_expires_at <= NOW()
            "#,
        )
        .bind(schedule_id)
        .execute(&mut **tx)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected())
    }

    /// Work out which seat sank a failed multi-row update, for a precise
    /// error instead of a bare conflict.
    async fn diagnose_hold_failure(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[String],
    ) -> LedgerError {
        let rows: Result<Vec<SeatRow>, sqlx::Error> = sqlx::query_as(
            r#"
            SELECT seat_number, seat_class, fare_cents, status, hold_token, hold_expires_at
            FROM seats
            WHERE schedule_id = $1 AND seat_number = ANY($2)
            "#,
        )
        .bind(schedule_id)
        .bind(seat_numbers)
        .fetch_all(&self.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(err) => return backend(err),
        };

        for number in seat_numbers {
            match rows.iter().find(|r| &r.seat_number == number) {
                None => {
                    return LedgerError::UnknownSeat {
                        seat_number: number.clone(),
                    }
                }
                Some(row) if row.status != "AVAILABLE" => {
                    let status = SeatStatus::from_str(&row.status)
                        .unwrap_or(SeatStatus::Booked);
                    return LedgerError::Conflict {
                        seat_number: number.clone(),
                        status,
                    };
                }
                Some(_) => {}
            }
        }
        // Raced: the seats were free by the time we looked again.
        LedgerError::Conflict {
            seat_number: seat_numbers.first().cloned().unwrap_or_default(),
            status: SeatStatus::Held,
        }
    }
}

#[async_trait]
impl SeatLedger for PgSeatLedger {
    async fn register(&self, schedule_id: Uuid, seats: Vec<Seat>) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        for seat in &seats {
            sqlx::query(
                r#"
                INSERT INTO seats (schedule_id, seat_number, seat_class, fare_cents, status)
                VALUES ($1, $2, $3, $4, 'AVAILABLE')
                ON CONFLICT (schedule_id, seat_number) DO NOTHING
                "#,
            )
            .bind(schedule_id)
            .bind(&seat.number)
            .bind(seat.class.as_str())
            .bind(seat.fare_cents)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn is_registered(&self, schedule_id: Uuid) -> Result<bool, LedgerError> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM seats WHERE schedule_id = $1)")
                .bind(schedule_id)
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;
        Ok(exists.0)
    }

    async fn snapshot(&self, schedule_id: Uuid) -> Result<Vec<Seat>, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        Self::reclaim_in_tx(&mut tx, schedule_id).await?;
        let rows: Vec<SeatRow> = sqlx::query_as(
            r#"
            SELECT seat_number, seat_class, fare_cents, status, hold_token, hold_expires_at
            FROM seats
            WHERE schedule_id = $1
            ORDER BY seat_number
            "#,
        )
        .bind(schedule_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        if rows.is_empty() {
            return Err(LedgerError::ScheduleNotFound(schedule_id));
        }
        rows.into_iter().map(SeatRow::into_seat).collect()
    }

    async fn hold_seats(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[String],
        stamp: &HoldStamp,
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        Self::reclaim_in_tx(&mut tx, schedule_id).await?;

        let updated = sqlx::query(
            r#"
            UPDATE seats
            SET status = 'HELD', hold_token = $3, hold_expires_at = $4
            WHERE schedule_id = $1 AND seat_number = ANY($2) AND status = 'AVAILABLE'
            "#,
        )
        .bind(schedule_id)
        .bind(seat_numbers)
        .bind(stamp.token)
        .bind(stamp.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?
        .rows_affected();

        if updated as usize != seat_numbers.len() {
            tx.rollback().await.map_err(backend)?;
            return Err(self.diagnose_hold_failure(schedule_id, seat_numbers).await);
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn confirm_seats(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[String],
        token: Uuid,
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let updated = sqlx::query(
            r#"
            UPDATE seats
            SET status = 'BOOKED', hold_token = NULL, hold_expires_at = NULL
            WHERE schedule_id = $1 AND seat_number = ANY($2)
              AND status = 'HELD' AND hold_token = $3 AND hold_expires_at > NOW()
            "#,
        )
        .bind(schedule_id)
        .bind(seat_numbers)
        .bind(token)
        .execute(&mut *tx)
        .await
        .map_err(backend)?
        .rows_affected();

        if updated as usize != seat_numbers.len() {
            tx.rollback().await.map_err(backend)?;
            return Err(LedgerError::HoldExpired {
                seat_number: seat_numbers.first().cloned().unwrap_or_default(),
            });
        }
        tx.commit().await.map_err(backend)?;
        Ok(())
    }

    async fn release_held(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[String],
        token: Uuid,
    ) -> Result<usize, LedgerError> {
        let released = sqlx::query(
            r#"
            UPDATE seats
            SET status = 'AVAILABLE', hold_token = NULL, hold_expires_at = NULL
            WHERE schedule_id = $1 AND seat_number = ANY($2)
              AND status = 'HELD' AND hold_token = $3
            "#,
        )
        .bind(schedule_id)
        .bind(seat_numbers)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(backend)?
        .rows_affected();
        Ok(released as usize)
    }

    async fn release_booked(
        &self,
        schedule_id: Uuid,
        seat_number: &str,
    ) -> Result<(), LedgerError> {
        let updated = sqlx::query(
            r#"
            UPDATE seats
            SET status = 'AVAILABLE', hold_token = NULL, hold_expires_at = NULL
            WHERE schedule_id = $1 AND seat_number = $2 AND status = 'BOOKED'
            "#,
        )
        .bind(schedule_id)
        .bind(seat_number)
        .execute(&self.pool)
        .await
        .map_err(backend)?
        .rows_affected();

        if updated == 1 {
            return Ok(());
        }

        let row: Option<SeatRow> = sqlx::query_as(
            r#"
            SELECT seat_number, seat_class, fare_cents, status, hold_token, hold_expires_at
            FROM seats
            WHERE schedule_id = $1 AND seat_number = $2
            "#,
        )
        .bind(schedule_id)
        .bind(seat_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            None => Err(LedgerError::UnknownSeat {
                seat_number: seat_number.to_string(),
            }),
            Some(row) => Err(LedgerError::Conflict {
                seat_number: seat_number.to_string(),
                status: SeatStatus::from_str(&row.status).unwrap_or(SeatStatus::Available),
            }),
        }
    }

    async fn sweep_expired(&self, schedule_id: Uuid) -> Result<usize, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let reclaimed = Self::reclaim_in_tx(&mut tx, schedule_id).await?;
        tx.commit().await.map_err(backend)?;
        Ok(reclaimed as usize)
    }

    async fn schedule_ids(&self) -> Result<Vec<Uuid>, LedgerError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT DISTINCT schedule_id FROM seats")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn unregister(&self, schedule_id: Uuid) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM seats WHERE schedule_id = $1")
            .bind(schedule_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
