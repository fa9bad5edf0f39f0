use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use farebox_domain::{Seat, SeatStatus};
use uuid::Uuid;

/// Identity of one hold attempt: the token fences the holder, the expiry
/// bounds it. Stamped onto every seat a hold covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldStamp {
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl HoldStamp {
    pub fn new(ttl: Duration) -> Self {
        Self {
            token: Uuid::new_v4(),
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("schedule not registered: {0}")]
    ScheduleNotFound(Uuid),

    #[error("unknown seat: {seat_number}")]
    UnknownSeat { seat_number: String },

    #[error("seat {seat_number} is {status}")]
    Conflict {
        seat_number: String,
        status: SeatStatus,
    },

    #[error("hold lapsed for seat {seat_number}")]
    HoldExpired { seat_number: String },

    #[error("ledger backend error: {0}")]
    Backend(String),
}

/// The authoritative per-schedule seat-state store. Every mutating call is
/// conditional on the seats' current state and is all-or-nothing across the
/// requested set: if one seat fails the condition, no seat moves.
///
/// Expired holds are reclaimed lazily (every operation treats a lapsed
/// `HELD` seat as `AVAILABLE`) and eagerly by `sweep_expired`, so a
/// strictly on-time background sweep is not required for correctness.
#[async_trait]
pub trait SeatLedger: Send + Sync {
    /// Seed a schedule's seat set from its layout. Idempotent: a schedule
    /// that is already registered keeps its live state.
    async fn register(&self, schedule_id: Uuid, seats: Vec<Seat>) -> Result<(), LedgerError>;

    async fn is_registered(&self, schedule_id: Uuid) -> Result<bool, LedgerError>;

    /// Current seat states, ordered by seat number. Lapsed holds are
    /// reported (and reclaimed) as available.
    async fn snapshot(&self, schedule_id: Uuid) -> Result<Vec<Seat>, LedgerError>;

    /// `AVAILABLE -> HELD` for the whole set, stamped with `stamp`.
    async fn hold_seats(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[String],
        stamp: &HoldStamp,
    ) -> Result<(), LedgerError>;

    /// `HELD -> BOOKED` for the whole set, only while every seat is still
    /// held by `token` and the stamp has not expired.
    async fn confirm_seats(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[String],
        token: Uuid,
    ) -> Result<(), LedgerError>;

    /// `HELD -> AVAILABLE` for seats still held by `token`. Seats already
    /// reclaimed or re-held by another token are left alone. Returns the
    /// number of seats actually released.
    async fn release_held(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[String],
        token: Uuid,
    ) -> Result<usize, LedgerError>;

    /// `BOOKED -> AVAILABLE`, the cancellation path. Never yields `HELD`.
    async fn release_booked(&self, schedule_id: Uuid, seat_number: &str)
        -> Result<(), LedgerError>;

    /// Reclaim every lapsed hold on the schedule. Returns the count.
    async fn sweep_expired(&self, schedule_id: Uuid) -> Result<usize, LedgerError>;

    async fn schedule_ids(&self) -> Result<Vec<Uuid>, LedgerError>;

    async fn unregister(&self, schedule_id: Uuid) -> Result<(), LedgerError>;
}
