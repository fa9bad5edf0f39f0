use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::ledger::{HoldStamp, LedgerError, SeatLedger};

/// A live claim over a set of seats, handed back from `acquire` and passed
/// to `confirm` or `release`. Nothing else references it: an expired hold
/// simply stops matching in the ledger, so dropping one is harmless.
#[derive(Debug, Clone)]
pub struct ActiveHold {
    pub token: Uuid,
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ActiveHold {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Grants time-boxed exclusive claims over seat sets. The TTL is sized for
/// one payment round trip; anything that acquires and does not confirm in
/// time loses the seats back to inventory.
pub struct HoldManager {
    ledger: Arc<dyn SeatLedger>,
    default_ttl: Duration,
}

impl HoldManager {
    pub fn new(ledger: Arc<dyn SeatLedger>, default_ttl: Duration) -> Self {
        Self { ledger, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Claim the whole seat set atomically. Fails without side effects if
    /// any seat is unavailable.
    pub async fn acquire(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[String],
        ttl: Option<Duration>,
    ) -> Result<ActiveHold, LedgerError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let stamp = HoldStamp::new(ttl);
        self.ledger.hold_seats(schedule_id, seat_numbers, &stamp).await?;
        tracing::debug!(
            %schedule_id,
            token = %stamp.token,
            seats = seat_numbers.len(),
            "hold acquired"
        );
        Ok(ActiveHold {
            token: stamp.token,
            schedule_id,
            seat_numbers: seat_numbers.to_vec(),
            acquired_at: Utc::now(),
            expires_at: stamp.expires_at,
        })
    }

    /// `HELD -> BOOKED`. The expiry is re-checked here and again inside the
    /// ledger; a lapsed hold fails even if no sweep has run yet.
    pub async fn confirm(&self, hold: &ActiveHold) -> Result<(), LedgerError> {
        if hold.is_expired(Utc::now()) {
            return Err(LedgerError::HoldExpired {
                seat_number: hold.seat_numbers.first().cloned().unwrap_or_default(),
            });
        }
        self.ledger
            .confirm_seats(hold.schedule_id, &hold.seat_numbers, hold.token)
            .await
    }

    /// Explicit abandon (checkout dropped, payment failed). Safe to call
    /// after expiry: seats the ledger already reclaimed are left alone.
    pub async fn release(&self, hold: &ActiveHold) -> Result<usize, LedgerError> {
        let released = self
            .ledger
            .release_held(hold.schedule_id, &hold.seat_numbers, hold.token)
            .await?;
        tracing::debug!(
            schedule_id = %hold.schedule_id,
            token = %hold.token,
            released,
            "hold released"
        );
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySeatLedger;
    use farebox_domain::{Seat, SeatClass, SeatStatus};

    async fn manager_with(seats: &[&str], ttl: Duration) -> (HoldManager, Uuid) {
        let ledger = Arc::new(MemorySeatLedger::new());
        let schedule_id = Uuid::new_v4();
        let layout = seats
            .iter()
            .map(|n| Seat::available(*n, SeatClass::Standard, 1500))
            .collect();
        ledger.register(schedule_id, layout).await.unwrap();
        (HoldManager::new(ledger, ttl), schedule_id)
    }

    fn nums(numbers: &[&str]) -> Vec<String> {
        numbers.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn acquire_then_confirm_books_the_set() {
        let (manager, schedule_id) = manager_with(&["A1", "A2"], Duration::minutes(5)).await;

        let hold = manager
            .acquire(schedule_id, &nums(&["A1", "A2"]), None)
            .await
            .unwrap();
        manager.confirm(&hold).await.unwrap();

        let conflict = manager
            .acquire(schedule_id, &nums(&["A1"]), None)
            .await
            .unwrap_err();
        assert!(matches!(
            conflict,
            LedgerError::Conflict {
                status: SeatStatus::Booked,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn second_acquire_on_held_seats_conflicts() {
        let (manager, schedule_id) = manager_with(&["A1", "A2"], Duration::minutes(5)).await;

        manager
            .acquire(schedule_id, &nums(&["A1"]), None)
            .await
            .unwrap();
        let err = manager
            .acquire(schedule_id, &nums(&["A1", "A2"]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { .. }));
    }

    #[tokio::test]
    async fn released_seats_can_be_acquired_again() {
        let (manager, schedule_id) = manager_with(&["A1"], Duration::minutes(5)).await;

        let hold = manager.acquire(schedule_id, &nums(&["A1"]), None).await.unwrap();
        assert_eq!(manager.release(&hold).await.unwrap(), 1);

        manager.acquire(schedule_id, &nums(&["A1"]), None).await.unwrap();
    }

    #[tokio::test]
    async fn hold_lapses_after_ttl_and_seats_come_back() {
        let (manager, schedule_id) = manager_with(&["A1"], Duration::milliseconds(20)).await;

        let hold = manager.acquire(schedule_id, &nums(&["A1"]), None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(40)).await;

        let err = manager.confirm(&hold).await.unwrap_err();
        assert!(matches!(err, LedgerError::HoldExpired { .. }));

        // The lapsed hold is reclaimed on the next acquire for those seats.
        manager.acquire(schedule_id, &nums(&["A1"]), None).await.unwrap();
    }
}
