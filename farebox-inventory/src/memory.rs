use async_trait::async_trait;
use chrono::{DateTime, Utc};
use farebox_domain::{Seat, SeatStatus};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::ledger::{HoldStamp, LedgerError, SeatLedger};

/// In-memory seat ledger. One `Mutex` per schedule is the serialization
/// point: the read-check-write sequence for a whole seat set runs inside a
/// single critical section, so competing checkouts for the same schedule
/// resolve first-committed-wins and no partial update is ever visible.
/// Schedules never contend with each other.
pub struct MemorySeatLedger {
    schedules: RwLock<HashMap<Uuid, Arc<Mutex<SeatMap>>>>,
}

struct SeatMap {
    seats: BTreeMap<String, Seat>,
}

impl SeatMap {
    fn new(seats: Vec<Seat>) -> Self {
        Self {
            seats: seats.into_iter().map(|s| (s.number.clone(), s)).collect(),
        }
    }

    /// Lazy reclamation: any hold whose expiry has passed goes back to
    /// available before the current operation looks at seat states.
    fn reclaim_expired(&mut self, now: DateTime<Utc>) -> usize {
        let mut reclaimed = 0;
        for seat in self.seats.values_mut() {
            if seat.hold_lapsed(now) {
                seat.status = SeatStatus::Available;
                seat.hold_token = None;
                seat.hold_expires_at = None;
                reclaimed += 1;
            }
        }
        reclaimed
    }
}

impl MemorySeatLedger {
    pub fn new() -> Self {
        Self {
            schedules: RwLock::new(HashMap::new()),
        }
    }

    async fn seat_map(&self, schedule_id: Uuid) -> Result<Arc<Mutex<SeatMap>>, LedgerError> {
        self.schedules
            .read()
            .await
            .get(&schedule_id)
            .cloned()
            .ok_or(LedgerError::ScheduleNotFound(schedule_id))
    }
}

impl Default for MemorySeatLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SeatLedger for MemorySeatLedger {
    async fn register(&self, schedule_id: Uuid, seats: Vec<Seat>) -> Result<(), LedgerError> {
        let mut schedules = self.schedules.write().await;
        schedules
            .entry(schedule_id)
            .or_insert_with(|| Arc::new(Mutex::new(SeatMap::new(seats))));
        Ok(())
    }

    async fn is_registered(&self, schedule_id: Uuid) -> Result<bool, LedgerError> {
        Ok(self.schedules.read().await.contains_key(&schedule_id))
    }

    async fn snapshot(&self, schedule_id: Uuid) -> Result<Vec<Seat>, LedgerError> {
        let map = self.seat_map(schedule_id).await?;
        let mut map = map.lock().await;
        map.reclaim_expired(Utc::now());
        Ok(map.seats.values().cloned().collect())
    }

    async fn hold_seats(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[String],
        stamp: &HoldStamp,
    ) -> Result<(), LedgerError> {
        let map = self.seat_map(schedule_id).await?;
        let mut map = map.lock().await;
        map.reclaim_expired(Utc::now());

        // Check every seat before touching any: the whole set moves or none.
        for number in seat_numbers {
            let seat = map.seats.get(number).ok_or_else(|| LedgerError::UnknownSeat {
                seat_number: number.clone(),
            })?;
            if seat.status != SeatStatus::Available {
                return Err(LedgerError::Conflict {
                    seat_number: number.clone(),
                    status: seat.status,
                });
            }
        }

        for number in seat_numbers {
            if let Some(seat) = map.seats.get_mut(number) {
                seat.status = SeatStatus::Held;
                seat.hold_token = Some(stamp.token);
                seat.hold_expires_at = Some(stamp.expires_at);
            }
        }
        Ok(())
    }

    async fn confirm_seats(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[String],
        token: Uuid,
    ) -> Result<(), LedgerError> {
        let map = self.seat_map(schedule_id).await?;
        let mut map = map.lock().await;
        map.reclaim_expired(Utc::now());

        // After reclamation a seat we no longer hold is either available
        // again or stamped with someone else's token; both mean our hold
        // lapsed underneath us.
        for number in seat_numbers {
            let seat = map.seats.get(number).ok_or_else(|| LedgerError::UnknownSeat {
                seat_number: number.clone(),
            })?;
            let held_by_us = seat.status == SeatStatus::Held && seat.hold_token == Some(token);
            if !held_by_us {
                return Err(LedgerError::HoldExpired {
                    seat_number: number.clone(),
                });
            }
        }

        for number in seat_numbers {
            if let Some(seat) = map.seats.get_mut(number) {
                seat.status = SeatStatus::Booked;
                seat.hold_token = None;
                seat.hold_expires_at = None;
            }
        }
        Ok(())
    }

    async fn release_held(
        &self,
        schedule_id: Uuid,
        seat_numbers: &[String],
        token: Uuid,
    ) -> Result<usize, LedgerError> {
        let map = self.seat_map(schedule_id).await?;
        let mut map = map.lock().await;
        map.reclaim_expired(Utc::now());

        let mut released = 0;
        for number in seat_numbers {
            if let Some(seat) = map.seats.get_mut(number) {
                if seat.status == SeatStatus::Held && seat.hold_token == Some(token) {
                    seat.status = SeatStatus::Available;
                    seat.hold_token = None;
                    seat.hold_expires_at = None;
                    released += 1;
                }
            }
        }
        Ok(released)
    }

    async fn release_booked(
        &self,
        schedule_id: Uuid,
        seat_number: &str,
    ) -> Result<(), LedgerError> {
        let map = self.seat_map(schedule_id).await?;
        let mut map = map.lock().await;

        let seat = map
            .seats
            .get_mut(seat_number)
            .ok_or_else(|| LedgerError::UnknownSeat {
                seat_number: seat_number.to_string(),
            })?;
        if seat.status != SeatStatus::Booked {
            return Err(LedgerError::Conflict {
                seat_number: seat_number.to_string(),
                status: seat.status,
            });
        }
        seat.status = SeatStatus::Available;
        seat.hold_token = None;
        seat.hold_expires_at = None;
        Ok(())
    }

    async fn sweep_expired(&self, schedule_id: Uuid) -> Result<usize, LedgerError> {
        let map = self.seat_map(schedule_id).await?;
        let mut map = map.lock().await;
        Ok(map.reclaim_expired(Utc::now()))
    }

    async fn schedule_ids(&self) -> Result<Vec<Uuid>, LedgerError> {
        Ok(self.schedules.read().await.keys().copied().collect())
    }

    async fn unregister(&self, schedule_id: Uuid) -> Result<(), LedgerError> {
        self.schedules.write().await.remove(&schedule_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use farebox_domain::SeatClass;

    fn seats(numbers: &[&str]) -> Vec<Seat> {
        numbers
            .iter()
            .map(|n| Seat::available(*n, SeatClass::Standard, 1500))
            .collect()
    }

    fn nums(numbers: &[&str]) -> Vec<String> {
        numbers.iter().map(|n| n.to_string()).collect()
    }

    async fn ledger_with(numbers: &[&str]) -> (MemorySeatLedger, Uuid) {
        let ledger = MemorySeatLedger::new();
        let schedule_id = Uuid::new_v4();
        ledger.register(schedule_id, seats(numbers)).await.unwrap();
        (ledger, schedule_id)
    }

    #[tokio::test]
    async fn hold_is_all_or_nothing() {
        let (ledger, schedule_id) = ledger_with(&["A1", "A2", "A3"]).await;

        let first = HoldStamp::new(Duration::minutes(5));
        ledger
            .hold_seats(schedule_id, &nums(&["A2"]), &first)
            .await
            .unwrap();

        // A1 is free but A2 is taken, so the pair must fail as a whole.
        let second = HoldStamp::new(Duration::minutes(5));
        let err = ledger
            .hold_seats(schedule_id, &nums(&["A1", "A2"]), &second)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { ref seat_number, .. } if seat_number == "A2"));

        let snapshot = ledger.snapshot(schedule_id).await.unwrap();
        assert_eq!(snapshot[0].status, SeatStatus::Available); // A1 untouched
        assert_eq!(snapshot[1].status, SeatStatus::Held);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_overlapping_holds_have_one_winner() {
        let (ledger, schedule_id) = ledger_with(&["A1", "A2", "A3"]).await;
        let ledger = Arc::new(ledger);

        let mut tasks = Vec::new();
        for seat_set in [nums(&["A1", "A2"]), nums(&["A2", "A3"])] {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                let stamp = HoldStamp::new(Duration::minutes(5));
                ledger.hold_seats(schedule_id, &seat_set, &stamp).await
            }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(()) => wins += 1,
                Err(LedgerError::Conflict { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 1);

        // Exactly two seats held, consistent with the winner only.
        let held = ledger
            .snapshot(schedule_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.status == SeatStatus::Held)
            .count();
        assert_eq!(held, 2);
    }

    #[tokio::test]
    async fn lapsed_hold_is_reclaimed_on_next_acquire() {
        let (ledger, schedule_id) = ledger_with(&["A1"]).await;

        let lapsed = HoldStamp {
            token: Uuid::new_v4(),
            expires_at: Utc::now() - Duration::seconds(1),
        };
        // Stamp directly with an expiry in the past; no sweep runs.
        {
            let map = ledger.seat_map(schedule_id).await.unwrap();
            let mut map = map.lock().await;
            let seat = map.seats.get_mut("A1").unwrap();
            seat.status = SeatStatus::Held;
            seat.hold_token = Some(lapsed.token);
            seat.hold_expires_at = Some(lapsed.expires_at);
        }

        let fresh = HoldStamp::new(Duration::minutes(5));
        ledger
            .hold_seats(schedule_id, &nums(&["A1"]), &fresh)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn confirm_with_lapsed_stamp_fails_and_leaves_seats_reusable() {
        let (ledger, schedule_id) = ledger_with(&["A1", "A2"]).await;

        let stamp = HoldStamp {
            token: Uuid::new_v4(),
            expires_at: Utc::now() + Duration::milliseconds(20),
        };
        ledger
            .hold_seats(schedule_id, &nums(&["A1", "A2"]), &stamp)
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(40)).await;

        let err = ledger
            .confirm_seats(schedule_id, &nums(&["A1", "A2"]), stamp.token)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::HoldExpired { .. }));

        let fresh = HoldStamp::new(Duration::minutes(5));
        ledger
            .hold_seats(schedule_id, &nums(&["A1", "A2"]), &fresh)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stale_release_does_not_steal_a_rehold() {
        let (ledger, schedule_id) = ledger_with(&["A1"]).await;

        let stale = HoldStamp {
            token: Uuid::new_v4(),
            expires_at: Utc::now() - Duration::seconds(1),
        };
        {
            let map = ledger.seat_map(schedule_id).await.unwrap();
            let mut map = map.lock().await;
            let seat = map.seats.get_mut("A1").unwrap();
            seat.status = SeatStatus::Held;
            seat.hold_token = Some(stale.token);
            seat.hold_expires_at = Some(stale.expires_at);
        }

        // Another checkout re-holds the seat after the lapse.
        let current = HoldStamp::new(Duration::minutes(5));
        ledger
            .hold_seats(schedule_id, &nums(&["A1"]), &current)
            .await
            .unwrap();

        // The stale holder's release must not free the new hold.
        let released = ledger
            .release_held(schedule_id, &nums(&["A1"]), stale.token)
            .await
            .unwrap();
        assert_eq!(released, 0);

        let snapshot = ledger.snapshot(schedule_id).await.unwrap();
        assert_eq!(snapshot[0].status, SeatStatus::Held);
        assert_eq!(snapshot[0].hold_token, Some(current.token));
    }

    #[tokio::test]
    async fn booked_seat_releases_to_available() {
        let (ledger, schedule_id) = ledger_with(&["A1"]).await;

        let stamp = HoldStamp::new(Duration::minutes(5));
        ledger
            .hold_seats(schedule_id, &nums(&["A1"]), &stamp)
            .await
            .unwrap();
        ledger
            .confirm_seats(schedule_id, &nums(&["A1"]), stamp.token)
            .await
            .unwrap();

        ledger.release_booked(schedule_id, "A1").await.unwrap();
        let snapshot = ledger.snapshot(schedule_id).await.unwrap();
        assert_eq!(snapshot[0].status, SeatStatus::Available);

        // Releasing an already-available seat is a conflict, not a no-op.
        let err = ledger.release_booked(schedule_id, "A1").await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { .. }));
    }

    #[tokio::test]
    async fn sweep_reclaims_only_lapsed_holds() {
        let (ledger, schedule_id) = ledger_with(&["A1", "A2", "A3"]).await;

        let lapsed = HoldStamp {
            token: Uuid::new_v4(),
            expires_at: Utc::now() - Duration::seconds(1),
        };
        {
            let map = ledger.seat_map(schedule_id).await.unwrap();
            let mut map = map.lock().await;
            for n in ["A1", "A2"] {
                let seat = map.seats.get_mut(n).unwrap();
                seat.status = SeatStatus::Held;
                seat.hold_token = Some(lapsed.token);
                seat.hold_expires_at = Some(lapsed.expires_at);
            }
        }
        let live = HoldStamp::new(Duration::minutes(5));
        ledger
            .hold_seats(schedule_id, &nums(&["A3"]), &live)
            .await
            .unwrap();

        assert_eq!(ledger.sweep_expired(schedule_id).await.unwrap(), 2);
        assert_eq!(ledger.sweep_expired(schedule_id).await.unwrap(), 0);

        let snapshot = ledger.snapshot(schedule_id).await.unwrap();
        assert_eq!(snapshot[2].status, SeatStatus::Held);
    }

    #[tokio::test]
    async fn snapshot_is_ordered_by_seat_number() {
        let (ledger, schedule_id) = ledger_with(&["B2", "A1", "B1"]).await;
        let numbers: Vec<String> = ledger
            .snapshot(schedule_id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.number)
            .collect();
        assert_eq!(numbers, vec!["A1", "B1", "B2"]);
    }
}
