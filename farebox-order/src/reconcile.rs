use chrono::{DateTime, Duration, Utc};
use farebox_core::{BookingRepository, OrderRepository, ScheduleRepository};
use farebox_domain::{BookingStatus, OrderStatus};
use farebox_inventory::{LedgerError, SeatLedger};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::manager::BookingError;

#[derive(Debug, Default, Serialize)]
pub struct SweepSummary {
    pub schedules: usize,
    pub reclaimed: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct OrphanSummary {
    pub cancelled_bookings: usize,
    pub closed_orders: usize,
    pub purged_orders: usize,
}

/// Maintenance passes that keep inventory and rows consistent over time.
/// Every job is idempotent: a second run over the same data changes
/// nothing. They run from the periodic worker and from admin endpoints.
pub struct ReconciliationService {
    ledger: Arc<dyn SeatLedger>,
    schedules: Arc<dyn ScheduleRepository>,
    bookings: Arc<dyn BookingRepository>,
    orders: Arc<dyn OrderRepository>,
    stale_order_after: Duration,
}

impl ReconciliationService {
    pub fn new(
        ledger: Arc<dyn SeatLedger>,
        schedules: Arc<dyn ScheduleRepository>,
        bookings: Arc<dyn BookingRepository>,
        orders: Arc<dyn OrderRepository>,
        stale_order_after: Duration,
    ) -> Self {
        Self {
            ledger,
            schedules,
            bookings,
            orders,
            stale_order_after,
        }
    }

    /// Reclaim lapsed holds everywhere. No order side effects: an order
    /// only exists once its hold was confirmed, so an expired hold has
    /// nothing else to clean up.
    pub async fn sweep_holds(&self) -> Result<SweepSummary, BookingError> {
        let mut summary = SweepSummary::default();
        for schedule_id in self.ledger.schedule_ids().await? {
            match self.ledger.sweep_expired(schedule_id).await {
                Ok(reclaimed) => {
                    summary.schedules += 1;
                    summary.reclaimed += reclaimed;
                }
                // A schedule unregistered between listing and sweeping.
                Err(LedgerError::ScheduleNotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
        if summary.reclaimed > 0 {
            tracing::info!(reclaimed = summary.reclaimed, "hold sweep reclaimed seats");
        }
        Ok(summary)
    }

    /// Move every still-BOOKED booking on a departed schedule to COMPLETED.
    /// The seat stays consumed. Only BOOKED rows are touched, which is what
    /// makes a re-run a no-op.
    pub async fn complete_past_trips(&self, now: DateTime<Utc>) -> Result<usize, BookingError> {
        let mut completed = 0;
        for schedule in self.schedules.list_departed_before(now).await? {
            if schedule.is_deleted() {
                continue;
            }
            for booking in self.bookings.list_active_by_schedule(schedule.id).await? {
                self.bookings
                    .update_status(booking.id, BookingStatus::Completed, None, now)
                    .await?;
                completed += 1;
            }
        }
        if completed > 0 {
            tracing::info!(completed, "past-trip completion pass");
        }
        Ok(completed)
    }

    /// Clean up rows whose parents went away:
    /// - active bookings on a soft-deleted schedule are cancelled and their
    ///   seats released, then the schedule leaves the ledger;
    /// - confirmed orders with no remaining active booking are closed;
    /// - pending orders past the stale window (checkout died before
    ///   confirmation) are purged outright.
    pub async fn purge_orphans(&self, now: DateTime<Utc>) -> Result<OrphanSummary, BookingError> {
        let mut summary = OrphanSummary::default();

        for schedule in self.schedules.list_deleted().await? {
            for booking in self.bookings.list_active_by_schedule(schedule.id).await? {
                self.bookings
                    .update_status(
                        booking.id,
                        BookingStatus::Cancelled,
                        Some("schedule removed".to_string()),
                        now,
                    )
                    .await?;
                self.release_seat_quietly(schedule.id, &booking.seat_number)
                    .await;
                summary.cancelled_bookings += 1;
            }
            self.ledger.unregister(schedule.id).await?;
        }

        for order in self.orders.list_confirmed().await? {
            let rows = self.bookings.list_by_order(order.id).await?;
            if !rows.is_empty() && rows.iter().all(|b| !b.is_active()) {
                self.orders
                    .update_status(order.id, OrderStatus::Closed, now)
                    .await?;
                summary.closed_orders += 1;
            }
        }

        let cutoff = now - self.stale_order_after;
        for order in self.orders.list_pending_created_before(cutoff).await? {
            // If the dead checkout got as far as booking seats, give them
            // back; unconfirmed holds lapse on their own.
            for booking in self.bookings.list_by_order(order.id).await? {
                self.release_seat_quietly(order.schedule_id, &booking.seat_number)
                    .await;
            }
            self.bookings.delete_by_order(order.id).await?;
            self.orders.delete(order.id).await?;
            summary.purged_orders += 1;
        }

        if summary.cancelled_bookings > 0 || summary.closed_orders > 0 || summary.purged_orders > 0
        {
            tracing::info!(
                cancelled = summary.cancelled_bookings,
                closed = summary.closed_orders,
                purged = summary.purged_orders,
                "orphan cleanup pass"
            );
        }
        Ok(summary)
    }

    async fn release_seat_quietly(&self, schedule_id: Uuid, seat_number: &str) {
        match self.ledger.release_booked(schedule_id, seat_number).await {
            Ok(()) => {}
            // Already available, or the schedule left the ledger.
            Err(LedgerError::Conflict { .. }) | Err(LedgerError::ScheduleNotFound(_)) => {}
            Err(err) => {
                tracing::error!(%schedule_id, seat_number, error = %err, "orphan seat release failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farebox_core::{Actor, CashPaymentAdapter};
    use farebox_domain::{Schedule, Seat, SeatClass};
    use farebox_inventory::MemorySeatLedger;
    use farebox_shared::ContactDetails;
    use farebox_store::memory::{
        MemoryBookingRepository, MemoryOrderRepository, MemoryScheduleRepository,
    };

    use crate::manager::{BookingEngine, CreateBookingRequest};

    struct Fixture {
        engine: BookingEngine,
        recon: ReconciliationService,
        bookings: Arc<MemoryBookingRepository>,
        orders: Arc<MemoryOrderRepository>,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(MemorySeatLedger::new());
        let schedules = Arc::new(MemoryScheduleRepository::new());
        let bookings = Arc::new(MemoryBookingRepository::new());
        let orders = Arc::new(MemoryOrderRepository::new());
        let engine = BookingEngine::new(
            ledger.clone(),
            Duration::minutes(5),
            schedules.clone(),
            bookings.clone(),
            orders.clone(),
            Arc::new(CashPaymentAdapter),
        );
        let recon = ReconciliationService::new(
            ledger,
            schedules,
            bookings.clone(),
            orders.clone(),
            Duration::minutes(15),
        );
        Fixture {
            engine,
            recon,
            bookings,
            orders,
        }
    }

    fn request(schedule_id: Uuid, seats: &[&str]) -> CreateBookingRequest {
        CreateBookingRequest {
            schedule_id,
            seat_numbers: seats.iter().map(|s| s.to_string()).collect(),
            contact: ContactDetails {
                name: "Ada".to_string(),
                phone: None,
                email: None,
            },
            passengers: Vec::new(),
        }
    }

    async fn add_schedule(fx: &Fixture, departs_in: Duration, seats: &[&str]) -> Uuid {
        let schedule = Schedule::new(
            "Springfield - Shelbyville",
            "BUS-42",
            Utc::now() + departs_in,
            1500,
            "USD",
            false,
        );
        let id = schedule.id;
        let layout = seats
            .iter()
            .map(|n| Seat::available(*n, SeatClass::Standard, 1500))
            .collect();
        fx.engine
            .add_schedule(&Actor::admin("ops-1"), schedule, layout)
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn past_trip_completion_is_idempotent() {
        let fx = fixture();
        let schedule_id = add_schedule(&fx, Duration::milliseconds(200), &["A1", "A2"]).await;

        fx.engine
            .create_booking(&Actor::customer("rider-1"), request(schedule_id, &["A1", "A2"]))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        let now = Utc::now();

        assert_eq!(fx.recon.complete_past_trips(now).await.unwrap(), 2);
        // Second run over the same data: nothing left to touch.
        assert_eq!(fx.recon.complete_past_trips(now).await.unwrap(), 0);

        let rows = fx.bookings.list_active_by_schedule(schedule_id).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn hold_sweep_reports_reclaimed_seats() {
        let fx = fixture();
        let schedule_id = add_schedule(&fx, Duration::hours(6), &["A1", "A2"]).await;

        // Trigger ledger registration, then nothing is held.
        fx.engine.seat_snapshot(schedule_id).await.unwrap();
        let summary = fx.recon.sweep_holds().await.unwrap();
        assert_eq!(summary.reclaimed, 0);
        assert_eq!(summary.schedules, 1);
    }

    #[tokio::test]
    async fn orphan_pass_cancels_rows_of_deleted_schedules_once() {
        let fx = fixture();
        let schedule_id = add_schedule(&fx, Duration::hours(6), &["A1", "A2"]).await;

        fx.engine
            .create_booking(&Actor::customer("rider-1"), request(schedule_id, &["A1"]))
            .await
            .unwrap();

        // Fleet soft-deletes the schedule underneath the booking. Bypass
        // the engine's force-cancel to leave the orphan for the job.
        fx.recon
            .schedules
            .mark_deleted(schedule_id, Utc::now())
            .await
            .unwrap();

        let first = fx.recon.purge_orphans(Utc::now()).await.unwrap();
        assert_eq!(first.cancelled_bookings, 1);
        assert_eq!(first.closed_orders, 1);

        let second = fx.recon.purge_orphans(Utc::now()).await.unwrap();
        assert_eq!(second.cancelled_bookings, 0);
        assert_eq!(second.closed_orders, 0);
    }

    #[tokio::test]
    async fn stale_pending_orders_are_purged() {
        let fx = fixture();
        let schedule_id = add_schedule(&fx, Duration::hours(6), &["A1"]).await;
        fx.engine.seat_snapshot(schedule_id).await.unwrap();

        // A checkout that died between persisting and confirming.
        let ticket = crate::tickets::TicketIssuer::new().issue(Uuid::new_v4(), &[]);
        let mut order = farebox_domain::Order::pending(
            Uuid::new_v4(),
            schedule_id,
            Some("rider-1".to_string()),
            ContactDetails {
                name: "Ada".to_string(),
                phone: None,
                email: None,
            },
            "rider-1",
            1500,
            "USD",
            ticket,
        );
        order.created_at = Utc::now() - Duration::minutes(30);
        fx.orders.insert(&order).await.unwrap();

        let summary = fx.recon.purge_orphans(Utc::now()).await.unwrap();
        assert_eq!(summary.purged_orders, 1);
        assert!(fx.orders.get(order.id).await.unwrap().is_none());

        let summary = fx.recon.purge_orphans(Utc::now()).await.unwrap();
        assert_eq!(summary.purged_orders, 0);
    }
}
