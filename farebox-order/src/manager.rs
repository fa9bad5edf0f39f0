use chrono::{Duration, Utc};
use farebox_core::{
    Actor, BookingRepository, OrderRepository, PaymentAdapter, ScheduleRepository,
};
use farebox_domain::{
    Booking, BookingStatus, Order, OrderStatus, PaymentMethod, Schedule, Seat,
};
use farebox_inventory::{ActiveHold, HoldManager, LedgerError, SeatLedger};
use farebox_shared::PassengerDetails;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::tickets::{ManifestEntry, TicketIssuer, TicketManifest};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("seat {seat_number} is not available")]
    SeatUnavailable { seat_number: String },

    #[error("hold has expired")]
    HoldExpired,

    #[error("invalid seat selection: {0}")]
    InvalidSeatSelection(String),

    #[error("order has a single remaining seat; cancel the booking instead")]
    LastSeatInOrder,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("schedule not found: {0}")]
    ScheduleNotFound(Uuid),

    #[error("schedule {0} is not open for booking")]
    ScheduleUnavailable(Uuid),

    #[error("schedule {id} still has {count} active bookings")]
    ScheduleNotEmpty { id: Uuid, count: usize },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("payment failed: {0}")]
    PaymentFailed(String),

    #[error("storage error: {0}")]
    Store(Box<dyn std::error::Error + Send + Sync>),
}

impl From<LedgerError> for BookingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Conflict { seat_number, .. } => {
                BookingError::SeatUnavailable { seat_number }
            }
            LedgerError::HoldExpired { .. } => BookingError::HoldExpired,
            LedgerError::UnknownSeat { seat_number } => {
                BookingError::InvalidSeatSelection(format!("unknown seat: {}", seat_number))
            }
            LedgerError::ScheduleNotFound(id) => BookingError::ScheduleNotFound(id),
            LedgerError::Backend(msg) => BookingError::Store(msg.into()),
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for BookingError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        BookingError::Store(err)
    }
}

/// One checkout request: a seat set on one schedule plus who is travelling.
/// An empty passenger list books every seat under the booker's own contact
/// details.
#[derive(Debug, Clone)]
pub struct CreateBookingRequest {
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub contact: farebox_shared::ContactDetails,
    pub passengers: Vec<PassengerDetails>,
}

#[derive(Debug)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub bookings: Vec<Booking>,
}

/// Orchestrates the booking lifecycle: hold -> persist -> (pay) -> confirm,
/// plus cancellation and the administrative transitions. Every path that
/// acquires a hold and fails before confirmation releases it and purges the
/// pending rows before surfacing the error.
pub struct BookingEngine {
    ledger: Arc<dyn SeatLedger>,
    holds: HoldManager,
    schedules: Arc<dyn ScheduleRepository>,
    bookings: Arc<dyn BookingRepository>,
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentAdapter>,
    tickets: TicketIssuer,
}

impl BookingEngine {
    pub fn new(
        ledger: Arc<dyn SeatLedger>,
        hold_ttl: Duration,
        schedules: Arc<dyn ScheduleRepository>,
        bookings: Arc<dyn BookingRepository>,
        orders: Arc<dyn OrderRepository>,
        payments: Arc<dyn PaymentAdapter>,
    ) -> Self {
        Self {
            holds: HoldManager::new(ledger.clone(), hold_ttl),
            ledger,
            schedules,
            bookings,
            orders,
            payments,
            tickets: TicketIssuer::new(),
        }
    }

    // ------------------------------------------------------------------
    // Checkout
    // ------------------------------------------------------------------

    /// Self-service checkout: the actor books for their own account.
    pub async fn create_booking(
        &self,
        actor: &Actor,
        request: CreateBookingRequest,
    ) -> Result<CheckoutReceipt, BookingError> {
        let schedule = self.open_schedule(request.schedule_id).await?;
        self.checkout(Some(actor.id.clone()), actor, &schedule, request, None)
            .await
    }

    /// Admin checkout on behalf of a customer (or a walk-in guest when
    /// `customer_id` is None). The payment is recorded as part of the same
    /// attempt: a failed payment aborts the checkout, and a hold that
    /// lapses after payment voids the payment again.
    pub async fn create_booking_for_user(
        &self,
        actor: &Actor,
        customer_id: Option<String>,
        request: CreateBookingRequest,
        method: PaymentMethod,
    ) -> Result<CheckoutReceipt, BookingError> {
        if !actor.is_staff() {
            return Err(BookingError::Forbidden(
                "administrator role required".to_string(),
            ));
        }
        let schedule = self.open_schedule(request.schedule_id).await?;
        self.checkout(customer_id, actor, &schedule, request, Some(method))
            .await
    }

    async fn checkout(
        &self,
        customer_id: Option<String>,
        actor: &Actor,
        schedule: &Schedule,
        request: CreateBookingRequest,
        payment_method: Option<PaymentMethod>,
    ) -> Result<CheckoutReceipt, BookingError> {
        validate_selection(&request)?;
        self.ensure_registered(schedule.id).await?;

        // Fares come from the current seat snapshot; unknown seat numbers
        // fail before a hold is attempted.
        let snapshot = self.ledger.snapshot(schedule.id).await?;
        let fares: HashMap<&str, i64> = snapshot
            .iter()
            .map(|s| (s.number.as_str(), s.fare_cents))
            .collect();
        let mut total_cents = 0i64;
        for number in &request.seat_numbers {
            match fares.get(number.as_str()) {
                Some(fare) => total_cents += fare,
                None => {
                    return Err(BookingError::InvalidSeatSelection(format!(
                        "unknown seat: {}",
                        number
                    )))
                }
            }
        }

        let hold = self
            .holds
            .acquire(schedule.id, &request.seat_numbers, None)
            .await?;

        let passengers: Vec<PassengerDetails> = if request.passengers.is_empty() {
            request
                .seat_numbers
                .iter()
                .map(|_| PassengerDetails::from_contact(&request.contact))
                .collect()
        } else {
            request.passengers.clone()
        };

        let order_id = Uuid::new_v4();
        let pairs: Vec<(String, String)> = request
            .seat_numbers
            .iter()
            .zip(passengers.iter())
            .map(|(seat, p)| (seat.clone(), p.name.clone()))
            .collect();
        let ticket = self.tickets.issue(order_id, &pairs);

        let mut order = Order::pending(
            order_id,
            schedule.id,
            customer_id.clone(),
            request.contact.clone(),
            actor.id.clone(),
            total_cents,
            schedule.currency.clone(),
            ticket,
        );
        let rows: Vec<Booking> = request
            .seat_numbers
            .iter()
            .zip(passengers.into_iter())
            .map(|(seat, passenger)| {
                let fare = fares.get(seat.as_str()).copied().unwrap_or(0);
                Booking::new(
                    order_id,
                    schedule.id,
                    seat.clone(),
                    customer_id.clone(),
                    passenger,
                    fare,
                )
            })
            .collect();

        if let Err(err) = self.orders.insert(&order).await {
            self.release_quietly(&hold).await;
            return Err(err.into());
        }
        if let Err(err) = self.bookings.insert_many(&rows).await {
            self.abort_checkout(order_id, &hold).await;
            return Err(err.into());
        }

        // Payment runs against the committed hold, never inside the seat
        // critical section.
        let mut payment = None;
        if let Some(method) = payment_method {
            match self.payments.collect(order_id, total_cents, method).await {
                Ok(p) if p.is_completed() => payment = Some(p),
                Ok(p) => {
                    self.abort_checkout(order_id, &hold).await;
                    return Err(BookingError::PaymentFailed(format!(
                        "payment returned {}",
                        p.status
                    )));
                }
                Err(err) => {
                    self.abort_checkout(order_id, &hold).await;
                    return Err(BookingError::PaymentFailed(err.to_string()));
                }
            }
        }

        if let Err(err) = self.holds.confirm(&hold).await {
            if let Some(p) = &payment {
                if let Err(void_err) = self.payments.void(p).await {
                    tracing::error!(%order_id, error = %void_err, "failed to void payment after lapsed hold");
                }
            }
            self.abort_checkout(order_id, &hold).await;
            return Err(err.into());
        }

        if let Some(p) = &payment {
            self.orders.record_payment(order_id, p).await?;
        }
        let now = Utc::now();
        self.orders
            .update_status(order_id, OrderStatus::Confirmed, now)
            .await?;

        order.status = OrderStatus::Confirmed;
        order.payment = payment;
        order.updated_at = now;

        tracing::info!(
            %order_id,
            schedule_id = %schedule.id,
            seats = rows.len(),
            ticket = %order.ticket.number,
            "booking confirmed"
        );
        Ok(CheckoutReceipt {
            order,
            bookings: rows,
        })
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// Cancel one booking. Allowed for the booking's owner and for staff.
    /// Sibling bookings in the same order are untouched; the order closes
    /// once its last active booking goes.
    pub async fn cancel_booking(
        &self,
        actor: &Actor,
        booking_id: Uuid,
    ) -> Result<(), BookingError> {
        let booking = self.booking(booking_id).await?;
        let owns = booking.user_id.as_deref() == Some(actor.id.as_str());
        if !owns && !actor.is_staff() {
            return Err(BookingError::Forbidden(
                "only the booking owner or staff may cancel".to_string(),
            ));
        }
        self.cancel_active_row(&booking, None).await
    }

    /// Staff cancellation with a recorded reason, regardless of ownership.
    pub async fn admin_cancel_booking(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        reason: String,
    ) -> Result<(), BookingError> {
        if !actor.is_staff() {
            return Err(BookingError::Forbidden(
                "administrator role required".to_string(),
            ));
        }
        let booking = self.booking(booking_id).await?;
        self.cancel_active_row(&booking, Some(reason)).await
    }

    /// Shrink a multi-seat order by exactly one seat. Refused when only one
    /// active booking remains; a full cancel is the right call then.
    pub async fn remove_seat(
        &self,
        actor: &Actor,
        order_id: Uuid,
        seat_number: &str,
    ) -> Result<(), BookingError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(BookingError::OrderNotFound(order_id))?;
        let owns = order.customer_id.as_deref() == Some(actor.id.as_str());
        if !owns && !actor.is_staff() {
            return Err(BookingError::Forbidden(
                "only the order owner or staff may modify it".to_string(),
            ));
        }

        let rows = self.bookings.list_by_order(order_id).await?;
        let active: Vec<&Booking> = rows.iter().filter(|b| b.is_active()).collect();
        if active.len() <= 1 {
            return Err(BookingError::LastSeatInOrder);
        }
        let target = active
            .into_iter()
            .find(|b| b.seat_number == seat_number)
            .ok_or_else(|| {
                BookingError::InvalidSeatSelection(format!(
                    "seat {} is not an active part of this order",
                    seat_number
                ))
            })?;
        self.cancel_active_row(target, Some("seat removed from order".to_string()))
            .await
    }

    /// Administrative status override. The only legal transitions are
    /// BOOKED -> CANCELLED and BOOKED -> COMPLETED; re-opening a cancelled
    /// or completed seat requires a fresh checkout through the hold
    /// protocol.
    pub async fn update_booking_status(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        status: BookingStatus,
        reason: Option<String>,
    ) -> Result<(), BookingError> {
        if !actor.is_staff() {
            return Err(BookingError::Forbidden(
                "administrator role required".to_string(),
            ));
        }
        let booking = self.booking(booking_id).await?;
        match (booking.status, status) {
            (BookingStatus::Booked, BookingStatus::Cancelled) => {
                self.cancel_active_row(&booking, reason).await
            }
            (BookingStatus::Booked, BookingStatus::Completed) => {
                self.bookings
                    .update_status(booking.id, BookingStatus::Completed, reason, Utc::now())
                    .await?;
                self.close_order_if_done(booking.order_id).await
            }
            (from, to) => Err(BookingError::InvalidTransition { from, to }),
        }
    }

    // ------------------------------------------------------------------
    // Schedule management (fleet boundary)
    // ------------------------------------------------------------------

    /// Register a schedule and its seat layout, as handed over by fleet
    /// management.
    pub async fn add_schedule(
        &self,
        actor: &Actor,
        schedule: Schedule,
        layout: Vec<Seat>,
    ) -> Result<(), BookingError> {
        if !actor.is_staff() {
            return Err(BookingError::Forbidden(
                "administrator role required".to_string(),
            ));
        }
        self.schedules.insert(&schedule, layout.clone()).await?;
        self.ledger.register(schedule.id, layout).await?;
        Ok(())
    }

    /// Soft-delete a schedule. Refused while active bookings exist unless
    /// forced, in which case they are cancelled and their seats released
    /// first. Returns the number of bookings cancelled.
    pub async fn remove_schedule(
        &self,
        actor: &Actor,
        schedule_id: Uuid,
        force: bool,
    ) -> Result<usize, BookingError> {
        if !actor.is_staff() {
            return Err(BookingError::Forbidden(
                "administrator role required".to_string(),
            ));
        }
        let schedule = self
            .schedules
            .get(schedule_id)
            .await?
            .ok_or(BookingError::ScheduleNotFound(schedule_id))?;
        if schedule.is_deleted() {
            return Ok(0);
        }

        let active = self.bookings.list_active_by_schedule(schedule_id).await?;
        if !active.is_empty() && !force {
            return Err(BookingError::ScheduleNotEmpty {
                id: schedule_id,
                count: active.len(),
            });
        }
        for booking in &active {
            self.cancel_active_row(booking, Some("schedule removed".to_string()))
                .await?;
        }
        self.schedules.mark_deleted(schedule_id, Utc::now()).await?;
        self.ledger.unregister(schedule_id).await?;
        Ok(active.len())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Availability view for one schedule. Non-blocking beyond the brief
    /// per-schedule lock; lapsed holds already show as available.
    pub async fn seat_snapshot(&self, schedule_id: Uuid) -> Result<Vec<Seat>, BookingError> {
        let schedule = self
            .schedules
            .get(schedule_id)
            .await?
            .ok_or(BookingError::ScheduleNotFound(schedule_id))?;
        if schedule.is_deleted() {
            return Err(BookingError::ScheduleNotFound(schedule_id));
        }
        self.ensure_registered(schedule_id).await?;
        Ok(self.ledger.snapshot(schedule_id).await?)
    }

    pub async fn order_summary(&self, order_id: Uuid) -> Result<CheckoutReceipt, BookingError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(BookingError::OrderNotFound(order_id))?;
        let bookings = self.bookings.list_by_order(order_id).await?;
        Ok(CheckoutReceipt { order, bookings })
    }

    /// The pairs a gate scan validates: only the order's active bookings.
    pub async fn ticket_manifest(&self, order_id: Uuid) -> Result<TicketManifest, BookingError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(BookingError::OrderNotFound(order_id))?;
        let entries = self
            .bookings
            .list_by_order(order_id)
            .await?
            .into_iter()
            .filter(|b| b.is_active())
            .map(|b| ManifestEntry {
                seat_number: b.seat_number,
                passenger: b.passenger.name,
            })
            .collect();
        Ok(TicketManifest {
            order_id,
            ticket_number: order.ticket.number,
            entries,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn booking(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.bookings
            .get(id)
            .await?
            .ok_or(BookingError::BookingNotFound(id))
    }

    async fn open_schedule(&self, id: Uuid) -> Result<Schedule, BookingError> {
        let schedule = self
            .schedules
            .get(id)
            .await?
            .ok_or(BookingError::ScheduleNotFound(id))?;
        if schedule.is_deleted() || schedule.has_departed(Utc::now()) {
            return Err(BookingError::ScheduleUnavailable(id));
        }
        Ok(schedule)
    }

    /// Seed the ledger from the layout provider the first time a schedule
    /// is touched.
    async fn ensure_registered(&self, schedule_id: Uuid) -> Result<(), BookingError> {
        if !self.ledger.is_registered(schedule_id).await? {
            let layout = self.schedules.seat_layout(schedule_id).await?;
            self.ledger.register(schedule_id, layout).await?;
        }
        Ok(())
    }

    async fn cancel_active_row(
        &self,
        booking: &Booking,
        reason: Option<String>,
    ) -> Result<(), BookingError> {
        if booking.status != BookingStatus::Booked {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Cancelled,
            });
        }
        let now = Utc::now();
        self.bookings
            .update_status(booking.id, BookingStatus::Cancelled, reason, now)
            .await?;
        if let Err(err) = self
            .ledger
            .release_booked(booking.schedule_id, &booking.seat_number)
            .await
        {
            tracing::error!(
                booking_id = %booking.id,
                seat = %booking.seat_number,
                error = %err,
                "seat release failed after cancellation"
            );
            return Err(err.into());
        }
        self.close_order_if_done(booking.order_id).await
    }

    async fn close_order_if_done(&self, order_id: Uuid) -> Result<(), BookingError> {
        let rows = self.bookings.list_by_order(order_id).await?;
        if rows.iter().any(|b| b.is_active()) {
            return Ok(());
        }
        self.orders
            .update_status(order_id, OrderStatus::Closed, Utc::now())
            .await?;
        Ok(())
    }

    async fn release_quietly(&self, hold: &ActiveHold) {
        if let Err(err) = self.holds.release(hold).await {
            tracing::error!(token = %hold.token, error = %err, "hold release failed");
        }
    }

    /// Undo a checkout that acquired its hold but did not reach
    /// confirmation: purge the pending rows, then give the seats back.
    async fn abort_checkout(&self, order_id: Uuid, hold: &ActiveHold) {
        if let Err(err) = self.bookings.delete_by_order(order_id).await {
            tracing::error!(%order_id, error = %err, "failed to purge pending bookings");
        }
        if let Err(err) = self.orders.delete(order_id).await {
            tracing::error!(%order_id, error = %err, "failed to purge pending order");
        }
        self.release_quietly(hold).await;
    }
}

fn validate_selection(request: &CreateBookingRequest) -> Result<(), BookingError> {
    if request.seat_numbers.is_empty() {
        return Err(BookingError::InvalidSeatSelection(
            "no seats requested".to_string(),
        ));
    }
    let distinct: HashSet<&String> = request.seat_numbers.iter().collect();
    if distinct.len() != request.seat_numbers.len() {
        return Err(BookingError::InvalidSeatSelection(
            "duplicate seat numbers".to_string(),
        ));
    }
    if !request.passengers.is_empty() && request.passengers.len() != request.seat_numbers.len() {
        return Err(BookingError::InvalidSeatSelection(
            "passenger count does not match seat count".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use farebox_core::CashPaymentAdapter;
    use farebox_domain::{Payment, PaymentStatus, SeatClass, SeatStatus};
    use farebox_inventory::MemorySeatLedger;
    use farebox_shared::ContactDetails;
    use farebox_store::memory::{
        MemoryBookingRepository, MemoryOrderRepository, MemoryScheduleRepository,
    };

    fn contact(name: &str) -> ContactDetails {
        ContactDetails {
            name: name.to_string(),
            phone: Some("+1-555-0100".to_string().into()),
            email: Some(format!("{}@example.com", name.to_lowercase()).into()),
        }
    }

    fn request(schedule_id: Uuid, seats: &[&str]) -> CreateBookingRequest {
        CreateBookingRequest {
            schedule_id,
            seat_numbers: seats.iter().map(|s| s.to_string()).collect(),
            contact: contact("Ada"),
            passengers: Vec::new(),
        }
    }

    struct DecliningPaymentAdapter;

    #[async_trait]
    impl PaymentAdapter for DecliningPaymentAdapter {
        async fn collect(
            &self,
            order_id: Uuid,
            amount_cents: i64,
            method: PaymentMethod,
        ) -> Result<Payment, Box<dyn std::error::Error + Send + Sync>> {
            Ok(Payment {
                id: Uuid::new_v4(),
                order_id,
                amount_cents,
                method,
                status: PaymentStatus::Failed,
                external_ref: None,
                created_at: Utc::now(),
            })
        }

        async fn void(
            &self,
            payment: &Payment,
        ) -> Result<Payment, Box<dyn std::error::Error + Send + Sync>> {
            Ok(payment.clone())
        }
    }

    async fn engine_with_adapter(
        seats: &[&str],
        adapter: Arc<dyn PaymentAdapter>,
    ) -> (Arc<BookingEngine>, Uuid) {
        let ledger = Arc::new(MemorySeatLedger::new());
        let schedules = Arc::new(MemoryScheduleRepository::new());
        let bookings = Arc::new(MemoryBookingRepository::new());
        let orders = Arc::new(MemoryOrderRepository::new());
        let engine = Arc::new(BookingEngine::new(
            ledger,
            Duration::minutes(5),
            schedules,
            bookings,
            orders,
            adapter,
        ));

        let schedule = Schedule::new(
            "Springfield - Shelbyville",
            "BUS-42",
            Utc::now() + Duration::hours(6),
            1500,
            "USD",
            false,
        );
        let schedule_id = schedule.id;
        let layout = seats
            .iter()
            .map(|n| Seat::available(*n, SeatClass::Standard, 1500))
            .collect();
        engine
            .add_schedule(&Actor::admin("ops-1"), schedule, layout)
            .await
            .unwrap();
        (engine, schedule_id)
    }

    async fn engine_with(seats: &[&str]) -> (Arc<BookingEngine>, Uuid) {
        engine_with_adapter(seats, Arc::new(CashPaymentAdapter)).await
    }

    async fn booked_count(engine: &BookingEngine, schedule_id: Uuid) -> usize {
        engine
            .seat_snapshot(schedule_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|s| s.status == SeatStatus::Booked)
            .count()
    }

    #[tokio::test]
    async fn checkout_creates_one_order_one_ticket_per_seat_bookings() {
        let (engine, schedule_id) = engine_with(&["A1", "A2", "A3"]).await;
        let rider = Actor::customer("rider-1");

        let receipt = engine
            .create_booking(&rider, request(schedule_id, &["A1", "A2"]))
            .await
            .unwrap();

        assert_eq!(receipt.order.status, OrderStatus::Confirmed);
        assert_eq!(receipt.order.total_cents, 3000);
        assert_eq!(receipt.bookings.len(), 2);
        assert!(receipt.order.ticket.number.starts_with("FBX-"));
        assert!(receipt
            .bookings
            .iter()
            .all(|b| b.order_id == receipt.order.id && b.status == BookingStatus::Booked));
        assert_eq!(booked_count(&engine, schedule_id).await, 2);
    }

    #[tokio::test]
    async fn empty_and_duplicate_selections_are_rejected() {
        let (engine, schedule_id) = engine_with(&["A1", "A2"]).await;
        let rider = Actor::customer("rider-1");

        let err = engine
            .create_booking(&rider, request(schedule_id, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidSeatSelection(_)));

        let err = engine
            .create_booking(&rider, request(schedule_id, &["A1", "A1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidSeatSelection(_)));

        // Nothing was held along the way.
        let retry = engine
            .create_booking(&rider, request(schedule_id, &["A1", "A2"]))
            .await;
        assert!(retry.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_checkouts_resolve_first_committed_wins() {
        let (engine, schedule_id) = engine_with(&["A1", "A2", "A3"]).await;

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .create_booking(&Actor::customer("rider-1"), request(schedule_id, &["A1", "A2"]))
                    .await
            })
        };
        let second = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .create_booking(&Actor::customer("rider-2"), request(schedule_id, &["A2", "A3"]))
                    .await
            })
        };

        let results = vec![first.await.unwrap(), second.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        let loser = results.into_iter().find(|r| r.is_err()).unwrap().unwrap_err();
        assert!(matches!(loser, BookingError::SeatUnavailable { .. }));

        // Ledger state is consistent with the winner only.
        assert_eq!(booked_count(&engine, schedule_id).await, 2);
    }

    #[tokio::test]
    async fn cancelling_one_of_three_releases_exactly_that_seat() {
        let (engine, schedule_id) = engine_with(&["A1", "A2", "A3"]).await;
        let rider = Actor::customer("rider-1");

        let receipt = engine
            .create_booking(&rider, request(schedule_id, &["A1", "A2", "A3"]))
            .await
            .unwrap();
        let victim = receipt
            .bookings
            .iter()
            .find(|b| b.seat_number == "A2")
            .unwrap();

        engine.cancel_booking(&rider, victim.id).await.unwrap();

        let snapshot = engine.seat_snapshot(schedule_id).await.unwrap();
        let by_number: HashMap<&str, SeatStatus> = snapshot
            .iter()
            .map(|s| (s.number.as_str(), s.status))
            .collect();
        assert_eq!(by_number["A1"], SeatStatus::Booked);
        assert_eq!(by_number["A2"], SeatStatus::Available);
        assert_eq!(by_number["A3"], SeatStatus::Booked);

        // Ticket survives and the manifest now covers the remaining two.
        let manifest = engine.ticket_manifest(receipt.order.id).await.unwrap();
        assert_eq!(manifest.ticket_number, receipt.order.ticket.number);
        assert_eq!(manifest.entries.len(), 2);

        // Order stays open while active bookings remain.
        let summary = engine.order_summary(receipt.order.id).await.unwrap();
        assert_eq!(summary.order.status, OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn cancelling_the_last_booking_closes_the_order() {
        let (engine, schedule_id) = engine_with(&["A1"]).await;
        let rider = Actor::customer("rider-1");

        let receipt = engine
            .create_booking(&rider, request(schedule_id, &["A1"]))
            .await
            .unwrap();
        engine
            .cancel_booking(&rider, receipt.bookings[0].id)
            .await
            .unwrap();

        let summary = engine.order_summary(receipt.order.id).await.unwrap();
        assert_eq!(summary.order.status, OrderStatus::Closed);
        assert_eq!(booked_count(&engine, schedule_id).await, 0);
    }

    #[tokio::test]
    async fn strangers_cannot_cancel_but_staff_can() {
        let (engine, schedule_id) = engine_with(&["A1", "A2"]).await;
        let rider = Actor::customer("rider-1");

        let receipt = engine
            .create_booking(&rider, request(schedule_id, &["A1", "A2"]))
            .await
            .unwrap();

        let err = engine
            .cancel_booking(&Actor::customer("rider-2"), receipt.bookings[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));

        engine
            .admin_cancel_booking(
                &Actor::admin("ops-1"),
                receipt.bookings[0].id,
                "customer no-show".to_string(),
            )
            .await
            .unwrap();

        let summary = engine.order_summary(receipt.order.id).await.unwrap();
        let cancelled = summary
            .bookings
            .iter()
            .find(|b| b.id == receipt.bookings[0].id)
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("customer no-show"));
    }

    #[tokio::test]
    async fn double_cancel_is_rejected() {
        let (engine, schedule_id) = engine_with(&["A1", "A2"]).await;
        let rider = Actor::customer("rider-1");

        let receipt = engine
            .create_booking(&rider, request(schedule_id, &["A1", "A2"]))
            .await
            .unwrap();
        engine
            .cancel_booking(&rider, receipt.bookings[0].id)
            .await
            .unwrap();
        let err = engine
            .cancel_booking(&rider, receipt.bookings[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn remove_seat_shrinks_the_order_but_not_to_zero() {
        let (engine, schedule_id) = engine_with(&["A1", "A2"]).await;
        let rider = Actor::customer("rider-1");

        let receipt = engine
            .create_booking(&rider, request(schedule_id, &["A1", "A2"]))
            .await
            .unwrap();

        engine
            .remove_seat(&rider, receipt.order.id, "A2")
            .await
            .unwrap();
        assert_eq!(booked_count(&engine, schedule_id).await, 1);

        let err = engine
            .remove_seat(&rider, receipt.order.id, "A1")
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::LastSeatInOrder));
    }

    #[tokio::test]
    async fn admin_checkout_records_a_completed_payment() {
        let (engine, schedule_id) = engine_with(&["A1", "A2"]).await;
        let admin = Actor::admin("ops-1");

        let receipt = engine
            .create_booking_for_user(
                &admin,
                None,
                request(schedule_id, &["A1"]),
                PaymentMethod::Cash,
            )
            .await
            .unwrap();

        let payment = receipt.order.payment.as_ref().unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.amount_cents, 1500);
        assert_eq!(receipt.order.created_by, "ops-1");
        assert!(receipt.order.customer_id.is_none());
    }

    #[tokio::test]
    async fn declined_payment_rolls_the_whole_attempt_back() {
        let (engine, schedule_id) =
            engine_with_adapter(&["A1", "A2"], Arc::new(DecliningPaymentAdapter)).await;
        let admin = Actor::admin("ops-1");

        let err = engine
            .create_booking_for_user(
                &admin,
                Some("rider-9".to_string()),
                request(schedule_id, &["A1", "A2"]),
                PaymentMethod::Card,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::PaymentFailed(_)));

        // No order survived and the seats are free again.
        let snapshot = engine.seat_snapshot(schedule_id).await.unwrap();
        assert!(snapshot.iter().all(|s| s.status == SeatStatus::Available));
        let retry = engine
            .create_booking(&Actor::customer("rider-3"), request(schedule_id, &["A1", "A2"]))
            .await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn non_staff_cannot_use_the_admin_checkout() {
        let (engine, schedule_id) = engine_with(&["A1"]).await;
        let err = engine
            .create_booking_for_user(
                &Actor::customer("rider-1"),
                None,
                request(schedule_id, &["A1"]),
                PaymentMethod::Cash,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Forbidden(_)));
    }

    #[tokio::test]
    async fn status_update_cannot_reopen_a_cancelled_seat() {
        let (engine, schedule_id) = engine_with(&["A1"]).await;
        let rider = Actor::customer("rider-1");
        let admin = Actor::admin("ops-1");

        let receipt = engine
            .create_booking(&rider, request(schedule_id, &["A1"]))
            .await
            .unwrap();
        let booking_id = receipt.bookings[0].id;

        engine.cancel_booking(&rider, booking_id).await.unwrap();

        let err = engine
            .update_booking_status(&admin, booking_id, BookingStatus::Booked, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
        let err = engine
            .update_booking_status(&admin, booking_id, BookingStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn booking_a_departed_schedule_is_refused() {
        let (engine, _) = engine_with(&["A1"]).await;
        let admin = Actor::admin("ops-1");

        let departed = Schedule::new(
            "Springfield - Ogdenville",
            "BUS-7",
            Utc::now() - Duration::hours(1),
            1200,
            "USD",
            false,
        );
        let departed_id = departed.id;
        engine
            .add_schedule(
                &admin,
                departed,
                vec![Seat::available("A1", SeatClass::Standard, 1200)],
            )
            .await
            .unwrap();

        let err = engine
            .create_booking(&Actor::customer("rider-1"), request(departed_id, &["A1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::ScheduleUnavailable(_)));
    }

    #[tokio::test]
    async fn schedule_removal_requires_force_while_bookings_exist() {
        let (engine, schedule_id) = engine_with(&["A1", "A2"]).await;
        let rider = Actor::customer("rider-1");
        let admin = Actor::admin("ops-1");

        engine
            .create_booking(&rider, request(schedule_id, &["A1", "A2"]))
            .await
            .unwrap();

        let err = engine
            .remove_schedule(&admin, schedule_id, false)
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::ScheduleNotEmpty { count: 2, .. }));

        let cancelled = engine
            .remove_schedule(&admin, schedule_id, true)
            .await
            .unwrap();
        assert_eq!(cancelled, 2);

        // Snapshot of a deleted schedule is gone.
        let err = engine.seat_snapshot(schedule_id).await.unwrap_err();
        assert!(matches!(err, BookingError::ScheduleNotFound(_)));
    }
}
