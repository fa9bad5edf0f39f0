use async_trait::async_trait;
use chrono::{DateTime, Utc};
use farebox_core::repository::{
    BookingRepository, OrderRepository, RepoResult, ScheduleRepository,
};
use farebox_domain::{Booking, BookingStatus, Order, OrderStatus, Payment, Schedule, Seat};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory repositories. The default backend when no database is
/// configured, and what the engine tests run against.
pub struct MemoryScheduleRepository {
    inner: RwLock<HashMap<Uuid, (Schedule, Vec<Seat>)>>,
}

impl MemoryScheduleRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryScheduleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduleRepository for MemoryScheduleRepository {
    async fn insert(&self, schedule: &Schedule, layout: Vec<Seat>) -> RepoResult<()> {
        self.inner
            .write()
            .await
            .insert(schedule.id, (schedule.clone(), layout));
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Schedule>> {
        Ok(self.inner.read().await.get(&id).map(|(s, _)| s.clone()))
    }

    async fn seat_layout(&self, id: Uuid) -> RepoResult<Vec<Seat>> {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|(_, layout)| layout.clone())
            .ok_or_else(|| format!("no seat layout for schedule {}", id).into())
    }

    async fn list_departed_before(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Schedule>> {
        Ok(self
            .inner
            .read()
            .await
            .values()
            .filter(|(s, _)| s.departure_at <= cutoff)
            .map(|(s, _)| s.clone())
            .collect())
    }

    async fn list_deleted(&self) -> RepoResult<Vec<Schedule>> {
        Ok(self
            .inner
            .read()
            .await
            .values()
            .filter(|(s, _)| s.is_deleted())
            .map(|(s, _)| s.clone())
            .collect())
    }

    async fn mark_deleted(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        let (schedule, _) = inner
            .get_mut(&id)
            .ok_or_else(|| format!("schedule not found: {}", id))?;
        schedule.deleted_at = Some(at);
        Ok(())
    }
}

pub struct MemoryBookingRepository {
    inner: RwLock<HashMap<Uuid, Booking>>,
}

impl MemoryBookingRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBookingRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn insert_many(&self, bookings: &[Booking]) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        for booking in bookings {
            inner.insert(booking.id, booking.clone());
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Booking>> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        let booking = inner
            .get_mut(&id)
            .ok_or_else(|| format!("booking not found: {}", id))?;
        booking.status = status;
        if status == BookingStatus::Cancelled {
            booking.cancelled_at = Some(at);
        }
        if reason.is_some() {
            booking.cancel_reason = reason;
        }
        Ok(())
    }

    async fn list_by_order(&self, order_id: Uuid) -> RepoResult<Vec<Booking>> {
        let mut rows: Vec<Booking> = self
            .inner
            .read()
            .await
            .values()
            .filter(|b| b.order_id == order_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(rows)
    }

    async fn list_active_by_schedule(&self, schedule_id: Uuid) -> RepoResult<Vec<Booking>> {
        let mut rows: Vec<Booking> = self
            .inner
            .read()
            .await
            .values()
            .filter(|b| b.schedule_id == schedule_id && b.is_active())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.seat_number.cmp(&b.seat_number));
        Ok(rows)
    }

    async fn delete_by_order(&self, order_id: Uuid) -> RepoResult<()> {
        self.inner
            .write()
            .await
            .retain(|_, b| b.order_id != order_id);
        Ok(())
    }
}

pub struct MemoryOrderRepository {
    inner: RwLock<HashMap<Uuid, Order>>,
}

impl MemoryOrderRepository {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryOrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn insert(&self, order: &Order) -> RepoResult<()> {
        self.inner.write().await.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> RepoResult<Option<Order>> {
        Ok(self.inner.read().await.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        let order = inner
            .get_mut(&id)
            .ok_or_else(|| format!("order not found: {}", id))?;
        order.status = status;
        order.updated_at = at;
        Ok(())
    }

    async fn record_payment(&self, order_id: Uuid, payment: &Payment) -> RepoResult<()> {
        let mut inner = self.inner.write().await;
        let order = inner
            .get_mut(&order_id)
            .ok_or_else(|| format!("order not found: {}", order_id))?;
        order.payment = Some(payment.clone());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> RepoResult<()> {
        self.inner.write().await.remove(&id);
        Ok(())
    }

    async fn list_pending_created_before(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Order>> {
        Ok(self
            .inner
            .read()
            .await
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at <= cutoff)
            .cloned()
            .collect())
    }

    async fn list_confirmed(&self) -> RepoResult<Vec<Order>> {
        Ok(self
            .inner
            .read()
            .await
            .values()
            .filter(|o| o.status == OrderStatus::Confirmed)
            .cloned()
            .collect())
    }
}
