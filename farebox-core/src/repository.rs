use async_trait::async_trait;
use chrono::{DateTime, Utc};
use farebox_domain::{Booking, BookingStatus, Order, OrderStatus, Payment, Schedule, Seat};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Repository trait for schedule data access. Schedules are created by the
/// fleet collaborator; the engine reads them, pulls their seat layout for
/// ledger registration, and soft-deletes them during cleanup.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn insert(&self, schedule: &Schedule, layout: Vec<Seat>) -> RepoResult<()>;

    async fn get(&self, id: Uuid) -> RepoResult<Option<Schedule>>;

    /// The seat list (number, class, fare) the bus layout defines for this
    /// schedule, as generated at schedule-creation time.
    async fn seat_layout(&self, id: Uuid) -> RepoResult<Vec<Seat>>;

    async fn list_departed_before(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Schedule>>;

    async fn list_deleted(&self) -> RepoResult<Vec<Schedule>>;

    async fn mark_deleted(&self, id: Uuid, at: DateTime<Utc>) -> RepoResult<()>;
}

/// Repository trait for booking rows.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Persist a checkout's booking set in one go.
    async fn insert_many(&self, bookings: &[Booking]) -> RepoResult<()>;

    async fn get(&self, id: Uuid) -> RepoResult<Option<Booking>>;

    async fn update_status(
        &self,
        id: Uuid,
        status: BookingStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> RepoResult<()>;

    async fn list_by_order(&self, order_id: Uuid) -> RepoResult<Vec<Booking>>;

    async fn list_active_by_schedule(&self, schedule_id: Uuid) -> RepoResult<Vec<Booking>>;

    /// Remove every row of a checkout that never reached confirmation.
    async fn delete_by_order(&self, order_id: Uuid) -> RepoResult<()>;
}

/// Repository trait for orders (each owning its ticket and payment record).
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> RepoResult<()>;

    async fn get(&self, id: Uuid) -> RepoResult<Option<Order>>;

    async fn update_status(&self, id: Uuid, status: OrderStatus, at: DateTime<Utc>) -> RepoResult<()>;

    async fn record_payment(&self, order_id: Uuid, payment: &Payment) -> RepoResult<()>;

    async fn delete(&self, id: Uuid) -> RepoResult<()>;

    /// Checkouts that died between persisting rows and confirming seats.
    async fn list_pending_created_before(&self, cutoff: DateTime<Utc>) -> RepoResult<Vec<Order>>;

    async fn list_confirmed(&self) -> RepoResult<Vec<Order>>;
}
