use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A trip instance. Created by fleet management; the engine only reads it
/// and soft-deletes it once its bookings are gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub route: String,
    pub bus: String,
    pub departure_at: DateTime<Utc>,
    pub base_fare_cents: i64,
    pub currency: String,
    pub is_return: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(
        route: impl Into<String>,
        bus: impl Into<String>,
        departure_at: DateTime<Utc>,
        base_fare_cents: i64,
        currency: impl Into<String>,
        is_return: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            route: route.into(),
            bus: bus.into(),
            departure_at,
            base_fare_cents,
            currency: currency.into(),
            is_return,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn has_departed(&self, now: DateTime<Utc>) -> bool {
        self.departure_at <= now
    }
}
