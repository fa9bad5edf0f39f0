use chrono::{DateTime, Utc};
use farebox_shared::PassengerDetails;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Booked,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "BOOKED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOKED" => Ok(BookingStatus::Booked),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

/// One passenger on one seat. A booking never changes its seat or schedule
/// after creation; cancellation flips the status and releases the seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub order_id: Uuid,
    pub schedule_id: Uuid,
    pub seat_number: String,
    /// Account id of the passenger, None for admin-created guest bookings.
    pub user_id: Option<String>,
    pub passenger: PassengerDetails,
    pub fare_cents: i64,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

impl Booking {
    pub fn new(
        order_id: Uuid,
        schedule_id: Uuid,
        seat_number: impl Into<String>,
        user_id: Option<String>,
        passenger: PassengerDetails,
        fare_cents: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            schedule_id,
            seat_number: seat_number.into(),
            user_id,
            passenger,
            fare_cents,
            status: BookingStatus::Booked,
            created_at: Utc::now(),
            cancelled_at: None,
            cancel_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Booked
    }
}
