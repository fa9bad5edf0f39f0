use chrono::{DateTime, Utc};
use farebox_shared::ContactDetails;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::payment::Payment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Checkout in flight: rows persisted, seats not yet confirmed.
    Pending,
    Confirmed,
    /// Every booking in the order is cancelled or completed. Kept for audit.
    Closed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "CLOSED" => Ok(OrderStatus::Closed),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// The customer-facing artifact for an order: a scannable number plus a QR
/// payload covering every seat/passenger pair. Issued once, never reissued;
/// scan validation checks the pairs against the order's active bookings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub number: String,
    pub qr_payload: String,
    pub issued_at: DateTime<Utc>,
}

/// One checkout transaction: owns its bookings (by back-reference) and
/// exactly one ticket. Rows survive cancellation for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub schedule_id: Uuid,
    /// Account id of the customer, None when an admin booked for a guest.
    pub customer_id: Option<String>,
    pub contact: ContactDetails,
    /// Actor that ran the checkout; differs from the customer on the
    /// admin-on-behalf-of path.
    pub created_by: String,
    pub total_cents: i64,
    pub currency: String,
    pub status: OrderStatus,
    pub ticket: Ticket,
    pub payment: Option<Payment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        id: Uuid,
        schedule_id: Uuid,
        customer_id: Option<String>,
        contact: ContactDetails,
        created_by: impl Into<String>,
        total_cents: i64,
        currency: impl Into<String>,
        ticket: Ticket,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            schedule_id,
            customer_id,
            contact,
            created_by: created_by.into(),
            total_cents,
            currency: currency.into(),
            status: OrderStatus::Pending,
            ticket,
            payment: None,
            created_at: now,
            updated_at: now,
        }
    }
}
