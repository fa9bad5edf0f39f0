use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Extension, Json, Router,
};
use farebox_core::Actor;
use farebox_domain::{BookingStatus, OrderStatus, PaymentStatus};
use farebox_order::{CheckoutReceipt, CreateBookingRequest};
use farebox_shared::{ContactDetails, PassengerDetails};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateBookingBody {
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub contact: ContactDetails,
    #[serde(default)]
    pub passengers: Vec<PassengerDetails>,
}

impl CreateBookingBody {
    pub fn into_request(self) -> CreateBookingRequest {
        CreateBookingRequest {
            schedule_id: self.schedule_id,
            seat_numbers: self.seat_numbers,
            contact: self.contact,
            passengers: self.passengers,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingView {
    pub booking_id: Uuid,
    pub seat_number: String,
    pub passenger: String,
    pub fare_cents: i64,
    pub status: BookingStatus,
}

#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub method: String,
    pub status: PaymentStatus,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub ticket_number: String,
    pub qr_payload: String,
    pub total_cents: i64,
    pub currency: String,
    pub payment: Option<PaymentView>,
    pub bookings: Vec<BookingView>,
}

impl From<CheckoutReceipt> for CheckoutResponse {
    fn from(receipt: CheckoutReceipt) -> Self {
        Self {
            order_id: receipt.order.id,
            status: receipt.order.status,
            ticket_number: receipt.order.ticket.number.clone(),
            qr_payload: receipt.order.ticket.qr_payload.clone(),
            total_cents: receipt.order.total_cents,
            currency: receipt.order.currency.clone(),
            payment: receipt.order.payment.as_ref().map(|p| PaymentView {
                payment_id: p.id,
                amount_cents: p.amount_cents,
                method: p.method.to_string(),
                status: p.status,
            }),
            bookings: receipt
                .bookings
                .into_iter()
                .map(|b| BookingView {
                    booking_id: b.id,
                    seat_number: b.seat_number,
                    passenger: b.passenger.name,
                    fare_cents: b.fare_cents,
                    status: b.status,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub booking_id: Uuid,
    pub status: BookingStatus,
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

/// POST /v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CreateBookingBody>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let receipt = state
        .engine
        .create_booking(&actor, body.into_request())
        .await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// POST /v1/bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    state.engine.cancel_booking(&actor, id).await?;
    Ok(Json(CancelResponse {
        booking_id: id,
        status: BookingStatus::Cancelled,
    }))
}
