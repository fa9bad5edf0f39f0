use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use farebox_core::Actor;
use farebox_domain::{
    BookingStatus, PaymentMethod, Schedule, Seat, SeatClass,
};
use farebox_order::{OrphanSummary, SweepSummary};
use farebox_shared::{ContactDetails, PassengerDetails};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bookings::CheckoutResponse;
use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AdminCreateBookingBody {
    /// Account of the customer being booked for; None books a walk-in guest.
    pub customer_id: Option<String>,
    pub schedule_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub contact: ContactDetails,
    #[serde(default)]
    pub passengers: Vec<PassengerDetails>,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct AdminCancelBody {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    pub status: BookingStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeatSpec {
    pub number: String,
    #[serde(default = "default_seat_class")]
    pub class: SeatClass,
}

fn default_seat_class() -> SeatClass {
    SeatClass::Standard
}

#[derive(Debug, Deserialize)]
pub struct CreateScheduleBody {
    pub route: String,
    pub bus: String,
    pub departure_at: DateTime<Utc>,
    pub base_fare_cents: i64,
    pub currency: Option<String>,
    #[serde(default)]
    pub is_return: bool,
    pub seats: Vec<SeatSpec>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleCreatedResponse {
    pub schedule_id: Uuid,
    pub seats: usize,
}

#[derive(Debug, Deserialize)]
pub struct RemoveScheduleQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct RemoveScheduleResponse {
    pub schedule_id: Uuid,
    pub cancelled_bookings: usize,
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub completed: usize,
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/bookings", post(create_booking_for_user))
        .route("/v1/admin/bookings/{id}/cancel", post(admin_cancel_booking))
        .route("/v1/admin/bookings/{id}/status", patch(update_booking_status))
        .route("/v1/admin/schedules", post(create_schedule))
        .route("/v1/admin/schedules/{id}", delete(remove_schedule))
        .route("/v1/admin/reconcile/holds", post(sweep_holds))
        .route("/v1/admin/reconcile/completions", post(complete_past_trips))
        .route("/v1/admin/reconcile/orphans", post(purge_orphans))
}

// ============================================================================
// Booking Handlers
// ============================================================================

/// POST /v1/admin/bookings: book on behalf of a customer; the payment
/// (CASH included) is part of the same attempt.
async fn create_booking_for_user(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<AdminCreateBookingBody>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let request = farebox_order::CreateBookingRequest {
        schedule_id: body.schedule_id,
        seat_numbers: body.seat_numbers,
        contact: body.contact,
        passengers: body.passengers,
    };
    let receipt = state
        .engine
        .create_booking_for_user(&actor, body.customer_id, request, body.payment_method)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// POST /v1/admin/bookings/{id}/cancel
async fn admin_cancel_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<AdminCancelBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .engine
        .admin_cancel_booking(&actor, id, body.reason)
        .await?;
    Ok(Json(serde_json::json!({
        "booking_id": id,
        "status": "CANCELLED",
    })))
}

/// PATCH /v1/admin/bookings/{id}/status
async fn update_booking_status(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .engine
        .update_booking_status(&actor, id, body.status, body.reason)
        .await?;
    Ok(Json(serde_json::json!({
        "booking_id": id,
        "status": body.status,
    })))
}

// ============================================================================
// Schedule Handlers (fleet boundary)
// ============================================================================

/// POST /v1/admin/schedules: register a trip and its seat layout.
async fn create_schedule(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(body): Json<CreateScheduleBody>,
) -> Result<(StatusCode, Json<ScheduleCreatedResponse>), AppError> {
    if body.seats.is_empty() {
        return Err(AppError::Booking(
            farebox_order::BookingError::InvalidSeatSelection(
                "schedule needs at least one seat".to_string(),
            ),
        ));
    }

    let currency = body
        .currency
        .unwrap_or_else(|| state.rules.currency.clone());
    let schedule = Schedule::new(
        body.route,
        body.bus,
        body.departure_at,
        body.base_fare_cents,
        currency,
        body.is_return,
    );
    let premium_fare =
        (body.base_fare_cents as f64 * state.rules.premium_fare_multiplier).round() as i64;
    let layout: Vec<Seat> = body
        .seats
        .iter()
        .map(|spec| {
            let fare = match spec.class {
                SeatClass::Standard => body.base_fare_cents,
                SeatClass::Premium => premium_fare,
            };
            Seat::available(spec.number.clone(), spec.class, fare)
        })
        .collect();

    let schedule_id = schedule.id;
    let seat_count = layout.len();
    state.engine.add_schedule(&actor, schedule, layout).await?;
    Ok((
        StatusCode::CREATED,
        Json(ScheduleCreatedResponse {
            schedule_id,
            seats: seat_count,
        }),
    ))
}

/// DELETE /v1/admin/schedules/{id}?force=true
async fn remove_schedule(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Query(query): Query<RemoveScheduleQuery>,
) -> Result<Json<RemoveScheduleResponse>, AppError> {
    let cancelled = state.engine.remove_schedule(&actor, id, query.force).await?;
    Ok(Json(RemoveScheduleResponse {
        schedule_id: id,
        cancelled_bookings: cancelled,
    }))
}

// ============================================================================
// Reconciliation Triggers
// ============================================================================

/// POST /v1/admin/reconcile/holds
async fn sweep_holds(State(state): State<AppState>) -> Result<Json<SweepSummary>, AppError> {
    Ok(Json(state.recon.sweep_holds().await?))
}

/// POST /v1/admin/reconcile/completions
async fn complete_past_trips(
    State(state): State<AppState>,
) -> Result<Json<CompletionResponse>, AppError> {
    let completed = state.recon.complete_past_trips(Utc::now()).await?;
    Ok(Json(CompletionResponse { completed }))
}

/// POST /v1/admin/reconcile/orphans
async fn purge_orphans(State(state): State<AppState>) -> Result<Json<OrphanSummary>, AppError> {
    Ok(Json(state.recon.purge_orphans(Utc::now()).await?))
}
