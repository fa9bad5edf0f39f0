use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Extension, Json, Router,
};
use farebox_core::Actor;
use farebox_order::TicketManifest;
use uuid::Uuid;

use crate::bookings::CheckoutResponse;
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/manifest", get(get_manifest))
        .route("/v1/orders/{id}/seats/{seat_number}", delete(remove_seat))
}

/// GET /v1/orders/{id}
async fn get_order(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let summary = state.engine.order_summary(id).await?;
    let owns = summary.order.customer_id.as_deref() == Some(actor.id.as_str());
    if !owns && !actor.is_staff() {
        return Err(AppError::Booking(farebox_order::BookingError::Forbidden(
            "not your order".to_string(),
        )));
    }
    Ok(Json(summary.into()))
}

/// GET /v1/orders/{id}/manifest: what a gate scan validates against.
async fn get_manifest(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketManifest>, AppError> {
    Ok(Json(state.engine.ticket_manifest(id).await?))
}

/// DELETE /v1/orders/{id}/seats/{seat_number}
async fn remove_seat(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path((id, seat_number)): Path<(Uuid, String)>,
) -> Result<Json<CheckoutResponse>, AppError> {
    state.engine.remove_seat(&actor, id, &seat_number).await?;
    let summary = state.engine.order_summary(id).await?;
    Ok(Json(summary.into()))
}
