use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use farebox_domain::{Seat, SeatClass, SeatStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SeatView {
    pub number: String,
    pub seat_class: SeatClass,
    pub fare_cents: i64,
    pub status: SeatStatus,
}

impl From<Seat> for SeatView {
    fn from(seat: Seat) -> Self {
        // Hold internals stay server-side; clients only see the status.
        Self {
            number: seat.number,
            seat_class: seat.class,
            fare_cents: seat.fare_cents,
            status: seat.status,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/schedules/{id}/seats", get(seat_snapshot))
}

/// GET /v1/schedules/{id}/seats: availability display, ordered by seat
/// number.
async fn seat_snapshot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SeatView>>, AppError> {
    let seats = state.engine.seat_snapshot(id).await?;
    Ok(Json(seats.into_iter().map(SeatView::from).collect()))
}
