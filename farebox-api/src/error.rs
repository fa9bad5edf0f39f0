use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use farebox_order::BookingError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Auth(String),
    Booking(BookingError),
    Internal(anyhow::Error),
}

impl AppError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        Self::Booking(err)
    }
}

fn booking_status(err: &BookingError) -> StatusCode {
    match err {
        BookingError::SeatUnavailable { .. } => StatusCode::CONFLICT,
        BookingError::HoldExpired => StatusCode::GONE,
        BookingError::InvalidSeatSelection(_)
        | BookingError::LastSeatInOrder
        | BookingError::InvalidTransition { .. }
        | BookingError::ScheduleUnavailable(_)
        | BookingError::ScheduleNotEmpty { .. } => StatusCode::BAD_REQUEST,
        BookingError::Forbidden(_) => StatusCode::FORBIDDEN,
        BookingError::BookingNotFound(_)
        | BookingError::OrderNotFound(_)
        | BookingError::ScheduleNotFound(_) => StatusCode::NOT_FOUND,
        BookingError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
        BookingError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Booking(err) => {
                let status = booking_status(&err);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("booking engine error: {}", err);
                    (status, "Internal Server Error".to_string())
                } else {
                    (status, err.to_string())
                }
            }
            AppError::Internal(err) => {
                tracing::error!("internal error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
