use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use haven_catalog::room::CatalogError;
use haven_order::engine::ReservationError;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    Catalog(CatalogError),
    Reservation(ReservationError),
    Unauthorized(String),
    Internal(String),
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        Self::Catalog(e)
    }
}

impl From<ReservationError> for ApiError {
    fn from(e: ReservationError) -> Self {
        Self::Reservation(e)
    }
}

/// API error response structure.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Catalog(CatalogError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Room not found: {id}"),
            ),
            ApiError::Catalog(CatalogError::NotOwner(id)) => (
                StatusCode::FORBIDDEN,
                "NOT_OWNER",
                format!("Caller does not own room {id}"),
            ),
            ApiError::Catalog(CatalogError::InvalidPayload(msg)) => {
                (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", msg)
            }
            ApiError::Catalog(CatalogError::Booked(id)) => (
                StatusCode::CONFLICT,
                "BOOKED",
                format!("Room {id} is currently reserved"),
            ),
            ApiError::Reservation(ReservationError::NotFound(what)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", format!("Not found: {what}"))
            }
            ApiError::Reservation(ReservationError::Booked(id)) => (
                StatusCode::CONFLICT,
                "BOOKED",
                format!("Room {id} is booked"),
            ),
            ApiError::Reservation(ReservationError::NotBooked(id)) => (
                StatusCode::CONFLICT,
                "NOT_BOOKED",
                format!("Room {id} is not booked"),
            ),
            ApiError::Reservation(ReservationError::InvalidPayload(msg)) => {
                (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", msg)
            }
            ApiError::Reservation(ReservationError::PaymentFailed(msg)) => {
                (StatusCode::BAD_GATEWAY, "PAYMENT_FAILED", msg)
            }
            ApiError::Catalog(CatalogError::Store(msg))
            | ApiError::Reservation(ReservationError::Store(msg)) => {
                tracing::error!("Store error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}
