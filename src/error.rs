use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Seat coordinate outside the hall geometry. Carries the rejected value and
/// the inclusive upper bound so handlers can render the valid range.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SeatError {
    #[error("row number must be in available range: (1, {bound}), got {value}")]
    RowOutOfRange { value: i32, bound: i32 },
    #[error("seat number must be in available range: (1, {bound}), got {value}")]
    SeatOutOfRange { value: i32, bound: i32 },
}

/// Everything that can go wrong while creating a reservation or computing
/// availability. Business-rule variants are user-correctable and map to 4xx;
/// `TransactionFailed` is an opaque 500 whose detail goes to the log only.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("a reservation must contain at least one ticket")]
    EmptyReservation,
    #[error("performance {0} not found")]
    PerformanceNotFound(i64),
    #[error(transparent)]
    InvalidSeat(#[from] SeatError),
    #[error("seat already taken: performance {performance_id}, row {row}, seat {seat}")]
    SeatAlreadyTaken {
        performance_id: i64,
        row: i32,
        seat: i32,
    },
    #[error("storage transaction failed")]
    TransactionFailed(#[source] sqlx::Error),
}

impl BookingError {
    pub fn status(&self) -> StatusCode {
        match self {
            BookingError::EmptyReservation | BookingError::InvalidSeat(_) => {
                StatusCode::BAD_REQUEST
            }
            BookingError::PerformanceNotFound(_) => StatusCode::NOT_FOUND,
            BookingError::SeatAlreadyTaken { .. } => StatusCode::CONFLICT,
            BookingError::TransactionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();

        let body = match &self {
            BookingError::TransactionFailed(e) => {
                tracing::error!("reservation transaction failed: {:?}", e);
                json!({ "error": "internal server error" })
            }
            BookingError::SeatAlreadyTaken {
                performance_id,
                row,
                seat,
            } => json!({
                "error": self.to_string(),
                "performance": performance_id,
                "row": row,
                "seat": seat,
            }),
            other => json!({ "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Errors from the catalog/venue CRUD surface.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seat_errors_name_the_valid_range() {
        let err = SeatError::RowOutOfRange { value: 6, bound: 5 };
        assert_eq!(
            err.to_string(),
            "row number must be in available range: (1, 5), got 6"
        );

        let err = SeatError::SeatOutOfRange { value: 11, bound: 10 };
        assert_eq!(
            err.to_string(),
            "seat number must be in available range: (1, 10), got 11"
        );
    }

    #[test]
    fn booking_errors_map_to_expected_statuses() {
        assert_eq!(
            BookingError::EmptyReservation.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BookingError::PerformanceNotFound(42).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BookingError::InvalidSeat(SeatError::RowOutOfRange { value: 0, bound: 5 }).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BookingError::SeatAlreadyTaken {
                performance_id: 1,
                row: 2,
                seat: 3
            }
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            BookingError::TransactionFailed(sqlx::Error::PoolClosed).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
