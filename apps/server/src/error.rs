use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared_proto::signaling::JoinRejectReason;

use crate::auth::AuthError;
use crate::bookings::BookingError;
use crate::registry::RegistryError;

/// Error surface of the HTTP routes.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Booking(#[from] BookingError),
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Auth(err) => (err.status(), err.code(), self.to_string()),
            ApiError::Booking(err) => match err {
                BookingError::PastWindow => (StatusCode::BAD_REQUEST, "past_window", err.to_string()),
                BookingError::Overlap => (StatusCode::CONFLICT, "overlap", err.to_string()),
                BookingError::NotFound => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
                BookingError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", err.to_string()),
                BookingError::Validation(_) => {
                    (StatusCode::BAD_REQUEST, "validation", err.to_string())
                }
                BookingError::Store(inner) => {
                    tracing::error!(component = "http", error = %inner, "booking store failure");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal",
                        "Database error".to_string(),
                    )
                }
            },
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "validation", self.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message, "code": code }))).into_response()
    }
}

/// Why a connection was refused entry into a session room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinRejection {
    #[error("booking not found")]
    BookingNotFound,
    #[error("not a participant of this booking")]
    NotParticipant,
    #[error("booking was cancelled")]
    Cancelled,
    #[error("session window has ended")]
    Expired,
    #[error("room is full")]
    RoomFull,
    #[error("booking could not be checked")]
    Unavailable,
}

impl JoinRejection {
    pub fn reason(self) -> JoinRejectReason {
        match self {
            JoinRejection::BookingNotFound => JoinRejectReason::BookingNotFound,
            JoinRejection::NotParticipant => JoinRejectReason::NotParticipant,
            JoinRejection::Cancelled => JoinRejectReason::Cancelled,
            JoinRejection::Expired => JoinRejectReason::Expired,
            JoinRejection::RoomFull => JoinRejectReason::RoomFull,
            JoinRejection::Unavailable => JoinRejectReason::Unavailable,
        }
    }
}

impl From<RegistryError> for JoinRejection {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::RoomFull { .. } => JoinRejection::RoomFull,
        }
    }
}
