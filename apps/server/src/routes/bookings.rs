use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use shared_proto::session::Role;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::bookings::{Booking, NewBooking, TimingView};
use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::validate_time_slot_label;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/book", post(book_session))
        .route("/user", get(user_sessions))
        .route("/therapist", get(therapist_sessions))
        .route("/cancel/:id", put(cancel_session))
        .route("/:id/timing", get(session_timing))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct BookRequest {
    therapist_id: Uuid,
    date: NaiveDate,
    #[validate(length(min = 1, max = 64), custom(function = "validate_time_slot_label"))]
    time_slot: String,
}

async fn book_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<BookRequest>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    user.require_role(Role::User)?;
    req.validate()?;

    let booking = state
        .bookings
        .create(
            NewBooking {
                user_id: user.0.id,
                therapist_id: req.therapist_id,
                date: req.date,
                time_slot: req.time_slot,
            },
            state.clock.now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

async fn user_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Booking>>, ApiError> {
    user.require_role(Role::User)?;
    let bookings = state
        .bookings
        .list_for_user(user.0.id, state.clock.now())
        .await?;
    Ok(Json(bookings))
}

async fn therapist_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Booking>>, ApiError> {
    user.require_role(Role::Therapist)?;
    let bookings = state
        .bookings
        .list_for_therapist(user.0.id, state.clock.now())
        .await?;
    Ok(Json(bookings))
}

async fn cancel_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.bookings.cancel(id, &user.0).await?;
    Ok(Json(serde_json::json!({ "message": "Session cancelled", "id": id })))
}

async fn session_timing(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TimingView>, ApiError> {
    let view = state
        .bookings
        .timing(id, &user.0, state.clock.now())
        .await?;
    Ok(Json(view))
}
