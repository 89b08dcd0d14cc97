use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use shared_proto::session::Role;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::bookings::Booking;
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(all_sessions))
        .route("/sessions/cancel/:id", put(cancel_session))
}

async fn all_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Booking>>, ApiError> {
    user.require_role(Role::Admin)?;
    Ok(Json(state.bookings.list_all(state.clock.now()).await?))
}

async fn cancel_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    user.require_role(Role::Admin)?;
    state.bookings.admin_cancel(id).await?;
    tracing::info!(component = "admin.cancel", booking_id = %id, admin = %user.0.id, "session cancelled by admin");
    Ok(Json(serde_json::json!({ "message": "Session cancelled by admin", "id": id })))
}
