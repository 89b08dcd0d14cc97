use axum::async_trait;
use chrono::NaiveDateTime;
use shared_proto::session::BookingStatus;
use uuid::Uuid;

use super::model::Booking;
use crate::time_window::TimeWindow;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt booking row {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

/// Persistence boundary for bookings. Only status is ever rewritten.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, StoreError>;

    async fn list_for_therapist(&self, therapist_id: Uuid) -> Result<Vec<Booking>, StoreError>;

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError>;

    /// First non-cancelled booking of `therapist_id` whose window intersects `window`.
    async fn find_overlapping(
        &self,
        therapist_id: Uuid,
        window: &TimeWindow,
    ) -> Result<Option<Booking>, StoreError>;

    /// Returns `false` when no booking has this id.
    async fn set_status(&self, id: Uuid, status: BookingStatus) -> Result<bool, StoreError>;

    /// Moves every `booked` booking whose window ended before `now` to `expired`.
    async fn expire_ended(&self, now: NaiveDateTime) -> Result<u64, StoreError>;
}
