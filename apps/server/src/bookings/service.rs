use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use shared_proto::session::{BookingStatus, Role};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::model::{Booking, NewBooking, TimingView};
use super::store::{BookingStore, StoreError};
use crate::auth::Principal;
use crate::error::JoinRejection;
use crate::time_window::TimeWindow;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Cannot book past sessions")]
    PastWindow,
    #[error("Therapist already booked at this time")]
    Overlap,
    #[error("Session not found")]
    NotFound,
    #[error("Not allowed to access this session")]
    Forbidden,
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Booking rules on top of a [`BookingStore`].
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    /// Serializes overlap check + insert.
    create_lock: Arc<Mutex<()>>,
}

impl BookingService {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self {
            store,
            create_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Idempotent sweep run before listings and creation.
    pub async fn auto_expire(&self, now: NaiveDateTime) -> Result<u64, BookingError> {
        let expired = self.store.expire_ended(now).await?;
        if expired > 0 {
            tracing::info!(component = "bookings.expire", expired, "expired ended bookings");
        }
        Ok(expired)
    }

    pub async fn create(
        &self,
        request: NewBooking,
        now: NaiveDateTime,
    ) -> Result<Booking, BookingError> {
        if request.user_id == request.therapist_id {
            return Err(BookingError::Validation(
                "cannot book a session with yourself".to_string(),
            ));
        }

        self.auto_expire(now).await?;

        let window = match TimeWindow::from_slot(request.date, &request.time_slot) {
            Ok(window) => Some(window),
            Err(err) => {
                tracing::warn!(
                    component = "bookings.create",
                    error = %err,
                    "accepting booking with free-form time slot"
                );
                None
            }
        };

        if let Some(window) = window {
            if window.start < now {
                return Err(BookingError::PastWindow);
            }
        }

        let _guard = self.create_lock.lock().await;

        if let Some(window) = window {
            if let Some(existing) = self
                .store
                .find_overlapping(request.therapist_id, &window)
                .await?
            {
                tracing::info!(
                    component = "bookings.create",
                    therapist_id = %request.therapist_id,
                    conflicting_booking = %existing.id,
                    "rejected overlapping booking"
                );
                return Err(BookingError::Overlap);
            }
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            therapist_id: request.therapist_id,
            date: request.date,
            time_slot: request.time_slot.trim().to_string(),
            starts_at: window.map(|w| w.start),
            ends_at: window.map(|w| w.end),
            status: BookingStatus::Booked,
            created_at: Utc::now(),
        };
        self.store.insert(&booking).await?;

        tracing::info!(
            component = "bookings.create",
            booking_id = %booking.id,
            therapist_id = %booking.therapist_id,
            user_id = %booking.user_id,
            "booking created"
        );
        Ok(booking)
    }

    pub async fn get(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.store.get(id).await?.ok_or(BookingError::NotFound)
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        now: NaiveDateTime,
    ) -> Result<Vec<Booking>, BookingError> {
        self.auto_expire(now).await?;
        Ok(self.store.list_for_user(user_id).await?)
    }

    pub async fn list_for_therapist(
        &self,
        therapist_id: Uuid,
        now: NaiveDateTime,
    ) -> Result<Vec<Booking>, BookingError> {
        self.auto_expire(now).await?;
        Ok(self.store.list_for_therapist(therapist_id).await?)
    }

    pub async fn list_all(&self, now: NaiveDateTime) -> Result<Vec<Booking>, BookingError> {
        self.auto_expire(now).await?;
        Ok(self.store.list_all().await?)
    }

    /// Cancellation by one of the booking's participants, or by an admin.
    pub async fn cancel(&self, id: Uuid, actor: &Principal) -> Result<(), BookingError> {
        let booking = self.get(id).await?;
        if actor.role != Role::Admin && !booking.is_participant(actor.id) {
            return Err(BookingError::Forbidden);
        }
        self.mark_cancelled(booking).await
    }

    pub async fn admin_cancel(&self, id: Uuid) -> Result<(), BookingError> {
        let booking = self.get(id).await?;
        self.mark_cancelled(booking).await
    }

    async fn mark_cancelled(&self, booking: Booking) -> Result<(), BookingError> {
        match booking.status {
            BookingStatus::Cancelled => return Ok(()),
            BookingStatus::Completed | BookingStatus::Expired => {
                return Err(BookingError::Validation(format!(
                    "session already {}",
                    booking.status.as_str()
                )))
            }
            BookingStatus::Scheduled | BookingStatus::Booked => {}
        }

        if !self
            .store
            .set_status(booking.id, BookingStatus::Cancelled)
            .await?
        {
            return Err(BookingError::NotFound);
        }
        tracing::info!(component = "bookings.cancel", booking_id = %booking.id, "booking cancelled");
        Ok(())
    }

    pub async fn timing(
        &self,
        id: Uuid,
        actor: &Principal,
        now: NaiveDateTime,
    ) -> Result<TimingView, BookingError> {
        let booking = self.get(id).await?;
        if actor.role != Role::Admin && !booking.is_participant(actor.id) {
            return Err(BookingError::Forbidden);
        }
        Ok(TimingView::for_booking(&booking, now))
    }

    /// Decides whether `identity` may open the room for booking `id` at `now`.
    pub async fn check_joinable(
        &self,
        id: Uuid,
        identity: Uuid,
        now: NaiveDateTime,
    ) -> Result<Booking, JoinRejection> {
        let booking = match self.store.get(id).await {
            Ok(Some(booking)) => booking,
            Ok(None) => return Err(JoinRejection::BookingNotFound),
            Err(err) => {
                tracing::error!(component = "bookings.join", booking_id = %id, error = %err, "booking lookup failed");
                return Err(JoinRejection::Unavailable);
            }
        };

        if !booking.is_participant(identity) {
            return Err(JoinRejection::NotParticipant);
        }

        match booking.status {
            BookingStatus::Cancelled => return Err(JoinRejection::Cancelled),
            BookingStatus::Expired | BookingStatus::Completed => {
                return Err(JoinRejection::Expired)
            }
            BookingStatus::Scheduled | BookingStatus::Booked => {}
        }

        if !booking.timing(now).is_joinable() {
            if booking.status == BookingStatus::Booked {
                if let Err(err) = self.store.set_status(id, BookingStatus::Expired).await {
                    tracing::warn!(component = "bookings.join", booking_id = %id, error = %err, "failed to mark booking expired");
                }
            }
            return Err(JoinRejection::Expired);
        }

        Ok(booking)
    }
}
