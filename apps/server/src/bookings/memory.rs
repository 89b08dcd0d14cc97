use axum::async_trait;
use chrono::NaiveDateTime;
use dashmap::DashMap;
use shared_proto::session::BookingStatus;
use uuid::Uuid;

use super::model::Booking;
use super::store::{BookingStore, StoreError};
use crate::time_window::TimeWindow;

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct MemoryBookingStore {
    bookings: DashMap<Uuid, Booking>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect(&self, filter: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        let mut out: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|b| (b.starts_at.is_none(), b.starts_at, b.created_at));
        out
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<(), StoreError> {
        self.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.get(&id).map(|b| b.value().clone()))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        Ok(self.collect(|b| b.user_id == user_id))
    }

    async fn list_for_therapist(&self, therapist_id: Uuid) -> Result<Vec<Booking>, StoreError> {
        Ok(self.collect(|b| b.therapist_id == therapist_id))
    }

    async fn list_all(&self) -> Result<Vec<Booking>, StoreError> {
        Ok(self.collect(|_| true))
    }

    async fn find_overlapping(
        &self,
        therapist_id: Uuid,
        window: &TimeWindow,
    ) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .bookings
            .iter()
            .find(|entry| {
                let b = entry.value();
                b.therapist_id == therapist_id
                    && b.status.holds_slot()
                    && b.window().is_some_and(|w| w.overlaps(window))
            })
            .map(|entry| entry.value().clone()))
    }

    async fn set_status(&self, id: Uuid, status: BookingStatus) -> Result<bool, StoreError> {
        match self.bookings.get_mut(&id) {
            Some(mut booking) => {
                booking.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn expire_ended(&self, now: NaiveDateTime) -> Result<u64, StoreError> {
        let mut expired = 0;
        for mut entry in self.bookings.iter_mut() {
            let booking = entry.value_mut();
            if booking.status == BookingStatus::Booked && booking.ends_at.is_some_and(|end| end < now) {
                booking.status = BookingStatus::Expired;
                expired += 1;
            }
        }
        Ok(expired)
    }
}
