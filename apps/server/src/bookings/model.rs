use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_proto::session::{BookingStatus, SessionTiming};
use uuid::Uuid;

use crate::time_window::{format_countdown, TimeWindow};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    /// Participant in the `user` role.
    pub user_id: Uuid,
    /// Participant in the `therapist` role.
    pub therapist_id: Uuid,
    pub date: NaiveDate,
    pub time_slot: String,
    /// Parsed from `time_slot` at creation; `None` when the label is free-form.
    pub starts_at: Option<NaiveDateTime>,
    pub ends_at: Option<NaiveDateTime>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn window(&self) -> Option<TimeWindow> {
        match (self.starts_at, self.ends_at) {
            (Some(start), Some(end)) => Some(TimeWindow { start, end }),
            _ => None,
        }
    }

    pub fn timing(&self, now: NaiveDateTime) -> SessionTiming {
        self.window()
            .map(|window| window.classify(now))
            .unwrap_or(SessionTiming::Upcoming)
    }

    pub fn is_participant(&self, identity: Uuid) -> bool {
        self.user_id == identity || self.therapist_id == identity
    }
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: Uuid,
    pub therapist_id: Uuid,
    pub date: NaiveDate,
    pub time_slot: String,
}

/// What a participant's dashboard shows for one booking.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimingView {
    pub booking_id: Uuid,
    pub state: Option<SessionTiming>,
    pub label: &'static str,
    pub can_join: bool,
    pub countdown: String,
}

impl TimingView {
    pub fn for_booking(booking: &Booking, now: NaiveDateTime) -> Self {
        if booking.status == BookingStatus::Cancelled {
            return Self {
                booking_id: booking.id,
                state: None,
                label: "CANCELLED",
                can_join: false,
                countdown: String::new(),
            };
        }

        let state = if matches!(booking.status, BookingStatus::Expired | BookingStatus::Completed) {
            SessionTiming::Expired
        } else {
            booking.timing(now)
        };

        let (label, countdown) = match (state, booking.window()) {
            (SessionTiming::Live, Some(window)) => {
                ("LIVE", format!("Ends in {}", format_countdown(window.end, now)))
            }
            (SessionTiming::Live, None) => ("LIVE", String::new()),
            (SessionTiming::Upcoming, Some(window)) => (
                "UPCOMING",
                format!("Starts in {}", format_countdown(window.start, now)),
            ),
            (SessionTiming::Upcoming, None) => ("UPCOMING", String::new()),
            (SessionTiming::Expired, _) => ("EXPIRED", "Session ended".to_string()),
        };

        Self {
            booking_id: booking.id,
            state: Some(state),
            label,
            can_join: state.is_joinable(),
            countdown,
        }
    }
}
