
pub mod signaling {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use uuid::Uuid;

    use crate::session::Role;

    pub const PROTOCOL_VERSION: u8 = 1;

    pub fn is_supported_protocol_version(version: u8) -> bool {
        version == PROTOCOL_VERSION
    }

    /// The three negotiation message kinds peers exchange through the relay.
    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum SignalKind {
        Offer,
        Answer,
        Candidate,
    }

    impl SignalKind {
        pub fn as_str(self) -> &'static str {
            match self {
                SignalKind::Offer => "offer",
                SignalKind::Answer => "answer",
                SignalKind::Candidate => "candidate",
            }
        }

        /// Reads the `type` field of an opaque signal payload.
        pub fn of(data: &Value) -> Option<Self> {
            match data.get("type")?.as_str()? {
                "offer" => Some(SignalKind::Offer),
                "answer" => Some(SignalKind::Answer),
                "candidate" => Some(SignalKind::Candidate),
                _ => None,
            }
        }
    }

    /// Typed view over `{type: "offer"|"answer"|"candidate", sdp?, candidate?}`.
    ///
    /// The relay never decodes this; it forwards the raw JSON value. Peers
    /// decode it to drive their negotiation.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(tag = "type", rename_all = "lowercase")]
    pub enum SignalData {
        Offer { sdp: Value },
        Answer { sdp: Value },
        Candidate { candidate: Value },
    }

    impl SignalData {
        pub fn kind(&self) -> SignalKind {
            match self {
                SignalData::Offer { .. } => SignalKind::Offer,
                SignalData::Answer { .. } => SignalKind::Answer,
                SignalData::Candidate { .. } => SignalKind::Candidate,
            }
        }

        pub fn to_value(&self) -> Value {
            serde_json::to_value(self).unwrap_or(Value::Null)
        }

        pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
            serde_json::from_value(value)
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct PeerInfo {
        pub id: Uuid,
        pub role: Role,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    pub struct ChatMessage {
        pub booking_id: Uuid,
        pub sender: Uuid,
        pub text: String,
        pub time: DateTime<Utc>,
    }

    /// Events a participant sends over its relay connection.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(
        tag = "event",
        content = "data",
        rename_all = "kebab-case",
        rename_all_fields = "camelCase"
    )]
    pub enum ClientEvent {
        JoinSession { booking_id: Uuid },
        LeaveSession { booking_id: Uuid },
        ChatMessage { booking_id: Uuid, text: String },
        Typing { booking_id: Uuid },
        Signal { booking_id: Uuid, data: Value },
        EndCall { booking_id: Uuid },
    }

    impl ClientEvent {
        pub fn booking_id(&self) -> Uuid {
            match self {
                ClientEvent::JoinSession { booking_id }
                | ClientEvent::LeaveSession { booking_id }
                | ClientEvent::ChatMessage { booking_id, .. }
                | ClientEvent::Typing { booking_id }
                | ClientEvent::Signal { booking_id, .. }
                | ClientEvent::EndCall { booking_id } => *booking_id,
            }
        }

        pub fn name(&self) -> &'static str {
            match self {
                ClientEvent::JoinSession { .. } => "join-session",
                ClientEvent::LeaveSession { .. } => "leave-session",
                ClientEvent::ChatMessage { .. } => "chat-message",
                ClientEvent::Typing { .. } => "typing",
                ClientEvent::Signal { .. } => "signal",
                ClientEvent::EndCall { .. } => "end-call",
            }
        }
    }

    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum JoinRejectReason {
        BookingNotFound,
        NotParticipant,
        Cancelled,
        Expired,
        RoomFull,
        Unavailable,
    }

    /// Events the relay pushes to connected participants.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(
        tag = "event",
        content = "data",
        rename_all = "kebab-case",
        rename_all_fields = "camelCase"
    )]
    pub enum ServerEvent {
        SessionJoined {
            booking_id: Uuid,
            room_size: usize,
        },
        JoinRejected {
            booking_id: Uuid,
            reason: JoinRejectReason,
        },
        PeerJoined {
            booking_id: Uuid,
            peer: PeerInfo,
        },
        PeerLeft {
            booking_id: Uuid,
            peer_id: Uuid,
        },
        ChatMessage(ChatMessage),
        Typing {
            booking_id: Uuid,
            from: Uuid,
        },
        Signal {
            booking_id: Uuid,
            from: Uuid,
            data: Value,
        },
        EndCall {
            booking_id: Uuid,
            by: Uuid,
        },
        /// Sent to a connection whose seat was taken by a newer connection of
        /// the same identity.
        SessionReplaced {
            booking_id: Uuid,
        },
    }

    impl ServerEvent {
        pub fn name(&self) -> &'static str {
            match self {
                ServerEvent::SessionJoined { .. } => "session-joined",
                ServerEvent::JoinRejected { .. } => "join-rejected",
                ServerEvent::PeerJoined { .. } => "peer-joined",
                ServerEvent::PeerLeft { .. } => "peer-left",
                ServerEvent::ChatMessage(_) => "chat-message",
                ServerEvent::Typing { .. } => "typing",
                ServerEvent::Signal { .. } => "signal",
                ServerEvent::EndCall { .. } => "end-call",
                ServerEvent::SessionReplaced { .. } => "session-replaced",
            }
        }
    }
}

pub mod session {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
    #[serde(rename_all = "snake_case")]
    pub enum Role {
        User,
        Therapist,
        Admin,
    }

    impl Role {
        pub fn as_str(self) -> &'static str {
            match self {
                Role::User => "user",
                Role::Therapist => "therapist",
                Role::Admin => "admin",
            }
        }

        pub fn parse(value: &str) -> Option<Self> {
            match value {
                "user" => Some(Role::User),
                "therapist" => Some(Role::Therapist),
                "admin" => Some(Role::Admin),
                _ => None,
            }
        }
    }

    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum BookingStatus {
        Scheduled,
        Booked,
        Completed,
        Cancelled,
        Expired,
    }

    impl BookingStatus {
        pub fn as_str(self) -> &'static str {
            match self {
                BookingStatus::Scheduled => "scheduled",
                BookingStatus::Booked => "booked",
                BookingStatus::Completed => "completed",
                BookingStatus::Cancelled => "cancelled",
                BookingStatus::Expired => "expired",
            }
        }

        pub fn parse(value: &str) -> Option<Self> {
            match value {
                "scheduled" => Some(BookingStatus::Scheduled),
                "booked" => Some(BookingStatus::Booked),
                "completed" => Some(BookingStatus::Completed),
                "cancelled" => Some(BookingStatus::Cancelled),
                "expired" => Some(BookingStatus::Expired),
                _ => None,
            }
        }

        /// Whether the booking still occupies its therapist's time window.
        pub fn holds_slot(self) -> bool {
            self != BookingStatus::Cancelled
        }
    }

    #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "snake_case")]
    pub enum SessionTiming {
        Upcoming,
        Live,
        Expired,
    }

    impl SessionTiming {
        pub fn is_joinable(self) -> bool {
            matches!(self, SessionTiming::Upcoming | SessionTiming::Live)
        }
    }
}
