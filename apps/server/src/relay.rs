use std::collections::HashSet;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use shared_proto::signaling::{
    is_supported_protocol_version, ChatMessage, ClientEvent, ServerEvent, SignalKind,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::{self, Principal};
use crate::error::JoinRejection;
use crate::registry::{Delivery, RoomMember, Tx};
use crate::state::AppState;
use crate::validation::normalize_chat_text;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    token: Option<String>,
    v: Option<u8>,
}

/// `GET /ws`. The credential is checked before the upgrade, so a refused
/// client never gets a socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    if let Some(version) = params.v {
        if !is_supported_protocol_version(version) {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "error": format!("Unsupported protocol version {version}"),
                    "code": "unsupported_protocol",
                })),
            )
                .into_response();
        }
    }

    let token = params
        .token
        .or_else(|| bearer.map(|TypedHeader(Authorization(b))| b.token().to_string()));

    let principal = match auth::admit(state.verifier.as_ref(), token.as_deref()) {
        Ok(principal) => principal,
        Err(err) => {
            tracing::warn!(component = "relay.admit", error = %err, "connection refused");
            return err.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, principal))
}

async fn handle_socket(socket: WebSocket, state: AppState, principal: Principal) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut connection = RelayConnection::new(principal, state, tx);

    tracing::info!(
        component = "relay.connect",
        connection_id = %connection.id(),
        identity = %principal.id,
        role = principal.role.as_str(),
        "relay connection opened"
    );

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(component = "relay.write", event = event.name(), error = %err, "failed to encode event");
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => connection.handle_frame(&text).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(component = "relay.read", connection_id = %connection.id(), error = %err, "socket read failed");
                break;
            }
        }
    }

    let connection_id = connection.id();
    // leaves every room and drops the last sender, which ends the writer
    drop(connection);
    let _ = writer.await;

    tracing::info!(component = "relay.disconnect", connection_id = %connection_id, "relay connection closed");
}

/// Per-connection relay state. Inbound events are handled one at a time, so
/// a connection's messages reach the room in the order they were sent.
pub struct RelayConnection {
    id: Uuid,
    principal: Principal,
    state: AppState,
    tx: Tx,
    joined: HashSet<Uuid>,
}

impl RelayConnection {
    pub fn new(principal: Principal, state: AppState, tx: Tx) -> Self {
        Self {
            id: Uuid::new_v4(),
            principal,
            state,
            tx,
            joined: HashSet::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn handle_frame(&mut self, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.handle_event(event).await,
            Err(err) => {
                tracing::warn!(
                    component = "relay.frame",
                    connection_id = %self.id,
                    error = %err,
                    "dropping malformed frame"
                );
            }
        }
    }

    pub async fn handle_event(&mut self, event: ClientEvent) {
        let from = self.principal.id;
        tracing::debug!(
            component = "relay.event",
            connection_id = %self.id,
            booking_id = %event.booking_id(),
            event = event.name(),
            "client event"
        );
        match event {
            ClientEvent::JoinSession { booking_id } => self.join(booking_id).await,
            ClientEvent::LeaveSession { booking_id } => self.leave(booking_id),
            ClientEvent::ChatMessage { booking_id, text } => self.chat(booking_id, &text),
            ClientEvent::Typing { booking_id } => {
                self.relay(booking_id, ServerEvent::Typing { booking_id, from }, Delivery::Others)
            }
            ClientEvent::Signal { booking_id, data } => {
                let Some(kind) = SignalKind::of(&data) else {
                    tracing::warn!(
                        component = "relay.signal",
                        booking_id = %booking_id,
                        connection_id = %self.id,
                        "dropping signal without a known type"
                    );
                    return;
                };
                tracing::debug!(component = "relay.signal", booking_id = %booking_id, kind = kind.as_str(), "relaying signal");
                self.relay(
                    booking_id,
                    ServerEvent::Signal { booking_id, from, data },
                    Delivery::Others,
                )
            }
            ClientEvent::EndCall { booking_id } => {
                tracing::info!(component = "relay.end_call", booking_id = %booking_id, by = %from, "call ended by participant");
                self.relay(booking_id, ServerEvent::EndCall { booking_id, by: from }, Delivery::Others)
            }
        }
    }

    async fn join(&mut self, booking_id: Uuid) {
        let now = self.state.clock.now();
        let admitted = match self
            .state
            .bookings
            .check_joinable(booking_id, self.principal.id, now)
            .await
        {
            Ok(_) => self
                .state
                .registry
                .join(
                    booking_id,
                    RoomMember {
                        connection_id: self.id,
                        identity: self.principal.id,
                        role: self.principal.role,
                        tx: self.tx.clone(),
                    },
                )
                .map_err(JoinRejection::from),
            Err(rejection) => Err(rejection),
        };

        match admitted {
            Ok(room_size) => {
                self.joined.insert(booking_id);
                tracing::info!(
                    component = "relay.join",
                    booking_id = %booking_id,
                    identity = %self.principal.id,
                    room_size,
                    "joined session room"
                );
                self.send(ServerEvent::SessionJoined { booking_id, room_size });
            }
            Err(rejection) => {
                tracing::info!(
                    component = "relay.join",
                    booking_id = %booking_id,
                    identity = %self.principal.id,
                    reason = %rejection,
                    "join rejected"
                );
                self.send(ServerEvent::JoinRejected {
                    booking_id,
                    reason: rejection.reason(),
                });
            }
        }
    }

    fn leave(&mut self, booking_id: Uuid) {
        if self.joined.remove(&booking_id) {
            self.state.registry.leave(booking_id, self.id);
        }
    }

    fn chat(&self, booking_id: Uuid, text: &str) {
        let Some(text) = normalize_chat_text(text) else {
            tracing::warn!(component = "relay.chat", booking_id = %booking_id, connection_id = %self.id, "dropping empty or oversized chat message");
            return;
        };
        let message = ChatMessage {
            booking_id,
            sender: self.principal.id,
            text,
            time: Utc::now(),
        };
        self.relay(booking_id, ServerEvent::ChatMessage(message), Delivery::Everyone);
    }

    fn relay(&self, booking_id: Uuid, event: ServerEvent, delivery: Delivery) {
        if !self.in_room(booking_id) {
            tracing::warn!(
                component = "relay.route",
                booking_id = %booking_id,
                connection_id = %self.id,
                event = event.name(),
                "dropping event for a room this connection is not in"
            );
            return;
        }
        self.state
            .registry
            .broadcast_to_room(booking_id, self.id, &event, delivery);
    }

    /// A replaced handle stays in `joined` but is no longer a registry member.
    fn in_room(&self, booking_id: Uuid) -> bool {
        self.joined.contains(&booking_id) && self.state.registry.is_member(booking_id, self.id)
    }

    fn send(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }

    /// Leaves every joined room. Idempotent.
    pub fn disconnect(&mut self) {
        for booking_id in self.joined.drain() {
            self.state.registry.leave(booking_id, self.id);
        }
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}
