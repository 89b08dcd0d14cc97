use futures_util::{Sink, SinkExt, StreamExt};
use shared_proto::signaling::{ClientEvent, ServerEvent, PROTOCOL_VERSION};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, protocol::Message},
    MaybeTlsStream, WebSocketStream,
};
use url::Url;
use uuid::Uuid;

use crate::backoff::BackoffConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Relay endpoint, e.g. `ws://host:8080/ws`.
    pub server_url: String,
    pub token: String,
    pub booking_id: Uuid,
    pub backoff: BackoffConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid signaling url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("relay refused the connection (HTTP {0})")]
    Rejected(u16),
    #[error("gave up after {attempts} failed connection attempts")]
    ReconnectExhausted { attempts: u32 },
}

enum SessionEnd {
    /// Local side is done with the room.
    Finished,
    Dropped,
}

/// Relay connection for one booking room that survives transport drops.
pub struct SignalingClient {
    config: SignalingConfig,
}

impl SignalingClient {
    pub fn new(config: SignalingConfig) -> Self {
        Self { config }
    }

    pub fn connect_url(&self) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.config.server_url)?;
        url.query_pairs_mut()
            .append_pair("token", &self.config.token)
            .append_pair("v", &PROTOCOL_VERSION.to_string());
        Ok(url)
    }

    /// Pumps `outbound` to the relay and relay events into `inbound` until
    /// `outbound` closes. Every (re)connect re-joins the room before anything
    /// else is sent.
    pub async fn run(
        &self,
        mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
        inbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> Result<(), ClientError> {
        let url = self.connect_url()?;
        let booking_id = self.config.booking_id;
        let mut failures = 0u32;

        loop {
            match connect_async(url.as_str()).await {
                Ok((socket, _)) => {
                    if failures > 0 {
                        tracing::info!(component = "signaling", booking_id = %booking_id, attempts = failures, "reconnected to relay");
                    } else {
                        tracing::info!(component = "signaling", booking_id = %booking_id, "connected to relay");
                    }
                    failures = 0;

                    match self.pump(socket, &mut outbound, &inbound).await {
                        SessionEnd::Finished => return Ok(()),
                        SessionEnd::Dropped => {
                            tracing::warn!(component = "signaling", booking_id = %booking_id, "relay connection dropped");
                        }
                    }
                }
                Err(tungstenite::Error::Http(response)) if response.status().is_client_error() => {
                    let status = response.status().as_u16();
                    tracing::warn!(component = "signaling", booking_id = %booking_id, status, "relay refused connection");
                    return Err(ClientError::Rejected(status));
                }
                Err(err) => {
                    tracing::warn!(component = "signaling", booking_id = %booking_id, error = %err, "relay connection failed");
                }
            }

            failures += 1;
            if !self.config.backoff.allows(failures) {
                return Err(ClientError::ReconnectExhausted { attempts: failures });
            }
            let delay = self.config.backoff.delay_for(failures - 1);
            tracing::debug!(component = "signaling", booking_id = %booking_id, delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::time::sleep(delay).await;
        }
    }

    async fn pump(
        &self,
        socket: Socket,
        outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
        inbound: &mpsc::UnboundedSender<ServerEvent>,
    ) -> SessionEnd {
        let booking_id = self.config.booking_id;
        let (mut write, mut read) = socket.split();

        if send_event(&mut write, &ClientEvent::JoinSession { booking_id })
            .await
            .is_err()
        {
            return SessionEnd::Dropped;
        }

        loop {
            tokio::select! {
                next = outbound.recv() => match next {
                    Some(event) => {
                        if send_event(&mut write, &event).await.is_err() {
                            return SessionEnd::Dropped;
                        }
                    }
                    None => {
                        let _ = send_event(&mut write, &ClientEvent::LeaveSession { booking_id }).await;
                        let _ = write.close().await;
                        return SessionEnd::Finished;
                    }
                },
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                        Ok(event) => {
                            if inbound.send(event).is_err() {
                                let _ = send_event(&mut write, &ClientEvent::LeaveSession { booking_id }).await;
                                let _ = write.close().await;
                                return SessionEnd::Finished;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(component = "signaling", error = %err, "unreadable relay event");
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Dropped,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!(component = "signaling", error = %err, "relay read failed");
                        return SessionEnd::Dropped;
                    }
                },
            }
        }
    }
}

async fn send_event<S>(sink: &mut S, event: &ClientEvent) -> Result<(), tungstenite::Error>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    match serde_json::to_string(event) {
        Ok(text) => sink.send(Message::Text(text)).await,
        Err(err) => {
            tracing::warn!(component = "signaling", event = event.name(), error = %err, "failed to encode event");
            Ok(())
        }
    }
}
