use async_trait::async_trait;
use serde_json::Value;

use crate::ice::IceServerConfig;
use crate::media::{LocalMedia, LocalTrack};

/// Peer connection states as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_lost(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    #[error("peer transport is closed")]
    Closed,
}

/// One peer-to-peer media connection. Session descriptions and candidates
/// are opaque JSON, exactly as they travel through the relay.
#[async_trait]
pub trait PeerTransport: Send {
    async fn add_tracks(&mut self, media: &LocalMedia) -> Result<(), TransportError>;

    /// Creates an offer and applies it locally.
    async fn create_offer(&mut self) -> Result<Value, TransportError>;

    /// Applies the remote offer, then creates and applies the local answer.
    async fn accept_offer(&mut self, offer: Value) -> Result<Value, TransportError>;

    async fn apply_answer(&mut self, answer: Value) -> Result<(), TransportError>;

    async fn add_ice_candidate(&mut self, candidate: Value) -> Result<(), TransportError>;

    /// Swaps the outgoing video track in place, without renegotiation.
    async fn replace_video_track(&mut self, track: &LocalTrack) -> Result<(), TransportError>;

    async fn close(&mut self);
}

pub trait TransportFactory: Send + Sync {
    fn create(&self, ice_servers: &[IceServerConfig]) -> Box<dyn PeerTransport>;
}
