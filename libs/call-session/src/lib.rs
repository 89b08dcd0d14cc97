//! Participant side of a booking call: the relay connection, the call
//! state machine and the media/transport seams it drives.

pub mod backoff;
pub mod client;
pub mod ice;
pub mod machine;
pub mod media;
pub mod transport;

pub use backoff::BackoffConfig;
pub use client::{ClientError, SignalingClient, SignalingConfig};
pub use ice::{load_ice_servers_from_env, IceServerConfig};
pub use machine::{CallError, CallEvent, CallRole, CallSession, CallState};
pub use media::{LocalMedia, LocalTrack, MediaDevices, MediaError, TrackKind, TrackSource};
pub use transport::{ConnectionState, PeerTransport, TransportError, TransportFactory};
