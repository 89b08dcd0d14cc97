use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    Screen,
    /// Black frame sent while the camera is off.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub id: String,
    pub kind: TrackKind,
    pub source: TrackSource,
}

/// Capture handles owned by one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalMedia {
    pub audio: Option<LocalTrack>,
    pub video: Option<LocalTrack>,
}

impl LocalMedia {
    pub fn tracks(&self) -> impl Iterator<Item = &LocalTrack> {
        self.audio.iter().chain(self.video.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaError {
    #[error("media access denied: {0}")]
    AccessDenied(String),
    #[error("no capture device: {0}")]
    Unavailable(String),
}

/// Local capture boundary (camera, microphone, display).
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Microphone plus camera.
    async fn user_media(&self) -> Result<LocalMedia, MediaError>;

    async fn camera(&self) -> Result<LocalTrack, MediaError>;

    async fn display(&self) -> Result<LocalTrack, MediaError>;

    fn placeholder_video(&self) -> LocalTrack;

    fn set_enabled(&self, track: &LocalTrack, enabled: bool);

    /// Releases the device behind `track`.
    fn stop(&self, track: &LocalTrack);
}
