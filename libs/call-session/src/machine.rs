use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use shared_proto::signaling::{ClientEvent, ServerEvent, SignalData};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ice::IceServerConfig;
use crate::media::{LocalMedia, LocalTrack, MediaDevices, MediaError};
use crate::transport::{ConnectionState, PeerTransport, TransportError, TransportFactory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    RequestingMedia,
    Offering,
    Answering,
    Connected,
    Ended,
}

impl CallState {
    /// States that own a peer transport.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            CallState::Offering | CallState::Answering | CallState::Connected
        )
    }

    fn can_start(self) -> bool {
        matches!(self, CallState::Idle | CallState::Ended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Caller,
    Callee,
}

/// Everything that can move a call forward, local or remote.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    StartCall,
    Remote(ServerEvent),
    /// Candidate gathered by the local transport, to be trickled to the peer.
    LocalCandidate(Value),
    ConnectionStateChanged(ConnectionState),
    ToggleMute,
    ToggleCamera,
    StartScreenShare,
    StopScreenShare,
    /// The capture source stopped on its own (e.g. the OS share bar).
    ScreenShareEnded,
    StartRecording,
    StopRecording,
    EndCall,
}

impl CallEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::StartCall => "start-call",
            CallEvent::Remote(event) => event.name(),
            CallEvent::LocalCandidate(_) => "local-candidate",
            CallEvent::ConnectionStateChanged(_) => "connection-state",
            CallEvent::ToggleMute => "toggle-mute",
            CallEvent::ToggleCamera => "toggle-camera",
            CallEvent::StartScreenShare => "start-screen-share",
            CallEvent::StopScreenShare => "stop-screen-share",
            CallEvent::ScreenShareEnded => "screen-share-ended",
            CallEvent::StartRecording => "start-recording",
            CallEvent::StopRecording => "stop-recording",
            CallEvent::EndCall => "end-call",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("media access denied: {0}")]
    MediaAccessDenied(String),
    #[error("media device error: {0}")]
    Media(MediaError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{event} is not allowed while {state:?}")]
    InvalidTransition {
        event: &'static str,
        state: CallState,
    },
}

impl From<MediaError> for CallError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::AccessDenied(reason) => CallError::MediaAccessDenied(reason),
            other => CallError::Media(other),
        }
    }
}

/// One participant's side of a booking call.
pub struct CallSession {
    booking_id: Uuid,
    devices: Arc<dyn MediaDevices>,
    transports: Arc<dyn TransportFactory>,
    ice_servers: Vec<IceServerConfig>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    state: CallState,
    role: Option<CallRole>,
    local: LocalMedia,
    transport: Option<Box<dyn PeerTransport>>,
    muted: bool,
    camera_off: bool,
    sharing_screen: bool,
    recording_since: Option<Instant>,
    connected_since: Option<Instant>,
}

impl CallSession {
    pub fn new(
        booking_id: Uuid,
        devices: Arc<dyn MediaDevices>,
        transports: Arc<dyn TransportFactory>,
        ice_servers: Vec<IceServerConfig>,
        outbound: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        Self {
            booking_id,
            devices,
            transports,
            ice_servers,
            outbound,
            state: CallState::Idle,
            role: None,
            local: LocalMedia::default(),
            transport: None,
            muted: false,
            camera_off: false,
            sharing_screen: false,
            recording_since: None,
            connected_since: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn role(&self) -> Option<CallRole> {
        self.role
    }

    pub fn local_media(&self) -> &LocalMedia {
        &self.local
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_camera_off(&self) -> bool {
        self.camera_off
    }

    pub fn is_sharing_screen(&self) -> bool {
        self.sharing_screen
    }

    pub fn is_recording(&self) -> bool {
        self.recording_since.is_some()
    }

    /// Time since the call reached `Connected`.
    pub fn call_duration(&self) -> Option<Duration> {
        self.connected_since.map(|since| since.elapsed())
    }

    /// Drains `events` until the sender side is dropped, then hangs up.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<CallEvent>) {
        while let Some(event) = events.recv().await {
            let name = event.name();
            match self.handle(event).await {
                Ok(state) => {
                    tracing::debug!(component = "call", booking_id = %self.booking_id, event = name, state = ?state, "call event handled");
                }
                Err(err) => {
                    tracing::warn!(component = "call", booking_id = %self.booking_id, event = name, error = %err, "call event failed");
                }
            }
        }
        let _ = self.handle(CallEvent::EndCall).await;
    }

    pub async fn handle(&mut self, event: CallEvent) -> Result<CallState, CallError> {
        match event {
            CallEvent::StartCall => self.start_call().await?,
            CallEvent::Remote(event) => self.on_remote(event).await?,
            CallEvent::LocalCandidate(candidate) => {
                if self.transport.is_some() {
                    self.emit_signal(SignalData::Candidate { candidate });
                }
            }
            CallEvent::ConnectionStateChanged(state) => {
                if state.is_lost() && self.state.is_active() {
                    tracing::info!(component = "call", booking_id = %self.booking_id, connection_state = ?state, "peer connection lost");
                    self.teardown().await;
                }
            }
            CallEvent::ToggleMute => self.toggle_mute()?,
            CallEvent::ToggleCamera => self.toggle_camera().await?,
            CallEvent::StartScreenShare => self.start_screen_share().await?,
            CallEvent::StopScreenShare | CallEvent::ScreenShareEnded => {
                self.stop_screen_share().await?
            }
            CallEvent::StartRecording => {
                if self.state != CallState::Connected {
                    return Err(self.invalid("start-recording"));
                }
                self.recording_since.get_or_insert_with(Instant::now);
            }
            CallEvent::StopRecording => {
                if let Some(since) = self.recording_since.take() {
                    tracing::info!(component = "call.recording", booking_id = %self.booking_id, seconds = since.elapsed().as_secs(), "recording stopped");
                }
            }
            CallEvent::EndCall => self.end_call().await,
        }
        Ok(self.state)
    }

    async fn start_call(&mut self) -> Result<(), CallError> {
        if !self.state.can_start() {
            return Err(self.invalid("start-call"));
        }
        self.begin(CallRole::Caller);
        self.acquire().await?;

        let offer = match self.transport.as_mut() {
            Some(transport) => transport.create_offer().await,
            None => Err(TransportError::Closed),
        };
        match offer {
            Ok(sdp) => {
                self.emit_signal(SignalData::Offer { sdp });
                self.state = CallState::Offering;
                Ok(())
            }
            Err(err) => {
                self.teardown().await;
                Err(err.into())
            }
        }
    }

    fn begin(&mut self, role: CallRole) {
        self.role = Some(role);
        self.state = CallState::RequestingMedia;
        self.muted = false;
        self.camera_off = false;
        self.sharing_screen = false;
    }

    /// Captures local media and opens a transport carrying it. A capture
    /// failure drops the call back to `Idle`.
    async fn acquire(&mut self) -> Result<(), CallError> {
        let media = match self.devices.user_media().await {
            Ok(media) => media,
            Err(err) => {
                tracing::warn!(component = "call.media", booking_id = %self.booking_id, error = %err, "local media unavailable");
                self.state = CallState::Idle;
                self.role = None;
                return Err(err.into());
            }
        };

        let mut transport = self.transports.create(&self.ice_servers);
        let added = transport.add_tracks(&media).await;
        self.local = media;
        self.transport = Some(transport);
        if let Err(err) = added {
            self.teardown().await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn on_remote(&mut self, event: ServerEvent) -> Result<(), CallError> {
        match event {
            ServerEvent::Signal { booking_id, data, .. } if booking_id == self.booking_id => {
                self.on_signal(data).await
            }
            ServerEvent::EndCall { booking_id, .. } | ServerEvent::PeerLeft { booking_id, .. }
                if booking_id == self.booking_id =>
            {
                if self.state != CallState::Idle && self.state != CallState::Ended {
                    self.teardown().await;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn on_signal(&mut self, data: Value) -> Result<(), CallError> {
        let signal = match SignalData::from_value(data) {
            Ok(signal) => signal,
            Err(err) => {
                tracing::warn!(component = "call.signal", booking_id = %self.booking_id, error = %err, "ignoring unreadable signal");
                return Ok(());
            }
        };

        match signal {
            SignalData::Offer { sdp } => self.on_offer(sdp).await,
            SignalData::Answer { sdp } => self.on_answer(sdp).await,
            SignalData::Candidate { candidate } => {
                match self.transport.as_mut() {
                    Some(transport) if self.state.is_active() => {
                        if let Err(err) = transport.add_ice_candidate(candidate).await {
                            tracing::warn!(component = "call.signal", booking_id = %self.booking_id, error = %err, "remote candidate rejected");
                        }
                    }
                    _ => {
                        tracing::debug!(component = "call.signal", booking_id = %self.booking_id, "dropping candidate without an active call");
                    }
                }
                Ok(())
            }
        }
    }

    async fn on_offer(&mut self, sdp: Value) -> Result<(), CallError> {
        match self.state {
            CallState::Idle | CallState::Ended => {
                self.begin(CallRole::Callee);
                self.acquire().await?;
                self.state = CallState::Answering;
                self.answer(sdp).await?;
                self.mark_connected();
                Ok(())
            }
            // peer renegotiating an established call
            CallState::Connected => self.answer(sdp).await,
            _ => Err(self.invalid("offer")),
        }
    }

    async fn answer(&mut self, offer: Value) -> Result<(), CallError> {
        let answer = match self.transport.as_mut() {
            Some(transport) => transport.accept_offer(offer).await,
            None => Err(TransportError::Closed),
        };
        match answer {
            Ok(sdp) => {
                self.emit_signal(SignalData::Answer { sdp });
                Ok(())
            }
            Err(err) => {
                self.teardown().await;
                Err(err.into())
            }
        }
    }

    async fn on_answer(&mut self, sdp: Value) -> Result<(), CallError> {
        if self.state != CallState::Offering {
            return Err(self.invalid("answer"));
        }
        let applied = match self.transport.as_mut() {
            Some(transport) => transport.apply_answer(sdp).await,
            None => Err(TransportError::Closed),
        };
        if let Err(err) = applied {
            self.teardown().await;
            return Err(err.into());
        }
        self.mark_connected();
        Ok(())
    }

    fn mark_connected(&mut self) {
        self.state = CallState::Connected;
        self.connected_since = Some(Instant::now());
        tracing::info!(component = "call", booking_id = %self.booking_id, role = ?self.role, "call connected");
    }

    fn toggle_mute(&mut self) -> Result<(), CallError> {
        let Some(audio) = self.local.audio.as_ref() else {
            return Err(self.invalid("toggle-mute"));
        };
        self.muted = !self.muted;
        self.devices.set_enabled(audio, !self.muted);
        Ok(())
    }

    async fn toggle_camera(&mut self) -> Result<(), CallError> {
        if !self.state.is_active() || self.sharing_screen {
            return Err(self.invalid("toggle-camera"));
        }
        let next = if self.camera_off {
            self.devices.camera().await?
        } else {
            self.devices.placeholder_video()
        };
        self.swap_video(next).await?;
        self.camera_off = !self.camera_off;
        Ok(())
    }

    async fn start_screen_share(&mut self) -> Result<(), CallError> {
        if !self.state.is_active() {
            return Err(self.invalid("start-screen-share"));
        }
        if self.sharing_screen {
            return Ok(());
        }
        let screen = self.devices.display().await?;
        self.swap_video(screen).await?;
        self.sharing_screen = true;
        Ok(())
    }

    /// Reverts to the camera, or to the placeholder if the camera is gone.
    async fn stop_screen_share(&mut self) -> Result<(), CallError> {
        if !self.sharing_screen {
            return Ok(());
        }
        self.sharing_screen = false;

        let replacement = match self.devices.camera().await {
            Ok(camera) => {
                self.camera_off = false;
                camera
            }
            Err(err) => {
                tracing::warn!(component = "call.media", booking_id = %self.booking_id, error = %err, "camera unavailable after screen share");
                self.camera_off = true;
                self.devices.placeholder_video()
            }
        };
        self.swap_video(replacement).await
    }

    /// Live outbound-track substitution; the previous video track is released.
    async fn swap_video(&mut self, track: LocalTrack) -> Result<(), CallError> {
        let Some(transport) = self.transport.as_mut() else {
            self.devices.stop(&track);
            return Err(TransportError::Closed.into());
        };
        if let Err(err) = transport.replace_video_track(&track).await {
            self.devices.stop(&track);
            return Err(err.into());
        }
        if let Some(previous) = self.local.video.replace(track) {
            self.devices.stop(&previous);
        }
        Ok(())
    }

    /// Idempotent. Only a call that was actually under way tells the peer.
    async fn end_call(&mut self) {
        match self.state {
            CallState::Ended => {}
            CallState::Idle => self.state = CallState::Ended,
            _ => {
                self.emit(ClientEvent::EndCall {
                    booking_id: self.booking_id,
                });
                self.teardown().await;
            }
        }
    }

    async fn teardown(&mut self) {
        for track in self.local.tracks() {
            self.devices.stop(track);
        }
        self.local = LocalMedia::default();

        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }

        if let Some(since) = self.recording_since.take() {
            tracing::info!(component = "call.recording", booking_id = %self.booking_id, seconds = since.elapsed().as_secs(), "recording stopped by hang-up");
        }
        let duration = self.connected_since.take().map(|since| since.elapsed().as_secs());

        self.muted = false;
        self.camera_off = false;
        self.sharing_screen = false;
        self.role = None;
        self.state = CallState::Ended;
        tracing::info!(component = "call", booking_id = %self.booking_id, duration_secs = ?duration, "call ended");
    }

    fn emit_signal(&self, data: SignalData) {
        self.emit(ClientEvent::Signal {
            booking_id: self.booking_id,
            data: data.to_value(),
        });
    }

    fn emit(&self, event: ClientEvent) {
        if self.outbound.send(event).is_err() {
            tracing::debug!(component = "call", booking_id = %self.booking_id, "signaling channel closed");
        }
    }

    fn invalid(&self, event: &'static str) -> CallError {
        CallError::InvalidTransition {
            event,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{TrackKind, TrackSource};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockDevices {
        deny_user_media: AtomicBool,
        camera_broken: AtomicBool,
        next_id: AtomicUsize,
        stopped: Mutex<Vec<String>>,
        disabled: Mutex<Vec<String>>,
    }

    impl MockDevices {
        fn track(&self, kind: TrackKind, source: TrackSource) -> LocalTrack {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst);
            LocalTrack {
                id: format!("{source:?}-{n}").to_lowercase(),
                kind,
                source,
            }
        }

        fn stopped(&self) -> Vec<String> {
            self.stopped.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl MediaDevices for MockDevices {
        async fn user_media(&self) -> Result<LocalMedia, MediaError> {
            if self.deny_user_media.load(Ordering::SeqCst) {
                return Err(MediaError::AccessDenied("permission dismissed".into()));
            }
            Ok(LocalMedia {
                audio: Some(self.track(TrackKind::Audio, TrackSource::Microphone)),
                video: Some(self.track(TrackKind::Video, TrackSource::Camera)),
            })
        }

        async fn camera(&self) -> Result<LocalTrack, MediaError> {
            if self.camera_broken.load(Ordering::SeqCst) {
                return Err(MediaError::Unavailable("camera unplugged".into()));
            }
            Ok(self.track(TrackKind::Video, TrackSource::Camera))
        }

        async fn display(&self) -> Result<LocalTrack, MediaError> {
            Ok(self.track(TrackKind::Video, TrackSource::Screen))
        }

        fn placeholder_video(&self) -> LocalTrack {
            self.track(TrackKind::Video, TrackSource::Placeholder)
        }

        fn set_enabled(&self, track: &LocalTrack, enabled: bool) {
            let mut disabled = self.disabled.lock().expect("lock");
            disabled.retain(|id| id != &track.id);
            if !enabled {
                disabled.push(track.id.clone());
            }
        }

        fn stop(&self, track: &LocalTrack) {
            self.stopped.lock().expect("lock").push(track.id.clone());
        }
    }

    #[derive(Debug, Default)]
    struct TransportLog {
        created: usize,
        answers_applied: usize,
        candidates: Vec<Value>,
        replaced: Vec<TrackSource>,
        closed: usize,
    }

    struct MockTransport {
        log: Arc<Mutex<TransportLog>>,
    }

    #[async_trait]
    impl PeerTransport for MockTransport {
        async fn add_tracks(&mut self, _media: &LocalMedia) -> Result<(), TransportError> {
            Ok(())
        }

        async fn create_offer(&mut self) -> Result<Value, TransportError> {
            Ok(json!({ "type": "offer", "sdp": "v=0 offer" }))
        }

        async fn accept_offer(&mut self, _offer: Value) -> Result<Value, TransportError> {
            Ok(json!({ "type": "answer", "sdp": "v=0 answer" }))
        }

        async fn apply_answer(&mut self, _answer: Value) -> Result<(), TransportError> {
            self.log.lock().expect("lock").answers_applied += 1;
            Ok(())
        }

        async fn add_ice_candidate(&mut self, candidate: Value) -> Result<(), TransportError> {
            self.log.lock().expect("lock").candidates.push(candidate);
            Ok(())
        }

        async fn replace_video_track(&mut self, track: &LocalTrack) -> Result<(), TransportError> {
            self.log.lock().expect("lock").replaced.push(track.source);
            Ok(())
        }

        async fn close(&mut self) {
            self.log.lock().expect("lock").closed += 1;
        }
    }

    #[derive(Default)]
    struct MockFactory {
        log: Arc<Mutex<TransportLog>>,
    }

    impl TransportFactory for MockFactory {
        fn create(&self, _ice_servers: &[IceServerConfig]) -> Box<dyn PeerTransport> {
            self.log.lock().expect("lock").created += 1;
            Box::new(MockTransport {
                log: self.log.clone(),
            })
        }
    }

    struct Side {
        session: CallSession,
        outbound: mpsc::UnboundedReceiver<ClientEvent>,
        devices: Arc<MockDevices>,
        factory: Arc<MockFactory>,
        identity: Uuid,
    }

    fn side(booking_id: Uuid) -> Side {
        let devices = Arc::new(MockDevices::default());
        let factory = Arc::new(MockFactory::default());
        let (tx, rx) = mpsc::unbounded_channel();
        Side {
            session: CallSession::new(
                booking_id,
                devices.clone(),
                factory.clone(),
                Vec::new(),
                tx,
            ),
            outbound: rx,
            devices,
            factory,
            identity: Uuid::new_v4(),
        }
    }

    /// What the relay would deliver to the other peer.
    fn relayed(from: &mut Side) -> Vec<CallEvent> {
        let mut out = Vec::new();
        while let Ok(event) = from.outbound.try_recv() {
            let server_event = match event {
                ClientEvent::Signal { booking_id, data } => ServerEvent::Signal {
                    booking_id,
                    from: from.identity,
                    data,
                },
                ClientEvent::EndCall { booking_id } => ServerEvent::EndCall {
                    booking_id,
                    by: from.identity,
                },
                other => panic!("unexpected outbound event {other:?}"),
            };
            out.push(CallEvent::Remote(server_event));
        }
        out
    }

    async fn connected_pair() -> (Side, Side, Uuid) {
        let booking_id = Uuid::new_v4();
        let mut caller = side(booking_id);
        let mut callee = side(booking_id);

        caller.session.handle(CallEvent::StartCall).await.expect("start");
        for event in relayed(&mut caller) {
            callee.session.handle(event).await.expect("offer");
        }
        for event in relayed(&mut callee) {
            caller.session.handle(event).await.expect("answer");
        }
        (caller, callee, booking_id)
    }

    #[tokio::test]
    async fn caller_and_callee_reach_connected() {
        let booking_id = Uuid::new_v4();
        let mut caller = side(booking_id);
        let mut callee = side(booking_id);

        assert_eq!(
            caller.session.handle(CallEvent::StartCall).await,
            Ok(CallState::Offering)
        );
        assert_eq!(caller.session.role(), Some(CallRole::Caller));

        let offer = relayed(&mut caller);
        assert_eq!(offer.len(), 1);
        assert_eq!(
            callee.session.handle(offer[0].clone()).await,
            Ok(CallState::Connected)
        );
        assert_eq!(callee.session.role(), Some(CallRole::Callee));

        let answer = relayed(&mut callee);
        assert_eq!(answer.len(), 1);
        assert_eq!(
            caller.session.handle(answer[0].clone()).await,
            Ok(CallState::Connected)
        );
        assert_eq!(caller.factory.log.lock().expect("lock").answers_applied, 1);
        assert!(caller.session.call_duration().is_some());
    }

    #[tokio::test]
    async fn denied_media_returns_caller_to_idle() {
        let mut caller = side(Uuid::new_v4());
        caller.devices.deny_user_media.store(true, Ordering::SeqCst);

        let err = caller.session.handle(CallEvent::StartCall).await.expect_err("denied");
        assert!(matches!(err, CallError::MediaAccessDenied(_)));
        assert_eq!(caller.session.state(), CallState::Idle);
        assert!(relayed(&mut caller).is_empty());

        caller.devices.deny_user_media.store(false, Ordering::SeqCst);
        assert_eq!(
            caller.session.handle(CallEvent::StartCall).await,
            Ok(CallState::Offering)
        );
    }

    #[tokio::test]
    async fn denied_media_aborts_incoming_call() {
        let booking_id = Uuid::new_v4();
        let mut caller = side(booking_id);
        let mut callee = side(booking_id);
        callee.devices.deny_user_media.store(true, Ordering::SeqCst);

        caller.session.handle(CallEvent::StartCall).await.expect("start");
        let offer = relayed(&mut caller).remove(0);
        assert!(callee.session.handle(offer).await.is_err());
        assert_eq!(callee.session.state(), CallState::Idle);
        assert!(relayed(&mut callee).is_empty());
    }

    #[tokio::test]
    async fn candidates_apply_while_offering() {
        let booking_id = Uuid::new_v4();
        let mut caller = side(booking_id);
        caller.session.handle(CallEvent::StartCall).await.expect("start");
        relayed(&mut caller);

        let candidate = ServerEvent::Signal {
            booking_id,
            from: Uuid::new_v4(),
            data: json!({ "type": "candidate", "candidate": { "candidate": "candidate:1" } }),
        };
        caller.session.handle(CallEvent::Remote(candidate)).await.expect("candidate");
        assert_eq!(caller.factory.log.lock().expect("lock").candidates.len(), 1);

        caller
            .session
            .handle(CallEvent::LocalCandidate(json!({ "candidate": "candidate:2" })))
            .await
            .expect("local candidate");
        let sent = relayed(&mut caller);
        assert!(matches!(
            &sent[..],
            [CallEvent::Remote(ServerEvent::Signal { data, .. })] if data["type"] == "candidate"
        ));
    }

    #[tokio::test]
    async fn answer_outside_offering_is_rejected() {
        let booking_id = Uuid::new_v4();
        let mut idle = side(booking_id);
        let answer = ServerEvent::Signal {
            booking_id,
            from: Uuid::new_v4(),
            data: json!({ "type": "answer", "sdp": "v=0" }),
        };
        assert!(matches!(
            idle.session.handle(CallEvent::Remote(answer)).await,
            Err(CallError::InvalidTransition { event: "answer", state: CallState::Idle })
        ));
        assert!(relayed(&mut idle).is_empty());
    }

    #[tokio::test]
    async fn mute_toggles_audio_in_place() {
        let (mut caller, _callee, _) = connected_pair().await;
        caller.session.handle(CallEvent::ToggleMute).await.expect("mute");
        assert!(caller.session.is_muted());
        assert_eq!(caller.devices.disabled.lock().expect("lock").len(), 1);
        assert!(caller.factory.log.lock().expect("lock").replaced.is_empty());

        caller.session.handle(CallEvent::ToggleMute).await.expect("unmute");
        assert!(!caller.session.is_muted());
        assert!(caller.devices.disabled.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn camera_off_swaps_in_placeholder_and_back() {
        let (mut caller, _callee, _) = connected_pair().await;
        let camera = caller.session.local_media().video.clone().expect("camera");

        caller.session.handle(CallEvent::ToggleCamera).await.expect("camera off");
        assert!(caller.session.is_camera_off());
        assert!(caller.devices.stopped().contains(&camera.id));

        caller.session.handle(CallEvent::ToggleCamera).await.expect("camera on");
        assert!(!caller.session.is_camera_off());
        assert_eq!(
            caller.factory.log.lock().expect("lock").replaced,
            vec![TrackSource::Placeholder, TrackSource::Camera]
        );
        assert_eq!(caller.session.state(), CallState::Connected);
    }

    #[tokio::test]
    async fn screen_share_reverts_to_camera_or_placeholder() {
        let (mut caller, _callee, _) = connected_pair().await;

        caller.session.handle(CallEvent::StartScreenShare).await.expect("share");
        assert!(caller.session.is_sharing_screen());
        caller.session.handle(CallEvent::ScreenShareEnded).await.expect("ended");
        assert!(!caller.session.is_sharing_screen());

        caller.devices.camera_broken.store(true, Ordering::SeqCst);
        caller.session.handle(CallEvent::StartScreenShare).await.expect("share again");
        caller.session.handle(CallEvent::StopScreenShare).await.expect("stop");
        assert!(caller.session.is_camera_off());

        assert_eq!(
            caller.factory.log.lock().expect("lock").replaced,
            vec![
                TrackSource::Screen,
                TrackSource::Camera,
                TrackSource::Screen,
                TrackSource::Placeholder,
            ]
        );
    }

    #[tokio::test]
    async fn end_call_notifies_peer_and_releases_everything() {
        let (mut caller, mut callee, _) = connected_pair().await;
        caller.session.handle(CallEvent::StartRecording).await.expect("record");
        assert!(caller.session.is_recording());

        assert_eq!(caller.session.handle(CallEvent::EndCall).await, Ok(CallState::Ended));
        assert!(!caller.session.is_recording());
        assert!(caller.session.call_duration().is_none());
        assert_eq!(caller.devices.stopped().len(), 2);
        assert_eq!(caller.factory.log.lock().expect("lock").closed, 1);

        for event in relayed(&mut caller) {
            assert_eq!(callee.session.handle(event).await, Ok(CallState::Ended));
        }
        assert_eq!(callee.factory.log.lock().expect("lock").closed, 1);

        // second hang-up is a no-op
        assert_eq!(caller.session.handle(CallEvent::EndCall).await, Ok(CallState::Ended));
        assert!(relayed(&mut caller).is_empty());
    }

    #[tokio::test]
    async fn peer_left_and_lost_connection_end_the_call() {
        let (mut caller, mut callee, booking_id) = connected_pair().await;

        callee
            .session
            .handle(CallEvent::ConnectionStateChanged(ConnectionState::Failed))
            .await
            .expect("failure");
        assert_eq!(callee.session.state(), CallState::Ended);
        assert!(relayed(&mut callee).is_empty());

        let left = ServerEvent::PeerLeft {
            booking_id,
            peer_id: callee.identity,
        };
        assert_eq!(
            caller.session.handle(CallEvent::Remote(left)).await,
            Ok(CallState::Ended)
        );

        // the room is still valid: a fresh call can start
        assert_eq!(
            caller.session.handle(CallEvent::StartCall).await,
            Ok(CallState::Offering)
        );
        assert_eq!(caller.factory.log.lock().expect("lock").created, 2);
    }

    #[tokio::test]
    async fn ending_from_idle_is_harmless() {
        let mut idle = side(Uuid::new_v4());
        assert_eq!(idle.session.handle(CallEvent::EndCall).await, Ok(CallState::Ended));
        assert_eq!(idle.session.handle(CallEvent::EndCall).await, Ok(CallState::Ended));
        assert!(relayed(&mut idle).is_empty());
    }

    #[tokio::test]
    async fn run_hangs_up_when_the_queue_closes() {
        let booking_id = Uuid::new_v4();
        let mut caller = side(booking_id);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        events_tx.send(CallEvent::StartCall).expect("queue");
        drop(events_tx);

        caller.session.run(events_rx).await;

        let sent: Vec<ClientEvent> = std::iter::from_fn(|| caller.outbound.try_recv().ok()).collect();
        assert!(matches!(sent.first(), Some(ClientEvent::Signal { .. })));
        assert_eq!(sent.last(), Some(&ClientEvent::EndCall { booking_id }));
    }
}
