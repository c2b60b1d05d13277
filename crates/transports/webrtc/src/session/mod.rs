//! Realtime voice session manager
//!
//! Owns the full connection lifecycle: credential acquisition, microphone
//! capture, peer-connection setup, SDP offer/answer exchange, and the
//! control-channel protocol. Callers drive it through `connect`,
//! `disconnect`, and `toggle_mute`, and observe it through `snapshot` and
//! the take-once event receiver.
//!
//! All shared state lives in one [`SharedState`] aggregate mutated only by
//! the manager's own handlers. Every asynchronous continuation captures the
//! attempt counter it was started for and checks it before touching state,
//! so continuations from a superseded or disconnected attempt land as safe
//! no-ops.

mod dispatch;

use crate::channel::{ControlChannel, RtcControlChannel};
use crate::config::SessionConfig;
use crate::media::{
    CaptureHandle, CpalMediaSource, CpalPlaybackSink, MediaSource, OpusDecoder, OpusEncoder,
    PlaybackSink, FRAME_DURATION_MS, SAMPLES_PER_FRAME, SAMPLE_RATE,
};
use crate::negotiation::{HttpNegotiator, Negotiator};
use crate::peer::{add_outbound_audio_track, build_peer_connection};
use kaiwa_auth::CredentialProvider;
use kaiwa_core::{
    ClientEvent, ErrorInfo, Result, ScenarioConfig, SessionError, SessionEvent, SessionPhase,
    SessionSnapshot, SessionUpdate, TranscriptEntry, TranscriptLog,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Channel capacity for caller-facing events
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Manages at most one live voice session
pub struct SessionManager {
    config: SessionConfig,
    provider: Arc<dyn CredentialProvider>,
    negotiator: Arc<dyn Negotiator>,
    media: Arc<dyn MediaSource>,
    shared: Arc<SharedState>,
    event_rx: RwLock<Option<mpsc::Receiver<SessionEvent>>>,
}

/// State shared between the manager and its spawned handlers
pub(crate) struct SharedState {
    phase: RwLock<SessionPhase>,
    session: RwLock<Option<ActiveSession>>,
    transcript: RwLock<TranscriptLog>,
    last_error: RwLock<Option<ErrorInfo>>,
    muted: AtomicBool,
    /// Monotonic attempt counter; bumping it invalidates every continuation
    /// spawned for earlier attempts
    attempt: AtomicU64,
    /// Serializes teardown against concurrent failure/disconnect paths
    teardown_lock: Mutex<()>,
    playback: Arc<dyn PlaybackSink>,
    event_tx: mpsc::Sender<SessionEvent>,
}

/// The aggregate for one live or in-flight connection. Resources are filled
/// in acquisition order and released in reverse.
struct ActiveSession {
    attempt: u64,
    id: Uuid,
    scenario: ScenarioConfig,
    capture: Option<Box<dyn CaptureHandle>>,
    peer: Option<Arc<RTCPeerConnection>>,
    channel: Option<Arc<dyn ControlChannel>>,
    pump: Option<JoinHandle<()>>,
}

impl ActiveSession {
    fn new(attempt: u64, scenario: ScenarioConfig) -> Self {
        Self {
            attempt,
            id: Uuid::new_v4(),
            scenario,
            capture: None,
            peer: None,
            channel: None,
            pump: None,
        }
    }
}

impl SessionManager {
    /// Create a manager with the default cpal/HTTP collaborators
    pub fn new(config: SessionConfig, provider: Arc<dyn CredentialProvider>) -> Result<Self> {
        let negotiator = Arc::new(HttpNegotiator::new(config.negotiation_url.clone()));
        Self::with_io(
            config,
            provider,
            negotiator,
            Arc::new(CpalMediaSource::new()),
            Arc::new(CpalPlaybackSink::new()),
        )
    }

    /// Create a manager with explicit collaborators (tests, embedding)
    pub fn with_io(
        config: SessionConfig,
        provider: Arc<dyn CredentialProvider>,
        negotiator: Arc<dyn Negotiator>,
        media: Arc<dyn MediaSource>,
        playback: Arc<dyn PlaybackSink>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| SessionError::internal(format!("invalid configuration: {}", e)))?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            provider,
            negotiator,
            media,
            shared: Arc::new(SharedState {
                phase: RwLock::new(SessionPhase::Idle),
                session: RwLock::new(None),
                transcript: RwLock::new(TranscriptLog::new()),
                last_error: RwLock::new(None),
                muted: AtomicBool::new(false),
                attempt: AtomicU64::new(0),
                teardown_lock: Mutex::new(()),
                playback,
                event_tx,
            }),
            event_rx: RwLock::new(Some(event_rx)),
        })
    }

    /// Take the caller-facing event receiver. Yields `Some` exactly once.
    pub async fn take_event_receiver(&self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.event_rx.write().await.take()
    }

    /// Atomic read-only view of the current state
    pub async fn snapshot(&self) -> SessionSnapshot {
        let phase = *self.shared.phase.read().await;
        SessionSnapshot {
            phase,
            connecting: phase == SessionPhase::Connecting,
            connected: phase == SessionPhase::Active,
            scenario: self
                .shared
                .session
                .read()
                .await
                .as_ref()
                .map(|s| s.scenario.clone()),
            muted: self.shared.muted.load(Ordering::SeqCst),
            last_error: self.shared.last_error.read().await.clone(),
            transcript: self.shared.transcript.read().await.entries().to_vec(),
        }
    }

    /// Establish a session for the given scenario.
    ///
    /// Fails fast with `AlreadyConnecting`/`AlreadyConnected` while busy.
    /// Any failure releases every partially-acquired resource, records the
    /// specific cause in the snapshot, and resolves the phase back to
    /// `Idle` so the caller can retry.
    pub async fn connect(&self, scenario: ScenarioConfig) -> Result<()> {
        scenario
            .validate()
            .map_err(|e| SessionError::internal(format!("invalid scenario: {}", e)))?;

        // The teardown lock keeps a concurrent disconnect/failure teardown
        // from interleaving between the phase transition and the session
        // install; under it the phase is never Disconnecting or Failed.
        let attempt = {
            let _guard = self.shared.teardown_lock.lock().await;
            {
                let mut phase = self.shared.phase.write().await;
                match *phase {
                    SessionPhase::Connecting => return Err(SessionError::AlreadyConnecting),
                    SessionPhase::Active => return Err(SessionError::AlreadyConnected),
                    _ => {}
                }
                *phase = SessionPhase::Connecting;
            }
            *self.shared.last_error.write().await = None;

            let attempt = self.shared.attempt.fetch_add(1, Ordering::SeqCst) + 1;
            let session = ActiveSession::new(attempt, scenario.clone());
            info!(
                session_id = %session.id,
                scenario = %scenario.id,
                "starting connection attempt"
            );
            *self.shared.session.write().await = Some(session);
            attempt
        };
        self.shared.emit(SessionEvent::PhaseChanged {
            phase: SessionPhase::Connecting,
        });

        match self.connect_inner(attempt, &scenario).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(error = %err, "connection attempt failed");
                self.shared.teardown(attempt, Some(err.clone())).await;
                Err(err)
            }
        }
    }

    async fn connect_inner(&self, attempt: u64, scenario: &ScenarioConfig) -> Result<()> {
        // Step 1: fresh credential, validated before any transport work.
        let credential = self.provider.acquire().await?;
        if credential.is_expired() {
            return Err(SessionError::CredentialExpired);
        }

        // Step 2: exclusive local capture.
        let mut capture = self.media.acquire(&self.config.capture).await?;
        let frames = capture
            .take_frames()
            .ok_or_else(|| SessionError::internal("capture handle yielded no frame stream"))?;
        self.shared
            .with_session(attempt, move |s| s.capture = Some(capture))
            .await?;

        // Step 3: peer transport with the outbound track attached and the
        // inbound-track handler registered before negotiation starts.
        let peer = build_peer_connection(&self.config).await?;
        let track = add_outbound_audio_track(&peer).await?;
        self.register_inbound_audio(attempt, &peer);
        {
            let peer = Arc::clone(&peer);
            self.shared
                .with_session(attempt, move |s| s.peer = Some(peer))
                .await?;
        }

        // Step 4: exactly one ordered, reliable control channel with the
        // protocol-reserved label.
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let data_channel = peer
            .create_data_channel(&self.config.channel_label, Some(init))
            .await
            .map_err(|e| {
                SessionError::transport(format!("failed to create control channel: {}", e))
            })?;
        let control = Arc::new(RtcControlChannel::new(Arc::clone(&data_channel)));
        self.register_channel_handlers(attempt, &data_channel, &control, scenario);
        {
            let control: Arc<dyn ControlChannel> = Arc::clone(&control) as _;
            self.shared
                .with_session(attempt, move |s| s.channel = Some(control))
                .await?;
        }

        // Step 5: finalize the local description. Candidate gathering may
        // never naturally complete, so the wait is bounded and whichever
        // description exists when the bound elapses is sent.
        let offer = peer
            .create_offer(None)
            .await
            .map_err(|e| SessionError::transport(format!("failed to create offer: {}", e)))?;
        let mut gathering_done = peer.gathering_complete_promise().await;
        peer.set_local_description(offer)
            .await
            .map_err(|e| SessionError::transport(format!("failed to set local description: {}", e)))?;
        match tokio::time::timeout(self.config.gathering_timeout, gathering_done.recv()).await {
            Ok(_) => debug!("candidate gathering complete"),
            Err(_) => debug!(
                timeout_ms = self.config.gathering_timeout.as_millis() as u64,
                "candidate gathering timed out, sending available description"
            ),
        }
        let local = peer
            .local_description()
            .await
            .ok_or_else(|| SessionError::internal("no local description after gathering"))?;

        // Step 6: single offer/answer round trip, authenticated with the
        // credential. Guard against a disconnect that raced the waits.
        if !self.shared.is_current(attempt) {
            return Err(SessionError::internal("connection attempt superseded"));
        }
        let answer_sdp = self.negotiator.exchange(&local.sdp, &credential).await?;
        if !self.shared.is_current(attempt) {
            return Err(SessionError::internal("connection attempt superseded"));
        }
        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| SessionError::transport(format!("invalid answer SDP: {}", e)))?;
        peer.set_remote_description(answer)
            .await
            .map_err(|e| SessionError::transport(format!("failed to set remote description: {}", e)))?;

        // Outbound audio starts flowing; the Active transition itself waits
        // for the control channel to report open.
        let pump = self.spawn_outbound_pump(attempt, frames, track);
        self.shared
            .with_session(attempt, move |s| s.pump = Some(pump))
            .await?;

        info!("handshake complete, waiting for control channel");
        Ok(())
    }

    /// Tear down the live session, releasing every resource. Idempotent:
    /// calling from `Idle` is a no-op. Never fails; teardown must be safe
    /// from cleanup paths.
    pub async fn disconnect(&self) {
        let _guard = self.shared.teardown_lock.lock().await;
        {
            let mut phase = self.shared.phase.write().await;
            if *phase == SessionPhase::Idle {
                debug!("disconnect ignored, already idle");
                return;
            }
            *phase = SessionPhase::Disconnecting;
        }
        self.shared.emit(SessionEvent::PhaseChanged {
            phase: SessionPhase::Disconnecting,
        });
        info!("disconnecting");

        self.shared.teardown_locked(None).await;
    }

    /// Flip the outbound mute flag in place. The outbound track is never
    /// removed; muting substitutes silence so no renegotiation happens. On
    /// the unmuted-to-muted edge the remote is told to discard buffered
    /// input audio. No-op without a session.
    pub async fn toggle_mute(&self) -> bool {
        let channel = {
            let session = self.shared.session.read().await;
            match session.as_ref() {
                Some(active) => active.channel.clone(),
                None => {
                    debug!("toggle_mute ignored, no session");
                    return false;
                }
            }
        };

        let was_muted = self.shared.muted.fetch_xor(true, Ordering::SeqCst);
        let muted = !was_muted;
        info!(muted, "outbound audio mute toggled");

        if muted {
            if let Some(channel) = channel {
                if channel.is_open() {
                    if let Err(e) = channel
                        .send_event(&ClientEvent::InputAudioBufferClear {})
                        .await
                    {
                        warn!(error = %e, "failed to send buffer-clear");
                        self.shared.emit(SessionEvent::Error {
                            code: e.code(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
        muted
    }

    /// Route inbound audio to the playback sink as soon as a remote track
    /// arrives.
    fn register_inbound_audio(&self, attempt: u64, peer: &Arc<RTCPeerConnection>) {
        let shared = Arc::clone(&self.shared);
        peer.on_track(Box::new(move |track, _receiver, _transceiver| {
            let shared = Arc::clone(&shared);
            Box::pin(async move {
                if !shared.is_current(attempt) {
                    debug!("ignoring track from stale attempt");
                    return;
                }
                if track.kind() != RTPCodecType::Audio {
                    debug!(kind = %track.kind(), "ignoring non-audio track");
                    return;
                }
                info!("remote audio track attached");

                tokio::spawn(async move {
                    let mut decoder = match OpusDecoder::new() {
                        Ok(decoder) => decoder,
                        Err(e) => {
                            error!(error = %e, "cannot decode inbound audio");
                            return;
                        }
                    };
                    let mut playback_warned = false;

                    loop {
                        if !shared.is_current(attempt) {
                            break;
                        }
                        let (packet, _) = match track.read_rtp().await {
                            Ok(packet) => packet,
                            Err(e) => {
                                debug!("inbound RTP ended: {}", e);
                                break;
                            }
                        };
                        let samples = match decoder.decode(&packet.payload) {
                            Ok(samples) => samples,
                            Err(e) => {
                                warn!(error = %e, "dropping undecodable audio packet");
                                continue;
                            }
                        };
                        if let Err(e) = shared.playback.play(&samples, SAMPLE_RATE).await {
                            if !playback_warned {
                                playback_warned = true;
                                warn!(error = %e, "playback unavailable, dropping inbound audio");
                            }
                        }
                    }
                    debug!("inbound audio task ended");
                });
            })
        }));
    }

    /// Wire the control-channel callbacks: open drives the Active
    /// transition and the one-time configuration push, message drives the
    /// protocol dispatch, close tears the session down if it was live.
    fn register_channel_handlers(
        &self,
        attempt: u64,
        data_channel: &Arc<webrtc::data_channel::RTCDataChannel>,
        control: &Arc<RtcControlChannel>,
        scenario: &ScenarioConfig,
    ) {
        let update = ClientEvent::SessionUpdate {
            session: SessionUpdate {
                instructions: scenario.instructions.clone(),
                voice: scenario.voice.clone(),
                input_audio_transcription: kaiwa_core::protocol::InputAudioTranscription {
                    model: self.config.transcription_model.clone(),
                },
                turn_detection: self.config.turn_detection.clone(),
            },
        };

        let shared = Arc::clone(&self.shared);
        let control_open = Arc::clone(control);
        data_channel.on_open(Box::new(move || {
            let shared = Arc::clone(&shared);
            let control = Arc::clone(&control_open);
            let update = update.clone();
            Box::pin(async move {
                control.mark_open();
                shared
                    .handle_channel_open(attempt, control.as_ref(), &update)
                    .await;
            })
        }));

        let shared = Arc::clone(&self.shared);
        data_channel.on_message(Box::new(move |message| {
            let shared = Arc::clone(&shared);
            Box::pin(async move {
                if !message.is_string {
                    warn!("dropping non-text control frame");
                    return;
                }
                match String::from_utf8(message.data.to_vec()) {
                    Ok(raw) => dispatch::dispatch_frame(&shared, attempt, &raw).await,
                    Err(e) => warn!(error = %e, "dropping non-UTF-8 control frame"),
                }
            })
        }));

        let shared = Arc::clone(&self.shared);
        let control_close = Arc::clone(control);
        data_channel.on_close(Box::new(move || {
            let shared = Arc::clone(&shared);
            let control = Arc::clone(&control_close);
            Box::pin(async move {
                control.mark_closed();
                if !shared.is_current(attempt) {
                    return;
                }
                let phase = *shared.phase.read().await;
                if phase == SessionPhase::Active {
                    warn!("control channel closed while active, tearing down");
                    shared
                        .teardown(attempt, Some(SessionError::ChannelClosed))
                        .await;
                } else {
                    debug!(phase = phase.name(), "control channel closed");
                }
            })
        }));

        data_channel.on_error(Box::new(move |err| {
            Box::pin(async move {
                warn!("control channel error: {}", err);
            })
        }));
    }

    /// Encode captured frames to Opus and write them to the outbound
    /// track. Muting substitutes silence in place, keeping the RTP cadence.
    fn spawn_outbound_pump(
        &self,
        attempt: u64,
        mut frames: mpsc::Receiver<Vec<f32>>,
        track: Arc<TrackLocalStaticSample>,
    ) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut encoder = match OpusEncoder::new() {
                Ok(encoder) => encoder,
                Err(e) => {
                    error!(error = %e, "cannot encode outbound audio");
                    return;
                }
            };
            let silence = vec![0.0f32; SAMPLES_PER_FRAME];
            let frame_duration = Duration::from_millis(FRAME_DURATION_MS as u64);

            while let Some(frame) = frames.recv().await {
                if !shared.is_current(attempt) {
                    break;
                }
                let samples = if shared.muted.load(Ordering::SeqCst) {
                    silence.as_slice()
                } else {
                    frame.as_slice()
                };
                let payload = match encoder.encode(samples) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, "dropping unencodable frame");
                        continue;
                    }
                };
                let sample = webrtc::media::Sample {
                    data: bytes::Bytes::from(payload),
                    duration: frame_duration,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    trace!("outbound write failed: {}", e);
                }
            }
            debug!("outbound audio pump ended");
        })
    }
}

impl SharedState {
    fn current_attempt(&self) -> u64 {
        self.attempt.load(Ordering::SeqCst)
    }

    pub(crate) fn is_current(&self, attempt: u64) -> bool {
        self.current_attempt() == attempt
    }

    /// Push a caller-facing event; dropped (with a trace) when the caller
    /// is not draining the receiver.
    pub(crate) fn emit(&self, event: SessionEvent) {
        if self.event_tx.try_send(event.clone()).is_err() {
            trace!(event = event.name(), "event dropped, receiver not drained");
        }
    }

    /// Append a transcript entry and notify observers
    pub(crate) async fn append_entry(&self, entry: TranscriptEntry) {
        self.transcript.write().await.append(entry.clone());
        self.emit(SessionEvent::TranscriptAppended { entry });
    }

    pub(crate) async fn phase(&self) -> SessionPhase {
        *self.phase.read().await
    }

    /// Mutate the live session owned by `attempt`; fails when the attempt
    /// has been superseded so late resources are dropped, not leaked into a
    /// dead session.
    async fn with_session<F>(&self, attempt: u64, f: F) -> Result<()>
    where
        F: FnOnce(&mut ActiveSession),
    {
        let mut guard = self.session.write().await;
        match guard.as_mut() {
            Some(session) if session.attempt == attempt => {
                f(session);
                Ok(())
            }
            _ => Err(SessionError::internal("connection attempt superseded")),
        }
    }

    /// Active transition and the one-time configuration push. The
    /// configuration message must never be sent before the channel reports
    /// open, so this is the only place it is sent from.
    pub(crate) async fn handle_channel_open(
        &self,
        attempt: u64,
        channel: &dyn ControlChannel,
        update: &ClientEvent,
    ) {
        if !self.is_current(attempt) {
            debug!("ignoring channel-open from stale attempt");
            return;
        }
        {
            let mut phase = self.phase.write().await;
            if *phase != SessionPhase::Connecting {
                debug!(
                    phase = phase.name(),
                    "channel opened outside connecting phase"
                );
                return;
            }
            *phase = SessionPhase::Active;
        }
        info!("control channel open, session active");
        self.emit(SessionEvent::PhaseChanged {
            phase: SessionPhase::Active,
        });

        if let Err(e) = channel.send_event(update).await {
            warn!(error = %e, "failed to push session configuration");
            self.emit(SessionEvent::Error {
                code: e.code(),
                message: e.to_string(),
            });
        }
    }

    /// Serialized teardown entry point for failure and channel-close paths
    pub(crate) async fn teardown(&self, attempt: u64, error: Option<SessionError>) {
        let _guard = self.teardown_lock.lock().await;
        if !self.is_current(attempt) {
            debug!("skipping teardown for superseded attempt");
            return;
        }
        self.teardown_locked(error).await;
    }

    /// Release all session resources in reverse-acquisition order and
    /// resolve the phase back to `Idle`. Caller holds `teardown_lock`.
    async fn teardown_locked(&self, error: Option<SessionError>) {
        // Invalidate continuations first so callbacks racing the release
        // below observe a stale attempt and bail out.
        self.attempt.fetch_add(1, Ordering::SeqCst);

        let session = self.session.write().await.take();
        if let Some(mut session) = session {
            debug!(session_id = %session.id, "releasing session resources");
            if let Some(pump) = session.pump.take() {
                pump.abort();
            }
            if let Some(channel) = session.channel.take() {
                if let Err(e) = channel.close().await {
                    debug!("control channel close: {}", e);
                }
            }
            if let Some(peer) = session.peer.take() {
                if let Err(e) = peer.close().await {
                    warn!("peer connection close: {}", e);
                }
            }
            if let Some(mut capture) = session.capture.take() {
                capture.stop();
            }
        }
        self.playback.close().await;
        self.transcript.write().await.clear();
        self.muted.store(false, Ordering::SeqCst);

        if let Some(err) = error {
            *self.last_error.write().await = Some(ErrorInfo::from(&err));
            {
                let mut phase = self.phase.write().await;
                *phase = SessionPhase::Failed;
            }
            self.emit(SessionEvent::PhaseChanged {
                phase: SessionPhase::Failed,
            });
        }

        {
            let mut phase = self.phase.write().await;
            *phase = SessionPhase::Idle;
        }
        self.emit(SessionEvent::PhaseChanged {
            phase: SessionPhase::Idle,
        });
        info!("session resources released, idle");
    }
}
