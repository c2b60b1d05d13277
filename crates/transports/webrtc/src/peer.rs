//! Peer-connection construction
//!
//! Thin layer over the `webrtc` crate: default Opus-capable media engine,
//! default interceptors, STUN servers from config, and the outbound
//! microphone track.

use crate::config::SessionConfig;
use crate::media::SAMPLE_RATE;
use kaiwa_core::{Result, SessionError};
use std::sync::Arc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Build a peer connection per the session configuration
pub(crate) async fn build_peer_connection(config: &SessionConfig) -> Result<Arc<RTCPeerConnection>> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| SessionError::transport(format!("failed to register codecs: {}", e)))?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .map_err(|e| SessionError::transport(format!("failed to register interceptors: {}", e)))?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let rtc_config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: config.stun_servers.clone(),
            ..Default::default()
        }],
        ..Default::default()
    };

    let peer_connection = api
        .new_peer_connection(rtc_config)
        .await
        .map_err(|e| SessionError::transport(format!("failed to create peer connection: {}", e)))?;

    Ok(Arc::new(peer_connection))
}

/// Create the outbound microphone track and attach it to the connection
pub(crate) async fn add_outbound_audio_track(
    peer_connection: &Arc<RTCPeerConnection>,
) -> Result<Arc<TrackLocalStaticSample>> {
    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: SAMPLE_RATE,
            channels: 2,
            ..Default::default()
        },
        "audio".to_owned(),
        "kaiwa-mic".to_owned(),
    ));

    peer_connection
        .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .map_err(|e| SessionError::transport(format!("failed to add audio track: {}", e)))?;

    Ok(track)
}
