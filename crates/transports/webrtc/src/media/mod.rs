//! Local media: capture, playback, and the Opus codec
//!
//! The session manager talks to audio hardware through the [`MediaSource`]
//! and [`PlaybackSink`] seams so tests can substitute silent in-memory
//! implementations. The default implementations are cpal-backed.

pub mod capture;
pub mod codec;
pub mod playback;

pub use capture::CpalMediaSource;
pub use codec::{OpusDecoder, OpusEncoder};
pub use playback::CpalPlaybackSink;

use async_trait::async_trait;
use kaiwa_core::Result;
use tokio::sync::mpsc;

/// Capture and playback sample rate in Hz. Opus always decodes at 48 kHz
/// and the outbound track is negotiated at the same rate.
pub const SAMPLE_RATE: u32 = 48_000;

/// Audio frame duration in milliseconds (Opus standard)
pub const FRAME_DURATION_MS: u32 = 20;

/// Mono samples per 20 ms frame at 48 kHz
pub const SAMPLES_PER_FRAME: usize = (SAMPLE_RATE as usize * FRAME_DURATION_MS as usize) / 1000;

/// Capture-path processing requested for the local microphone.
///
/// These mirror the constraints a browser capture pipeline applies. The
/// cpal backend has no far-end reference signal, so echo cancellation is
/// left to the platform capture path; noise suppression and gain control
/// are applied in-process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureOptions {
    /// Request acoustic echo cancellation
    pub echo_cancellation: bool,
    /// Gate frames that are indistinguishable from background noise
    pub noise_suppression: bool,
    /// Normalize capture level toward a target loudness
    pub auto_gain_control: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Acquires an exclusive local audio capture handle
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Open the capture device and start delivering 20 ms mono frames at
    /// [`SAMPLE_RATE`]. Fails with `MediaAccessDenied` when the device is
    /// unavailable or permission is refused.
    async fn acquire(&self, options: &CaptureOptions) -> Result<Box<dyn CaptureHandle>>;
}

/// A live capture stream. Dropping or stopping the handle releases the
/// device.
pub trait CaptureHandle: Send + Sync {
    /// Take the frame receiver. Yields `Some` exactly once.
    fn take_frames(&mut self) -> Option<mpsc::Receiver<Vec<f32>>>;

    /// Stop capturing and release the device. Idempotent.
    fn stop(&mut self);
}

/// Plays inbound assistant audio
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Queue decoded samples for playback. The sink opens the output device
    /// lazily on first use.
    async fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()>;

    /// Stop playback, drop queued audio, and release the device. Idempotent;
    /// the sink may be reused by a later session.
    async fn close(&self);
}
