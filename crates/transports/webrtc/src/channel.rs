//! Control-channel wrapper
//!
//! One ordered, reliable data channel carries the JSON event protocol
//! alongside the audio. The [`ControlChannel`] trait is the seam the
//! session logic sends through; tests substitute a recording
//! implementation.

use async_trait::async_trait;
use kaiwa_core::{ClientEvent, Result, SessionError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use webrtc::data_channel::RTCDataChannel;

/// Sends protocol events to the remote service
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Serialize and send one event frame
    async fn send_event(&self, event: &ClientEvent) -> Result<()>;

    /// Whether the channel has opened and not yet closed
    fn is_open(&self) -> bool;

    /// Close the channel
    async fn close(&self) -> Result<()>;
}

/// [`ControlChannel`] over a live `RTCDataChannel`
pub struct RtcControlChannel {
    channel: Arc<RTCDataChannel>,
    open: Arc<AtomicBool>,
}

impl RtcControlChannel {
    /// Wrap a data channel. Open/close bookkeeping is driven by the session
    /// manager's handlers via [`mark_open`](Self::mark_open) and
    /// [`mark_closed`](Self::mark_closed), since the underlying channel
    /// supports only one handler per event.
    pub fn new(channel: Arc<RTCDataChannel>) -> Self {
        Self {
            channel,
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record that the channel reported open
    pub fn mark_open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    /// Record that the channel reported closed
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Channel label
    pub fn label(&self) -> &str {
        self.channel.label()
    }
}

#[async_trait]
impl ControlChannel for RtcControlChannel {
    async fn send_event(&self, event: &ClientEvent) -> Result<()> {
        if !self.is_open() {
            return Err(SessionError::ChannelClosed);
        }

        let frame = serde_json::to_string(event)
            .map_err(|e| SessionError::internal(format!("failed to encode {}: {}", event.name(), e)))?;

        self.channel
            .send_text(frame)
            .await
            .map_err(|e| SessionError::transport(format!("control-channel send failed: {}", e)))?;

        debug!(event = event.name(), "sent control event");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.mark_closed();
        self.channel
            .close()
            .await
            .map_err(|e| SessionError::transport(format!("control-channel close failed: {}", e)))
    }
}
