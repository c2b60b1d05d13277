//! Speaker playback using cpal
//!
//! Mirrors the capture side: a dedicated thread owns the `!Send` cpal
//! stream and the session side only pushes samples into a shared queue the
//! output callback drains.

use super::{PlaybackSink, SAMPLE_RATE};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use kaiwa_core::{Result, SessionError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

/// Default playback sink: the system's default output device, opened
/// lazily on the first inbound audio.
#[derive(Default)]
pub struct CpalPlaybackSink {
    worker: tokio::sync::Mutex<Option<PlaybackWorker>>,
}

impl CpalPlaybackSink {
    /// Create a sink bound to the default output device
    pub fn new() -> Self {
        Self::default()
    }
}

struct PlaybackWorker {
    queue: Arc<Mutex<VecDeque<f32>>>,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
}

impl PlaybackWorker {
    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        self.queue.lock().clear();
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[async_trait]
impl PlaybackSink for CpalPlaybackSink {
    async fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        if sample_rate != SAMPLE_RATE {
            return Err(SessionError::transport(format!(
                "playback sink only supports {} Hz, got {}",
                SAMPLE_RATE, sample_rate
            )));
        }

        let mut worker = self.worker.lock().await;
        if worker.is_none() {
            *worker = Some(open_output_worker().await?);
        }

        if let Some(worker) = worker.as_ref() {
            worker.queue.lock().extend(samples.iter().copied());
        }
        Ok(())
    }

    async fn close(&self) {
        if let Some(mut worker) = self.worker.lock().await.take() {
            worker.stop();
            debug!("playback sink closed");
        }
    }
}

async fn open_output_worker() -> Result<PlaybackWorker> {
    let queue: Arc<Mutex<VecDeque<f32>>> = Arc::new(Mutex::new(VecDeque::new()));
    let callback_queue = Arc::clone(&queue);
    let (ready_tx, ready_rx) = oneshot::channel::<std::result::Result<String, String>>();
    let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

    std::thread::Builder::new()
        .name("kaiwa-playback".to_string())
        .spawn(move || match open_output_stream(callback_queue) {
            Ok((stream, device_name)) => {
                let _ = ready_tx.send(Ok(device_name));
                let _ = stop_rx.recv();
                drop(stream);
                debug!("playback thread exited");
            }
            Err(message) => {
                let _ = ready_tx.send(Err(message));
            }
        })
        .map_err(|e| SessionError::transport(format!("failed to spawn playback thread: {}", e)))?;

    match ready_rx.await {
        Ok(Ok(device_name)) => {
            info!(device = %device_name, sample_rate = SAMPLE_RATE, "speaker playback started");
            Ok(PlaybackWorker {
                queue,
                stop_tx: Some(stop_tx),
            })
        }
        Ok(Err(message)) => Err(SessionError::transport(message)),
        Err(_) => Err(SessionError::transport("playback thread died during setup")),
    }
}

fn open_output_stream(
    queue: Arc<Mutex<VecDeque<f32>>>,
) -> std::result::Result<(cpal::Stream, String), String> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| "no output device available".to_string())?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| format!("output device '{}' refused enumeration: {}", device_name, e))?
        .find(|c| c.channels() == 1)
        .ok_or_else(|| format!("device '{}' does not support mono playback", device_name))?
        .with_sample_rate(cpal::SampleRate(SAMPLE_RATE));

    let stream = device
        .build_output_stream(
            &supported_config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = queue.lock();
                for sample in data.iter_mut() {
                    *sample = queue.pop_front().unwrap_or(0.0);
                }
            },
            |err| {
                error!("audio playback error: {}", err);
            },
            None,
        )
        .map_err(|e| format!("failed to open playback stream on '{}': {}", device_name, e))?;

    stream
        .play()
        .map_err(|e| format!("failed to start playback stream: {}", e))?;

    Ok((stream, device_name))
}
