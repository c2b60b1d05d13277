//! Microphone capture using cpal
//!
//! The cpal stream is `!Send`, so a dedicated thread owns it for the life
//! of the capture and the session side holds only the frame receiver and a
//! stop signal.

use super::{CaptureHandle, CaptureOptions, MediaSource, SAMPLES_PER_FRAME, SAMPLE_RATE};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use kaiwa_core::{Result, SessionError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Frames buffered between the capture callback and the encoder pump
const FRAME_QUEUE_DEPTH: usize = 64;

/// RMS below which a frame is treated as background noise
const NOISE_GATE_RMS: f32 = 0.004;

/// Loudness the automatic gain control steers toward
const AGC_TARGET_RMS: f32 = 0.1;

/// Default capture source: the system's default input device
#[derive(Debug, Default)]
pub struct CpalMediaSource;

impl CpalMediaSource {
    /// Create a source bound to the default input device
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaSource for CpalMediaSource {
    async fn acquire(&self, options: &CaptureOptions) -> Result<Box<dyn CaptureHandle>> {
        let options = *options;
        let (frame_tx, frame_rx) = mpsc::channel::<Vec<f32>>(FRAME_QUEUE_DEPTH);
        let (ready_tx, ready_rx) = oneshot::channel::<std::result::Result<String, String>>();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("kaiwa-capture".to_string())
            .spawn(move || match open_input_stream(options, frame_tx) {
                Ok((stream, device_name)) => {
                    let _ = ready_tx.send(Ok(device_name));
                    // Park until the session stops the capture; dropping the
                    // stream releases the device.
                    let _ = stop_rx.recv();
                    drop(stream);
                    debug!("capture thread exited");
                }
                Err(message) => {
                    let _ = ready_tx.send(Err(message));
                }
            })
            .map_err(|e| SessionError::media(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(device_name)) => {
                info!(
                    device = %device_name,
                    sample_rate = SAMPLE_RATE,
                    "microphone capture started"
                );
                Ok(Box::new(CpalCaptureHandle {
                    frames: Some(frame_rx),
                    stop_tx: Some(stop_tx),
                }))
            }
            Ok(Err(message)) => Err(SessionError::media(message)),
            Err(_) => Err(SessionError::media("capture thread died during setup")),
        }
    }
}

/// Open the default input device and start a mono 48 kHz stream that
/// delivers processed 20 ms frames into `frame_tx`.
fn open_input_stream(
    options: CaptureOptions,
    frame_tx: mpsc::Sender<Vec<f32>>,
) -> std::result::Result<(cpal::Stream, String), String> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| "no input device available".to_string())?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| format!("input device '{}' refused enumeration: {}", device_name, e))?
        .find(|c| c.channels() == 1)
        .ok_or_else(|| format!("device '{}' does not support mono capture", device_name))?
        .with_sample_rate(cpal::SampleRate(SAMPLE_RATE));

    let mut assembler = FrameAssembler::new(options);
    let mut queue_full_reported = false;

    let stream = device
        .build_input_stream(
            &supported_config.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                for frame in assembler.push(data) {
                    if frame_tx.try_send(frame).is_err() && !queue_full_reported {
                        queue_full_reported = true;
                        warn!("capture frame queue full, dropping audio");
                    }
                }
            },
            |err| {
                error!("audio capture error: {}", err);
            },
            None,
        )
        .map_err(|e| format!("failed to open capture stream on '{}': {}", device_name, e))?;

    stream
        .play()
        .map_err(|e| format!("failed to start capture stream: {}", e))?;

    Ok((stream, device_name))
}

/// Live capture handle; stopping (or dropping) releases the device
struct CpalCaptureHandle {
    frames: Option<mpsc::Receiver<Vec<f32>>>,
    stop_tx: Option<std::sync::mpsc::Sender<()>>,
}

impl CaptureHandle for CpalCaptureHandle {
    fn take_frames(&mut self) -> Option<mpsc::Receiver<Vec<f32>>> {
        self.frames.take()
    }

    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
            debug!("capture stop requested");
        }
    }
}

impl Drop for CpalCaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accumulates raw callback buffers into exact 20 ms frames and applies the
/// requested capture processing.
///
/// Echo cancellation needs a far-end reference the capture path does not
/// have; it stays with the platform driver when supported there.
struct FrameAssembler {
    options: CaptureOptions,
    pending: Vec<f32>,
    gain: f32,
}

impl FrameAssembler {
    fn new(options: CaptureOptions) -> Self {
        Self {
            options,
            pending: Vec::with_capacity(SAMPLES_PER_FRAME * 2),
            gain: 1.0,
        }
    }

    /// Feed raw samples; returns every completed frame
    fn push(&mut self, data: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(data);

        let mut frames = Vec::new();
        while self.pending.len() >= SAMPLES_PER_FRAME {
            let mut frame: Vec<f32> = self.pending.drain(..SAMPLES_PER_FRAME).collect();
            self.process(&mut frame);
            frames.push(frame);
        }
        frames
    }

    fn process(&mut self, frame: &mut [f32]) {
        let rms = root_mean_square(frame);

        if self.options.noise_suppression && rms < NOISE_GATE_RMS {
            frame.iter_mut().for_each(|s| *s = 0.0);
            return;
        }

        if self.options.auto_gain_control && rms > NOISE_GATE_RMS {
            let desired = AGC_TARGET_RMS / rms;
            self.gain += (desired - self.gain) * 0.1;
            self.gain = self.gain.clamp(0.25, 8.0);
            for sample in frame.iter_mut() {
                *sample = (*sample * self.gain).clamp(-1.0, 1.0);
            }
        }
    }
}

fn root_mean_square(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_frame() -> Vec<f32> {
        vec![0.001; SAMPLES_PER_FRAME]
    }

    fn voiced_frame(amplitude: f32) -> Vec<f32> {
        (0..SAMPLES_PER_FRAME)
            .map(|i| {
                amplitude * (i as f32 * 220.0 * 2.0 * std::f32::consts::PI / SAMPLE_RATE as f32).sin()
            })
            .collect()
    }

    #[test]
    fn test_assembler_produces_exact_frames() {
        let mut assembler = FrameAssembler::new(CaptureOptions {
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
        });

        // One and a half frames in, one out; the remainder stays pending.
        let frames = assembler.push(&vec![0.1; SAMPLES_PER_FRAME * 3 / 2]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), SAMPLES_PER_FRAME);

        let frames = assembler.push(&vec![0.1; SAMPLES_PER_FRAME / 2]);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_noise_gate_zeroes_quiet_frames() {
        let mut assembler = FrameAssembler::new(CaptureOptions {
            echo_cancellation: false,
            noise_suppression: true,
            auto_gain_control: false,
        });
        let frames = assembler.push(&quiet_frame());
        assert!(frames[0].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_gate_disabled_passes_quiet_frames() {
        let mut assembler = FrameAssembler::new(CaptureOptions {
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
        });
        let frames = assembler.push(&quiet_frame());
        assert!(frames[0].iter().any(|s| *s != 0.0));
    }

    #[test]
    fn test_agc_raises_low_level_speech() {
        let mut assembler = FrameAssembler::new(CaptureOptions {
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: true,
        });

        let input = voiced_frame(0.02);
        let input_rms = root_mean_square(&input);

        // Run several frames so the smoothed gain converges.
        let mut last_rms = input_rms;
        for _ in 0..50 {
            let frames = assembler.push(&input);
            last_rms = root_mean_square(&frames[0]);
        }
        assert!(last_rms > input_rms * 2.0);
    }

    #[test]
    fn test_agc_output_stays_in_range() {
        let mut assembler = FrameAssembler::new(CaptureOptions {
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: true,
        });
        for _ in 0..50 {
            for frame in assembler.push(&voiced_frame(0.9)) {
                assert!(frame.iter().all(|s| (-1.0..=1.0).contains(s)));
            }
        }
    }
}
