//! Opus encode/decode for the media leg

use super::{SAMPLE_RATE, SAMPLES_PER_FRAME};
use kaiwa_core::{Result, SessionError};

/// Largest Opus packet we ever produce
const MAX_PACKET_SIZE: usize = 4000;

/// Largest decode output: 120 ms at 48 kHz mono
const MAX_DECODE_SAMPLES: usize = 5760;

/// Opus encoder for the outbound microphone track
pub struct OpusEncoder {
    encoder: opus::Encoder,
}

// SAFETY: the Opus encoder state is self-contained; instances are never
// shared, only moved into the single pump task that owns them.
unsafe impl Send for OpusEncoder {}

impl OpusEncoder {
    /// Create a VoIP-tuned mono encoder at [`SAMPLE_RATE`]
    pub fn new() -> Result<Self> {
        let encoder = opus::Encoder::new(SAMPLE_RATE, opus::Channels::Mono, opus::Application::Voip)
            .map_err(|e| SessionError::transport(format!("failed to create Opus encoder: {}", e)))?;
        Ok(Self { encoder })
    }

    /// Encode one 20 ms frame. Short frames are padded with silence because
    /// Opus only accepts exact frame sizes.
    pub fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>> {
        let mut output = vec![0u8; MAX_PACKET_SIZE];
        let len = if samples.len() == SAMPLES_PER_FRAME {
            self.encoder.encode_float(samples, &mut output)
        } else {
            let mut padded = samples.to_vec();
            padded.resize(SAMPLES_PER_FRAME, 0.0);
            self.encoder.encode_float(&padded, &mut output)
        }
        .map_err(|e| SessionError::transport(format!("Opus encoding failed: {}", e)))?;
        output.truncate(len);
        Ok(output)
    }
}

/// Opus decoder for inbound assistant audio
pub struct OpusDecoder {
    decoder: opus::Decoder,
}

// SAFETY: as for the encoder; one decoder per inbound-track task, never
// shared.
unsafe impl Send for OpusDecoder {}

impl OpusDecoder {
    /// Create a mono decoder at [`SAMPLE_RATE`]
    pub fn new() -> Result<Self> {
        let decoder = opus::Decoder::new(SAMPLE_RATE, opus::Channels::Mono)
            .map_err(|e| SessionError::transport(format!("failed to create Opus decoder: {}", e)))?;
        Ok(Self { decoder })
    }

    /// Decode one RTP payload to mono samples at [`SAMPLE_RATE`]
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<f32>> {
        let mut output = vec![0.0f32; MAX_DECODE_SAMPLES];
        let len = self
            .decoder
            .decode_float(payload, &mut output, false)
            .map_err(|e| SessionError::transport(format!("Opus decoding failed: {}", e)))?;
        output.truncate(len);
        Ok(output)
    }
}
