//! # PCM Frame Type
//!
//! Defines the single audio frame shape that crosses every internal component
//! boundary after normalization: 20 ms of mono 16 kHz signed 16-bit PCM.
//!
//! ## Frame Format:
//! - **Sample rate**: 16kHz (16,000 Hz)
//! - **Channels**: Mono (1 channel)
//! - **Sample format**: Signed 16-bit little-endian
//! - **Duration**: 20 ms → 320 samples → 640 bytes

use std::fmt;
use std::time::Duration;

/// Sample rate used throughout the pipeline after normalization.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Duration of one frame in milliseconds.
pub const FRAME_DURATION_MS: u32 = 20;

/// Number of samples in one frame (20 ms at 16 kHz).
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE_HZ as usize / 1000) * FRAME_DURATION_MS as usize;

/// Number of bytes in one frame (16-bit samples).
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// Duration of one frame as a `Duration` (used for synthesis pacing).
pub const FRAME_DURATION: Duration = Duration::from_millis(FRAME_DURATION_MS as u64);

/// A fixed-size, immutable 20 ms frame of mono 16 kHz PCM audio.
///
/// ## Invariant:
/// Always exactly [`FRAME_SAMPLES`] samples. Components downstream of the
/// frame normalizer never see any other PCM shape.
#[derive(Clone, PartialEq, Eq)]
pub struct PcmFrame {
    samples: [i16; FRAME_SAMPLES],
}

impl PcmFrame {
    /// Create a frame from exactly one frame's worth of samples.
    pub fn new(samples: [i16; FRAME_SAMPLES]) -> Self {
        Self { samples }
    }

    /// A frame of digital silence.
    pub fn silence() -> Self {
        Self {
            samples: [0; FRAME_SAMPLES],
        }
    }

    /// Borrow the frame's samples.
    pub fn samples(&self) -> &[i16; FRAME_SAMPLES] {
        &self.samples
    }

    /// Serialize the frame to little-endian bytes for the transport.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_BYTES);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

impl fmt::Debug for PcmFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peak = self.samples.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        f.debug_struct("PcmFrame")
            .field("samples", &FRAME_SAMPLES)
            .field("peak", &peak)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants() {
        assert_eq!(FRAME_SAMPLES, 320);
        assert_eq!(FRAME_BYTES, 640);
    }

    #[test]
    fn test_le_byte_roundtrip() {
        let mut samples = [0i16; FRAME_SAMPLES];
        samples[0] = -32768;
        samples[1] = 32767;
        samples[2] = 1;

        let frame = PcmFrame::new(samples);
        let bytes = frame.to_le_bytes();
        assert_eq!(bytes.len(), FRAME_BYTES);
        assert_eq!(&bytes[0..2], &(-32768i16).to_le_bytes());
        assert_eq!(&bytes[2..4], &32767i16.to_le_bytes());
    }

    #[test]
    fn test_silence_frame() {
        let frame = PcmFrame::silence();
        assert!(frame.samples().iter().all(|&s| s == 0));
    }
}
