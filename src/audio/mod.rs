//! # Audio Processing Module
//!
//! Owns the PCM shapes and the inbound normalization pipeline. Everything
//! downstream of this module speaks exactly one format.
//!
//! ## Key Components:
//! - **Frame**: The fixed 20 ms / 16 kHz / mono / S16LE frame type
//! - **Frame Normalizer**: Arbitrary transport blocks → ordered frames
//!
//! ## Audio Format Invariant:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Bit Depth**: 16-bit PCM, little-endian
//! - **Channels**: Mono (1 channel)
//! - **Frame Duration**: 20 ms → 320 samples → 640 bytes

pub mod frame;      // Fixed-size PCM frame type and format constants
pub mod normalizer; // Resample / down-mix / framing of inbound blocks

pub use frame::{PcmFrame, FRAME_BYTES, FRAME_DURATION, FRAME_DURATION_MS, FRAME_SAMPLES, SAMPLE_RATE_HZ};
pub use normalizer::FrameNormalizer;
