//! # Frame Normalizer
//!
//! Converts arbitrary-rate, arbitrary-channel PCM blocks delivered by the
//! transport into an ordered sequence of fixed-size 20 ms mono 16 kHz frames.
//!
//! ## Processing Steps:
//! 1. **Decode**: Raw bytes → 16-bit little-endian samples (trailing odd byte truncated)
//! 2. **Down-mix**: Multi-channel audio averaged to mono
//! 3. **Resample**: Linear interpolation to 16 kHz
//! 4. **Frame**: Accumulate into a residual, emit every full 320-sample frame
//!
//! ## Residual Invariant:
//! Between calls the residual always holds strictly less than one frame of
//! samples. `reset()` discards it entirely.

use crate::audio::frame::{PcmFrame, FRAME_SAMPLES, SAMPLE_RATE_HZ};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use tracing::warn;

/// Turns inbound PCM blocks of any shape into normalized 20 ms frames.
///
/// One normalizer per session; never shared across sessions.
pub struct FrameNormalizer {
    /// Samples waiting for enough data to fill the next frame (< one frame).
    residual: Vec<i16>,

    /// Count of blocks that arrived with an odd byte length. Upstream
    /// transports occasionally deliver padded blocks; the trailing byte is
    /// truncated rather than rejected.
    truncated_odd_bytes: u64,

    /// Total blocks accepted.
    blocks_pushed: u64,

    /// Total full frames emitted.
    frames_emitted: u64,
}

impl FrameNormalizer {
    pub fn new() -> Self {
        Self {
            residual: Vec::with_capacity(FRAME_SAMPLES),
            truncated_odd_bytes: 0,
            blocks_pushed: 0,
            frames_emitted: 0,
        }
    }

    /// Push one inbound PCM block and collect every full frame it completes.
    ///
    /// ## Parameters:
    /// - **data**: Raw PCM bytes (16-bit little-endian, interleaved channels)
    /// - **source_rate_hz**: Sample rate the block was captured at
    /// - **source_channels**: Number of interleaved channels (1 = mono)
    ///
    /// ## Returns:
    /// Zero or more complete frames. Output length per call is always a
    /// multiple of one frame; the sub-frame remainder stays in the residual.
    pub fn push(&mut self, data: &[u8], source_rate_hz: u32, source_channels: u8) -> Vec<PcmFrame> {
        if data.is_empty() || source_rate_hz == 0 {
            return Vec::new();
        }

        let mut data = data;
        if data.len() % 2 != 0 {
            // Padded block from the transport: drop the trailing odd byte.
            self.truncated_odd_bytes += 1;
            warn!(
                block_len = data.len(),
                total_truncations = self.truncated_odd_bytes,
                "PCM block has odd byte length, truncating trailing byte"
            );
            data = &data[..data.len() - 1];
        }
        self.blocks_pushed += 1;

        let mut samples = Vec::with_capacity(data.len() / 2);
        let mut cursor = Cursor::new(data);
        while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
            samples.push(sample);
        }

        let mono = convert_to_mono(&samples, source_channels);
        let resampled = resample_linear(&mono, source_rate_hz, SAMPLE_RATE_HZ);
        self.residual.extend_from_slice(&resampled);

        let full = (self.residual.len() / FRAME_SAMPLES) * FRAME_SAMPLES;
        let mut frames = Vec::with_capacity(full / FRAME_SAMPLES);
        for chunk in self.residual[..full].chunks_exact(FRAME_SAMPLES) {
            let mut arr = [0i16; FRAME_SAMPLES];
            arr.copy_from_slice(chunk);
            frames.push(PcmFrame::new(arr));
        }
        self.residual.drain(..full);

        self.frames_emitted += frames.len() as u64;
        frames
    }

    /// Discard the residual. Called on state transitions that drop inbound audio.
    pub fn reset(&mut self) {
        self.residual.clear();
    }

    /// Number of samples currently buffered (always < one frame between calls).
    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }

    /// How many blocks arrived with an odd byte length.
    pub fn truncated_odd_bytes(&self) -> u64 {
        self.truncated_odd_bytes
    }

    /// Total blocks accepted since creation.
    pub fn blocks_pushed(&self) -> u64 {
        self.blocks_pushed
    }

    /// Total full frames emitted since creation.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }
}

impl Default for FrameNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Down-mix interleaved multi-channel samples to mono by arithmetic mean.
///
/// Mono input passes through unchanged. An incomplete trailing sample group
/// (block cut mid-interleave) is dropped.
fn convert_to_mono(samples: &[i16], channels: u8) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|group| {
            let sum: i32 = group.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Resample by linear interpolation between adjacent source samples.
///
/// Maps output index `i` to source position `i * in_rate / out_rate` and
/// blends the floor and floor+1 neighbors by the fractional weight. The last
/// valid index is reused at end-of-input so we never read past the source.
fn resample_linear(input: &[i16], in_rate: u32, out_rate: u32) -> Vec<i16> {
    if in_rate == out_rate || input.is_empty() {
        return input.to_vec();
    }

    let out_len = (input.len() as u64 * out_rate as u64 / in_rate as u64) as usize;
    let mut output = Vec::with_capacity(out_len);
    let ratio = in_rate as f64 / out_rate as f64;

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let i0 = src_pos.floor() as usize;
        let i1 = (i0 + 1).min(input.len() - 1);
        let frac = src_pos - i0 as f64;

        let s0 = input[i0] as f64;
        let s1 = input[i1] as f64;
        output.push((s0 + (s1 - s0) * frac).round() as i16);
    }

    output
}
