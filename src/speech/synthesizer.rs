//! # Speech Synthesis
//!
//! Produces a lazy, cancellable stream of 20 ms PCM frames for a reply
//! string. The synthesizer is a stub (a per-text sine tone stands in for a
//! real voice); the streaming interface and cancellation semantics are the
//! contract.
//!
//! ## Stream Contract:
//! - Total length is `max(min_reply_secs, words / words_per_sec)` seconds,
//!   expressed as `ceil(duration_ms / 20)` frames
//! - Each `next_frame()` waits ~20 ms of wall clock so outbound audio matches
//!   playback rate
//! - The cancellation token is consulted at every frame boundary and inside
//!   the pacing sleep itself, so cancellation lands within one frame time
//! - Cancellation terminates the stream without error

use crate::audio::frame::{PcmFrame, FRAME_DURATION, FRAME_DURATION_MS, FRAME_SAMPLES, SAMPLE_RATE_HZ};
use std::f32::consts::PI;
use tokio_util::sync::CancellationToken;

/// Peak amplitude of the synthesized tone (comfortably voiced, with headroom).
const SYNTH_AMPLITUDE: f32 = 12_000.0;

/// Reply pacing parameters, defaulting to two seconds minimum and three
/// spoken words per second.
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    pub min_reply_secs: u32,
    pub words_per_sec: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            min_reply_secs: 2,
            words_per_sec: 3,
        }
    }
}

/// Builds cancellable synthesis streams for reply text.
///
/// Owned by exactly one session; the controller resets the carried phase
/// after a completed or interrupted reply.
pub struct Synthesizer {
    config: SynthesisConfig,

    /// Starting oscillator phase handed to the next stream.
    phase: f32,
}

impl Synthesizer {
    pub fn new(config: SynthesisConfig) -> Self {
        Self { config, phase: 0.0 }
    }

    /// Begin a lazy frame stream for `text`, governed by `cancel`.
    pub fn stream(&mut self, text: &str, cancel: CancellationToken) -> SynthesisStream {
        let words = text.split_whitespace().count().max(1);
        let secs = (words as f64 / self.config.words_per_sec as f64)
            .max(self.config.min_reply_secs as f64);
        let duration_ms = secs * 1000.0;
        let total_frames = (duration_ms / FRAME_DURATION_MS as f64).ceil() as u32;

        SynthesisStream {
            total_frames,
            produced: 0,
            freq_hz: tone_for_text(text),
            phase: self.phase,
            cancel,
        }
    }

    /// Re-initialize the carried oscillator phase. Idempotent.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(SynthesisConfig::default())
    }
}

/// Derive a stable tone frequency from the reply text.
fn tone_for_text(text: &str) -> f32 {
    let sum: u64 = text.bytes().map(u64::from).sum();
    180.0 + (sum % 240) as f32
}

/// A lazy, finite, cancellable sequence of synthesized PCM frames.
pub struct SynthesisStream {
    total_frames: u32,
    produced: u32,
    freq_hz: f32,
    phase: f32,
    cancel: CancellationToken,
}

impl SynthesisStream {
    /// Produce the next frame after a real-time pacing wait, or `None` when
    /// the stream is exhausted or cancelled.
    pub async fn next_frame(&mut self) -> Option<PcmFrame> {
        if self.produced >= self.total_frames || self.cancel.is_cancelled() {
            return None;
        }

        // The pacing sleep itself races the token, so a trip mid-sleep ends
        // the stream without waiting out the frame.
        tokio::select! {
            _ = self.cancel.cancelled() => return None,
            _ = tokio::time::sleep(FRAME_DURATION) => {}
        }

        let step = 2.0 * PI * self.freq_hz / SAMPLE_RATE_HZ as f32;
        let mut samples = [0i16; FRAME_SAMPLES];
        for sample in samples.iter_mut() {
            *sample = (self.phase.sin() * SYNTH_AMPLITUDE) as i16;
            self.phase = (self.phase + step) % (2.0 * PI);
        }

        self.produced += 1;
        Some(PcmFrame::new(samples))
    }

    /// Frames this stream will yield absent cancellation.
    pub fn frames_total(&self) -> u32 {
        self.total_frames
    }

    /// Frames yielded so far.
    pub fn frames_produced(&self) -> u32 {
        self.produced
    }

    /// Whether the governing token has been tripped.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
