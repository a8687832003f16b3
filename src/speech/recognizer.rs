//! # Voice Activity Detection and Streaming Recognition
//!
//! Detects voiced regions in the normalized frame stream and emits the
//! incremental transcript event stream: zero or more partials followed by
//! exactly one final per utterance.
//!
//! ## Detection Algorithm:
//! - Per-frame RMS energy over samples normalized to [-1, 1]
//! - A frame is voiced when RMS exceeds the voice threshold (default 0.02)
//! - An utterance opens after 25 consecutive-run voiced frames (~500 ms)
//! - A partial is emitted at onset and at every further multiple of 10 voiced frames
//! - 15 silent frames (~300 ms) while in an utterance close it with a final
//!
//! ## Transcript Content:
//! The recognizer is a deterministic stub: finals round-robin over a fixed
//! utterance list, and partials reveal a growing word prefix of the eventual
//! final. The VAD gating and event shape are the contract; the text is not.

use crate::audio::frame::PcmFrame;
use tracing::debug;

/// RMS threshold above which a frame counts as voiced.
pub const VOICE_THRESHOLD: f32 = 0.02;

/// Consecutive voiced frames before an utterance opens (~500 ms).
pub const VOICE_START_FRAMES: u32 = 25;

/// Silent frames that close an open utterance (~300 ms).
pub const SILENCE_END_FRAMES: u32 = 15;

/// Voiced frames per additional partial once an utterance is open.
const PARTIAL_INTERVAL_FRAMES: u32 = 10;

/// Fixed utterances the stub recognizer cycles through.
const CANNED_TRANSCRIPTS: [&str; 4] = [
    "what is the weather like in berlin today",
    "set a timer for ten minutes please",
    "tell me something interesting about the ocean",
    "how long does it take to fly to tokyo",
];

/// Incremental recognition output.
///
/// Partial text is a cumulative prefix of the eventual final text; within one
/// utterance it never shrinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    Partial { text: String },
    Final { text: String },
}

/// Tunable VAD thresholds, defaulting to the pipeline constants.
#[derive(Debug, Clone)]
pub struct VadConfig {
    pub voice_threshold: f32,
    pub voice_start_frames: u32,
    pub silence_end_frames: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            voice_threshold: VOICE_THRESHOLD,
            voice_start_frames: VOICE_START_FRAMES,
            silence_end_frames: SILENCE_END_FRAMES,
        }
    }
}

/// Energy-gated streaming recognizer.
///
/// One per session, driven frame-by-frame by the session controller while the
/// session is listening.
pub struct SpeechRecognizer {
    config: VadConfig,

    /// Voiced frames in the current run/utterance.
    voiced_frames: u32,

    /// Silent frames since the last voiced frame of an open utterance.
    silence_frames: u32,

    /// Whether an utterance is currently open.
    is_processing: bool,

    /// Round-robin position in the canned transcript list. Survives `reset()`
    /// so consecutive utterances produce distinct text.
    script_index: usize,

    /// Words revealed by partials so far in this utterance.
    revealed_words: usize,
}

impl SpeechRecognizer {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            voiced_frames: 0,
            silence_frames: 0,
            is_processing: false,
            script_index: 0,
            revealed_words: 0,
        }
    }

    /// RMS energy of a frame over samples normalized to [-1, 1].
    ///
    /// Public because the session controller reuses it for barge-in
    /// detection while the bot is speaking.
    pub fn rms(frame: &PcmFrame) -> f32 {
        let sum_squares: f32 = frame
            .samples()
            .iter()
            .map(|&s| {
                let normalized = s as f32 / 32768.0;
                normalized * normalized
            })
            .sum();
        (sum_squares / frame.samples().len() as f32).sqrt()
    }

    /// The voiced/silent decision threshold in use.
    pub fn voice_threshold(&self) -> f32 {
        self.config.voice_threshold
    }

    /// Feed one frame; returns a transcript event when one is due.
    pub fn process_frame(&mut self, frame: &PcmFrame) -> Option<TranscriptEvent> {
        let rms = Self::rms(frame);

        if rms > self.config.voice_threshold {
            self.voiced_frames += 1;
            self.silence_frames = 0;

            if !self.is_processing {
                if self.voiced_frames >= self.config.voice_start_frames {
                    self.is_processing = true;
                    debug!(voiced_frames = self.voiced_frames, "utterance opened");
                    return Some(self.next_partial());
                }
            } else if self.voiced_frames % PARTIAL_INTERVAL_FRAMES == 0 {
                return Some(self.next_partial());
            }
        } else if self.is_processing {
            self.silence_frames += 1;
            if self.silence_frames >= self.config.silence_end_frames {
                let text = CANNED_TRANSCRIPTS[self.script_index % CANNED_TRANSCRIPTS.len()];
                self.script_index += 1;
                self.reset();
                debug!(text, "utterance closed");
                return Some(TranscriptEvent::Final {
                    text: text.to_string(),
                });
            }
        } else {
            // Silence before onset: a voiced run must be sustained.
            self.voiced_frames = 0;
        }

        None
    }

    /// Zero the counters and close any open utterance without emitting.
    pub fn reset(&mut self) {
        self.voiced_frames = 0;
        self.silence_frames = 0;
        self.is_processing = false;
        self.revealed_words = 0;
    }

    /// Whether an utterance is currently open.
    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    /// Current voiced/silence run lengths (exposed for invariant checks).
    pub fn counters(&self) -> (u32, u32) {
        (self.voiced_frames, self.silence_frames)
    }

    /// Build the next partial: a non-shrinking word prefix of the final text.
    fn next_partial(&mut self) -> TranscriptEvent {
        let script = CANNED_TRANSCRIPTS[self.script_index % CANNED_TRANSCRIPTS.len()];
        let words: Vec<&str> = script.split_whitespace().collect();

        let target = (self.voiced_frames / PARTIAL_INTERVAL_FRAMES) as usize;
        self.revealed_words = self.revealed_words.max(target.max(1)).min(words.len());

        TranscriptEvent::Partial {
            text: words[..self.revealed_words].join(" "),
        }
    }
}
