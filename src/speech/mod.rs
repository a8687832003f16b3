//! # Speech Pipeline Module
//!
//! The per-session recognition and synthesis stages. Both ends are stubs with
//! production-shaped streaming interfaces: the recognizer emits a VAD-gated
//! partial/final transcript stream, and the synthesizer yields a lazy,
//! cancellable sequence of paced PCM frames.
//!
//! ## Key Components:
//! - **Recognizer**: RMS-energy VAD + incremental transcript events
//! - **Responder**: Final transcript → reply text
//! - **Synthesizer**: Reply text → cancellable 20 ms frame stream

pub mod recognizer; // Voice activity detection and transcript events
pub mod responder;  // Reply text policy
pub mod synthesizer; // Lazy cancellable synthesis streams

pub use recognizer::{SpeechRecognizer, TranscriptEvent, VadConfig};
pub use responder::Responder;
pub use synthesizer::{SynthesisConfig, SynthesisStream, Synthesizer};
