//! # Session Controller
//!
//! The finite-state coordinator of one voice session. Routes normalized
//! frames between the recognizer and synthesizer, enforces the state machine,
//! owns the synthesis cancellation token, and emits observability events.
//!
//! ## Frame Routing:
//! - **Listening**: frames feed the recognizer; a final transcript starts a reply
//! - **Speaking**: frames are inspected only for barge-in energy
//! - any other state: frames are dropped
//!
//! ## Barge-In:
//! A voiced frame during playback runs the interruption procedure in strict
//! order: `Speaking → Interrupted`, trip the token, invalidate queued
//! outbound audio, reset the synthesizer, `Interrupted → Listening`, reset
//! the recognizer, record the latency. The whole sequence is synchronous and
//! completes within a few milliseconds; the 300 ms budget is end-to-end.
//!
//! ## Ownership:
//! The controller lives inside its transport actor and is driven from a
//! single thread. The only spawned helper is the synthesis drain task, which
//! talks back exclusively through the outbound sink and the reply sequence
//! check.

use crate::audio::frame::PcmFrame;
use crate::audio::normalizer::FrameNormalizer;
use crate::session::machine::{SessionState, StateMachine};
use crate::session::metrics::{MetricsRecorder, SessionEvent};
use crate::speech::recognizer::{SpeechRecognizer, TranscriptEvent, VadConfig};
use crate::speech::responder::Responder;
use crate::speech::synthesizer::{SynthesisConfig, Synthesizer};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// End-to-end barge-in latency budget.
pub const BARGE_IN_BUDGET_MS: u64 = 300;

/// What the controller hands to the transport adapter.
#[derive(Debug, Clone)]
pub enum SessionOutput {
    /// One synthesized frame of the reply identified by `reply_seq`.
    Audio { reply_seq: u64, frame: PcmFrame },
    /// The reply's stream ended naturally (never sent after cancellation).
    Complete { reply_seq: u64 },
}

/// Outbound boundary the transport adapter implements.
///
/// The adapter must discard `Audio` outputs whose `reply_seq` is no longer
/// current; that check is what drops audio queued before a barge-in.
pub trait OutboundSink: Send + Sync {
    fn deliver(&self, output: SessionOutput);
}

/// Per-session pipeline coordinator.
pub struct SessionController {
    session_id: String,
    machine: StateMachine,
    normalizer: FrameNormalizer,
    recognizer: SpeechRecognizer,
    responder: Responder,
    synthesizer: Synthesizer,
    metrics: Arc<Mutex<MetricsRecorder>>,
    sink: Arc<dyn OutboundSink>,

    /// Cancellation handle of the in-flight reply. Present exactly while the
    /// session is speaking.
    cancel: Option<CancellationToken>,

    /// Monotonic reply identifier. Bumped on every reply start and on every
    /// barge-in, so stale drain output fails the `is_current` check.
    reply_seq: u64,

    audio_enabled: bool,
    created_at: Instant,
}

impl SessionController {
    pub fn new(
        session_id: String,
        vad: VadConfig,
        synthesis: SynthesisConfig,
        sink: Arc<dyn OutboundSink>,
        metrics: Arc<Mutex<MetricsRecorder>>,
    ) -> Self {
        metrics.lock().unwrap().record(SessionEvent::SessionStart);

        Self {
            session_id,
            machine: StateMachine::new(),
            normalizer: FrameNormalizer::new(),
            recognizer: SpeechRecognizer::new(vad),
            responder: Responder::new(),
            synthesizer: Synthesizer::new(synthesis),
            metrics,
            sink,
            cancel: None,
            reply_seq: 0,
            audio_enabled: false,
            created_at: Instant::now(),
        }
    }

    /// Begin the session once media is negotiated: `Idle → Listening`.
    pub fn start(&mut self) {
        if !self.machine.transition(SessionState::Listening) {
            return;
        }
        self.audio_enabled = true;
        self.metrics.lock().unwrap().record(SessionEvent::WebrtcConnected {
            connection_time_ms: self.created_at.elapsed().as_millis() as u64,
        });
        info!(session_id = %self.session_id, "session listening");
    }

    /// Feed one raw transport block through the normalizer and dispatch every
    /// completed frame.
    pub fn on_inbound_audio(&mut self, data: &[u8], source_rate_hz: u32, source_channels: u8) {
        let frames = self.normalizer.push(data, source_rate_hz, source_channels);
        for frame in &frames {
            self.on_inbound_frame(frame);
        }
    }

    /// Dispatch one normalized frame according to the current state.
    pub fn on_inbound_frame(&mut self, frame: &PcmFrame) {
        if !self.audio_enabled {
            return;
        }

        match self.machine.state() {
            SessionState::Speaking => {
                if SpeechRecognizer::rms(frame) > self.recognizer.voice_threshold() {
                    self.barge_in();
                }
            }
            SessionState::Listening => match self.recognizer.process_frame(frame) {
                Some(TranscriptEvent::Partial { text }) => {
                    self.metrics
                        .lock()
                        .unwrap()
                        .record(SessionEvent::SttPartial { text });
                }
                Some(TranscriptEvent::Final { text }) => {
                    self.metrics.lock().unwrap().record(SessionEvent::SttFinal {
                        text: text.clone(),
                        latency_ms: None,
                    });
                    if self.machine.transition(SessionState::Processing) {
                        self.begin_reply(&text);
                    }
                }
                None => {}
            },
            other => {
                debug!(state = other.as_str(), "dropping inbound frame");
            }
        }
    }

    /// Formulate the reply, enter `Speaking`, and spawn the synthesis drain
    /// task for it.
    fn begin_reply(&mut self, transcript: &str) {
        let reply = self.responder.reply(transcript);
        self.metrics
            .lock()
            .unwrap()
            .record(SessionEvent::TtsStart { text: reply.clone() });

        if !self.machine.transition(SessionState::Speaking) {
            return;
        }

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        self.reply_seq += 1;
        let reply_seq = self.reply_seq;

        let mut stream = self.synthesizer.stream(&reply, cancel);
        let sink = Arc::clone(&self.sink);
        let metrics = Arc::clone(&self.metrics);

        tokio::spawn(async move {
            let started = Instant::now();
            let mut first = true;

            while let Some(frame) = stream.next_frame().await {
                if first {
                    first = false;
                    metrics.lock().unwrap().record(SessionEvent::TtsFirstChunk {
                        latency_ms: started.elapsed().as_millis() as u64,
                    });
                }
                sink.deliver(SessionOutput::Audio { reply_seq, frame });
            }

            // A cancelled stream ends silently; completion is only reported
            // for a natural finish.
            if !stream.is_cancelled() {
                sink.deliver(SessionOutput::Complete { reply_seq });
            }
        });
    }

    /// The drain task finished the reply's stream without interruption.
    pub fn on_synthesis_complete(&mut self, reply_seq: u64) {
        if reply_seq != self.reply_seq || self.machine.state() != SessionState::Speaking {
            return;
        }

        self.cancel = None;
        self.metrics.lock().unwrap().record(SessionEvent::TtsComplete);
        self.machine.transition(SessionState::Listening);
        self.synthesizer.reset();
    }

    /// Whether `reply_seq` identifies the reply that is still allowed to
    /// reach the peer.
    pub fn is_current(&self, reply_seq: u64) -> bool {
        reply_seq == self.reply_seq
    }

    /// User speech detected during playback; preempt the bot.
    fn barge_in(&mut self) {
        let t0 = Instant::now();

        self.machine.transition(SessionState::Interrupted);

        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        // Invalidate the cancelled reply so frames already queued at the
        // adapter are discarded instead of flushed.
        self.reply_seq += 1;

        self.synthesizer.reset();
        self.machine.transition(SessionState::Listening);
        self.recognizer.reset();

        let latency_ms = t0.elapsed().as_millis() as u64;
        self.metrics
            .lock()
            .unwrap()
            .record(SessionEvent::BargeIn { latency_ms });

        if latency_ms > BARGE_IN_BUDGET_MS {
            warn!(
                session_id = %self.session_id,
                latency_ms,
                "barge-in exceeded the {BARGE_IN_BUDGET_MS} ms budget"
            );
        } else {
            info!(session_id = %self.session_id, latency_ms, "barge-in handled");
        }
    }

    /// Tear the session down. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.reply_seq += 1;
        self.audio_enabled = false;
        self.normalizer.reset();
        self.recognizer.reset();

        if self.machine.state() != SessionState::Idle {
            self.machine.transition(SessionState::Idle);
            self.metrics.lock().unwrap().record(SessionEvent::SessionClose);
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    /// Clone of the active cancellation handle, if a reply is in flight.
    pub fn active_cancellation(&self) -> Option<CancellationToken> {
        self.cancel.clone()
    }

    pub fn metrics(&self) -> Arc<Mutex<MetricsRecorder>> {
        Arc::clone(&self.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::FRAME_SAMPLES;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Sink that records everything the controller ships outbound.
    struct TestSink {
        tx: mpsc::UnboundedSender<SessionOutput>,
    }

    impl OutboundSink for TestSink {
        fn deliver(&self, output: SessionOutput) {
            let _ = self.tx.send(output);
        }
    }

    fn test_controller() -> (SessionController, mpsc::UnboundedReceiver<SessionOutput>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(Mutex::new(MetricsRecorder::new("test".to_string())));
        let controller = SessionController::new(
            "test".to_string(),
            VadConfig::default(),
            SynthesisConfig::default(),
            Arc::new(TestSink { tx }),
            metrics,
        );
        (controller, rx)
    }

    fn voiced_frame() -> PcmFrame {
        PcmFrame::new([2458; FRAME_SAMPLES])
    }

    fn silent_frame() -> PcmFrame {
        PcmFrame::new([164; FRAME_SAMPLES])
    }

    /// Drive a full utterance (sustained speech then silence) so the
    /// controller starts a reply and lands in `Speaking`.
    fn speak_utterance(controller: &mut SessionController) {
        for _ in 0..30 {
            controller.on_inbound_frame(&voiced_frame());
        }
        for _ in 0..15 {
            controller.on_inbound_frame(&silent_frame());
        }
    }

    #[tokio::test]
    async fn test_start_enters_listening() {
        let (mut controller, _rx) = test_controller();
        assert_eq!(controller.state(), SessionState::Idle);

        controller.start();
        assert_eq!(controller.state(), SessionState::Listening);

        let metrics = controller.metrics();
        let metrics = metrics.lock().unwrap();
        assert_eq!(metrics.count("session_start"), 1);
        assert_eq!(metrics.count("webrtc_connected"), 1);
    }

    #[tokio::test]
    async fn test_frames_dropped_before_start() {
        let (mut controller, _rx) = test_controller();
        for _ in 0..60 {
            controller.on_inbound_frame(&voiced_frame());
        }
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.metrics().lock().unwrap().count("stt_partial"), 0);
    }

    #[tokio::test]
    async fn test_final_transcript_starts_reply() {
        let (mut controller, _rx) = test_controller();
        controller.start();

        speak_utterance(&mut controller);

        assert_eq!(controller.state(), SessionState::Speaking);
        assert!(controller.active_cancellation().is_some());

        let metrics = controller.metrics();
        let metrics = metrics.lock().unwrap();
        assert!(metrics.count("stt_partial") >= 1);
        assert_eq!(metrics.count("stt_final"), 1);
        assert_eq!(metrics.count("tts_start"), 1);
    }

    #[tokio::test]
    async fn test_no_transcript_events_while_speaking() {
        let (mut controller, _rx) = test_controller();
        controller.start();
        speak_utterance(&mut controller);
        assert_eq!(controller.state(), SessionState::Speaking);

        let partials_before = controller.metrics().lock().unwrap().count("stt_partial");

        // Sub-threshold audio while speaking: inspected for energy only,
        // never forwarded to the recognizer.
        for _ in 0..40 {
            controller.on_inbound_frame(&silent_frame());
        }

        assert_eq!(controller.state(), SessionState::Speaking);
        let metrics = controller.metrics();
        let metrics = metrics.lock().unwrap();
        assert_eq!(metrics.count("stt_partial"), partials_before);
        assert_eq!(metrics.count("stt_final"), 1);
    }

    #[tokio::test]
    async fn test_barge_in_cancels_and_returns_to_listening() {
        let (mut controller, _rx) = test_controller();
        controller.start();
        speak_utterance(&mut controller);
        assert_eq!(controller.state(), SessionState::Speaking);

        let token = controller.active_cancellation().expect("reply in flight");
        assert!(!token.is_cancelled());

        controller.on_inbound_frame(&voiced_frame());

        assert!(token.is_cancelled());
        assert_eq!(controller.state(), SessionState::Listening);
        assert!(controller.active_cancellation().is_none());

        let metrics = controller.metrics();
        let metrics = metrics.lock().unwrap();
        assert_eq!(metrics.count("barge_in"), 1);
        let summary = metrics.summary();
        assert!(summary.max_barge_in_latency_ms.unwrap() <= BARGE_IN_BUDGET_MS);
    }

    #[tokio::test]
    async fn test_no_frames_of_cancelled_reply_after_barge_in() {
        let (mut controller, mut rx) = test_controller();
        controller.start();
        speak_utterance(&mut controller);

        // Let the drain task emit a few frames of the reply.
        tokio::time::sleep(Duration::from_millis(100)).await;
        controller.on_inbound_frame(&voiced_frame());

        let mut cancelled_seq = None;
        while let Ok(output) = rx.try_recv() {
            if let SessionOutput::Audio { reply_seq, .. } = output {
                // Everything delivered so far belongs to the cancelled reply
                // and fails the adapter's currency check.
                assert!(!controller.is_current(reply_seq));
                cancelled_seq = Some(reply_seq);
            }
        }
        let cancelled_seq = cancelled_seq.expect("reply produced frames before the barge-in");

        // The producer stops within one frame time: at most a single
        // already-in-flight frame may still trickle in, and the cancelled
        // reply never reports completion.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut tail_frames = 0;
        while let Ok(output) = rx.try_recv() {
            match output {
                SessionOutput::Audio { reply_seq, .. } => {
                    assert_eq!(reply_seq, cancelled_seq);
                    tail_frames += 1;
                }
                SessionOutput::Complete { .. } => panic!("cancelled reply reported completion"),
            }
        }
        assert!(tail_frames <= 1, "producer kept emitting after cancellation");
    }

    #[tokio::test]
    async fn test_reply_completes_back_to_listening() {
        let (mut controller, mut rx) = test_controller();
        controller.start();
        speak_utterance(&mut controller);
        assert_eq!(controller.state(), SessionState::Speaking);

        // Drain the sink until the natural completion notice shows up, then
        // feed it back the way the transport adapter would.
        let completion = loop {
            let output = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("reply should finish well within the timeout")
                .expect("sink channel open");
            match output {
                SessionOutput::Complete { reply_seq } => break reply_seq,
                SessionOutput::Audio { reply_seq, frame } => {
                    assert!(controller.is_current(reply_seq));
                    assert_eq!(frame.to_le_bytes().len(), crate::audio::frame::FRAME_BYTES);
                }
            }
        };

        controller.on_synthesis_complete(completion);
        assert_eq!(controller.state(), SessionState::Listening);
        assert!(controller.active_cancellation().is_none());
        assert_eq!(controller.metrics().lock().unwrap().count("tts_complete"), 1);
    }

    #[tokio::test]
    async fn test_stale_completion_is_ignored() {
        let (mut controller, _rx) = test_controller();
        controller.start();
        speak_utterance(&mut controller);
        controller.on_inbound_frame(&voiced_frame()); // barge-in

        // A completion for the cancelled reply must not disturb the session.
        controller.on_synthesis_complete(1);
        assert_eq!(controller.state(), SessionState::Listening);
        assert_eq!(controller.metrics().lock().unwrap().count("tts_complete"), 0);
    }

    #[tokio::test]
    async fn test_close_records_event_and_idles() {
        let (mut controller, _rx) = test_controller();
        controller.start();
        speak_utterance(&mut controller);

        let token = controller.active_cancellation().expect("reply in flight");
        controller.close();

        assert!(token.is_cancelled());
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.metrics().lock().unwrap().count("session_close"), 1);

        // Closing again is a no-op.
        controller.close();
        assert_eq!(controller.metrics().lock().unwrap().count("session_close"), 1);
    }

    #[tokio::test]
    async fn test_two_sessions_are_isolated() {
        let (mut a, _rx_a) = test_controller();
        let (mut b, _rx_b) = test_controller();
        a.start();
        b.start();

        speak_utterance(&mut a);
        speak_utterance(&mut b);
        assert_eq!(a.state(), SessionState::Speaking);
        assert_eq!(b.state(), SessionState::Speaking);

        let token_b = b.active_cancellation().expect("b speaking");

        // Barge-in on A: B keeps speaking with its own live token.
        a.on_inbound_frame(&voiced_frame());
        assert_eq!(a.state(), SessionState::Listening);
        assert_eq!(b.state(), SessionState::Speaking);
        assert!(!token_b.is_cancelled());
        assert_eq!(a.metrics().lock().unwrap().count("barge_in"), 1);
        assert_eq!(b.metrics().lock().unwrap().count("barge_in"), 0);
    }
}
