//! # Per-Session Metrics Recorder
//!
//! Time-stamps the protocol events of one session and aggregates them into
//! the summary served by the observability endpoint. Each session owns its
//! recorder; it is shared only with that session's synthesis drain task,
//! never across sessions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tracing::info;

/// A named protocol event with integer millisecond fields.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStart,
    WebrtcConnected { connection_time_ms: u64 },
    SttPartial { text: String },
    SttFinal { text: String, latency_ms: Option<u64> },
    TtsStart { text: String },
    TtsFirstChunk { latency_ms: u64 },
    TtsComplete,
    BargeIn { latency_ms: u64 },
    SessionClose,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionStart => "session_start",
            SessionEvent::WebrtcConnected { .. } => "webrtc_connected",
            SessionEvent::SttPartial { .. } => "stt_partial",
            SessionEvent::SttFinal { .. } => "stt_final",
            SessionEvent::TtsStart { .. } => "tts_start",
            SessionEvent::TtsFirstChunk { .. } => "tts_first_chunk",
            SessionEvent::TtsComplete => "tts_complete",
            SessionEvent::BargeIn { .. } => "barge_in",
            SessionEvent::SessionClose => "session_close",
        }
    }
}

/// One recorded event with its wall-clock stamp and session-relative offset.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedEvent {
    pub timestamp: DateTime<Utc>,
    pub offset_ms: u64,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Aggregated per-session counters for the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetricsSummary {
    pub session_id: String,
    pub connect_time_ms: Option<u64>,
    pub stt_final_count: u64,
    pub average_stt_latency_ms: f64,
    pub barge_in_latencies_ms: Vec<u64>,
    pub max_barge_in_latency_ms: Option<u64>,
    pub total_events: usize,
}

/// Appends timestamped events for a single session.
pub struct MetricsRecorder {
    session_id: String,
    started: Instant,
    events: Vec<RecordedEvent>,

    /// Stamp of the first partial of the open utterance; consumed by the
    /// matching final to compute STT latency.
    utterance_started: Option<Instant>,
}

impl MetricsRecorder {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            started: Instant::now(),
            events: Vec::new(),
            utterance_started: None,
        }
    }

    /// Record one event. STT final latency is measured here, from the first
    /// partial of the utterance, so the recognizer stays timestamp-free.
    pub fn record(&mut self, event: SessionEvent) {
        let event = match event {
            SessionEvent::SttPartial { text } => {
                if self.utterance_started.is_none() {
                    self.utterance_started = Some(Instant::now());
                }
                SessionEvent::SttPartial { text }
            }
            SessionEvent::SttFinal { text, latency_ms } => {
                let latency_ms = latency_ms.or_else(|| {
                    self.utterance_started
                        .take()
                        .map(|t| t.elapsed().as_millis() as u64)
                });
                SessionEvent::SttFinal { text, latency_ms }
            }
            other => other,
        };

        info!(session_id = %self.session_id, event = event.name(), "session event");
        self.events.push(RecordedEvent {
            timestamp: Utc::now(),
            offset_ms: self.started.elapsed().as_millis() as u64,
            event,
        });
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// Count of recorded events with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.events.iter().filter(|e| e.event.name() == name).count()
    }

    /// Aggregate the event log into the endpoint summary.
    pub fn summary(&self) -> SessionMetricsSummary {
        let mut connect_time_ms = None;
        let mut stt_latencies: Vec<u64> = Vec::new();
        let mut stt_final_count = 0u64;
        let mut barge_in_latencies_ms: Vec<u64> = Vec::new();

        for recorded in &self.events {
            match &recorded.event {
                SessionEvent::WebrtcConnected { connection_time_ms } => {
                    connect_time_ms = Some(*connection_time_ms);
                }
                SessionEvent::SttFinal { latency_ms, .. } => {
                    stt_final_count += 1;
                    if let Some(ms) = latency_ms {
                        stt_latencies.push(*ms);
                    }
                }
                SessionEvent::BargeIn { latency_ms } => {
                    barge_in_latencies_ms.push(*latency_ms);
                }
                _ => {}
            }
        }

        let average_stt_latency_ms = if stt_latencies.is_empty() {
            0.0
        } else {
            stt_latencies.iter().sum::<u64>() as f64 / stt_latencies.len() as f64
        };

        SessionMetricsSummary {
            session_id: self.session_id.clone(),
            connect_time_ms,
            stt_final_count,
            average_stt_latency_ms,
            max_barge_in_latency_ms: barge_in_latencies_ms.iter().copied().max(),
            barge_in_latencies_ms,
            total_events: self.events.len(),
        }
    }
}
