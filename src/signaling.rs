//! # WebSocket Transport Adapter and Signaling
//!
//! The boundary between the media transport and the per-session core.
//! Clients connect to `/ws/voice`, negotiate a session with a JSON `offer`,
//! then stream raw PCM both ways as binary frames.
//!
//! ## Signaling Protocol:
//! 1. **offer**: Client announces its source audio format; the server creates
//!    and starts a session and replies with `answer` (the outbound format)
//! 2. **Binary (client → server)**: PCM blocks at the offered rate/channels
//! 3. **Binary (server → client)**: Synthesized 16 kHz mono PCM in 10 ms slices
//! 4. **close**: Explicit teardown; a dropped or failed socket tears down too
//!
//! ## Outbound Discipline:
//! Synthesized frames arrive from the session's drain task tagged with their
//! reply sequence. Frames from a reply that a barge-in has since invalidated
//! fail the controller's currency check and are discarded here instead of
//! being flushed to the peer.

use crate::audio::frame::SAMPLE_RATE_HZ;
use crate::session::controller::{OutboundSink, SessionController, SessionOutput};
use crate::session::metrics::MetricsRecorder;
use crate::state::AppState;
use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outbound slice size: 10 ms of 16 kHz mono S16LE (160 samples).
const OUTBOUND_CHUNK_BYTES: usize = 320;

/// Heartbeat ping interval.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Close the connection after this long without any sign of life.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Inbound audio format negotiated in the offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u8,
}

/// Signaling messages exchanged as WebSocket text frames.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    /// Client requests a session, announcing its capture format.
    Offer {
        session_id: Option<String>,
        audio: AudioFormat,
    },

    /// Server accepts: the session is live and outbound audio uses `audio`.
    Answer {
        session_id: String,
        audio: AudioFormat,
    },

    /// Client ends the session.
    Close { session_id: String },

    /// Server-side session lifecycle updates.
    SessionStatus {
        session_id: String,
        status: String,
        message: Option<String>,
    },

    /// Error messages.
    Error {
        code: String,
        message: String,
        session_id: Option<String>,
    },

    /// Heartbeat.
    Ping { timestamp: u64 },
    Pong { timestamp: u64 },
}

/// Output handed from the session's drain task back to this actor.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Deliver(pub SessionOutput);

/// Sink handed to the session controller; forwards drain output into the
/// actor mailbox so it is applied on the session's single thread.
struct ActorSink {
    addr: Addr<VoiceWebSocket>,
}

impl OutboundSink for ActorSink {
    fn deliver(&self, output: SessionOutput) {
        self.addr.do_send(Deliver(output));
    }
}

/// One WebSocket connection == one voice session.
pub struct VoiceWebSocket {
    app_state: web::Data<AppState>,
    session_id: Option<String>,
    controller: Option<SessionController>,
    audio_format: Option<AudioFormat>,
    last_heartbeat: Instant,
}

impl VoiceWebSocket {
    pub fn new(app_state: web::Data<AppState>) -> Self {
        Self {
            app_state,
            session_id: None,
            controller: None,
            audio_format: None,
            last_heartbeat: Instant::now(),
        }
    }

    fn send_signal(&self, ctx: &mut ws::WebsocketContext<Self>, message: &SignalMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(err) => error!(error = %err, "failed to serialize signaling message"),
        }
    }

    fn send_error(
        &self,
        ctx: &mut ws::WebsocketContext<Self>,
        code: &str,
        message: &str,
        session_id: Option<String>,
    ) {
        warn!(code, message, "signaling error");
        self.send_signal(
            ctx,
            &SignalMessage::Error {
                code: code.to_string(),
                message: message.to_string(),
                session_id,
            },
        );
    }

    /// `offer` received: create, register, and start the session.
    fn handle_offer(
        &mut self,
        session_id: Option<String>,
        audio: AudioFormat,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        if self.controller.is_some() {
            self.send_error(
                ctx,
                "session_exists",
                "This connection already carries a session",
                self.session_id.clone(),
            );
            return;
        }

        if audio.sample_rate == 0 || audio.channels == 0 {
            self.send_error(ctx, "invalid_audio_format", "Sample rate and channels must be non-zero", None);
            return;
        }

        let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let config = self.app_state.get_config();
        let metrics = Arc::new(Mutex::new(MetricsRecorder::new(session_id.clone())));

        if let Err(err) = self.app_state.registry.insert(&session_id, Arc::clone(&metrics)) {
            self.send_error(ctx, "session_rejected", &err, Some(session_id));
            return;
        }

        let sink = Arc::new(ActorSink {
            addr: ctx.address(),
        });
        let mut controller = SessionController::new(
            session_id.clone(),
            config.vad_config(),
            config.synthesis_config(),
            sink,
            metrics,
        );
        controller.start();

        self.app_state.increment_active_sessions();
        info!(
            session_id = %session_id,
            sample_rate = audio.sample_rate,
            channels = audio.channels,
            "voice session created"
        );

        self.send_signal(
            ctx,
            &SignalMessage::Answer {
                session_id: session_id.clone(),
                audio: AudioFormat {
                    sample_rate: SAMPLE_RATE_HZ,
                    channels: 1,
                },
            },
        );
        self.send_signal(
            ctx,
            &SignalMessage::SessionStatus {
                session_id: session_id.clone(),
                status: "listening".to_string(),
                message: None,
            },
        );

        self.session_id = Some(session_id);
        self.audio_format = Some(audio);
        self.controller = Some(controller);
    }

    /// Inbound PCM block from the peer.
    fn handle_audio_block(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        let format = match self.audio_format.clone() {
            Some(format) => format,
            None => {
                self.send_error(ctx, "no_session", "Send an offer before streaming audio", None);
                return;
            }
        };

        if let Some(controller) = self.controller.as_mut() {
            controller.on_inbound_audio(data, format.sample_rate, format.channels);
        }
    }

    /// Tear the session down exactly once, whatever path got us here:
    /// explicit close, peer disconnect, or a transport error.
    fn teardown(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.close();
        }
        if let Some(session_id) = self.session_id.take() {
            self.app_state.registry.remove(&session_id);
            self.app_state.decrement_active_sessions();
            info!(session_id = %session_id, "voice session closed");
        }
        self.audio_format = None;
    }
}

impl Actor for VoiceWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!("voice websocket connected");

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("voice websocket heartbeat timeout, closing connection");
                ctx.stop();
                return;
            }

            let ping = SignalMessage::Ping {
                timestamp: chrono::Utc::now().timestamp_millis() as u64,
            };
            if let Ok(json) = serde_json::to_string(&ping) {
                ctx.text(json);
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Covers peer close and transport failure alike.
        self.teardown();
        debug!("voice websocket disconnected");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VoiceWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<SignalMessage>(&text) {
                Ok(SignalMessage::Offer { session_id, audio }) => {
                    self.handle_offer(session_id, audio, ctx);
                }
                Ok(SignalMessage::Close { session_id }) => {
                    if self.session_id.as_deref() == Some(session_id.as_str()) {
                        self.teardown();
                        self.send_signal(
                            ctx,
                            &SignalMessage::SessionStatus {
                                session_id,
                                status: "closed".to_string(),
                                message: None,
                            },
                        );
                        ctx.stop();
                    } else {
                        self.send_error(ctx, "unknown_session", "No such session on this connection", Some(session_id));
                    }
                }
                Ok(SignalMessage::Pong { .. }) => {
                    self.last_heartbeat = Instant::now();
                }
                Ok(_) => {
                    warn!("unexpected signaling message from client");
                }
                Err(err) => {
                    self.send_error(ctx, "invalid_json", &format!("Invalid JSON: {}", err), None);
                }
            },
            Ok(ws::Message::Binary(data)) => {
                self.handle_audio_block(&data, ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(?reason, "voice websocket closed by client");
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(error = %err, "voice websocket protocol error");
                ctx.stop();
            }
        }
    }
}

impl Handler<Deliver> for VoiceWebSocket {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        let Some(controller) = self.controller.as_mut() else {
            return;
        };

        match msg.0 {
            SessionOutput::Audio { reply_seq, frame } => {
                // Frames of a reply cancelled by barge-in are dropped here,
                // never flushed.
                if !controller.is_current(reply_seq) {
                    return;
                }
                let bytes = frame.to_le_bytes();
                for chunk in bytes.chunks(OUTBOUND_CHUNK_BYTES) {
                    ctx.binary(chunk.to_vec());
                }
            }
            SessionOutput::Complete { reply_seq } => {
                controller.on_synthesis_complete(reply_seq);
            }
        }
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a fresh actor.
pub async fn voice_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    info!(peer = ?req.connection_info().peer_addr(), "new voice websocket request");
    ws::start(VoiceWebSocket::new(app_state), &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offer_roundtrip() {
        let offer = SignalMessage::Offer {
            session_id: Some("abc".to_string()),
            audio: AudioFormat {
                sample_rate: 48000,
                channels: 2,
            },
        };

        let json = serde_json::to_string(&offer).unwrap();
        assert!(json.contains("\"type\":\"offer\""));

        match serde_json::from_str::<SignalMessage>(&json).unwrap() {
            SignalMessage::Offer { session_id, audio } => {
                assert_eq!(session_id.as_deref(), Some("abc"));
                assert_eq!(audio.sample_rate, 48000);
                assert_eq!(audio.channels, 2);
            }
            other => panic!("wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_answer_carries_pipeline_format() {
        let answer = SignalMessage::Answer {
            session_id: "abc".to_string(),
            audio: AudioFormat {
                sample_rate: SAMPLE_RATE_HZ,
                channels: 1,
            },
        };
        let json = serde_json::to_string(&answer).unwrap();
        assert!(json.contains("16000"));
    }

    #[test]
    fn test_unknown_message_type_fails_parse() {
        let result = serde_json::from_str::<SignalMessage>(r#"{"type":"renegotiate"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_outbound_chunk_is_ten_milliseconds() {
        // 10 ms at 16 kHz mono 16-bit.
        assert_eq!(OUTBOUND_CHUNK_BYTES, (SAMPLE_RATE_HZ as usize / 100) * 2);
    }
}
