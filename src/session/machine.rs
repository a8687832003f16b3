//! # Session State Machine
//!
//! The five-state machine that gates everything a session is allowed to do.
//! Invalid transitions are rejected with a logged warning and a `false`
//! return; the machine never panics and its state is unchanged on rejection.
//!
//! ## Transition Table:
//! | From        | To                              |
//! |-------------|---------------------------------|
//! | Idle        | Listening                       |
//! | Listening   | Processing, Idle                |
//! | Processing  | Speaking, Listening, Idle       |
//! | Speaking    | Interrupted, Listening, Idle    |
//! | Interrupted | Listening, Idle                 |

use serde::Serialize;
use tracing::{debug, warn};

/// The lifecycle states of one voice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created but media not flowing.
    Idle,
    /// Accepting user audio, feeding the recognizer.
    Listening,
    /// Final transcript received, formulating a reply.
    Processing,
    /// Streaming synthesized audio to the peer.
    Speaking,
    /// Barge-in detected, reply being torn down.
    Interrupted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Processing => "processing",
            SessionState::Speaking => "speaking",
            SessionState::Interrupted => "interrupted",
        }
    }
}

/// Owns the current state and enforces the transition table.
pub struct StateMachine {
    state: SessionState,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Attempt a transition. Returns `true` and moves on success; logs and
    /// leaves the state untouched on an invalid request.
    pub fn transition(&mut self, to: SessionState) -> bool {
        if Self::is_valid(self.state, to) {
            debug!(from = self.state.as_str(), to = to.as_str(), "state transition");
            self.state = to;
            true
        } else {
            warn!(
                from = self.state.as_str(),
                to = to.as_str(),
                "rejected invalid state transition"
            );
            false
        }
    }

    fn is_valid(from: SessionState, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (from, to),
            (Idle, Listening)
                | (Listening, Processing)
                | (Listening, Idle)
                | (Processing, Speaking)
                | (Processing, Listening)
                | (Processing, Idle)
                | (Speaking, Interrupted)
                | (Speaking, Listening)
                | (Speaking, Idle)
                | (Interrupted, Listening)
                | (Interrupted, Idle)
        )
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        assert_eq!(StateMachine::new().state(), SessionState::Idle);
    }

    #[test]
    fn test_full_conversation_cycle() {
        let mut machine = StateMachine::new();
        assert!(machine.transition(SessionState::Listening));
        assert!(machine.transition(SessionState::Processing));
        assert!(machine.transition(SessionState::Speaking));
        assert!(machine.transition(SessionState::Listening));
        assert_eq!(machine.state(), SessionState::Listening);
    }

    #[test]
    fn test_barge_in_path() {
        let mut machine = StateMachine::new();
        machine.transition(SessionState::Listening);
        machine.transition(SessionState::Processing);
        machine.transition(SessionState::Speaking);

        assert!(machine.transition(SessionState::Interrupted));
        assert!(machine.transition(SessionState::Listening));
    }

    #[test]
    fn test_invalid_transition_is_rejected_in_place() {
        let mut machine = StateMachine::new();
        assert!(!machine.transition(SessionState::Speaking));
        assert_eq!(machine.state(), SessionState::Idle);

        assert!(!machine.transition(SessionState::Interrupted));
        assert_eq!(machine.state(), SessionState::Idle);
    }

    #[test]
    fn test_every_state_can_reach_idle() {
        for path in [
            vec![SessionState::Listening],
            vec![SessionState::Listening, SessionState::Processing],
            vec![
                SessionState::Listening,
                SessionState::Processing,
                SessionState::Speaking,
            ],
            vec![
                SessionState::Listening,
                SessionState::Processing,
                SessionState::Speaking,
                SessionState::Interrupted,
            ],
        ] {
            let mut machine = StateMachine::new();
            for state in path {
                assert!(machine.transition(state));
            }
            assert!(machine.transition(SessionState::Idle));
        }
    }

    #[test]
    fn test_listening_cannot_jump_to_speaking() {
        let mut machine = StateMachine::new();
        machine.transition(SessionState::Listening);
        assert!(!machine.transition(SessionState::Speaking));
        assert_eq!(machine.state(), SessionState::Listening);
    }
}
