//! # Reply Generation
//!
//! Turns a final transcript into the reply text handed to the synthesizer.
//! The policy here is deliberately trivial; the calling contract (one reply
//! string per final transcript) is what the session controller depends on.

/// Formulates the bot's textual reply to a completed utterance.
pub struct Responder;

impl Responder {
    pub fn new() -> Self {
        Self
    }

    /// Produce a reply for the given final transcript.
    pub fn reply(&self, transcript: &str) -> String {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            "Sorry, I did not catch that.".to_string()
        } else {
            format!("You said: {}", transcript)
        }
    }
}

impl Default for Responder {
    fn default() -> Self {
        Self::new()
    }
}
