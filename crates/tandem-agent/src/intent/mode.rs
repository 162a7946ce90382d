//! Reply-mode selection for conversational turns.

use tracing::debug;

use crate::transport::{Mode, TransportClient};

/// Asks the service whether a reply should be framed as general chat or
/// code.  Falls back to the configured default on any failure.
#[derive(Debug, Clone)]
pub struct ModeSelector {
    transport: TransportClient,
    default_mode: Mode,
}

impl ModeSelector {
    pub fn new(transport: TransportClient, default_mode: Mode) -> Self {
        Self {
            transport,
            default_mode,
        }
    }

    pub async fn select(&self, utterance: &str) -> Mode {
        let prompt = format!(
            "Classify the next message. Answer with exactly one word: GENERAL if it is \
             ordinary conversation or a question, CODE if the answer should mainly be \
             source code or programming help.\n\nMessage: {utterance}"
        );

        match self.transport.send_turn_precise(&prompt).await {
            Ok(reply) => match parse_mode_answer(&reply.text) {
                Some(mode) => {
                    debug!(mode = %mode, "mode selected");
                    mode
                }
                None => {
                    debug!(answer = %reply.text.trim(), default = %self.default_mode, "unrecognised mode answer");
                    self.default_mode
                }
            },
            Err(e) => {
                debug!(error = %e, default = %self.default_mode, "mode selection failed");
                self.default_mode
            }
        }
    }
}

/// Interpret a one-word classification answer.
pub fn parse_mode_answer(answer: &str) -> Option<Mode> {
    let word = answer
        .trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase();
    match word.as_str() {
        "general" => Some(Mode::General),
        "code" => Some(Mode::Code),
        _ => None,
    }
}
