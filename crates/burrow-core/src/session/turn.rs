//! Per-turn accumulation of transcript text, session token, and error.

use crate::events::StreamEvent;
use crate::normalize::TokenCandidate;

#[derive(Debug, Default)]
pub struct TurnAccumulator {
    text: String,
    token: Option<String>,
    error: Option<String>,
}

impl TurnAccumulator {
    pub fn observe_event(&mut self, event: &StreamEvent) {
        if let StreamEvent::Text { text } = event {
            self.text.push_str(text);
        }
    }

    pub fn observe_token(&mut self, candidate: TokenCandidate) {
        candidate.apply(&mut self.token);
    }

    /// Later errors replace earlier ones.
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Content and error flag of the assistant message to persist, if any.
    ///
    /// Accumulated text wins over the error text, but the error flag is set
    /// whenever the turn failed.
    pub fn assistant_message(&self) -> Option<(String, bool)> {
        match (&self.error, self.text.is_empty()) {
            (error, false) => Some((self.text.clone(), error.is_some())),
            (Some(error), true) => Some((format!("Error: {error}"), true)),
            (None, true) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_fragments_concatenate() {
        let mut turn = TurnAccumulator::default();
        turn.observe_event(&StreamEvent::Text { text: "Hel".to_string() });
        turn.observe_event(&StreamEvent::Thinking { thinking: "ignored".to_string() });
        turn.observe_event(&StreamEvent::Text { text: "lo".to_string() });
        assert_eq!(turn.text(), "Hello");
        assert_eq!(turn.assistant_message(), Some(("Hello".to_string(), false)));
    }

    #[test]
    fn no_text_no_error_means_no_assistant_message() {
        assert_eq!(TurnAccumulator::default().assistant_message(), None);
    }

    #[test]
    fn error_without_text_is_synthesized() {
        let mut turn = TurnAccumulator::default();
        turn.record_error("first");
        turn.record_error("spawn failed");
        assert_eq!(
            turn.assistant_message(),
            Some(("Error: spawn failed".to_string(), true))
        );
    }

    #[test]
    fn error_after_text_keeps_text_and_sets_flag() {
        let mut turn = TurnAccumulator::default();
        turn.observe_event(&StreamEvent::Text { text: "partial".to_string() });
        turn.record_error("pipe closed");
        assert_eq!(turn.assistant_message(), Some(("partial".to_string(), true)));
    }

    #[test]
    fn token_rules() {
        let mut turn = TurnAccumulator::default();
        turn.observe_token(TokenCandidate::Init("T1".to_string()));
        assert_eq!(turn.token(), Some("T1"));
        turn.observe_token(TokenCandidate::Result("T2".to_string()));
        assert_eq!(turn.token(), Some("T2"));
    }
}
