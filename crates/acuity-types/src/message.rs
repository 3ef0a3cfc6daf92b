//! Protocol message types.
//!
//! Messages are exchanged as newline-terminated text lines with the
//! test-administration server. The byte-level codec lives in
//! `acuity-protocol`; these are the decoded application intents and events.

/// Client-to-server messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundMessage {
    /// The patient pressed the answer button with this identifier.
    SubmitAnswer(u32),
}

/// Server-to-client messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Whether the last submitted answer was correct.
    AnswerFeedback(bool),
    /// The test is over; the payload is an opaque result such as a score.
    SessionEnded(String),
}

impl std::fmt::Display for OutboundMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubmitAnswer(n) => write!(f, "SubmitAnswer({n})"),
        }
    }
}
