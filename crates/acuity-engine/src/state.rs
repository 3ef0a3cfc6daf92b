//! Session phase state machine.

/// Phase of an exam session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created, not started.
    Idle,
    /// Waiting for the user to enter the server address.
    AwaitingEndpoint,
    /// Connection attempt in flight.
    Connecting,
    /// Connected; waiting for the user to pick the eye under test.
    AwaitingEyeSelection,
    /// Observing the selected eye and accepting answers.
    Detecting,
    /// Feedback dialog on screen; returns to `Detecting` on its own.
    FeedbackPending,
    /// The server ended the test. Terminal.
    Ended,
}

impl Phase {
    /// Whether classifier observations feed the vote aggregator.
    pub fn accepts_observations(self) -> bool {
        self == Self::Detecting
    }

    /// Whether an answer button press may be sent to the server.
    pub fn accepts_answers(self) -> bool {
        self == Self::Detecting
    }

    /// Whether answer feedback from the server is expected.
    pub fn accepts_feedback(self) -> bool {
        matches!(self, Self::Detecting | Self::FeedbackPending)
    }

    /// Whether a channel to the server is attached. The server may end the
    /// test in any of these phases.
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::AwaitingEyeSelection | Self::Detecting | Self::FeedbackPending
        )
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Ended
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::AwaitingEndpoint => write!(f, "AwaitingEndpoint"),
            Self::Connecting => write!(f, "Connecting"),
            Self::AwaitingEyeSelection => write!(f, "AwaitingEyeSelection"),
            Self::Detecting => write!(f, "Detecting"),
            Self::FeedbackPending => write!(f, "FeedbackPending"),
            Self::Ended => write!(f, "Ended"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_detecting_takes_observations_and_answers() {
        for phase in [
            Phase::Idle,
            Phase::AwaitingEndpoint,
            Phase::Connecting,
            Phase::AwaitingEyeSelection,
            Phase::FeedbackPending,
            Phase::Ended,
        ] {
            assert!(!phase.accepts_observations(), "{phase}");
            assert!(!phase.accepts_answers(), "{phase}");
        }
        assert!(Phase::Detecting.accepts_observations());
        assert!(Phase::Detecting.accepts_answers());
    }

    #[test]
    fn feedback_pending_still_listens_to_server() {
        assert!(Phase::FeedbackPending.accepts_feedback());
        assert!(!Phase::AwaitingEyeSelection.accepts_feedback());
    }

    #[test]
    fn connected_phases_carry_a_channel() {
        assert!(Phase::AwaitingEyeSelection.is_connected());
        assert!(Phase::Detecting.is_connected());
        assert!(Phase::FeedbackPending.is_connected());
        assert!(!Phase::Connecting.is_connected());
        assert!(!Phase::AwaitingEndpoint.is_connected());
    }

    #[test]
    fn ended_is_terminal() {
        assert!(Phase::Ended.is_terminal());
        assert!(!Phase::Ended.is_connected());
    }
}
