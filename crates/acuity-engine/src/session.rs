//! Exam session: phase transitions and the state they own.
//!
//! [`Session`] is only ever touched by the engine's event loop. Each
//! transition method updates the session and returns the [`Action`]s the
//! event loop must carry out (side effects, connects, sends, timers). The
//! session itself performs no I/O, so transitions are deterministic.

use acuity_types::{
    Cue, Endpoint, Eye, FrameSample, InboundMessage, OutboundMessage, SessionId,
};
use tracing::{debug, info, warn};

use crate::channel::{ConnectionId, SessionChannel};
use crate::classifier::EyeClassifier;
use crate::config::Config;
use crate::engine::EngineStatus;
use crate::sink::SideEffect;
use crate::state::Phase;
use crate::vote::VoteAggregator;

/// Work the event loop performs after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Effect(SideEffect),
    /// Open a connection in the background.
    Connect { attempt: u64, endpoint: Endpoint },
    /// Write a message on the current channel in the background.
    Send(OutboundMessage),
    /// Report `FeedbackElapsed { generation }` once the dialog time is up.
    StartFeedbackTimer { generation: u64 },
    /// Report `AnswerTimedOut { answer }` if the server stays silent.
    StartAnswerTimer { answer: u64 },
    /// Release the current channel.
    CloseChannel,
}

/// One exam session.
pub struct Session {
    id: SessionId,
    phase: Phase,
    endpoint: Option<Endpoint>,
    eye: Option<Eye>,
    votes: VoteAggregator,
    classifier: EyeClassifier,
    default_port: Option<u16>,
    answer_timeout: bool,
    connection: Option<ConnectionId>,
    channel: Option<SessionChannel>,
    connect_attempts: u64,
    connections_opened: u64,
    answers_sent: u64,
    pending_answer: Option<u64>,
    feedback_generation: u64,
    result: Option<String>,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            id: SessionId::new(),
            phase: Phase::Idle,
            endpoint: None,
            eye: None,
            votes: VoteAggregator::new(&config.detection),
            classifier: EyeClassifier::new(&config.detection),
            default_port: config.server.default_port,
            answer_timeout: config.feedback.timeout_ms.is_some(),
            connection: None,
            channel: None,
            connect_attempts: 0,
            connections_opened: 0,
            answers_sent: 0,
            pending_answer: None,
            feedback_generation: 0,
            result: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn eye(&self) -> Option<Eye> {
        self.eye
    }

    pub fn votes(&self) -> &VoteAggregator {
        &self.votes
    }

    /// The result payload once the server has ended the test.
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            session_id: self.id,
            phase: self.phase,
            endpoint: self.endpoint.clone(),
            eye: self.eye,
            answer_in_flight: self.pending_answer.is_some(),
        }
    }

    /// Attach the channel for a connection accepted by [`Session::connected`].
    pub fn attach_channel(&mut self, channel: SessionChannel) {
        debug_assert_eq!(Some(channel.id()), self.connection);
        self.channel = Some(channel);
    }

    pub fn channel(&self) -> Option<&SessionChannel> {
        self.channel.as_ref()
    }

    pub fn take_channel(&mut self) -> Option<SessionChannel> {
        self.channel.take()
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            info!(session = %self.id, from = %self.phase, to = %phase, "phase change");
            self.phase = phase;
        }
    }

    /// `Idle -> AwaitingEndpoint`.
    pub fn start(&mut self) -> Vec<Action> {
        if self.phase != Phase::Idle {
            return Vec::new();
        }
        self.set_phase(Phase::AwaitingEndpoint);
        vec![Action::Effect(SideEffect::PromptEndpoint)]
    }

    /// `AwaitingEndpoint -> Connecting` on a usable address.
    pub fn confirm_endpoint(&mut self, input: &str) -> Vec<Action> {
        if self.phase != Phase::AwaitingEndpoint {
            debug!(phase = %self.phase, "endpoint ignored outside AwaitingEndpoint");
            return Vec::new();
        }

        let endpoint = match Endpoint::parse(input, self.default_port) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(input, error = %e, "rejected server address");
                return vec![Action::Effect(SideEffect::ShowError(e.to_string()))];
            }
        };

        self.connect_attempts += 1;
        self.endpoint = Some(endpoint.clone());
        self.set_phase(Phase::Connecting);
        vec![Action::Connect {
            attempt: self.connect_attempts,
            endpoint,
        }]
    }

    /// A connection attempt succeeded. Returns the id for the new channel and
    /// the follow-up actions, or `None` if the attempt is stale and the
    /// connection should be dropped.
    pub fn connected(&mut self, attempt: u64) -> Option<(ConnectionId, Vec<Action>)> {
        if self.phase != Phase::Connecting || attempt != self.connect_attempts {
            debug!(attempt, phase = %self.phase, "stale connection discarded");
            return None;
        }

        self.connections_opened += 1;
        let id = ConnectionId(self.connections_opened);
        self.connection = Some(id);
        self.set_phase(Phase::AwaitingEyeSelection);

        let notice = match &self.endpoint {
            Some(endpoint) => format!("connected to {endpoint}"),
            None => "connected".to_string(),
        };
        Some((
            id,
            vec![
                Action::Effect(SideEffect::ShowNotice(notice)),
                Action::Effect(SideEffect::PromptEyeSelection),
            ],
        ))
    }

    /// A connection attempt failed: back to `AwaitingEndpoint`, no retry.
    pub fn connect_failed(&mut self, attempt: u64, reason: &str) -> Vec<Action> {
        if self.phase != Phase::Connecting || attempt != self.connect_attempts {
            debug!(attempt, "stale connect failure ignored");
            return Vec::new();
        }

        self.set_phase(Phase::AwaitingEndpoint);
        let target = self
            .endpoint
            .as_ref()
            .map_or_else(|| "server".to_string(), ToString::to_string);
        vec![Action::Effect(SideEffect::ShowError(format!(
            "could not connect to {target}: {reason}"
        )))]
    }

    /// Choose the eye under test; re-choosing while detecting restarts the
    /// vote window for the new eye.
    pub fn select_eye(&mut self, eye: Eye) -> Vec<Action> {
        match self.phase {
            Phase::AwaitingEyeSelection | Phase::Detecting => {
                self.eye = Some(eye);
                self.votes.arm(eye);
                self.set_phase(Phase::Detecting);
                info!(session = %self.id, %eye, "testing eye");
            }
            phase => debug!(%phase, %eye, "eye selection ignored"),
        }
        Vec::new()
    }

    /// Feed a classifier frame through the vote aggregator.
    pub fn frame(&mut self, frame: &FrameSample) -> Vec<Action> {
        if !self.phase.accepts_observations() {
            return Vec::new();
        }

        self.classifier
            .observations(frame)
            .iter()
            .filter_map(|obs| self.votes.observe(obs))
            .filter_map(|result| result.cue())
            .map(|cue| Action::Effect(SideEffect::PlaySound(cue)))
            .collect()
    }

    /// An answer button was pressed.
    pub fn submit_answer(&mut self, answer: u32) -> Vec<Action> {
        if !self.phase.accepts_answers() {
            debug!(answer, phase = %self.phase, "answer ignored");
            return Vec::new();
        }
        if self.connection.is_none() {
            warn!(answer, "answer ignored, not connected");
            return Vec::new();
        }
        if self.pending_answer.is_some() {
            debug!(answer, "answer ignored, previous answer awaiting feedback");
            return Vec::new();
        }

        self.answers_sent += 1;
        self.pending_answer = Some(self.answers_sent);
        info!(session = %self.id, answer, "submitting answer");

        let mut actions = vec![Action::Send(OutboundMessage::SubmitAnswer(answer))];
        if self.answer_timeout {
            actions.push(Action::StartAnswerTimer {
                answer: self.answers_sent,
            });
        }
        actions
    }

    /// A decoded message arrived on `connection`.
    pub fn inbound(&mut self, connection: ConnectionId, msg: InboundMessage) -> Vec<Action> {
        if self.connection != Some(connection) {
            debug!(%connection, "message from a replaced connection ignored");
            return Vec::new();
        }

        match msg {
            InboundMessage::AnswerFeedback(correct) if self.phase.accepts_feedback() => {
                self.answer_feedback(correct)
            }
            InboundMessage::SessionEnded(payload) if self.phase.is_connected() => {
                self.session_ended(payload)
            }
            msg => {
                debug!(phase = %self.phase, ?msg, "server message ignored");
                Vec::new()
            }
        }
    }

    fn answer_feedback(&mut self, correct: bool) -> Vec<Action> {
        if self.phase == Phase::FeedbackPending {
            warn!(correct, "feedback while a dialog is already shown, ignored");
            return Vec::new();
        }
        if self.pending_answer.take().is_none() {
            debug!(correct, "feedback without a pending answer");
        }

        self.feedback_generation += 1;
        self.set_phase(Phase::FeedbackPending);

        let mut actions = vec![Action::Effect(SideEffect::ShowDialog { correct })];
        if correct {
            actions.push(Action::Effect(SideEffect::PlaySound(Cue::Correct)));
        }
        actions.push(Action::StartFeedbackTimer {
            generation: self.feedback_generation,
        });
        actions
    }

    fn session_ended(&mut self, payload: String) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.phase == Phase::FeedbackPending {
            actions.push(Action::Effect(SideEffect::DismissDialog));
        }

        info!(session = %self.id, result = %payload, "test finished");
        self.votes.disarm();
        self.pending_answer = None;
        self.connection = None;
        self.set_phase(Phase::Ended);
        self.result = Some(payload.clone());

        actions.push(Action::Effect(SideEffect::NavigateToResult(payload)));
        actions.push(Action::CloseChannel);
        actions
    }

    /// The dialog timer fired.
    pub fn feedback_elapsed(&mut self, generation: u64) -> Vec<Action> {
        if self.phase != Phase::FeedbackPending || generation != self.feedback_generation {
            return Vec::new();
        }
        self.set_phase(Phase::Detecting);
        vec![Action::Effect(SideEffect::DismissDialog)]
    }

    /// The server did not answer in time.
    pub fn answer_timed_out(&mut self, answer: u64) -> Vec<Action> {
        if self.pending_answer != Some(answer) {
            return Vec::new();
        }
        self.pending_answer = None;
        warn!(session = %self.id, answer, "no feedback from server");
        vec![Action::Effect(SideEffect::ShowError(
            "no response from the server, please answer again".to_string(),
        ))]
    }

    /// The connection failed while reading or writing.
    pub fn channel_lost(&mut self, connection: ConnectionId, reason: &str) -> Vec<Action> {
        if self.connection != Some(connection) {
            debug!(%connection, "loss of a replaced connection ignored");
            return Vec::new();
        }

        warn!(session = %self.id, %connection, reason, "connection lost");
        let mut actions = vec![Action::CloseChannel];
        if self.phase == Phase::FeedbackPending {
            actions.push(Action::Effect(SideEffect::DismissDialog));
        }

        self.connection = None;
        self.pending_answer = None;
        self.eye = None;
        self.votes.disarm();
        self.set_phase(Phase::AwaitingEndpoint);

        actions.push(Action::Effect(SideEffect::ShowError(format!(
            "connection lost: {reason}"
        ))));
        actions
    }

    /// Teardown: release the channel if there is one.
    pub fn shutdown(&mut self) -> Vec<Action> {
        self.votes.disarm();
        self.pending_answer = None;
        if self.connection.take().is_some() || self.channel.is_some() {
            vec![Action::CloseChannel]
        } else {
            Vec::new()
        }
    }
}
