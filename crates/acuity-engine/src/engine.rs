//! Engine orchestration: the single event loop that owns the session.

use std::time::Duration;

use acuity_protocol::{Connection, TcpTransport};
use acuity_types::{Endpoint, Eye, FrameSample, InboundMessage, SessionId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::channel::{ConnectionId, SessionChannel};
use crate::config::Config;
use crate::error::EngineError;
use crate::session::{Action, Session};
use crate::sink::SideEffectSink;
use crate::source::{ObservationFeed, ObservationSource};
use crate::state::Phase;

/// Events processed by the engine's event loop.
pub enum EngineEvent {
    /// A user intent from an [`EngineHandle`].
    Command(Command),
    /// A classifier frame from the observation source.
    Frame(FrameSample),
    /// A connection attempt completed.
    Connected { attempt: u64, connection: Connection },
    /// A connection attempt failed or timed out.
    ConnectFailed { attempt: u64, reason: String },
    /// A decoded server message.
    Inbound {
        connection: ConnectionId,
        msg: InboundMessage,
    },
    /// The connection failed while reading or writing.
    ChannelLost {
        connection: ConnectionId,
        reason: String,
    },
    /// The feedback dialog has been shown long enough.
    FeedbackElapsed { generation: u64 },
    /// The server did not answer a submitted answer in time.
    AnswerTimedOut { answer: u64 },
    /// Shutdown signal.
    Shutdown,
}

/// User intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ConfirmEndpoint(String),
    SelectEye(Eye),
    SubmitAnswer(u32),
}

/// Snapshot of the session published after every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub session_id: SessionId,
    pub phase: Phase,
    pub eye: Option<Eye>,
    pub endpoint: Option<Endpoint>,
    pub answer_in_flight: bool,
}

/// How [`Engine::run`] finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// The server ended the test with this result payload.
    Completed(String),
    /// Shutdown was requested before the test ended.
    Cancelled,
}

/// Cloneable handle for sending user intents to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineEvent>,
}

impl EngineHandle {
    pub async fn confirm_endpoint(&self, input: impl Into<String>) -> Result<(), EngineError> {
        self.command(Command::ConfirmEndpoint(input.into())).await
    }

    pub async fn select_eye(&self, eye: Eye) -> Result<(), EngineError> {
        self.command(Command::SelectEye(eye)).await
    }

    pub async fn submit_answer(&self, answer: u32) -> Result<(), EngineError> {
        self.command(Command::SubmitAnswer(answer)).await
    }

    pub async fn command(&self, command: Command) -> Result<(), EngineError> {
        self.send(EngineEvent::Command(command)).await
    }

    /// Ask the engine to stop. [`Engine::run`] then returns
    /// [`EngineOutcome::Cancelled`].
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.send(EngineEvent::Shutdown).await
    }

    async fn send(&self, event: EngineEvent) -> Result<(), EngineError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| EngineError::NotRunning)
    }
}

/// The acuity session engine.
pub struct Engine {
    config: Config,
    session: Session,
    source: Box<dyn ObservationSource>,
    sink: Box<dyn SideEffectSink>,
    event_tx: mpsc::Sender<EngineEvent>,
    event_rx: mpsc::Receiver<EngineEvent>,
    status_tx: watch::Sender<EngineStatus>,
}

impl Engine {
    /// Create a new engine. Fails if the configuration is unusable.
    pub fn new(
        config: Config,
        source: Box<dyn ObservationSource>,
        sink: Box<dyn SideEffectSink>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let session = Session::new(&config);
        let (event_tx, event_rx) = mpsc::channel(config.engine.event_queue_capacity);
        let (status_tx, _) = watch::channel(session.status());

        Ok(Self {
            config,
            session,
            source,
            sink,
            event_tx,
            event_rx,
            status_tx,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            tx: self.event_tx.clone(),
        }
    }

    pub fn status_receiver(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    /// Run the event loop until the server ends the test or shutdown is
    /// requested.
    pub async fn run(mut self) -> Result<EngineOutcome, EngineError> {
        if let Err(e) = self
            .source
            .start(ObservationFeed::new(self.event_tx.clone()))
            .await
        {
            warn!(error = %e, "observation source failed to start");
            if let Err(shutdown_err) = self.shutdown().await {
                warn!(error = %shutdown_err, "shutdown after failed start");
            }
            return Err(e.into());
        }

        info!(session = %self.session.id(), "engine running");
        let actions = self.session.start();
        self.execute(actions).await;
        self.publish_status();

        let outcome = loop {
            let event = match self.event_rx.recv().await {
                Some(EngineEvent::Shutdown) | None => {
                    info!("shutting down");
                    break EngineOutcome::Cancelled;
                }
                Some(event) => event,
            };

            let actions = self.handle_event(event);
            self.execute(actions).await;
            self.publish_status();

            if self.session.phase().is_terminal() {
                let result = self.session.result().unwrap_or_default().to_string();
                break EngineOutcome::Completed(result);
            }
        };

        self.shutdown().await?;
        Ok(outcome)
    }

    fn handle_event(&mut self, event: EngineEvent) -> Vec<Action> {
        match event {
            EngineEvent::Command(Command::ConfirmEndpoint(input)) => {
                self.session.confirm_endpoint(&input)
            }
            EngineEvent::Command(Command::SelectEye(eye)) => self.session.select_eye(eye),
            EngineEvent::Command(Command::SubmitAnswer(answer)) => {
                self.session.submit_answer(answer)
            }
            EngineEvent::Frame(frame) => {
                trace!(faces = frame.faces.len(), "frame");
                self.session.frame(&frame)
            }
            EngineEvent::Connected {
                attempt,
                connection,
            } => match self.session.connected(attempt) {
                Some((id, actions)) => {
                    let channel = SessionChannel::open(
                        id,
                        connection,
                        self.config.server.max_line_length,
                        self.event_tx.clone(),
                    );
                    self.session.attach_channel(channel);
                    actions
                }
                None => Vec::new(),
            },
            EngineEvent::ConnectFailed { attempt, reason } => {
                self.session.connect_failed(attempt, &reason)
            }
            EngineEvent::Inbound { connection, msg } => self.session.inbound(connection, msg),
            EngineEvent::ChannelLost { connection, reason } => {
                self.session.channel_lost(connection, &reason)
            }
            EngineEvent::FeedbackElapsed { generation } => {
                self.session.feedback_elapsed(generation)
            }
            EngineEvent::AnswerTimedOut { answer } => self.session.answer_timed_out(answer),
            // Handled by the loop.
            EngineEvent::Shutdown => Vec::new(),
        }
    }

    async fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Effect(effect) => {
                    debug!(?effect, "side effect");
                    if let Err(e) = self.sink.apply(effect).await {
                        warn!(error = %e, "side effect failed");
                    }
                }
                Action::Connect { attempt, endpoint } => self.spawn_connect(attempt, endpoint),
                Action::Send(msg) => match self.session.channel() {
                    Some(channel) => channel.submit(msg),
                    None => warn!(%msg, "no channel, message dropped"),
                },
                Action::StartFeedbackTimer { generation } => {
                    self.post_after(
                        self.config.feedback.display(),
                        EngineEvent::FeedbackElapsed { generation },
                    );
                }
                Action::StartAnswerTimer { answer } => {
                    if let Some(timeout) = self.config.feedback.timeout() {
                        self.post_after(timeout, EngineEvent::AnswerTimedOut { answer });
                    }
                }
                Action::CloseChannel => {
                    if let Some(channel) = self.session.take_channel() {
                        channel.close().await;
                    }
                }
            }
        }
    }

    fn spawn_connect(&self, attempt: u64, endpoint: Endpoint) {
        let transport =
            TcpTransport::new().with_connect_timeout(self.config.server.connect_timeout());
        let tx = self.event_tx.clone();
        info!(%endpoint, attempt, "connecting to exam server");
        tokio::spawn(async move {
            let event = match transport.connect(&endpoint).await {
                Ok(connection) => EngineEvent::Connected {
                    attempt,
                    connection,
                },
                Err(e) => {
                    warn!(%endpoint, error = %e, "failed to connect");
                    EngineEvent::ConnectFailed {
                        attempt,
                        reason: e.to_string(),
                    }
                }
            };
            let _ = tx.send(event).await;
        });
    }

    fn post_after(&self, delay: Duration, event: EngineEvent) {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event).await;
        });
    }

    fn publish_status(&self) {
        let status = self.session.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    async fn shutdown(&mut self) -> Result<(), EngineError> {
        let actions = self.session.shutdown();
        self.execute(actions).await;
        self.publish_status();

        self.source.shutdown().await?;
        self.sink.shutdown().await?;
        info!(session = %self.session.id(), "engine stopped");
        Ok(())
    }
}
