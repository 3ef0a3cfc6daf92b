//! Session channel: owns one server connection for its whole lifetime.
//!
//! Reading happens on a dedicated task that blocks on the next line and
//! forwards decoded messages to the event loop. Writes are spawned per
//! message so the event loop never waits on the network. Closing cancels the
//! reader and any pending writes, shuts down the write direction and waits
//! for the reader to exit.

use std::time::Duration;

use acuity_protocol::{Connection, LineReceiver, LineSender, ProtocolError};
use acuity_types::OutboundMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::EngineEvent;

/// Upper bound on the graceful write shutdown during teardown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Identifies one successful connection within a session, so that events
/// from a connection that has since been replaced can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A live connection to the exam server.
pub struct SessionChannel {
    id: ConnectionId,
    sender: LineSender,
    events: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

impl SessionChannel {
    /// Take ownership of `connection` and start its read loop.
    pub fn open(
        id: ConnectionId,
        connection: Connection,
        max_line_length: usize,
        events: mpsc::Sender<EngineEvent>,
    ) -> Self {
        let remote = connection.remote_address();
        let (sender, receiver) = connection.split_with_limit(max_line_length);
        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_loop(id, receiver, cancel.clone(), events.clone()));
        info!(%id, %remote, "session channel open");
        Self {
            id,
            sender,
            events,
            cancel,
            reader,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Send `msg` in the background. A write failure is reported to the
    /// event loop as [`EngineEvent::ChannelLost`]; there is no retry.
    pub fn submit(&self, msg: OutboundMessage) {
        let sender = self.sender.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        let id = self.id;
        tokio::spawn(async move {
            let result = tokio::select! {
                () = cancel.cancelled() => {
                    debug!(%id, %msg, "send abandoned, channel closing");
                    return;
                }
                result = sender.send(&msg) => result,
            };
            if let Err(e) = result {
                warn!(%id, %msg, error = %e, "send failed");
                let _ = events
                    .send(EngineEvent::ChannelLost {
                        connection: id,
                        reason: format!("send failed: {e}"),
                    })
                    .await;
            }
        });
    }

    /// Stop the read loop and close the connection. Writes still in flight
    /// are abandoned.
    pub async fn close(self) {
        self.cancel.cancel();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.sender.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(id = %self.id, error = %e, "write shutdown failed"),
            Err(_) => debug!(id = %self.id, "write shutdown timed out"),
        }
        if let Err(e) = self.reader.await {
            warn!(id = %self.id, error = %e, "read loop task failed");
        }
        info!(id = %self.id, "session channel closed");
    }
}

async fn read_loop(
    id: ConnectionId,
    mut receiver: LineReceiver,
    cancel: CancellationToken,
    events: mpsc::Sender<EngineEvent>,
) {
    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => {
                debug!(%id, "read loop cancelled");
                return;
            }
            result = receiver.recv() => result,
        };

        let event = match result {
            Ok(Some(msg)) => {
                debug!(%id, ?msg, "received");
                EngineEvent::Inbound { connection: id, msg }
            }
            Ok(None) => EngineEvent::ChannelLost {
                connection: id,
                reason: ProtocolError::StreamClosed.to_string(),
            },
            Err(e) if !e.is_fatal() => {
                warn!(%id, error = %e, "discarding line");
                continue;
            }
            Err(e) => EngineEvent::ChannelLost {
                connection: id,
                reason: e.to_string(),
            },
        };
        let lost = matches!(event, EngineEvent::ChannelLost { .. });

        // The event loop may be closing us while the queue is full.
        tokio::select! {
            () = cancel.cancelled() => return,
            sent = events.send(event) => {
                if sent.is_err() {
                    return;
                }
            }
        }
        if lost {
            return;
        }
    }
}
