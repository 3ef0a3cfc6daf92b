//! TCP transport: client-initiated connect with an optional timeout.

use std::time::Duration;

use acuity_types::Endpoint;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::ProtocolError;

/// Client-side TCP transport for the exam server.
#[derive(Debug, Clone, Default)]
pub struct TcpTransport {
    connect_timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on connection attempts that take longer than `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Connect to the server.
    pub async fn connect(&self, endpoint: &Endpoint) -> Result<Connection, ProtocolError> {
        debug!(%endpoint, "connecting");
        let attempt = TcpStream::connect((endpoint.host.as_str(), endpoint.port));

        let stream = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, attempt).await.map_err(|_| {
                ProtocolError::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
            })?,
            None => attempt.await,
        }
        .map_err(|e| ProtocolError::Connection(format!("{endpoint}: {e}")))?;

        stream.set_nodelay(true)?;
        let connection = Connection::new(stream)?;
        info!(%endpoint, remote = %connection.remote_address(), "connected to server");
        Ok(connection)
    }
}
