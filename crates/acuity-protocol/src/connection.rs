//! TCP connection and newline framing.

use std::net::SocketAddr;
use std::sync::Arc;

use acuity_types::{InboundMessage, OutboundMessage};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{trace, warn};

use crate::error::ProtocolError;
use crate::wire::{self, DEFAULT_MAX_LINE_LENGTH};

/// An established connection to the exam server.
pub struct Connection {
    stream: TcpStream,
    remote: SocketAddr,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Result<Self, ProtocolError> {
        let remote = stream.peer_addr()?;
        Ok(Self { stream, remote })
    }

    /// Get the remote address of this connection.
    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    /// Split into a cloneable sender and a single-owner receiver.
    pub fn split(self) -> (LineSender, LineReceiver) {
        self.split_with_limit(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Split, rejecting inbound lines longer than `max_line_length` bytes.
    pub fn split_with_limit(self, max_line_length: usize) -> (LineSender, LineReceiver) {
        let (read, write) = self.stream.into_split();
        (
            LineSender::new(write),
            LineReceiver::new(read, max_line_length),
        )
    }
}

/// Writes whole protocol lines. Clones share one write lock, so concurrent
/// senders never interleave bytes of different lines.
#[derive(Clone)]
pub struct LineSender {
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl LineSender {
    fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Encode and send a message as a single write.
    pub async fn send(&self, msg: &OutboundMessage) -> Result<(), ProtocolError> {
        let line = wire::encode_message(msg);
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        trace!(%msg, len = line.len(), "sent line");
        Ok(())
    }

    /// Close the write direction (the server sees EOF).
    pub async fn shutdown(&self) -> Result<(), ProtocolError> {
        let mut writer = self.writer.lock().await;
        writer.shutdown().await?;
        Ok(())
    }
}

/// Reads newline-terminated lines from the server.
pub struct LineReceiver {
    reader: BufReader<OwnedReadHalf>,
    max_line_length: usize,
}

impl LineReceiver {
    fn new(reader: OwnedReadHalf, max_line_length: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            max_line_length,
        }
    }

    /// Receive the next line without its terminator.
    ///
    /// Returns `None` once the peer has closed the stream. A final line
    /// without a terminator is still returned. A line whose content, not
    /// counting the terminator, exceeds the limit is skipped up to its
    /// terminator and reported as
    /// [`ProtocolError::LineTooLong`]; the receiver stays usable.
    pub async fn recv_line(&mut self) -> Result<Option<String>, ProtocolError> {
        let limit = self.limit();
        let mut buf = Vec::new();
        let n = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }

        if buf.last() != Some(&b'\n') && buf.len() as u64 >= limit {
            self.discard_rest_of_line().await?;
            return Err(ProtocolError::LineTooLong(self.max_line_length));
        }

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        if buf.len() > self.max_line_length {
            warn!(len = buf.len(), max = self.max_line_length, "discarded over-long line");
            return Err(ProtocolError::LineTooLong(self.max_line_length));
        }

        let line = String::from_utf8(buf)
            .map_err(|e| ProtocolError::Malformed(String::from_utf8_lossy(e.as_bytes()).into()))?;
        trace!(len = n, "received line");
        Ok(Some(line))
    }

    /// Receive the next application message.
    ///
    /// Informational lines are skipped. Malformed lines come back as
    /// non-fatal errors so the caller can log them and keep reading.
    pub async fn recv(&mut self) -> Result<Option<InboundMessage>, ProtocolError> {
        loop {
            let Some(line) = self.recv_line().await? else {
                return Ok(None);
            };
            if let Some(msg) = wire::decode_line(&line)? {
                return Ok(Some(msg));
            }
        }
    }

    fn limit(&self) -> u64 {
        // Room for the line plus "\r\n".
        u64::try_from(self.max_line_length)
            .unwrap_or(u64::MAX)
            .saturating_add(2)
    }

    async fn discard_rest_of_line(&mut self) -> Result<(), ProtocolError> {
        let limit = self.limit();
        let mut scratch = Vec::new();
        loop {
            scratch.clear();
            let n = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut scratch)
                .await?;
            if n == 0 || scratch.last() == Some(&b'\n') {
                warn!(max = self.max_line_length, "discarded over-long line");
                return Ok(());
            }
        }
    }
}
