//! TCP transport layer and wire protocol for acuity.
//!
//! This crate handles the client side of the exam-server connection: TCP
//! connect, splitting the stream into an independently usable sender and
//! receiver, newline framing, and the mapping between wire lines and
//! [`acuity_types::message`] values.

pub mod connection;
pub mod error;
pub mod transport;
pub mod wire;

pub use connection::{Connection, LineReceiver, LineSender};
pub use error::ProtocolError;
pub use transport::TcpTransport;
