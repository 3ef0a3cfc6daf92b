//! Test-administration server endpoint.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("server address is empty")]
    Empty,

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("no port given for {0} and no default port configured")]
    MissingPort(String),

    #[error("malformed address: {0}")]
    Malformed(String),
}

/// Host and port of the test-administration server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse user input of the form `host`, `host:port` or `[v6]:port`.
    ///
    /// The port is taken from the input when present, otherwise from
    /// `default_port`. There is no built-in port.
    pub fn parse(input: &str, default_port: Option<u16>) -> Result<Self, EndpointError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(EndpointError::Empty);
        }

        let (host, port) = if let Some(rest) = input.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| EndpointError::Malformed(input.to_string()))?;
            match after {
                "" => (host, None),
                _ => {
                    let port = after
                        .strip_prefix(':')
                        .ok_or_else(|| EndpointError::Malformed(input.to_string()))?;
                    (host, Some(port))
                }
            }
        } else if input.matches(':').count() == 1 {
            let (host, port) = input
                .split_once(':')
                .ok_or_else(|| EndpointError::Malformed(input.to_string()))?;
            (host, Some(port))
        } else {
            // Bare host, or an unbracketed IPv6 literal.
            (input, None)
        };

        if host.is_empty() {
            return Err(EndpointError::Malformed(input.to_string()));
        }

        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| EndpointError::InvalidPort(p.to_string()))?,
            None => default_port.ok_or_else(|| EndpointError::MissingPort(host.to_string()))?,
        };

        Ok(Self::new(host, port))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
