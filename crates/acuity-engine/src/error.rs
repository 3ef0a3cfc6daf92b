//! Engine errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("engine is not running")]
    NotRunning,

    #[error("observation source error: {0}")]
    Source(#[from] SourceError),

    #[error("side-effect sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Errors raised by an observation source backend.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source already started")]
    AlreadyStarted,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised by a side-effect sink backend.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("display failed: {0}")]
    Display(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
