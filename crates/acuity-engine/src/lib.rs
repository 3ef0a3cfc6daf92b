//! Session engine for acuity.
//!
//! Implements the eye-exam session: classifier thresholding, vote
//! aggregation, the session state machine, the server channel, and the
//! event loop that ties them to a UI through the sink and source seams.

pub mod channel;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod session;
pub mod setup;
pub mod sink;
pub mod source;
pub mod state;
pub mod vote;

pub use config::Config;
pub use engine::{Command, Engine, EngineEvent, EngineHandle, EngineOutcome, EngineStatus};
pub use error::{EngineError, SinkError, SourceError};
pub use sink::{SideEffect, SideEffectSink};
pub use source::{CallbackSource, FrameCallback, ObservationFeed, ObservationSource};
pub use state::Phase;
