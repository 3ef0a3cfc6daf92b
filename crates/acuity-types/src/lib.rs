//! Shared types for acuity.
//!
//! This crate contains the value types shared across the acuity workspace:
//! eye identity and audio cues, classifier frame samples and the observations
//! derived from them, the server endpoint, session identity, and the
//! application-level protocol messages.

pub mod endpoint;
pub mod eye;
pub mod message;
pub mod observation;
pub mod session;

pub use endpoint::{Endpoint, EndpointError};
pub use eye::{Cue, Eye};
pub use message::{InboundMessage, OutboundMessage};
pub use observation::{FaceSample, FrameSample, Observation, Vote};
pub use session::SessionId;
