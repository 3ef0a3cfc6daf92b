//! Side-effect sink: the UI, audio and navigation collaborators.
//!
//! The engine never renders anything itself. Every user-visible effect is
//! handed to a [`SideEffectSink`] from the event loop, in order.

use acuity_types::Cue;
use async_trait::async_trait;

use crate::error::SinkError;

/// A user-visible effect requested by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Ask the user for the server address.
    PromptEndpoint,
    /// Ask the user which eye is being tested.
    PromptEyeSelection,
    /// Short informational message (e.g. a toast).
    ShowNotice(String),
    PlaySound(Cue),
    /// Modal correct/incorrect dialog.
    ShowDialog { correct: bool },
    DismissDialog,
    /// Leave the exam screen and show the final result.
    NavigateToResult(String),
    ShowError(String),
}

/// Receives side effects on the engine's event loop.
///
/// Implementations should return quickly; anything slow belongs on the
/// implementation's own thread.
#[async_trait]
pub trait SideEffectSink: Send + 'static {
    /// Perform one effect. Errors are logged by the engine and otherwise
    /// ignored.
    async fn apply(&mut self, effect: SideEffect) -> Result<(), SinkError>;

    /// Release audio and display resources.
    async fn shutdown(&mut self) -> Result<(), SinkError>;
}
