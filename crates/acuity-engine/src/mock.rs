//! Mock side-effect sink for testing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::SinkError;
use crate::sink::{SideEffect, SideEffectSink};

/// Shared state for observing what `MockSink` was asked to do.
#[derive(Debug, Default)]
struct MockSinkState {
    effects: Vec<SideEffect>,
    failing: bool,
    shutdown: bool,
}

/// Mock sink that records every side effect.
pub struct MockSink {
    state: Arc<Mutex<MockSinkState>>,
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockSinkState::default())),
        }
    }

    /// Get a clonable handle for observing the sink from tests.
    pub fn handle(&self) -> MockSinkHandle {
        MockSinkHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Clonable observer handle for `MockSink`.
#[derive(Clone)]
pub struct MockSinkHandle {
    state: Arc<Mutex<MockSinkState>>,
}

impl MockSinkHandle {
    /// Snapshot of all effects applied so far, in order.
    pub fn effects(&self) -> Vec<SideEffect> {
        self.state.lock().unwrap().effects.clone()
    }

    /// Number of applied effects matching `pred`.
    pub fn count(&self, pred: impl Fn(&SideEffect) -> bool) -> usize {
        self.state
            .lock()
            .unwrap()
            .effects
            .iter()
            .filter(|e| pred(e))
            .count()
    }

    /// Make `apply` record the effect and then return an error.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    /// Check if shutdown was called.
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().unwrap().shutdown
    }

    /// Poll until an applied effect matches `pred`. Returns `false` on
    /// timeout.
    pub async fn wait_for(&self, pred: impl Fn(&SideEffect) -> bool, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.count(&pred) > 0 {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl SideEffectSink for MockSink {
    async fn apply(&mut self, effect: SideEffect) -> Result<(), SinkError> {
        let mut state = self.state.lock().unwrap();
        state.effects.push(effect);
        if state.failing {
            return Err(SinkError::Display("mock sink failure".to_string()));
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), SinkError> {
        self.state.lock().unwrap().shutdown = true;
        Ok(())
    }
}
