//! Vote aggregation: debounces per-frame eye readings into gaze decisions.
//!
//! Accepted observations become +1/-1 votes in a bounded window. When the
//! window is full it is summed and cleared; a strictly positive sum confirms
//! that the selected eye was open. After each flush new observations are
//! suppressed for the debounce period so residual frames cannot re-trigger.

use std::time::{Duration, Instant};

use acuity_types::{Cue, Eye, Observation, Vote};
use tracing::{debug, trace};

use crate::config::DetectionConfig;

/// Outcome of one full vote window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteWindowResult {
    pub eye: Eye,
    pub sum: i32,
    pub votes: usize,
    pub flushed_at: Instant,
}

impl VoteWindowResult {
    /// Strictly more open than closed votes. Ties do not confirm.
    pub fn is_confirmed(&self) -> bool {
        self.sum > 0
    }

    /// The cue to play, if the window confirmed the eye.
    pub fn cue(&self) -> Option<Cue> {
        self.is_confirmed().then(|| self.eye.cue())
    }
}

/// Owns the vote window for the eye under test.
#[derive(Debug)]
pub struct VoteAggregator {
    interval: Duration,
    debounce: Duration,
    capacity: usize,
    eye: Option<Eye>,
    window: Vec<Vote>,
    last_accepted: Option<Instant>,
}

impl VoteAggregator {
    pub fn new(config: &DetectionConfig) -> Self {
        let capacity = config.window_capacity().max(1);
        Self {
            interval: config.observation_interval(),
            debounce: config.debounce(),
            capacity,
            eye: None,
            window: Vec::with_capacity(capacity),
            last_accepted: None,
        }
    }

    /// Start collecting votes for `eye`, discarding any previous window.
    pub fn arm(&mut self, eye: Eye) {
        self.eye = Some(eye);
        self.window.clear();
        self.last_accepted = None;
        debug!(%eye, capacity = self.capacity, "vote aggregator armed");
    }

    /// Stop collecting votes and discard the window.
    pub fn disarm(&mut self) {
        if self.eye.take().is_some() {
            debug!("vote aggregator disarmed");
        }
        self.window.clear();
        self.last_accepted = None;
    }

    pub fn selected_eye(&self) -> Option<Eye> {
        self.eye
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Votes currently buffered.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Feed one observation. Returns a result when it completes a window.
    pub fn observe(&mut self, obs: &Observation) -> Option<VoteWindowResult> {
        let eye = self.eye?;
        if obs.eye != eye {
            return None;
        }

        if let Some(last) = self.last_accepted {
            if obs.timestamp.saturating_duration_since(last) < self.interval {
                trace!("observation inside minimum interval, dropped");
                return None;
            }
        }

        let vote = Vote::from(obs);
        self.window.push(vote);
        trace!(?vote, len = self.window.len(), "vote accepted");

        if self.window.len() < self.capacity {
            self.last_accepted = Some(obs.timestamp);
            return None;
        }

        let sum = self.window.iter().map(|v| v.value()).sum();
        let result = VoteWindowResult {
            eye,
            sum,
            votes: self.window.len(),
            flushed_at: obs.timestamp,
        };
        self.window.clear();
        self.last_accepted = Some(
            obs.timestamp
                .checked_add(self.debounce)
                .unwrap_or(obs.timestamp),
        );
        debug!(%eye, sum, confirmed = result.is_confirmed(), "vote window flushed");
        Some(result)
    }
}
