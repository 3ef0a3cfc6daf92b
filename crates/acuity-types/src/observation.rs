//! Classifier samples and the observations derived from them.
//!
//! The face classifier runs at camera frame rate and reports, per detected
//! face, an open probability for each eye. The engine thresholds those
//! probabilities into [`Observation`]s and the vote aggregator turns each
//! accepted observation into a signed [`Vote`].

use std::time::Instant;

use crate::eye::Eye;

/// Eye-openness probabilities for one detected face.
///
/// Sides are as reported by the detector. Either side may be missing when
/// the detector could not classify that eye.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FaceSample {
    pub left_open_probability: Option<f32>,
    pub right_open_probability: Option<f32>,
}

impl FaceSample {
    #[must_use]
    pub fn new(left: Option<f32>, right: Option<f32>) -> Self {
        Self {
            left_open_probability: left,
            right_open_probability: right,
        }
    }

    /// A face where both eyes report the same probability.
    #[must_use]
    pub fn both(probability: f32) -> Self {
        Self::new(Some(probability), Some(probability))
    }
}

/// All faces detected in one camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub faces: Vec<FaceSample>,
    /// When the frame was captured.
    pub timestamp: Instant,
}

impl FrameSample {
    #[must_use]
    pub fn new(faces: Vec<FaceSample>, timestamp: Instant) -> Self {
        Self { faces, timestamp }
    }

    /// A frame with a single face.
    #[must_use]
    pub fn single(face: FaceSample, timestamp: Instant) -> Self {
        Self::new(vec![face], timestamp)
    }
}

/// A thresholded per-eye reading for one face in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub eye: Eye,
    pub is_open: bool,
    pub timestamp: Instant,
}

/// Signed unit derived from an accepted observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Open,
    Closed,
}

impl Vote {
    #[must_use]
    pub fn value(self) -> i32 {
        match self {
            Self::Open => 1,
            Self::Closed => -1,
        }
    }
}

impl From<&Observation> for Vote {
    fn from(obs: &Observation) -> Self {
        if obs.is_open {
            Self::Open
        } else {
            Self::Closed
        }
    }
}
