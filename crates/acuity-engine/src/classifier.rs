//! Turns raw face samples into per-eye observations.

use acuity_types::{Eye, FaceSample, FrameSample, Observation};

use crate::config::DetectionConfig;

/// Applies the open-probability threshold and camera mirroring.
#[derive(Debug, Clone, Copy)]
pub struct EyeClassifier {
    threshold: f32,
    mirrored: bool,
}

impl EyeClassifier {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            threshold: config.open_threshold,
            mirrored: config.mirror_eyes,
        }
    }

    /// Whether the subject's `eye` is open in `face`. A missing probability
    /// counts as closed.
    pub fn is_open(&self, face: &FaceSample, eye: Eye) -> bool {
        let probability = match (eye, self.mirrored) {
            (Eye::Left, false) | (Eye::Right, true) => face.left_open_probability,
            (Eye::Right, false) | (Eye::Left, true) => face.right_open_probability,
        };
        probability.is_some_and(|p| p > self.threshold)
    }

    /// One observation per eye per face, in face order, left eye first.
    pub fn observations(&self, frame: &FrameSample) -> Vec<Observation> {
        frame
            .faces
            .iter()
            .flat_map(|face| {
                [Eye::Left, Eye::Right].map(|eye| Observation {
                    eye,
                    is_open: self.is_open(face, eye),
                    timestamp: frame.timestamp,
                })
            })
            .collect()
    }
}
