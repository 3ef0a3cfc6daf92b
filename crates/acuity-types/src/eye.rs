//! Eye identity and audio cues.

use serde::{Deserialize, Serialize};

/// Which eye is under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    /// The cue announcing that this eye was seen open for a whole window.
    #[must_use]
    pub fn cue(self) -> Cue {
        match self {
            Self::Left => Cue::LeftEye,
            Self::Right => Cue::RightEye,
        }
    }
}

impl std::fmt::Display for Eye {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

impl std::str::FromStr for Eye {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Self::Left),
            "right" | "r" => Ok(Self::Right),
            other => Err(format!("unknown eye: {other}")),
        }
    }
}

/// Audio cue played by the sound sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cue {
    /// Voice prompt for the left eye.
    LeftEye,
    /// Voice prompt for the right eye.
    RightEye,
    /// Fanfare played on a correct answer.
    Correct,
}
