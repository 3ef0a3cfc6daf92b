//! Console front end: prints side effects and parses stdin lines.

use std::io::Write;
use std::str::FromStr;

use acuity_engine::{SideEffect, SideEffectSink, SinkError};
use acuity_types::{Cue, Eye, FaceSample};
use async_trait::async_trait;

/// Sink that prints every effect to stdout.
pub struct ConsoleSink;

#[async_trait]
impl SideEffectSink for ConsoleSink {
    async fn apply(&mut self, effect: SideEffect) -> Result<(), SinkError> {
        writeln!(std::io::stdout().lock(), "{}", describe(&effect))
            .map_err(|e| SinkError::Display(e.to_string()))
    }

    async fn shutdown(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

fn describe(effect: &SideEffect) -> String {
    match effect {
        SideEffect::PromptEndpoint => "> enter the server address: connect HOST:PORT".to_string(),
        SideEffect::PromptEyeSelection => "> choose the eye under test: eye left|right".to_string(),
        SideEffect::ShowNotice(msg) => format!("* {msg}"),
        SideEffect::PlaySound(Cue::LeftEye) => "[sound] left eye".to_string(),
        SideEffect::PlaySound(Cue::RightEye) => "[sound] right eye".to_string(),
        SideEffect::PlaySound(Cue::Correct) => "[sound] tada".to_string(),
        SideEffect::ShowDialog { correct: true } => "[dialog] correct".to_string(),
        SideEffect::ShowDialog { correct: false } => "[dialog] incorrect".to_string(),
        SideEffect::DismissDialog => "[dialog] closed".to_string(),
        SideEffect::NavigateToResult(result) => format!("= result: {result}"),
        SideEffect::ShowError(msg) => format!("! {msg}"),
    }
}

/// One line typed on stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Connect(String),
    Eye(Eye),
    Answer(u32),
    Frame(FaceSample),
    Quit,
}

impl FromStr for Input {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return Err("empty line".to_string());
        };
        let args: Vec<&str> = parts.collect();

        match (command.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("connect", [address]) => Ok(Self::Connect((*address).to_string())),
            ("eye", [eye]) => eye.parse().map(Self::Eye),
            ("answer", [n]) => n
                .parse()
                .map(Self::Answer)
                .map_err(|e| format!("invalid answer {n:?}: {e}")),
            ("frame", [left, right]) => Ok(Self::Frame(FaceSample::new(
                probability(left)?,
                probability(right)?,
            ))),
            ("quit" | "exit", []) => Ok(Self::Quit),
            _ => Err(format!(
                "unknown command {line:?}; expected connect, eye, answer, frame or quit"
            )),
        }
    }
}

/// `-` means the classifier reported nothing for that eye.
fn probability(token: &str) -> Result<Option<f32>, String> {
    if token == "-" {
        return Ok(None);
    }
    let p: f32 = token
        .parse()
        .map_err(|e| format!("invalid probability {token:?}: {e}"))?;
    if (0.0..=1.0).contains(&p) {
        Ok(Some(p))
    } else {
        Err(format!("probability {p} is outside [0, 1]"))
    }
}
