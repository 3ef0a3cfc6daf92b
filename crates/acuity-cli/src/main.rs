//! acuity CLI: runs an eye-exam session from the terminal.

mod console;

use std::time::Instant;

use acuity_engine::setup;
use acuity_engine::{
    CallbackSource, Config, Engine, EngineHandle, EngineOutcome, EngineStatus, FrameCallback,
    Phase,
};
use acuity_types::Eye;
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::console::{ConsoleSink, Input};

#[derive(Parser)]
#[command(
    name = "acuity",
    about = "Eye-exam session client",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one exam session, reading commands and frames from stdin.
    Session {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,

        /// Server address to connect to immediately (host[:port]).
        #[arg(short, long)]
        endpoint: Option<String>,

        /// Eye to test once connected.
        #[arg(long)]
        eye: Option<Eye>,
    },

    /// Print the effective configuration as TOML.
    Config {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Session {
            config,
            endpoint,
            eye,
        } => {
            let config = setup::load_config(config.as_deref())?;
            init_tracing(&config);
            run_session(config, endpoint, eye).await?;
        }
        Commands::Config { config } => {
            let config = setup::load_config(config.as_deref())?;
            print!("{}", setup::render_config(&config)?);
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.engine.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run_session(
    config: Config,
    endpoint: Option<String>,
    eye: Option<Eye>,
) -> anyhow::Result<()> {
    let (source, frames) = CallbackSource::new();
    let engine = Engine::new(config, Box::new(source), Box::new(ConsoleSink))?;
    let handle = engine.handle();
    let status = engine.status_receiver();
    let mut run = tokio::spawn(engine.run());

    if let Some(endpoint) = endpoint {
        handle.confirm_endpoint(endpoint).await?;
    }
    if let Some(eye) = eye {
        tokio::spawn(select_eye_when_connected(handle.clone(), status, eye));
    }

    let mut lines = spawn_stdin_reader();
    let mut stdin_open = true;

    let outcome = loop {
        tokio::select! {
            biased;
            result = &mut run => break result??,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                request_shutdown(&handle).await;
            }
            line = lines.recv(), if stdin_open => match line.transpose()? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match line.parse::<Input>() {
                    Ok(input) => {
                        if let Err(e) = dispatch(&handle, &frames, input).await {
                            warn!(error = %e, "command not delivered");
                        }
                    }
                    Err(e) => eprintln!("{e}"),
                },
                None => {
                    stdin_open = false;
                    request_shutdown(&handle).await;
                }
            },
        }
    };

    match outcome {
        EngineOutcome::Completed(result) => println!("{result}"),
        EngineOutcome::Cancelled => info!("session cancelled"),
    }
    Ok(())
}

/// Read stdin on a plain thread so a pending read never holds up exit.
fn spawn_stdin_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn dispatch(
    handle: &EngineHandle,
    frames: &FrameCallback,
    input: Input,
) -> anyhow::Result<()> {
    match input {
        Input::Connect(address) => handle.confirm_endpoint(address).await?,
        Input::Eye(eye) => handle.select_eye(eye).await?,
        Input::Answer(n) => handle.submit_answer(n).await?,
        Input::Frame(face) => {
            if !frames.on_frame(vec![face], Instant::now()) {
                warn!("frame dropped");
            }
        }
        Input::Quit => handle.shutdown().await?,
    }
    Ok(())
}

async fn request_shutdown(handle: &EngineHandle) {
    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "shutdown request not delivered");
    }
}

/// Select `eye` the first time the engine asks for it.
async fn select_eye_when_connected(
    handle: EngineHandle,
    mut status: watch::Receiver<EngineStatus>,
    eye: Eye,
) {
    if status
        .wait_for(|s| s.phase == Phase::AwaitingEyeSelection)
        .await
        .is_err()
    {
        return;
    }
    if let Err(e) = handle.select_eye(eye).await {
        warn!(error = %e, "could not select eye");
    }
}
