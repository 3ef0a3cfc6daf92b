//! Integration tests driving the engine event loop against a loopback
//! exam server.

use std::time::{Duration, Instant};

use acuity_engine::mock::{MockSink, MockSinkHandle};
use acuity_engine::{
    CallbackSource, Config, Engine, EngineError, EngineHandle, EngineOutcome, EngineStatus,
    FrameCallback, ObservationFeed, ObservationSource, Phase, SideEffect, SourceError,
};
use acuity_types::{Cue, Eye, FaceSample};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

const WAIT: Duration = Duration::from_secs(5);

/// A running engine plus everything a test needs to drive and observe it.
struct Harness {
    handle: EngineHandle,
    status: watch::Receiver<EngineStatus>,
    sink: MockSinkHandle,
    frames: FrameCallback,
    run: JoinHandle<Result<EngineOutcome, EngineError>>,
}

impl Harness {
    async fn start(config: Config) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let (source, frames) = CallbackSource::new();
        let sink = MockSink::new();
        let sink_handle = sink.handle();

        let engine = Engine::new(config, Box::new(source), Box::new(sink)).unwrap();
        let handle = engine.handle();
        let status = engine.status_receiver();
        let run = tokio::spawn(engine.run());

        let mut harness = Self {
            handle,
            status,
            sink: sink_handle,
            frames,
            run,
        };
        harness
            .wait_for_phase(Phase::AwaitingEndpoint)
            .await
            .expect("engine should prompt for an endpoint");
        harness
    }

    async fn wait_for_status(
        &mut self,
        pred: impl Fn(&EngineStatus) -> bool,
    ) -> Result<EngineStatus, &'static str> {
        tokio::time::timeout(WAIT, async {
            loop {
                {
                    let status = self.status.borrow_and_update().clone();
                    if pred(&status) {
                        return Ok(status);
                    }
                }
                if self.status.changed().await.is_err() {
                    return Err("watch closed");
                }
            }
        })
        .await
        .map_err(|_| "timeout")?
    }

    async fn wait_for_phase(&mut self, phase: Phase) -> Result<EngineStatus, &'static str> {
        self.wait_for_status(|s| s.phase == phase).await
    }

    async fn wait_for_effect(&self, pred: impl Fn(&SideEffect) -> bool) -> bool {
        self.sink.wait_for(pred, WAIT).await
    }

    /// Push `count` frames spaced one observation interval apart.
    fn push_frames(&self, face: FaceSample, start: Instant, count: u64) {
        for i in 0..count {
            assert!(
                self.frames
                    .on_frame(vec![face], start + Duration::from_millis(i * 100)),
                "frame {i} should be accepted"
            );
        }
    }

    async fn finish(self) -> EngineOutcome {
        tokio::time::timeout(WAIT, self.run)
            .await
            .expect("engine should stop")
            .expect("engine task should not panic")
            .expect("engine should stop cleanly")
    }
}

/// Server side of one accepted connection.
struct ServerConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ServerConn {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .expect("engine should connect")
            .unwrap();
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    /// Next line from the engine, or `None` at end of stream.
    async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(WAIT, self.reader.read_line(&mut line))
            .await
            .expect("engine should write a line")
            .unwrap();
        (n > 0).then_some(line)
    }

    async fn write(&mut self, data: &str) {
        self.writer.write_all(data.as_bytes()).await.unwrap();
        self.writer.flush().await.unwrap();
    }
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.feedback.display_ms = 200;
    config
}

/// Connect to `listener` and select `eye`; returns the server side.
async fn connect_and_select(
    h: &mut Harness,
    listener: &TcpListener,
    addr: &str,
    eye: Eye,
) -> ServerConn {
    h.handle.confirm_endpoint(addr).await.unwrap();
    let server = ServerConn::accept(listener).await;
    h.wait_for_phase(Phase::AwaitingEyeSelection)
        .await
        .expect("engine should ask for the eye");
    h.handle.select_eye(eye).await.unwrap();
    h.wait_for_phase(Phase::Detecting)
        .await
        .expect("engine should start detecting");
    server
}

#[tokio::test]
async fn full_session_to_result() {
    let (listener, addr) = listen().await;
    let mut h = Harness::start(fast_config()).await;
    assert_eq!(h.sink.effects(), vec![SideEffect::PromptEndpoint]);

    let mut server = connect_and_select(&mut h, &listener, &addr, Eye::Left).await;
    assert!(h.sink.effects().contains(&SideEffect::PromptEyeSelection));

    // One full window of open votes confirms once; the debounce period
    // swallows the frames that follow.
    let t0 = Instant::now();
    h.push_frames(FaceSample::both(0.99), t0, 20);
    assert!(
        h.wait_for_effect(|e| *e == SideEffect::PlaySound(Cue::LeftEye))
            .await
    );
    h.push_frames(FaceSample::both(0.99), t0 + Duration::from_millis(2000), 10);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        h.sink
            .count(|e| matches!(e, SideEffect::PlaySound(Cue::LeftEye))),
        1
    );

    h.handle.submit_answer(7).await.unwrap();
    assert_eq!(server.read_line().await.as_deref(), Some("Answer 7\n"));

    server.write("true\n").await;
    assert!(
        h.wait_for_effect(|e| *e == SideEffect::ShowDialog { correct: true })
            .await
    );
    assert!(
        h.wait_for_effect(|e| *e == SideEffect::PlaySound(Cue::Correct))
            .await
    );
    assert!(h.wait_for_effect(|e| *e == SideEffect::DismissDialog).await);
    let status = h.wait_for_phase(Phase::Detecting).await.unwrap();
    assert!(!status.answer_in_flight);

    // Noise on the line is skipped without dropping the connection.
    h.handle.submit_answer(3).await.unwrap();
    assert_eq!(server.read_line().await.as_deref(), Some("Answer 3\n"));
    server.write("from examiner\nmaybe\nFALSE\n").await;
    assert!(
        h.wait_for_effect(|e| *e == SideEffect::ShowDialog { correct: false })
            .await
    );
    h.wait_for_phase(Phase::Detecting).await.unwrap();

    server.write("END 20/20\n").await;
    let sink = h.sink.clone();
    assert_eq!(h.finish().await, EngineOutcome::Completed("20/20".to_string()));
    assert!(sink
        .effects()
        .contains(&SideEffect::NavigateToResult("20/20".to_string())));
    assert!(sink.is_shutdown());
    assert_eq!(sink.count(|e| matches!(e, SideEffect::ShowError(_))), 0);

    // The engine closed its end of the connection.
    assert_eq!(server.read_line().await, None);
}

#[tokio::test]
async fn session_end_dismisses_open_dialog() {
    let (listener, addr) = listen().await;
    let mut config = fast_config();
    config.feedback.display_ms = 60_000;
    let mut h = Harness::start(config).await;
    let mut server = connect_and_select(&mut h, &listener, &addr, Eye::Right).await;

    h.handle.submit_answer(1).await.unwrap();
    server.read_line().await.unwrap();
    server.write("true\n").await;
    h.wait_for_phase(Phase::FeedbackPending).await.unwrap();

    server.write("end 0.5\n").await;
    let sink = h.sink.clone();
    assert_eq!(h.finish().await, EngineOutcome::Completed("0.5".to_string()));

    let effects = sink.effects();
    let tail = &effects[effects.len() - 2..];
    assert_eq!(
        tail,
        [
            SideEffect::DismissDialog,
            SideEffect::NavigateToResult("0.5".to_string())
        ]
    );
}

#[tokio::test]
async fn session_end_before_eye_selection_completes() {
    let (listener, addr) = listen().await;
    let mut h = Harness::start(fast_config()).await;

    h.handle.confirm_endpoint(addr.as_str()).await.unwrap();
    let mut server = ServerConn::accept(&listener).await;
    h.wait_for_phase(Phase::AwaitingEyeSelection).await.unwrap();

    server.write("end 20/20\n").await;
    let sink = h.sink.clone();
    assert_eq!(h.finish().await, EngineOutcome::Completed("20/20".to_string()));
    assert_eq!(
        sink.effects().last(),
        Some(&SideEffect::NavigateToResult("20/20".to_string()))
    );
    assert_eq!(server.read_line().await, None);
}

#[tokio::test]
async fn connect_failure_returns_to_endpoint_entry() {
    let (listener, addr) = listen().await;
    drop(listener);

    let mut h = Harness::start(fast_config()).await;
    h.handle.confirm_endpoint(addr.as_str()).await.unwrap();
    assert!(
        h.wait_for_effect(|e| matches!(e, SideEffect::ShowError(_)))
            .await
    );
    let status = h.wait_for_phase(Phase::AwaitingEndpoint).await.unwrap();
    assert_eq!(status.eye, None);

    let effects = h.sink.effects();
    assert_eq!(effects.len(), 2, "only the error is shown: {effects:?}");
    assert_eq!(effects[0], SideEffect::PromptEndpoint);

    // No eye can be chosen without a connection.
    h.handle.select_eye(Eye::Left).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.status.borrow().phase, Phase::AwaitingEndpoint);

    h.handle.shutdown().await.unwrap();
    assert_eq!(h.finish().await, EngineOutcome::Cancelled);
}

#[tokio::test]
async fn address_without_port_is_rejected() {
    let mut h = Harness::start(fast_config()).await;
    h.handle.confirm_endpoint("exam-room").await.unwrap();
    assert!(
        h.wait_for_effect(|e| matches!(e, SideEffect::ShowError(_)))
            .await
    );
    assert_eq!(h.status.borrow().phase, Phase::AwaitingEndpoint);
    assert_eq!(h.status.borrow().endpoint, None);

    h.handle.shutdown().await.unwrap();
    assert_eq!(h.finish().await, EngineOutcome::Cancelled);
}

#[tokio::test]
async fn channel_loss_allows_reconnect() {
    let (listener, addr) = listen().await;
    let mut h = Harness::start(fast_config()).await;
    let server = connect_and_select(&mut h, &listener, &addr, Eye::Left).await;

    drop(server);
    assert!(
        h.wait_for_effect(|e| matches!(e, SideEffect::ShowError(msg) if msg.contains("connection lost")))
            .await
    );
    let status = h.wait_for_phase(Phase::AwaitingEndpoint).await.unwrap();
    assert_eq!(status.eye, None);

    // Answers are rejected until reconnected.
    h.handle.submit_answer(4).await.unwrap();

    let mut server = connect_and_select(&mut h, &listener, &addr, Eye::Right).await;
    h.handle.submit_answer(5).await.unwrap();
    assert_eq!(server.read_line().await.as_deref(), Some("Answer 5\n"));

    h.handle.shutdown().await.unwrap();
    assert_eq!(h.finish().await, EngineOutcome::Cancelled);
    assert_eq!(server.read_line().await, None);
}

#[tokio::test]
async fn silent_server_times_out_answer() {
    let (listener, addr) = listen().await;
    let mut config = fast_config();
    config.feedback.timeout_ms = Some(200);
    let mut h = Harness::start(config).await;
    let mut server = connect_and_select(&mut h, &listener, &addr, Eye::Left).await;

    h.handle.submit_answer(2).await.unwrap();
    assert_eq!(server.read_line().await.as_deref(), Some("Answer 2\n"));
    h.wait_for_status(|s| s.answer_in_flight).await.unwrap();

    assert!(
        h.wait_for_effect(|e| matches!(e, SideEffect::ShowError(_)))
            .await
    );
    let status = h.wait_for_status(|s| !s.answer_in_flight).await.unwrap();
    assert_eq!(status.phase, Phase::Detecting);

    h.handle.submit_answer(2).await.unwrap();
    assert_eq!(server.read_line().await.as_deref(), Some("Answer 2\n"));

    h.handle.shutdown().await.unwrap();
    assert_eq!(h.finish().await, EngineOutcome::Cancelled);
}

#[tokio::test]
async fn failing_sink_does_not_change_phase() {
    let (listener, addr) = listen().await;
    let mut h = Harness::start(fast_config()).await;
    h.sink.set_failing(true);

    let _server = connect_and_select(&mut h, &listener, &addr, Eye::Left).await;
    assert!(h.sink.effects().contains(&SideEffect::PromptEyeSelection));

    h.handle.shutdown().await.unwrap();
    assert_eq!(h.finish().await, EngineOutcome::Cancelled);
}

#[tokio::test]
async fn shutdown_stops_source_and_sink() {
    let h = Harness::start(fast_config()).await;
    let sink = h.sink.clone();
    let frames = h.frames.clone();
    let handle = h.handle.clone();

    h.handle.shutdown().await.unwrap();
    assert_eq!(h.finish().await, EngineOutcome::Cancelled);

    assert!(sink.is_shutdown());
    assert!(!frames.on_frame(vec![FaceSample::both(0.99)], Instant::now()));
    assert!(matches!(
        handle.submit_answer(1).await,
        Err(EngineError::NotRunning)
    ));
}

/// A camera pipeline that cannot be opened.
struct BrokenSource;

#[async_trait]
impl ObservationSource for BrokenSource {
    async fn start(&mut self, _feed: ObservationFeed) -> Result<(), SourceError> {
        Err(SourceError::Other(anyhow::anyhow!("camera unavailable")))
    }

    async fn shutdown(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

#[tokio::test]
async fn failed_source_start_still_releases_sink() {
    let sink = MockSink::new();
    let sink_handle = sink.handle();
    let engine = Engine::new(Config::default(), Box::new(BrokenSource), Box::new(sink)).unwrap();

    let result = engine.run().await;
    assert!(matches!(result, Err(EngineError::Source(SourceError::Other(_)))));
    assert!(sink_handle.is_shutdown());
    assert!(sink_handle.effects().is_empty());
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = Config::default();
    config.detection.observation_interval_ms = 0;
    let (source, _frames) = CallbackSource::new();
    assert!(matches!(
        Engine::new(config, Box::new(source), Box::new(MockSink::new())),
        Err(EngineError::Config(_))
    ));
}
