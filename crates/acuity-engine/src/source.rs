//! Observation sources: where classifier frames come from.
//!
//! The face classifier runs on its own callback thread at frame rate. It must
//! never wait on the engine, so frames go through [`ObservationFeed::offer`],
//! which enqueues without blocking and drops the frame if the queue is full.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use acuity_types::{FaceSample, FrameSample};
use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::engine::EngineEvent;
use crate::error::SourceError;

/// A producer of classifier frames.
#[async_trait]
pub trait ObservationSource: Send + 'static {
    /// Start delivering frames into `feed`.
    async fn start(&mut self, feed: ObservationFeed) -> Result<(), SourceError>;

    /// Stop delivering frames and release the camera pipeline.
    async fn shutdown(&mut self) -> Result<(), SourceError>;
}

/// Non-blocking hand-off from the classifier thread to the event loop.
#[derive(Clone)]
pub struct ObservationFeed {
    tx: mpsc::Sender<EngineEvent>,
    dropped: Arc<AtomicU64>,
}

impl ObservationFeed {
    pub(crate) fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Enqueue a frame. Returns `false` if it was dropped because the queue
    /// is full or the engine has stopped. Safe to call from any thread.
    pub fn offer(&self, frame: FrameSample) -> bool {
        match self.tx.try_send(EngineEvent::Frame(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(dropped, "event queue full, frame dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Frames dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the engine has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Source for classifiers that push frames from a callback.
///
/// [`CallbackSource::new`] returns the source (given to the engine) and a
/// [`FrameCallback`] (registered with the camera pipeline). Frames offered
/// before the engine starts the source, or after it shuts down, are dropped.
pub struct CallbackSource {
    slot: Arc<Mutex<Option<ObservationFeed>>>,
}

impl CallbackSource {
    pub fn new() -> (Self, FrameCallback) {
        let slot = Arc::new(Mutex::new(None));
        (
            Self {
                slot: Arc::clone(&slot),
            },
            FrameCallback { slot },
        )
    }
}

#[async_trait]
impl ObservationSource for CallbackSource {
    async fn start(&mut self, feed: ObservationFeed) -> Result<(), SourceError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(SourceError::AlreadyStarted);
        }
        *slot = Some(feed);
        debug!("callback source started");
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), SourceError> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!("callback source stopped");
        Ok(())
    }
}

/// Cloneable, thread-safe frame callback.
#[derive(Clone)]
pub struct FrameCallback {
    slot: Arc<Mutex<Option<ObservationFeed>>>,
}

impl FrameCallback {
    /// Deliver one frame. Never blocks on the engine.
    pub fn on_frame(&self, faces: Vec<FaceSample>, timestamp: Instant) -> bool {
        let feed = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        feed.is_some_and(|feed| feed.offer(FrameSample::new(faces, timestamp)))
    }
}
