//! Frame-to-label pipeline.
//!
//! One camera produces frames; one worker thread consumes them. Between the two
//! sits a `LatestFrameSlot` holding at most one pending frame: a frame that
//! arrives while another is still pending replaces it. Nothing is queued.
//!
//! Per-frame failures are logged and the frame is dropped. The worker only
//! exits when the pipeline shuts down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use anyhow::{Context, Result};

use crate::classify::{Classification, Classifier};
use crate::display::DisplaySink;
use crate::error::PipelineError;
use crate::frame::RawFrame;
use crate::ingest::{normalize, CameraSource};

// ----------------------------------------------------------------------------
// LatestFrameSlot: keep-only-latest handoff
// ----------------------------------------------------------------------------

/// What happened to a submitted frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Slot was empty; the frame is now pending.
    Accepted,
    /// An older pending frame was discarded in favour of this one.
    Replaced,
    /// Pipeline is shut down; the frame was discarded.
    Closed,
}

struct SlotState {
    pending: Option<RawFrame>,
    closed: bool,
}

/// Single-frame mailbox between the camera callback and the worker.
pub struct LatestFrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make `frame` the pending frame, discarding any older one.
    pub fn put(&self, frame: RawFrame) -> SubmitOutcome {
        let mut state = self.lock();
        if state.closed {
            return SubmitOutcome::Closed;
        }
        let displaced = state.pending.replace(frame);
        drop(state);
        self.ready.notify_one();
        match displaced {
            Some(_) => SubmitOutcome::Replaced,
            None => SubmitOutcome::Accepted,
        }
    }

    /// Block until a frame is pending, then take it. `None` once closed.
    pub fn take(&self) -> Option<RawFrame> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(frame) = state.pending.take() {
                return Some(frame);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Reject further frames, discard the pending one and wake the worker.
    ///
    /// Returns true if a pending frame was discarded.
    pub fn close(&self) -> bool {
        let pending = {
            let mut state = self.lock();
            state.closed = true;
            state.pending.take()
        };
        self.ready.notify_all();
        pending.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }
}

impl Default for LatestFrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Counters
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    dropped: AtomicU64,
    classified: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames handed to the pipeline.
    pub frames_received: u64,
    /// Frames discarded by keep-only-latest or after shutdown.
    pub frames_dropped: u64,
    /// Frames that produced a label.
    pub frames_classified: u64,
    /// Frames skipped because normalization or inference failed.
    pub frames_failed: u64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames_received: self.received.load(Ordering::Relaxed),
            frames_dropped: self.dropped.load(Ordering::Relaxed),
            frames_classified: self.classified.load(Ordering::Relaxed),
            frames_failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

// ----------------------------------------------------------------------------
// FrameSubmitter: camera-facing handle
// ----------------------------------------------------------------------------

/// Cloneable handle a camera callback uses to hand frames to the pipeline.
#[derive(Clone)]
pub struct FrameSubmitter {
    slot: Arc<LatestFrameSlot>,
    counters: Arc<Counters>,
}

impl FrameSubmitter {
    pub fn submit(&self, frame: RawFrame) -> SubmitOutcome {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let outcome = self.slot.put(frame);
        match outcome {
            SubmitOutcome::Accepted => {}
            SubmitOutcome::Replaced => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                log::trace!("worker busy; replaced pending frame");
            }
            SubmitOutcome::Closed => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
        outcome
    }
}

// ----------------------------------------------------------------------------
// Pipeline
// ----------------------------------------------------------------------------

/// Owns the classifier worker thread and, once attached, the camera.
pub struct Pipeline {
    slot: Arc<LatestFrameSlot>,
    counters: Arc<Counters>,
    worker: Option<JoinHandle<()>>,
    camera: Option<Box<dyn CameraSource>>,
}

impl Pipeline {
    /// Start the worker. Results go to `display` as `"Result: <label>"`.
    pub fn spawn(classifier: Classifier, display: Arc<dyn DisplaySink>) -> Result<Self> {
        let slot = Arc::new(LatestFrameSlot::new());
        let counters = Arc::new(Counters::default());

        let worker_slot = slot.clone();
        let worker_counters = counters.clone();
        let worker = std::thread::Builder::new()
            .name("classifier-worker".to_string())
            .spawn(move || run_worker(&worker_slot, &worker_counters, &classifier, &*display))
            .context("failed to spawn classifier worker")?;

        Ok(Self {
            slot,
            counters,
            worker: Some(worker),
            camera: None,
        })
    }

    pub fn submitter(&self) -> FrameSubmitter {
        FrameSubmitter {
            slot: self.slot.clone(),
            counters: self.counters.clone(),
        }
    }

    /// Start `camera` with a callback feeding this pipeline.
    ///
    /// On `PermissionDenied` (or any other start failure) no frame ever
    /// reaches the worker and the display keeps whatever it showed before.
    pub fn attach_camera(&mut self, mut camera: Box<dyn CameraSource>) -> Result<(), PipelineError> {
        if self.camera.is_some() {
            return Err(PipelineError::Camera("a camera is already attached".into()));
        }
        let submitter = self.submitter();
        camera.start(Box::new(move |frame| {
            submitter.submit(frame);
        }))?;
        log::info!("pipeline attached to camera {}", camera.name());
        self.camera = Some(camera);
        Ok(())
    }

    pub fn camera_running(&self) -> bool {
        self.camera.as_ref().is_some_and(|c| c.is_running())
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Stop the camera, discard any pending frame and join the worker.
    pub fn shutdown(mut self) -> PipelineStats {
        self.stop();
        self.stats()
    }

    fn stop(&mut self) {
        if let Some(mut camera) = self.camera.take() {
            if let Err(e) = camera.stop() {
                log::warn!("failed to stop camera {}: {}", camera.name(), e);
            }
        }
        if self.slot.close() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            log::debug!("discarded pending frame at shutdown");
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("classifier worker panicked");
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Normalize one frame and classify it.
pub fn process_frame(
    classifier: &Classifier,
    frame: RawFrame,
) -> Result<Classification, PipelineError> {
    let tensor = normalize(frame)?;
    classifier.classify(&tensor)
}

fn run_worker(
    slot: &LatestFrameSlot,
    counters: &Counters,
    classifier: &Classifier,
    display: &dyn DisplaySink,
) {
    log::info!(
        "classifier worker started (backend={}, threshold={:.2})",
        classifier.backend_name(),
        classifier.threshold()
    );
    while let Some(frame) = slot.take() {
        let age_ms = frame.age_ms();
        match process_frame(classifier, frame) {
            Ok(classification) => {
                counters.classified.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "frame classified as {} (confidence {:.3}, waited {} ms)",
                    classification.label,
                    classification.confidence,
                    age_ms
                );
                display.post(crate::format_result(classification.label));
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("frame dropped: {}", e);
            }
        }
    }
    log::info!("classifier worker stopped");
}
