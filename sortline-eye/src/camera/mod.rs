//! Frame acquisition
//!
//! A [`FrameSource`] owns one capture device and a dedicated acquisition
//! thread that keeps only the newest frame in a [`FrameSlot`]. Consumers read
//! the slot at their own pace and never block on the producer.

#[cfg(feature = "opencv")]
pub mod videoio;

pub use crate::config::{CameraControls, CaptureOptions};

use crate::error::VisionError;
use crate::frame::{Frame, FrameReader, FrameSlot, SlotRead};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Where frames come from. Interpretation is left to the capture backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceId {
    /// Local capture device index
    Device(u32),
    /// Video file or image sequence on disk
    Path(PathBuf),
    /// Network stream URI (RTSP, HTTP, ...)
    Stream(String),
}

impl SourceId {
    pub fn parse(raw: &str) -> Result<Self, VisionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(VisionError::Config("Frame source must not be empty".to_string()));
        }
        if raw.chars().all(|c| c.is_ascii_digit()) {
            return raw
                .parse()
                .map(SourceId::Device)
                .map_err(|_| VisionError::Config(format!("Device index out of range: {}", raw)));
        }
        if raw.contains("://") {
            return Ok(SourceId::Stream(raw.to_string()));
        }
        Ok(SourceId::Path(PathBuf::from(raw)))
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Device(index) => write!(f, "device {}", index),
            SourceId::Path(path) => write!(f, "{}", path.display()),
            SourceId::Stream(uri) => write!(f, "{}", uri),
        }
    }
}

/// An opened capture device, driven exclusively by the acquisition thread.
pub trait CaptureDevice: Send {
    /// Capture the next frame. Errors are treated as transient.
    fn grab(&mut self) -> Result<Frame, VisionError>;

    /// Reopen the underlying device after a streak of failures.
    fn reconnect(&mut self) -> Result<(), VisionError> {
        Ok(())
    }

    /// Release the device. Called once when the acquisition loop exits.
    fn release(&mut self);
}

/// Opens capture devices for a [`SourceId`].
pub trait CaptureBackend: Send + Sync {
    fn open(&self, source: &SourceId, options: &CaptureOptions) -> Result<Box<dyn CaptureDevice>, VisionError>;
}

/// Counters maintained by the acquisition thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub capture_failures: u64,
    pub reconnects: u64,
}

#[derive(Debug, Default)]
struct CaptureCounters {
    frames_captured: AtomicU64,
    capture_failures: AtomicU64,
    reconnects: AtomicU64,
}

impl CaptureCounters {
    fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Created,
    Running,
    Stopped,
}

struct Worker {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
    wake: Sender<()>,
}

/// Background frame producer with a latest-frame-only hand-off.
pub struct FrameSource {
    source: SourceId,
    options: CaptureOptions,
    backend: Arc<dyn CaptureBackend>,
    slot: Arc<FrameSlot>,
    counters: Arc<CaptureCounters>,
    worker: Option<Worker>,
    state: SourceState,
}

impl FrameSource {
    /// Create a frame source. Nothing is opened until [`FrameSource::start`].
    pub fn new(source: &str, options: CaptureOptions, backend: Arc<dyn CaptureBackend>) -> Result<Self, VisionError> {
        options.validate().map_err(VisionError::Config)?;
        Ok(Self {
            source: SourceId::parse(source)?,
            options,
            backend,
            slot: Arc::new(FrameSlot::new()),
            counters: Arc::new(CaptureCounters::default()),
            worker: None,
            state: SourceState::Created,
        })
    }

    /// Create a frame source backed by OpenCV's video I/O.
    #[cfg(feature = "opencv")]
    pub fn with_opencv(source: &str, options: CaptureOptions) -> Result<Self, VisionError> {
        Self::new(source, options, Arc::new(videoio::OpenCvBackend))
    }

    /// Open the device and spawn the acquisition thread.
    pub fn start(&mut self) -> Result<(), VisionError> {
        match self.state {
            SourceState::Running => {
                return Err(VisionError::Capture("Frame source already running".to_string()));
            }
            SourceState::Stopped => {
                return Err(VisionError::Capture("Frame source was stopped".to_string()));
            }
            SourceState::Created => {}
        }

        let device = self.backend.open(&self.source, &self.options).map_err(|e| match e {
            VisionError::SourceUnavailable(msg) => VisionError::SourceUnavailable(msg),
            other => VisionError::SourceUnavailable(format!("{}: {}", self.source, other)),
        })?;
        info!("Capture device opened: {} (buffer size {})", self.source, self.options.buffer_size);

        let stop = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = bounded(1);
        let context = AcquisitionContext {
            slot: Arc::clone(&self.slot),
            counters: Arc::clone(&self.counters),
            options: self.options.clone(),
            stop: Arc::clone(&stop),
            wake: wake_rx,
        };

        let handle = thread::Builder::new()
            .name("frame-acquisition".to_string())
            .spawn(move || context.run(device))
            .map_err(|e| VisionError::SourceUnavailable(format!("Failed to spawn acquisition thread: {}", e)))?;

        self.worker = Some(Worker {
            handle,
            stop,
            wake: wake_tx,
        });
        self.state = SourceState::Running;
        info!("Frame acquisition started for {}", self.source);
        Ok(())
    }

    /// Latest frame, "not ready" or "closed". Never blocks on the producer.
    pub fn read(&self) -> SlotRead {
        self.slot.read()
    }

    /// Read handle for a consumer on another thread.
    pub fn reader(&self) -> FrameReader {
        FrameReader::new(Arc::clone(&self.slot))
    }

    /// Stop the acquisition thread, join it and release the device. Idempotent.
    pub fn stop(&mut self) {
        if self.state == SourceState::Stopped {
            return;
        }

        // Close first so no frame newer than the current one becomes visible.
        self.slot.close();

        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Release);
            let _ = worker.wake.try_send(());
            if worker.handle.join().is_err() {
                error!("Frame acquisition thread panicked");
            }
        }

        self.state = SourceState::Stopped;
        info!("Frame source stopped: {}", self.source);
    }

    pub fn is_running(&self) -> bool {
        self.state == SourceState::Running
    }

    pub fn source(&self) -> &SourceId {
        &self.source
    }

    pub fn stats(&self) -> CaptureStats {
        self.counters.snapshot()
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

struct AcquisitionContext {
    slot: Arc<FrameSlot>,
    counters: Arc<CaptureCounters>,
    options: CaptureOptions,
    stop: Arc<AtomicBool>,
    wake: Receiver<()>,
}

impl AcquisitionContext {
    fn run(self, mut device: Box<dyn CaptureDevice>) {
        let mut failures: u32 = 0;

        while !self.stop.load(Ordering::Acquire) {
            match device.grab() {
                Ok(frame) => {
                    if failures > 0 {
                        info!("Capture recovered after {} failed attempts", failures);
                        failures = 0;
                    }
                    self.counters.frames_captured.fetch_add(1, Ordering::Relaxed);
                    if self.slot.publish(frame).is_none() {
                        break;
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    self.counters.capture_failures.fetch_add(1, Ordering::Relaxed);
                    if failures == 1 || failures % 100 == 0 {
                        warn!("Capture failed ({} in a row): {}", failures, e);
                    } else {
                        debug!("Capture failed ({} in a row): {}", failures, e);
                    }

                    let reconnect_after = self.options.reconnect_after;
                    if reconnect_after > 0 && failures % reconnect_after == 0 {
                        self.counters.reconnects.fetch_add(1, Ordering::Relaxed);
                        match device.reconnect() {
                            Ok(()) => info!("Capture device reopened"),
                            Err(e) => warn!("Failed to reopen capture device: {}", e),
                        }
                    }

                    match self.wake.recv_timeout(self.options.backoff(failures)) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            }
        }

        device.release();
        info!("Frame acquisition stopped");
    }
}
