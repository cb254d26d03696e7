//! Capture session lifecycle.
//!
//! A session owns at most one open frame source and one worker thread that
//! polls it. State moves Idle -> Capturing -> Idle; `start` and `stop` are
//! serialized by a single mutex so a stop is linearizable with a later start.

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::source::{FrameSource, LiveOpener, RawFrame, SourceOpener};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, info, warn};

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    Idle,
    Capturing,
}

/// Result of a successful `start` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new worker was spawned
    Started,
    /// The session was already capturing on the requested interface
    AlreadyCapturing,
}

/// Counters for the current (or most recent) capture run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SessionStats {
    pub frames_captured: u64,
    pub bytes_captured: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_frame_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: CaptureState,
    pub interface: Option<String>,
    pub stats: SessionStats,
    pub last_error: Option<String>,
}

impl SessionStatus {
    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }
}

#[derive(Debug)]
struct Shared {
    state: CaptureState,
    interface: Option<String>,
    stats: SessionStats,
    last_error: Option<String>,
    worker_thread: Option<ThreadId>,
}

impl Default for Shared {
    fn default() -> Self {
        Self {
            state: CaptureState::Idle,
            interface: None,
            stats: SessionStats::default(),
            last_error: None,
            worker_thread: None,
        }
    }
}

/// Live capture session.
pub struct CaptureSession {
    config: CaptureConfig,
    opener: Arc<dyn SourceOpener>,
    shared: Arc<RwLock<Shared>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureSession {
    /// Create a session that captures from live interfaces.
    pub fn new(config: CaptureConfig) -> Self {
        Self::with_opener(config, Arc::new(LiveOpener))
    }

    /// Create a session that opens sources through `opener`.
    pub fn with_opener(config: CaptureConfig, opener: Arc<dyn SourceOpener>) -> Self {
        Self {
            config,
            opener,
            shared: Arc::new(RwLock::new(Shared::default())),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> CaptureState {
        self.shared.read().state
    }

    pub fn is_capturing(&self) -> bool {
        self.state() == CaptureState::Capturing
    }

    pub fn status(&self) -> SessionStatus {
        let shared = self.shared.read();
        SessionStatus {
            state: shared.state,
            interface: shared.interface.clone(),
            stats: shared.stats.clone(),
            last_error: shared.last_error.clone(),
        }
    }

    /// Start capturing on `interface`, invoking `on_frame` on the worker
    /// thread for every frame.
    ///
    /// Returns as soon as the worker is spawned. Starting again on the same
    /// interface is a no-op; starting on another one fails with
    /// [`CaptureError::SessionBusy`].
    pub fn start<F>(&self, interface: &str, on_frame: F) -> Result<StartOutcome, CaptureError>
    where
        F: FnMut(RawFrame) + Send + 'static,
    {
        let mut worker = self.worker.lock();

        // Reap a worker that exited on its own (poll error or self-stop)
        if let Some(handle) = worker.take() {
            if self.running.load(Ordering::SeqCst) && !handle.is_finished() {
                let active = self.shared.read().interface.clone().unwrap_or_default();
                *worker = Some(handle);
                if active == interface {
                    debug!(interface = %interface, "Capture already running");
                    return Ok(StartOutcome::AlreadyCapturing);
                }
                return Err(CaptureError::SessionBusy {
                    active,
                    requested: interface.to_string(),
                });
            }
            self.running.store(false, Ordering::SeqCst);
            join_worker(handle);
        }

        let source = self.opener.open(interface, &self.config).map_err(|e| {
            warn!(interface = %interface, error = %e, "Failed to open capture source");
            e
        })?;

        {
            let mut shared = self.shared.write();
            shared.state = CaptureState::Capturing;
            shared.interface = Some(interface.to_string());
            shared.stats = SessionStats {
                started_at: Some(Utc::now()),
                ..Default::default()
            };
            shared.last_error = None;
            shared.worker_thread = None;
        }
        self.running.store(true, Ordering::SeqCst);

        let shared = self.shared.clone();
        let running = self.running.clone();
        let name = interface.to_string();

        let spawned = thread::Builder::new()
            .name(format!("capture-{interface}"))
            .spawn(move || run_worker(name, source, on_frame, shared, running));

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                info!(interface = %interface, "Capture started");
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                let mut shared = self.shared.write();
                shared.state = CaptureState::Idle;
                shared.interface = None;
                Err(CaptureError::WorkerSpawn(e.to_string()))
            }
        }
    }

    /// Stop capturing. Returns `true` if a running capture was stopped.
    ///
    /// Safe to call when idle. When called from inside the frame callback
    /// the worker exits after the callback returns.
    pub fn stop(&self) -> bool {
        if self.shared.read().worker_thread == Some(thread::current().id()) {
            let was_running = self.running.swap(false, Ordering::SeqCst);
            debug!("Capture stop requested from worker thread");
            return was_running;
        }

        let mut worker = self.worker.lock();
        let was_running = self.running.swap(false, Ordering::SeqCst);

        let Some(handle) = worker.take() else {
            return false;
        };
        join_worker(handle);

        let mut shared = self.shared.write();
        shared.state = CaptureState::Idle;
        shared.interface = None;
        shared.worker_thread = None;

        if was_running {
            info!(
                frames = shared.stats.frames_captured,
                bytes = shared.stats.bytes_captured,
                "Capture stopped"
            );
        }
        was_running
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_worker(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("Capture worker panicked");
    }
}

fn run_worker<F>(
    interface: String,
    mut source: Box<dyn FrameSource>,
    mut on_frame: F,
    shared: Arc<RwLock<Shared>>,
    running: Arc<AtomicBool>,
) where
    F: FnMut(RawFrame),
{
    shared.write().worker_thread = Some(thread::current().id());
    debug!(interface = %interface, "Capture worker running");

    while running.load(Ordering::SeqCst) {
        match source.next_frame() {
            Ok(Some(frame)) => {
                {
                    let mut s = shared.write();
                    s.stats.frames_captured += 1;
                    s.stats.bytes_captured += frame.data.len() as u64;
                    s.stats.last_frame_at = Some(frame.captured_at);
                }
                metrics::counter!("capture.frames.captured").increment(1);
                on_frame(frame);
            }
            Ok(None) => continue,
            Err(e) => {
                error!(interface = %interface, error = %e, "Capture worker failed");
                shared.write().last_error = Some(e.to_string());
                break;
            }
        }
    }

    // Release the handle before reporting Idle. The callback goes too, while
    // this thread is still recognised as the worker.
    drop(source);
    drop(on_frame);
    running.store(false, Ordering::SeqCst);

    let mut s = shared.write();
    s.state = CaptureState::Idle;
    s.interface = None;
    s.worker_thread = None;
    debug!(interface = %interface, frames = s.stats.frames_captured, "Capture worker exited");
}
