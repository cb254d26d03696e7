//! Capture → decode → classify → sink wiring.
//!
//! The capture worker hands frames to a bounded queue; a single dispatcher
//! task drains it, decodes and classifies each frame and passes the record
//! to the sink. Stopping capture closes the queue and waits for the
//! dispatcher to finish what was already queued.

use crate::classifier::Classifier;
use crate::config::{BackpressurePolicy, PipelineConfig};
use crate::sink::RecordSink;
use packetlens_ingest::{decode, decode_file, CaptureError, CaptureSession, RawFrame, StartOutcome};
use packetlens_storage::ClassifiedRecord;
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Errors that can occur in the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Pipeline task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        PipelineError::Task(e.to_string())
    }
}

/// Snapshot of pipeline activity.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub capturing: bool,
    pub interface: Option<String>,
    /// Frames handed over by the capture worker, including dropped ones
    pub packets_captured: u64,
    /// Frames decoded and classified
    pub packets_analyzed: u64,
    /// Frames discarded because the queue was full
    pub packets_dropped: u64,
    pub decode_errors: u64,
    pub store_failures: u64,
    pub last_error: Option<String>,
}

/// Outcome of replaying a capture file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub frames_read: u64,
    pub records_stored: u64,
    pub decode_errors: u64,
    pub store_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    captured: AtomicU64,
    analyzed: AtomicU64,
    dropped: AtomicU64,
    decode_errors: AtomicU64,
    store_failures: AtomicU64,
}

enum Dispatched {
    Stored { decoded: bool },
    Rejected { decoded: bool },
}

/// Decode, classify and forward one frame at a time.
#[derive(Clone)]
struct Dispatcher {
    classifier: Arc<Classifier>,
    sink: Arc<dyn RecordSink>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    async fn process(&self, frame: RawFrame) -> Dispatched {
        let packet = decode(&frame.data);
        let decoded = packet.is_decoded();
        if !decoded {
            self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("pipeline.decode.errors").increment(1);
            debug!(
                sequence = frame.sequence,
                reason = packet.decode_error.as_deref().unwrap_or_default(),
                "Frame could not be decoded"
            );
        }

        let label = self.classifier.classify(&packet);
        self.counters.analyzed.fetch_add(1, Ordering::Relaxed);

        let record = ClassifiedRecord::new(packet, label.as_str()).with_captured_at(frame.captured_at);
        match self.sink.accept(record).await {
            Ok(stored) => {
                metrics::counter!("pipeline.records.stored").increment(1);
                debug!(id = stored.id, label = %label, "Record stored");
                Dispatched::Stored { decoded }
            }
            Err(e) => {
                self.counters.store_failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("pipeline.store.failures").increment(1);
                warn!(sequence = frame.sequence, error = %e, "Failed to store record");
                Dispatched::Rejected { decoded }
            }
        }
    }

    async fn run(self, mut input: mpsc::Receiver<RawFrame>) {
        debug!("Dispatcher started");
        while let Some(frame) = input.recv().await {
            self.process(frame).await;
        }
        debug!("Dispatcher drained");
    }
}

/// Owns the capture session and routes its frames to the sink.
pub struct Pipeline {
    session: Arc<CaptureSession>,
    dispatcher: Dispatcher,
    settings: PipelineConfig,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(
        session: CaptureSession,
        classifier: Classifier,
        sink: Arc<dyn RecordSink>,
        settings: PipelineConfig,
    ) -> Self {
        Self {
            session: Arc::new(session),
            dispatcher: Dispatcher {
                classifier: Arc::new(classifier),
                sink,
                counters: Arc::new(Counters::default()),
            },
            settings,
            dispatch_task: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &PipelineConfig {
        &self.settings
    }

    pub fn classifier(&self) -> &Classifier {
        &self.dispatcher.classifier
    }

    /// Start live capture on `interface`.
    ///
    /// Starting again on the interface already being captured is a no-op.
    #[instrument(skip(self))]
    pub async fn start_capture(&self, interface: &str) -> Result<StartOutcome, PipelineError> {
        let mut task = self.dispatch_task.lock().await;

        let (tx, rx) = mpsc::channel(self.settings.queue_size);
        let outcome = self.session.start(interface, self.frame_handler(tx))?;

        if outcome == StartOutcome::Started {
            // The previous run's worker is gone, so its queue is closed
            if let Some(previous) = task.take() {
                previous.await?;
            }
            *task = Some(tokio::spawn(self.dispatcher.clone().run(rx)));
            info!(
                interface = %interface,
                queue_size = self.settings.queue_size,
                backpressure = self.settings.backpressure.as_str(),
                "Pipeline capturing"
            );
        }

        Ok(outcome)
    }

    /// Stop live capture and wait for queued frames to be processed.
    ///
    /// Returns `false` if nothing was capturing.
    #[instrument(skip(self))]
    pub async fn stop_capture(&self) -> Result<bool, PipelineError> {
        let mut task = self.dispatch_task.lock().await;

        let session = self.session.clone();
        let stopped = tokio::task::spawn_blocking(move || session.stop()).await?;

        if let Some(handle) = task.take() {
            handle.await?;
        }

        if stopped {
            info!("Pipeline capture stopped");
        }
        Ok(stopped)
    }

    /// Replay a capture file through the decode/classify/sink path.
    ///
    /// The file is checked in a first pass before any record is produced,
    /// so an unreadable or truncated file leaves no records behind. The
    /// second pass streams frames through a bounded queue.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn replay_file(&self, path: impl AsRef<Path>) -> Result<ReplaySummary, PipelineError> {
        let path = path.as_ref().to_path_buf();

        let checked = path.clone();
        let frames_read =
            tokio::task::spawn_blocking(move || decode_file(&checked, |_| {})).await??;

        let (tx, mut rx) = mpsc::channel(self.settings.queue_size);
        let reader = tokio::task::spawn_blocking(move || {
            decode_file(&path, |frame| {
                // Only fails once the receiver is gone
                let _ = tx.blocking_send(frame);
            })
        });

        let mut summary = ReplaySummary {
            frames_read,
            ..Default::default()
        };

        while let Some(frame) = rx.recv().await {
            match self.dispatcher.process(frame).await {
                Dispatched::Stored { decoded } => {
                    summary.records_stored += 1;
                    summary.decode_errors += u64::from(!decoded);
                }
                Dispatched::Rejected { decoded } => {
                    summary.store_failures += 1;
                    summary.decode_errors += u64::from(!decoded);
                }
            }
        }
        reader.await??;

        info!(
            frames = summary.frames_read,
            stored = summary.records_stored,
            decode_errors = summary.decode_errors,
            "Capture file replayed"
        );
        Ok(summary)
    }

    pub fn status(&self) -> PipelineStatus {
        let session = self.session.status();
        let counters = &self.dispatcher.counters;
        PipelineStatus {
            capturing: session.is_capturing(),
            interface: session.interface,
            packets_captured: counters.captured.load(Ordering::Relaxed),
            packets_analyzed: counters.analyzed.load(Ordering::Relaxed),
            packets_dropped: counters.dropped.load(Ordering::Relaxed),
            decode_errors: counters.decode_errors.load(Ordering::Relaxed),
            store_failures: counters.store_failures.load(Ordering::Relaxed),
            last_error: session.last_error,
        }
    }

    /// Callback run on the capture worker for every frame.
    fn frame_handler(&self, tx: mpsc::Sender<RawFrame>) -> impl FnMut(RawFrame) + Send + 'static {
        let counters = self.dispatcher.counters.clone();
        let policy = self.settings.backpressure;

        move |frame| {
            counters.captured.fetch_add(1, Ordering::Relaxed);
            match policy {
                BackpressurePolicy::Drop => match tx.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(frame)) => {
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("capture.frames.dropped").increment(1);
                        debug!(sequence = frame.sequence, "Frame dropped due to backpressure");
                    }
                    Err(TrySendError::Closed(_)) => {}
                },
                BackpressurePolicy::Block => {
                    // Only fails once the dispatcher is gone
                    let _ = tx.blocking_send(frame);
                }
            }
        }
    }
}
