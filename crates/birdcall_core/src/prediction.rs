//! Background prediction worker with last-request-wins delivery.

use crate::classifier::{Classifier, PredictionResult};
use crate::error::{Error, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Monotonic id of a prediction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

/// Delivered once per surviving request: the prediction or the reason it failed.
#[derive(Debug, Clone)]
pub struct PredictionEvent {
    pub request: RequestId,
    pub image_path: PathBuf,
    pub outcome: Result<PredictionResult>,
}

struct Job {
    id: RequestId,
    path: PathBuf,
}

/// Runs [`Classifier::predict`] on its own thread, one inference at a time.
///
/// Only the most recent request is ever reported. Queued requests that were
/// superseded are skipped, and results for a stale request are dropped.
///
/// The thread is detached: dropping the worker returns at once, and the thread
/// exits after finishing whatever inference it is running.
pub struct PredictionWorker {
    jobs: Sender<Job>,
    results: Receiver<PredictionEvent>,
    latest: Arc<AtomicU64>,
    current: Option<(RequestId, PathBuf)>,
}

impl PredictionWorker {
    pub fn spawn(classifier: Arc<Classifier>) -> Result<Self> {
        let (job_tx, job_rx) = channel::unbounded::<Job>();
        let (result_tx, result_rx) = channel::unbounded();
        let latest = Arc::new(AtomicU64::new(0));
        let worker_latest = latest.clone();
        std::thread::Builder::new()
            .name("prediction".into())
            .spawn(move || worker_loop(&classifier, &job_rx, &result_tx, &worker_latest))
            .map_err(|e| Error::Inference(format!("cannot start prediction worker: {e}")))?;
        Ok(Self {
            jobs: job_tx,
            results: result_rx,
            latest,
            current: None,
        })
    }

    /// Queue a prediction; any earlier request becomes stale.
    pub fn submit(&mut self, image_path: impl Into<PathBuf>) -> RequestId {
        let path = image_path.into();
        let id = RequestId(self.latest.fetch_add(1, Ordering::AcqRel) + 1);
        self.current = Some((id, path.clone()));
        if self.jobs.send(Job { id, path }).is_err() {
            warn!("Prediction worker is gone; request {id:?} dropped");
        }
        id
    }

    /// Image whose result the caller is waiting for.
    pub fn current_image(&self) -> Option<&Path> {
        self.current.as_ref().map(|(_, p)| p.as_path())
    }

    pub fn is_pending(&self) -> bool {
        self.current.is_some()
    }

    /// Non-blocking: the result for the current request, if it has arrived.
    pub fn try_recv(&mut self) -> Option<PredictionEvent> {
        while let Ok(event) = self.results.try_recv() {
            if let Some(event) = self.accept(event) {
                return Some(event);
            }
        }
        None
    }

    /// Block up to `timeout` for the current request's result.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<PredictionEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.results.recv_timeout(remaining) {
                Ok(event) => {
                    if let Some(event) = self.accept(event) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn accept(&mut self, event: PredictionEvent) -> Option<PredictionEvent> {
        match &self.current {
            Some((id, path)) if *id == event.request && *path == event.image_path => {
                self.current = None;
                Some(event)
            }
            _ => {
                debug!(
                    "Discarding stale prediction {:?} for {}",
                    event.request,
                    event.image_path.display()
                );
                None
            }
        }
    }
}

fn worker_loop(
    classifier: &Classifier,
    jobs: &Receiver<Job>,
    results: &Sender<PredictionEvent>,
    latest: &AtomicU64,
) {
    while let Ok(mut job) = jobs.recv() {
        while let Ok(newer) = jobs.try_recv() {
            debug!("Skipping superseded request {:?}", job.id);
            job = newer;
        }
        if job.id.0 != latest.load(Ordering::Acquire) {
            continue;
        }
        let outcome = classifier.predict(&job.path);
        if let Err(e) = &outcome {
            warn!("Prediction failed for {}: {e}", job.path.display());
        }
        if job.id.0 != latest.load(Ordering::Acquire) {
            debug!("Dropping result of superseded request {:?}", job.id);
            continue;
        }
        let event = PredictionEvent {
            request: job.id,
            image_path: job.path,
            outcome,
        };
        if results.send(event).is_err() {
            break;
        }
    }
}
