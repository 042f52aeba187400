//! Bounded delivery queue feeding a fixed pool of workers.
//!
//! ```text
//! submit() ──try_send──> [bounded mpsc] ──> dispatcher ──permit──> worker
//!    │ full                                                          │
//!    └──> local persist                 encode JPEG ─> POST ─fail─> persist
//! ```
//!
//! `submit` never awaits network I/O. Each job reaches exactly one terminal
//! outcome, which is counted and published to the optional observer.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use lanewatch_models::{TrackId, TrafficEvent};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError, UnboundedSender};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::{build_payload, EventSender};
use crate::config::{DeliveryConfig, OverflowPolicy};
use crate::error::{DeliveryError, DeliveryResult};
use crate::fallback::FallbackStore;
use crate::metrics;
use crate::snapshot::Snapshot;

/// One captured event on its way to the ingestion service.
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub id: Uuid,
    pub event: TrafficEvent,
    pub snapshot: Snapshot,
}

impl DeliveryJob {
    pub fn new(event: TrafficEvent, snapshot: Snapshot) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            snapshot,
        }
    }
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the ingestion service.
    Delivered,
    /// Written to local fallback storage; holds the data file path.
    PersistedLocally(PathBuf),
    /// The local write failed too. Holds the error message.
    Lost(String),
}

impl DeliveryOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::PersistedLocally(_) => "persisted",
            DeliveryOutcome::Lost(_) => "lost",
        }
    }
}

/// Published once per job when it reaches its terminal outcome.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub job_id: Uuid,
    pub track_id: TrackId,
    pub outcome: DeliveryOutcome,
}

/// Immediate result of [`JobSink::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accepted into the delivery queue.
    Queued,
    /// Queue was full; the job goes straight to local storage.
    OverflowPersisted,
    /// The pipeline is shut down; the job was dropped.
    Closed,
}

/// Counts of terminal outcomes so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub persisted: u64,
    pub lost: u64,
}

impl DeliveryStats {
    pub fn total(&self) -> u64 {
        self.delivered + self.persisted + self.lost
    }
}

/// Where the frame loop hands captured jobs.
///
/// Implementations must not block on network I/O.
pub trait JobSink: Send + Sync {
    fn submit(&self, job: DeliveryJob) -> SubmitOutcome;
}

/// State shared by the dispatcher, workers and overflow tasks.
struct Shared {
    sender: Arc<dyn EventSender>,
    store: FallbackStore,
    observer: Option<UnboundedSender<DeliveryReport>>,
    delivered: AtomicU64,
    persisted: AtomicU64,
    lost: AtomicU64,
}

impl Shared {
    /// Full worker path: encode, send, fall back to local storage.
    async fn deliver(&self, job: DeliveryJob) {
        let started = Instant::now();
        let DeliveryJob { id, event, snapshot } = job;

        let outcome = match encode(snapshot).await {
            Ok(jpeg) => match self.sender.send(&build_payload(&event, &jpeg)).await {
                Ok(()) => DeliveryOutcome::Delivered,
                Err(e) => {
                    warn!(
                        job_id = %id,
                        track_id = %event.track_id,
                        error = %e,
                        "Remote delivery failed, storing locally"
                    );
                    self.persist(&event, &jpeg).await
                }
            },
            Err(e) => {
                warn!(job_id = %id, track_id = %event.track_id, error = %e, "Snapshot encoding failed");
                self.persist(&event, &[]).await
            }
        };

        self.finish(id, event.track_id, outcome, started);
    }

    /// Overflow path: no remote attempt.
    async fn store_only(&self, job: DeliveryJob) {
        let started = Instant::now();
        let DeliveryJob { id, event, snapshot } = job;

        let jpeg = encode(snapshot).await.unwrap_or_else(|e| {
            warn!(job_id = %id, error = %e, "Snapshot encoding failed");
            Vec::new()
        });
        let outcome = self.persist(&event, &jpeg).await;
        self.finish(id, event.track_id, outcome, started);
    }

    async fn persist(&self, event: &TrafficEvent, jpeg: &[u8]) -> DeliveryOutcome {
        match self.store.persist(event, jpeg).await {
            Ok(record) => DeliveryOutcome::PersistedLocally(record.data_path),
            Err(e) => {
                error!(
                    track_id = %event.track_id,
                    error = %e,
                    "Fallback write failed, event lost"
                );
                metrics::record_persist_failure();
                DeliveryOutcome::Lost(e.to_string())
            }
        }
    }

    fn finish(&self, job_id: Uuid, track_id: TrackId, outcome: DeliveryOutcome, started: Instant) {
        let counter = match outcome {
            DeliveryOutcome::Delivered => &self.delivered,
            DeliveryOutcome::PersistedLocally(_) => &self.persisted,
            DeliveryOutcome::Lost(_) => &self.lost,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::record_outcome(outcome.label(), started.elapsed());

        debug!(job_id = %job_id, track_id = %track_id, outcome = outcome.label(), "Job finished");

        if let Some(observer) = &self.observer {
            // Receiver may be gone; reports are best effort.
            let _ = observer.send(DeliveryReport {
                job_id,
                track_id,
                outcome,
            });
        }
    }

    fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
        }
    }
}

/// Encode raw crops on the blocking pool.
async fn encode(snapshot: Snapshot) -> DeliveryResult<Vec<u8>> {
    match snapshot {
        Snapshot::Jpeg(bytes) => Ok(bytes),
        raw @ Snapshot::Raw(_) => tokio::task::spawn_blocking(move || raw.to_jpeg())
            .await
            .map_err(|e| DeliveryError::snapshot(format!("encoder task failed: {e}")))?,
    }
}

/// Asynchronous delivery pipeline.
pub struct DeliveryPipeline {
    config: DeliveryConfig,
    shared: Arc<Shared>,
    tx: Mutex<Option<mpsc::Sender<DeliveryJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    overflow_tasks: Mutex<JoinSet<()>>,
    runtime: Handle,
}

impl DeliveryPipeline {
    /// Start the dispatcher.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(config: DeliveryConfig, sender: Arc<dyn EventSender>, store: FallbackStore) -> Self {
        Self::spawn(config, sender, store, None)
    }

    /// Start the dispatcher and publish every terminal outcome to `observer`.
    pub fn start_with_observer(
        config: DeliveryConfig,
        sender: Arc<dyn EventSender>,
        store: FallbackStore,
        observer: UnboundedSender<DeliveryReport>,
    ) -> Self {
        Self::spawn(config, sender, store, Some(observer))
    }

    fn spawn(
        config: DeliveryConfig,
        sender: Arc<dyn EventSender>,
        store: FallbackStore,
        observer: Option<UnboundedSender<DeliveryReport>>,
    ) -> Self {
        let runtime = Handle::current();
        let workers = config.workers.max(1);
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        let shared = Arc::new(Shared {
            sender,
            store,
            observer,
            delivered: AtomicU64::new(0),
            persisted: AtomicU64::new(0),
            lost: AtomicU64::new(0),
        });

        info!(
            "Starting delivery pipeline with {} workers, queue capacity {}",
            workers, config.queue_capacity
        );

        let dispatcher = runtime.spawn(dispatch(rx, Arc::clone(&shared), Arc::new(Semaphore::new(workers))));

        Self {
            config,
            shared,
            tx: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
            overflow_tasks: Mutex::new(JoinSet::new()),
            runtime,
        }
    }

    /// Terminal outcome counts so far.
    pub fn stats(&self) -> DeliveryStats {
        self.shared.stats()
    }

    fn divert(&self, job: DeliveryJob) -> SubmitOutcome {
        metrics::record_overflow();
        warn!(
            job_id = %job.id,
            track_id = %job.event.track_id,
            "Delivery queue full, storing job locally"
        );

        let shared = Arc::clone(&self.shared);
        let mut tasks = lock(&self.overflow_tasks);
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(async move { shared.store_only(job).await }, &self.runtime);
        SubmitOutcome::OverflowPersisted
    }

    /// Close the queue, drain queued and in-flight jobs, and return the
    /// final counts. Draining is bounded by the configured shutdown timeout.
    pub async fn shutdown(&self) -> DeliveryStats {
        // Dropping the sender ends the dispatcher once the queue is empty.
        drop(lock(&self.tx).take());

        let dispatcher = lock(&self.dispatcher).take();
        let mut overflow = std::mem::take(&mut *lock(&self.overflow_tasks));

        let drain = async move {
            if let Some(handle) = dispatcher {
                if let Err(e) = handle.await {
                    error!("Delivery dispatcher failed: {}", e);
                }
            }
            while overflow.join_next().await.is_some() {}
        };

        if tokio::time::timeout(self.config.shutdown_timeout, drain).await.is_err() {
            warn!(
                "Delivery shutdown timed out after {:?}, abandoning in-flight jobs",
                self.config.shutdown_timeout
            );
        }

        let stats = self.stats();
        info!(
            delivered = stats.delivered,
            persisted = stats.persisted,
            lost = stats.lost,
            "Delivery pipeline stopped"
        );
        stats
    }
}

impl JobSink for DeliveryPipeline {
    fn submit(&self, job: DeliveryJob) -> SubmitOutcome {
        let Some(tx) = lock(&self.tx).clone() else {
            return SubmitOutcome::Closed;
        };

        match tx.try_send(job) {
            Ok(()) => SubmitOutcome::Queued,
            Err(TrySendError::Closed(_)) => SubmitOutcome::Closed,
            Err(TrySendError::Full(job)) => match self.config.overflow {
                OverflowPolicy::Fallback => self.divert(job),
                // Must not be reached from an async task: blocking_send panics there.
                OverflowPolicy::Block => match tx.blocking_send(job) {
                    Ok(()) => SubmitOutcome::Queued,
                    Err(_) => SubmitOutcome::Closed,
                },
            },
        }
    }
}

async fn dispatch(mut rx: mpsc::Receiver<DeliveryJob>, shared: Arc<Shared>, semaphore: Arc<Semaphore>) {
    let mut workers = JoinSet::new();

    while let Some(job) = rx.recv().await {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            error!(job_id = %job.id, "Worker semaphore closed, dropping job");
            break;
        };

        let shared = Arc::clone(&shared);
        workers.spawn(async move {
            let _permit = permit;
            shared.deliver(job).await;
        });

        while let Some(result) = workers.try_join_next() {
            log_worker_exit(result);
        }
    }

    while let Some(result) = workers.join_next().await {
        log_worker_exit(result);
    }
}

fn log_worker_exit(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("Delivery worker panicked: {}", e);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
