//! Refresh scheduler and worker pool.
//!
//! A fixed number of workers drain one bounded work queue. Producers
//! (the start-up enqueue, the periodic sweep and the assignment path) only
//! ever push onto the queue. Each sweep tick removes orphaned sources and
//! re-enqueues every remaining one; a source that is already queued or
//! resolving is skipped, so at most one resolution per source is in flight.

mod failures;
mod queue;
mod worker;

pub use queue::PendingRefresh;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::feed::Resolver;
use crate::storage::{PostCache, Source, SourceId, SourceStore, StorageError};
use failures::FailureTracker;
use queue::WorkQueue;

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(600);
pub const DEFAULT_FAILURE_WARN_THRESHOLD: u32 = 5;
/// Sweep intervals are clamped to this range.
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Concurrent resolutions. Tests use 1 for determinism.
    pub workers: usize,
    pub queue_capacity: usize,
    pub sweep_interval: Duration,
    /// Consecutive failures after which a source is reported as failing.
    pub failure_warn_threshold: u32,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            failure_warn_threshold: DEFAULT_FAILURE_WARN_THRESHOLD,
        }
    }
}

/// Outcome notifications, one per finished cycle or sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    /// Title and posts were written.
    Resolved { source_id: SourceId, posts: usize },
    /// The resolver failed; nothing was written.
    ResolveFailed { source_id: SourceId, error: String },
    /// Resolution succeeded but a storage write did not.
    StoreFailed { source_id: SourceId, error: String },
    Swept { enqueued: usize, removed: u64 },
}

pub(crate) struct Shared {
    pub(crate) sources: Arc<dyn SourceStore>,
    pub(crate) posts: Arc<dyn PostCache>,
    pub(crate) resolver: Arc<dyn Resolver>,
    pub(crate) queue: WorkQueue,
    pub(crate) options: SchedulerOptions,
    pub(crate) failures: FailureTracker,
    events: broadcast::Sender<RefreshEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Shared {
    pub(crate) fn emit(&self, event: RefreshEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the refresh pipeline. Clones share the same pool and queue.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(
        sources: Arc<dyn SourceStore>,
        posts: Arc<dyn PostCache>,
        resolver: Arc<dyn Resolver>,
        options: SchedulerOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                sources,
                posts,
                resolver,
                queue: WorkQueue::new(options.queue_capacity),
                options,
                failures: FailureTracker::default(),
                events,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Spawn the workers and the sweep task, then enqueue every known source.
    ///
    /// Fails only if that initial listing fails; the tasks keep running
    /// either way. Calling `start` twice is a no-op.
    pub async fn start(&self) -> Result<usize, StorageError> {
        {
            let mut tasks = self.shared.tasks();
            if !tasks.is_empty() {
                tracing::warn!("Scheduler already started");
                return Ok(0);
            }

            let workers = self.shared.options.workers.max(1);
            for worker_id in 0..workers {
                tasks.push(tokio::spawn(worker::run(worker_id, self.shared.clone())));
            }
            tasks.push(tokio::spawn(sweep_loop(self.shared.clone())));

            tracing::info!(
                workers,
                sweep_interval_secs = self.shared.options.sweep_interval.as_secs(),
                "Scheduler started"
            );
        }

        self.enqueue_all().await
    }

    /// Queue `source` for resolution without waiting for it.
    ///
    /// Returns `false` if the source is already queued or resolving, or if
    /// the queue is full and no Tokio runtime is available to finish the
    /// hand-off.
    pub fn enqueue(&self, source: &Source) -> bool {
        self.shared.queue.push(PendingRefresh::from(source))
    }

    /// Queue every known source. Returns how many were newly queued.
    pub async fn enqueue_all(&self) -> Result<usize, StorageError> {
        let sources = self.shared.sources.list_all().await?;
        Ok(enqueue_sources(&self.shared, &sources))
    }

    /// Run one sweep now, outside the timer.
    pub async fn sweep_now(&self) {
        sweep(&self.shared).await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshEvent> {
        self.shared.events.subscribe()
    }

    /// Current failure streak of a source; 0 after any success.
    pub fn consecutive_failures(&self, source_id: SourceId) -> u32 {
        self.shared.failures.get(source_id)
    }

    pub fn is_pending(&self, source_id: SourceId) -> bool {
        self.shared.queue.is_pending(source_id)
    }

    /// Sources queued or resolving right now.
    pub fn pending_len(&self) -> usize {
        self.shared.queue.pending_len()
    }

    /// Abort the workers and the sweep task and wait for them to stop.
    ///
    /// In-flight resolutions are dropped at their next suspension point.
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.shared.tasks());
        if tasks.is_empty() {
            return;
        }

        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Scheduler task failed during shutdown");
                }
            }
        }
        tracing::info!("Scheduler stopped");
    }
}

fn enqueue_sources(shared: &Shared, sources: &[Source]) -> usize {
    sources
        .iter()
        .filter(|source| shared.queue.push(PendingRefresh::from(*source)))
        .count()
}

async fn sweep_loop(shared: Arc<Shared>) {
    let requested = shared.options.sweep_interval;
    let period = requested.clamp(MIN_SWEEP_INTERVAL, MAX_SWEEP_INTERVAL);
    if period != requested {
        tracing::warn!(
            requested_secs = requested.as_secs(),
            sweep_interval_secs = period.as_secs(),
            "Sweep interval out of range, clamped"
        );
    }

    // First tick one period out: start() already enqueued everything
    let Some(first_tick) = Instant::now().checked_add(period) else {
        tracing::error!(
            sweep_interval_secs = period.as_secs(),
            "Sweep interval overflows the clock, sweeps disabled"
        );
        return;
    };
    let mut interval = tokio::time::interval_at(first_tick, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        sweep(&shared).await;
    }
}

async fn sweep(shared: &Shared) {
    let removed = match shared.sources.remove_orphans().await {
        Ok(removed) => {
            if removed > 0 {
                tracing::info!(removed, "Removed unreferenced sources");
            }
            removed
        }
        Err(e) => {
            tracing::error!(error = %e, "Orphan cleanup failed");
            0
        }
    };

    let enqueued = match shared.sources.list_all().await {
        Ok(sources) => {
            let known: HashSet<SourceId> = sources.iter().map(|s| s.id).collect();
            shared.failures.retain(&known);
            enqueue_sources(shared, &sources)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list sources for sweep");
            0
        }
    };

    tracing::debug!(enqueued, removed, "Sweep finished");
    shared.emit(RefreshEvent::Swept { enqueued, removed });
}
