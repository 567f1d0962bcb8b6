use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::storage::{Source, SourceId};

/// One unit of work: resolve this source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRefresh {
    pub source_id: SourceId,
    pub url: String,
}

impl From<&Source> for PendingRefresh {
    fn from(source: &Source) -> Self {
        Self {
            source_id: source.id,
            url: source.url.clone(),
        }
    }
}

/// Bounded hand-off between producers and the worker pool.
///
/// A source id stays in the in-flight set from the moment it is pushed
/// until a worker releases it, so a source is never queued twice or
/// resolved concurrently.
#[derive(Clone)]
pub(crate) struct WorkQueue {
    tx: mpsc::Sender<PendingRefresh>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<PendingRefresh>>>,
    in_flight: Arc<Mutex<HashSet<SourceId>>>,
}

impl WorkQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<SourceId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue `entry` without waiting. Returns `false` if the source is
    /// already queued or being resolved.
    ///
    /// When the channel is full the send is handed to a background task,
    /// so callers on a request path never block on the pool. Without a
    /// current Tokio runtime that hand-off is impossible, and the entry is
    /// dropped; the next sweep picks the source up again.
    pub(crate) fn push(&self, entry: PendingRefresh) -> bool {
        if !self.in_flight().insert(entry.source_id) {
            tracing::debug!(source_id = entry.source_id, "Source already pending, skipping");
            return false;
        }

        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(TrySendError::Full(entry)) => {
                let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                    self.release(entry.source_id);
                    tracing::warn!(
                        source_id = entry.source_id,
                        "Work queue full outside a runtime, entry dropped"
                    );
                    return false;
                };
                let tx = self.tx.clone();
                runtime.spawn(async move {
                    let source_id = entry.source_id;
                    if tx.send(entry).await.is_err() {
                        tracing::warn!(source_id, "Work queue closed before entry was queued");
                    }
                });
                true
            }
            Err(TrySendError::Closed(entry)) => {
                self.release(entry.source_id);
                tracing::warn!(source_id = entry.source_id, "Work queue closed, entry dropped");
                false
            }
        }
    }

    /// Wait for the next entry. Workers take turns on the receiver.
    pub(crate) async fn next(&self) -> Option<PendingRefresh> {
        self.rx.lock().await.recv().await
    }

    /// Mark a cycle finished so the source can be queued again.
    pub(crate) fn release(&self, source_id: SourceId) {
        self.in_flight().remove(&source_id);
    }

    pub(crate) fn is_pending(&self, source_id: SourceId) -> bool {
        self.in_flight().contains(&source_id)
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.in_flight().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(id: SourceId) -> PendingRefresh {
        PendingRefresh {
            source_id: id,
            url: format!("https://s{id}.example/feed"),
        }
    }

    #[tokio::test]
    async fn test_push_then_next_in_arrival_order() {
        let queue = WorkQueue::new(4);
        assert!(queue.push(entry(1)));
        assert!(queue.push(entry(2)));

        assert_eq!(queue.next().await, Some(entry(1)));
        assert_eq!(queue.next().await, Some(entry(2)));
    }

    #[tokio::test]
    async fn test_duplicate_push_skipped_until_released() {
        let queue = WorkQueue::new(4);
        assert!(queue.push(entry(1)));
        assert!(!queue.push(entry(1)));

        let taken = queue.next().await.unwrap();
        // Still in flight while a worker holds it
        assert!(!queue.push(entry(1)));
        assert!(queue.is_pending(1));

        queue.release(taken.source_id);
        assert!(!queue.is_pending(1));
        assert!(queue.push(entry(1)));
    }

    #[tokio::test]
    async fn test_push_beyond_capacity_does_not_block() {
        let queue = WorkQueue::new(1);
        for id in 0..10 {
            assert!(queue.push(entry(id)));
        }
        assert_eq!(queue.pending_len(), 10);

        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(queue.next().await.unwrap().source_id);
        }
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_full_queue_outside_runtime_drops_entry() {
        let queue = WorkQueue::new(1);
        assert!(queue.push(entry(1)));

        assert!(!queue.push(entry(2)));
        assert!(!queue.is_pending(2));
        assert_eq!(queue.pending_len(), 1);
    }
}
