use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use crate::storage::SourceId;

/// Consecutive resolution failures per source.
///
/// Only used for reporting: a failing source is still retried on every
/// sweep.
#[derive(Default)]
pub(crate) struct FailureTracker {
    counts: Mutex<HashMap<SourceId, u32>>,
}

impl FailureTracker {
    fn counts(&self) -> std::sync::MutexGuard<'_, HashMap<SourceId, u32>> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a failure and return the new streak length.
    pub(crate) fn record_failure(&self, source_id: SourceId) -> u32 {
        let mut counts = self.counts();
        let count = counts.entry(source_id).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub(crate) fn record_success(&self, source_id: SourceId) {
        self.counts().remove(&source_id);
    }

    pub(crate) fn get(&self, source_id: SourceId) -> u32 {
        self.counts().get(&source_id).copied().unwrap_or(0)
    }

    /// Forget sources that no longer exist.
    pub(crate) fn retain(&self, known: &HashSet<SourceId>) {
        self.counts().retain(|id, _| known.contains(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streak_counts_and_resets() {
        let tracker = FailureTracker::default();
        assert_eq!(tracker.record_failure(1), 1);
        assert_eq!(tracker.record_failure(1), 2);
        assert_eq!(tracker.get(1), 2);
        assert_eq!(tracker.get(2), 0);

        tracker.record_success(1);
        assert_eq!(tracker.get(1), 0);
        assert_eq!(tracker.record_failure(1), 1);
    }

    #[test]
    fn test_retain_prunes_unknown_sources() {
        let tracker = FailureTracker::default();
        tracker.record_failure(1);
        tracker.record_failure(2);

        tracker.retain(&HashSet::from([2]));
        assert_eq!(tracker.get(1), 0);
        assert_eq!(tracker.get(2), 1);
    }
}
