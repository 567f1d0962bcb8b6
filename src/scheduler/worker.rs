use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::queue::{PendingRefresh, WorkQueue};
use super::{RefreshEvent, Shared};
use crate::feed::ResolvedItem;
use crate::storage::{PostDraft, SourceId};

impl From<ResolvedItem> for PostDraft {
    fn from(item: ResolvedItem) -> Self {
        PostDraft {
            title: item.title,
            description: item.description,
            url: item.url,
            published_at: item.published_at,
            updated_at: item.updated_at,
        }
    }
}

/// Holds a source id in the in-flight set until dropped.
struct InFlight<'a> {
    queue: &'a WorkQueue,
    source_id: SourceId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.queue.release(self.source_id);
    }
}

/// Worker loop: take entries until the queue closes or the task is aborted.
pub(super) async fn run(worker_id: usize, shared: Arc<Shared>) {
    tracing::debug!(worker_id, "Worker started");

    while let Some(entry) = shared.queue.next().await {
        let source_id = entry.source_id;
        // Released on every exit, including an abort mid-cycle
        let _in_flight = InFlight {
            queue: &shared.queue,
            source_id,
        };

        // A panicking cycle must not take the worker down with it
        if let Err(panic_msg) = catch_task_panic(refresh_source(&shared, &entry)).await {
            tracing::error!(
                worker_id,
                source_id,
                url = %entry.url,
                error = %panic_msg,
                "Refresh cycle panicked"
            );
            shared.emit(RefreshEvent::ResolveFailed {
                source_id,
                error: panic_msg,
            });
        }
    }

    tracing::debug!(worker_id, "Worker stopped");
}

/// One resolution cycle. Failures are logged and reported as events, never
/// returned: nobody is waiting on a background refresh.
async fn refresh_source(shared: &Shared, entry: &PendingRefresh) {
    let PendingRefresh { source_id, url } = entry;
    let source_id = *source_id;

    let resolved = match shared.resolver.resolve(url).await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::warn!(source_id, url = %url, error = %e, "Failed to resolve source");
            let streak = shared.failures.record_failure(source_id);
            if streak == shared.options.failure_warn_threshold {
                tracing::warn!(
                    source_id,
                    url = %url,
                    consecutive_failures = streak,
                    "Source keeps failing"
                );
            }
            shared.emit(RefreshEvent::ResolveFailed {
                source_id,
                error: e.to_string(),
            });
            return;
        }
    };

    shared.failures.record_success(source_id);

    let mut store_error = None;

    if let Err(e) = shared.sources.update_title(source_id, &resolved.title).await {
        tracing::warn!(source_id, url = %url, error = %e, "Failed to update source title");
        store_error = Some(e.to_string());
    }

    let drafts: Vec<PostDraft> = resolved.items.into_iter().map(PostDraft::from).collect();
    match shared.posts.replace_all_for_source(source_id, &drafts).await {
        Ok(count) => {
            tracing::debug!(source_id, url = %url, posts = count, "Source refreshed");
            if store_error.is_none() {
                shared.emit(RefreshEvent::Resolved {
                    source_id,
                    posts: count,
                });
            }
        }
        Err(e) => {
            tracing::warn!(source_id, url = %url, error = %e, "Failed to replace cached posts");
            store_error.get_or_insert(e.to_string());
        }
    }

    if let Some(error) = store_error {
        shared.emit(RefreshEvent::StoreFailed { source_id, error });
    }
}

/// Run `future`, turning a panic into `Err` with the panic message.
async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            }
        })
}
