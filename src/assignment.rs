//! Attaching source URLs to a collection.

use std::collections::HashSet;
use std::sync::Arc;

use crate::scheduler::Scheduler;
use crate::storage::{CollectionId, CollectionStore, SourceId, SourceStore, StorageError};

/// Title a new source carries until its first successful resolution.
pub const DEFAULT_PLACEHOLDER_TITLE: &str = "Processing...";

/// Resolves URLs to source ids and persists them as a collection's sources.
#[derive(Clone)]
pub struct SourceAssigner {
    sources: Arc<dyn SourceStore>,
    collections: Arc<dyn CollectionStore>,
    scheduler: Scheduler,
    placeholder_title: String,
}

impl SourceAssigner {
    pub fn new(
        sources: Arc<dyn SourceStore>,
        collections: Arc<dyn CollectionStore>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            sources,
            collections,
            scheduler,
            placeholder_title: DEFAULT_PLACEHOLDER_TITLE.to_string(),
        }
    }

    pub fn with_placeholder_title(mut self, title: impl Into<String>) -> Self {
        self.placeholder_title = title.into();
        self
    }

    /// Replace the collection's source list with `urls`, in order.
    ///
    /// Known URLs reuse their source; unknown ones get a new source with the
    /// placeholder title, queued for resolution without waiting on it. A URL
    /// repeated in `urls` is kept once, at its first position.
    ///
    /// An orphan sweep can delete a source between its lookup and the final
    /// write; the whole resolution is then retried once. If the final write
    /// still fails, sources created along the way stay behind unreferenced
    /// until the next sweep.
    pub async fn update_collection_sources<S: AsRef<str>>(
        &self,
        collection_id: CollectionId,
        urls: &[S],
    ) -> Result<Vec<SourceId>, StorageError> {
        let ids = self.resolve_source_ids(urls).await?;
        let ids = match self.collections.set_sources(collection_id, &ids).await {
            Ok(()) => ids,
            Err(StorageError::NotFound {
                entity: "source",
                id,
            }) => {
                tracing::debug!(
                    collection_id,
                    source_id = id,
                    "Source swept during assignment, retrying"
                );
                let ids = self.resolve_source_ids(urls).await?;
                self.collections.set_sources(collection_id, &ids).await?;
                ids
            }
            Err(e) => return Err(e),
        };

        tracing::info!(collection_id, sources = ids.len(), "Collection sources updated");
        Ok(ids)
    }

    async fn resolve_source_ids<S: AsRef<str>>(
        &self,
        urls: &[S],
    ) -> Result<Vec<SourceId>, StorageError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(urls.len());

        for url in urls {
            let url = url.as_ref();
            if !seen.insert(url) {
                continue;
            }

            let id = match self.sources.find_by_url(url).await? {
                Some(existing) => existing.id,
                None => {
                    let created = self.sources.add(&self.placeholder_title, url).await?;
                    tracing::debug!(source_id = created.id, url, "Registered new source");
                    self.scheduler.enqueue(&created);
                    created.id
                }
            };
            ids.push(id);
        }

        Ok(ids)
    }
}
