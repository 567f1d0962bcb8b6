//! Collaborator contracts consumed by the refresh pipeline.
//!
//! Implementations must tolerate concurrent calls from several workers.
//! Every mutation the pipeline issues is scoped to a single source id, so
//! per-entity serializability is enough; no cross-source ordering is assumed.

use async_trait::async_trait;

use super::types::{
    Collection, CollectionId, Post, PostDraft, Source, SourceId, SourcePost, StorageError,
};

/// Persists sources and answers the lookups the pipeline needs.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Exact-match lookup by URL.
    async fn find_by_url(&self, url: &str) -> Result<Option<Source>, StorageError>;

    /// Create a source for `url`, or return the existing one if the URL is
    /// already registered.
    async fn add(&self, title: &str, url: &str) -> Result<Source, StorageError>;

    async fn get(&self, id: SourceId) -> Result<Option<Source>, StorageError>;

    async fn list_all(&self) -> Result<Vec<Source>, StorageError>;

    /// Fails with [`StorageError::NotFound`] when the source is gone.
    async fn update_title(&self, id: SourceId, title: &str) -> Result<(), StorageError>;

    /// Delete every source no collection references, along with its posts.
    /// Returns how many sources were removed.
    async fn remove_orphans(&self) -> Result<u64, StorageError>;

    /// Sources assigned to a collection, in assignment order.
    async fn sources_for_collection(&self, id: CollectionId)
        -> Result<Vec<Source>, StorageError>;
}

/// Cached posts, owned per source.
#[async_trait]
pub trait PostCache: Send + Sync {
    /// Swap the full post set of a source for `posts`.
    ///
    /// Readers observe either the previous set or the new one, never a mix.
    /// Timestamps are kept to the millisecond. Returns the number of posts
    /// written.
    async fn replace_all_for_source(
        &self,
        source_id: SourceId,
        posts: &[PostDraft],
    ) -> Result<usize, StorageError>;

    /// Newest first, undated posts last.
    async fn list_for_source(&self, source_id: SourceId) -> Result<Vec<Post>, StorageError>;

    /// Posts of every source in the collection, ordered like
    /// [`list_for_source`](Self::list_for_source).
    async fn list_for_collection(&self, id: CollectionId)
        -> Result<Vec<SourcePost>, StorageError>;
}

/// The collection side of the source assignment.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn create_collection(&self, name: &str) -> Result<Collection, StorageError>;

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>, StorageError>;

    /// Remove a collection and its source assignment. Sources are left for
    /// orphan cleanup.
    async fn remove_collection(&self, id: CollectionId) -> Result<(), StorageError>;

    /// Atomically replace the collection's source list.
    async fn set_sources(
        &self,
        id: CollectionId,
        source_ids: &[SourceId],
    ) -> Result<(), StorageError>;
}
