//! Storage collaborators for the refresh pipeline.
//!
//! The pipeline only talks to the [`SourceStore`], [`PostCache`] and
//! [`CollectionStore`] traits. Two implementations ship with the crate:
//!
//! - [`Database`] - SQLite via `sqlx`; replace-all writes are transactional
//! - [`MemoryStore`] - in-process, one lock around the whole state

mod collections;
mod memory;
mod posts;
mod repository;
mod schema;
mod sources;
mod types;

pub use memory::MemoryStore;
pub use repository::{CollectionStore, PostCache, SourceStore};
pub use schema::Database;
pub use types::{
    newest_first, sort_newest_first, Collection, CollectionId, Post, PostDraft, PostId, Published,
    Source, SourceId, SourcePost, StorageError,
};
