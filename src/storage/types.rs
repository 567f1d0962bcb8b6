use chrono::{DateTime, SubsecRound, Utc};
use std::cmp::Ordering;
use thiserror::Error;

/// Identifier of a [`Source`].
pub type SourceId = i64;
/// Identifier of a [`Collection`].
pub type CollectionId = i64;
/// Identifier of a [`Post`].
pub type PostId = i64;

// ============================================================================
// Error Types
// ============================================================================

/// Failure reported by any storage collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The referenced entity does not exist (or no longer exists)
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StorageError {
    pub(crate) fn source_not_found(id: SourceId) -> Self {
        StorageError::NotFound {
            entity: "source",
            id,
        }
    }

    pub(crate) fn collection_not_found(id: CollectionId) -> Self {
        StorageError::NotFound {
            entity: "collection",
            id,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered external feed URL plus its cached display title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: SourceId,
    pub title: String,
    pub url: String,
}

/// User-facing grouping of sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
}

/// One normalized entry from a source's feed document, as cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    pub source_id: SourceId,
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A post not yet written to the cache. The owning source is supplied
/// alongside, see [`PostCache::replace_all_for_source`](super::PostCache::replace_all_for_source).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A post together with the source it came from, for collection listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePost {
    pub post: Post,
    pub source: Source,
}

// ============================================================================
// Ordering
// ============================================================================

/// Anything that may carry a publish time.
pub trait Published {
    fn published_at(&self) -> Option<DateTime<Utc>>;
}

impl Published for Post {
    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }
}

impl Published for SourcePost {
    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.post.published_at
    }
}

impl Published for PostDraft {
    fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }
}

/// Newest first; items without a publish time sort last.
///
/// `Option` orders `None` below any `Some`, so a descending comparison
/// leaves the undated items at the tail.
pub fn newest_first<T: Published>(a: &T, b: &T) -> Ordering {
    b.published_at().cmp(&a.published_at())
}

/// Stable in-place sort by [`newest_first`]; ties keep their input order.
pub fn sort_newest_first<T: Published>(items: &mut [T]) {
    items.sort_by(newest_first);
}

// ============================================================================
// Row Types
// ============================================================================

/// Timestamps are stored as Unix milliseconds; finer precision is dropped.
pub(crate) fn to_millis(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp_millis())
}

pub(crate) fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

/// The precision every store keeps: what a millisecond round trip yields.
pub(crate) fn truncate_to_millis(ts: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    ts.map(|t| t.trunc_subsecs(3))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SourceRow {
    pub id: i64,
    pub title: String,
    pub url: String,
}

impl From<SourceRow> for Source {
    fn from(row: SourceRow) -> Self {
        Source {
            id: row.id,
            title: row.title,
            url: row.url,
        }
    }
}

/// Internal row type for post queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl PostRow {
    pub(crate) fn into_post(self) -> Post {
        Post {
            id: self.id,
            source_id: self.source_id,
            title: self.title,
            description: self.description,
            url: self.url,
            published_at: from_millis(self.published_at),
            updated_at: from_millis(self.updated_at),
        }
    }
}

/// Post joined with its source for collection listings
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SourcePostRow {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub description: String,
    pub url: String,
    pub published_at: Option<i64>,
    pub updated_at: Option<i64>,
    pub source_title: String,
    pub source_url: String,
}

impl SourcePostRow {
    pub(crate) fn into_source_post(self) -> SourcePost {
        SourcePost {
            source: Source {
                id: self.source_id,
                title: self.source_title,
                url: self.source_url,
            },
            post: Post {
                id: self.id,
                source_id: self.source_id,
                title: self.title,
                description: self.description,
                url: self.url,
                published_at: from_millis(self.published_at),
                updated_at: from_millis(self.updated_at),
            },
        }
    }
}
