// In-process store for embedding and tests, no database required.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::repository::{CollectionStore, PostCache, SourceStore};
use super::types::{
    sort_newest_first, truncate_to_millis, Collection, CollectionId, Post, PostDraft, Source,
    SourceId, SourcePost, StorageError,
};

#[derive(Default)]
struct MemoryState {
    next_source_id: i64,
    next_collection_id: i64,
    next_post_id: i64,
    sources: Vec<Source>,
    collections: Vec<(Collection, Vec<SourceId>)>,
    posts: Vec<Post>,
}

impl MemoryState {
    fn source(&self, id: SourceId) -> Option<&Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    fn collection(&self, id: CollectionId) -> Result<&(Collection, Vec<SourceId>), StorageError> {
        self.collections
            .iter()
            .find(|(c, _)| c.id == id)
            .ok_or_else(|| StorageError::collection_not_found(id))
    }

    fn referenced_sources(&self) -> HashSet<SourceId> {
        self.collections
            .iter()
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }
}

/// In-process implementation of all three storage contracts.
///
/// A single lock guards the state, so every call is atomic with respect to
/// the others. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn find_by_url(&self, url: &str) -> Result<Option<Source>, StorageError> {
        let state = self.state.read().await;
        Ok(state.sources.iter().find(|s| s.url == url).cloned())
    }

    async fn add(&self, title: &str, url: &str) -> Result<Source, StorageError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.sources.iter().find(|s| s.url == url) {
            return Ok(existing.clone());
        }
        state.next_source_id += 1;
        let source = Source {
            id: state.next_source_id,
            title: title.to_string(),
            url: url.to_string(),
        };
        state.sources.push(source.clone());
        Ok(source)
    }

    async fn get(&self, id: SourceId) -> Result<Option<Source>, StorageError> {
        Ok(self.state.read().await.source(id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Source>, StorageError> {
        Ok(self.state.read().await.sources.clone())
    }

    async fn update_title(&self, id: SourceId, title: &str) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let source = state
            .sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| StorageError::source_not_found(id))?;
        source.title = title.to_string();
        Ok(())
    }

    async fn remove_orphans(&self) -> Result<u64, StorageError> {
        let mut state = self.state.write().await;
        let referenced = state.referenced_sources();
        let before = state.sources.len();
        state.sources.retain(|s| referenced.contains(&s.id));
        state.posts.retain(|p| referenced.contains(&p.source_id));
        Ok((before - state.sources.len()) as u64)
    }

    async fn sources_for_collection(
        &self,
        id: CollectionId,
    ) -> Result<Vec<Source>, StorageError> {
        let state = self.state.read().await;
        let (_, ids) = state.collection(id)?;
        Ok(ids
            .iter()
            .filter_map(|source_id| state.source(*source_id).cloned())
            .collect())
    }
}

#[async_trait]
impl PostCache for MemoryStore {
    async fn replace_all_for_source(
        &self,
        source_id: SourceId,
        posts: &[PostDraft],
    ) -> Result<usize, StorageError> {
        let mut state = self.state.write().await;
        if state.source(source_id).is_none() {
            return Err(StorageError::source_not_found(source_id));
        }

        state.posts.retain(|p| p.source_id != source_id);
        for draft in posts {
            state.next_post_id += 1;
            let post = Post {
                id: state.next_post_id,
                source_id,
                title: draft.title.clone(),
                description: draft.description.clone(),
                url: draft.url.clone(),
                published_at: truncate_to_millis(draft.published_at),
                updated_at: truncate_to_millis(draft.updated_at),
            };
            state.posts.push(post);
        }
        Ok(posts.len())
    }

    async fn list_for_source(&self, source_id: SourceId) -> Result<Vec<Post>, StorageError> {
        let state = self.state.read().await;
        let mut posts: Vec<Post> = state
            .posts
            .iter()
            .filter(|p| p.source_id == source_id)
            .cloned()
            .collect();
        sort_newest_first(&mut posts);
        Ok(posts)
    }

    async fn list_for_collection(
        &self,
        id: CollectionId,
    ) -> Result<Vec<SourcePost>, StorageError> {
        let state = self.state.read().await;
        let (_, ids) = state.collection(id)?;

        let mut items: Vec<SourcePost> = state
            .posts
            .iter()
            .filter(|p| ids.contains(&p.source_id))
            .filter_map(|p| {
                state.source(p.source_id).map(|source| SourcePost {
                    post: p.clone(),
                    source: source.clone(),
                })
            })
            .collect();
        sort_newest_first(&mut items);
        Ok(items)
    }
}

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn create_collection(&self, name: &str) -> Result<Collection, StorageError> {
        let mut state = self.state.write().await;
        state.next_collection_id += 1;
        let collection = Collection {
            id: state.next_collection_id,
            name: name.to_string(),
        };
        state.collections.push((collection.clone(), Vec::new()));
        Ok(collection)
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>, StorageError> {
        let state = self.state.read().await;
        Ok(state.collection(id).ok().map(|(c, _)| c.clone()))
    }

    async fn remove_collection(&self, id: CollectionId) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let before = state.collections.len();
        state.collections.retain(|(c, _)| c.id != id);
        if state.collections.len() == before {
            return Err(StorageError::collection_not_found(id));
        }
        Ok(())
    }

    async fn set_sources(
        &self,
        id: CollectionId,
        source_ids: &[SourceId],
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        if let Some(missing) = source_ids.iter().find(|sid| state.source(**sid).is_none()) {
            return Err(StorageError::source_not_found(*missing));
        }
        let entry = state
            .collections
            .iter_mut()
            .find(|(c, _)| c.id == id)
            .ok_or_else(|| StorageError::collection_not_found(id))?;
        entry.1 = source_ids.to_vec();
        Ok(())
    }
}
