use async_trait::async_trait;
use sqlx::QueryBuilder;

use super::repository::CollectionStore;
use super::schema::Database;
use super::types::{Collection, CollectionId, SourceId, StorageError};

impl Database {
    pub(crate) async fn ensure_collection(&self, id: CollectionId) -> Result<(), StorageError> {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM collections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(()),
            None => Err(StorageError::collection_not_found(id)),
        }
    }
}

#[async_trait]
impl CollectionStore for Database {
    async fn create_collection(&self, name: &str) -> Result<Collection, StorageError> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO collections (name, created_at) VALUES (?, ?) RETURNING id")
                .bind(name)
                .bind(now)
                .fetch_one(&self.pool)
                .await?;
        Ok(Collection {
            id,
            name: name.to_string(),
        })
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>, StorageError> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM collections WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, name)| Collection { id, name }))
    }

    async fn remove_collection(&self, id: CollectionId) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::collection_not_found(id));
        }
        Ok(())
    }

    /// Replace-all inside a transaction. `source_ids` must already be
    /// distinct; the position column keeps their order. An unknown source
    /// fails with `NotFound` and leaves the previous list in place.
    async fn set_sources(
        &self,
        id: CollectionId,
        source_ids: &[SourceId],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM collections WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StorageError::collection_not_found(id));
        }

        if !source_ids.is_empty() {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("SELECT id FROM sources WHERE id IN (");
            let mut separated = builder.separated(", ");
            for source_id in source_ids {
                separated.push_bind(*source_id);
            }
            separated.push_unseparated(")");
            let found: Vec<(i64,)> = builder.build_query_as().fetch_all(&mut *tx).await?;

            if let Some(missing) = source_ids
                .iter()
                .find(|sid| !found.iter().any(|(f,)| f == *sid))
            {
                return Err(StorageError::source_not_found(*missing));
            }
        }

        sqlx::query("DELETE FROM collection_sources WHERE collection_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if !source_ids.is_empty() {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO collection_sources (collection_id, source_id, position) ",
            );
            builder.push_values(source_ids.iter().enumerate(), |mut b, (position, source_id)| {
                b.push_bind(id)
                    .push_bind(*source_id)
                    .push_bind(position as i64);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{CollectionStore, Database, SourceStore, StorageError};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_collection() {
        let db = test_db().await;
        let created = db.create_collection("Morning").await.unwrap();
        let fetched = db.get_collection(created.id).await.unwrap();
        assert_eq!(fetched, Some(created));
        assert!(db.get_collection(1234).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_sources_replaces_previous_list() {
        let db = test_db().await;
        let a = db.add("a", "https://a.example/feed").await.unwrap();
        let b = db.add("b", "https://b.example/feed").await.unwrap();
        let collection = db.create_collection("Morning").await.unwrap();

        db.set_sources(collection.id, &[a.id, b.id]).await.unwrap();
        db.set_sources(collection.id, &[b.id]).await.unwrap();

        let sources = db.sources_for_collection(collection.id).await.unwrap();
        assert_eq!(sources, vec![b]);
    }

    #[tokio::test]
    async fn test_set_sources_unknown_collection() {
        let db = test_db().await;
        let err = db.set_sources(77, &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "collection", id: 77 }));
    }

    #[tokio::test]
    async fn test_set_sources_unknown_source_rolls_back() {
        let db = test_db().await;
        let a = db.add("a", "https://a.example/feed").await.unwrap();
        let collection = db.create_collection("Morning").await.unwrap();
        db.set_sources(collection.id, &[a.id]).await.unwrap();

        let err = db.set_sources(collection.id, &[a.id, 999]).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "source", id: 999 }));

        let sources = db.sources_for_collection(collection.id).await.unwrap();
        assert_eq!(sources, vec![a]);
    }

    #[tokio::test]
    async fn test_remove_collection_orphans_its_sources() {
        let db = test_db().await;
        let a = db.add("a", "https://a.example/feed").await.unwrap();
        let collection = db.create_collection("Morning").await.unwrap();
        db.set_sources(collection.id, &[a.id]).await.unwrap();

        db.remove_collection(collection.id).await.unwrap();
        assert_eq!(db.remove_orphans().await.unwrap(), 1);
        assert!(db.list_all().await.unwrap().is_empty());
    }
}
