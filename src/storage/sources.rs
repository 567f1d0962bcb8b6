use async_trait::async_trait;

use super::repository::SourceStore;
use super::schema::Database;
use super::types::{CollectionId, Source, SourceId, SourceRow, StorageError};

#[async_trait]
impl SourceStore for Database {
    async fn find_by_url(&self, url: &str) -> Result<Option<Source>, StorageError> {
        let row: Option<SourceRow> =
            sqlx::query_as("SELECT id, title, url FROM sources WHERE url = ?")
                .bind(url)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Source::from))
    }

    async fn add(&self, title: &str, url: &str) -> Result<Source, StorageError> {
        let now = chrono::Utc::now().timestamp();
        // The no-op update makes RETURNING yield the existing row on conflict
        let row: SourceRow = sqlx::query_as(
            r#"
                INSERT INTO sources (title, url, created_at) VALUES (?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET url = excluded.url
                RETURNING id, title, url
            "#,
        )
        .bind(title)
        .bind(url)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get(&self, id: SourceId) -> Result<Option<Source>, StorageError> {
        let row: Option<SourceRow> =
            sqlx::query_as("SELECT id, title, url FROM sources WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Source::from))
    }

    async fn list_all(&self) -> Result<Vec<Source>, StorageError> {
        let rows: Vec<SourceRow> = sqlx::query_as("SELECT id, title, url FROM sources ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Source::from).collect())
    }

    async fn update_title(&self, id: SourceId, title: &str) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE sources SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::source_not_found(id));
        }
        Ok(())
    }

    async fn remove_orphans(&self) -> Result<u64, StorageError> {
        // Posts go with their source via ON DELETE CASCADE
        let result = sqlx::query(
            "DELETE FROM sources WHERE id NOT IN (SELECT source_id FROM collection_sources)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn sources_for_collection(
        &self,
        id: CollectionId,
    ) -> Result<Vec<Source>, StorageError> {
        self.ensure_collection(id).await?;
        let rows: Vec<SourceRow> = sqlx::query_as(
            r#"
                SELECT s.id, s.title, s.url
                FROM sources s
                JOIN collection_sources cs ON cs.source_id = s.id
                WHERE cs.collection_id = ?
                ORDER BY cs.position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Source::from).collect())
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
    async fn test_add_and_find_by_url() {
        let db = test_db().await;
        let source = db
            .add("Processing...", "https://a.example/feed")
            .await
            .unwrap();
        assert!(source.id > 0);
        assert_eq!(source.title, "Processing...");

        let found = db.find_by_url("https://a.example/feed").await.unwrap();
        assert_eq!(found, Some(source));
        assert!(db
            .find_by_url("https://b.example/feed")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_add_existing_url_returns_existing_source() {
        let db = test_db().await;
        let first = db.add("First", "https://a.example/feed").await.unwrap();
        let second = db.add("Second", "https://a.example/feed").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "First");
        assert_eq!(db.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_title() {
        let db = test_db().await;
        let source = db.add("Processing...", "https://a.example/feed").await.unwrap();

        db.update_title(source.id, "a.example").await.unwrap();

        let stored = db.get(source.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "a.example");
    }

    #[tokio::test]
    async fn test_update_title_missing_source() {
        let db = test_db().await;
        let err = db.update_title(42, "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { id: 42, .. }));
    }

    #[tokio::test]
    async fn test_remove_orphans_keeps_referenced_sources() {
        let db = test_db().await;
        let kept = db.add("kept", "https://a.example/feed").await.unwrap();
        let orphan = db.add("orphan", "https://b.example/feed").await.unwrap();
        let collection = db.create_collection("Reading").await.unwrap();
        db.set_sources(collection.id, &[kept.id]).await.unwrap();

        let removed = db.remove_orphans().await.unwrap();
        assert_eq!(removed, 1);

        let remaining: Vec<_> = db.list_all().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(remaining, vec![kept.id]);
        assert!(db.get(orphan.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sources_for_collection_in_assignment_order() {
        let db = test_db().await;
        let a = db.add("a", "https://a.example/feed").await.unwrap();
        let b = db.add("b", "https://b.example/feed").await.unwrap();
        let collection = db.create_collection("Reading").await.unwrap();
        db.set_sources(collection.id, &[b.id, a.id]).await.unwrap();

        let sources = db.sources_for_collection(collection.id).await.unwrap();
        assert_eq!(sources, vec![b, a]);
    }

    #[tokio::test]
    async fn test_sources_for_unknown_collection() {
        let db = test_db().await;
        let err = db.sources_for_collection(9).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "collection", .. }));
    }
}
