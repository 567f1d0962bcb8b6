use async_trait::async_trait;
use sqlx::QueryBuilder;

use super::repository::PostCache;
use super::schema::Database;
use super::types::{
    to_millis, CollectionId, Post, PostDraft, PostRow, SourceId, SourcePost, SourcePostRow,
    StorageError,
};

/// Rows per INSERT; 6 binds each keeps us well under SQLite's parameter limit.
const BATCH_SIZE: usize = 50;

#[async_trait]
impl PostCache for Database {
    /// Delete-then-insert inside one transaction, so readers never see the
    /// empty intermediate state.
    async fn replace_all_for_source(
        &self,
        source_id: SourceId,
        posts: &[PostDraft],
    ) -> Result<usize, StorageError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM sources WHERE id = ?")
            .bind(source_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StorageError::source_not_found(source_id));
        }

        sqlx::query("DELETE FROM posts WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        for chunk in posts.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO posts (source_id, title, description, url, published_at, updated_at) ",
            );

            builder.push_values(chunk, |mut b, post| {
                b.push_bind(source_id)
                    .push_bind(&post.title)
                    .push_bind(&post.description)
                    .push_bind(&post.url)
                    .push_bind(to_millis(post.published_at))
                    .push_bind(to_millis(post.updated_at));
            });

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(posts.len())
    }

    async fn list_for_source(&self, source_id: SourceId) -> Result<Vec<Post>, StorageError> {
        let rows: Vec<PostRow> = sqlx::query_as(
            r#"
                SELECT id, source_id, title, description, url, published_at, updated_at
                FROM posts
                WHERE source_id = ?
                ORDER BY published_at IS NULL, published_at DESC, id
            "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    async fn list_for_collection(
        &self,
        id: CollectionId,
    ) -> Result<Vec<SourcePost>, StorageError> {
        self.ensure_collection(id).await?;
        let rows: Vec<SourcePostRow> = sqlx::query_as(
            r#"
                SELECT
                    p.id, p.source_id, p.title, p.description, p.url,
                    p.published_at, p.updated_at,
                    s.title AS source_title, s.url AS source_url
                FROM posts p
                JOIN sources s ON s.id = p.source_id
                JOIN collection_sources cs ON cs.source_id = p.source_id
                WHERE cs.collection_id = ?
                ORDER BY p.published_at IS NULL, p.published_at DESC, p.id
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(SourcePostRow::into_source_post)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::{
        CollectionStore, Database, PostCache, PostDraft, SourceStore, StorageError,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).single()
    }

    fn draft(slug: &str, published_at: Option<DateTime<Utc>>) -> PostDraft {
        PostDraft {
            title: format!("Post {slug}"),
            description: format!("About {slug}"),
            url: format!("https://a.example/{slug}"),
            published_at,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_replace_all_round_trip() {
        let db = test_db().await;
        let source = db.add("a", "https://a.example/feed").await.unwrap();
        let drafts = vec![draft("one", day(2024, 1, 1))];

        let written = db.replace_all_for_source(source.id, &drafts).await.unwrap();
        assert_eq!(written, 1);

        let posts = db.list_for_source(source.id).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].source_id, source.id);
        assert_eq!(posts[0].title, "Post one");
        assert_eq!(posts[0].description, "About one");
        assert_eq!(posts[0].url, "https://a.example/one");
        assert_eq!(posts[0].published_at, day(2024, 1, 1));
        assert_eq!(posts[0].updated_at, None);
    }

    #[tokio::test]
    async fn test_timestamps_kept_to_the_millisecond() {
        let db = test_db().await;
        let source = db.add("a", "https://a.example/feed").await.unwrap();
        let precise = Utc.timestamp_opt(1_700_000_000, 123_456_789).single();
        let mut post = draft("precise", precise);
        post.updated_at = precise;
        db.replace_all_for_source(source.id, &[post]).await.unwrap();

        let stored = &db.list_for_source(source.id).await.unwrap()[0];
        let millis = Utc.timestamp_opt(1_700_000_000, 123_000_000).single();
        assert_eq!(stored.published_at, millis);
        assert_eq!(stored.updated_at, millis);
    }

    #[tokio::test]
    async fn test_replace_all_leaves_no_leftovers() {
        let db = test_db().await;
        let source = db.add("a", "https://a.example/feed").await.unwrap();

        db.replace_all_for_source(source.id, &[draft("old-1", None), draft("old-2", None)])
            .await
            .unwrap();
        db.replace_all_for_source(source.id, &[draft("new", None)])
            .await
            .unwrap();

        let urls: Vec<_> = db
            .list_for_source(source.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.url)
            .collect();
        assert_eq!(urls, vec!["https://a.example/new".to_string()]);
    }

    #[tokio::test]
    async fn test_replace_all_only_touches_its_source() {
        let db = test_db().await;
        let a = db.add("a", "https://a.example/feed").await.unwrap();
        let b = db.add("b", "https://b.example/feed").await.unwrap();
        db.replace_all_for_source(a.id, &[draft("a1", None)]).await.unwrap();
        db.replace_all_for_source(b.id, &[draft("b1", None)]).await.unwrap();

        db.replace_all_for_source(a.id, &[]).await.unwrap();

        assert!(db.list_for_source(a.id).await.unwrap().is_empty());
        assert_eq!(db.list_for_source(b.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_all_in_batches() {
        let db = test_db().await;
        let source = db.add("a", "https://a.example/feed").await.unwrap();
        let drafts: Vec<_> = (0..130).map(|i| draft(&i.to_string(), None)).collect();

        let written = db.replace_all_for_source(source.id, &drafts).await.unwrap();
        assert_eq!(written, 130);
        assert_eq!(db.list_for_source(source.id).await.unwrap().len(), 130);
    }

    #[tokio::test]
    async fn test_replace_all_for_missing_source() {
        let db = test_db().await;
        let err = db
            .replace_all_for_source(99, &[draft("x", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { entity: "source", id: 99 }));
    }

    #[tokio::test]
    async fn test_list_for_source_ordering() {
        let db = test_db().await;
        let source = db.add("a", "https://a.example/feed").await.unwrap();
        db.replace_all_for_source(
            source.id,
            &[
                draft("jan", day(2024, 1, 1)),
                draft("undated", None),
                draft("mar", day(2024, 3, 1)),
            ],
        )
        .await
        .unwrap();

        let published: Vec<_> = db
            .list_for_source(source.id)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.published_at)
            .collect();
        assert_eq!(published, vec![day(2024, 3, 1), day(2024, 1, 1), None]);
    }

    #[tokio::test]
    async fn test_orphan_cleanup_cascades_posts() {
        let db = test_db().await;
        let source = db.add("a", "https://a.example/feed").await.unwrap();
        db.replace_all_for_source(source.id, &[draft("one", None)])
            .await
            .unwrap();

        db.remove_orphans().await.unwrap();

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(count.0, 0);
    }

    #[tokio::test]
    async fn test_list_for_collection_merges_sources() {
        let db = test_db().await;
        let a = db.add("a.example", "https://a.example/feed").await.unwrap();
        let b = db.add("b.example", "https://b.example/feed").await.unwrap();
        let outside = db.add("c.example", "https://c.example/feed").await.unwrap();
        db.replace_all_for_source(a.id, &[draft("a-old", day(2023, 6, 1))])
            .await
            .unwrap();
        db.replace_all_for_source(b.id, &[draft("b-new", day(2024, 6, 1)), draft("b-undated", None)])
            .await
            .unwrap();
        db.replace_all_for_source(outside.id, &[draft("c", day(2025, 1, 1))])
            .await
            .unwrap();

        let collection = db.create_collection("Reading").await.unwrap();
        db.set_sources(collection.id, &[a.id, b.id]).await.unwrap();

        let items = db.list_for_collection(collection.id).await.unwrap();
        let urls: Vec<_> = items.iter().map(|sp| sp.post.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://a.example/b-new",
                "https://a.example/a-old",
                "https://a.example/b-undated"
            ]
        );
        assert_eq!(items[0].source, b);
        assert_eq!(items[1].source, a);
    }

    #[tokio::test]
    async fn test_list_for_unknown_collection() {
        let db = test_db().await;
        assert!(db.list_for_collection(5).await.is_err());
    }
}
