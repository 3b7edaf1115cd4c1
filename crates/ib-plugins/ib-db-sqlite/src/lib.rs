//! # ib-db-sqlite Implementation
//!
//! Maps the SQLite tables `posts` and `post_files` onto the `ib-core` domain
//! models. Dynamic statements come from `ib_core::query` and are bound here
//! value by value; nothing user supplied is ever formatted into SQL.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use ib_core::query::{self, ListQuery, SqlValue, PUBLIC_COLUMNS};
use ib_core::{
    Attachment, AttachmentRepo, NameCount, NewPost, Post, PostId, PostPatch, PostRepo,
    PostStatus, PublicPost, StatsField,
};
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Transaction};
use tracing::{debug, info};

const PUBLISHED: &str = "published";

pub struct SqlitePostRepo {
    pool: SqlitePool,
}

impl SqlitePostRepo {
    /// Opens `url` with the default pool size and runs pending migrations.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        Self::connect(url, 5).await
    }

    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // Every connection to `:memory:` is its own database, so keep exactly one alive.
        let in_memory = url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory {
            1
        } else {
            max_connections.max(1)
        });
        if in_memory {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>);
        }

        let pool = pool_options.connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(in_memory, "sqlite store ready");

        Ok(Self { pool })
    }

    #[cfg(test)]
    fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &[SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Date(v) => query.bind(*v),
        };
    }
    query
}

fn public_post(row: &SqliteRow) -> Result<PublicPost, sqlx::Error> {
    Ok(PublicPost {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        create_date: row.try_get("create_date")?,
        interview_date: row.try_get("interview_date")?,
        company: row.try_get("company")?,
        position: row.try_get("position")?,
        body: row.try_get("body")?,
        votes_up: row.try_get("votes_up")?,
        votes_down: row.try_get("votes_down")?,
        views: row.try_get("views")?,
    })
}

fn full_post(row: &SqliteRow) -> anyhow::Result<Post> {
    let status: String = row.try_get("status")?;
    Ok(Post {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        company: row.try_get("company")?,
        position: row.try_get("position")?,
        body: row.try_get("body")?,
        interview_date: row.try_get("interview_date")?,
        create_date: row.try_get("create_date")?,
        pin_hash: row.try_get("pin")?,
        status: status.parse::<PostStatus>().map_err(anyhow::Error::msg)?,
        views: row.try_get("views")?,
        votes_up: row.try_get("votes_up")?,
        votes_down: row.try_get("votes_down")?,
    })
}

fn attachment(row: &SqliteRow) -> Result<Attachment, sqlx::Error> {
    Ok(Attachment {
        id: row.try_get("id")?,
        post_id: row.try_get("post_id")?,
        file_url: row.try_get("file_url")?,
    })
}

#[async_trait]
impl PostRepo for SqlitePostRepo {
    /// Inserts the post and its first attachment row in one transaction,
    /// so a post never exists with a half-written attachment.
    #[tracing::instrument(skip_all)]
    async fn insert_post(&self, post: NewPost, file_url: Option<String>) -> anyhow::Result<PostId> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO posts (title, company, position, body, interview_date, create_date, pin, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(post.title)
        .bind(post.company)
        .bind(post.position)
        .bind(post.body)
        .bind(post.interview_date)
        .bind(post.create_date)
        .bind(post.pin_hash)
        .bind(PUBLISHED)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        if let Some(url) = file_url {
            sqlx::query("INSERT INTO post_files (post_id, file_url) VALUES (?, ?)")
                .bind(id)
                .bind(url)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(post_id = id, "post inserted");
        Ok(id)
    }

    async fn find_post(&self, id: PostId) -> anyhow::Result<Option<Post>> {
        let row = sqlx::query(
            "SELECT id, title, company, position, body, interview_date, create_date, pin, status, \
             views, votes_up, votes_down FROM posts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(full_post).transpose()
    }

    async fn find_published(&self, id: PostId) -> anyhow::Result<Option<PublicPost>> {
        let row = sqlx::query(&format!(
            "SELECT {PUBLIC_COLUMNS} FROM posts WHERE id = ? AND status = '{PUBLISHED}'"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(public_post).transpose()?)
    }

    /// Single-statement increment, so concurrent readers never lose a view.
    async fn increment_views(&self, id: PostId) -> anyhow::Result<Option<i64>> {
        let views = sqlx::query_scalar::<_, i64>(
            "UPDATE posts SET views = views + 1 WHERE id = ? AND status = 'published' RETURNING views",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(views)
    }

    #[tracing::instrument(skip_all, fields(post_id = id))]
    async fn update_post(&self, id: PostId, patch: &PostPatch) -> anyhow::Result<bool> {
        let Some(stmt) = query::update_post(id, patch) else {
            return Ok(true);
        };

        let result = bind_values(sqlx::query(&stmt.sql), &stmt.params)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Opens with the guarded status write, so the write lock is held before
    /// any read. Of several concurrent deletes only one flips the row.
    #[tracing::instrument(skip_all, fields(post_id = id))]
    async fn soft_delete(&self, id: PostId) -> anyhow::Result<Option<Vec<Attachment>>> {
        let mut tx = self.pool.begin().await?;

        let flipped = sqlx::query("UPDATE posts SET status = 'deleted' WHERE id = ? AND status = 'published'")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if flipped == 0 {
            return Ok(None);
        }

        let removed = take_attachments(&mut tx, id).await?;

        tx.commit().await?;
        Ok(Some(removed))
    }

    #[tracing::instrument(skip_all, fields(post_id = id))]
    async fn purge_post(&self, id: PostId) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM post_files WHERE post_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_published(&self, query: &ListQuery) -> anyhow::Result<Vec<PublicPost>> {
        let stmt = query::select_published(query);

        let rows = bind_values(sqlx::query(&stmt.sql), &stmt.params)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(public_post).collect::<Result<_, _>>()?)
    }

    async fn distinct_companies(&self) -> anyhow::Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT company FROM posts WHERE status = 'published' ORDER BY company",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn distinct_positions(&self) -> anyhow::Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT position FROM posts WHERE status = 'published' ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    async fn post_counts(&self, field: StatsField) -> anyhow::Result<Vec<NameCount>> {
        let column = field.column();
        let rows = sqlx::query(&format!(
            "SELECT {column} AS name, COUNT(*) AS total FROM posts WHERE status = '{PUBLISHED}' \
             GROUP BY {column} ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        let counts = rows
            .iter()
            .map(|row| -> Result<NameCount, sqlx::Error> {
                Ok(NameCount {
                    name: row.try_get("name")?,
                    total: row.try_get("total")?,
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(counts)
    }
}

#[async_trait]
impl AttachmentRepo for SqlitePostRepo {
    async fn attach(&self, post_id: PostId, file_url: String) -> anyhow::Result<Attachment> {
        let id = sqlx::query("INSERT INTO post_files (post_id, file_url) VALUES (?, ?)")
            .bind(post_id)
            .bind(&file_url)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(Attachment { id, post_id, file_url })
    }

    async fn list_attachments(&self, post_id: PostId) -> anyhow::Result<Vec<Attachment>> {
        let rows = sqlx::query("SELECT id, post_id, file_url FROM post_files WHERE post_id = ? ORDER BY id")
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(attachment).collect::<Result<_, _>>()?)
    }

    /// Opens with the row delete, so the write lock is held before the status
    /// read. A post that is absent or deleted rolls everything back.
    #[tracing::instrument(skip_all, fields(post_id = post_id))]
    async fn replace_attachments(
        &self,
        post_id: PostId,
        file_url: Option<String>,
    ) -> anyhow::Result<Option<(Vec<Attachment>, Option<Attachment>)>> {
        let mut tx = self.pool.begin().await?;

        let removed = take_attachments(&mut tx, post_id).await?;

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
        if status.as_deref() != Some(PUBLISHED) {
            debug!("attachments not replaced, post is gone");
            return Ok(None);
        }

        let attached = match file_url {
            Some(file_url) => {
                let id = sqlx::query("INSERT INTO post_files (post_id, file_url) VALUES (?, ?)")
                    .bind(post_id)
                    .bind(&file_url)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid();
                Some(Attachment { id, post_id, file_url })
            }
            None => None,
        };

        tx.commit().await?;
        Ok(Some((removed, attached)))
    }
}

/// Deletes every `post_files` row of a post inside `tx` and returns them by id.
async fn take_attachments(
    tx: &mut Transaction<'_, Sqlite>,
    post_id: PostId,
) -> anyhow::Result<Vec<Attachment>> {
    let mut removed = sqlx::query("DELETE FROM post_files WHERE post_id = ? RETURNING id, post_id, file_url")
        .bind(post_id)
        .fetch_all(&mut **tx)
        .await?
        .iter()
        .map(attachment)
        .collect::<Result<Vec<_>, _>>()?;
    removed.sort_by_key(|a| a.id);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::NaiveDate;
    use ib_core::query::{PostFilter, SortKey, SortOrder};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn new_post(title: &str, company: &str, position: &str, interviewed: u32) -> NewPost {
        NewPost {
            title: title.into(),
            company: company.into(),
            position: position.into(),
            body: None,
            interview_date: day(interviewed),
            create_date: day(20),
            pin_hash: "$argon2id$stub".into(),
        }
    }

    fn listing(sort_key: SortKey, sort_order: SortOrder, filter: PostFilter) -> ListQuery {
        ListQuery { sort_key, sort_order, limit: 50, offset: 0, filter }
    }

    #[tokio::test]
    async fn test_insert_with_file_and_read_back() {
        let repo = SqlitePostRepo::new("sqlite::memory:").await.unwrap();

        let id = repo
            .insert_post(new_post("Onsite", "Acme", "SRE", 1), Some("/uploads/posts/a.pdf".into()))
            .await
            .unwrap();

        let post = repo.find_post(id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Published);
        assert_eq!(post.interview_date, day(1));
        assert_eq!(post.views, 0);

        let files = repo.list_attachments(id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_url, "/uploads/posts/a.pdf");
    }

    #[tokio::test]
    async fn test_views_only_count_for_published_posts() {
        let repo = SqlitePostRepo::new("sqlite::memory:").await.unwrap();
        let id = repo.insert_post(new_post("t", "c", "p", 1), None).await.unwrap();

        assert_eq!(repo.increment_views(id).await.unwrap(), Some(1));
        assert_eq!(repo.increment_views(id).await.unwrap(), Some(2));

        repo.soft_delete(id).await.unwrap();
        assert_eq!(repo.increment_views(id).await.unwrap(), None);
        assert_eq!(repo.increment_views(9_999).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_post_and_returns_files() {
        let repo = SqlitePostRepo::new("sqlite::memory:").await.unwrap();
        let id = repo
            .insert_post(new_post("t", "c", "p", 1), Some("/uploads/posts/x.png".into()))
            .await
            .unwrap();
        repo.attach(id, "/uploads/posts/y.png".into()).await.unwrap();

        let removed = repo.soft_delete(id).await.unwrap().unwrap();
        assert_eq!(removed.len(), 2);

        assert!(repo.find_published(id).await.unwrap().is_none());
        assert!(repo.list_attachments(id).await.unwrap().is_empty());

        let row = repo.find_post(id).await.unwrap().unwrap();
        assert_eq!(row.status, PostStatus::Deleted);

        // Second delete finds nothing published.
        assert!(repo.soft_delete(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_update_leaves_other_columns() {
        let repo = SqlitePostRepo::new("sqlite::memory:").await.unwrap();
        let id = repo.insert_post(new_post("Old", "Acme", "SRE", 1), None).await.unwrap();

        let patch = PostPatch {
            title: Some("New".into()),
            interview_date: Some(day(9)),
            ..Default::default()
        };
        assert!(repo.update_post(id, &patch).await.unwrap());

        let post = repo.find_published(id).await.unwrap().unwrap();
        assert_eq!(post.title, "New");
        assert_eq!(post.company, "Acme");
        assert_eq!(post.interview_date, day(9));

        assert!(!repo.update_post(404, &patch).await.unwrap());
    }

    #[tokio::test]
    async fn test_pin_column_cannot_change() {
        let repo = SqlitePostRepo::new("sqlite::memory:").await.unwrap();
        let id = repo.insert_post(new_post("t", "c", "p", 1), None).await.unwrap();

        let result = sqlx::query("UPDATE posts SET pin = 'other' WHERE id = ?")
            .bind(id)
            .execute(repo.pool())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_listing_filters_sorts_and_skips_deleted() {
        let repo = SqlitePostRepo::new("sqlite::memory:").await.unwrap();
        let a = repo.insert_post(new_post("a", "Acme", "SRE", 3), None).await.unwrap();
        let b = repo.insert_post(new_post("b", "Acme", "Backend", 1), None).await.unwrap();
        let c = repo.insert_post(new_post("c", "Globex", "SRE", 2), None).await.unwrap();
        let gone = repo.insert_post(new_post("d", "Acme", "SRE", 4), None).await.unwrap();
        repo.soft_delete(gone).await.unwrap();

        let all = repo
            .list_published(&listing(SortKey::InterviewDate, SortOrder::Asc, PostFilter::default()))
            .await
            .unwrap();
        assert_eq!(all.iter().map(|p| p.id).collect::<Vec<_>>(), vec![b, c, a]);

        let acme_sre = repo
            .list_published(&listing(
                SortKey::InterviewDate,
                SortOrder::Desc,
                PostFilter { company: Some("Acme".into()), position: Some("SRE".into()) },
            ))
            .await
            .unwrap();
        assert_eq!(acme_sre.iter().map(|p| p.id).collect::<Vec<_>>(), vec![a]);

        let mut paged = listing(SortKey::InterviewDate, SortOrder::Asc, PostFilter::default());
        paged.limit = 1;
        paged.offset = 1;
        let page = repo.list_published(&paged).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, c);
    }

    #[tokio::test]
    async fn test_names_and_counts_cover_published_only() {
        let repo = SqlitePostRepo::new("sqlite::memory:").await.unwrap();
        repo.insert_post(new_post("a", "Acme", "SRE", 1), None).await.unwrap();
        repo.insert_post(new_post("b", "Acme", "Backend", 1), None).await.unwrap();
        let gone = repo.insert_post(new_post("c", "Initech", "SRE", 1), None).await.unwrap();
        repo.soft_delete(gone).await.unwrap();

        assert_eq!(repo.distinct_companies().await.unwrap(), vec!["Acme".to_string()]);
        assert_eq!(
            repo.distinct_positions().await.unwrap(),
            vec!["Backend".to_string(), "SRE".to_string()]
        );

        let counts = repo.post_counts(StatsField::Company).await.unwrap();
        assert_eq!(counts, vec![NameCount { name: "Acme".into(), total: 2 }]);
    }

    #[tokio::test]
    async fn test_replace_and_purge() {
        let repo = SqlitePostRepo::new("sqlite::memory:").await.unwrap();
        let id = repo
            .insert_post(new_post("t", "c", "p", 1), Some("/old".into()))
            .await
            .unwrap();

        let (removed, attached) = repo
            .replace_attachments(id, Some("/new".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(attached.unwrap().file_url, "/new");
        assert_eq!(repo.list_attachments(id).await.unwrap().len(), 1);

        repo.purge_post(id).await.unwrap();
        assert!(repo.find_post(id).await.unwrap().is_none());
        assert!(repo.list_attachments(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_on_deleted_post_changes_nothing() {
        let repo = SqlitePostRepo::new("sqlite::memory:").await.unwrap();
        let id = repo
            .insert_post(new_post("t", "c", "p", 1), Some("/old".into()))
            .await
            .unwrap();
        assert_eq!(repo.soft_delete(id).await.unwrap().unwrap().len(), 1);

        let outcome = repo
            .replace_attachments(id, Some("/uploads/posts/late.pdf".into()))
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(repo.list_attachments(id).await.unwrap().is_empty());

        assert!(repo.replace_attachments(404, None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_pin_operations_queue_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("board.db").display());
        let repo = Arc::new(SqlitePostRepo::connect(&url, 5).await.unwrap());
        let id = repo
            .insert_post(new_post("t", "c", "p", 1), Some("/first".into()))
            .await
            .unwrap();

        let replaces = (0..8).map(|n| {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.replace_attachments(id, Some(format!("/file-{n}"))).await })
        });
        for handle in replaces.collect::<Vec<_>>() {
            assert!(handle.await.unwrap().unwrap().is_some());
        }
        assert_eq!(repo.list_attachments(id).await.unwrap().len(), 1);

        let deletes = (0..4).map(|_| {
            let repo = Arc::clone(&repo);
            tokio::spawn(async move { repo.soft_delete(id).await })
        });
        let mut winners = 0;
        for handle in deletes.collect::<Vec<_>>() {
            if handle.await.unwrap().unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(repo.list_attachments(id).await.unwrap().is_empty());
    }
}
