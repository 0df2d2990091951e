// SQLite-backed comment store.
//
// Tables:
// - posts: The content items comments attach to
// - comments: Comments and replies (parent_id is not a foreign key so that a
//   batch delete can leave replies behind)

use crate::core::comments::{
    Comment, CommentCounts, CommentError, CommentStatus, CommentStore, CommentUpdate, NewComment,
    StatusFilter,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;

const COMMENT_COLUMNS: &str =
    "id, content_item_id, parent_id, author, body, approved, created_at, updated_at";

// Well below SQLite's bound-parameter limit
const MAX_IDS_PER_STATEMENT: usize = 500;

pub struct SqliteCommentStore {
    pool: Pool<Sqlite>,
}

impl SqliteCommentStore {
    /// Open (or create) the database at `database_url` and run migrations.
    ///
    /// Accepts a `sqlite:` URL or a plain file path.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let options = if database_url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(database_url)?
        } else {
            let path = Path::new(database_url);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            SqliteConnectOptions::new().filename(path)
        };

        let options = options.create_if_missing(true).foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        Self::from_pool(pool).await
    }

    /// A private in-memory database, mostly for tests.
    ///
    /// Every SQLite memory connection is its own database, so the pool is
    /// pinned to one connection that never expires.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: Pool<Sqlite>) -> anyhow::Result<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations to create required tables.
    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_item_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                parent_id INTEGER,
                author TEXT NOT NULL,
                body TEXT NOT NULL,
                approved BOOLEAN NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_comments_item
                ON comments(content_item_id, approved, created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_parent
                ON comments(parent_id);
            CREATE INDEX IF NOT EXISTS idx_comments_roots
                ON comments(created_at) WHERE parent_id IS NULL;
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Register a post. Returns its id.
    pub async fn create_post(&self, slug: &str, title: &str) -> Result<i64, CommentError> {
        let result = sqlx::query("INSERT INTO posts (slug, title, created_at) VALUES (?, ?, ?)")
            .bind(slug)
            .bind(title)
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.last_insert_rowid())
    }

    pub async fn delete_post(&self, id: i64) -> Result<bool, CommentError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }
}

// Appends `(?, ?, ...)` bound to `ids`
fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    builder.push("(");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");
}

fn storage_error(e: sqlx::Error) -> CommentError {
    CommentError::StorageError(e.to_string())
}

// Fixed-width so lexical order in SQL matches chronological order
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, CommentError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CommentError::StorageError(format!("bad timestamp {raw:?}: {e}")))
}

fn row_to_comment(row: &SqliteRow) -> Result<Comment, CommentError> {
    let created_at: String = row.try_get("created_at").map_err(storage_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(storage_error)?;
    let approved: bool = row.try_get("approved").map_err(storage_error)?;

    Ok(Comment {
        id: row.try_get("id").map_err(storage_error)?,
        content_item_id: row.try_get("content_item_id").map_err(storage_error)?,
        parent_id: row.try_get("parent_id").map_err(storage_error)?,
        author: row.try_get("author").map_err(storage_error)?,
        body: row.try_get("body").map_err(storage_error)?,
        status: CommentStatus::from_approved(approved),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn rows_to_comments(rows: &[SqliteRow]) -> Result<Vec<Comment>, CommentError> {
    rows.iter().map(row_to_comment).collect()
}

#[async_trait]
impl CommentStore for SqliteCommentStore {
    async fn content_item_exists(&self, content_item_id: i64) -> Result<bool, CommentError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?) AS present")
            .bind(content_item_id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        row.try_get::<bool, _>("present").map_err(storage_error)
    }

    async fn find_comment_by_id(&self, id: i64) -> Result<Option<Comment>, CommentError> {
        let row = sqlx::query(&format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;

        row.as_ref().map(row_to_comment).transpose()
    }

    async fn find_comments_by_content_item(
        &self,
        content_item_id: i64,
        filter: StatusFilter,
    ) -> Result<Vec<Comment>, CommentError> {
        let approved = filter.approved_flag();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COMMENT_COLUMNS}
            FROM comments
            WHERE content_item_id = ? AND (? IS NULL OR approved = ?)
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(content_item_id)
        .bind(approved)
        .bind(approved)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows_to_comments(&rows)
    }

    async fn find_comments_by_content_items(
        &self,
        content_item_ids: &[i64],
    ) -> Result<Vec<Comment>, CommentError> {
        let mut comments = Vec::new();

        for chunk in content_item_ids.chunks(MAX_IDS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Sqlite>::new(format!(
                "SELECT {COMMENT_COLUMNS} FROM comments WHERE content_item_id IN "
            ));
            push_id_list(&mut builder, chunk);

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error)?;
            comments.extend(rows_to_comments(&rows)?);
        }

        comments.sort_by_key(|c| (c.created_at, c.id));
        Ok(comments)
    }

    async fn list_root_comments(
        &self,
        filter: StatusFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Comment>, CommentError> {
        let approved = filter.approved_flag();
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COMMENT_COLUMNS}
            FROM comments
            WHERE parent_id IS NULL AND (? IS NULL OR approved = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(approved)
        .bind(approved)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        rows_to_comments(&rows)
    }

    async fn count_root_comments(&self, filter: StatusFilter) -> Result<u64, CommentError> {
        let approved = filter.approved_flag();
        let row = sqlx::query(
            "SELECT COUNT(*) AS roots FROM comments WHERE parent_id IS NULL AND (? IS NULL OR approved = ?)",
        )
        .bind(approved)
        .bind(approved)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        let roots: i64 = row.try_get("roots").map_err(storage_error)?;
        Ok(roots as u64)
    }

    async fn count_comments(&self) -> Result<CommentCounts, CommentError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(approved), 0) AS approved FROM comments",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        let total: i64 = row.try_get("total").map_err(storage_error)?;
        let approved: i64 = row.try_get("approved").map_err(storage_error)?;

        Ok(CommentCounts {
            total: total as u64,
            approved: approved as u64,
            pending: (total - approved) as u64,
        })
    }

    async fn create_comment(&self, new_comment: NewComment) -> Result<Comment, CommentError> {
        let now = Utc::now();
        let now_str = timestamp(now);

        let result = match new_comment.parent_id {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO comments
                        (content_item_id, parent_id, author, body, approved, created_at, updated_at)
                    VALUES (?, NULL, ?, ?, 0, ?, ?)
                    "#,
                )
                .bind(new_comment.content_item_id)
                .bind(&new_comment.author)
                .bind(&new_comment.body)
                .bind(&now_str)
                .bind(&now_str)
                .execute(&self.pool)
                .await
            }
            // Parent lookup and insert in one statement: a parent deleted
            // in the meantime means zero rows instead of an orphan.
            Some(parent_id) => {
                sqlx::query(
                    r#"
                    INSERT INTO comments
                        (content_item_id, parent_id, author, body, approved, created_at, updated_at)
                    SELECT ?, ?, ?, ?, 0, ?, ?
                    WHERE EXISTS (
                        SELECT 1 FROM comments WHERE id = ? AND content_item_id = ?
                    )
                    "#,
                )
                .bind(new_comment.content_item_id)
                .bind(parent_id)
                .bind(&new_comment.author)
                .bind(&new_comment.body)
                .bind(&now_str)
                .bind(&now_str)
                .bind(parent_id)
                .bind(new_comment.content_item_id)
                .execute(&self.pool)
                .await
            }
        };

        let result = result.map_err(|e| {
            let missing_post = e
                .as_database_error()
                .is_some_and(|db| db.is_foreign_key_violation());
            if missing_post {
                CommentError::post_not_found(new_comment.content_item_id)
            } else {
                storage_error(e)
            }
        })?;

        if result.rows_affected() == 0 {
            if let Some(parent_id) = new_comment.parent_id {
                return Err(CommentError::comment_not_found(parent_id));
            }
        }

        Ok(Comment {
            id: result.last_insert_rowid(),
            content_item_id: new_comment.content_item_id,
            parent_id: new_comment.parent_id,
            author: new_comment.author,
            body: new_comment.body,
            status: CommentStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_comment(
        &self,
        id: i64,
        update: CommentUpdate,
    ) -> Result<Option<Comment>, CommentError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE comments SET
                approved = COALESCE(?, approved),
                body = COALESCE(?, body),
                updated_at = ?
            WHERE id = ?
            RETURNING {COMMENT_COLUMNS}
            "#
        ))
        .bind(update.approved)
        .bind(update.body)
        .bind(timestamp(Utc::now()))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.as_ref().map(row_to_comment).transpose()
    }

    async fn delete_comment_cascade(&self, id: i64) -> Result<Option<u64>, CommentError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // UNION (not UNION ALL) so a corrupted parent cycle still terminates
        let result = sqlx::query(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT id FROM comments WHERE id = ?
                UNION
                SELECT c.id FROM comments c JOIN subtree s ON c.parent_id = s.id
            )
            DELETE FROM comments WHERE id IN (SELECT id FROM subtree)
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;

        Ok(result.rows_affected().checked_sub(1))
    }

    async fn delete_comments_by_ids(&self, ids: &[i64]) -> Result<u64, CommentError> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let mut deleted = 0;

        for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM comments WHERE id IN ");
            push_id_list(&mut builder, chunk);

            deleted += builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?
                .rows_affected();
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(deleted)
    }

    async fn set_approval_many(&self, ids: &[i64], approved: bool) -> Result<u64, CommentError> {
        let now = timestamp(Utc::now());
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let mut matched = 0;

        for chunk in ids.chunks(MAX_IDS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE comments SET approved = ");
            builder.push_bind(approved);
            builder.push(", updated_at = ");
            builder.push_bind(now.clone());
            builder.push(" WHERE id IN ");
            push_id_list(&mut builder, chunk);

            matched += builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?
                .rows_affected();
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(matched)
    }
}

// ============================================================================
// TESTS
// ============================================================================
