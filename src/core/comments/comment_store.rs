// Errors and the storage port for comments.

use super::comment_models::{Comment, CommentCounts, CommentUpdate, NewComment, StatusFilter};
use crate::core::sanitize::SanitizeError;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// Every way a comment operation can fail. Each kind maps to its own HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommentError {
    #[error("Too many comments, retry in {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("Content was rejected")]
    SuspiciousContent,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Parent comment belongs to a different post")]
    CrossItemReply,

    /// Carries the raw storage message for operator logs only.
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<SanitizeError> for CommentError {
    fn from(err: SanitizeError) -> Self {
        match err {
            SanitizeError::InvalidInput { field } => {
                CommentError::InvalidInput(format!("{field} must not be empty"))
            }
            SanitizeError::TooLong { field, max } => CommentError::TooLong { field, max },
            SanitizeError::SuspiciousContent => CommentError::SuspiciousContent,
        }
    }
}

impl CommentError {
    pub fn comment_not_found(id: i64) -> Self {
        CommentError::NotFound(format!("Comment {id}"))
    }

    pub fn post_not_found(id: i64) -> Self {
        CommentError::NotFound(format!("Post {id}"))
    }
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Trait for persisting comments.
///
/// Every method is atomic at the row level. Lists come back ordered by
/// `created_at` ascending (id breaks ties) unless stated otherwise.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Whether the post a comment would attach to exists.
    async fn content_item_exists(&self, content_item_id: i64) -> Result<bool, CommentError>;

    async fn find_comment_by_id(&self, id: i64) -> Result<Option<Comment>, CommentError>;

    /// All comments of one post matching `filter`, oldest first.
    async fn find_comments_by_content_item(
        &self,
        content_item_id: i64,
        filter: StatusFilter,
    ) -> Result<Vec<Comment>, CommentError>;

    /// All comments (any status) of several posts, oldest first.
    async fn find_comments_by_content_items(
        &self,
        content_item_ids: &[i64],
    ) -> Result<Vec<Comment>, CommentError>;

    /// Top-level comments matching `filter`, newest first.
    async fn list_root_comments(
        &self,
        filter: StatusFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Comment>, CommentError>;

    async fn count_root_comments(&self, filter: StatusFilter) -> Result<u64, CommentError>;

    /// Counters over every stored comment.
    async fn count_comments(&self) -> Result<CommentCounts, CommentError>;

    /// Insert a pending comment.
    ///
    /// For replies the parent lookup and the insert happen atomically: if the
    /// parent is gone (or not part of the same post) this fails with `NotFound`
    /// instead of creating an orphan.
    async fn create_comment(&self, new_comment: NewComment) -> Result<Comment, CommentError>;

    /// Returns `None` if no comment has this id.
    async fn update_comment(
        &self,
        id: i64,
        update: CommentUpdate,
    ) -> Result<Option<Comment>, CommentError>;

    /// Delete a comment and every descendant reply.
    ///
    /// Returns the number of deleted replies, or `None` if the comment did not exist.
    async fn delete_comment_cascade(&self, id: i64) -> Result<Option<u64>, CommentError>;

    /// Delete exactly the listed rows (replies are left alone). Returns rows removed.
    async fn delete_comments_by_ids(&self, ids: &[i64]) -> Result<u64, CommentError>;

    /// Bulk approval update. Returns rows matched.
    async fn set_approval_many(&self, ids: &[i64], approved: bool) -> Result<u64, CommentError>;
}
