// Comment service - core business logic for submission, display and moderation.
//
// This service handles:
// - Rate-limited, sanitized comment submission (always lands as pending)
// - The public view: approved comments only, as a reply tree
// - The moderation queue, single-record edits and batch actions
//
// NO HTTP or SQL dependencies here - just pure domain logic.

use super::comment_models::{
    BatchAction, BatchOutcome, Comment, CommentCounts, CommentNode, CommentUpdate, DeleteOutcome,
    ModerationPage, NewComment, StatusFilter,
};
use super::comment_store::{CommentError, CommentStore};
use super::comment_tree::build_comment_tree;
use crate::core::rate_limit::{RateLimitConfig, RateLimitResult, RateLimiter};
use crate::core::sanitize::{HtmlSanitizer, Sanitizer, MAX_BODY_CHARS};
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// A submission attempt together with the limiter's verdict.
///
/// `quota` is `None` only when the request never reached the limiter.
#[derive(Debug)]
pub struct SubmitReceipt {
    pub quota: Option<RateLimitResult>,
    pub outcome: Result<Comment, CommentError>,
}

/// Comment service for submitting, displaying and moderating comments.
pub struct CommentService<S: CommentStore> {
    store: S,
    limiter: Arc<RateLimiter>,
    policy: RateLimitConfig,
    sanitizer: Box<dyn Sanitizer>,
}

impl<S: CommentStore> CommentService<S> {
    /// Create a new comment service using the default HTML sanitizer.
    pub fn new(store: S, limiter: Arc<RateLimiter>, policy: RateLimitConfig) -> Self {
        Self {
            store,
            limiter,
            policy,
            sanitizer: Box::new(HtmlSanitizer),
        }
    }

    #[allow(dead_code)]
    pub fn with_sanitizer(mut self, sanitizer: impl Sanitizer + 'static) -> Self {
        self.sanitizer = Box::new(sanitizer);
        self
    }

    #[allow(dead_code)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Submit a new comment or reply.
    ///
    /// Checks run in order: rate limit, sanitization and spam heuristics,
    /// post existence, parent lookup. The first failure wins. A rate-limit
    /// denial never touches the store.
    pub async fn submit(
        &self,
        content_item_id: i64,
        author: &str,
        body: &str,
        parent_id: Option<i64>,
        client_id: &str,
    ) -> Result<Comment, CommentError> {
        self.submit_with_quota(content_item_id, author, body, parent_id, client_id)
            .await
            .outcome
    }

    /// Same as [`submit`](Self::submit) but also hands back the limiter result
    /// so callers can report the remaining quota.
    pub async fn submit_with_quota(
        &self,
        content_item_id: i64,
        author: &str,
        body: &str,
        parent_id: Option<i64>,
        client_id: &str,
    ) -> SubmitReceipt {
        let quota = self.limiter.check_and_consume(client_id, &self.policy);

        if !quota.allowed {
            tracing::info!(
                client_id,
                blocked = quota.blocked,
                retry_after_secs = quota.retry_after().as_secs(),
                "Comment submission rate limited"
            );
            return SubmitReceipt {
                outcome: Err(CommentError::RateLimited {
                    retry_after: quota.retry_after(),
                }),
                quota: Some(quota),
            };
        }

        let outcome = self
            .create_after_checks(content_item_id, author, body, parent_id)
            .await;

        match &outcome {
            Ok(comment) => tracing::info!(
                comment_id = comment.id,
                content_item_id,
                parent_id = ?comment.parent_id,
                "Comment submitted for moderation"
            ),
            Err(CommentError::StorageError(e)) => {
                tracing::error!(content_item_id, error = %e, "Failed to store comment")
            }
            Err(e) => tracing::debug!(content_item_id, error = %e, "Comment rejected"),
        }

        SubmitReceipt {
            quota: Some(quota),
            outcome,
        }
    }

    async fn create_after_checks(
        &self,
        content_item_id: i64,
        author: &str,
        body: &str,
        parent_id: Option<i64>,
    ) -> Result<Comment, CommentError> {
        let clean = self.sanitizer.validate_and_sanitize(author, body)?;

        if !self.store.content_item_exists(content_item_id).await? {
            return Err(CommentError::post_not_found(content_item_id));
        }

        if let Some(parent_id) = parent_id {
            let parent = self
                .store
                .find_comment_by_id(parent_id)
                .await?
                .ok_or_else(|| CommentError::comment_not_found(parent_id))?;

            if parent.content_item_id != content_item_id {
                return Err(CommentError::CrossItemReply);
            }
        }

        // The store re-checks the parent atomically with the insert
        self.store
            .create_comment(NewComment {
                content_item_id,
                parent_id,
                author: clean.author,
                body: clean.body,
            })
            .await
    }

    /// Approved comments of a post as a reply tree.
    ///
    /// Roots and replies are oldest first. Approved replies under a parent
    /// that is not approved are not shown.
    pub async fn list_approved(&self, content_item_id: i64) -> Result<Vec<CommentNode>, CommentError> {
        let comments = self
            .store
            .find_comments_by_content_item(content_item_id, StatusFilter::Approved)
            .await?;

        let tree = build_comment_tree(comments);
        tracing::debug!(
            content_item_id,
            threads = tree.len(),
            shown = tree.iter().map(CommentNode::size).sum::<usize>(),
            "Listed approved comments"
        );
        Ok(tree)
    }

    /// One page of the moderation queue.
    ///
    /// Paging applies to top-level comments (newest first). Each comes with
    /// its whole reply subtree regardless of the replies' status.
    pub async fn list_for_moderation(
        &self,
        page: u64,
        page_size: u64,
        filter: StatusFilter,
    ) -> Result<ModerationPage, CommentError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let total = self.store.count_root_comments(filter).await?;
        let roots = self
            .store
            .list_root_comments(filter, (page - 1).saturating_mul(page_size), page_size)
            .await?;

        let mut content_item_ids: Vec<i64> = roots.iter().map(|c| c.content_item_id).collect();
        content_item_ids.sort_unstable();
        content_item_ids.dedup();

        let mut trees: HashMap<i64, CommentNode> = if content_item_ids.is_empty() {
            HashMap::new()
        } else {
            let everything = self
                .store
                .find_comments_by_content_items(&content_item_ids)
                .await?;
            build_comment_tree(everything)
                .into_iter()
                .map(|node| (node.comment.id, node))
                .collect()
        };

        let comments = roots
            .into_iter()
            .map(|root| {
                trees.remove(&root.id).unwrap_or(CommentNode {
                    comment: root,
                    replies: Vec::new(),
                })
            })
            .collect();

        Ok(ModerationPage {
            comments,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size),
        })
    }

    pub async fn set_approval(&self, id: i64, approved: bool) -> Result<Comment, CommentError> {
        self.moderate(id, Some(approved), None).await
    }

    /// Replace a comment body. The new text is sanitized and length-checked
    /// but spam heuristics are skipped since moderators are trusted.
    pub async fn edit_body(&self, id: i64, new_body: &str) -> Result<Comment, CommentError> {
        self.moderate(id, None, Some(new_body)).await
    }

    /// Change approval and/or body of one comment in a single store update.
    pub async fn moderate(
        &self,
        id: i64,
        approved: Option<bool>,
        new_body: Option<&str>,
    ) -> Result<Comment, CommentError> {
        if approved.is_none() && new_body.is_none() {
            return Err(CommentError::InvalidInput(
                "nothing to update: send approved and/or content".to_string(),
            ));
        }

        let body = new_body.map(|raw| self.clean_edit(raw)).transpose()?;
        let edited = body.is_some();

        let comment = self
            .store
            .update_comment(id, CommentUpdate { approved, body })
            .await?
            .ok_or_else(|| CommentError::comment_not_found(id))?;

        tracing::info!(
            comment_id = id,
            approved = ?approved,
            edited,
            "Comment moderated"
        );
        Ok(comment)
    }

    fn clean_edit(&self, raw: &str) -> Result<String, CommentError> {
        let body = self.sanitizer.sanitize_body(raw);

        if body.is_empty() {
            return Err(CommentError::InvalidInput(
                "content must not be empty".to_string(),
            ));
        }
        if body.chars().count() > MAX_BODY_CHARS {
            return Err(CommentError::TooLong {
                field: "content",
                max: MAX_BODY_CHARS,
            });
        }
        Ok(body)
    }

    /// Delete a comment and all of its replies.
    pub async fn delete(&self, id: i64) -> Result<DeleteOutcome, CommentError> {
        let deleted_replies = self
            .store
            .delete_comment_cascade(id)
            .await?
            .ok_or_else(|| CommentError::comment_not_found(id))?;

        tracing::info!(comment_id = id, deleted_replies, "Comment deleted");
        Ok(DeleteOutcome { deleted_replies })
    }

    /// Apply one action to many comments.
    ///
    /// Unknown ids are skipped. Batch delete removes only the listed rows;
    /// their replies stay stored but are hidden from every tree.
    pub async fn batch(&self, ids: &[i64], action: BatchAction) -> Result<BatchOutcome, CommentError> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        if ids.is_empty() {
            return Err(CommentError::InvalidInput(
                "ids must not be empty".to_string(),
            ));
        }

        let affected = match action {
            BatchAction::Approve => self.store.set_approval_many(&ids, true).await?,
            BatchAction::Reject => self.store.set_approval_many(&ids, false).await?,
            BatchAction::Delete => self.store.delete_comments_by_ids(&ids).await?,
        };

        let outcome = BatchOutcome {
            action,
            requested: ids.len() as u64,
            affected,
        };

        tracing::info!(
            %action,
            requested = outcome.requested,
            affected,
            not_found = outcome.not_found(),
            "Batch moderation applied"
        );
        Ok(outcome)
    }

    pub async fn counts(&self) -> Result<CommentCounts, CommentError> {
        self.store.count_comments().await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::comments::CommentStatus;
    use crate::core::sanitize::MAX_AUTHOR_CHARS;
    use crate::infra::comments::InMemoryCommentStore;
    use std::time::Duration;

    const POST: i64 = 1;
    const OTHER_POST: i64 = 2;

    fn service() -> CommentService<InMemoryCommentStore> {
        service_with_policy(RateLimitConfig::comment_policy())
    }

    fn service_with_policy(policy: RateLimitConfig) -> CommentService<InMemoryCommentStore> {
        let store = InMemoryCommentStore::new();
        store.add_content_item(POST);
        store.add_content_item(OTHER_POST);
        CommentService::new(store, Arc::new(RateLimiter::new()), policy)
    }

    fn generous() -> RateLimitConfig {
        RateLimitConfig {
            max_requests: 1_000,
            ..RateLimitConfig::comment_policy()
        }
    }

    #[tokio::test]
    async fn test_submit_sanitizes_and_starts_pending() {
        let service = service();

        let comment = service
            .submit(POST, "<b>Ann</b>", "<p>Great   article!</p>", None, "1.1.1.1")
            .await
            .unwrap();

        assert_eq!(comment.author, "Ann");
        assert_eq!(comment.body, "Great article!");
        assert_eq!(comment.status, CommentStatus::Pending);
        assert_eq!(comment.content_item_id, POST);
        assert!(comment.is_root());

        // Pending comments are not public yet
        assert!(service.list_approved(POST).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_moderation_flow() {
        let service = service();
        let client = "10.0.0.1";

        let first = service
            .submit(POST, "Ann", "First!", None, client)
            .await
            .unwrap();
        let reply = service
            .submit(POST, "Bob", "Reply", Some(first.id), client)
            .await
            .unwrap();
        service
            .submit(POST, "Cid", "Third", None, client)
            .await
            .unwrap();

        // Fourth submission in the window escalates to a block
        let receipt = service
            .submit_with_quota(POST, "Dee", "Fourth", None, client)
            .await;
        assert!(matches!(
            receipt.outcome,
            Err(CommentError::RateLimited { retry_after }) if retry_after == Duration::from_secs(600)
        ));
        let quota = receipt.quota.unwrap();
        assert!(quota.blocked);
        assert_eq!(quota.remaining, 0);

        // Approving only the reply: its parent is still pending, so nothing shows
        service.set_approval(reply.id, true).await.unwrap();
        assert!(service.list_approved(POST).await.unwrap().is_empty());

        service.set_approval(first.id, true).await.unwrap();
        let tree = service.list_approved(POST).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].comment.id, first.id);
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].comment.id, reply.id);

        let deleted = service.delete(first.id).await.unwrap();
        assert_eq!(deleted.deleted_replies, 1);
        assert!(service.list_approved(POST).await.unwrap().is_empty());

        let counts = service.counts().await.unwrap();
        assert_eq!(
            counts,
            CommentCounts {
                total: 1,
                pending: 1,
                approved: 0
            }
        );
    }

    #[tokio::test]
    async fn test_rate_limit_is_checked_before_validation() {
        let service = service_with_policy(RateLimitConfig {
            max_requests: 1,
            ..RateLimitConfig::comment_policy()
        });

        // Invalid input still consumes quota
        let first = service.submit(POST, "", "", None, "c").await;
        assert!(matches!(first, Err(CommentError::InvalidInput(_))));

        let second = service.submit(POST, "Ann", "fine", None, "c").await;
        assert!(matches!(second, Err(CommentError::RateLimited { .. })));
        assert_eq!(service.counts().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_quota_is_reported_on_success() {
        let service = service();

        let receipt = service
            .submit_with_quota(POST, "Ann", "hello", None, "q")
            .await;
        assert!(receipt.outcome.is_ok());

        let quota = receipt.quota.unwrap();
        assert!(quota.allowed);
        assert_eq!(quota.remaining, 2);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let service = service_with_policy(generous());

        assert!(matches!(
            service.submit(POST, "   ", "body", None, "v").await,
            Err(CommentError::InvalidInput(_))
        ));
        assert!(matches!(
            service
                .submit(POST, &"a".repeat(MAX_AUTHOR_CHARS + 1), "body", None, "v")
                .await,
            Err(CommentError::TooLong { field: "author", .. })
        ));
        assert!(matches!(
            service
                .submit(POST, "Ann", &"b".repeat(MAX_BODY_CHARS + 1), None, "v")
                .await,
            Err(CommentError::TooLong { field: "content", .. })
        ));
        assert_eq!(
            service
                .submit(POST, "Ann", "cheap casino bonus", None, "v")
                .await,
            Err(CommentError::SuspiciousContent)
        );
        assert_eq!(service.counts().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_unknown_post_and_parent() {
        let service = service_with_policy(generous());

        assert_eq!(
            service.submit(99, "Ann", "hello", None, "p").await,
            Err(CommentError::post_not_found(99))
        );
        assert_eq!(
            service.submit(POST, "Ann", "hello", Some(42), "p").await,
            Err(CommentError::comment_not_found(42))
        );
    }

    #[tokio::test]
    async fn test_cross_post_reply_rejected() {
        let service = service_with_policy(generous());

        let parent = service
            .submit(POST, "Ann", "on post one", None, "x")
            .await
            .unwrap();

        assert_eq!(
            service
                .submit(OTHER_POST, "Bob", "on post two", Some(parent.id), "x")
                .await,
            Err(CommentError::CrossItemReply)
        );
    }

    #[tokio::test]
    async fn test_pending_reply_hidden_under_approved_parent() {
        let service = service_with_policy(generous());

        let root = service.submit(POST, "Ann", "root", None, "t").await.unwrap();
        let approved_reply = service
            .submit(POST, "Bob", "approved reply", Some(root.id), "t")
            .await
            .unwrap();
        service
            .submit(POST, "Cid", "pending reply", Some(root.id), "t")
            .await
            .unwrap();

        service
            .batch(&[root.id, approved_reply.id], BatchAction::Approve)
            .await
            .unwrap();

        let tree = service.list_approved(POST).await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].comment.id, approved_reply.id);
    }

    #[tokio::test]
    async fn test_cascade_delete_counts_all_descendants() {
        let service = service_with_policy(generous());

        let a = service.submit(POST, "Ann", "a", None, "d").await.unwrap();
        let b = service.submit(POST, "Bob", "b", Some(a.id), "d").await.unwrap();
        service.submit(POST, "Cid", "c", Some(b.id), "d").await.unwrap();
        let keep = service.submit(POST, "Dee", "d", None, "d").await.unwrap();

        let outcome = service.delete(a.id).await.unwrap();
        assert_eq!(outcome.deleted_replies, 2);

        let counts = service.counts().await.unwrap();
        assert_eq!(counts.total, 1);
        assert!(service.store().find_comment_by_id(keep.id).await.unwrap().is_some());

        assert_eq!(
            service.delete(a.id).await,
            Err(CommentError::comment_not_found(a.id))
        );
    }

    #[tokio::test]
    async fn test_batch_delete_leaves_replies_hidden() {
        let service = service_with_policy(generous());

        let root = service.submit(POST, "Ann", "root", None, "b").await.unwrap();
        let reply = service
            .submit(POST, "Bob", "reply", Some(root.id), "b")
            .await
            .unwrap();
        service
            .batch(&[root.id, reply.id], BatchAction::Approve)
            .await
            .unwrap();

        let outcome = service
            .batch(&[root.id, root.id, 999], BatchAction::Delete)
            .await
            .unwrap();
        assert_eq!(outcome.requested, 2);
        assert_eq!(outcome.affected, 1);
        assert_eq!(outcome.not_found(), 1);

        // The reply survives in storage but has no visible parent
        assert!(service.store().find_comment_by_id(reply.id).await.unwrap().is_some());
        assert!(service.list_approved(POST).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_requires_ids() {
        let service = service();
        assert!(matches!(
            service.batch(&[], BatchAction::Approve).await,
            Err(CommentError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_reject_unapproves() {
        let service = service_with_policy(generous());

        let c = service.submit(POST, "Ann", "hello", None, "r").await.unwrap();
        service.set_approval(c.id, true).await.unwrap();
        assert_eq!(service.list_approved(POST).await.unwrap().len(), 1);

        let outcome = service.batch(&[c.id], BatchAction::Reject).await.unwrap();
        assert_eq!(outcome.affected, 1);
        assert!(service.list_approved(POST).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_body_sanitizes_without_spam_rules() {
        let service = service_with_policy(generous());
        let c = service.submit(POST, "Ann", "hello", None, "e").await.unwrap();

        let edited = service
            .edit_body(c.id, "<i>casino</i> night recap")
            .await
            .unwrap();
        assert_eq!(edited.body, "casino night recap");
        assert_eq!(edited.status, CommentStatus::Pending);

        assert!(matches!(
            service.edit_body(c.id, "<b></b>").await,
            Err(CommentError::InvalidInput(_))
        ));
        assert!(matches!(
            service.edit_body(c.id, &"x".repeat(MAX_BODY_CHARS + 1)).await,
            Err(CommentError::TooLong { .. })
        ));
        assert_eq!(
            service.edit_body(404, "text").await,
            Err(CommentError::comment_not_found(404))
        );
        assert_eq!(
            service.set_approval(404, true).await,
            Err(CommentError::comment_not_found(404))
        );
    }

    #[tokio::test]
    async fn test_moderate_applies_both_fields_or_neither() {
        let service = service_with_policy(generous());
        let c = service.submit(POST, "Ann", "hello", None, "m").await.unwrap();

        let updated = service
            .moderate(c.id, Some(true), Some("<b>new</b> text"))
            .await
            .unwrap();
        assert_eq!(updated.body, "new text");
        assert_eq!(updated.status, CommentStatus::Approved);

        // A bad body rejects the whole update, approval included
        assert!(matches!(
            service.moderate(c.id, Some(false), Some("<i></i>")).await,
            Err(CommentError::InvalidInput(_))
        ));
        let stored = service.store().find_comment_by_id(c.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CommentStatus::Approved);
        assert_eq!(stored.body, "new text");

        assert!(matches!(
            service.moderate(c.id, None, None).await,
            Err(CommentError::InvalidInput(_))
        ));
    }

    /// Flags every comment, whatever it says.
    struct RejectAll;

    impl Sanitizer for RejectAll {
        fn sanitize_author(&self, raw: &str) -> String {
            raw.trim().to_string()
        }

        fn sanitize_body(&self, raw: &str) -> String {
            raw.trim().to_string()
        }

        fn suspicious_rule(&self, _text: &str) -> Option<&'static str> {
            Some("reject_all")
        }
    }

    #[tokio::test]
    async fn test_custom_sanitizer_is_used() {
        let service = service().with_sanitizer(RejectAll);

        assert_eq!(
            service.submit(POST, "Ann", "Great article, thanks!", None, "s").await,
            Err(CommentError::SuspiciousContent)
        );
    }

    #[tokio::test]
    async fn test_moderation_pages_roots_with_full_subtrees() {
        let service = service_with_policy(generous());

        let old_root = service.submit(POST, "Ann", "old", None, "m").await.unwrap();
        service
            .submit(POST, "Bob", "reply to old", Some(old_root.id), "m")
            .await
            .unwrap();
        let new_root = service
            .submit(OTHER_POST, "Cid", "new", None, "m")
            .await
            .unwrap();
        service.set_approval(new_root.id, true).await.unwrap();

        let page = service
            .list_for_moderation(1, 1, StatusFilter::All)
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.comments.len(), 1);
        assert_eq!(page.comments[0].comment.id, new_root.id);

        let page = service
            .list_for_moderation(2, 1, StatusFilter::All)
            .await
            .unwrap();
        assert_eq!(page.comments[0].comment.id, old_root.id);
        assert_eq!(page.comments[0].replies.len(), 1);

        let pending = service
            .list_for_moderation(1, 20, StatusFilter::Pending)
            .await
            .unwrap();
        assert_eq!(pending.total, 1);
        assert_eq!(pending.comments[0].comment.id, old_root.id);

        // Out-of-range paging parameters are clamped
        let clamped = service
            .list_for_moderation(0, 10_000, StatusFilter::All)
            .await
            .unwrap();
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.page_size, MAX_PAGE_SIZE);

        let beyond = service
            .list_for_moderation(9, 20, StatusFilter::All)
            .await
            .unwrap();
        assert!(beyond.comments.is_empty());
        assert_eq!(beyond.total, 2);
    }
}
