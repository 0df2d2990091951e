// IN-MEMORY implementation of CommentStore.
//
// Used by the service tests and by `DATABASE_URL=memory` for local runs.
// Data is lost on restart.

use crate::core::comments::{
    Comment, CommentCounts, CommentError, CommentStatus, CommentStore, CommentUpdate, NewComment,
    StatusFilter,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

pub struct InMemoryCommentStore {
    comments: DashMap<i64, Comment>,
    content_items: DashSet<i64>,
    next_id: AtomicI64,
    /// Held by writes that have to see several rows at once (reply insert,
    /// cascade delete). Plain reads never take it.
    structure: Mutex<()>,
}

impl InMemoryCommentStore {
    pub fn new() -> Self {
        Self {
            comments: DashMap::new(),
            content_items: DashSet::new(),
            next_id: AtomicI64::new(1),
            structure: Mutex::new(()),
        }
    }

    /// Register a post that comments can attach to.
    pub fn add_content_item(&self, content_item_id: i64) {
        self.content_items.insert(content_item_id);
    }

    fn lock_structure(&self) -> Result<MutexGuard<'_, ()>, CommentError> {
        self.structure
            .lock()
            .map_err(|_| CommentError::StorageError("comment store lock poisoned".to_string()))
    }

    /// Snapshot of matching comments ordered oldest first.
    fn collect_sorted(&self, keep: impl Fn(&Comment) -> bool) -> Vec<Comment> {
        let mut comments: Vec<Comment> = self
            .comments
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        comments.sort_by_key(|c| (c.created_at, c.id));
        comments
    }
}

impl Default for InMemoryCommentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommentStore for InMemoryCommentStore {
    async fn content_item_exists(&self, content_item_id: i64) -> Result<bool, CommentError> {
        Ok(self.content_items.contains(&content_item_id))
    }

    async fn find_comment_by_id(&self, id: i64) -> Result<Option<Comment>, CommentError> {
        Ok(self.comments.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_comments_by_content_item(
        &self,
        content_item_id: i64,
        filter: StatusFilter,
    ) -> Result<Vec<Comment>, CommentError> {
        Ok(self.collect_sorted(|c| c.content_item_id == content_item_id && filter.matches(c.status)))
    }

    async fn find_comments_by_content_items(
        &self,
        content_item_ids: &[i64],
    ) -> Result<Vec<Comment>, CommentError> {
        let wanted: HashSet<i64> = content_item_ids.iter().copied().collect();
        Ok(self.collect_sorted(|c| wanted.contains(&c.content_item_id)))
    }

    async fn list_root_comments(
        &self,
        filter: StatusFilter,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Comment>, CommentError> {
        let mut roots = self.collect_sorted(|c| c.is_root() && filter.matches(c.status));
        roots.reverse();

        Ok(roots
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect())
    }

    async fn count_root_comments(&self, filter: StatusFilter) -> Result<u64, CommentError> {
        Ok(self
            .comments
            .iter()
            .filter(|entry| entry.is_root() && filter.matches(entry.status))
            .count() as u64)
    }

    async fn count_comments(&self) -> Result<CommentCounts, CommentError> {
        let mut counts = CommentCounts::default();
        for entry in self.comments.iter() {
            counts.total += 1;
            if entry.is_approved() {
                counts.approved += 1;
            } else {
                counts.pending += 1;
            }
        }
        Ok(counts)
    }

    async fn create_comment(&self, new_comment: NewComment) -> Result<Comment, CommentError> {
        let _guard = self.lock_structure()?;

        if !self.content_items.contains(&new_comment.content_item_id) {
            return Err(CommentError::post_not_found(new_comment.content_item_id));
        }

        if let Some(parent_id) = new_comment.parent_id {
            let parent_in_same_item = self
                .comments
                .get(&parent_id)
                .is_some_and(|parent| parent.content_item_id == new_comment.content_item_id);

            if !parent_in_same_item {
                return Err(CommentError::comment_not_found(parent_id));
            }
        }

        let now = Utc::now();
        let comment = Comment {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            content_item_id: new_comment.content_item_id,
            parent_id: new_comment.parent_id,
            author: new_comment.author,
            body: new_comment.body,
            status: CommentStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        self.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn update_comment(
        &self,
        id: i64,
        update: CommentUpdate,
    ) -> Result<Option<Comment>, CommentError> {
        let Some(mut entry) = self.comments.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(approved) = update.approved {
            entry.status = CommentStatus::from_approved(approved);
        }
        if let Some(body) = update.body {
            entry.body = body;
        }
        entry.updated_at = Utc::now();

        Ok(Some(entry.value().clone()))
    }

    async fn delete_comment_cascade(&self, id: i64) -> Result<Option<u64>, CommentError> {
        let _guard = self.lock_structure()?;

        if !self.comments.contains_key(&id) {
            return Ok(None);
        }

        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for entry in self.comments.iter() {
            if let Some(parent_id) = entry.parent_id {
                children.entry(parent_id).or_default().push(entry.id);
            }
        }

        let mut doomed = HashSet::from([id]);
        let mut frontier = vec![id];
        while let Some(current) = frontier.pop() {
            for &child in children.get(&current).into_iter().flatten() {
                if doomed.insert(child) {
                    frontier.push(child);
                }
            }
        }

        for doomed_id in &doomed {
            self.comments.remove(doomed_id);
        }

        Ok(Some(doomed.len() as u64 - 1))
    }

    async fn delete_comments_by_ids(&self, ids: &[i64]) -> Result<u64, CommentError> {
        let _guard = self.lock_structure()?;

        Ok(ids
            .iter()
            .filter(|&&id| self.comments.remove(&id).is_some())
            .count() as u64)
    }

    async fn set_approval_many(&self, ids: &[i64], approved: bool) -> Result<u64, CommentError> {
        let now = Utc::now();
        let mut matched = 0;

        for id in ids {
            if let Some(mut entry) = self.comments.get_mut(id) {
                entry.status = CommentStatus::from_approved(approved);
                entry.updated_at = now;
                matched += 1;
            }
        }

        Ok(matched)
    }
}
