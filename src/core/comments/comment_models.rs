// Comment domain models.
//
// These are pure domain types with no HTTP or SQL dependencies.
// Serialized field names are camelCase because the web layer returns them as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Moderation state of a comment. New comments always start `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Pending,
    Approved,
}

impl CommentStatus {
    pub fn from_approved(approved: bool) -> Self {
        if approved {
            CommentStatus::Approved
        } else {
            CommentStatus::Pending
        }
    }

    pub fn is_approved(self) -> bool {
        self == CommentStatus::Approved
    }
}

impl std::fmt::Display for CommentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommentStatus::Pending => write!(f, "pending"),
            CommentStatus::Approved => write!(f, "approved"),
        }
    }
}

/// Which comments a query should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Approved,
}

impl StatusFilter {
    pub fn matches(self, status: CommentStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => status == CommentStatus::Pending,
            StatusFilter::Approved => status == CommentStatus::Approved,
        }
    }

    /// The `approved` column value this filter selects, `None` for all.
    pub fn approved_flag(self) -> Option<bool> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Pending => Some(false),
            StatusFilter::Approved => Some(true),
        }
    }
}

/// A stored comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    /// The post this comment belongs to
    pub content_item_id: i64,
    /// Set for threaded replies
    pub parent_id: Option<i64>,
    pub author: String,
    pub body: String,
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_approved(&self) -> bool {
        self.status.is_approved()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Everything a store needs to create a comment. Status is always pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub content_item_id: i64,
    pub parent_id: Option<i64>,
    pub author: String,
    pub body: String,
}

/// Single-record moderator mutation. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentUpdate {
    pub approved: Option<bool>,
    pub body: Option<String>,
}

/// A comment together with its replies, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of comments in this subtree, including this one.
    pub fn size(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::size).sum::<usize>()
    }
}

/// One page of the moderation queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationPage {
    /// Top-level comments (newest first), each with its full reply subtree
    pub comments: Vec<CommentNode>,
    /// Top-level comments matching the filter across all pages
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

/// Dashboard counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentCounts {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchAction {
    Approve,
    Reject,
    Delete,
}

impl std::fmt::Display for BatchAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchAction::Approve => write!(f, "approve"),
            BatchAction::Reject => write!(f, "reject"),
            BatchAction::Delete => write!(f, "delete"),
        }
    }
}

/// Result of a batch moderation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub action: BatchAction,
    /// Distinct ids the caller asked for
    pub requested: u64,
    /// Rows that were actually changed or removed
    pub affected: u64,
}

impl BatchOutcome {
    /// Requested ids that did not exist.
    pub fn not_found(&self) -> u64 {
        self.requested.saturating_sub(self.affected)
    }
}

/// Result of a single (cascading) delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub deleted_replies: u64,
}
