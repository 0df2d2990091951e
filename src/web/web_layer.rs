// The web module is the HTTP adapter.
// It translates requests into core service calls and core results into
// status codes, headers and JSON. No business rules live here.

pub mod auth;
pub mod dto;
pub mod errors;
pub mod handlers;

use crate::core::captcha::HumanVerifier;
use crate::core::comments::{CommentService, CommentStore};
use axum::routing::{get, patch, post};
use axum::Router;
use std::sync::Arc;

/// Everything the handlers share.
pub struct AppState<S: CommentStore> {
    pub comments: CommentService<S>,
    pub verifier: Arc<dyn HumanVerifier>,
    pub recaptcha_min_score: f64,
    pub admin_token: Option<String>,
}

pub fn router<S: CommentStore + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route(
            "/api/posts/{id}/comments",
            get(handlers::list_comments::<S>).post(handlers::submit_comment::<S>),
        )
        .route("/api/admin/comments", get(handlers::moderation_queue::<S>))
        .route("/api/admin/comments/stats", get(handlers::comment_stats::<S>))
        .route("/api/admin/comments/batch", post(handlers::batch_moderate::<S>))
        .route(
            "/api/admin/comments/{id}",
            patch(handlers::update_comment::<S>).delete(handlers::delete_comment::<S>),
        )
        .with_state(state)
}
