// Route handlers. Each one translates HTTP into a CommentService call and
// the result back into a status code, headers and JSON.

use super::auth::{client_identifier, AdminAuth};
use super::dto::{BatchRequest, ModerationQuery, SubmitCommentRequest, UpdateCommentRequest};
use super::errors::{ceil_secs, ApiError};
use super::AppState;
use crate::core::comments::{
    BatchOutcome, Comment, CommentCounts, CommentNode, CommentStore, DeleteOutcome,
    ModerationPage, DEFAULT_PAGE_SIZE,
};
use crate::core::rate_limit::RateLimitResult;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

type Shared<S> = State<Arc<AppState<S>>>;

fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

// ============================================================================
// PUBLIC
// ============================================================================

/// `GET /api/posts/{id}/comments`
pub async fn list_comments<S: CommentStore + 'static>(
    State(state): Shared<S>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<CommentNode>>, ApiError> {
    let post_id = path_id(path)?;
    let tree = state.comments.list_approved(post_id).await?;
    Ok(Json(tree))
}

/// `POST /api/posts/{id}/comments`
pub async fn submit_comment<S: CommentStore + 'static>(
    State(state): Shared<S>,
    path: Result<Path<i64>, PathRejection>,
    headers: HeaderMap,
    body: Result<Json<SubmitCommentRequest>, JsonRejection>,
) -> Response {
    let (post_id, request) = match path_id(path).and_then(|id| Ok((id, json_body(body)?))) {
        Ok(parsed) => parsed,
        Err(err) => return err.into_response(),
    };

    let client_id = client_identifier(&headers);

    if let Err(err) = verify_human(&state, &request, &client_id).await {
        return err.into_response();
    }

    let receipt = state
        .comments
        .submit_with_quota(
            post_id,
            &request.author,
            &request.content,
            request.parent_id,
            &client_id,
        )
        .await;

    let mut response = match receipt.outcome {
        Ok(comment) => (StatusCode::CREATED, Json(comment)).into_response(),
        Err(err) => ApiError::from(err).into_response(),
    };

    if let Some(quota) = &receipt.quota {
        apply_quota_headers(response.headers_mut(), quota);
    }
    response
}

async fn verify_human<S: CommentStore>(
    state: &AppState<S>,
    request: &SubmitCommentRequest,
    client_id: &str,
) -> Result<(), ApiError> {
    if !state.verifier.is_enabled() {
        return Ok(());
    }

    let Some(token) = request.recaptcha_token.as_deref() else {
        return Err(ApiError::CaptchaFailed);
    };

    let remote_ip = (client_id != "unknown").then_some(client_id);
    let outcome = state.verifier.verify(token, remote_ip).await.map_err(|e| {
        tracing::error!(error = %e, "Human verification unavailable");
        ApiError::CaptchaUnavailable
    })?;

    if outcome.is_human(state.recaptcha_min_score) {
        Ok(())
    } else {
        tracing::info!(
            client_id,
            score = ?outcome.score,
            error_codes = ?outcome.error_codes,
            "Human verification failed"
        );
        Err(ApiError::CaptchaFailed)
    }
}

fn apply_quota_headers(headers: &mut HeaderMap, quota: &RateLimitResult) {
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(ceil_secs(quota.reset_in)));
}

// ============================================================================
// MODERATION
// ============================================================================

/// `GET /api/admin/comments?page=&pageSize=&status=`
pub async fn moderation_queue<S: CommentStore + 'static>(
    _admin: AdminAuth,
    State(state): Shared<S>,
    query: Result<Query<ModerationQuery>, QueryRejection>,
) -> Result<Json<ModerationPage>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let page = state
        .comments
        .list_for_moderation(
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            query.status.unwrap_or_default(),
        )
        .await?;
    Ok(Json(page))
}

/// `GET /api/admin/comments/stats`
pub async fn comment_stats<S: CommentStore + 'static>(
    _admin: AdminAuth,
    State(state): Shared<S>,
) -> Result<Json<CommentCounts>, ApiError> {
    Ok(Json(state.comments.counts().await?))
}

/// `PATCH /api/admin/comments/{id}`
pub async fn update_comment<S: CommentStore + 'static>(
    _admin: AdminAuth,
    State(state): Shared<S>,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateCommentRequest>, JsonRejection>,
) -> Result<Json<Comment>, ApiError> {
    let id = path_id(path)?;
    let request = json_body(body)?;

    let comment = state
        .comments
        .moderate(id, request.approved, request.content.as_deref())
        .await?;
    Ok(Json(comment))
}

/// `DELETE /api/admin/comments/{id}`
pub async fn delete_comment<S: CommentStore + 'static>(
    _admin: AdminAuth,
    State(state): Shared<S>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let id = path_id(path)?;
    Ok(Json(state.comments.delete(id).await?))
}

/// `POST /api/admin/comments/batch`
pub async fn batch_moderate<S: CommentStore + 'static>(
    _admin: AdminAuth,
    State(state): Shared<S>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchOutcome>, ApiError> {
    let request = json_body(body)?;
    Ok(Json(state.comments.batch(&request.ids, request.action).await?))
}

// ============================================================================
// TESTS
// ============================================================================
