// JSON request bodies and query strings accepted by the HTTP API.
// Responses reuse the core models, which already serialize as camelCase.

use crate::core::comments::{BatchAction, StatusFilter};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitCommentRequest {
    pub author: String,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub recaptcha_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub status: Option<StatusFilter>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub ids: Vec<i64>,
    pub action: BatchAction,
}
