//! `/api/announcement`

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_body;
use crate::server::error::ApiResult;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct AnnouncementRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

/// GET /api/announcement
pub async fn current(State(state): State<Arc<AppState>>) -> Json<Value> {
    let announcement = state.announcements.current().await;
    Json(json!({ "success": true, "data": announcement }))
}

/// POST /api/announcement
pub async fn update(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnnouncementRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = json_body(payload)?;
    let announcement = state
        .announcements
        .update(&request.title, &request.message)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Announcement updated successfully",
        "data": announcement,
    })))
}
