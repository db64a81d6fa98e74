//! `/api/schedule`

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_body;
use crate::schedule::ScheduleInput;
use crate::server::error::ApiResult;
use crate::server::AppState;

/// GET /api/schedule
pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let events = state.schedules.list().await?;
    Ok(Json(json!({ "success": true, "data": events })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
}

/// GET /api/schedule/range?start_date=&end_date=
pub async fn range(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Value>> {
    let events = state
        .schedules
        .range(query.start_date.trim(), query.end_date.trim())
        .await?;
    Ok(Json(json!({ "success": true, "data": events })))
}

/// GET /api/schedule/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let stats = state.schedules.stats().await?;
    Ok(Json(json!({ "success": true, "data": stats })))
}

/// GET /api/schedule/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let event = state.schedules.get(&id).await?;
    Ok(Json(json!({ "success": true, "data": event })))
}

/// POST /api/schedule
pub async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScheduleInput>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let event = state.schedules.create(&json_body(payload)?).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Schedule created successfully",
        "data": event,
    })))
}

/// PUT /api/schedule/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ScheduleInput>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let event = state.schedules.update(&id, &json_body(payload)?).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Schedule updated successfully",
        "data": event,
    })))
}

/// DELETE /api/schedule/{id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.schedules.delete(&id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Schedule deleted successfully",
    })))
}
