//! 관리자 - 로그인/세션, 대시보드, 분석, API 키 관리

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_body;
use crate::config::{is_valid_gemini_key, mask_secret, update_env_file};
use crate::server::error::{ApiError, ApiResult};
use crate::server::AppState;

const DEFAULT_REALTIME_LIMIT: usize = 50;
const DEFAULT_TOP_LIMIT: usize = 10;
const DEFAULT_DAYS_TO_KEEP: u32 = 30;

// ============================================================================
// Service Info / Session
// ============================================================================

/// GET /
pub async fn service_info(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "online",
        "store": state.store_backend,
        "images_enabled": state.knowledge.images_enabled(),
        "uptime_seconds": (Utc::now() - state.started_at).num_seconds(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// POST /login
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let request = json_body(payload)?;

    if !state.auth.check_credentials(&request.username, &request.password) {
        tracing::warn!("Failed admin login for '{}'", request.username);
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "Invalid username or password",
        ));
    }

    tracing::info!("Admin '{}' logged in", request.username);
    let cookie = state.auth.session_cookie(&state.auth.issue_token());

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(json!({
            "success": true,
            "username": state.auth.username(),
        })),
    ))
}

/// POST /logout
pub async fn logout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, state.auth.clear_cookie())],
        Json(json!({ "success": true })),
    )
}

/// GET /api/admin/session
pub async fn session(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Json<Value> {
    let authenticated = state.auth.is_authenticated(&headers);
    Json(json!({
        "success": true,
        "authenticated": authenticated,
        "username": authenticated.then(|| state.auth.username()),
    }))
}

// ============================================================================
// Dashboard / Analytics
// ============================================================================

/// GET /api/admin/dashboard
pub async fn dashboard(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let stats = state.knowledge.stats().await?;
    let announcement = state.announcements.current().await;

    Ok(Json(json!({
        "success": true,
        "data": {
            "stats": stats,
            "announcement": announcement,
        }
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub date: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/admin/analytics/daily?date=
pub async fn analytics_daily(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<Value>> {
    let daily = state.analytics.daily_stats(query.date.as_deref()).await?;
    Ok(Json(json!({ "success": true, "data": daily })))
}

/// GET /api/admin/analytics/realtime?limit=
pub async fn analytics_realtime(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<Value>> {
    let logs = state
        .analytics
        .realtime_logs(query.limit.unwrap_or(DEFAULT_REALTIME_LIMIT))
        .await?;
    Ok(Json(json!({ "success": true, "data": logs })))
}

/// GET /api/admin/analytics/stats
pub async fn analytics_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let stats = state.analytics.global_stats().await?;
    Ok(Json(json!({ "success": true, "data": stats })))
}

/// GET /api/admin/analytics/top?limit=&date=
pub async fn analytics_top(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<Json<Value>> {
    let top = state
        .analytics
        .top_endpoints(
            query.limit.unwrap_or(DEFAULT_TOP_LIMIT),
            query.date.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "success": true, "data": top })))
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    pub days_to_keep: Option<u32>,
}

/// POST /api/admin/analytics/cleanup
///
/// 본문이 없으면 기본 보관 기간을 사용합니다.
pub async fn analytics_cleanup(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CleanupRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let days_to_keep = match payload {
        Ok(Json(request)) => request.days_to_keep.unwrap_or(DEFAULT_DAYS_TO_KEEP),
        Err(JsonRejection::MissingJsonContentType(_)) => DEFAULT_DAYS_TO_KEEP,
        Err(rejection) => return Err(rejection.into()),
    };

    let deleted = state.analytics.cleanup_old_logs(days_to_keep).await?;
    Ok(Json(json!({
        "success": true,
        "deleted_days": deleted,
        "days_to_keep": days_to_keep,
    })))
}

// ============================================================================
// API Key Management
// ============================================================================

/// GET /api/models/current-api-key
///
/// 전체 키는 반환하지 않습니다.
pub async fn current_api_key(State(state): State<Arc<AppState>>) -> Json<Value> {
    let key = state.gemini.as_ref().and_then(|client| client.api_key());

    match key {
        Some(key) => Json(json!({
            "success": true,
            "api_key": mask_secret(&key),
            "has_key": true,
            "key_length": key.chars().count(),
        })),
        None => Json(json!({
            "success": false,
            "message": "No API key configured",
            "api_key": "",
            "has_key": false,
        })),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateKeyRequest {
    #[serde(default)]
    pub api_key: String,
}

/// POST /api/models/update-api-key
pub async fn update_api_key(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateKeyRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = json_body(payload)?;
    let api_key = request.api_key.trim();

    if api_key.is_empty() {
        return Err(ApiError::bad_request("API key cannot be empty"));
    }
    if !is_valid_gemini_key(api_key) {
        return Err(ApiError::bad_request(
            "Invalid API key format. GEMINI API keys should start with 'AIza'",
        ));
    }

    let client = state.gemini.as_ref().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "AI client does not support key updates",
        )
    })?;
    client
        .set_api_key(api_key.to_string())
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let env_file_updated = match update_env_file(&state.env_file, "GEMINI_API_KEY", api_key) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Could not persist API key: {:#}", e);
            false
        }
    };

    let message = if env_file_updated {
        "API key updated successfully! Updated .env file"
    } else {
        "API key updated successfully! Runtime only, .env file was not updated"
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "env_file_updated": env_file_updated,
    })))
}
