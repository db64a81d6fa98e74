//! HTTP 서버 - axum 라우터 + 미들웨어
//!
//! - 공개 라우트: 챗, 지식/공지/일정 조회, 로그인
//! - 관리자 라우트: 쓰기 작업, 분석, API 키 관리 (`require_admin`)
//! - 모든 `/api` 요청은 분석 미들웨어가 기록

mod error;
pub mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::analytics::track_requests;
use crate::auth::require_admin;
use crate::config::Config;
use crate::media::MAX_IMAGE_BYTES;
use routes::{admin, announcement, chat, knowledge, schedule};

/// multipart 오버헤드 여유분
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

/// 라우터 구성
pub fn build_router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    // 관리자 전용
    let protected = Router::new()
        .route("/api/knowledge", post(knowledge::create))
        .route("/api/knowledge/search", post(knowledge::search))
        .route(
            "/api/knowledge/{id}",
            put(knowledge::update).delete(knowledge::delete),
        )
        .route(
            "/api/knowledge/{id}/image",
            post(knowledge::upload_image)
                .delete(knowledge::remove_image)
                .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + UPLOAD_OVERHEAD_BYTES)),
        )
        .route("/api/announcement", post(announcement::update))
        .route("/api/schedule", post(schedule::create))
        .route(
            "/api/schedule/{id}",
            put(schedule::update).delete(schedule::delete),
        )
        .route("/api/admin/dashboard", get(admin::dashboard))
        .route("/api/admin/analytics/daily", get(admin::analytics_daily))
        .route("/api/admin/analytics/realtime", get(admin::analytics_realtime))
        .route("/api/admin/analytics/stats", get(admin::analytics_stats))
        .route("/api/admin/analytics/top", get(admin::analytics_top))
        .route("/api/admin/analytics/cleanup", post(admin::analytics_cleanup))
        .route("/api/models/current-api-key", get(admin::current_api_key))
        .route("/api/models/update-api-key", post(admin::update_api_key))
        .route_layer(axum::middleware::from_fn_with_state(
            state.auth.clone(),
            require_admin,
        ));

    let public = Router::new()
        .route("/", get(admin::service_info))
        .route("/login", post(admin::login))
        .route("/logout", post(admin::logout))
        .route("/api/admin/session", get(admin::session))
        .route("/api/chat/message", post(chat::message))
        .route("/api/chat/health", get(chat::health))
        .route("/api/knowledge", get(knowledge::list))
        .route("/api/knowledge/stats", get(knowledge::stats))
        .route("/api/knowledge/{id}", get(knowledge::get))
        .route("/api/announcement", get(announcement::current))
        .route("/api/schedule", get(schedule::list))
        .route("/api/schedule/range", get(schedule::range))
        .route("/api/schedule/stats", get(schedule::stats))
        .route("/api/schedule/{id}", get(schedule::get));

    protected
        .merge(public)
        .layer(axum::middleware::from_fn_with_state(
            state.analytics.clone(),
            track_requests,
        ))
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS (허용 목록이 비면 모든 origin)
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .max_age(Duration::from_secs(3600));

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("ALLOWED_ORIGINS is not set; allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        // 쿠키 세션은 명시된 origin에만
        cors.allow_origin(origins)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true)
    }
}

/// 서버 실행 (Ctrl+C까지)
pub async fn serve(config: &Config) -> Result<()> {
    let state = Arc::new(AppState::from_config(config)?);
    let app = build_router(state, &config.server.allowed_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
