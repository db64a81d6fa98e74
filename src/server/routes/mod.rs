//! 라우트 핸들러

pub mod admin;
pub mod announcement;
pub mod chat;
pub mod knowledge;
pub mod schedule;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use super::error::ApiError;

/// JSON 본문 해제 (거부는 400 JSON 에러로)
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(ApiError::from)
}
