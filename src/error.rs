//! 서비스 계층 공통 에러

use crate::ai::AiError;
use crate::media::MediaError;
use crate::store::StoreError;

/// 서비스 에러
///
/// HTTP 계층에서 상태 코드로 변환됩니다 (`server::ApiError`).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// 입력 검증 실패 (400)
    #[error("{0}")]
    Validation(String),

    /// 대상 없음 (404)
    #[error("{0}")]
    NotFound(String),

    /// 인증 실패 (401)
    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Ai(#[from] AiError),
}

impl ServiceError {
    pub fn not_found(what: &str, id: &str) -> Self {
        Self::NotFound(format!("{} '{}' not found", what, id))
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
