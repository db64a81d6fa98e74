//! AI 모듈 - 텍스트 생성 + 응답 구성
//!
//! - `TextGenerator`: 프롬프트 -> 텍스트 (Gemini 구현)
//! - `AiResponder`: 시스템 지시문 + 지식 컨텍스트로 답변 생성, 학술 관련성 판정

mod gemini;
mod responder;

pub use gemini::{parse_response, GeminiClient, DEFAULT_MODEL};
pub use responder::{
    compose_prompt, relevance_prompt, AiReply, AiResponder, AI_SOURCE, SYSTEM_PROMPT,
};

use async_trait::async_trait;

/// AI 호출 에러
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI API key is not configured")]
    MissingApiKey,

    #[error("AI request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("AI API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid AI response: {0}")]
    InvalidResponse(String),
}

/// 텍스트 생성기 트레이트
///
/// 응답에 텍스트가 없으면 에러가 아니라 빈 문자열을 반환합니다.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// 프롬프트 완성
    async fn complete(&self, prompt: &str) -> Result<String, AiError>;

    /// 생성기 이름
    fn name(&self) -> &str;
}
