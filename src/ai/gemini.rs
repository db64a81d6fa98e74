//! Gemini 텍스트 생성 클라이언트
//!
//! source: https://ai.google.dev/api/generate-content
//!
//! API 키는 URL이 아닌 `x-goog-api-key` 헤더로 전송합니다.
//! 실행 중 키 교체를 지원합니다 (관리자 API 키 갱신).

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AiError, TextGenerator};

/// 기본 모델
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// API 기본 URL
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// 429/전송 실패 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 2;
/// 재시도 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 1000;

// ============================================================================
// GeminiClient
// ============================================================================

/// Gemini generateContent 클라이언트
pub struct GeminiClient {
    api_key: RwLock<Option<String>>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// 새 클라이언트 생성
    ///
    /// 키 없이도 생성할 수 있습니다. 호출 시 `AiError::MissingApiKey`.
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Result<Self, AiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key: RwLock::new(api_key.filter(|k| !k.trim().is_empty())),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
            client,
        })
    }

    /// API 기본 URL 변경 (프록시/테스트 서버)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// 현재 API 키
    pub fn api_key(&self) -> Option<String> {
        self.api_key.read().ok().and_then(|k| k.clone())
    }

    /// API 키 교체
    pub fn set_api_key(&self, api_key: String) -> Result<(), AiError> {
        let mut guard = self
            .api_key
            .write()
            .map_err(|_| AiError::InvalidResponse("API key lock poisoned".to_string()))?;
        *guard = Some(api_key);
        tracing::info!("Gemini API key replaced");
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        let api_key = self.api_key().ok_or(AiError::MissingApiKey)?;

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
        };

        let mut attempt = 0;
        loop {
            let result = self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &api_key)
                .json(&request)
                .send()
                .await;

            let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));

            let response = match result {
                Ok(resp) => resp,
                Err(e) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Gemini request failed ({}), retrying in {:?} (attempt {}/{})",
                        e,
                        backoff,
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(AiError::Transport(e)),
            };

            let status = response.status();
            let body = response.text().await?;

            if status.is_success() {
                return parse_response(&body);
            }

            // 429 Rate Limit - 재시도
            if status.as_u16() == 429 && attempt < MAX_RETRIES {
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }

            let message = serde_json::from_str::<GeminiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(AiError::Api {
                status: status.as_u16(),
                message,
            });
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// 응답 본문에서 텍스트 추출
///
/// 첫 후보의 text 파트를 모두 이어 붙입니다. 텍스트가 없으면 빈 문자열.
pub fn parse_response(body: &str) -> Result<String, AiError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| AiError::InvalidResponse(e.to_string()))?;

    let text = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(text)
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

// ============================================================================
// Tests
// ============================================================================
