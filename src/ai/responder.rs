//! 응답 구성 - 시스템 지시문 + 지식 컨텍스트 + 질문
//!
//! 프롬프트와 사용자 노출 문구는 인도네시아어입니다 (서비스 대상).

use std::sync::Arc;

use serde::Serialize;

use super::TextGenerator;

/// 성공 응답의 source 값
pub const AI_SOURCE: &str = "gemini-ai";

/// 빈 응답 안내
const EMPTY_REPLY: &str =
    "Maaf, saya tidak dapat memproses pertanyaan Anda saat ini. Silakan coba lagi.";

/// 시스템 오류 안내
const ERROR_REPLY: &str =
    "Maaf, terjadi kesalahan sistem. Silakan coba lagi dalam beberapa saat.";

/// 고정 시스템 지시문
pub const SYSTEM_PROMPT: &str = r#"Anda adalah asisten virtual akademik kampus yang membantu mahasiswa dengan informasi umum, akademik, dan pembelajaran.

Aturan penting:
1. PRIORITASKAN informasi dari konteks pengetahuan yang disediakan
2. Jika ada informasi spesifik di konteks pengetahuan, gunakan informasi tersebut sebagai jawaban utama
3. PAHAMI maksud pertanyaan meskipun disampaikan dengan cara yang berbeda:
   - "siapa nama rektor" = "kamu tau ga nama rektor" = "nama rektor siapa"
   - "universitas prabumulih" = "kampus prabumulih" = "perguruan tinggi prabumulih"
4. Hanya jawab pertanyaan yang berkaitan dengan:
   - Informasi umum tentang kampus dan pendidikan
   - Materi pembelajaran dan akademik
   - Prosedur dan kebijakan kampus
   - Panduan belajar dan tips akademik
5. Jika pertanyaan di luar topik akademik, sopan menolak dan arahkan kembali ke topik akademik
6. Gunakan bahasa Indonesia yang natural dan ramah
7. Berikan jawaban yang informatif dan membantu
8. Jika tidak ada informasi di konteks pengetahuan dan tidak yakin, sampaikan bahwa perlu konfirmasi lebih lanjut

Selalu jawab dengan nada yang supportif dan mendorong pembelajaran."#;

// ============================================================================
// Types
// ============================================================================

/// AI 답변 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiReply {
    pub success: bool,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// AiResponder
// ============================================================================

/// 답변 생성기
#[derive(Clone)]
pub struct AiResponder {
    generator: Arc<dyn TextGenerator>,
}

impl AiResponder {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// 질문 + 지식 컨텍스트로 답변 생성
    ///
    /// 실패해도 에러를 반환하지 않고 사과 문구가 담긴 응답을 돌려줍니다.
    pub async fn generate_response(&self, message: &str, context: &str) -> AiReply {
        let prompt = compose_prompt(message, context);

        match self.generator.complete(&prompt).await {
            Ok(text) if !text.trim().is_empty() => AiReply {
                success: true,
                response: text,
                source: Some(AI_SOURCE.to_string()),
                error: None,
            },
            Ok(_) => {
                tracing::warn!("{} returned an empty response", self.generator.name());
                AiReply {
                    success: false,
                    response: EMPTY_REPLY.to_string(),
                    source: None,
                    error: Some("Empty response from AI".to_string()),
                }
            }
            Err(e) => {
                tracing::error!("{} error: {}", self.generator.name(), e);
                AiReply {
                    success: false,
                    response: ERROR_REPLY.to_string(),
                    source: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// 학술 관련성 판정
    ///
    /// 응답이 정확히 "YA"(공백 제거, 대소문자 무시)면 관련 있음.
    /// 빈 응답은 관련 없음. 호출 실패만 관련 있음(true)으로 처리합니다.
    pub async fn check_academic_relevance(&self, message: &str) -> bool {
        match self.generator.complete(&relevance_prompt(message)).await {
            Ok(text) => is_affirmative(&text),
            Err(e) => {
                tracing::warn!("Academic relevance check failed ({}); allowing message", e);
                true
            }
        }
    }
}

// ============================================================================
// Prompt Builders
// ============================================================================

/// 답변 프롬프트 구성
pub fn compose_prompt(message: &str, context: &str) -> String {
    if context.trim().is_empty() {
        format!(
            "{system}\n\n\
             Pertanyaan mahasiswa: {message}\n\n\
             Catatan: Tidak ada konteks pengetahuan spesifik yang ditemukan untuk pertanyaan ini. \
             Berikan jawaban umum yang membantu atau arahkan untuk mendapatkan informasi lebih lanjut.",
            system = SYSTEM_PROMPT,
            message = message,
        )
    } else {
        format!(
            "{system}\n\n\
             KONTEKS PENGETAHUAN SPESIFIK (GUNAKAN INI SEBAGAI PRIORITAS UTAMA):\n\
             {context}\n\n\
             Pertanyaan mahasiswa: {message}\n\n\
             Instruksi: Gunakan informasi dari konteks pengetahuan di atas untuk menjawab pertanyaan. \
             Jika konteks pengetahuan mengandung jawaban yang relevan, berikan jawaban berdasarkan \
             informasi tersebut. Jawab dalam bahasa Indonesia dengan ramah dan informatif.",
            system = SYSTEM_PROMPT,
            context = context,
            message = message,
        )
    }
}

/// 관련성 판정 프롬프트
pub fn relevance_prompt(message: &str) -> String {
    format!(
        "Tentukan apakah pertanyaan berikut relevan dengan topik akademik, pendidikan, atau kampus.\n\n\
         Pertanyaan: \"{}\"\n\n\
         Jawab hanya dengan \"YA\" jika relevan dengan akademik/pendidikan/kampus, \
         atau \"TIDAK\" jika tidak relevan.",
        message
    )
}

fn is_affirmative(text: &str) -> bool {
    text.trim().to_uppercase() == "YA"
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 고정 응답 생성기 (마지막 프롬프트 기록)
    struct FixedGenerator {
        reply: Result<String, String>,
        last_prompt: Mutex<Option<String>>,
    }

    impl FixedGenerator {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                last_prompt: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("boom".to_string()),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn complete(&self, prompt: &str) -> Result<String, AiError> {
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            self.reply.clone().map_err(|message| AiError::Api {
                status: 500,
                message,
            })
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_compose_prompt_with_context() {
        let prompt = compose_prompt("siapa rektor?", "Q: Siapa rektor?\nA: Prof. Budi");
        assert!(prompt.starts_with(SYSTEM_PROMPT));
        assert!(prompt.contains("KONTEKS PENGETAHUAN SPESIFIK"));
        assert!(prompt.contains("Q: Siapa rektor?\nA: Prof. Budi"));
        assert!(prompt.contains("Pertanyaan mahasiswa: siapa rektor?"));
    }

    #[test]
    fn test_compose_prompt_without_context() {
        let prompt = compose_prompt("halo", "");
        assert!(!prompt.contains("KONTEKS PENGETAHUAN SPESIFIK"));
        assert!(prompt.contains("Tidak ada konteks pengetahuan spesifik"));
    }

    #[tokio::test]
    async fn test_generate_response_success() {
        let generator = FixedGenerator::ok("Rektor kami Prof. Budi.");
        let responder = AiResponder::new(generator.clone());

        let reply = responder.generate_response("siapa rektor", "Q: a\nA: b").await;
        assert!(reply.success);
        assert_eq!(reply.response, "Rektor kami Prof. Budi.");
        assert_eq!(reply.source.as_deref(), Some(AI_SOURCE));
        assert!(generator
            .last_prompt
            .lock()
            .unwrap()
            .as_deref()
            .unwrap()
            .contains("Q: a\nA: b"));
    }

    #[tokio::test]
    async fn test_generate_response_empty_and_error() {
        let reply = AiResponder::new(FixedGenerator::ok("  "))
            .generate_response("x", "")
            .await;
        assert!(!reply.success);
        assert_eq!(reply.error.as_deref(), Some("Empty response from AI"));
        assert_eq!(reply.response, EMPTY_REPLY);

        let reply = AiResponder::new(FixedGenerator::failing())
            .generate_response("x", "")
            .await;
        assert!(!reply.success);
        assert_eq!(reply.response, ERROR_REPLY);
        assert!(reply.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_relevance_verdicts() {
        assert!(AiResponder::new(FixedGenerator::ok(" ya \n"))
            .check_academic_relevance("jadwal kuliah")
            .await);
        assert!(!AiResponder::new(FixedGenerator::ok("TIDAK"))
            .check_academic_relevance("resep rendang")
            .await);
        assert!(!AiResponder::new(FixedGenerator::ok("YA, relevan"))
            .check_academic_relevance("x")
            .await);
    }

    #[tokio::test]
    async fn test_relevance_fails_open() {
        assert!(AiResponder::new(FixedGenerator::failing())
            .check_academic_relevance("x")
            .await);
    }

    #[tokio::test]
    async fn test_empty_relevance_verdict_is_not_relevant() {
        assert!(!AiResponder::new(FixedGenerator::ok(""))
            .check_academic_relevance("x")
            .await);
        assert!(!AiResponder::new(FixedGenerator::ok("  \n"))
            .check_academic_relevance("x")
            .await);
    }

    #[test]
    fn test_relevance_prompt_quotes_message() {
        assert!(relevance_prompt("kapan UTS?").contains("Pertanyaan: \"kapan UTS?\""));
    }
}
