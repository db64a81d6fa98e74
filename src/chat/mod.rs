//! 챗 파이프라인 - 관련성 필터 -> 지식 검색 -> AI 답변
//!
//! 1. (선택) 학술 관련성 판정, 관련 없으면 거절 문구 (source: "filter")
//! 2. 전체 지식에서 상위 후보를 컨텍스트로 선택
//! 3. 시스템 지시문 + 컨텍스트 + 질문으로 답변 생성

use serde::Serialize;

use crate::ai::AiResponder;
use crate::error::{ServiceError, ServiceResult};
use crate::knowledge::KnowledgeService;

/// 관련 없는 질문에 대한 거절 문구
pub const FILTERED_RESPONSE: &str = "Maaf, saya hanya dapat membantu dengan pertanyaan yang berkaitan dengan akademik, pembelajaran, dan informasi kampus. Silakan ajukan pertanyaan seputar topik tersebut.";

/// 필터 응답의 source 값
pub const FILTER_SOURCE: &str = "filter";

/// 챗 응답
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub success: bool,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// 챗 서비스
#[derive(Clone)]
pub struct ChatService {
    knowledge: KnowledgeService,
    responder: AiResponder,
    relevance_check: bool,
}

impl ChatService {
    pub fn new(knowledge: KnowledgeService, responder: AiResponder, relevance_check: bool) -> Self {
        Self {
            knowledge,
            responder,
            relevance_check,
        }
    }

    /// 메시지 처리
    ///
    /// 빈 메시지만 에러. AI 실패는 응답 본문(`success: false`)으로 전달됩니다.
    pub async fn handle_message(&self, message: &str) -> ServiceResult<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ServiceError::Validation("Message is required".to_string()));
        }

        if self.relevance_check && !self.responder.check_academic_relevance(message).await {
            tracing::info!("Message filtered as non-academic");
            return Ok(ChatReply {
                success: true,
                response: FILTERED_RESPONSE.to_string(),
                source: Some(FILTER_SOURCE.to_string()),
                error: None,
                image_url: None,
            });
        }

        let found = self.knowledge.search(message).await;
        tracing::debug!(
            "Chat context: {} chars, image={}",
            found.context.len(),
            !found.image_url.is_empty()
        );

        let reply = self.responder.generate_response(message, &found.context).await;

        Ok(ChatReply {
            success: reply.success,
            response: reply.response,
            source: reply.source,
            error: reply.error,
            image_url: Some(found.image_url).filter(|url| !url.is_empty()),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiError, TextGenerator};
    use crate::knowledge::KnowledgeInput;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// 관련성 판정과 답변을 구분해 응답하는 가짜 생성기
    struct ScriptedGenerator {
        verdict: &'static str,
        answer: &'static str,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn complete(&self, prompt: &str) -> Result<String, AiError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.starts_with("Tentukan apakah") {
                Ok(self.verdict.to_string())
            } else {
                Ok(self.answer.to_string())
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn create_chat(verdict: &'static str, relevance_check: bool) -> (ChatService, Arc<ScriptedGenerator>) {
        let generator = Arc::new(ScriptedGenerator {
            verdict,
            answer: "Rektor kami Prof. Budi.",
            prompts: Mutex::new(Vec::new()),
        });
        let knowledge = KnowledgeService::new(Arc::new(MemoryStore::new()), None);
        let chat = ChatService::new(knowledge, AiResponder::new(generator.clone()), relevance_check);
        (chat, generator)
    }

    #[tokio::test]
    async fn test_relevant_message_uses_context() {
        let (chat, generator) = create_chat("YA", true);
        chat.knowledge
            .add(KnowledgeInput::new("Siapa nama rektor?", "Prof. Budi").with_keywords("rektor kampus"))
            .await
            .unwrap();

        let reply = chat.handle_message("kamu tau ga nama rektor").await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.source.as_deref(), Some("gemini-ai"));
        assert!(reply.image_url.is_none());

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Q: Siapa nama rektor?\nA: Prof. Budi"));
    }

    #[tokio::test]
    async fn test_irrelevant_message_is_filtered() {
        let (chat, generator) = create_chat("TIDAK", true);

        let reply = chat.handle_message("resep rendang").await.unwrap();
        assert!(reply.success);
        assert_eq!(reply.response, FILTERED_RESPONSE);
        assert_eq!(reply.source.as_deref(), Some(FILTER_SOURCE));
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_relevance_check_can_be_disabled() {
        let (chat, generator) = create_chat("TIDAK", false);

        let reply = chat.handle_message("resep rendang").await.unwrap();
        assert_eq!(reply.source.as_deref(), Some("gemini-ai"));
        assert_eq!(generator.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let (chat, _) = create_chat("YA", true);
        assert!(matches!(
            chat.handle_message("   ").await,
            Err(ServiceError::Validation(_))
        ));
    }
}
