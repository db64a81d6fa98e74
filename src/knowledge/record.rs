//! 지식 레코드 스키마 + 저장소 경계 검증

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ServiceError, ServiceResult};

/// 기본 카테고리
pub const DEFAULT_CATEGORY: &str = "general";

// ============================================================================
// Types
// ============================================================================

/// 질문/답변 지식 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    /// 저장소가 부여한 ID
    pub id: String,
    pub question: String,
    pub answer: String,
    pub category: String,
    /// 추가 검색어 (공백 구분)
    pub keywords: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_public_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// 생성/수정 입력
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeInput {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
}

impl KnowledgeInput {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    /// 공백 정리 + 필수 필드 검증 + 기본값 적용
    pub fn validate(self) -> ServiceResult<ValidKnowledge> {
        let question = self.question.trim().to_string();
        let answer = self.answer.trim().to_string();

        if question.is_empty() || answer.is_empty() {
            return Err(ServiceError::Validation(
                "Question and answer are required".to_string(),
            ));
        }

        let category = self
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let keywords = self
            .keywords
            .map(|k| k.trim().to_string())
            .unwrap_or_default();

        Ok(ValidKnowledge {
            question,
            answer,
            category,
            keywords,
        })
    }
}

/// 검증을 통과한 입력
#[derive(Debug, Clone)]
pub struct ValidKnowledge {
    pub question: String,
    pub answer: String,
    pub category: String,
    pub keywords: String,
}

impl ValidKnowledge {
    /// 저장소에 쓸 필드 (ID 제외)
    pub fn to_fields(&self) -> Value {
        json!({
            "question": self.question,
            "answer": self.answer,
            "category": self.category,
            "keywords": self.keywords,
        })
    }
}

// ============================================================================
// KnowledgeRecord
// ============================================================================

impl KnowledgeRecord {
    /// 저장소 노드를 레코드로 변환
    ///
    /// question/answer가 없거나 비어 있으면 None (경고 로그).
    /// keywords 배열은 공백으로 합치고, 이미지 필드가 한쪽만 있으면 둘 다 버립니다.
    pub fn from_value(id: &str, value: &Value) -> Option<Self> {
        let Some(node) = value.as_object() else {
            tracing::warn!("Skipping knowledge node {}: not an object", id);
            return None;
        };

        let text = |key: &str| -> String {
            node.get(key)
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };

        let question = text("question");
        let answer = text("answer");
        if question.is_empty() || answer.is_empty() {
            tracing::warn!("Skipping knowledge node {}: missing question or answer", id);
            return None;
        }

        let category = Some(text("category"))
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        let keywords = match node.get("keywords") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
            _ => String::new(),
        };

        let image_url = Some(text("image_url")).filter(|s| !s.is_empty());
        let image_public_id = Some(text("image_public_id")).filter(|s| !s.is_empty());
        let (image_url, image_public_id) = match (image_url, image_public_id) {
            (Some(url), Some(public_id)) => (Some(url), Some(public_id)),
            (None, None) => (None, None),
            _ => {
                tracing::warn!("Knowledge node {} has an incomplete image reference; ignoring it", id);
                (None, None)
            }
        };

        Some(Self {
            id: id.to_string(),
            question,
            answer,
            category,
            keywords,
            image_url,
            image_public_id,
            created_at: text("created_at"),
            updated_at: text("updated_at"),
        })
    }

    /// 저장소 노드 (ID는 경로에 있으므로 제외)
    pub fn to_value(&self) -> Value {
        let mut node = json!({
            "question": self.question,
            "answer": self.answer,
            "category": self.category,
            "keywords": self.keywords,
            "created_at": self.created_at,
            "updated_at": self.updated_at,
        });
        if let (Some(url), Some(public_id)) = (&self.image_url, &self.image_public_id) {
            node["image_url"] = json!(url);
            node["image_public_id"] = json!(public_id);
        }
        node
    }

    /// 매칭 대상 텍스트 (소문자)
    pub fn haystack(&self) -> String {
        format!(
            "{} {} {} {}",
            self.question, self.answer, self.keywords, self.category
        )
        .to_lowercase()
    }

    /// AI 프롬프트용 컨텍스트 블록
    pub fn context_text(&self) -> String {
        format!("Q: {}\nA: {}", self.question, self.answer)
    }
}

// ============================================================================
// Tests
// ============================================================================
