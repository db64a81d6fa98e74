//! 공지 - `announcement` 단일 노드

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ServiceError, ServiceResult};
use crate::store::DocumentStore;

/// 저장소 경로
pub const ANNOUNCEMENT_PATH: &str = "announcement";

const PLACEHOLDER_TITLE: &str = "Knowledge Base Update";
const PLACEHOLDER_MESSAGE: &str = "We've updated the chatbot's knowledge base with the latest information. Please review the changes and provide feedback.";

/// 공지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub title: String,
    pub message: String,
    pub updated_at: String,
}

impl Announcement {
    /// 저장된 공지가 없을 때 보여줄 기본 공지
    pub fn placeholder() -> Self {
        Self {
            title: PLACEHOLDER_TITLE.to_string(),
            message: PLACEHOLDER_MESSAGE.to_string(),
            updated_at: String::new(),
        }
    }

    fn from_value(value: &Value) -> Self {
        let text = |key: &str, default: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(default)
                .to_string()
        };

        Self {
            title: text("title", "No Title"),
            message: text("message", "No Message"),
            updated_at: text("updated_at", ""),
        }
    }
}

/// 공지 서비스
#[derive(Clone)]
pub struct AnnouncementService {
    store: Arc<dyn DocumentStore>,
}

impl AnnouncementService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// 현재 공지 (없거나 저장소 오류면 기본 공지)
    pub async fn current(&self) -> Announcement {
        match self.store.get(ANNOUNCEMENT_PATH).await {
            Ok(Some(value)) if value.is_object() => Announcement::from_value(&value),
            Ok(_) => Announcement::placeholder(),
            Err(e) => {
                tracing::error!("Failed to load announcement: {}", e);
                Announcement::placeholder()
            }
        }
    }

    /// 공지 덮어쓰기
    pub async fn update(&self, title: &str, message: &str) -> ServiceResult<Announcement> {
        let title = title.trim();
        let message = message.trim();
        if title.is_empty() || message.is_empty() {
            return Err(ServiceError::Validation(
                "Title and message are required".to_string(),
            ));
        }

        let announcement = Announcement {
            title: title.to_string(),
            message: message.to_string(),
            updated_at: Utc::now().to_rfc3339(),
        };

        self.store
            .set(ANNOUNCEMENT_PATH, json!(announcement))
            .await?;
        tracing::info!("Announcement updated: {}", announcement.title);

        Ok(announcement)
    }
}

// ============================================================================
// Tests
// ============================================================================
