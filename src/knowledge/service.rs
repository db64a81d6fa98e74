//! Knowledge Service - `knowledge` 컬렉션 CRUD + 검색

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::matcher::{KnowledgeMatcher, MatchCandidate, SearchResult};
use super::record::{KnowledgeInput, KnowledgeRecord};
use crate::error::{ServiceError, ServiceResult};
use crate::media::{ImageHost, ImageUpload, MediaError, UploadedImage};
use crate::store::DocumentStore;

/// 저장소 컬렉션 경로
pub const COLLECTION: &str = "knowledge";

/// 기본 이미지 업로드 폴더
pub const IMAGE_FOLDER: &str = "knowledge";

/// 업로드 응답의 썸네일 너비 (px)
pub const THUMBNAIL_WIDTH: u32 = 400;

/// 지식 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KnowledgeStats {
    pub total_knowledge: usize,
    pub categories: BTreeMap<String, usize>,
}

/// 지식 서비스
#[derive(Clone)]
pub struct KnowledgeService {
    store: Arc<dyn DocumentStore>,
    images: Option<Arc<dyn ImageHost>>,
    image_folder: String,
    matcher: KnowledgeMatcher,
}

impl KnowledgeService {
    pub fn new(store: Arc<dyn DocumentStore>, images: Option<Arc<dyn ImageHost>>) -> Self {
        Self {
            store,
            images,
            image_folder: IMAGE_FOLDER.to_string(),
            matcher: KnowledgeMatcher::default(),
        }
    }

    /// 업로드 폴더 변경
    pub fn with_image_folder(mut self, folder: impl Into<String>) -> Self {
        self.image_folder = folder.into();
        self
    }

    /// 이미지 호스트 설정 여부
    pub fn images_enabled(&self) -> bool {
        self.images.is_some()
    }

    /// 너비 제한 썸네일 URL (이미지 호스트가 없으면 None)
    pub fn thumbnail_url(&self, public_id: &str) -> Option<String> {
        self.images
            .as_ref()
            .map(|images| images.image_url(public_id, Some(THUMBNAIL_WIDTH)))
    }

    /// 전체 레코드 (저장소 키 순서)
    ///
    /// 검증에 실패한 노드는 건너뜁니다.
    pub async fn list(&self) -> ServiceResult<Vec<KnowledgeRecord>> {
        let children = self.store.children(COLLECTION).await?;
        Ok(children
            .iter()
            .filter_map(|(id, value)| KnowledgeRecord::from_value(id, value))
            .collect())
    }

    /// ID로 조회
    pub async fn get(&self, id: &str) -> ServiceResult<KnowledgeRecord> {
        let path = record_path(id)?;
        self.store
            .get(&path)
            .await?
            .and_then(|value| KnowledgeRecord::from_value(id, &value))
            .ok_or_else(|| ServiceError::not_found("Knowledge", id))
    }

    /// 새 레코드 추가
    pub async fn add(&self, input: KnowledgeInput) -> ServiceResult<KnowledgeRecord> {
        let valid = input.validate()?;
        let now = timestamp();

        let mut node = valid.to_fields();
        node["created_at"] = json!(now);
        node["updated_at"] = json!(now);

        let id = self.store.push(COLLECTION, node.clone()).await?;
        tracing::info!("Added knowledge {}: {}", id, preview(&valid.question));

        KnowledgeRecord::from_value(&id, &node)
            .ok_or_else(|| ServiceError::Validation("Question and answer are required".to_string()))
    }

    /// 레코드 수정 (created_at과 이미지는 유지)
    pub async fn update(&self, id: &str, input: KnowledgeInput) -> ServiceResult<KnowledgeRecord> {
        let valid = input.validate()?;
        let existing = self.get(id).await?;

        let mut partial = match valid.to_fields() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let now = timestamp();
        partial.insert("updated_at".to_string(), json!(now));

        self.store.update(&record_path(id)?, partial).await?;
        tracing::info!("Updated knowledge {}", id);

        Ok(KnowledgeRecord {
            question: valid.question,
            answer: valid.answer,
            category: valid.category,
            keywords: valid.keywords,
            updated_at: now,
            ..existing
        })
    }

    /// 레코드 삭제 (첨부 이미지는 가능하면 함께 삭제)
    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        let existing = self.get(id).await?;

        self.store.delete(&record_path(id)?).await?;
        tracing::info!("Deleted knowledge {}", id);

        if let Some(public_id) = existing.image_public_id {
            self.discard_image(&public_id).await;
        }
        Ok(())
    }

    /// 이미지 업로드 후 첨부 (기존 이미지는 가능하면 삭제)
    pub async fn attach_image(
        &self,
        id: &str,
        upload: &ImageUpload,
    ) -> ServiceResult<(KnowledgeRecord, UploadedImage)> {
        let images = self.images.as_ref().ok_or(MediaError::NotConfigured)?;
        let existing = self.get(id).await?;

        upload.validate()?;
        let uploaded = images.upload(upload, &self.image_folder).await?;

        let now = timestamp();
        let mut partial = Map::new();
        partial.insert("image_url".to_string(), json!(uploaded.url));
        partial.insert("image_public_id".to_string(), json!(uploaded.public_id));
        partial.insert("updated_at".to_string(), json!(now));
        self.store.update(&record_path(id)?, partial).await?;

        if let Some(previous) = existing.image_public_id.as_deref() {
            if previous != uploaded.public_id {
                self.discard_image(previous).await;
            }
        }

        tracing::info!("Attached image {} to knowledge {}", uploaded.public_id, id);

        let record = KnowledgeRecord {
            image_url: Some(uploaded.url.clone()),
            image_public_id: Some(uploaded.public_id.clone()),
            updated_at: now,
            ..existing
        };
        Ok((record, uploaded))
    }

    /// 첨부 이미지 제거
    pub async fn remove_image(&self, id: &str) -> ServiceResult<KnowledgeRecord> {
        let existing = self.get(id).await?;
        let Some(public_id) = existing.image_public_id.clone() else {
            return Err(ServiceError::NotFound(format!(
                "Knowledge '{}' has no image",
                id
            )));
        };

        let now = timestamp();
        let mut partial = Map::new();
        partial.insert("image_url".to_string(), Value::Null);
        partial.insert("image_public_id".to_string(), Value::Null);
        partial.insert("updated_at".to_string(), json!(now));
        self.store.update(&record_path(id)?, partial).await?;

        self.discard_image(&public_id).await;
        tracing::info!("Removed image from knowledge {}", id);

        Ok(KnowledgeRecord {
            image_url: None,
            image_public_id: None,
            updated_at: now,
            ..existing
        })
    }

    /// 카테고리별 통계
    pub async fn stats(&self) -> ServiceResult<KnowledgeStats> {
        let records = self.list().await?;

        let mut categories = BTreeMap::new();
        for record in &records {
            *categories.entry(record.category.clone()).or_insert(0) += 1;
        }

        Ok(KnowledgeStats {
            total_knowledge: records.len(),
            categories,
        })
    }

    /// 챗 컨텍스트 검색 (실패 시 빈 결과)
    pub async fn search(&self, query: &str) -> SearchResult {
        match self.list().await {
            Ok(corpus) => self.matcher.search(query, &corpus),
            Err(e) => {
                tracing::error!("Knowledge search failed: {}", e);
                SearchResult::default()
            }
        }
    }

    /// 점수순 후보 목록 (진단용)
    pub async fn rank(&self, query: &str) -> ServiceResult<Vec<MatchCandidate>> {
        let corpus = self.list().await?;
        Ok(self.matcher.rank(query, &corpus))
    }

    /// 한 번의 조회로 후보 목록과 챗 컨텍스트를 함께 반환
    pub async fn explain(&self, query: &str) -> ServiceResult<(Vec<MatchCandidate>, SearchResult)> {
        let candidates = self.rank(query).await?;
        let result = self.matcher.summarize(&candidates);
        Ok((candidates, result))
    }

    /// 이미지 삭제 시도 (실패는 로그만)
    async fn discard_image(&self, public_id: &str) {
        let Some(images) = &self.images else {
            tracing::warn!("Image host not configured; leaving {} in place", public_id);
            return;
        };

        match images.delete(public_id).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Image host did not delete {}", public_id),
            Err(e) => tracing::warn!("Failed to delete image {}: {}", public_id, e),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn record_path(id: &str) -> ServiceResult<String> {
    crate::store::tree::validate_segment(id)
        .map_err(|_| ServiceError::not_found("Knowledge", id))?;
    Ok(format!("{}/{}", COLLECTION, id))
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}

// ============================================================================
// Tests
// ============================================================================
