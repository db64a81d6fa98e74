//! Document Store - 계층형 JSON 문서 저장소
//!
//! 경로(`knowledge/{id}`, `schedules/{id}`, `analytics/...`)로 접근하는
//! 트리 구조 저장소입니다. 백엔드는 시작 시 설정으로 한 번 선택됩니다.
//!
//! - `memory`: 프로세스 메모리 (개발/테스트)
//! - `sqlite`: 로컬 SQLite 파일 (최상위 세그먼트당 한 행)
//! - `firebase`: Firebase Realtime Database REST API

mod firebase;
mod memory;
mod sqlite;
pub mod tree;

pub use firebase::FirebaseStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::{StoreBackend, StoreConfig};

// ============================================================================
// Errors
// ============================================================================

/// 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Store serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ============================================================================
// DocumentStore Trait
// ============================================================================

/// 계층형 문서 저장소
///
/// 모든 백엔드는 같은 의미를 가집니다:
/// null 저장은 삭제, 삭제 후 빈 부모는 제거, update는 shallow merge.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 경로의 값 조회 (없으면 None)
    async fn get(&self, path: &str) -> StoreResult<Option<Value>>;

    /// 경로에 값 저장 (덮어쓰기)
    async fn set(&self, path: &str, value: Value) -> StoreResult<()>;

    /// 자식 키 단위 병합
    async fn update(&self, path: &str, partial: Map<String, Value>) -> StoreResult<()>;

    /// 새 자식 추가 후 생성된 키 반환
    async fn push(&self, path: &str, value: Value) -> StoreResult<String>;

    /// 경로 삭제
    async fn delete(&self, path: &str) -> StoreResult<()>;

    /// 백엔드 이름 (로그/상태 표시용)
    fn backend(&self) -> &'static str;

    /// 경로 아래 자식 목록 (키 순서)
    async fn children(&self, path: &str) -> StoreResult<Vec<(String, Value)>> {
        match self.get(path).await? {
            Some(Value::Object(map)) => Ok(map.into_iter().collect()),
            _ => Ok(Vec::new()),
        }
    }
}

/// 설정에 맞는 저장소 열기
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Sqlite => Arc::new(
            SqliteStore::open(&config.sqlite_path)
                .with_context(|| format!("Failed to open store at {:?}", config.sqlite_path))?,
        ),
        StoreBackend::Firebase => {
            let firebase = config
                .firebase
                .as_ref()
                .context("Firebase backend selected but not configured")?;
            Arc::new(
                FirebaseStore::new(&firebase.database_url, firebase.auth_token.clone())
                    .context("Failed to initialize Firebase store")?,
            )
        }
    };

    tracing::info!("Document store ready (backend={})", store.backend());
    Ok(store)
}
