//! 메모리 저장소 - 단일 JSON 트리

use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::tree;
use super::{DocumentStore, StoreError, StoreResult};

/// 프로세스 메모리 저장소
///
/// 락은 트리 연산 하나 동안만 잡습니다.
pub struct MemoryStore {
    root: RwLock<Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(Value::Object(Map::new())),
        }
    }

    /// 초기 데이터로 생성 (테스트/시드용)
    pub fn with_data(data: Value) -> Self {
        let data = match tree::normalize(data) {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self {
            root: RwLock::new(data),
        }
    }

    fn poisoned<T>(_: T) -> StoreError {
        StoreError::Backend("memory store lock poisoned".to_string())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let segments = tree::split_path(path)?;
        let root = self.root.read().map_err(Self::poisoned)?;
        Ok(tree::get_at(&root, &segments).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let segments = tree::split_path(path)?;
        let mut root = self.root.write().map_err(Self::poisoned)?;
        tree::set_at(&mut root, &segments, value);
        Ok(())
    }

    async fn update(&self, path: &str, partial: Map<String, Value>) -> StoreResult<()> {
        let segments = tree::split_path(path)?;
        let mut root = self.root.write().map_err(Self::poisoned)?;
        tree::update_at(&mut root, &segments, partial)
    }

    async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        let mut segments = tree::split_path(path)?;
        let id = tree::generate_push_id();
        segments.push(&id);

        let mut root = self.root.write().map_err(Self::poisoned)?;
        tree::set_at(&mut root, &segments, value);
        Ok(id)
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let segments = tree::split_path(path)?;
        let mut root = self.root.write().map_err(Self::poisoned)?;
        tree::delete_at(&mut root, &segments);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let store = MemoryStore::new();

        store.set("announcement", json!({"title": "T"})).await.unwrap();
        assert_eq!(store.get("announcement").await.unwrap(), Some(json!({"title": "T"})));

        store.set("announcement", Value::Null).await.unwrap();
        assert!(store.get("announcement").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_push_and_children_order() {
        let store = MemoryStore::new();

        let a = store.push("knowledge", json!({"question": "A"})).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = store.push("knowledge", json!({"question": "B"})).await.unwrap();

        let children = store.children("knowledge").await.unwrap();
        let keys: Vec<&str> = children.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec![a.as_str(), b.as_str()]);
    }

    #[tokio::test]
    async fn test_children_follow_push_order_in_tight_loop() {
        let store = MemoryStore::new();

        let mut pushed = Vec::new();
        for i in 0..200 {
            pushed.push(store.push("knowledge", json!({"n": i})).await.unwrap());
        }

        let children = store.children("knowledge").await.unwrap();
        let keys: Vec<String> = children.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, pushed);
    }

    #[tokio::test]
    async fn test_invalid_path() {
        let store = MemoryStore::new();
        let result = store.set("knowledge/a.b", json!(1)).await;
        assert!(matches!(result, Err(StoreError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_with_data_and_delete() {
        let store = MemoryStore::with_data(json!({"schedules": {"x": {"judul": "X"}}}));
        store.delete("schedules/x").await.unwrap();

        assert!(store.get("schedules").await.unwrap().is_none());
        assert!(store.children("schedules").await.unwrap().is_empty());
    }
}
