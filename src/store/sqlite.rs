//! SQLite 저장소 - 최상위 세그먼트당 JSON 한 행
//!
//! `knowledge`, `schedules`, `analytics` 같은 최상위 노드를 각각 한 행으로 저장합니다.
//! 연산마다 행을 읽어 트리 연산을 적용한 뒤 다시 씁니다.
//! 저장 위치 기본값은 설정의 `SQLITE_PATH` (~/.kampus-assistant/store.db)

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::{Map, Value};

use super::tree;
use super::{DocumentStore, StoreError, StoreResult};

/// SQLite 기반 문서 저장소
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        // 부모 디렉토리 생성
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS nodes (
                root TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create nodes table")?;

        tracing::debug!("Document store initialized at {:?}", self.db_path);
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("Lock error: {}", e)))
    }

    /// 최상위 노드 읽기 -> 트리 연산 -> 저장
    fn modify<F, T>(&self, path: &str, op: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Value, &[&str]) -> StoreResult<T>,
    {
        let segments = tree::split_path(path)?;
        let (root, rest) = segments
            .split_first()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

        let conn = self.lock()?;
        let mut node = load_root(&conn, root)?;
        let output = op(&mut node, rest)?;
        save_root(&conn, root, &node)?;
        Ok(output)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let segments = tree::split_path(path)?;
        let (root, rest) = segments
            .split_first()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

        let conn = self.lock()?;
        let node = load_root(&conn, root)?;
        Ok(tree::get_at(&node, rest).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        self.modify(path, |node, rest| {
            tree::set_at(node, rest, value);
            Ok(())
        })
    }

    async fn update(&self, path: &str, partial: Map<String, Value>) -> StoreResult<()> {
        self.modify(path, |node, rest| tree::update_at(node, rest, partial))
    }

    async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        let id = tree::generate_push_id();
        self.modify(path, |node, rest| {
            let mut segments = rest.to_vec();
            segments.push(&id);
            tree::set_at(node, &segments, value);
            Ok(())
        })?;
        Ok(id)
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.modify(path, |node, rest| {
            tree::delete_at(node, rest);
            Ok(())
        })
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn load_root(conn: &Connection, root: &str) -> StoreResult<Value> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM nodes WHERE root = ?1",
            params![root],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        Some(text) => Ok(serde_json::from_str(&text)?),
        None => Ok(Value::Null),
    }
}

fn save_root(conn: &Connection, root: &str, node: &Value) -> StoreResult<()> {
    if tree::is_empty_node(node) {
        conn.execute("DELETE FROM nodes WHERE root = ?1", params![root])?;
        return Ok(());
    }

    let text = serde_json::to_string(node)?;
    conn.execute(
        "INSERT INTO nodes (root, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(root) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![root, text, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = SqliteStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn row_count(store: &SqliteStore) -> i64 {
        let conn = store.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (_dir, store) = create_test_store();

        store
            .set("announcement", json!({"title": "Libur", "message": "Kampus tutup"}))
            .await
            .unwrap();

        let value = store.get("announcement").await.unwrap().unwrap();
        assert_eq!(value["title"], "Libur");
        assert_eq!(store.get("announcement/message").await.unwrap(), Some(json!("Kampus tutup")));
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_push_update_delete() {
        let (_dir, store) = create_test_store();

        let id = store
            .push("knowledge", json!({"question": "Q", "answer": "A"}))
            .await
            .unwrap();

        let mut partial = Map::new();
        partial.insert("answer".to_string(), json!("B"));
        store.update(&format!("knowledge/{}", id), partial).await.unwrap();

        let record = store.get(&format!("knowledge/{}", id)).await.unwrap().unwrap();
        assert_eq!(record, json!({"question": "Q", "answer": "B"}));

        store.delete(&format!("knowledge/{}", id)).await.unwrap();
        assert!(store.get("knowledge").await.unwrap().is_none());
        assert_eq!(row_count(&store), 0);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested").join("store.db");

        {
            let store = SqliteStore::open(&db_path).unwrap();
            store.set("schedules/s1", json!({"judul": "UTS"})).await.unwrap();
        }

        let store = SqliteStore::open(&db_path).unwrap();
        let children = store.children("schedules").await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].0, "s1");
        assert_eq!(store.db_path(), db_path.as_path());
    }

    #[tokio::test]
    async fn test_roots_are_independent_rows() {
        let (_dir, store) = create_test_store();

        store.set("knowledge/a", json!({"q": 1})).await.unwrap();
        store.set("analytics/stats", json!({"total_requests": 1})).await.unwrap();
        assert_eq!(row_count(&store), 2);

        store.set("analytics", Value::Null).await.unwrap();
        assert_eq!(row_count(&store), 1);
    }
}
