//! JSON 트리 연산 - 경로 기반 get/set/update/delete
//!
//! 메모리/SQLite 백엔드가 공유하는 순수 함수들입니다.
//! Firebase Realtime Database의 의미를 따릅니다:
//! null 저장 = 삭제, 빈 부모 노드는 자동 제거.
//!
//! source: https://firebase.google.com/docs/database/rest/save-data

use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};

use super::{StoreError, StoreResult};

/// 경로 세그먼트에 쓸 수 없는 문자
pub const FORBIDDEN_CHARS: [char; 5] = ['.', '#', '$', '[', ']'];

// ============================================================================
// Path Handling
// ============================================================================

/// 경로를 세그먼트로 분리하고 검증
///
/// 앞뒤 `/`는 무시합니다. 빈 경로, 빈 세그먼트(`a//b`),
/// 금지 문자가 들어간 세그먼트는 거부됩니다.
pub fn split_path(path: &str) -> StoreResult<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath("path must not be empty".to_string()));
    }

    trimmed
        .split('/')
        .map(|segment| validate_segment(segment).map(|_| segment))
        .collect()
}

/// 단일 키 검증 (push ID, update 키 등)
pub fn validate_segment(segment: &str) -> StoreResult<()> {
    if segment.is_empty() {
        return Err(StoreError::InvalidPath("empty path segment".to_string()));
    }
    if segment.chars().any(|c| FORBIDDEN_CHARS.contains(&c)) {
        return Err(StoreError::InvalidPath(format!(
            "segment '{}' contains one of . # $ [ ]",
            segment
        )));
    }
    Ok(())
}

// ============================================================================
// Tree Operations
// ============================================================================

/// 경로의 노드 조회
pub fn get_at<'a>(node: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let found = segments
        .iter()
        .try_fold(node, |current, segment| current.as_object()?.get(*segment))?;

    if is_empty_node(found) {
        None
    } else {
        Some(found)
    }
}

/// 경로에 값 저장 (중간 노드는 필요하면 생성)
///
/// null 또는 빈 객체를 저장하면 삭제와 같습니다.
pub fn set_at(node: &mut Value, segments: &[&str], value: Value) {
    let value = normalize(value);
    if value.is_null() {
        delete_at(node, segments);
        return;
    }

    let Some((last, parents)) = segments.split_last() else {
        *node = value;
        return;
    };

    let mut current = node;
    for segment in parents {
        current = ensure_object(current)
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    ensure_object(current).insert(last.to_string(), value);
}

/// 자식 키 단위 병합 (shallow merge)
///
/// 키에 `/`가 있으면 하위 경로로 취급합니다. null 값은 해당 자식을 삭제합니다.
pub fn update_at(node: &mut Value, segments: &[&str], partial: Map<String, Value>) -> StoreResult<()> {
    // 검증을 먼저 끝내야 부분 적용이 일어나지 않음
    let mut resolved = Vec::with_capacity(partial.len());
    for (key, value) in partial {
        let child: Vec<String> = split_path(&key)?.into_iter().map(String::from).collect();
        resolved.push((child, value));
    }

    for (child, value) in resolved {
        let mut full: Vec<&str> = segments.to_vec();
        full.extend(child.iter().map(String::as_str));
        set_at(node, &full, value);
    }
    Ok(())
}

/// 경로의 노드 삭제 후 비게 된 부모 정리
///
/// 실제로 무언가 삭제되었으면 true.
pub fn delete_at(node: &mut Value, segments: &[&str]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        let existed = !is_empty_node(node);
        *node = Value::Null;
        return existed;
    };

    let Value::Object(map) = node else {
        return false;
    };

    if rest.is_empty() {
        return map.remove(*first).is_some();
    }

    let Some(child) = map.get_mut(*first) else {
        return false;
    };

    let removed = delete_at(child, rest);
    if is_empty_node(child) {
        map.remove(*first);
    }
    removed
}

/// null 또는 빈 객체인지
pub fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// 저장 전에 null 자식과 빈 객체를 재귀적으로 제거
pub fn normalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalize(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();

            if cleaned.is_empty() {
                Value::Null
            } else {
                Value::Object(cleaned)
            }
        }
        other => other,
    }
}

// ============================================================================
// Push IDs
// ============================================================================

/// 마지막으로 발급한 (밀리초, 접미사)
static LAST_PUSH: Mutex<(u64, u32)> = Mutex::new((0, 0));

/// 시간순 정렬되는 push ID 생성
///
/// 밀리초 타임스탬프(16진수 12자리) + 접미사(16진수 8자리).
/// 새 밀리초에서는 접미사를 랜덤으로 시작하고, 같은 밀리초 안에서는 1씩 증가시킵니다.
/// 프로세스 안에서 사전순 정렬이 생성 순서와 같습니다.
pub fn generate_push_id() -> String {
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
    let mut last = LAST_PUSH.lock().unwrap_or_else(PoisonError::into_inner);
    let (last_millis, last_suffix) = *last;

    let next = if now > last_millis {
        (now, random_suffix())
    } else if last_suffix < u32::MAX {
        // 같은 밀리초 또는 시계 역행
        (last_millis, last_suffix + 1)
    } else {
        (last_millis + 1, random_suffix())
    };

    *last = next;
    format!("{:012x}{:08x}", next.0, next.1)
}

/// 증가 여유를 위해 최상위 비트를 비운 랜덤 값
fn random_suffix() -> u32 {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) >> 1
}

// ============================================================================
// Helper Functions
// ============================================================================

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("knowledge/abc").unwrap(), vec!["knowledge", "abc"]);
        assert_eq!(split_path("/announcement/").unwrap(), vec!["announcement"]);

        assert!(split_path("").is_err());
        assert!(split_path("/").is_err());
        assert!(split_path("a//b").is_err());
        assert!(split_path("a/b.c").is_err());
        assert!(split_path("a/$b").is_err());
        assert!(split_path("a/[0]").is_err());
    }

    #[test]
    fn test_set_and_get() {
        let mut root = json!({});
        set_at(&mut root, &["knowledge", "k1"], json!({"question": "Q"}));

        assert_eq!(get_at(&root, &["knowledge", "k1", "question"]), Some(&json!("Q")));
        assert!(get_at(&root, &["knowledge", "missing"]).is_none());
        assert!(get_at(&root, &["knowledge", "k1", "question", "deeper"]).is_none());
    }

    #[test]
    fn test_set_overwrites_scalar_parent() {
        let mut root = json!({"a": 5});
        set_at(&mut root, &["a", "b"], json!(1));
        assert_eq!(root, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_set_null_deletes_and_prunes() {
        let mut root = json!({"analytics": {"daily": {"2024-01-01": {"GET_x": {"count": 1}}}}});
        set_at(&mut root, &["analytics", "daily", "2024-01-01", "GET_x"], Value::Null);
        assert_eq!(root, json!({}));
    }

    #[test]
    fn test_set_strips_nulls() {
        let mut root = json!({});
        set_at(&mut root, &["n"], json!({"a": 1, "b": null, "c": {}}));
        assert_eq!(root, json!({"n": {"a": 1}}));
    }

    #[test]
    fn test_update_is_shallow_merge() {
        let mut root = json!({"k": {"question": "Q", "answer": "A", "image_url": "u"}});
        let partial = json!({"answer": "B", "image_url": null, "meta/source": "cli"});
        update_at(&mut root, &["k"], partial.as_object().unwrap().clone()).unwrap();

        assert_eq!(
            root,
            json!({"k": {"question": "Q", "answer": "B", "meta": {"source": "cli"}}})
        );
    }

    #[test]
    fn test_update_rejects_invalid_keys_without_partial_write() {
        let mut root = json!({"k": {"a": 1}});
        let partial = json!({"b": 2, "bad.key": 3});
        let result = update_at(&mut root, &["k"], partial.as_object().unwrap().clone());

        assert!(result.is_err());
        assert_eq!(root, json!({"k": {"a": 1}}));
    }

    #[test]
    fn test_delete_keeps_siblings() {
        let mut root = json!({"schedules": {"a": {"judul": "A"}, "b": {"judul": "B"}}});
        assert!(delete_at(&mut root, &["schedules", "a"]));
        assert!(!delete_at(&mut root, &["schedules", "a"]));
        assert_eq!(root, json!({"schedules": {"b": {"judul": "B"}}}));
    }

    #[test]
    fn test_delete_root_node() {
        let mut node = json!({"title": "T"});
        assert!(delete_at(&mut node, &[]));
        assert!(node.is_null());
    }

    #[test]
    fn test_push_ids_are_ordered() {
        let first = generate_push_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = generate_push_id();

        assert_eq!(first.len(), 20);
        assert!(first < second);
        assert!(validate_segment(&first).is_ok());
    }

    #[test]
    fn test_push_ids_ordered_within_same_millisecond() {
        let ids: Vec<String> = (0..500).map(|_| generate_push_id()).collect();

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(ids.iter().all(|id| id.len() == 20));
    }
}
