//! Firebase Realtime Database 저장소 (REST)
//!
//! source: https://firebase.google.com/docs/reference/rest/database
//!
//! 경로 `a/b`는 `{database_url}/a/b.json`으로 매핑됩니다.
//! 인증 토큰이 있으면 `auth` 쿼리 파라미터로 붙입니다.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use super::tree;
use super::{DocumentStore, StoreError, StoreResult};

/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// POST 응답 (`{"name": "<push id>"}`)
#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

/// Firebase RTDB REST 클라이언트
pub struct FirebaseStore {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl FirebaseStore {
    /// 새 클라이언트 생성
    pub fn new(database_url: &str, auth_token: Option<String>) -> StoreResult<Self> {
        let base_url = Url::parse(database_url.trim_end_matches('/'))
            .map_err(|e| StoreError::Backend(format!("Invalid database URL '{}': {}", database_url, e)))?;

        if base_url.cannot_be_a_base() {
            return Err(StoreError::Backend(format!(
                "Invalid database URL '{}'",
                database_url
            )));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    /// 경로를 REST URL로 변환
    fn url_for(&self, path: &str) -> StoreResult<Url> {
        let segments = tree::split_path(path)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(StoreError::InvalidPath(path.to_string()));
        };

        let mut url = self.base_url.clone();
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| StoreError::Backend("database URL cannot be a base".to_string()))?;
            parts.pop_if_empty();
            parts.extend(parents.iter());
            parts.push(&format!("{}.json", last));
        }

        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }

        Ok(url)
    }

    fn request(&self, method: Method, path: &str) -> StoreResult<RequestBuilder> {
        let url = self.url_for(path)?;
        Ok(self.client.request(method, url))
    }

    /// 응답 상태 확인 후 본문 반환
    async fn send(&self, request: RequestBuilder) -> StoreResult<Value> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(String::from))
                .unwrap_or(body);
            return Err(StoreError::Backend(format!("Firebase {}: {}", status, message)));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl DocumentStore for FirebaseStore {
    async fn get(&self, path: &str) -> StoreResult<Option<Value>> {
        let value = self.send(self.request(Method::GET, path)?).await?;
        Ok(if tree::is_empty_node(&value) { None } else { Some(value) })
    }

    async fn set(&self, path: &str, value: Value) -> StoreResult<()> {
        let value = tree::normalize(value);
        if value.is_null() {
            return self.delete(path).await;
        }
        self.send(self.request(Method::PUT, path)?.json(&value)).await?;
        Ok(())
    }

    async fn update(&self, path: &str, partial: Map<String, Value>) -> StoreResult<()> {
        for key in partial.keys() {
            tree::split_path(key)?;
        }
        self.send(self.request(Method::PATCH, path)?.json(&partial)).await?;
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> StoreResult<String> {
        let value = tree::normalize(value);
        let body = self.send(self.request(Method::POST, path)?.json(&value)).await?;
        let pushed: PushResponse = serde_json::from_value(body)?;
        Ok(pushed.name)
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.send(self.request(Method::DELETE, path)?).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "firebase"
    }
}

// ============================================================================
// Tests
// ============================================================================
