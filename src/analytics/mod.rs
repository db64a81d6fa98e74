//! 요청 분석 - 일별 엔드포인트 카운터 + 실시간 로그 + 전체 통계
//!
//! 저장 구조:
//! - `analytics/daily/{YYYY-MM-DD}/{METHOD}_{endpoint}`: 엔드포인트별 카운터
//! - `analytics/realtime/{id}`: 최근 요청 (최신 100개 유지)
//! - `analytics/stats`: 전체 요청/에러 수
//!
//! 카운터 갱신은 read-modify-write라 동시 요청에서 일부 증가분이 유실될 수 있습니다.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ServiceResult;
use crate::schedule::now_wib;
use crate::store::{tree, DocumentStore};

const DAILY_PATH: &str = "analytics/daily";
const REALTIME_PATH: &str = "analytics/realtime";
const STATS_PATH: &str = "analytics/stats";

/// 실시간 로그 보관 개수
pub const REALTIME_LIMIT: usize = 100;

const MAX_IP_CHARS: usize = 15;
const MAX_USER_AGENT_CHARS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// 기록할 요청 정보
#[derive(Debug, Clone)]
pub struct RequestLog {
    pub endpoint: String,
    pub method: String,
    pub status_code: u16,
    /// 초 단위
    pub response_time: f64,
    pub ip: String,
    pub user_agent: String,
}

impl RequestLog {
    fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}

/// 일별 엔드포인트 카운터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointStats {
    pub endpoint: String,
    pub method: String,
    pub count: u64,
    pub total_response_time: f64,
    pub avg_response_time: f64,
    pub errors: u64,
    pub last_request: String,
    pub status_codes: BTreeMap<String, u64>,
}

/// 일별 통계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    pub date: String,
    pub endpoints: Vec<EndpointStats>,
    pub total_requests: u64,
    pub total_errors: u64,
}

/// 전체 통계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalStats {
    pub total_requests: u64,
    pub total_errors: u64,
    /// 퍼센트 (소수 2자리)
    pub error_rate: f64,
    pub last_updated: String,
}

// ============================================================================
// AnalyticsService
// ============================================================================

/// 분석 서비스
#[derive(Clone)]
pub struct AnalyticsService {
    store: Arc<dyn DocumentStore>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// 요청 기록 (실패는 로그만 남김)
    pub async fn log_request(&self, entry: &RequestLog) {
        self.log_request_at(entry, now_wib()).await;
    }

    /// 지정 시각으로 요청 기록
    pub async fn log_request_at(&self, entry: &RequestLog, now: DateTime<FixedOffset>) {
        if let Err(e) = self.record(entry, now).await {
            tracing::warn!("Failed to log analytics for {}: {}", entry.endpoint, e);
        }
    }

    async fn record(&self, entry: &RequestLog, now: DateTime<FixedOffset>) -> ServiceResult<()> {
        let timestamp = now.to_rfc3339();
        let date_key = now.format("%Y-%m-%d").to_string();

        // 1. 일별 엔드포인트 카운터
        let endpoint_path = format!(
            "{}/{}/{}",
            DAILY_PATH,
            date_key,
            endpoint_key(&entry.method, &entry.endpoint)
        );
        let mut stats: EndpointStats = match self.store.get(&endpoint_path).await? {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => EndpointStats::default(),
        };

        stats.endpoint = entry.endpoint.clone();
        stats.method = entry.method.clone();
        stats.count += 1;
        stats.total_response_time += entry.response_time;
        stats.avg_response_time = round_to(stats.total_response_time / stats.count as f64, 3);
        if entry.is_error() {
            stats.errors += 1;
        }
        stats.last_request = timestamp.clone();
        *stats
            .status_codes
            .entry(entry.status_code.to_string())
            .or_insert(0) += 1;

        self.store.set(&endpoint_path, json!(stats)).await?;

        // 2. 실시간 로그
        let id: String = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let log = json!({
            "id": id,
            "endpoint": entry.endpoint,
            "method": entry.method,
            "status_code": entry.status_code,
            "response_time": round_to(entry.response_time, 3),
            "timestamp": timestamp,
            "ip": truncate(&entry.ip, MAX_IP_CHARS),
            "user_agent": truncate(&entry.user_agent, MAX_USER_AGENT_CHARS),
        });
        self.store
            .set(&format!("{}/{}", REALTIME_PATH, id), log)
            .await?;
        self.prune_realtime().await?;

        // 3. 전체 통계
        let global = self.store.get(STATS_PATH).await?.unwrap_or(Value::Null);
        let total_requests = global["total_requests"].as_u64().unwrap_or(0) + 1;
        let total_errors =
            global["total_errors"].as_u64().unwrap_or(0) + u64::from(entry.is_error());

        let mut partial = Map::new();
        partial.insert("total_requests".to_string(), json!(total_requests));
        partial.insert("total_errors".to_string(), json!(total_errors));
        partial.insert("last_updated".to_string(), json!(timestamp));
        self.store.update(STATS_PATH, partial).await?;

        Ok(())
    }

    /// 오래된 실시간 로그 삭제 (최신 REALTIME_LIMIT개 유지)
    async fn prune_realtime(&self) -> ServiceResult<()> {
        let logs = self.realtime_logs(usize::MAX).await?;
        if logs.len() <= REALTIME_LIMIT {
            return Ok(());
        }

        let stale: Map<String, Value> = logs[REALTIME_LIMIT..]
            .iter()
            .filter_map(|log| log["id"].as_str())
            .map(|id| (id.to_string(), Value::Null))
            .collect();

        tracing::debug!("Pruning {} realtime analytics entries", stale.len());
        self.store.update(REALTIME_PATH, stale).await?;
        Ok(())
    }

    /// 일별 통계 (기본: 오늘, WIB)
    pub async fn daily_stats(&self, date: Option<&str>) -> ServiceResult<DailyStats> {
        let date = date
            .map(str::to_string)
            .unwrap_or_else(|| now_wib().format("%Y-%m-%d").to_string());

        let children = match tree::validate_segment(&date) {
            Ok(()) => self.store.children(&format!("{}/{}", DAILY_PATH, date)).await?,
            Err(_) => Vec::new(),
        };

        let mut endpoints: Vec<EndpointStats> = children
            .into_iter()
            .filter(|(_, value)| value.is_object())
            .filter_map(|(_, value)| serde_json::from_value(value).ok())
            .collect();
        endpoints.sort_by(|a, b| b.count.cmp(&a.count));

        Ok(DailyStats {
            total_requests: endpoints.iter().map(|e| e.count).sum(),
            total_errors: endpoints.iter().map(|e| e.errors).sum(),
            date,
            endpoints,
        })
    }

    /// 최근 요청 로그 (최신순)
    pub async fn realtime_logs(&self, limit: usize) -> ServiceResult<Vec<Value>> {
        let mut logs: Vec<Value> = self
            .store
            .children(REALTIME_PATH)
            .await?
            .into_iter()
            .map(|(_, value)| value)
            .filter(Value::is_object)
            .collect();

        logs.sort_by(|a, b| {
            let ts = |v: &Value| v["timestamp"].as_str().unwrap_or("").to_string();
            ts(b).cmp(&ts(a))
        });
        logs.truncate(limit);
        Ok(logs)
    }

    /// 전체 통계
    pub async fn global_stats(&self) -> ServiceResult<GlobalStats> {
        let stats = self.store.get(STATS_PATH).await?.unwrap_or(Value::Null);
        let total_requests = stats["total_requests"].as_u64().unwrap_or(0);
        let total_errors = stats["total_errors"].as_u64().unwrap_or(0);

        Ok(GlobalStats {
            total_requests,
            total_errors,
            error_rate: round_to(total_errors as f64 / total_requests.max(1) as f64 * 100.0, 2),
            last_updated: stats["last_updated"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| now_wib().to_rfc3339()),
        })
    }

    /// 요청 수 상위 엔드포인트
    pub async fn top_endpoints(
        &self,
        limit: usize,
        date: Option<&str>,
    ) -> ServiceResult<Vec<EndpointStats>> {
        let mut daily = self.daily_stats(date).await?;
        daily.endpoints.truncate(limit);
        Ok(daily.endpoints)
    }

    /// 보관 기간이 지난 일별 데이터 삭제
    pub async fn cleanup_old_logs(&self, days_to_keep: u32) -> ServiceResult<usize> {
        self.cleanup_old_logs_at(days_to_keep, now_wib()).await
    }

    /// 지정 시각 기준으로 `today - days_to_keep`보다 이전 날짜 삭제
    ///
    /// 날짜 형식이 아닌 키는 건너뜁니다.
    pub async fn cleanup_old_logs_at(
        &self,
        days_to_keep: u32,
        now: DateTime<FixedOffset>,
    ) -> ServiceResult<usize> {
        let cutoff = now.date_naive() - Duration::days(i64::from(days_to_keep));

        let stale: Map<String, Value> = self
            .store
            .children(DAILY_PATH)
            .await?
            .into_iter()
            .filter_map(|(key, _)| {
                let date = NaiveDate::parse_from_str(&key, "%Y-%m-%d").ok()?;
                (date < cutoff).then_some((key, Value::Null))
            })
            .collect();

        let deleted = stale.len();
        if deleted > 0 {
            self.store.update(DAILY_PATH, stale).await?;
        }

        tracing::info!("Cleaned up {} old analytics days", deleted);
        Ok(deleted)
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// `/api` 요청을 응답 후 백그라운드로 기록
///
/// 응답은 기록을 기다리지 않습니다.
pub async fn track_requests(
    State(analytics): State<AnalyticsService>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if !path.starts_with("/api") {
        return next.run(request).await;
    }

    let method = request.method().to_string();
    let ip = client_ip(&request);
    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let started = Instant::now();
    let response = next.run(request).await;

    let entry = RequestLog {
        endpoint: path,
        method,
        status_code: response.status().as_u16(),
        response_time: started.elapsed().as_secs_f64(),
        ip,
        user_agent,
    };

    tokio::spawn(async move {
        analytics.log_request(&entry).await;
    });

    response
}

/// X-Forwarded-For 첫 값, 없으면 소켓 주소
fn client_ip(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `{METHOD}_{endpoint}` 키 (`/`와 저장소 금지 문자는 `_`로)
pub fn endpoint_key(method: &str, endpoint: &str) -> String {
    let sanitized: String = endpoint
        .chars()
        .map(|c| {
            if c == '/' || tree::FORBIDDEN_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();
    format!("{}_{}", method.to_uppercase(), sanitized)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn truncate(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::wib;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn create_test_service() -> AnalyticsService {
        AnalyticsService::new(Arc::new(MemoryStore::new()))
    }

    fn entry(endpoint: &str, status_code: u16, response_time: f64) -> RequestLog {
        RequestLog {
            endpoint: endpoint.to_string(),
            method: "GET".to_string(),
            status_code,
            response_time,
            ip: "203.0.113.195, 70.41.3.18".to_string(),
            user_agent: "x".repeat(150),
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<FixedOffset> {
        wib().with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_endpoint_key() {
        assert_eq!(endpoint_key("get", "/api/knowledge"), "GET__api_knowledge");
        assert_eq!(endpoint_key("POST", "/api/v1.2/x#y"), "POST__api_v1_2_x_y");
    }

    #[tokio::test]
    async fn test_daily_counters() {
        let service = create_test_service();
        service.log_request_at(&entry("/api/knowledge", 200, 0.1), at(10, 9)).await;
        service.log_request_at(&entry("/api/knowledge", 404, 0.2), at(10, 10)).await;
        service.log_request_at(&entry("/api/chat/health", 200, 0.01), at(10, 11)).await;

        let daily = service.daily_stats(Some("2025-03-10")).await.unwrap();
        assert_eq!(daily.total_requests, 3);
        assert_eq!(daily.total_errors, 1);

        let top = &daily.endpoints[0];
        assert_eq!(top.endpoint, "/api/knowledge");
        assert_eq!(top.count, 2);
        assert_eq!(top.errors, 1);
        assert!((top.avg_response_time - 0.15).abs() < 1e-9);
        assert_eq!(top.status_codes.get("200"), Some(&1));
        assert_eq!(top.status_codes.get("404"), Some(&1));

        let top_one = service.top_endpoints(1, Some("2025-03-10")).await.unwrap();
        assert_eq!(top_one.len(), 1);

        let other_day = service.daily_stats(Some("2025-03-11")).await.unwrap();
        assert!(other_day.endpoints.is_empty());
    }

    #[tokio::test]
    async fn test_global_stats() {
        let service = create_test_service();
        let empty = service.global_stats().await.unwrap();
        assert_eq!(empty.total_requests, 0);
        assert_eq!(empty.error_rate, 0.0);

        service.log_request_at(&entry("/api/a", 200, 0.1), at(10, 9)).await;
        service.log_request_at(&entry("/api/a", 500, 0.1), at(10, 9)).await;
        service.log_request_at(&entry("/api/a", 200, 0.1), at(10, 9)).await;

        let stats = service.global_stats().await.unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.total_errors, 1);
        assert_eq!(stats.error_rate, 33.33);
    }

    #[tokio::test]
    async fn test_realtime_truncation_and_order() {
        let service = create_test_service();
        service.log_request_at(&entry("/api/first", 200, 0.1), at(10, 9)).await;
        service.log_request_at(&entry("/api/second", 200, 0.1), at(10, 10)).await;

        let logs = service.realtime_logs(10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0]["endpoint"], "/api/second");
        assert_eq!(logs[0]["ip"].as_str().unwrap().chars().count(), 15);
        assert_eq!(logs[0]["user_agent"].as_str().unwrap().len(), 100);

        assert_eq!(service.realtime_logs(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_realtime_pruned_to_limit() {
        let service = create_test_service();
        let base = at(10, 0);
        for i in 0..(REALTIME_LIMIT as i64 + 5) {
            service
                .log_request_at(&entry("/api/x", 200, 0.0), base + Duration::seconds(i))
                .await;
        }

        let logs = service.realtime_logs(usize::MAX).await.unwrap();
        assert_eq!(logs.len(), REALTIME_LIMIT);
        // 가장 오래된 5개가 삭제됨
        let oldest = logs.last().unwrap()["timestamp"].as_str().unwrap().to_string();
        assert_eq!(oldest, (base + Duration::seconds(5)).to_rfc3339());
    }

    #[tokio::test]
    async fn test_cleanup_old_logs() {
        let service = create_test_service();
        service.log_request_at(&entry("/api/a", 200, 0.1), at(1, 9)).await;
        service.log_request_at(&entry("/api/a", 200, 0.1), at(3, 9)).await;
        service.log_request_at(&entry("/api/a", 200, 0.1), at(9, 9)).await;
        service
            .store
            .set("analytics/daily/not-a-date", json!({"x": {"count": 1}}))
            .await
            .unwrap();

        let deleted = service.cleanup_old_logs_at(7, at(10, 12)).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining: Vec<String> = service
            .store
            .children("analytics/daily")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(remaining, vec!["2025-03-03", "2025-03-09", "not-a-date"]);
    }
}
