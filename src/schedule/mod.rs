//! 학사 일정 - `schedules/{id}` 컬렉션
//!
//! 날짜는 `YYYY-MM-DD` 문자열로 저장하고 문자열 비교로 범위를 계산합니다.
//! 생성/수정 시각은 WIB(UTC+7) 기준 `%Y-%m-%d %H:%M:%S`.
//! 이전 형식(`title`, `start_date`, `end_date`, `date`)도 읽을 수 있습니다.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ServiceError, ServiceResult};
use crate::store::{tree, DocumentStore};

/// 저장소 컬렉션 경로
pub const COLLECTION: &str = "schedules";

/// WIB 오프셋 (초)
const WIB_OFFSET_SECS: i32 = 7 * 3600;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// WIB 타임존
pub fn wib() -> FixedOffset {
    FixedOffset::east_opt(WIB_OFFSET_SECS).expect("Invalid WIB offset")
}

/// 현재 WIB 시각
pub fn now_wib() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&wib())
}

// ============================================================================
// Types
// ============================================================================

/// 일정
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleEvent {
    pub id: String,
    pub judul: String,
    pub tanggal_mulai: String,
    pub tanggal_selesai: String,
    pub dibuat_pada: String,
    pub diperbarui_pada: String,
}

impl ScheduleEvent {
    /// 저장소 노드 -> 일정 (이전 필드명 지원)
    pub fn from_value(id: &str, value: &Value) -> Option<Self> {
        let node = value.as_object()?;

        Some(Self {
            id: id.to_string(),
            judul: first_text(node, &["judul", "title"]).unwrap_or_else(|| "No Title".to_string()),
            tanggal_mulai: first_text(node, &["tanggal_mulai", "start_date", "date"])
                .unwrap_or_default(),
            tanggal_selesai: first_text(node, &["tanggal_selesai", "end_date", "date"])
                .unwrap_or_default(),
            dibuat_pada: first_text(node, &["dibuat_pada", "created_at"]).unwrap_or_default(),
            diperbarui_pada: first_text(node, &["diperbarui_pada", "updated_at"])
                .unwrap_or_default(),
        })
    }
}

/// 생성/수정 입력
///
/// 인도네시아어 필드명과 영어 필드명 모두 허용합니다.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleInput {
    #[serde(default, alias = "title")]
    pub judul: String,
    #[serde(default, alias = "start_date")]
    pub tanggal_mulai: String,
    #[serde(default, alias = "end_date")]
    pub tanggal_selesai: Option<String>,
}

impl ScheduleInput {
    pub fn new(judul: &str, tanggal_mulai: &str, tanggal_selesai: Option<&str>) -> Self {
        Self {
            judul: judul.to_string(),
            tanggal_mulai: tanggal_mulai.to_string(),
            tanggal_selesai: tanggal_selesai.map(String::from),
        }
    }

    /// 검증 후 (제목, 시작, 종료)
    fn validate(&self) -> ServiceResult<(String, String, String)> {
        let judul = self.judul.trim();
        let start = self.tanggal_mulai.trim();
        if judul.is_empty() || start.is_empty() {
            return Err(ServiceError::Validation(
                "Title and start date are required".to_string(),
            ));
        }

        let end = self
            .tanggal_selesai
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(start);

        let start_date = parse_date_prefix(start)?;
        let end_date = parse_date_prefix(end)?;
        if end_date < start_date {
            return Err(ServiceError::Validation(
                "End date must not be before start date".to_string(),
            ));
        }

        Ok((judul.to_string(), start.to_string(), end.to_string()))
    }
}

/// 일정 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScheduleStats {
    pub total_schedules: usize,
    pub upcoming_count: usize,
    pub past_count: usize,
    pub this_month_count: usize,
}

// ============================================================================
// ScheduleService
// ============================================================================

/// 일정 서비스
#[derive(Clone)]
pub struct ScheduleService {
    store: Arc<dyn DocumentStore>,
}

impl ScheduleService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// 전체 일정 (시작일 내림차순)
    pub async fn list(&self) -> ServiceResult<Vec<ScheduleEvent>> {
        let children = self.store.children(COLLECTION).await?;
        let mut events: Vec<ScheduleEvent> = children
            .iter()
            .filter_map(|(id, value)| ScheduleEvent::from_value(id, value))
            .collect();

        events.sort_by(|a, b| b.tanggal_mulai.cmp(&a.tanggal_mulai));
        Ok(events)
    }

    /// ID로 조회
    pub async fn get(&self, id: &str) -> ServiceResult<ScheduleEvent> {
        let path = event_path(id)?;
        self.store
            .get(&path)
            .await?
            .and_then(|value| ScheduleEvent::from_value(id, &value))
            .ok_or_else(|| ServiceError::not_found("Schedule", id))
    }

    /// 기간 조회 (시작일 오름차순)
    ///
    /// 한쪽 경계라도 비어 있으면 전체 목록.
    pub async fn range(&self, start: &str, end: &str) -> ServiceResult<Vec<ScheduleEvent>> {
        let all = self.list().await?;
        let (start, end) = (start.trim(), end.trim());
        if start.is_empty() || end.is_empty() {
            return Ok(all);
        }

        let mut filtered: Vec<ScheduleEvent> = all
            .into_iter()
            .filter(|e| start <= e.tanggal_mulai.as_str() && e.tanggal_mulai.as_str() <= end)
            .collect();
        filtered.sort_by(|a, b| a.tanggal_mulai.cmp(&b.tanggal_mulai));
        Ok(filtered)
    }

    /// 일정 생성 (종료일 생략 시 하루 일정)
    pub async fn create(&self, input: &ScheduleInput) -> ServiceResult<ScheduleEvent> {
        let (judul, start, end) = input.validate()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_wib().format(TIMESTAMP_FORMAT).to_string();

        let event = ScheduleEvent {
            id: id.clone(),
            judul,
            tanggal_mulai: start,
            tanggal_selesai: end,
            dibuat_pada: now.clone(),
            diperbarui_pada: now,
        };

        self.store
            .set(
                &format!("{}/{}", COLLECTION, id),
                json!({
                    "judul": event.judul,
                    "tanggal_mulai": event.tanggal_mulai,
                    "tanggal_selesai": event.tanggal_selesai,
                    "dibuat_pada": event.dibuat_pada,
                    "diperbarui_pada": event.diperbarui_pada,
                }),
            )
            .await?;

        tracing::info!("Schedule created: {} ({})", event.judul, id);
        Ok(event)
    }

    /// 일정 수정 (dibuat_pada 유지)
    pub async fn update(&self, id: &str, input: &ScheduleInput) -> ServiceResult<ScheduleEvent> {
        let (judul, start, end) = input.validate()?;
        let existing = self.get(id).await?;
        let now = now_wib().format(TIMESTAMP_FORMAT).to_string();

        let mut partial = Map::new();
        partial.insert("judul".to_string(), json!(judul));
        partial.insert("tanggal_mulai".to_string(), json!(start));
        partial.insert("tanggal_selesai".to_string(), json!(end));
        partial.insert("diperbarui_pada".to_string(), json!(now));
        self.store.update(&event_path(id)?, partial).await?;

        tracing::info!("Schedule updated: {}", id);
        Ok(ScheduleEvent {
            judul,
            tanggal_mulai: start,
            tanggal_selesai: end,
            diperbarui_pada: now,
            ..existing
        })
    }

    /// 일정 삭제
    pub async fn delete(&self, id: &str) -> ServiceResult<()> {
        self.get(id).await?;
        self.store.delete(&event_path(id)?).await?;
        tracing::info!("Schedule deleted: {}", id);
        Ok(())
    }

    /// 현재 시각 기준 통계
    pub async fn stats(&self) -> ServiceResult<ScheduleStats> {
        self.stats_at(now_wib()).await
    }

    /// 지정 시각 기준 통계
    pub async fn stats_at(&self, now: DateTime<FixedOffset>) -> ServiceResult<ScheduleStats> {
        let events = self.list().await?;
        let today = now.format("%Y-%m-%d").to_string();
        let month = now.format("%Y-%m").to_string();

        let upcoming_count = events
            .iter()
            .filter(|e| e.tanggal_selesai.as_str() >= today.as_str())
            .count();

        Ok(ScheduleStats {
            total_schedules: events.len(),
            upcoming_count,
            past_count: events.len() - upcoming_count,
            this_month_count: events
                .iter()
                .filter(|e| e.tanggal_mulai.starts_with(&month))
                .count(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn event_path(id: &str) -> ServiceResult<String> {
    tree::validate_segment(id).map_err(|_| ServiceError::not_found("Schedule", id))?;
    Ok(format!("{}/{}", COLLECTION, id))
}

/// 앞 10자가 유효한 `YYYY-MM-DD` 날짜인지
fn parse_date_prefix(value: &str) -> ServiceResult<NaiveDate> {
    value
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .ok_or_else(|| {
            ServiceError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", value))
        })
}

/// 비어 있지 않은 첫 문자열 필드
fn first_text(node: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| node.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(String::from)
}

// ============================================================================
// Tests
// ============================================================================
