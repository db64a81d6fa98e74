//! Knowledge 모듈 - 질의응답 지식 베이스
//!
//! - record: 레코드 스키마 + 저장소 경계 검증
//! - matcher: 동의어 확장 + 부분 일치 스코어링
//! - service: `knowledge` 컬렉션 CRUD, 이미지 첨부, 검색

mod matcher;
mod record;
mod service;

// Re-exports
pub use matcher::{
    char_similarity, KnowledgeMatcher, MatchCandidate, MatchType, SearchResult, MAX_RESULTS,
};
pub use record::{KnowledgeInput, KnowledgeRecord, DEFAULT_CATEGORY};
pub use service::{KnowledgeService, KnowledgeStats};
