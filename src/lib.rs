//! kampus-assistant - 캠퍼스 어시스턴트 백엔드
//!
//! 동의어 확장 지식 매칭으로 컨텍스트를 고르고 Gemini로 답변을 생성합니다.
//! 지식/공지/일정은 계층형 문서 저장소(메모리, SQLite, Firebase RTDB)에 둡니다.

pub mod ai;
pub mod analytics;
pub mod announcement;
pub mod auth;
pub mod chat;
pub mod cli;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod media;
pub mod schedule;
pub mod server;
pub mod store;

// Re-exports
pub use ai::{AiError, AiResponder, GeminiClient, TextGenerator};
pub use chat::{ChatReply, ChatService};
pub use config::{get_data_dir, Config};
pub use error::{ServiceError, ServiceResult};
pub use knowledge::{
    KnowledgeInput, KnowledgeMatcher, KnowledgeRecord, KnowledgeService, SearchResult,
};
pub use media::{CloudinaryHost, ImageHost, ImageUpload, UploadedImage};
pub use server::{build_router, AppState};
pub use store::{open_store, DocumentStore, FirebaseStore, MemoryStore, SqliteStore};
