//! 공유 애플리케이션 상태

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::ai::{AiResponder, GeminiClient, TextGenerator};
use crate::analytics::AnalyticsService;
use crate::announcement::AnnouncementService;
use crate::auth::AdminAuth;
use crate::chat::ChatService;
use crate::config::{Config, DEFAULT_ENV_FILE};
use crate::knowledge::KnowledgeService;
use crate::media::{CloudinaryHost, ImageHost};
use crate::schedule::ScheduleService;
use crate::store::{open_store, DocumentStore};

/// 핸들러 간 공유 상태
pub struct AppState {
    pub knowledge: KnowledgeService,
    pub chat: ChatService,
    pub announcements: AnnouncementService,
    pub schedules: ScheduleService,
    pub analytics: AnalyticsService,
    pub auth: AdminAuth,
    /// 실행 중 키 교체 대상 (없으면 키 관리 API 비활성)
    pub gemini: Option<Arc<GeminiClient>>,
    /// 키 교체 시 갱신할 .env 파일
    pub env_file: PathBuf,
    pub store_backend: &'static str,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// 주입된 협력 객체로 상태 구성
    pub fn new(
        store: Arc<dyn DocumentStore>,
        generator: Arc<dyn TextGenerator>,
        images: Option<Arc<dyn ImageHost>>,
        auth: AdminAuth,
        relevance_check: bool,
    ) -> Self {
        let knowledge = KnowledgeService::new(store.clone(), images);
        Self::assemble(store, knowledge, generator, auth, relevance_check)
    }

    /// API 키 관리 활성화
    pub fn with_gemini(mut self, client: Arc<GeminiClient>, env_file: PathBuf) -> Self {
        self.gemini = Some(client);
        self.env_file = env_file;
        self
    }

    /// 설정에서 전체 상태 구성
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = open_store(&config.store)?;
        tracing::info!("Document store: {}", store.backend());

        let gemini = Arc::new(
            GeminiClient::new(config.ai.api_key.clone(), config.ai.model.as_str())
                .context("Failed to create Gemini client")?,
        );
        if gemini.api_key().is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; chat replies will fail until a key is configured");
        }

        let images: Option<Arc<dyn ImageHost>> = match &config.media.cloudinary {
            Some(cloudinary) => Some(Arc::new(
                CloudinaryHost::new(cloudinary).context("Failed to create Cloudinary client")?,
            )),
            None => {
                tracing::warn!("Cloudinary is not configured; image uploads are disabled");
                None
            }
        };

        let auth = AdminAuth::from_config(&config.admin)?;
        let knowledge = KnowledgeService::new(store.clone(), images)
            .with_image_folder(config.media.folder.as_str());

        Ok(Self::assemble(
            store,
            knowledge,
            gemini.clone(),
            auth,
            config.chat.relevance_check,
        )
        .with_gemini(gemini, config.server.env_file.clone()))
    }

    fn assemble(
        store: Arc<dyn DocumentStore>,
        knowledge: KnowledgeService,
        generator: Arc<dyn TextGenerator>,
        auth: AdminAuth,
        relevance_check: bool,
    ) -> Self {
        let chat = ChatService::new(
            knowledge.clone(),
            AiResponder::new(generator),
            relevance_check,
        );

        Self {
            chat,
            knowledge,
            announcements: AnnouncementService::new(store.clone()),
            schedules: ScheduleService::new(store.clone()),
            analytics: AnalyticsService::new(store.clone()),
            auth,
            gemini: None,
            env_file: PathBuf::from(DEFAULT_ENV_FILE),
            store_backend: store.backend(),
            started_at: Utc::now(),
        }
    }
}
