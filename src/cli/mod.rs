//! CLI 모듈
//!
//! kampus-assistant CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::ai::{AiResponder, GeminiClient};
use crate::announcement::AnnouncementService;
use crate::chat::ChatService;
use crate::config::{get_data_dir, mask_secret, Config, StoreBackend, DEFAULT_ENV_FILE};
use crate::knowledge::{KnowledgeInput, KnowledgeService, MatchType};
use crate::media::{CloudinaryHost, ImageHost};
use crate::schedule::ScheduleService;
use crate::store::{open_store, DocumentStore};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "kampus-assistant")]
#[command(version, about = "캠퍼스 어시스턴트 백엔드", long_about = None)]
pub struct Cli {
    /// 설정 파일 (.env, 프로세스 환경변수보다 우선)
    #[arg(long, global = true, default_value = DEFAULT_ENV_FILE)]
    pub env_file: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTP 서버 실행
    Serve {
        /// 바인드 주소 (기본: HOST 또는 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// 포트 (기본: PORT 또는 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// 지식 매칭 결과 확인 (AI 호출 없음)
    Query {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// 챗 파이프라인 전체 실행
    Ask {
        /// 질문
        message: String,

        /// 학술 관련성 필터 끄기
        #[arg(long)]
        no_filter: bool,
    },

    /// 저장된 지식 목록
    List {
        /// 카테고리 필터
        #[arg(short, long)]
        category: Option<String>,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 지식 추가
    Add {
        /// 질문
        #[arg(short, long)]
        question: String,

        /// 답변
        #[arg(short, long)]
        answer: String,

        /// 카테고리
        #[arg(short, long)]
        category: Option<String>,

        /// 검색 키워드 (공백 구분)
        #[arg(short, long)]
        keywords: Option<String>,
    },

    /// 지식 삭제
    Delete {
        /// 삭제할 지식 ID
        id: String,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.env_file)
        .with_context(|| format!("설정 로드 실패: {:?}", cli.env_file))?;

    match cli.command {
        Commands::Serve { host, port } => cmd_serve(config, host, port).await,
        Commands::Query { query, limit } => cmd_query(&config, &query, limit).await,
        Commands::Ask { message, no_filter } => cmd_ask(&config, &message, no_filter).await,
        Commands::List { category, limit } => cmd_list(&config, category, limit).await,
        Commands::Add {
            question,
            answer,
            category,
            keywords,
        } => cmd_add(&config, question, answer, category, keywords).await,
        Commands::Delete { id } => cmd_delete(&config, &id).await,
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 서버 실행 명령어 (serve)
async fn cmd_serve(mut config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    crate::server::serve(&config).await
}

/// 검색 명령어 (query)
///
/// 점수순 후보와 챗에 전달될 컨텍스트를 출력합니다.
async fn cmd_query(config: &Config, query: &str, limit: usize) -> Result<()> {
    let knowledge = open_knowledge(config)?;

    println!("[*] 검색 중: \"{}\"", query);

    let (candidates, found) = knowledge.explain(query).await.context("검색 실패")?;
    if candidates.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", candidates.len().min(limit));

    for (i, candidate) in candidates.iter().take(limit).enumerate() {
        let type_str = match candidate.match_type {
            MatchType::Exact => "EXACT",
            MatchType::Semantic => "SEM",
        };

        println!(
            "{}. [{}] [점수: {:.1}] {}",
            i + 1,
            type_str,
            candidate.score,
            candidate.record.id
        );
        println!("   질문: {}", truncate_text(&candidate.record.question, 80));
        println!("   답변: {}", truncate_text(&candidate.record.answer, 200));
        if !candidate.matched_terms.is_empty() {
            println!("   매칭: {}", candidate.matched_terms.join(", "));
        }
        println!();
    }

    if !found.image_url.is_empty() {
        println!("[*] 이미지: {}", found.image_url);
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(config: &Config, message: &str, no_filter: bool) -> Result<()> {
    if config.ai.api_key.is_none() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             .env 파일에 GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GEMINI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }

    let knowledge = open_knowledge(config)?;
    let gemini = GeminiClient::new(config.ai.api_key.clone(), config.ai.model.as_str())
        .context("Gemini 클라이언트 생성 실패")?;

    let chat = ChatService::new(
        knowledge,
        AiResponder::new(Arc::new(gemini)),
        config.chat.relevance_check && !no_filter,
    );

    println!("[*] 답변 생성 중 ({})...", config.ai.model);
    let reply = chat.handle_message(message).await?;

    println!();
    println!("{}", reply.response);
    println!();

    if let Some(ref image_url) = reply.image_url {
        println!("[*] 이미지: {}", image_url);
    }
    match (&reply.source, &reply.error) {
        (_, Some(error)) => println!("[!] 오류: {}", error),
        (Some(source), None) => println!("[OK] source: {}", source),
        (None, None) => {}
    }

    Ok(())
}

/// 목록 명령어 (list)
async fn cmd_list(config: &Config, category: Option<String>, limit: usize) -> Result<()> {
    let knowledge = open_knowledge(config)?;

    let records: Vec<_> = knowledge
        .list()
        .await
        .context("지식 목록 조회 실패")?
        .into_iter()
        .filter(|r| category.as_deref().map_or(true, |c| r.category == c))
        .take(limit)
        .collect();

    if records.is_empty() {
        println!("[!] 저장된 지식이 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 지식 ({} 건):\n", records.len());

    for record in records {
        println!("  {} [{}] {}", record.id, record.category, truncate_text(&record.question, 50));
        println!("        {}", truncate_text(&record.answer, 70));
        if !record.keywords.is_empty() {
            println!("        키워드: {}", record.keywords);
        }
        if record.image_url.is_some() {
            println!("        (이미지 첨부)");
        }
        println!();
    }

    Ok(())
}

/// 추가 명령어 (add)
async fn cmd_add(
    config: &Config,
    question: String,
    answer: String,
    category: Option<String>,
    keywords: Option<String>,
) -> Result<()> {
    let knowledge = open_knowledge(config)?;

    let mut input = KnowledgeInput::new(question, answer);
    if let Some(category) = category {
        input = input.with_category(category);
    }
    if let Some(keywords) = keywords {
        input = input.with_keywords(keywords);
    }

    let record = knowledge.add(input).await.context("지식 추가 실패")?;

    println!("[OK] 지식이 추가되었습니다 (ID: {})", record.id);
    println!("     카테고리: {}", record.category);

    Ok(())
}

/// 삭제 명령어 (delete)
async fn cmd_delete(config: &Config, id: &str) -> Result<()> {
    let knowledge = open_knowledge(config)?;

    knowledge
        .delete(id)
        .await
        .with_context(|| format!("ID {}인 지식을 삭제하지 못했습니다", id))?;

    println!("[OK] 지식 {} 삭제됨", id);
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &Config) -> Result<()> {
    println!("kampus-assistant v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", get_data_dir().display());
    println!("[*] 설정 파일: {}", config.server.env_file.display());

    // 저장소
    match config.store.backend {
        StoreBackend::Sqlite => {
            let path = &config.store.sqlite_path;
            let size = std::fs::metadata(path).map(|m| m.len() as usize).unwrap_or(0);
            println!("[*] 저장소: sqlite ({}, {})", path.display(), format_bytes(size));
        }
        StoreBackend::Firebase => {
            let url = config
                .store
                .firebase
                .as_ref()
                .map(|f| f.database_url.as_str())
                .unwrap_or("-");
            println!("[*] 저장소: firebase ({})", url);
        }
        StoreBackend::Memory => println!("[!] 저장소: memory (종료 시 데이터 삭제)"),
    }

    // API 키 상태
    match config.ai.api_key {
        Some(ref key) => println!("[OK] API 키: {} ({})", mask_secret(key), config.ai.model),
        None => {
            println!("[!] API 키: 미설정");
            println!("    설정: export GEMINI_API_KEY=your-key");
        }
    }

    if config.media.cloudinary.is_some() {
        println!("[OK] 이미지 호스팅: Cloudinary");
    } else {
        println!("[!] 이미지 호스팅: 미설정 (업로드 비활성)");
    }

    if config.admin.password_is_default {
        println!("[!] ADMIN_PASSWORD 미설정 (기본 비밀번호 사용 중)");
    }
    if config.admin.session_secret.is_none() {
        println!("[!] SESSION_SECRET 미설정 (serve 실행 불가)");
    }

    // 데이터 통계
    let store = match open_store(&config.store) {
        Ok(store) => store,
        Err(e) => {
            println!("[!] 저장소 열기 실패: {:#}", e);
            return Ok(());
        }
    };

    match KnowledgeService::new(store.clone(), None).stats().await {
        Ok(stats) => {
            println!("[OK] 지식: {} 건", stats.total_knowledge);
            for (category, count) in &stats.categories {
                println!("     {}: {}", category, count);
            }
        }
        Err(e) => println!("[!] 지식 통계 조회 실패: {}", e),
    }

    match ScheduleService::new(store.clone()).stats().await {
        Ok(stats) => println!(
            "[OK] 일정: {} 건 (예정 {}, 지난 일정 {})",
            stats.total_schedules, stats.upcoming_count, stats.past_count
        ),
        Err(e) => println!("[!] 일정 통계 조회 실패: {}", e),
    }

    let announcement = AnnouncementService::new(store).current().await;
    println!("[*] 공지: {}", announcement.title);

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 설정의 저장소 + 이미지 호스트로 지식 서비스 생성
fn open_knowledge(config: &Config) -> Result<KnowledgeService> {
    let store: Arc<dyn DocumentStore> = open_store(&config.store)?;

    let images: Option<Arc<dyn ImageHost>> = match &config.media.cloudinary {
        Some(cloudinary) => Some(Arc::new(
            CloudinaryHost::new(cloudinary).context("Cloudinary 클라이언트 생성 실패")?,
        )),
        None => None,
    };

    Ok(KnowledgeService::new(store, images).with_image_folder(config.media.folder.as_str()))
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
