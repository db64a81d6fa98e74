//! 설정 모듈 - 환경변수 + .env 파일
//!
//! 모든 설정은 시작 시 한 번 읽습니다.
//! .env 파일의 값이 프로세스 환경변수보다 우선합니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::ai::DEFAULT_MODEL;

/// 기본 .env 파일 경로
pub const DEFAULT_ENV_FILE: &str = ".env";

/// 기본 HTTP 포트
pub const DEFAULT_PORT: u16 = 8080;

/// 기본 세션 유효 시간 (시간)
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// 관리자 기본 비밀번호 (운영 환경에서는 반드시 변경)
const FALLBACK_ADMIN_PASSWORD: &str = "admin123";

/// Gemini API 키 형식: "AIza" 접두사 + 최소 30자
static GEMINI_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^AIza\S{26,}$").expect("Invalid regex"));

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.kampus-assistant/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kampus-assistant")
}

// ============================================================================
// Types
// ============================================================================

/// 문서 저장소 백엔드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// 프로세스 메모리 (개발/테스트)
    Memory,
    /// 로컬 SQLite 파일
    Sqlite,
    /// Firebase Realtime Database (REST)
    Firebase,
}

impl StoreBackend {
    /// 문자열에서 백엔드 결정
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "memory" | "mock" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "firebase" => Ok(Self::Firebase),
            other => bail!("Unknown STORE_BACKEND '{}'. Use memory, sqlite, or firebase", other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
            Self::Firebase => "firebase",
        }
    }
}

/// 전체 설정
#[derive(Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub ai: AiConfig,
    pub media: MediaConfig,
    pub admin: AdminConfig,
    pub chat: ChatConfig,
}

/// HTTP 서버 설정
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 비어 있으면 모든 origin 허용
    pub allowed_origins: Vec<String>,
    /// API 키 갱신 시 기록할 .env 파일
    pub env_file: PathBuf,
}

/// 문서 저장소 설정
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub sqlite_path: PathBuf,
    pub firebase: Option<FirebaseConfig>,
}

/// Firebase Realtime Database 설정
#[derive(Clone)]
pub struct FirebaseConfig {
    pub database_url: String,
    /// database secret 또는 ID 토큰 (`auth` 쿼리 파라미터)
    pub auth_token: Option<String>,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("database_url", &self.database_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Gemini 설정
#[derive(Clone)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
}

/// 이미지 호스팅 설정
#[derive(Clone)]
pub struct MediaConfig {
    pub cloudinary: Option<CloudinaryConfig>,
    /// 업로드 폴더
    pub folder: String,
}

/// Cloudinary 자격 증명
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

/// 관리자 인증 설정
#[derive(Clone)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
    /// ADMIN_PASSWORD 미설정으로 기본값을 쓰는 중인지
    pub password_is_default: bool,
    /// 세션 쿠키 서명 키 (서버 실행 시 필수)
    pub session_secret: Option<String>,
    pub session_ttl_hours: i64,
}

/// 챗 파이프라인 설정
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// AI 관련성 필터 사용 여부
    pub relevance_check: bool,
}

// ============================================================================
// Loading
// ============================================================================

impl Config {
    /// .env 파일 + 프로세스 환경변수에서 설정 로드
    pub fn load(env_file: &Path) -> Result<Self> {
        let file_vars = read_env_file(env_file)?;
        if !file_vars.is_empty() {
            tracing::debug!("Loaded {} variables from {:?}", file_vars.len(), env_file);
        }

        Self::from_lookup(env_file, |key| {
            file_vars
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        })
    }

    /// 임의의 조회 함수로 설정 구성
    ///
    /// 빈 문자열 값은 미설정으로 취급합니다.
    pub fn from_lookup<F>(env_file: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // Server
        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT value: {}", raw))?,
            None => DEFAULT_PORT,
        };
        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty() && o != "*")
                    .collect()
            })
            .unwrap_or_default();

        let server = ServerConfig {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            allowed_origins,
            env_file: env_file.to_path_buf(),
        };

        // Store
        let firebase = get("FIREBASE_DATABASE_URL")
            .or_else(|| get("FIREBASE_PROJECT_ID").map(|id| firebase_url_for_project(&id)))
            .map(|database_url| FirebaseConfig {
                database_url,
                auth_token: get("FIREBASE_AUTH_TOKEN"),
            });

        let backend = match get("STORE_BACKEND") {
            Some(raw) => StoreBackend::parse(&raw)?,
            None if firebase.is_some() => StoreBackend::Firebase,
            None => StoreBackend::Sqlite,
        };

        if backend == StoreBackend::Firebase && firebase.is_none() {
            bail!("STORE_BACKEND=firebase requires FIREBASE_DATABASE_URL or FIREBASE_PROJECT_ID");
        }

        let store = StoreConfig {
            backend,
            sqlite_path: get("SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| get_data_dir().join("store.db")),
            firebase,
        };

        // AI (우선순위: GEMINI_API_KEY > GOOGLE_AI_API_KEY)
        let ai = AiConfig {
            api_key: get("GEMINI_API_KEY").or_else(|| get("GOOGLE_AI_API_KEY")),
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        };

        // Media
        let cloudinary = match (
            get("CLOUDINARY_CLOUD_NAME"),
            get("CLOUDINARY_API_KEY"),
            get("CLOUDINARY_API_SECRET"),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
            }),
            (None, None, None) => None,
            _ => {
                tracing::warn!("Cloudinary credentials are incomplete; image uploads are disabled");
                None
            }
        };

        let media = MediaConfig {
            cloudinary,
            folder: get("CLOUDINARY_FOLDER").unwrap_or_else(|| "knowledge".to_string()),
        };

        // Admin
        let password = get("ADMIN_PASSWORD");
        let session_ttl_hours = match get("SESSION_TTL_HOURS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|h| *h > 0)
                .with_context(|| format!("Invalid SESSION_TTL_HOURS value: {}", raw))?,
            None => DEFAULT_SESSION_TTL_HOURS,
        };

        let admin = AdminConfig {
            username: get("ADMIN_USERNAME").unwrap_or_else(|| "admin".to_string()),
            password_is_default: password.is_none(),
            password: password.unwrap_or_else(|| FALLBACK_ADMIN_PASSWORD.to_string()),
            session_secret: get("SESSION_SECRET"),
            session_ttl_hours,
        };

        let chat = ChatConfig {
            relevance_check: get("CHAT_RELEVANCE_CHECK")
                .map(|v| parse_bool(&v))
                .unwrap_or(true),
        };

        Ok(Self {
            server,
            store,
            ai,
            media,
            admin,
            chat,
        })
    }
}

// ============================================================================
// .env File Management
// ============================================================================

/// .env 파일 읽기 (없으면 빈 맵)
///
/// `KEY=value`, `export KEY=value`, 따옴표로 감싼 값을 지원합니다.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read env file: {:?}", path))?;

    let vars = contents
        .lines()
        .filter_map(parse_env_line)
        .collect();

    Ok(vars)
}

/// .env 파일에 키 갱신 (없으면 추가)
pub fn update_env_file(path: &Path, key: &str, value: &str) -> Result<()> {
    let existing = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read env file: {:?}", path))?
    } else {
        String::new()
    };

    let mut found = false;
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| match parse_env_line(line) {
            Some((k, _)) if k == key => {
                found = true;
                format!("{}={}", key, value)
            }
            _ => line.to_string(),
        })
        .collect();

    if !found {
        lines.push(format!("{}={}", key, value));
    }

    let mut output = lines.join("\n");
    output.push('\n');

    std::fs::write(path, output).with_context(|| format!("Failed to write env file: {:?}", path))?;
    tracing::info!("Updated {} in {:?}", key, path);
    Ok(())
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let value = value.trim();
    let value = ['"', '\'']
        .iter()
        .find_map(|q| {
            value
                .strip_prefix(*q)
                .and_then(|v| v.strip_suffix(*q))
        })
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 프로젝트 ID로 Firebase RTDB URL 생성 (기본 리전: asia-southeast1)
pub fn firebase_url_for_project(project_id: &str) -> String {
    format!(
        "https://{}-default-rtdb.asia-southeast1.firebasedatabase.app",
        project_id
    )
}

/// 비밀 값 마스킹 (앞 6자 + • + 뒤 4자)
///
/// 10자 이하는 전체를 가립니다.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 10 {
        return "•".repeat(chars.len());
    }

    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}{}", head, "•".repeat(chars.len() - 10), tail)
}

/// Gemini API 키 형식 검증
pub fn is_valid_gemini_key(key: &str) -> bool {
    GEMINI_KEY_PATTERN.is_match(key)
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(Path::new(".env"), lookup_from(&[])).unwrap();

        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.server.allowed_origins.is_empty());
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert!(config.ai.api_key.is_none());
        assert_eq!(config.ai.model, DEFAULT_MODEL);
        assert!(config.media.cloudinary.is_none());
        assert_eq!(config.admin.username, "admin");
        assert!(config.admin.password_is_default);
        assert!(config.admin.session_secret.is_none());
        assert!(config.chat.relevance_check);
    }

    #[test]
    fn test_firebase_selected_when_project_id_set() {
        let config = Config::from_lookup(
            Path::new(".env"),
            lookup_from(&[("FIREBASE_PROJECT_ID", "kampus-demo")]),
        )
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Firebase);
        let firebase = config.store.firebase.unwrap();
        assert_eq!(
            firebase.database_url,
            "https://kampus-demo-default-rtdb.asia-southeast1.firebasedatabase.app"
        );
    }

    #[test]
    fn test_explicit_backend_wins() {
        let config = Config::from_lookup(
            Path::new(".env"),
            lookup_from(&[("FIREBASE_PROJECT_ID", "x"), ("STORE_BACKEND", "memory")]),
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);

        let result = Config::from_lookup(
            Path::new(".env"),
            lookup_from(&[("STORE_BACKEND", "firebase")]),
        );
        assert!(result.is_err());

        let result = Config::from_lookup(
            Path::new(".env"),
            lookup_from(&[("STORE_BACKEND", "postgres")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_api_key_fallback_and_blank_values() {
        let config = Config::from_lookup(
            Path::new(".env"),
            lookup_from(&[("GEMINI_API_KEY", "   "), ("GOOGLE_AI_API_KEY", "AIzaFallback")]),
        )
        .unwrap();
        assert_eq!(config.ai.api_key.as_deref(), Some("AIzaFallback"));
    }

    #[test]
    fn test_origins_and_flags() {
        let config = Config::from_lookup(
            Path::new(".env"),
            lookup_from(&[
                ("ALLOWED_ORIGINS", "https://a.ac.id, https://b.ac.id,,"),
                ("CHAT_RELEVANCE_CHECK", "false"),
                ("PORT", "5000"),
                ("ADMIN_PASSWORD", "rahasia"),
            ]),
        )
        .unwrap();

        assert_eq!(
            config.server.allowed_origins,
            vec!["https://a.ac.id".to_string(), "https://b.ac.id".to_string()]
        );
        assert!(!config.chat.relevance_check);
        assert_eq!(config.server.port, 5000);
        assert!(!config.admin.password_is_default);
        assert_eq!(config.admin.password, "rahasia");
    }

    #[test]
    fn test_invalid_port() {
        let result = Config::from_lookup(Path::new(".env"), lookup_from(&[("PORT", "abc")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_partial_cloudinary_is_disabled() {
        let config = Config::from_lookup(
            Path::new(".env"),
            lookup_from(&[("CLOUDINARY_CLOUD_NAME", "demo")]),
        )
        .unwrap();
        assert!(config.media.cloudinary.is_none());
    }

    #[test]
    fn test_env_file_takes_priority() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# comment\nexport GEMINI_MODEL=\"gemini-test\"\nADMIN_USERNAME='pengurus'\n",
        )
        .unwrap();

        let vars = read_env_file(&path).unwrap();
        assert_eq!(vars.get("GEMINI_MODEL").map(String::as_str), Some("gemini-test"));
        assert_eq!(vars.get("ADMIN_USERNAME").map(String::as_str), Some("pengurus"));

        let config = Config::load(&path).unwrap();
        assert_eq!(config.ai.model, "gemini-test");
        assert_eq!(config.admin.username, "pengurus");
    }

    #[test]
    fn test_update_env_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");

        // 파일이 없으면 새로 생성
        update_env_file(&path, "GEMINI_API_KEY", "first").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "GEMINI_API_KEY=first\n");

        // 기존 키는 교체, 다른 줄은 유지
        std::fs::write(&path, "PORT=5000\nGEMINI_API_KEY=old\n# note\n").unwrap();
        update_env_file(&path, "GEMINI_API_KEY", "new").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "PORT=5000\nGEMINI_API_KEY=new\n# note\n"
        );
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "");
        assert_eq!(mask_secret("short"), "•••••");
        assert_eq!(mask_secret("AIzaSyABCDEFGH1234"), "AIzaSy••••••••1234");
    }

    #[test]
    fn test_gemini_key_format() {
        assert!(is_valid_gemini_key("AIzaSyA1234567890abcdefghijklmnop"));
        assert!(!is_valid_gemini_key("AIzaShort"));
        assert!(!is_valid_gemini_key("sk-1234567890abcdefghijklmnopqrstuvwxyz"));
        assert!(!is_valid_gemini_key(""));
    }
}
