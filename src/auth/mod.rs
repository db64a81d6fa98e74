//! 관리자 인증 - 상태 없는 세션 쿠키
//!
//! 토큰 형식: `{만료 unix 초}.{base64url(HMAC-SHA256(만료))}`
//!
//! ref: https://datatracker.ietf.org/doc/html/rfc2104

use anyhow::{anyhow, bail, Result};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use crate::config::AdminConfig;

/// 세션 쿠키 이름
pub const SESSION_COOKIE: &str = "kampus_session";

type HmacSha256 = Hmac<Sha256>;

/// 관리자 인증기
#[derive(Clone)]
pub struct AdminAuth {
    username: String,
    password: String,
    mac: HmacSha256,
    ttl: Duration,
}

impl AdminAuth {
    pub fn new(username: &str, password: &str, secret: &str, ttl_hours: i64) -> Result<Self> {
        if secret.is_empty() {
            bail!("Session secret must not be empty");
        }
        if ttl_hours <= 0 {
            bail!("Session TTL must be positive, got {} hours", ttl_hours);
        }

        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow!("Invalid session secret: {}", e))?;

        Ok(Self {
            username: username.to_string(),
            password: password.to_string(),
            mac,
            ttl: Duration::hours(ttl_hours),
        })
    }

    /// 설정에서 생성 (SESSION_SECRET 필수)
    pub fn from_config(config: &AdminConfig) -> Result<Self> {
        let secret = config
            .session_secret
            .as_deref()
            .ok_or_else(|| anyhow!("SESSION_SECRET is required to run the server"))?;

        if config.password_is_default {
            tracing::warn!("ADMIN_PASSWORD is not set, using the default password");
        }

        Self::new(&config.username, &config.password, secret, config.session_ttl_hours)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// 자격 증명 확인 (상수 시간 비교)
    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let pass_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        user_ok & pass_ok
    }

    /// 세션 토큰 발급
    pub fn issue_token(&self) -> String {
        self.issue_token_at(Utc::now())
    }

    pub fn issue_token_at(&self, now: DateTime<Utc>) -> String {
        let expires = (now + self.ttl).timestamp().to_string();
        let signature = URL_SAFE_NO_PAD.encode(self.sign(&expires));
        format!("{}.{}", expires, signature)
    }

    /// 토큰 검증 (서명 + 만료)
    pub fn verify_token(&self, token: &str) -> bool {
        self.verify_token_at(token, Utc::now())
    }

    pub fn verify_token_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        let Some((expires, signature)) = token.split_once('.') else {
            return false;
        };
        let Ok(expires_at) = expires.parse::<i64>() else {
            return false;
        };
        let Ok(signature) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };

        let mut mac = self.mac.clone();
        mac.update(expires.as_bytes());
        mac.verify_slice(&signature).is_ok() && expires_at > now.timestamp()
    }

    /// 로그인 쿠키
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            token,
            self.ttl.num_seconds()
        )
    }

    /// 로그아웃 쿠키
    pub fn clear_cookie(&self) -> String {
        format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", SESSION_COOKIE)
    }

    /// 요청 헤더에 유효한 세션이 있는지
    pub fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        session_from_headers(headers).is_some_and(|token| self.verify_token(&token))
    }

    fn sign(&self, payload: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

/// 쿠키 또는 `Authorization: Bearer`에서 세션 토큰 추출
pub fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.trim().to_string())
    })
}

/// 관리자 전용 라우트 미들웨어
pub async fn require_admin(
    State(auth): State<AdminAuth>,
    request: Request,
    next: Next,
) -> Response {
    if auth.is_authenticated(request.headers()) {
        return next.run(request).await;
    }

    tracing::debug!("Rejected unauthenticated request to {}", request.uri().path());
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "success": false,
            "error": "Authentication required"
        })),
    )
        .into_response()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn create_test_auth() -> AdminAuth {
        AdminAuth::new("admin", "rahasia", "test-secret", 24).unwrap()
    }

    #[test]
    fn test_credentials() {
        let auth = create_test_auth();
        assert!(auth.check_credentials("admin", "rahasia"));
        assert!(!auth.check_credentials("admin", "rahasiA"));
        assert!(!auth.check_credentials("root", "rahasia"));
        assert!(!auth.check_credentials("admin", ""));
    }

    #[test]
    fn test_token_roundtrip_and_expiry() {
        let auth = create_test_auth();
        let now = Utc::now();
        let token = auth.issue_token_at(now);

        assert!(auth.verify_token_at(&token, now));
        assert!(auth.verify_token_at(&token, now + Duration::hours(23)));
        assert!(!auth.verify_token_at(&token, now + Duration::hours(25)));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let auth = create_test_auth();
        let now = Utc::now();
        let token = auth.issue_token_at(now);
        let (_, signature) = token.split_once('.').unwrap();

        let extended = format!("{}.{}", (now + Duration::days(365)).timestamp(), signature);
        assert!(!auth.verify_token_at(&extended, now));
        assert!(!auth.verify_token_at("garbage", now));
        assert!(!auth.verify_token_at("123.!!!", now));

        let other = AdminAuth::new("admin", "rahasia", "other-secret", 24).unwrap();
        assert!(!other.verify_token_at(&token, now));
    }

    #[test]
    fn test_session_from_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_from_headers(&headers), None);

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; kampus_session=abc.def"),
        );
        assert_eq!(session_from_headers(&headers).as_deref(), Some("abc.def"));

        let mut bearer = HeaderMap::new();
        bearer.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok.en"));
        assert_eq!(session_from_headers(&bearer).as_deref(), Some("tok.en"));
    }

    #[test]
    fn test_invalid_construction() {
        assert!(AdminAuth::new("admin", "x", "", 24).is_err());
        assert!(AdminAuth::new("admin", "x", "secret", 0).is_err());
    }

    #[test]
    fn test_cookies() {
        let auth = create_test_auth();
        let cookie = auth.session_cookie("t.s");
        assert!(cookie.starts_with("kampus_session=t.s;"));
        assert!(cookie.contains("Max-Age=86400"));
        assert!(auth.clear_cookie().contains("Max-Age=0"));
    }
}
