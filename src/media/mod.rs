//! 이미지 호스팅 - Cloudinary 업로드/삭제/URL
//!
//! source: https://cloudinary.com/documentation/image_upload_api_reference
//!
//! 업로드는 base64 data URI로 보내고, 요청은 정렬된 파라미터 + API secret의
//! SHA-256으로 서명합니다.
//! ref: https://cloudinary.com/documentation/authentication_signatures

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::CloudinaryConfig;

/// 업로드 최대 크기 (10 MiB)
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// 업로드 시 적용할 변환: 너비 1000 제한 + 품질 자동
const UPLOAD_TRANSFORMATION: &str = "c_limit,w_1000/q_auto:good";

const API_BASE: &str = "https://api.cloudinary.com/v1_1";
const DELIVERY_BASE: &str = "https://res.cloudinary.com";

/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Errors
// ============================================================================

/// 이미지 호스팅 에러
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Image hosting is not configured")]
    NotConfigured,

    #[error("No image data provided")]
    Empty,

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Image too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Image host request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Image host error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid image host response: {0}")]
    InvalidResponse(String),
}

pub type MediaResult<T> = std::result::Result<T, MediaError>;

// ============================================================================
// Types
// ============================================================================

/// 업로드할 이미지
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// MIME 타입 결정 (Content-Type 우선, 없으면 확장자)
    pub fn mime_type(&self) -> MediaResult<&'static str> {
        if let Some(mime) = self.content_type.as_deref().and_then(mime_from_content_type) {
            return Ok(mime);
        }

        let ext = self
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "png" => Ok("image/png"),
            "jpg" | "jpeg" => Ok("image/jpeg"),
            "webp" => Ok("image/webp"),
            "gif" => Ok("image/gif"),
            "bmp" => Ok("image/bmp"),
            _ => Err(MediaError::UnsupportedFormat(
                self.content_type
                    .clone()
                    .filter(|c| !c.is_empty())
                    .unwrap_or(ext),
            )),
        }
    }

    /// 크기/형식 검증 후 MIME 타입 반환
    pub fn validate(&self) -> MediaResult<&'static str> {
        if self.bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(MediaError::TooLarge {
                size: self.bytes.len(),
                max: MAX_IMAGE_BYTES,
            });
        }
        self.mime_type()
    }

    /// base64 data URI
    pub fn data_uri(&self) -> MediaResult<String> {
        let mime = self.validate()?;
        Ok(format!("data:{};base64,{}", mime, STANDARD.encode(&self.bytes)))
    }
}

/// 업로드 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub url: String,
    pub public_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

// ============================================================================
// ImageHost Trait
// ============================================================================

/// 이미지 호스트
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// 이미지 업로드
    async fn upload(&self, image: &ImageUpload, folder: &str) -> MediaResult<UploadedImage>;

    /// 이미지 삭제 (호스트가 "ok"를 돌려주면 true)
    async fn delete(&self, public_id: &str) -> MediaResult<bool>;

    /// 전달 URL (너비 제한 선택)
    fn image_url(&self, public_id: &str, width: Option<u32>) -> String;
}

// ============================================================================
// CloudinaryHost
// ============================================================================

/// Cloudinary 클라이언트
pub struct CloudinaryHost {
    client: Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryHost {
    pub fn new(config: &CloudinaryConfig) -> MediaResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", API_BASE, self.cloud_name, action)
    }

    /// 서명 파라미터 + api_key/signature를 붙여 POST
    ///
    /// `unsigned`는 서명 계산에서 빠지는 필드입니다.
    async fn signed_post<'a, T>(
        &self,
        action: &str,
        mut params: BTreeMap<&'a str, String>,
        unsigned: Vec<(&'a str, String)>,
    ) -> MediaResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        params.insert("timestamp", chrono::Utc::now().timestamp().to_string());
        let signature = sign_params(&params, &self.api_secret);

        let mut form: Vec<(&'a str, String)> = params.into_iter().collect();
        form.extend(unsigned);
        form.push(("api_key", self.api_key.clone()));
        form.push(("signature", signature));
        form.push(("signature_algorithm", "sha256".to_string()));

        let response = self
            .client
            .post(self.endpoint(action))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(MediaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| MediaError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ImageHost for CloudinaryHost {
    async fn upload(&self, image: &ImageUpload, folder: &str) -> MediaResult<UploadedImage> {
        let data_uri = image.data_uri()?;

        let mut params = BTreeMap::new();
        params.insert("folder", folder.to_string());
        params.insert("transformation", UPLOAD_TRANSFORMATION.to_string());

        // file은 서명 대상이 아님
        let signed: UploadResponse = self
            .signed_post("upload", params, vec![("file", data_uri)])
            .await?;

        tracing::info!("Image uploaded: {}", signed.public_id);

        Ok(UploadedImage {
            url: signed.secure_url,
            public_id: signed.public_id,
            width: signed.width,
            height: signed.height,
            format: signed.format,
        })
    }

    async fn delete(&self, public_id: &str) -> MediaResult<bool> {
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());

        let response: DestroyResponse = self.signed_post("destroy", params, Vec::new()).await?;
        let ok = response.result == "ok";
        if ok {
            tracing::info!("Image deleted: {}", public_id);
        } else {
            tracing::warn!("Image delete for {} returned '{}'", public_id, response.result);
        }
        Ok(ok)
    }

    fn image_url(&self, public_id: &str, width: Option<u32>) -> String {
        delivery_url(&self.cloud_name, public_id, width)
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    width: Option<u32>,
    height: Option<u32>,
    format: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 요청 서명: `k1=v1&k2=v2...` + secret 의 SHA-256 (hex)
pub fn sign_params(params: &BTreeMap<&str, String>, api_secret: &str) -> String {
    let payload = params
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let digest = Sha256::digest(format!("{}{}", payload, api_secret).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 전달 URL 생성
pub fn delivery_url(cloud_name: &str, public_id: &str, width: Option<u32>) -> String {
    match width {
        Some(w) => format!(
            "{}/{}/image/upload/c_limit,q_auto:good,w_{}/{}",
            DELIVERY_BASE, cloud_name, w, public_id
        ),
        None => format!("{}/{}/image/upload/{}", DELIVERY_BASE, cloud_name, public_id),
    }
}

fn mime_from_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next()?.trim().to_lowercase();
    match essence.as_str() {
        "image/png" => Some("image/png"),
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("image/jpeg"),
        "image/webp" => Some("image/webp"),
        "image/gif" => Some("image/gif"),
        "image/bmp" | "image/x-ms-bmp" => Some("image/bmp"),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
