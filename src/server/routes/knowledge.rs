//! `/api/knowledge`

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_body;
use crate::knowledge::KnowledgeInput;
use crate::media::ImageUpload;
use crate::server::error::{ApiError, ApiResult};
use crate::server::AppState;

/// 업로드 폼 필드 이름
const IMAGE_FIELD: &str = "image";

/// GET /api/knowledge
pub async fn list(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let records = state.knowledge.list().await?;
    Ok(Json(json!({
        "success": true,
        "total": records.len(),
        "data": records,
    })))
}

/// GET /api/knowledge/{id}
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = state.knowledge.get(&id).await?;
    Ok(Json(json!({ "success": true, "knowledge": record })))
}

/// POST /api/knowledge
pub async fn create(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<KnowledgeInput>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let record = state.knowledge.add(json_body(payload)?).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Knowledge added successfully",
        "knowledge": record,
    })))
}

/// PUT /api/knowledge/{id}
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<KnowledgeInput>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let record = state.knowledge.update(&id, json_body(payload)?).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Knowledge updated successfully",
        "knowledge": record,
    })))
}

/// DELETE /api/knowledge/{id}
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.knowledge.delete(&id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Knowledge deleted successfully",
    })))
}

/// GET /api/knowledge/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let stats = state.knowledge.stats().await?;
    Ok(Json(json!({ "success": true, "data": stats })))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
}

/// POST /api/knowledge/search
///
/// 점수와 매칭 단어를 포함한 후보 + 챗에 넘길 컨텍스트
pub async fn search(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let request = json_body(payload)?;
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::bad_request("Query is required"));
    }

    let (candidates, found) = state.knowledge.explain(query).await?;

    Ok(Json(json!({
        "success": true,
        "query": query,
        "results": candidates,
        "context": found.context,
        "image_url": found.image_url,
    })))
}

/// POST /api/knowledge/{id}/image (multipart, 필드 `image`)
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Value>> {
    let mut multipart =
        multipart.map_err(|e| ApiError::bad_request(format!("Invalid upload: {}", e.body_text())))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid upload: {}", e)))?;

        upload = Some(ImageUpload {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let upload = upload.ok_or_else(|| ApiError::bad_request("No image file provided"))?;
    let (record, image) = state.knowledge.attach_image(&id, &upload).await?;

    let thumbnail_url = state.knowledge.thumbnail_url(&image.public_id);

    Ok(Json(json!({
        "success": true,
        "message": "Image uploaded successfully",
        "image_url": image.url,
        "thumbnail_url": thumbnail_url,
        "image": image,
        "knowledge": record,
    })))
}

/// DELETE /api/knowledge/{id}/image
pub async fn remove_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let record = state.knowledge.remove_image(&id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Image removed successfully",
        "knowledge": record,
    })))
}
