//! `/api/chat`

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_body;
use crate::chat::ChatReply;
use crate::server::error::ApiResult;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
}

/// POST /api/chat/message
pub async fn message(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatReply>> {
    let request = json_body(payload)?;
    let reply = state.chat.handle_message(&request.message).await?;
    Ok(Json(reply))
}

/// GET /api/chat/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "online",
        "service": "chatbot-api",
        "message": "API is running successfully"
    }))
}
