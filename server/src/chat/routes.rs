//! REST endpoints for chat resolution and message history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::db::models::ChatMessage;
use crate::state::AppState;

/// Default page size for message history.
const DEFAULT_LIMIT: u32 = 50;
/// Maximum page size for message history.
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub chat_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
}

/// GET /api/chats/with/{user_id}
/// Resolve (or create) the chat between the caller and a peer.
/// JWT auth required. The pair is normalized, so both sides get the same id.
pub async fn open_chat(
    State(state): State<AppState>,
    claims: Claims,
    Path(peer_id): Path<String>,
) -> Result<Json<ChatResponse>, StatusCode> {
    if peer_id.is_empty() || peer_id == claims.sub {
        return Err(StatusCode::BAD_REQUEST);
    }

    let store = state.store.clone();
    let caller = claims.sub;

    let chat = tokio::task::spawn_blocking(move || store.chat_for_pair(&caller, &peer_id))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(ChatResponse { chat_id: chat.id }))
}

/// GET /api/chats/{chat_id}/messages?before={id}&limit={n}
/// Paginated message history, newest first. JWT auth required.
pub async fn chat_history(
    State(state): State<AppState>,
    _claims: Claims,
    Path(chat_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, StatusCode> {
    let before = query.before;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let store = state.store.clone();

    let page = tokio::task::spawn_blocking(move || store.messages_page(&chat_id, before, limit))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(HistoryResponse {
        messages: page.messages,
        has_more: page.has_more,
    }))
}
