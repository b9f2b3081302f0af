use axum::{
    extract::{ws::WebSocketUpgrade, Path, Query, State},
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::auth::middleware::Claims;
use crate::state::AppState;
use crate::ws::error::SessionError;
use crate::ws::session;

/// Query parameters for WebSocket connection.
/// Auth is via query param ?token=JWT — browser WebSocket clients cannot set
/// custom headers on the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /ws/{chat_id}?token=JWT
/// WebSocket upgrade endpoint. The credential is checked in full before the
/// transport is upgraded; a failed handshake is a plain 401 and never
/// registers a connection.
pub async fn chat_upgrade(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, SessionError> {
    let claims = authenticate(&state.jwt_secret, params.token.as_deref()).inspect_err(|err| {
        tracing::warn!(chat_id = %chat_id, error = %err, "WebSocket handshake rejected");
    })?;

    tracing::info!(
        user_id = %claims.sub,
        chat_id = %chat_id,
        "WebSocket connection authenticated"
    );

    Ok(ws
        .on_failed_upgrade(|err| {
            // Peer aborted mid-handshake; nothing was registered yet.
            tracing::warn!(error = %err, "WebSocket upgrade failed");
        })
        .on_upgrade(move |socket| session::run_session(socket, state, claims.sub, chat_id)))
}

/// Validate the query-string credential and extract the caller's identity.
fn authenticate(secret: &[u8], token: Option<&str>) -> Result<Claims, SessionError> {
    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => return Err(SessionError::Unauthenticated("missing token")),
    };

    let claims = jwt::validate_access_token(secret, token).map_err(|err| {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                SessionError::Unauthenticated("token expired")
            }
            _ => SessionError::Unauthenticated("token invalid"),
        }
    })?;

    // The claim set must carry a usable subject identifier.
    if claims.sub.is_empty() {
        return Err(SessionError::Unauthenticated("malformed claims"));
    }

    Ok(claims)
}
