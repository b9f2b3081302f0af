use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::chat::store::StoreError;

/// Failures scoped to a single chat session. None of these ever take the
/// process down: a rejected handshake ends the upgrade attempt, anything
/// after that ends only the one connection it happened on.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing, invalid, expired, or malformed credential. Raised before the
    /// transport is upgraded, so a failed handshake never touches the
    /// connection registry.
    #[error("unauthenticated: {0}")]
    Unauthenticated(&'static str),

    /// Upgrade or socket-level failure on an established connection.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    /// The persistence collaborator failed. Fatal to the session during
    /// history replay; logged and skipped during the live loop.
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = match &self {
            SessionError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            SessionError::Transport(_) => StatusCode::BAD_GATEWAY,
            SessionError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
