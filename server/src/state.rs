use std::sync::Arc;

use crate::chat::store::MessageStore;
use crate::config::ChatConfig;
use crate::ws::registry::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// System of record for chats and messages
    pub store: Arc<dyn MessageStore>,
    /// JWT verification secret (256-bit random key, shared with the platform
    /// that issues the tokens)
    pub jwt_secret: Vec<u8>,
    /// Active WebSocket connections, one entry per user
    pub registry: ConnectionRegistry,
    /// Chat transport tuning
    pub chat: ChatConfig,
}
