/// Database row types for all tables.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.
use serde::Serialize;

/// A chat between a pair of users. The pair is stored normalized
/// (participant_a < participant_b) so lookups are direction-independent.
#[derive(Debug, Clone)]
pub struct Chat {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub created_at: String,
}

/// A persisted chat message. Immutable once written: the store is the
/// system of record, the transport only holds transient copies for fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub media_url: Option<String>,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
    pub created_at: String,
}
