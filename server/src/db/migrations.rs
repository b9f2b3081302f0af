use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "-- Migration 1: Chats and messages

CREATE TABLE chats (
    id TEXT PRIMARY KEY,
    participant_a TEXT NOT NULL,
    participant_b TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(participant_a, participant_b)
);
CREATE INDEX idx_chats_participant_a ON chats(participant_a);
CREATE INDEX idx_chats_participant_b ON chats(participant_b);

-- chat_id is intentionally not a foreign key: the transport treats chat ids
-- as opaque strings and never validates membership on the hot path.
CREATE TABLE messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id TEXT NOT NULL,
    sender_id TEXT NOT NULL,
    content TEXT NOT NULL,
    media_url TEXT,
    timestamp INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX idx_messages_chat_id ON messages(chat_id, id);
",
    )])
}
