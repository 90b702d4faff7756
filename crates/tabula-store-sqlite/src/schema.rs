//! SQL schema for the tabula metadata store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS datasets (
    dataset_id    TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    storage_key   TEXT NOT NULL UNIQUE,
    owner_id      TEXT NOT NULL,
    content_type  TEXT NOT NULL,
    byte_size     INTEGER NOT NULL,
    created_at    TEXT NOT NULL      -- ISO 8601 UTC; server-assigned
);

-- Chats outlive their dataset row only as orphans; no cascade.
CREATE TABLE IF NOT EXISTS chats (
    chat_id     TEXT PRIMARY KEY,
    dataset_id  TEXT NOT NULL,
    owner_id    TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id     TEXT NOT NULL UNIQUE,
    chat_id        TEXT NOT NULL REFERENCES chats(chat_id),
    role           TEXT NOT NULL,   -- 'system' | 'user' | 'assistant'
    content        TEXT NOT NULL,
    title          TEXT,
    sql            TEXT,
    visualization  TEXT,
    error          TEXT,
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS datasets_owner_idx ON datasets(owner_id);
CREATE INDEX IF NOT EXISTS messages_chat_idx  ON messages(chat_id);

PRAGMA user_version = 1;
";
