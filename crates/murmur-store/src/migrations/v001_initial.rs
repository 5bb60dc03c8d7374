//! v001 -- Initial schema creation.
//!
//! Creates the three provider tables: `profiles`, `messages` and `blobs`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    username    TEXT NOT NULL UNIQUE,
    first_name  TEXT NOT NULL DEFAULT '',
    last_name   TEXT NOT NULL DEFAULT '',
    avatar_url  TEXT,
    created_at  TEXT NOT NULL                 -- RFC-3339
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4, provider-assigned
    sender_id   TEXT NOT NULL,                -- FK -> profiles(id)
    receiver_id TEXT NOT NULL,                -- FK -> profiles(id)
    content     TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL,                -- fixed-width RFC-3339, UTC
    read        INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    file_url    TEXT,
    file_type   TEXT,                         -- image | video | document | audio
    file_name   TEXT,

    CHECK (sender_id <> receiver_id),
    FOREIGN KEY (sender_id) REFERENCES profiles(id) ON DELETE CASCADE,
    FOREIGN KEY (receiver_id) REFERENCES profiles(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_messages_pair_ts
    ON messages(sender_id, receiver_id, created_at);

-- ----------------------------------------------------------------
-- Blobs (content-addressed attachments)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS blobs (
    key         TEXT PRIMARY KEY NOT NULL,    -- BLAKE3 hex digest
    mime        TEXT NOT NULL,
    size        INTEGER NOT NULL,
    data        BLOB NOT NULL,
    created_at  TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
