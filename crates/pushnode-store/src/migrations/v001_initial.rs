//! v001 -- Initial schema creation.
//!
//! Creates `options`, `users` and `devices`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Node options (node key, ...)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS options (
    key   TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
);

-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    uid        TEXT PRIMARY KEY NOT NULL,   -- base32 self-certifying id
    pubkey     BLOB NOT NULL,               -- uncompressed SEC1 point
    seckey     BLOB NOT NULL,               -- 64-byte shared secret
    flags      INTEGER NOT NULL DEFAULT 0,
    lastupdate INTEGER NOT NULL,            -- unix millis
    createtime INTEGER NOT NULL
);

-- ----------------------------------------------------------------
-- Devices
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS devices (
    uuid       TEXT PRIMARY KEY NOT NULL,   -- upper hex sha1 of key
    uid        TEXT NOT NULL,               -- FK -> users(uid)
    key        BLOB NOT NULL,
    token      BLOB,                        -- APNs device token
    sandbox    INTEGER NOT NULL DEFAULT 0,  -- boolean 0/1
    type       INTEGER NOT NULL DEFAULT 0,
    lastupdate INTEGER NOT NULL,
    createtime INTEGER NOT NULL,

    FOREIGN KEY (uid) REFERENCES users(uid) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_devices_uid_lastupdate
    ON devices(uid, lastupdate DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
