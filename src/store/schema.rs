pub const SCHEMA: &str = r#"
-- Assets are named structured documents; rows are tombstoned, never removed
CREATE TABLE IF NOT EXISTS asset (
    id INTEGER PRIMARY KEY AUTOINCREMENT,  -- AUTOINCREMENT: ids are never reused
    name TEXT NOT NULL,
    data TEXT NOT NULL DEFAULT '{}',       -- JSON document
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Opaque bearer tokens; only the argon2id hash is stored
CREATE TABLE IF NOT EXISTS access_token (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    identifier TEXT NOT NULL,              -- lookup portion of the raw token
    token_hash TEXT NOT NULL,
    expires_at TEXT,                       -- NULL = never
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Name uniqueness covers tombstoned rows as well
CREATE UNIQUE INDEX IF NOT EXISTS ix_asset_name ON asset(name);
CREATE UNIQUE INDEX IF NOT EXISTS ix_access_token_identifier ON access_token(identifier);
"#;
