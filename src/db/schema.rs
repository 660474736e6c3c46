//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::WelltickError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), WelltickError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, WelltickError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), WelltickError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), WelltickError> {
    conn.execute_batch(USERS_SCHEMA)
        .map_err(|e| WelltickError::Internal(format!("Failed to create users table: {}", e)))?;

    conn.execute_batch(HEALTH_SCHEMA)
        .map_err(|e| WelltickError::Internal(format!("Failed to create health tables: {}", e)))?;

    conn.execute_batch(CONTACTS_SCHEMA)
        .map_err(|e| WelltickError::Internal(format!("Failed to create contacts table: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| WelltickError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), WelltickError> {
    info!(from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

const USERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Health records and wellness metrics
const HEALTH_SCHEMA: &str = r#"
-- Record metadata. A private payload lives sealed in the content store and is
-- referenced by content_id; a public payload lives inline in payload_json.
CREATE TABLE IF NOT EXISTS health_records (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    category TEXT NOT NULL
        CHECK (category IN ('medication', 'condition', 'allergy', 'procedure', 'note')),
    title TEXT NOT NULL,
    description TEXT,

    payload_json TEXT,
    visibility TEXT NOT NULL DEFAULT 'private'
        CHECK (visibility IN ('private', 'public')),

    content_id TEXT,
    encryption_key TEXT,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    CHECK ((content_id IS NULL) = (encryption_key IS NULL)),
    CHECK (content_id IS NULL OR payload_json IS NULL),
    FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
);

-- Append-only metric series
CREATE TABLE IF NOT EXISTS wellness_metrics (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    category TEXT NOT NULL
        CHECK (category IN ('mood', 'pain', 'energy', 'sleep', 'steps', 'heart_rate')),
    value REAL NOT NULL,
    notes TEXT,
    recorded_at TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
);
"#;

const CONTACTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS emergency_contacts (
    id TEXT PRIMARY KEY NOT NULL,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    phone TEXT NOT NULL,
    relationship TEXT,
    is_primary INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE CASCADE
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_records_owner_created ON health_records(owner_id, created_at);
CREATE INDEX IF NOT EXISTS idx_records_owner_category ON health_records(owner_id, category);
CREATE INDEX IF NOT EXISTS idx_records_content_id ON health_records(content_id);

CREATE INDEX IF NOT EXISTS idx_metrics_owner_recorded ON wellness_metrics(owner_id, recorded_at);
CREATE INDEX IF NOT EXISTS idx_metrics_owner_category ON wellness_metrics(owner_id, category, recorded_at);

CREATE INDEX IF NOT EXISTS idx_contacts_owner ON emergency_contacts(owner_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_contacts_one_primary
    ON emergency_contacts(owner_id) WHERE is_primary = 1;
"#;
