use rusqlite::Connection;

use crate::error::Result;

const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current_version == 0 {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY CHECK (id LIKE 'prj_%'),
                title TEXT NOT NULL,
                description TEXT,
                emoji TEXT,
                priority TEXT NOT NULL DEFAULT 'MEDIUM',
                state TEXT NOT NULL DEFAULT 'ACTIVE'
                    CHECK (state IN ('ACTIVE', 'WAITING', 'BLOCKED', 'DONE')),
                blocked_by TEXT NOT NULL DEFAULT '[]',
                is_one_off INTEGER NOT NULL DEFAULT 0,
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS subtasks (
                id TEXT PRIMARY KEY CHECK (id LIKE 'sub_%'),
                parent_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE
                    CHECK (parent_id LIKE 'prj_%'),
                title TEXT NOT NULL,
                description TEXT,
                emoji TEXT,
                priority TEXT NOT NULL DEFAULT 'MEDIUM',
                state TEXT NOT NULL DEFAULT 'WAITING'
                    CHECK (state IN ('ACTIVE', 'WAITING', 'BLOCKED', 'DONE')),
                blocked_by TEXT NOT NULL DEFAULT '[]',
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sections (
                id TEXT PRIMARY KEY CHECK (id LIKE 'sec_%'),
                name TEXT NOT NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS routines (
                id TEXT PRIMARY KEY CHECK (id LIKE 'rtn_%'),
                section_id TEXT REFERENCES sections(id) ON DELETE SET NULL
                    CHECK (section_id LIKE 'sec_%'),
                title TEXT NOT NULL,
                description TEXT,
                emoji TEXT,
                priority TEXT NOT NULL DEFAULT 'MEDIUM',
                state TEXT NOT NULL DEFAULT 'ACTIVE'
                    CHECK (state IN ('ACTIVE', 'WAITING', 'BLOCKED', 'DONE')),
                blocked_by TEXT NOT NULL DEFAULT '[]',
                interval TEXT,
                custom_interval TEXT,
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_subtasks_parent ON subtasks(parent_id);
            CREATE INDEX IF NOT EXISTS idx_routines_section ON routines(section_id);
            CREATE INDEX IF NOT EXISTS idx_projects_state ON projects(state);
            CREATE INDEX IF NOT EXISTS idx_subtasks_state ON subtasks(state);
            CREATE INDEX IF NOT EXISTS idx_routines_state ON routines(state);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_one_off
                ON projects(is_one_off) WHERE is_one_off = 1;

            PRAGMA journal_mode = WAL;
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}

pub fn open_db(path: &std::path::Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    init_schema(&conn)?;
    tracing::debug!(path = %path.display(), "opened database");
    Ok(conn)
}
