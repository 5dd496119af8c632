//! SQLite storage layer: connection pool, schema DDL, and per-entity
//! query modules. Every blocking `rusqlite` call runs through
//! [`Db::run`], which offloads it to a blocking thread so the async
//! handlers never stall the tokio reactor — the teacher's OTLP path is
//! entirely in-memory and has no equivalent, so this pooling pattern is
//! grounded on `xkazm04-personas`'s `rusqlite` + `r2d2` + `r2d2_sqlite`
//! storage layer instead.

pub mod models;
pub mod projects;
pub mod traces;
pub mod spans;
pub mod drift_alerts;
pub mod replay_runs;
pub mod notifications;
pub mod users;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::{storage_err, VigilResult};

pub type SqlitePool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    pub fn open(database_url: &str) -> anyhow::Result<Self> {
        // `sqlite+aiosqlite:///./vigil.db`-style URLs from the Python config
        // are accepted too — strip any scheme prefix and keep the path.
        let path = database_url
            .rsplit_once("://")
            .map(|(_, p)| p.trim_start_matches('/'))
            .unwrap_or(database_url);
        let path = if path.is_empty() { "vigil.db" } else { path };

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")
        });
        let pool = Pool::builder().max_size(16).build(manager)?;
        let db = Db { pool };
        db.init_schema()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        let db = Db { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Run a blocking closure against a pooled connection on a blocking
    /// thread, translating pool/connection failures into a `VigilError`
    /// without ever exposing the underlying SQLite message to the caller.
    pub async fn run<F, R>(&self, context: &'static str, f: F) -> VigilResult<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| storage_err(context, e))?;
            f(&conn).map_err(|e| storage_err(context, e))
        })
        .await
        .map_err(|e| storage_err(context, e))?
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.pool.get()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    key TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL DEFAULT 'default',
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_api_keys_project_id ON api_keys(project_id);

CREATE TABLE IF NOT EXISTS project_settings (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL UNIQUE REFERENCES projects(id) ON DELETE CASCADE,
    openai_api_key_encrypted TEXT,
    anthropic_api_key_encrypted TEXT,
    default_openai_model TEXT NOT NULL DEFAULT 'gpt-4o',
    default_anthropic_model TEXT NOT NULL DEFAULT 'claude-sonnet-4-5-20250929',
    drift_check_interval_minutes INTEGER NOT NULL DEFAULT 60,
    drift_check_enabled INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_project_settings_project_id ON project_settings(project_id);

CREATE TABLE IF NOT EXISTS traces (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'unset',
    external_id TEXT UNIQUE,
    metadata TEXT,
    start_time TEXT,
    end_time TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_traces_project_id ON traces(project_id);
CREATE INDEX IF NOT EXISTS ix_traces_created_at ON traces(created_at);
CREATE UNIQUE INDEX IF NOT EXISTS ix_traces_external_id ON traces(external_id);

CREATE TABLE IF NOT EXISTS spans (
    id TEXT PRIMARY KEY,
    trace_id TEXT NOT NULL REFERENCES traces(id) ON DELETE CASCADE,
    parent_span_id TEXT,
    name TEXT NOT NULL DEFAULT '',
    kind TEXT NOT NULL DEFAULT 'custom',
    status TEXT NOT NULL DEFAULT 'unset',
    input TEXT,
    output TEXT,
    metadata TEXT,
    events TEXT,
    start_time TEXT,
    end_time TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_spans_trace_id ON spans(trace_id);
CREATE INDEX IF NOT EXISTS ix_spans_parent_span_id ON spans(parent_span_id);
CREATE INDEX IF NOT EXISTS ix_spans_kind ON spans(kind);
CREATE INDEX IF NOT EXISTS ix_spans_status ON spans(status);
CREATE INDEX IF NOT EXISTS ix_spans_start_time ON spans(start_time);
CREATE INDEX IF NOT EXISTS ix_spans_created_at ON spans(created_at);

CREATE TABLE IF NOT EXISTS drift_alerts (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    span_kind TEXT NOT NULL,
    metric_name TEXT NOT NULL,
    baseline_value REAL NOT NULL,
    current_value REAL NOT NULL,
    psi_score REAL NOT NULL,
    severity TEXT NOT NULL DEFAULT 'low',
    resolved INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_drift_alerts_project_id ON drift_alerts(project_id);
CREATE INDEX IF NOT EXISTS ix_drift_alerts_resolved ON drift_alerts(resolved);
CREATE INDEX IF NOT EXISTS ix_drift_alerts_severity ON drift_alerts(severity);

CREATE TABLE IF NOT EXISTS replay_runs (
    id TEXT PRIMARY KEY,
    original_trace_id TEXT NOT NULL REFERENCES traces(id) ON DELETE CASCADE,
    project_id TEXT,
    status TEXT NOT NULL DEFAULT 'estimating',
    created_by TEXT,
    config TEXT,
    result_trace_id TEXT,
    estimated_cost_usd REAL,
    actual_cost_usd REAL,
    llm_spans_count INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_replay_runs_original_trace_id ON replay_runs(original_trace_id);

CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    type TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL DEFAULT '',
    reference_id TEXT,
    read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_notifications_project_id ON notifications(project_id);
CREATE INDEX IF NOT EXISTS ix_notifications_read ON notifications(read);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    hashed_password TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
