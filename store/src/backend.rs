use std::sync::Mutex;

use tokio::task;

use crate::error::StoreError;

const SQLITE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS requests (
    id              TEXT PRIMARY KEY,
    timestamp       TEXT NOT NULL,
    agent_name      TEXT NOT NULL DEFAULT '',
    model           TEXT NOT NULL,
    provider        TEXT NOT NULL,
    input_tokens    INTEGER NOT NULL DEFAULT 0,
    output_tokens   INTEGER NOT NULL DEFAULT 0,
    cost_usd        REAL NOT NULL DEFAULT 0,
    duration_ms     INTEGER NOT NULL DEFAULT 0,
    status_code     INTEGER NOT NULL DEFAULT 200,
    failover_from   TEXT NOT NULL DEFAULT '',
    original_model  TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_requests_timestamp ON requests(timestamp);
CREATE INDEX IF NOT EXISTS idx_requests_agent_name ON requests(agent_name);
CREATE INDEX IF NOT EXISTS idx_requests_model ON requests(model);

CREATE TABLE IF NOT EXISTS traces (
    trace_id   TEXT PRIMARY KEY,
    agent_name TEXT NOT NULL DEFAULT '',
    model      TEXT NOT NULL,
    timestamp  TEXT NOT NULL,
    spans      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_events (
    id         TEXT PRIMARY KEY,
    timestamp  TEXT NOT NULL,
    agent_name TEXT NOT NULL DEFAULT '',
    event_type TEXT NOT NULL,
    detail     TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS webhook_executions (
    id              TEXT PRIMARY KEY,
    webhook_name    TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    status          TEXT NOT NULL,
    duration_ms     INTEGER NOT NULL DEFAULT 0,
    callback_status INTEGER
);
"#;

const POSTGRES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS requests (
    id              TEXT PRIMARY KEY,
    timestamp       TEXT NOT NULL,
    agent_name      TEXT NOT NULL DEFAULT '',
    model           TEXT NOT NULL,
    provider        TEXT NOT NULL,
    input_tokens    BIGINT NOT NULL DEFAULT 0,
    output_tokens   BIGINT NOT NULL DEFAULT 0,
    cost_usd        DOUBLE PRECISION NOT NULL DEFAULT 0,
    duration_ms     BIGINT NOT NULL DEFAULT 0,
    status_code     INTEGER NOT NULL DEFAULT 200,
    failover_from   TEXT NOT NULL DEFAULT '',
    original_model  TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_requests_timestamp ON requests(timestamp);
CREATE INDEX IF NOT EXISTS idx_requests_agent_name ON requests(agent_name);
CREATE INDEX IF NOT EXISTS idx_requests_model ON requests(model);

CREATE TABLE IF NOT EXISTS traces (
    trace_id   TEXT PRIMARY KEY,
    agent_name TEXT NOT NULL DEFAULT '',
    model      TEXT NOT NULL,
    timestamp  TEXT NOT NULL,
    spans      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_events (
    id         TEXT PRIMARY KEY,
    timestamp  TEXT NOT NULL,
    agent_name TEXT NOT NULL DEFAULT '',
    event_type TEXT NOT NULL,
    detail     TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS webhook_executions (
    id              TEXT PRIMARY KEY,
    webhook_name    TEXT NOT NULL,
    timestamp       TEXT NOT NULL,
    status          TEXT NOT NULL,
    duration_ms     BIGINT NOT NULL DEFAULT 0,
    callback_status INTEGER
);
"#;

/// Database backend, chosen by connection-string prefix.
///
/// `postgres://` / `postgresql://` selects the networked backend; anything
/// else is treated as a filesystem path to an embedded SQLite database.
pub enum Backend {
    Sqlite(Mutex<rusqlite::Connection>),
    Postgres(tokio_postgres::Client),
}

impl Backend {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
            let (client, connection) =
                tokio_postgres::connect(database_url, tokio_postgres::NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "postgres connection task exited");
                }
            });
            Ok(Backend::Postgres(client))
        } else {
            let path = database_url.to_string();
            let conn = task::spawn_blocking(move || rusqlite::Connection::open(path))
                .await
                .map_err(|_| StoreError::WriterGone)??;
            Ok(Backend::Sqlite(Mutex::new(conn)))
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        match self {
            Backend::Sqlite(conn) => {
                let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
                conn.execute_batch(SQLITE_SCHEMA)?;
            }
            Backend::Postgres(client) => {
                client.batch_execute(POSTGRES_SCHEMA).await?;
            }
        }
        Ok(())
    }

    pub fn is_postgres(&self) -> bool {
        matches!(self, Backend::Postgres(_))
    }
}
