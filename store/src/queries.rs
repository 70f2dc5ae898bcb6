use rusqlite::params as sq_params;
use tokio::task;

use crate::backend::Backend;
use crate::error::StoreError;
use crate::rebind::{date_expr, rebind};
use crate::types::{AuditEvent, CostsByDay, RequestRecord, Stats, StatsByKey, TraceRecord, WebhookExecution};

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RequestRecord> {
    Ok(RequestRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        agent_name: row.get(2)?,
        model: row.get(3)?,
        provider: row.get(4)?,
        input_tokens: row.get(5)?,
        output_tokens: row.get(6)?,
        cost_usd: row.get(7)?,
        duration_ms: row.get(8)?,
        status_code: row.get(9)?,
        failover_from: row.get(10)?,
        original_model: row.get(11)?,
    })
}

fn pg_row_to_record(row: &tokio_postgres::Row) -> RequestRecord {
    RequestRecord {
        id: row.get(0),
        timestamp: row.get(1),
        agent_name: row.get(2),
        model: row.get(3),
        provider: row.get(4),
        input_tokens: row.get(5),
        output_tokens: row.get(6),
        cost_usd: row.get(7),
        duration_ms: row.get(8),
        status_code: row.get(9),
        failover_from: row.get(10),
        original_model: row.get(11),
    }
}

const REQUEST_COLUMNS: &str = "id, timestamp, agent_name, model, provider, input_tokens, \
     output_tokens, cost_usd, duration_ms, status_code, failover_from, original_model";

pub async fn insert_request(backend: &Backend, r: &RequestRecord) -> Result<(), StoreError> {
    let sql = format!("INSERT INTO requests ({REQUEST_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)");
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            conn.execute(
                &sql,
                sq_params![
                    r.id,
                    r.timestamp,
                    r.agent_name,
                    r.model,
                    r.provider,
                    r.input_tokens,
                    r.output_tokens,
                    r.cost_usd,
                    r.duration_ms,
                    r.status_code,
                    r.failover_from,
                    r.original_model,
                ],
            )?;
            Ok::<_, StoreError>(())
        }),
        Backend::Postgres(client) => {
            let sql = rebind(&sql, true);
            client
                .execute(
                    &sql,
                    &[
                        &r.id,
                        &r.timestamp,
                        &r.agent_name,
                        &r.model,
                        &r.provider,
                        &r.input_tokens,
                        &r.output_tokens,
                        &r.cost_usd,
                        &r.duration_ms,
                        &r.status_code,
                        &r.failover_from,
                        &r.original_model,
                    ],
                )
                .await?;
            Ok(())
        }
    }
}

/// Inserts many request records in a single transaction. Used by the batched
/// writer; a partial batch still commits atomically.
pub async fn insert_requests_batch(backend: &Backend, records: &[RequestRecord]) -> Result<(), StoreError> {
    if records.is_empty() {
        return Ok(());
    }
    let sql = format!("INSERT INTO requests ({REQUEST_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)");
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let mut conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            let tx = conn.transaction()?;
            for r in records {
                tx.execute(
                    &sql,
                    sq_params![
                        r.id,
                        r.timestamp,
                        r.agent_name,
                        r.model,
                        r.provider,
                        r.input_tokens,
                        r.output_tokens,
                        r.cost_usd,
                        r.duration_ms,
                        r.status_code,
                        r.failover_from,
                        r.original_model,
                    ],
                )?;
            }
            tx.commit()?;
            Ok::<_, StoreError>(())
        }),
        Backend::Postgres(client) => {
            let sql = rebind(&sql, true);
            for r in records {
                client
                    .execute(
                        &sql,
                        &[
                            &r.id,
                            &r.timestamp,
                            &r.agent_name,
                            &r.model,
                            &r.provider,
                            &r.input_tokens,
                            &r.output_tokens,
                            &r.cost_usd,
                            &r.duration_ms,
                            &r.status_code,
                            &r.failover_from,
                            &r.original_model,
                        ],
                    )
                    .await?;
            }
            Ok(())
        }
    }
}

pub async fn insert_trace(backend: &Backend, t: &TraceRecord) -> Result<(), StoreError> {
    let sql = "INSERT INTO traces (trace_id, agent_name, model, timestamp, spans) VALUES (?, ?, ?, ?, ?)";
    let spans = serde_json::to_string(&t.spans).unwrap_or_else(|_| "[]".to_string());
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            conn.execute(sql, sq_params![t.trace_id, t.agent_name, t.model, t.timestamp, spans])?;
            Ok::<_, StoreError>(())
        }),
        Backend::Postgres(client) => {
            let sql = rebind(sql, true);
            client
                .execute(&sql, &[&t.trace_id, &t.agent_name, &t.model, &t.timestamp, &spans])
                .await?;
            Ok(())
        }
    }
}

pub async fn insert_audit_event(backend: &Backend, e: &AuditEvent) -> Result<(), StoreError> {
    let sql = "INSERT INTO audit_events (id, timestamp, agent_name, event_type, detail) VALUES (?, ?, ?, ?, ?)";
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            conn.execute(sql, sq_params![e.id, e.timestamp, e.agent_name, e.event_type, e.detail])?;
            Ok::<_, StoreError>(())
        }),
        Backend::Postgres(client) => {
            let sql = rebind(sql, true);
            client
                .execute(&sql, &[&e.id, &e.timestamp, &e.agent_name, &e.event_type, &e.detail])
                .await?;
            Ok(())
        }
    }
}

pub async fn insert_webhook_execution(backend: &Backend, w: &WebhookExecution) -> Result<(), StoreError> {
    let sql = "INSERT INTO webhook_executions (id, webhook_name, timestamp, status, duration_ms, callback_status) \
               VALUES (?, ?, ?, ?, ?, ?)";
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            conn.execute(
                sql,
                sq_params![w.id, w.webhook_name, w.timestamp, w.status, w.duration_ms, w.callback_status],
            )?;
            Ok::<_, StoreError>(())
        }),
        Backend::Postgres(client) => {
            let sql = rebind(sql, true);
            client
                .execute(
                    &sql,
                    &[&w.id, &w.webhook_name, &w.timestamp, &w.status, &w.duration_ms, &w.callback_status],
                )
                .await?;
            Ok(())
        }
    }
}

pub async fn daily_spend(backend: &Backend, agent: &str, date: &str) -> Result<f64, StoreError> {
    let expr = date_expr(backend.is_postgres(), "timestamp");
    let sql = format!("SELECT COALESCE(SUM(cost_usd), 0) FROM requests WHERE agent_name = ? AND {expr} = ?");
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            let v: f64 = conn.query_row(&sql, sq_params![agent, date], |row| row.get(0))?;
            Ok::<_, StoreError>(v)
        }),
        Backend::Postgres(client) => {
            let sql = rebind(&sql, true);
            let row = client.query_one(&sql, &[&agent, &date]).await?;
            Ok(row.get::<_, f64>(0))
        }
    }
}

pub async fn monthly_spend(backend: &Backend, agent: &str, year: i32, month: u32) -> Result<f64, StoreError> {
    let prefix = format!("{year:04}-{month:02}%");
    let sql = "SELECT COALESCE(SUM(cost_usd), 0) FROM requests WHERE agent_name = ? AND timestamp LIKE ?";
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            let v: f64 = conn.query_row(sql, sq_params![agent, prefix], |row| row.get(0))?;
            Ok::<_, StoreError>(v)
        }),
        Backend::Postgres(client) => {
            let sql = rebind(sql, true);
            let row = client.query_one(&sql, &[&agent, &prefix]).await?;
            Ok(row.get::<_, f64>(0))
        }
    }
}

pub async fn recent(
    backend: &Backend,
    limit: u32,
    agent_filter: Option<&str>,
) -> Result<Vec<RequestRecord>, StoreError> {
    let limit = limit as i64;
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            let rows = match agent_filter {
                Some(agent) => {
                    let sql = format!(
                        "SELECT {REQUEST_COLUMNS} FROM requests WHERE agent_name = ? ORDER BY timestamp DESC LIMIT ?"
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(sq_params![agent, limit], row_to_record)?
                        .collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests ORDER BY timestamp DESC LIMIT ?");
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(sq_params![limit], row_to_record)?
                        .collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok::<_, StoreError>(rows)
        }),
        Backend::Postgres(client) => {
            let rows = match agent_filter {
                Some(agent) => {
                    let sql = rebind(
                        &format!(
                            "SELECT {REQUEST_COLUMNS} FROM requests WHERE agent_name = ? ORDER BY timestamp DESC LIMIT ?"
                        ),
                        true,
                    );
                    client.query(&sql, &[&agent, &limit]).await?
                }
                None => {
                    let sql = rebind(
                        &format!("SELECT {REQUEST_COLUMNS} FROM requests ORDER BY timestamp DESC LIMIT ?"),
                        true,
                    );
                    client.query(&sql, &[&limit]).await?
                }
            };
            Ok(rows.iter().map(pg_row_to_record).collect())
        }
    }
}

pub async fn stats(backend: &Backend, since: &str, until: &str) -> Result<Stats, StoreError> {
    let sql = "SELECT COUNT(*), COALESCE(SUM(cost_usd), 0), COALESCE(SUM(input_tokens), 0), \
               COALESCE(SUM(output_tokens), 0) FROM requests WHERE timestamp >= ? AND timestamp < ?";
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            let s = conn.query_row(sql, sq_params![since, until], |row| {
                Ok(Stats {
                    request_count: row.get(0)?,
                    total_cost_usd: row.get(1)?,
                    total_input_tokens: row.get(2)?,
                    total_output_tokens: row.get(3)?,
                })
            })?;
            Ok::<_, StoreError>(s)
        }),
        Backend::Postgres(client) => {
            let sql = rebind(sql, true);
            let row = client.query_one(&sql, &[&since, &until]).await?;
            Ok(Stats {
                request_count: row.get(0),
                total_cost_usd: row.get(1),
                total_input_tokens: row.get(2),
                total_output_tokens: row.get(3),
            })
        }
    }
}

async fn stats_by(backend: &Backend, column: &str, since: &str, until: &str) -> Result<Vec<StatsByKey>, StoreError> {
    let sql = format!(
        "SELECT {column}, COUNT(*), COALESCE(SUM(cost_usd), 0), COALESCE(SUM(input_tokens), 0), \
         COALESCE(SUM(output_tokens), 0) FROM requests WHERE timestamp >= ? AND timestamp < ? GROUP BY {column}"
    );
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(sq_params![since, until], |row| {
                    Ok(StatsByKey {
                        key: row.get(0)?,
                        stats: Stats {
                            request_count: row.get(1)?,
                            total_cost_usd: row.get(2)?,
                            total_input_tokens: row.get(3)?,
                            total_output_tokens: row.get(4)?,
                        },
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, StoreError>(rows)
        }),
        Backend::Postgres(client) => {
            let sql = rebind(&sql, true);
            let rows = client.query(&sql, &[&since, &until]).await?;
            Ok(rows
                .iter()
                .map(|row| StatsByKey {
                    key: row.get(0),
                    stats: Stats {
                        request_count: row.get(1),
                        total_cost_usd: row.get(2),
                        total_input_tokens: row.get(3),
                        total_output_tokens: row.get(4),
                    },
                })
                .collect())
        }
    }
}

pub async fn stats_by_agent(backend: &Backend, since: &str, until: &str) -> Result<Vec<StatsByKey>, StoreError> {
    stats_by(backend, "agent_name", since, until).await
}

pub async fn stats_by_model(backend: &Backend, since: &str, until: &str) -> Result<Vec<StatsByKey>, StoreError> {
    stats_by(backend, "model", since, until).await
}

pub async fn daily_costs(backend: &Backend, since: &str, until: &str) -> Result<Vec<CostsByDay>, StoreError> {
    let expr = date_expr(backend.is_postgres(), "timestamp");
    let sql = format!(
        "SELECT {expr} AS d, COALESCE(SUM(cost_usd), 0) FROM requests WHERE timestamp >= ? AND timestamp < ? \
         GROUP BY d ORDER BY d"
    );
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(sq_params![since, until], |row| {
                    Ok(CostsByDay {
                        date: row.get(0)?,
                        cost_usd: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, StoreError>(rows)
        }),
        Backend::Postgres(client) => {
            let sql = rebind(&sql, true);
            let rows = client.query(&sql, &[&since, &until]).await?;
            Ok(rows
                .iter()
                .map(|row| CostsByDay {
                    date: row.get::<_, String>(0),
                    cost_usd: row.get(1),
                })
                .collect())
        }
    }
}

pub async fn export(backend: &Backend, since: &str, until: &str) -> Result<Vec<RequestRecord>, StoreError> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE timestamp >= ? AND timestamp < ? ORDER BY timestamp");
    match backend {
        Backend::Sqlite(conn) => task::block_in_place(|| {
            let conn = conn.lock().map_err(|_| StoreError::WriterGone)?;
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(sq_params![since, until], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, StoreError>(rows)
        }),
        Backend::Postgres(client) => {
            let sql = rebind(&sql, true);
            let rows = client.query(&sql, &[&since, &until]).await?;
            Ok(rows.iter().map(pg_row_to_record).collect())
        }
    }
}
