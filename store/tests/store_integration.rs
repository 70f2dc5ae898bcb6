//! Integration tests for agix_store::Store against the embedded SQLite backend.
//! Uses multi_thread runtime since Store's queries rely on block_in_place.

use agix_store::{AuditEvent, RequestRecord, Span, Store, TraceRecord};
use tempfile::NamedTempFile;

fn record(id: &str, agent: &str, model: &str, timestamp: &str, cost: f64) -> RequestRecord {
    RequestRecord {
        id: id.to_string(),
        timestamp: timestamp.to_string(),
        agent_name: agent.to_string(),
        model: model.to_string(),
        provider: "openai".to_string(),
        input_tokens: 100,
        output_tokens: 50,
        cost_usd: cost,
        duration_ms: 120,
        status_code: 200,
        failover_from: String::new(),
        original_model: model.to_string(),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn insert_async_then_recent_returns_it_newest_first() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::connect(file.path().to_str().unwrap()).await.unwrap();

    store
        .insert_async(record("r1", "agent-a", "gpt-4o", "2026-07-01T00:00:00Z", 0.01))
        .await
        .unwrap();
    store
        .insert_async(record("r2", "agent-a", "gpt-4o", "2026-07-02T00:00:00Z", 0.02))
        .await
        .unwrap();

    store.close().await;

    let rows = store.recent(10, None).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, "r2");
    assert_eq!(rows[1].id, "r1");
}

#[tokio::test(flavor = "multi_thread")]
async fn recent_filters_by_agent() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::connect(file.path().to_str().unwrap()).await.unwrap();

    store
        .insert_async(record("r1", "agent-a", "gpt-4o", "2026-07-01T00:00:00Z", 0.01))
        .await
        .unwrap();
    store
        .insert_async(record("r2", "agent-b", "gpt-4o", "2026-07-01T00:01:00Z", 0.02))
        .await
        .unwrap();
    store.close().await;

    let rows = store.recent(10, Some("agent-b")).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "r2");
}

#[tokio::test(flavor = "multi_thread")]
async fn daily_and_monthly_spend_aggregate_cost() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::connect(file.path().to_str().unwrap()).await.unwrap();

    store
        .insert_async(record("r1", "agent-a", "gpt-4o", "2026-07-15T08:00:00Z", 1.5))
        .await
        .unwrap();
    store
        .insert_async(record("r2", "agent-a", "gpt-4o", "2026-07-15T20:00:00Z", 0.5))
        .await
        .unwrap();
    store
        .insert_async(record("r3", "agent-a", "gpt-4o", "2026-07-16T08:00:00Z", 3.0))
        .await
        .unwrap();
    store.close().await;

    let daily = store.daily_spend("agent-a", "2026-07-15").await.unwrap();
    assert!((daily - 2.0).abs() < 1e-9);

    let monthly = store.monthly_spend("agent-a", 2026, 7).await.unwrap();
    assert!((monthly - 5.0).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread")]
async fn stats_by_agent_and_model_group_correctly() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::connect(file.path().to_str().unwrap()).await.unwrap();

    store
        .insert_async(record("r1", "agent-a", "gpt-4o", "2026-07-01T00:00:00Z", 1.0))
        .await
        .unwrap();
    store
        .insert_async(record("r2", "agent-a", "claude-3", "2026-07-01T01:00:00Z", 2.0))
        .await
        .unwrap();
    store
        .insert_async(record("r3", "agent-b", "gpt-4o", "2026-07-01T02:00:00Z", 4.0))
        .await
        .unwrap();
    store.close().await;

    let overall = store.stats("2026-07-01T00:00:00Z", "2026-07-02T00:00:00Z").await.unwrap();
    assert_eq!(overall.request_count, 3);
    assert!((overall.total_cost_usd - 7.0).abs() < 1e-9);

    let by_agent = store
        .stats_by_agent("2026-07-01T00:00:00Z", "2026-07-02T00:00:00Z")
        .await
        .unwrap();
    let a = by_agent.iter().find(|s| s.key == "agent-a").unwrap();
    assert_eq!(a.stats.request_count, 2);
    assert!((a.stats.total_cost_usd - 3.0).abs() < 1e-9);

    let by_model = store
        .stats_by_model("2026-07-01T00:00:00Z", "2026-07-02T00:00:00Z")
        .await
        .unwrap();
    let gpt = by_model.iter().find(|s| s.key == "gpt-4o").unwrap();
    assert_eq!(gpt.stats.request_count, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn daily_costs_groups_by_calendar_day_in_order() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::connect(file.path().to_str().unwrap()).await.unwrap();

    store
        .insert_async(record("r1", "agent-a", "gpt-4o", "2026-07-01T23:59:00Z", 1.0))
        .await
        .unwrap();
    store
        .insert_async(record("r2", "agent-a", "gpt-4o", "2026-07-02T00:01:00Z", 2.0))
        .await
        .unwrap();
    store.close().await;

    let days = store
        .daily_costs("2026-07-01T00:00:00Z", "2026-07-03T00:00:00Z")
        .await
        .unwrap();
    assert_eq!(days.len(), 2);
    assert_eq!(days[0].date, "2026-07-01");
    assert!((days[0].cost_usd - 1.0).abs() < 1e-9);
    assert_eq!(days[1].date, "2026-07-02");
}

#[tokio::test(flavor = "multi_thread")]
async fn insert_trace_and_audit_event_round_trip_via_export() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::connect(file.path().to_str().unwrap()).await.unwrap();

    store
        .insert_trace(TraceRecord {
            trace_id: "t1".to_string(),
            agent_name: "agent-a".to_string(),
            model: "gpt-4o".to_string(),
            timestamp: "2026-07-01T00:00:00Z".to_string(),
            spans: vec![Span {
                name: "upstream".to_string(),
                started_at: "2026-07-01T00:00:00Z".to_string(),
                duration_ms: 42,
                attributes: serde_json::json!({"status": 200}),
            }],
        })
        .await
        .unwrap();

    store
        .insert_audit_event(AuditEvent {
            id: "a1".to_string(),
            timestamp: "2026-07-01T00:00:00Z".to_string(),
            agent_name: "agent-a".to_string(),
            event_type: "firewall_block".to_string(),
            detail: "matched rule: secrets".to_string(),
        })
        .await
        .unwrap();

    store
        .insert_async(record("r1", "agent-a", "gpt-4o", "2026-07-01T00:00:00Z", 0.1))
        .await
        .unwrap();
    store.close().await;

    let exported = store
        .export("2026-07-01T00:00:00Z", "2026-07-02T00:00:00Z")
        .await
        .unwrap();
    assert_eq!(exported.len(), 1);
    assert_eq!(exported[0].id, "r1");
}

#[tokio::test(flavor = "multi_thread")]
async fn writer_falls_back_to_synchronous_insert_when_channel_is_full() {
    let file = NamedTempFile::new().unwrap();
    let store = Store::connect(file.path().to_str().unwrap()).await.unwrap();

    for i in 0..300 {
        store
            .insert_async(record(
                &format!("r{i}"),
                "agent-a",
                "gpt-4o",
                "2026-07-01T00:00:00Z",
                0.001,
            ))
            .await
            .unwrap();
    }
    store.close().await;

    let rows = store.recent(500, None).await.unwrap();
    assert_eq!(rows.len(), 300);
}
