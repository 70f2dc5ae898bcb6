mod common;

use agix_config::Config;

#[tokio::test(flavor = "multi_thread")]
async fn health_endpoint_reports_ok() {
    let (base_url, _handle) = common::spawn_server(Config::default()).await;
    let resp = reqwest::get(format!("{base_url}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test(flavor = "multi_thread")]
async fn models_endpoint_lists_the_pricing_table() {
    let (base_url, _handle) = common::spawn_server(Config::default()).await;
    let resp = reqwest::get(format!("{base_url}/v1/models")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let ids: Vec<&str> = body["data"].as_array().unwrap().iter().map(|m| m["id"].as_str().unwrap()).collect();
    assert!(ids.contains(&"gpt-4o"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_session_returns_404() {
    let (base_url, _handle) = common::spawn_server(Config::default()).await;
    let client = reqwest::Client::new();
    let resp = client.get(format!("{base_url}/v1/sessions/does-not-exist")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}
