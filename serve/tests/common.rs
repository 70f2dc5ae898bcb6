use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio::net::TcpListener;

use agix_config::Config;
use agix_core::Pipeline;
use agix_serve::AppState;
use agix_store::Store;

/// Binds a random port, builds a minimal `AppState`, and spawns the server.
/// Returns the base URL and the server's join handle.
pub async fn spawn_server(config: Config) -> (String, tokio::task::JoinHandle<Result<(), Box<dyn std::error::Error + Send + Sync>>>) {
    let file = NamedTempFile::new().unwrap();
    let store = Arc::new(Store::connect(file.path().to_str().unwrap()).await.unwrap());
    let pipeline = Arc::new(Pipeline::new(config.clone(), store.clone(), agix_pricing::default_table(), None, None).unwrap());
    let state = Arc::new(AppState { pipeline, store, config, client: reqwest::Client::new() });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{addr}");
    let handle = tokio::spawn(agix_serve::run_serve_on_listener(listener, state));
    (url, handle)
}
