//! agix binary: loads config, wires the pipeline and tool manager, and
//! serves the HTTP API until shutdown.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use agix_core::Pipeline;
use agix_mcp::{McpServerSpec, ToolAcl, ToolManager};
use agix_serve::{run_serve, AppState};
use agix_store::Store;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let config = agix_config::load_default()?;

    let store = Arc::new(Store::connect(&config.database).await?);

    let specs: Vec<McpServerSpec> = config
        .tools
        .servers
        .iter()
        .map(|(name, server)| McpServerSpec {
            name: name.clone(),
            command: server.command.clone(),
            args: server.args.clone(),
            env: server.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
        .collect();
    let acls = config.tools.agents.iter().map(|(agent, acl)| (agent.clone(), ToolAcl { allow: acl.allow.clone(), deny: acl.deny.clone() })).collect();
    let tools = Arc::new(ToolManager::start(specs, acls, false).await);

    let pricing = agix_pricing::default_table();
    let port = config.port;
    let pipeline = Arc::new(Pipeline::new(config.clone(), store.clone(), pricing, Some(tools), None)?);

    let state = Arc::new(AppState { pipeline, store: store.clone(), config, client: reqwest::Client::new() });

    let addr = format!("0.0.0.0:{port}");
    run_serve(&addr, state).await?;

    store.close().await;
    Ok(())
}
