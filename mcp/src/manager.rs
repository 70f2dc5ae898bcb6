use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::client::McpClient;
use crate::error::McpError;
use crate::types::{McpServerSpec, McpToolDescriptor, ToolAcl, ToolCallContent};

/// Aggregates tools across a fleet of spawned MCP servers and applies
/// per-agent ACLs at call time.
///
/// Built once at startup from the configured server list; `refresh` may be
/// called again later (e.g. after a server restart) to re-run discovery.
pub struct ToolManager {
    clients: HashMap<String, Arc<McpClient>>,
    tools: HashMap<String, McpToolDescriptor>,
    acls: HashMap<String, ToolAcl>,
}

impl ToolManager {
    /// Spawns every configured server and runs `tools/list` discovery on
    /// each. A server that fails to spawn is skipped with a warning rather
    /// than aborting the whole manager — the remaining servers still work.
    pub async fn start(specs: Vec<McpServerSpec>, acls: HashMap<String, ToolAcl>, stderr_verbose: bool) -> Self {
        let mut clients = HashMap::new();
        for spec in specs {
            match McpClient::spawn(spec.name.clone(), spec.command, spec.args, spec.env, stderr_verbose) {
                Ok(client) => {
                    clients.insert(spec.name, Arc::new(client));
                }
                Err(e) => {
                    tracing::warn!(server = %spec.name, error = %e, "failed to spawn mcp server");
                }
            }
        }
        let mut manager = Self { clients, tools: HashMap::new(), acls };
        manager.refresh().await;
        manager
    }

    /// Re-runs `tools/list` on every live server and rebuilds the name ->
    /// descriptor map. First server registered for a name wins; later
    /// duplicates are logged and dropped.
    pub async fn refresh(&mut self) {
        let mut tools = HashMap::new();
        for (server_name, client) in &self.clients {
            match client.list_tools().await {
                Ok(descriptors) => {
                    for descriptor in descriptors {
                        if let Some(existing) = tools.get(&descriptor.name) {
                            let existing: &McpToolDescriptor = existing;
                            tracing::warn!(
                                tool = %descriptor.name,
                                kept = %existing.owning_server,
                                dropped = %server_name,
                                "duplicate mcp tool name, keeping first registration"
                            );
                            continue;
                        }
                        tools.insert(descriptor.name.clone(), descriptor);
                    }
                }
                Err(e) => {
                    tracing::warn!(server = %server_name, error = %e, "tools/list failed");
                }
            }
        }
        self.tools = tools;
    }

    /// Tools visible to `agent`, after ACL filtering. Unlisted agents see
    /// every tool.
    pub fn tools_for_agent(&self, agent: &str) -> Vec<&McpToolDescriptor> {
        let acl = self.acls.get(agent);
        self.tools
            .values()
            .filter(|t| acl.map(|acl| acl.permits(&t.name)).unwrap_or(true))
            .collect()
    }

    /// Invokes `tool_name` on its owning server, after checking `agent`'s ACL.
    pub async fn call_tool(
        &self,
        agent: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallContent, McpError> {
        if let Some(acl) = self.acls.get(agent) {
            if !acl.permits(tool_name) {
                return Err(McpError::Denied { agent: agent.to_string(), tool: tool_name.to_string() });
            }
        }
        let descriptor =
            self.tools.get(tool_name).ok_or_else(|| McpError::UnknownTool(tool_name.to_string()))?;
        let client = self
            .clients
            .get(&descriptor.owning_server)
            .ok_or_else(|| McpError::UnknownTool(tool_name.to_string()))?;
        client.call_tool(tool_name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acl_allow_empty_permits_everything_except_denied() {
        let acl = ToolAcl { allow: vec![], deny: vec!["dangerous_tool".to_string()] };
        assert!(acl.permits("read_file"));
        assert!(!acl.permits("dangerous_tool"));
    }

    #[test]
    fn acl_nonempty_allow_restricts_to_list() {
        let acl = ToolAcl { allow: vec!["read_file".to_string()], deny: vec![] };
        assert!(acl.permits("read_file"));
        assert!(!acl.permits("write_file"));
    }

    #[test]
    fn deny_wins_even_if_also_allowed() {
        let acl = ToolAcl { allow: vec!["read_file".to_string()], deny: vec!["read_file".to_string()] };
        assert!(!acl.permits("read_file"));
    }
}
