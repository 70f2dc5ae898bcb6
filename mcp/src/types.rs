use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One tool advertised by an MCP server's `tools/list`.
///
/// Tool names are unique across the whole tool manager: when two servers
/// advertise the same name, the first server registered wins and the
/// collision is logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolDescriptor {
    pub name: String,
    pub owning_server: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Result of a `tools/call`, already flattened to the text the LLM should see.
#[derive(Debug, Clone)]
pub struct ToolCallContent {
    pub text: String,
}

/// Per-agent tool visibility. Effective permission is
/// `(allow empty OR name in allow) AND (name NOT in deny)`. An agent with no
/// ACL entry sees every tool.
#[derive(Debug, Clone, Default)]
pub struct ToolAcl {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl ToolAcl {
    pub fn permits(&self, tool_name: &str) -> bool {
        let allowed = self.allow.is_empty() || self.allow.iter().any(|n| n == tool_name);
        let denied = self.deny.iter().any(|n| n == tool_name);
        allowed && !denied
    }
}

/// One child-process spec for an MCP server, as configured under `tools.servers.<name>`.
#[derive(Debug, Clone)]
pub struct McpServerSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}
