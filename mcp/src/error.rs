use crate::session::McpSessionError;

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("session: {0}")]
    Session(#[from] McpSessionError),
    #[error("transport: {0}")]
    Transport(String),
    #[error("tool error: {0}")]
    ToolError(String),
    #[error("no server exposes tool {0:?}")]
    UnknownTool(String),
    #[error("tool {tool:?} denied for agent {agent:?}")]
    Denied { agent: String, tool: String },
}
