//! MCP client plumbing: stdio JSON-RPC transport to child tool servers, and a
//! tool manager that aggregates their tools behind per-agent ACLs.

mod client;
mod error;
mod manager;
mod session;
mod types;

pub use client::McpClient;
pub use error::McpError;
pub use manager::ToolManager;
pub use session::{McpSession, McpSessionError};
pub use types::{McpServerSpec, McpToolDescriptor, ToolAcl, ToolCallContent};
