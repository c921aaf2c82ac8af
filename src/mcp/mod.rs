//! Model Context Protocol surfaces: one `rmcp` handler served over stdio and
//! streamable HTTP, and a client for calling a remote endpoint.

pub mod client;
pub mod handler;
pub mod prompts;
pub mod resources;

pub use client::{McpClient, McpClientError};
pub use handler::{CrmTools, SERVER_NAME};
