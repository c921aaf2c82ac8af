//! Field-service CRM tool server for AI agents.
//!
//! `crm-mcp` exposes a catalog of CRM operations (jobs, contacts, conversations,
//! invoices, campaigns, and more) to language-model agents over the
//! [Model Context Protocol](https://modelcontextprotocol.io/), and turns spoken
//! commands into calls against the same catalog.
//!
//! | Surface | Transport | Purpose |
//! |---------|-----------|---------|
//! | MCP | stdio (`rmcp`) | Desktop agents |
//! | MCP | streamable HTTP, `POST /mcp` | Remote agents and the voice executor |
//! | Voice commands | `POST /voice-command` | Utterance in, spoken reply out |
//!
//! # Architecture
//!
//! - **Storage**: SQLite, one transaction per tool call
//! - **Catalog**: typed parameter structs with `schemars`-generated JSON schemas
//! - **Language model**: any OpenAI-compatible chat completion endpoint
//! - **Voice routing**: remote-first execution with local fallback
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML and environment variables
//! - [`db`]: schema, migrations, and health checks
//! - [`tools`]: the catalog and dispatcher
//! - [`crm`]: handler bodies for every tool
//! - [`resolve`]: placeholder, name, and relative date resolution
//! - [`llm`]: language model client
//! - [`mcp`]: the MCP server handler (tools, resources, prompts) and remote client
//! - [`voice`]: intent parsing, execution, and reply formatting

pub mod config;
pub mod crm;
pub mod db;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod resolve;
pub mod server;
pub mod tools;
pub mod voice;
