//! Engram MCP - MCP server exposing semantic memory tools to AI assistants
//!
//! This crate adapts the memory service to the Model Context Protocol. The
//! engine itself lives in `engram-store`; everything here is parameter
//! schemas, error translation, and tool routing.

pub mod error;
pub mod server;
pub mod tools;

// Re-exports
pub use error::{ServerError, Result};
pub use server::EngramServer;
