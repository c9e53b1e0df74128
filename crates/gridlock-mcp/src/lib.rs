//! MCP server support for running spreadsheet snippets.
//!
//! This crate exposes a handler layer (`handler::McpHandler`) that owns one in-memory workbook
//! and one stable sheet-id mapper, and maps MCP tool calls onto `gridlock::execute`. The binary
//! wraps it in a Content-Length framed JSON-RPC loop over stdio.

pub mod handler;
