//! Request/response transformations for tool name namespacing.
//!
//! This module provides:
//! - `tool_names`: the prefix value and request-side rewrites (tools, tool_choice, tool_use)
//! - `streaming`: response-side prefix stripping over a chunked body

pub mod streaming;
pub mod tool_names;

// Re-export commonly used items
pub use streaming::{BoundaryMode, unprefix_body};
pub use tool_names::{ToolPrefix, prefix_request_tool_names};
