use std::env;

use dotenvy::dotenv;

use crate::constants::{
    DEFAULT_MAX_BODY_BYTES, DEFAULT_TIMEOUT_SECS, DEFAULT_TOOL_PREFIX, DEFAULT_UPSTREAM_URL,
};
use crate::transforms::{BoundaryMode, ToolPrefix};

pub struct Config {
    pub host: String,
    pub port: u16,
    pub upstream_url: String,
    pub tool_prefix: ToolPrefix,
    pub boundary_mode: BoundaryMode,
    pub timeout_secs: u64,
    pub max_body_bytes: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let host = env::var("TOOL_PREFIX_PROXY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("TOOL_PREFIX_PROXY_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(4097);

        let upstream_url = env::var("TOOL_PREFIX_PROXY_UPSTREAM")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());

        let tool_prefix = env::var("TOOL_PREFIX_PROXY_PREFIX")
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_TOOL_PREFIX.to_string());

        let boundary_mode =
            parse_boundary_mode(env::var("TOOL_PREFIX_PROXY_BOUNDARY").as_deref().ok());

        let timeout_secs = env::var("TOOL_PREFIX_PROXY_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let max_body_bytes = env::var("TOOL_PREFIX_PROXY_MAX_BODY_BYTES")
            .ok()
            .and_then(|b| b.parse().ok())
            .filter(|&b| b > 0)
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        Self {
            host,
            port,
            upstream_url,
            tool_prefix: ToolPrefix::new(tool_prefix),
            boundary_mode,
            timeout_secs,
            max_body_bytes,
        }
    }
}

/// `carry-over` (or `carry`) enables cross-chunk matching; anything else keeps
/// the per-chunk default.
fn parse_boundary_mode(value: Option<&str>) -> BoundaryMode {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("carry-over" | "carry_over" | "carry") => BoundaryMode::CarryOver,
        _ => BoundaryMode::PerChunk,
    }
}
