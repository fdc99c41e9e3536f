/// Default upstream base URL (Anthropic API)
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.anthropic.com";

/// Path suffix of the endpoint whose requests get tool names rewritten
pub const MESSAGES_PATH_SUFFIX: &str = "/v1/messages";

/// Boolean query flag the messages endpoint requires for beta features
pub const BETA_QUERY_PARAM: &str = "beta";

/// Namespace prefix applied to tool names on their way upstream
pub const DEFAULT_TOOL_PREFIX: &str = "cc_";

/// JSON key fragment that precedes a tool name in serialized responses.
/// Must stay in sync with the `name` field rewritten on the request side.
pub const NAME_KEY: &str = "\"name\":\"";

/// Largest messages request body buffered for rewriting (32 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Upstream request timeout (long generations can take minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
