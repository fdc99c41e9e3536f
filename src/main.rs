mod config;
mod constants;
mod error;
mod routes;
mod transforms;
mod transport;

use axum::ServiceExt;
use axum::{Router, routing::get};
use clap::Parser;
use config::Config;
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::Layer;
use tower_http::normalize_path::NormalizePath;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transforms::BoundaryMode;
use transport::{ToolPrefixLayer, ToolPrefixService, UpstreamTransport};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIME: &str = env!("BUILD_TIME");
pub const BUILD_PROFILE: &str = env!("BUILD_PROFILE");

pub struct AppState {
    /// Tool-prefix transport over the upstream client (cheap to clone per request)
    pub transport: ToolPrefixService<UpstreamTransport>,
    pub upstream_url: String,
    pub tool_prefix: String,
}

#[derive(Parser)]
#[command(name = "tool-prefix-proxy")]
#[command(about = "Transparent tool-name prefixing proxy for the Anthropic Messages API")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, env = "TOOL_PREFIX_PROXY_HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "TOOL_PREFIX_PROXY_PORT")]
    port: Option<u16>,

    /// Upstream base URL
    #[arg(short, long, env = "TOOL_PREFIX_PROXY_UPSTREAM")]
    upstream: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    let host = args.host.unwrap_or(config.host);
    let port = args.port.unwrap_or(config.port);
    let upstream_url = args.upstream.unwrap_or(config.upstream_url);
    url::Url::parse(&upstream_url).expect("Invalid upstream URL");

    // Shared HTTP client with connection pooling
    let http_client = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .pool_max_idle_per_host(10)
        .build()
        .expect("Failed to create HTTP client");

    let tool_prefix = config.tool_prefix.as_str().to_string();
    let transport = ToolPrefixLayer::new(config.tool_prefix)
        .with_boundary_mode(config.boundary_mode)
        .with_max_body_bytes(config.max_body_bytes)
        .layer(UpstreamTransport::new(http_client, &upstream_url));

    if config.boundary_mode == BoundaryMode::PerChunk {
        info!("Response unprefixing: per chunk (split tool names are not rewritten)");
    } else {
        info!("Response unprefixing: carry-over across chunks");
    }

    let state = Arc::new(AppState {
        transport,
        upstream_url: upstream_url.clone(),
        tool_prefix,
    });

    let app = NormalizePath::trim_trailing_slash(
        Router::new()
            .route("/health", get(routes::health::health))
            .route("/version", get(routes::health::version))
            .fallback(routes::proxy::forward)
            .with_state(state),
    );

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid address");
    info!(
        "Starting tool-prefix-proxy v{}-{} ({} build, {})",
        VERSION, GIT_HASH, BUILD_PROFILE, BUILD_TIME
    );
    info!("Listening on http://{}", addr);
    info!("Forwarding to {}", upstream_url);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .await
    .unwrap();
}
