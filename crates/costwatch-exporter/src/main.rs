//! costwatch exporter binary: spawns the poll task and serves `GET /metrics`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use costwatch_core::{
    ConfigResolver, ConfigSource, EnvSecretStore, Fetcher, FileConfigSource, FileSecretStore,
    MetricCache, Poller, ReqwestHttpClient, RetryPolicy, SecretStore,
};

const DEFAULT_CONFIG_PATH: &str = "/config/config.yaml";
const DEFAULT_BIND: ([u8; 4], u16) = ([0, 0, 0, 0], 2112);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| String::from(DEFAULT_CONFIG_PATH));
    let config_source = Arc::new(FileConfigSource::new(&config_path));

    // A broken config is fatal at startup; once the loop is running, load
    // failures are retried instead.
    let startup = match config_source.load() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, path = %config_path, "startup configuration is invalid");
            std::process::exit(1);
        }
    };
    info!(path = %config_path, "configuration loaded");

    // Token file beats environment lookup when the config names one.
    let secrets: Arc<dyn SecretStore> = if startup
        .additional_variables
        .contains_key("bearerTokenPath")
    {
        Arc::new(FileSecretStore)
    } else {
        Arc::new(EnvSecretStore)
    };

    let registry = Registry::new();
    let cancel = CancellationToken::new();

    let fetcher = Fetcher::new(
        Arc::new(ReqwestHttpClient::new()),
        Arc::new(ConfigResolver),
        secrets,
        RetryPolicy::default(),
        cancel.clone(),
    );
    let poller = Poller::new(
        config_source,
        fetcher,
        registry.clone(),
        MetricCache::new(),
        cancel.clone(),
    );
    let poll_task = tokio::spawn(poller.run());

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                cancel.cancel();
            }
        }
    });

    let bind: SocketAddr = std::env::var("COSTWATCH_BIND")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(DEFAULT_BIND));

    let app = Router::new()
        .route("/metrics", get(serve_metrics))
        .with_state(registry);

    let listener = match tokio::net::TcpListener::bind(bind).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, %bind, "failed to bind metrics listener");
            std::process::exit(1);
        }
    };
    info!(%bind, "serving metrics");

    let shutdown = cancel.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown.cancelled().await;
    });
    if let Err(err) = server.await {
        error!(error = %err, "metrics server failed");
    }

    cancel.cancel();
    let _ = poll_task.await;
}

async fn serve_metrics(State(registry): State<Registry>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&registry.gather(), &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
