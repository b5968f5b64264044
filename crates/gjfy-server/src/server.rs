use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    auth::{require_token, TokenSet},
    handlers::{
        api_delete_secret, api_get_secret, api_info_secret, create_secret, favicon, health,
        stylesheet, view_info, view_secret,
    },
    store::{Endpoints, SecretStore, DEFAULT_VALID_FOR_DAYS, MAX_VALID_FOR_DAYS},
    sweeper::{Sweeper, DEFAULT_SWEEP_INTERVAL},
    AppState,
};

/// Largest request body accepted, in bytes.
pub const MAX_BODY_BYTES: usize = 1_048_576;

pub const DEFAULT_PORT: u16 = 9154;
pub const DEFAULT_CSS_FILE: &str = "/etc/gjfy/custom.css";

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Scheme, host and port used in the links handed out ($GJFY_PUBLIC_URL).
    pub public_url: String,
    /// Tokens accepted for creation ($GJFY_AUTH_TOKENS, comma separated).
    pub auth_tokens: Vec<String>,
    /// File with one token per line ($GJFY_AUTH_TOKENS_FILE).
    pub auth_tokens_file: Option<PathBuf>,
    pub css_file: PathBuf,
    /// Days a secret stays valid when the creator gives no value.
    pub default_valid_for: u32,
    pub sweep_interval: Duration,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let port = std::env::var("GJFY_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        Self {
            host: std::env::var("GJFY_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            public_url: std::env::var("GJFY_PUBLIC_URL")
                .unwrap_or_else(|_| format!("http://localhost:{port}")),
            auth_tokens: std::env::var("GJFY_AUTH_TOKENS")
                .map(|v| v.split(',').map(str::to_owned).collect())
                .unwrap_or_default(),
            auth_tokens_file: std::env::var("GJFY_AUTH_TOKENS_FILE").ok().map(PathBuf::from),
            css_file: std::env::var("GJFY_CSS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CSS_FILE)),
            default_valid_for: std::env::var("GJFY_DEFAULT_VALID_FOR")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|days| (1..=MAX_VALID_FOR_DAYS).contains(days))
                .unwrap_or(DEFAULT_VALID_FOR_DAYS),
            sweep_interval: std::env::var("GJFY_SWEEP_INTERVAL")
                .ok()
                .and_then(|v| humantime::parse_duration(&v).ok())
                .filter(|d| !d.is_zero())
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
            cors_origins: std::env::var("GJFY_CORS_ORIGINS").ok(),
        }
    }
}

impl ServerConfig {
    /// Combine inline tokens with those from the token file, if configured.
    pub fn resolve_tokens(&self) -> Result<TokenSet> {
        let inline = TokenSet::new(&self.auth_tokens);
        match &self.auth_tokens_file {
            Some(path) => Ok(inline.merge(&TokenSet::from_file(path)?)),
            None => Ok(inline),
        }
    }
}

/// Assemble the application routes around `state`.
pub fn router(state: AppState, cors_origins: Option<&str>) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/api/v1/new", post(create_secret))
        .route("/api/v1/get/{id}", get(api_get_secret))
        .route("/api/v1/info/{id}", get(api_info_secret))
        .route("/g", get(view_secret))
        .route("/i", get(view_info))
        .route("/favicon.ico", get(favicon))
        .route("/custom.css", get(stylesheet));

    let protected = Router::new()
        .route("/api/v1/delete/{id}", delete(api_delete_secret))
        .layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let tokens = cfg.resolve_tokens()?;
    if tokens.is_empty() {
        warn!("no auth tokens configured; anyone can create secrets");
    } else {
        info!(tokens = tokens.len(), "creation requires an auth token");
    }

    let store = SecretStore::new(cfg.default_valid_for);
    let sweeper = Sweeper::spawn(store.clone(), cfg.sweep_interval);
    info!(
        interval = %humantime::format_duration(cfg.sweep_interval),
        default_valid_for = cfg.default_valid_for,
        "expiry sweeper started"
    );

    let state = AppState {
        store,
        tokens,
        endpoints: Endpoints::new(cfg.public_url.as_str()),
        css_file: cfg.css_file,
    };
    let app = router(state, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, public_url = %cfg.public_url, "gjfy server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error");

    sweeper.shutdown().await;
    info!("gjfy server stopped");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
