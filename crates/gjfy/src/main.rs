use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "gjfy", about = "Share secrets through self-destructing links", version)]
struct Cli {
    /// gjfy server URL (default: http://localhost:9154 or $GJFY_SERVER)
    #[arg(long, env = "GJFY_SERVER", default_value = "http://localhost:9154")]
    server: String,

    /// Auth token for creating and deleting secrets ($GJFY_TOKEN)
    #[arg(long, env = "GJFY_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gjfy HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, env = "GJFY_PORT", default_value = "9154")]
        port: u16,
        /// Host to bind
        #[arg(long, env = "GJFY_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Base URL used in the links handed out (default: http://localhost:<port>)
        #[arg(long, env = "GJFY_PUBLIC_URL")]
        public_url: Option<String>,
        /// How often expired secrets are purged, e.g. 30m, 1h
        #[arg(long, env = "GJFY_SWEEP_INTERVAL", value_parser = humantime::parse_duration)]
        sweep_interval: Option<std::time::Duration>,
    },
    /// Store a secret and print its link
    New {
        /// The secret to share
        secret: String,
        /// Number of times the secret can be retrieved
        #[arg(long, default_value = "1")]
        max_clicks: u32,
        /// Days the secret stays valid (0 = server default)
        #[arg(long, default_value = "0")]
        valid_for: u32,
    },
    /// Retrieve a secret; counts against its quota
    Get {
        /// Secret id
        id: String,
    },
    /// Show a secret's metadata without retrieving it
    Info {
        /// Secret id
        id: String,
    },
    /// Delete a secret
    Delete {
        /// Secret id
        id: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GJFY_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            public_url,
            sweep_interval,
        } => cmd_serve(host, port, public_url, sweep_interval).await,

        Commands::New {
            secret,
            max_clicks,
            valid_for,
        } => {
            let created = create_secret(
                &cli.server,
                cli.token.as_deref(),
                &secret,
                max_clicks,
                valid_for,
            )
            .await?;
            println!("{}", created["url"].as_str().unwrap_or(""));
            Ok(())
        }

        Commands::Get { id } => {
            let entry = get_secret(&cli.server, &id).await?;
            println!("{}", entry["secret"].as_str().unwrap_or(""));
            Ok(())
        }

        Commands::Info { id } => {
            let meta = secret_info(&cli.server, &id).await?;
            println!("{}", format_info(&meta));
            Ok(())
        }

        Commands::Delete { id } => {
            let token = require_token(&cli.token)?;
            if delete_secret(&cli.server, &token, &id).await? {
                println!("✓ deleted {id}");
            } else {
                println!("{id} did not exist");
            }
            Ok(())
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(
    host: String,
    port: u16,
    public_url: Option<String>,
    sweep_interval: Option<std::time::Duration>,
) -> Result<()> {
    let defaults = gjfy_server::ServerConfig::default();
    let cfg = gjfy_server::ServerConfig {
        public_url: public_url.unwrap_or_else(|| format!("http://localhost:{port}")),
        sweep_interval: sweep_interval.unwrap_or(defaults.sweep_interval),
        host,
        port,
        ..defaults
    };

    gjfy_server::run(cfg).await
}

async fn create_secret(
    server: &str,
    token: Option<&str>,
    secret: &str,
    max_clicks: u32,
    valid_for: u32,
) -> Result<Value> {
    let body = serde_json::json!({
        "secret": secret,
        "max_clicks": max_clicks,
        "valid_for": valid_for,
    });

    let mut req = Client::new()
        .post(format!("{}/api/v1/new", server.trim_end_matches('/')))
        .json(&body);
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    let resp = req.send().await.context("HTTP request failed")?;

    let status = resp.status();
    if status == StatusCode::UNAUTHORIZED {
        anyhow::bail!("server rejected the auth token (set --token or GJFY_TOKEN)");
    }
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("server returned {status}: {text}");
    }
    resp.json().await.context("parse response")
}

async fn get_secret(server: &str, id: &str) -> Result<Value> {
    fetch_entry(server, "get", id).await
}

async fn secret_info(server: &str, id: &str) -> Result<Value> {
    fetch_entry(server, "info", id).await
}

async fn fetch_entry(server: &str, route: &str, id: &str) -> Result<Value> {
    let resp = Client::new()
        .get(format!(
            "{}/api/v1/{route}/{id}",
            server.trim_end_matches('/')
        ))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        anyhow::bail!("{id}: not found, used up or expired");
    }
    if !status.is_success() {
        anyhow::bail!("server returned {status}");
    }
    resp.json().await.context("parse response")
}

async fn delete_secret(server: &str, token: &str, id: &str) -> Result<bool> {
    let resp = Client::new()
        .delete(format!(
            "{}/api/v1/delete/{id}",
            server.trim_end_matches('/')
        ))
        .bearer_auth(token)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    if !status.is_success() {
        let json: Value = resp.json().await.unwrap_or_default();
        anyhow::bail!(
            "server returned {status}: {}",
            json["error"].as_str().unwrap_or("")
        );
    }
    let json: Value = resp.json().await.context("parse response")?;
    Ok(json["deleted"].as_bool().unwrap_or(false))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn require_token(token: &Option<String>) -> Result<String> {
    token
        .clone()
        .context("--token / GJFY_TOKEN is required for this command")
}

fn format_info(meta: &Value) -> String {
    format!(
        "  {} — {}/{} clicks — added {} — valid for {} day(s)\n  {}",
        meta["id"].as_str().unwrap_or("?"),
        meta["clicks"].as_u64().unwrap_or(0),
        meta["max_clicks"].as_u64().unwrap_or(0),
        meta["date_added"].as_str().unwrap_or("?"),
        meta["valid_for"].as_u64().unwrap_or(0),
        meta["url"].as_str().unwrap_or(""),
    )
}
