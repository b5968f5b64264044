pub mod assets;
pub mod auth;
pub mod handlers;
pub mod html;
pub mod server;
pub mod store;
pub mod sweeper;

use std::path::PathBuf;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: store::SecretStore,
    /// Tokens accepted for creating and deleting secrets; empty means open.
    pub tokens: auth::TokenSet,
    /// Public base URL used to build the links handed out to creators.
    pub endpoints: store::Endpoints,
    pub css_file: PathBuf,
}

pub use server::{router, run, ServerConfig};
