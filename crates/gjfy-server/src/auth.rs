use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use constant_time_eq::constant_time_eq;
use serde_json::json;

use crate::AppState;

/// Tokens that allow creating and deleting secrets.
///
/// An empty set means creation is open to anyone.
#[derive(Clone, Default)]
pub struct TokenSet {
    tokens: Arc<Vec<String>>,
}

impl TokenSet {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens: Vec<String> = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect();
        Self {
            tokens: Arc::new(tokens),
        }
    }

    /// Read one token per line. Blank lines and `#` comments are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("read token file: {}", path.display()))?;
        Ok(Self::new(
            content.lines().filter(|l| !l.trim_start().starts_with('#')),
        ))
    }

    /// Union of two sets.
    pub fn merge(&self, other: &TokenSet) -> Self {
        Self::new(self.tokens.iter().chain(other.tokens.iter()))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Check a presented token. Always true for an empty set.
    pub fn is_authorized(&self, presented: Option<&str>) -> bool {
        if self.tokens.is_empty() {
            return true;
        }
        match presented {
            Some(t) => self
                .tokens
                .iter()
                .any(|known| constant_time_eq(t.as_bytes(), known.as_bytes())),
            None => false,
        }
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("tokens", &format_args!("[{} redacted]", self.tokens.len()))
            .finish()
    }
}

/// The token from an `Authorization: Bearer <token>` header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

pub(crate) fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "unauthorized"})),
    )
        .into_response()
}

/// Axum middleware that requires a configured token as a Bearer header.
pub async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.tokens.is_authorized(bearer_token(request.headers())) {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "rejected request without valid token");
        unauthorized()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn empty_set_is_open() {
        let set = TokenSet::default();
        assert!(set.is_authorized(None));
        assert!(set.is_authorized(Some("anything")));
    }

    #[test]
    fn configured_set_requires_match() {
        let set = TokenSet::new(["alpha", " beta ", ""]);
        assert_eq!(set.len(), 2);
        assert!(set.is_authorized(Some("alpha")));
        assert!(set.is_authorized(Some("beta")));
        assert!(!set.is_authorized(Some("alph")));
        assert!(!set.is_authorized(Some("")));
        assert!(!set.is_authorized(None));
    }

    #[test]
    fn token_file_skips_comments_and_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# creators").unwrap();
        writeln!(file, "first").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  second  ").unwrap();

        let set = TokenSet::from_file(file.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.is_authorized(Some("second")));
        assert!(!set.is_authorized(Some("# creators")));
    }

    #[test]
    fn missing_token_file_is_an_error() {
        assert!(TokenSet::from_file(Path::new("/nonexistent/gjfy/tokens")).is_err());
    }

    #[test]
    fn merge_unions() {
        let set = TokenSet::new(["a"]).merge(&TokenSet::new(["b"]));
        assert!(set.is_authorized(Some("a")));
        assert!(set.is_authorized(Some("b")));
    }

    #[test]
    fn debug_does_not_leak_tokens() {
        let set = TokenSet::new(["supersecret"]);
        let out = format!("{set:?}");
        assert!(!out.contains("supersecret"));
        assert!(out.contains("1 redacted"));
    }

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("Authorization", HeaderValue::from_static("Bearer tok"));
        assert_eq!(bearer_token(&headers), Some("tok"));
        headers.insert("Authorization", HeaderValue::from_static("Basic tok"));
        assert_eq!(bearer_token(&headers), None);
    }
}
