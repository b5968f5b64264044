use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    assets, auth, html,
    store::{StoreEntryInfo, MAX_VALID_FOR_DAYS},
    AppState,
};

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "secrets": state.store.len()}))
}

// ── Create ────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateRequest {
    pub secret: String,
    #[serde(default)]
    pub max_clicks: u32,
    #[serde(default)]
    pub valid_for: u32,
    /// Alternative to a Bearer header for clients that only send a body.
    #[serde(default)]
    pub auth_token: Option<String>,
}

pub async fn create_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateRequest>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return rejected_body(rejection),
    };

    let presented = auth::bearer_token(&headers).or(body.auth_token.as_deref());
    if !state.tokens.is_authorized(presented) {
        warn!("audit: secret.create.unauthorized");
        return auth::unauthorized();
    }
    if body.valid_for > MAX_VALID_FOR_DAYS {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": format!("valid_for must not exceed {MAX_VALID_FOR_DAYS} days")})),
        )
            .into_response();
    }

    let id = state
        .store
        .create(&body.secret, body.max_clicks, body.valid_for, "");

    match state.store.info_hidden(&id, &state.endpoints) {
        Some(created) => {
            info!(
                id = %id,
                max_clicks = created.entry.max_clicks,
                valid_for = created.entry.valid_for,
                "audit: secret.create"
            );
            (StatusCode::CREATED, Json(created)).into_response()
        }
        None => {
            error!(id = %id, "secret vanished right after creation");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal server error"})),
            )
                .into_response()
        }
    }
}

fn rejected_body(rejection: JsonRejection) -> Response {
    let status = match rejection {
        JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ref other => other.status(),
    };
    (status, Json(json!({"error": rejection.body_text()}))).into_response()
}

// ── JSON API ──────────────────────────────────────────────────────────────────

pub async fn api_get_secret(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.consume(&id) {
        Some(record) => {
            info!(id = %id, clicks = record.clicks, "audit: secret.read");
            Json(StoreEntryInfo::new(&id, record, &state.endpoints)).into_response()
        }
        None => not_found_json(),
    }
}

pub async fn api_info_secret(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.info_hidden(&id, &state.endpoints) {
        Some(meta) => Json(meta).into_response(),
        None => not_found_json(),
    }
}

pub async fn api_delete_secret(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let deleted = state.store.delete(&id);
    info!(id = %id, deleted, "audit: secret.delete");
    Json(json!({"deleted": deleted})).into_response()
}

fn not_found_json() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({}))).into_response()
}

// ── HTML views ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IdQuery {
    #[serde(default)]
    pub id: String,
}

pub async fn view_secret(State(state): State<AppState>, Query(q): Query<IdQuery>) -> Response {
    match state.store.consume(&q.id) {
        Some(record) => {
            info!(id = %q.id, clicks = record.clicks, "audit: secret.view");
            let entry = StoreEntryInfo::new(&q.id, record, &state.endpoints);
            Html(html::view_page(&entry)).into_response()
        }
        None => not_found_html(),
    }
}

pub async fn view_info(State(state): State<AppState>, Query(q): Query<IdQuery>) -> Response {
    match state.store.info_hidden(&q.id, &state.endpoints) {
        Some(meta) => Html(html::info_page(&meta)).into_response(),
        None => not_found_html(),
    }
}

fn not_found_html() -> Response {
    (StatusCode::NOT_FOUND, Html(html::error_page())).into_response()
}

// ── Static ────────────────────────────────────────────────────────────────────

pub async fn favicon() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "image/x-icon")],
        assets::FAVICON.as_slice(),
    )
}

pub async fn stylesheet(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css")],
        assets::read_css(&state.css_file).await,
    )
}
