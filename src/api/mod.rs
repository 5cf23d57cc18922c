use axum::extract::State;
use axum::http::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use subtle::ConstantTimeEq;
use tower_http::limit::RequestBodyLimitLayer;

use crate::error::KardexError;
use crate::AppState;

mod items;
mod search;
mod tags;

use items::*;
use search::*;
use tags::*;

/// Run a blocking closure on the spawn_blocking pool and map JoinError.
async fn blocking<T, F>(f: F) -> Result<T, KardexError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| KardexError::Internal(e.to_string()))
}

/// Auth middleware: checks Bearer token if KARDEX_API_KEY is configured.
async fn require_auth(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, KardexError> {
    let Some(ref expected) = state.api_key else {
        return Ok(next.run(req).await);
    };

    let unauthorized = || KardexError::Unauthorized;

    let header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(unauthorized)?;

    let token = header.strip_prefix("Bearer ").ok_or_else(unauthorized)?;

    // constant-time comparison to prevent timing attacks
    if token.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(next.run(req).await)
    } else {
        Err(unauthorized())
    }
}

pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/", get(index))
        .route("/health", get(health_only))
        .route("/stats", get(stats));

    let protected = Router::new()
        .route("/items", post(create_item).get(list_items))
        .route(
            "/items/{id}",
            get(get_item).patch(update_item).delete(archive_item),
        )
        .route("/items/{id}/restore", post(restore_item))
        .route("/items/{id}/purge", delete(purge_item))
        .route("/items/{id}/tags", post(attach_tag).get(item_tags))
        .route("/items/{id}/tags/{name}", delete(detach_tag))
        .route("/items/{id}/links", post(create_link).get(list_links))
        .route("/items/{id}/links/{to}/{relation}", delete(remove_link))
        .route("/tags", post(create_tag).get(list_tags))
        .route("/tags/{id}", patch(rename_tag).delete(archive_tag))
        .route("/tags/{id}/restore", post(restore_tag))
        .route("/tags/{id}/purge", delete(purge_tag))
        .route("/search", get(search))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    public
        .merge(protected)
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .with_state(state)
}

/// Shared health data (without endpoints) used by both `/` and `/health`.
async fn health_data(state: &AppState) -> serde_json::Value {
    let db = state.db.clone();
    let (stats, db_size_mb) = blocking(move || {
        let s = db.stats();
        let bytes = db.db_size_bytes();
        let mb = (bytes as f64 / 1048576.0 * 10.0).round() / 10.0;
        (s, mb)
    })
    .await
    .unwrap_or_default();

    serde_json::json!({
        "name": "kardex",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "db_size_mb": db_size_mb,
        "scoring_enabled": state.scoring.is_some(),
        "auth_enabled": state.api_key.is_some(),
        "stats": stats,
    })
}

/// GET / — full index with health data + endpoint list.
async fn index(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut data = health_data(&state).await;
    if let Some(obj) = data.as_object_mut() {
        obj.insert("endpoints".to_string(), serde_json::json!({
            "GET /": "index with health data + endpoint list",
            "GET /health": "health data only",
            "GET /stats": "catalog counts",
            "POST /items": "add an item (409 with restore_candidate when an archived item holds the title)",
            "GET /items": "list items (?archived=true&status=X&tag=X&q=text&limit=N&offset=N)",
            "GET /items/:id": "get an item (short id prefixes accepted)",
            "PATCH /items/:id": "update title/content/status/tags",
            "DELETE /items/:id": "archive (soft delete; associations survive)",
            "POST /items/:id/restore": "restore from the archive",
            "DELETE /items/:id/purge": "physically delete an archived item",
            "POST /items/:id/tags": "attach a tag by name (body: {name})",
            "GET /items/:id/tags": "tags on this item (?include_archived=true)",
            "DELETE /items/:id/tags/:name": "detach a tag",
            "POST /items/:id/links": "link to another item (body: {to, relation})",
            "GET /items/:id/links": "links touching this item, both directions",
            "DELETE /items/:id/links/:to/:relation": "remove a link",
            "POST /tags": "create a tag (restore offers work like items)",
            "GET /tags": "list tags (?archived=true&limit=N&offset=N)",
            "PATCH /tags/:id": "rename a tag (body: {name})",
            "DELETE /tags/:id": "archive a tag (associations turn dormant)",
            "POST /tags/:id/restore": "restore a tag",
            "DELETE /tags/:id/purge": "physically delete an archived tag",
            "GET /search?q=term": "ranked search (?threshold=0.5&limit=20)",
        }));
    }
    Json(data)
}

/// GET /health — health data only (no endpoint list).
async fn health_only(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(health_data(&state).await)
}

async fn stats(State(state): State<AppState>) -> Json<crate::db::Stats> {
    let db = state.db.clone();
    Json(blocking(move || db.stats()).await.unwrap_or_default())
}
