//! Item routes: create with duplicate resolution, read, update, lifecycle,
//! and links.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::db::{CreateOutcome, Item, ItemFilter, ItemInput, ItemPatch, ItemStatus};
use crate::error::KardexError;
use crate::AppState;

use super::blocking;

/// POST /items — 201 on create, 409 with a `restore_candidate` body when an
/// archived item already holds the title. The offer changes nothing; the
/// caller decides whether to restore.
pub(super) async fn create_item(
    State(state): State<AppState>,
    Json(input): Json<ItemInput>,
) -> Result<(StatusCode, Json<serde_json::Value>), KardexError> {
    let db = state.db.clone();
    let outcome = blocking(move || db.create_item(input)).await??;
    Ok(match outcome {
        CreateOutcome::Created(item) => (StatusCode::CREATED, Json(serde_json::json!(item))),
        CreateOutcome::RestoreCandidate { archived } => {
            let hint = format!(
                "POST /items/{}/restore to bring it back, or pick another title",
                &archived.id[..archived.id.len().min(8)]
            );
            (
                StatusCode::CONFLICT,
                Json(serde_json::json!({
                    "error": "an archived item holds this title",
                    "restore_candidate": archived,
                    "hint": hint,
                })),
            )
        }
    })
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListQuery {
    #[serde(default)]
    archived: bool,
    status: Option<String>,
    tag: Option<String>,
    q: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

pub(super) async fn list_items(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let status = match query.status.as_deref() {
        Some(s) => Some(s.parse::<ItemStatus>()?),
        None => None,
    };
    let filter = ItemFilter {
        status,
        tag: query.tag,
        q: query.q,
        limit: query.limit,
        offset: query.offset,
    };
    let db = state.db.clone();
    let archived = query.archived;
    let items = blocking(move || {
        if archived {
            db.list_archived_items(&filter)
        } else {
            db.list_items(&filter)
        }
    })
    .await??;
    let count = items.len();
    Ok(Json(serde_json::json!({ "items": items, "count": count })))
}

pub(super) async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Item>, KardexError> {
    let db = state.db.clone();
    let item = blocking(move || -> Result<Item, KardexError> {
        let full_id = db.resolve_item_prefix(&id)?;
        db.get_item(&full_id)?.ok_or(KardexError::NotFound)
    })
    .await??;
    Ok(Json(item))
}

pub(super) async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ItemPatch>,
) -> Result<Json<Item>, KardexError> {
    let db = state.db.clone();
    let item = blocking(move || -> Result<Item, KardexError> {
        let full_id = db.resolve_item_prefix(&id)?;
        db.update_item(&full_id, patch)?.ok_or(KardexError::NotFound)
    })
    .await??;
    Ok(Json(item))
}

/// DELETE /items/:id — archive, never a physical delete.
pub(super) async fn archive_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let item = blocking(move || -> Result<Item, KardexError> {
        let full_id = db.resolve_item_prefix(&id)?;
        db.archive_item(&full_id, None)
    })
    .await??;
    Ok(Json(serde_json::json!({ "archived": true, "item": item })))
}

pub(super) async fn restore_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let item = blocking(move || -> Result<Item, KardexError> {
        let full_id = db.resolve_item_prefix(&id)?;
        db.restore_item(&full_id, None)
    })
    .await??;
    Ok(Json(serde_json::json!({ "restored": true, "item": item })))
}

pub(super) async fn purge_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let purged = blocking(move || -> Result<bool, KardexError> {
        let full_id = db.resolve_item_prefix(&id)?;
        db.purge_item(&full_id)
    })
    .await??;
    Ok(Json(serde_json::json!({ "purged": purged })))
}

#[derive(Debug, Deserialize)]
pub(super) struct LinkBody {
    to: String,
    relation: String,
}

pub(super) async fn create_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<LinkBody>,
) -> Result<(StatusCode, Json<crate::db::ItemLink>), KardexError> {
    let db = state.db.clone();
    let link = blocking(move || -> Result<crate::db::ItemLink, KardexError> {
        let from = db.resolve_item_prefix(&id)?;
        let to = db.resolve_item_prefix(&body.to)?;
        db.add_link(&from, &to, &body.relation)
    })
    .await??;
    Ok((StatusCode::CREATED, Json(link)))
}

pub(super) async fn list_links(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let links = blocking(move || -> Result<Vec<crate::db::ItemLink>, KardexError> {
        let full_id = db.resolve_item_prefix(&id)?;
        db.links_for_item(&full_id)
    })
    .await??;
    let count = links.len();
    Ok(Json(serde_json::json!({ "links": links, "count": count })))
}

pub(super) async fn remove_link(
    State(state): State<AppState>,
    Path((id, to, relation)): Path<(String, String, String)>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let removed = blocking(move || -> Result<bool, KardexError> {
        let from = db.resolve_item_prefix(&id)?;
        let to = db.resolve_item_prefix(&to)?;
        db.remove_link(&from, &to, &relation)
    })
    .await??;
    Ok(Json(serde_json::json!({ "removed": removed })))
}
