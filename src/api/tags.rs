//! Tag routes. Tags share the items' duplicate resolution and lifecycle;
//! attachment works by name so callers never juggle tag ids day to day.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::db::{CreateOutcome, Tag};
use crate::error::KardexError;
use crate::AppState;

use super::blocking;

#[derive(Debug, Deserialize)]
pub(super) struct TagBody {
    name: String,
}

/// POST /tags — same 201/409 contract as items.
pub(super) async fn create_tag(
    State(state): State<AppState>,
    Json(body): Json<TagBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), KardexError> {
    let db = state.db.clone();
    let outcome = blocking(move || db.create_tag(&body.name)).await??;
    Ok(match outcome {
        CreateOutcome::Created(tag) => (StatusCode::CREATED, Json(serde_json::json!(tag))),
        CreateOutcome::RestoreCandidate { archived } => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "an archived tag holds this name",
                "restore_candidate": archived,
            })),
        ),
    })
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct TagListQuery {
    #[serde(default)]
    archived: bool,
    limit: Option<usize>,
    offset: Option<usize>,
}

pub(super) async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<TagListQuery>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let tags = blocking(move || db.list_tags(query.archived, query.limit, query.offset)).await??;
    let count = tags.len();
    Ok(Json(serde_json::json!({ "tags": tags, "count": count })))
}

/// PATCH /tags/:id — rename.
pub(super) async fn rename_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TagBody>,
) -> Result<Json<Tag>, KardexError> {
    let db = state.db.clone();
    let tag = blocking(move || -> Result<Tag, KardexError> {
        db.rename_tag(&id, &body.name)?.ok_or(KardexError::NotFound)
    })
    .await??;
    Ok(Json(tag))
}

pub(super) async fn archive_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let tag = blocking(move || db.archive_tag(&id)).await??;
    Ok(Json(serde_json::json!({ "archived": true, "tag": tag })))
}

pub(super) async fn restore_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let tag = blocking(move || db.restore_tag(&id)).await??;
    Ok(Json(serde_json::json!({ "restored": true, "tag": tag })))
}

pub(super) async fn purge_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let purged = blocking(move || db.purge_tag(&id)).await??;
    Ok(Json(serde_json::json!({ "purged": purged })))
}

/// POST /items/:id/tags — attach by name. Reuses an existing tag row even
/// when archived; the response says so, since a dormant association is
/// invisible on the item until the tag is restored.
pub(super) async fn attach_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TagBody>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let (tag, attached) = blocking(move || -> Result<(Tag, bool), KardexError> {
        let item_id = db.resolve_item_prefix(&id)?;
        db.attach_tag(&item_id, &body.name)
    })
    .await??;
    let dormant = tag.deleted;
    let mut out = serde_json::json!({ "tag": tag, "attached": attached });
    if dormant {
        out["note"] = serde_json::json!(
            "tag is archived; the association stays dormant until the tag is restored"
        );
    }
    Ok(Json(out))
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ItemTagsQuery {
    #[serde(default)]
    include_archived: bool,
}

pub(super) async fn item_tags(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ItemTagsQuery>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let tags = blocking(move || -> Result<Vec<Tag>, KardexError> {
        let item_id = db.resolve_item_prefix(&id)?;
        db.tags_for_item(&item_id, query.include_archived)
    })
    .await??;
    let count = tags.len();
    Ok(Json(serde_json::json!({ "tags": tags, "count": count })))
}

pub(super) async fn detach_tag(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, KardexError> {
    let db = state.db.clone();
    let detached = blocking(move || -> Result<bool, KardexError> {
        let item_id = db.resolve_item_prefix(&id)?;
        db.detach_tag(&item_id, &name)
    })
    .await??;
    Ok(Json(serde_json::json!({ "detached": detached })))
}
