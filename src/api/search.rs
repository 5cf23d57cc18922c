//! Ranked search over active items.
//!
//! With scoring configured the route gathers a candidate pool (keyword hits
//! first, backfilled with recent items), hands it to the match engine, and
//! labels the response `semantic`. Without scoring it degrades to a plain
//! keyword listing labelled `keyword`, so callers always know whether a
//! model was involved.

use std::collections::HashSet;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::db::{Item, ItemFilter};
use crate::error::KardexError;
use crate::matcher::{self, Candidate};
use crate::AppState;

use super::blocking;

/// Score cutoff when the caller doesn't pass one.
const DEFAULT_THRESHOLD: f64 = 0.5;
/// Active items fed to the scoring service per query.
const CANDIDATE_POOL: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub(super) struct SearchQuery {
    #[serde(default)]
    q: String,
    threshold: Option<f64>,
    limit: Option<usize>,
}

pub(super) async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, KardexError> {
    if query.q.trim().is_empty() {
        return Err(KardexError::Validation("query must not be empty".into()));
    }
    let limit = query.limit.unwrap_or(20).min(100);
    let threshold = query.threshold.unwrap_or(DEFAULT_THRESHOLD);

    if state.scoring.is_none() {
        let db = state.db.clone();
        let q = query.q.clone();
        let items = blocking(move || {
            db.list_items(&ItemFilter {
                q: Some(q),
                limit: Some(limit),
                ..Default::default()
            })
        })
        .await??;
        let count = items.len();
        return Ok(Json(serde_json::json!({
            "mode": "keyword",
            "query": query.q,
            "results": items,
            "count": count,
        })));
    }

    // Candidate pool: keyword hits first so obviously relevant items are
    // always in front of the model, then recent items up to the cap.
    let db = state.db.clone();
    let q = query.q.clone();
    let pool = blocking(move || -> Result<Vec<Item>, KardexError> {
        let mut pool = db.list_items(&ItemFilter {
            q: Some(q),
            limit: Some(CANDIDATE_POOL),
            ..Default::default()
        })?;
        if pool.len() < CANDIDATE_POOL {
            let have: HashSet<String> = pool.iter().map(|i| i.id.clone()).collect();
            let recent = db.list_items(&ItemFilter {
                limit: Some(CANDIDATE_POOL),
                ..Default::default()
            })?;
            pool.extend(
                recent
                    .into_iter()
                    .filter(|i| !have.contains(&i.id))
                    .take(CANDIDATE_POOL - have.len()),
            );
        }
        Ok(pool)
    })
    .await??;

    let candidates: Vec<Candidate> = pool.into_iter().map(Candidate::Item).collect();
    let matches = matcher::rank(state.scoring.as_ref(), &query.q, &candidates, threshold).await;
    let results: Vec<_> = matches.into_iter().take(limit).collect();
    let count = results.len();
    Ok(Json(serde_json::json!({
        "mode": "semantic",
        "query": query.q,
        "threshold": threshold,
        "results": results,
        "count": count,
    })))
}
