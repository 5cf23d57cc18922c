//! Semantic match engine: one scoring call, hardened response handling.
//!
//! The scoring service returns free-form text that probably contains a JSON
//! object. Everything here treats that response as untrusted: decorated JSON
//! gets unwrapped, entries are validated one by one, and every failure
//! degrades to "no matches" with a log line instead of an error. The only
//! hard gate is configuration: without a `ScoringConfig` no call is made at
//! all.

use serde::Serialize;
use tracing::{debug, warn};

use crate::db::{Item, Tag};
use crate::sanitize;
use crate::scoring::{self, ScoringConfig};
use crate::util::truncate_chars;

/// Cap on candidate display text in the prompt. Long content wastes tokens
/// without improving scores.
const DISPLAY_MAX_CHARS: usize = 200;

/// Anything the engine can rank: catalog items, tags, or free text.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Candidate {
    Item(Item),
    Tag(Tag),
    Text(String),
}

impl Candidate {
    /// Text shown to the scoring service for this candidate.
    pub fn display(&self) -> String {
        match self {
            Candidate::Item(item) => {
                if item.content.is_empty() {
                    item.title.clone()
                } else {
                    format!(
                        "{}: {}",
                        item.title,
                        truncate_chars(&item.content, DISPLAY_MAX_CHARS)
                    )
                }
            }
            Candidate::Tag(tag) => tag.name.clone(),
            Candidate::Text(text) => truncate_chars(text, DISPLAY_MAX_CHARS),
        }
    }
}

/// A candidate that survived scoring and threshold filtering.
#[derive(Debug, Clone, Serialize)]
pub struct RankedMatch {
    /// Position in the candidate slice passed to `rank`.
    pub index: usize,
    pub candidate: Candidate,
    pub score: f64,
    pub reasoning: String,
}

/// One validated entry from the scoring response.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub index: usize,
    pub score: f64,
    pub reasoning: String,
}

/// Outcome of parsing a scoring response. `Malformed` carries the reason
/// for the log line; it is never surfaced as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringOutcome {
    Matches(Vec<ScoredEntry>),
    Malformed(String),
}

/// Validate a raw scoring response against the candidate count.
///
/// Per-entry problems (missing or out-of-range index, score outside [0,1])
/// drop just that entry; structural problems (no JSON object, no `matches`
/// array) make the whole response `Malformed`. Duplicate indices keep the
/// first entry. A missing `reasoning` defaults to "".
pub fn parse_scoring_response(raw: &str, candidate_count: usize) -> ScoringOutcome {
    let span = match sanitize::extract_json_object(raw) {
        Ok(s) => s,
        Err(_) => return ScoringOutcome::Malformed("no JSON object in response".into()),
    };
    let value: serde_json::Value = match serde_json::from_str(span) {
        Ok(v) => v,
        Err(e) => return ScoringOutcome::Malformed(format!("invalid JSON: {e}")),
    };
    let Some(entries) = value.get("matches").and_then(|m| m.as_array()) else {
        return ScoringOutcome::Malformed("missing 'matches' array".into());
    };

    let mut out: Vec<ScoredEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(raw_index) = entry.get("index").and_then(serde_json::Value::as_i64) else {
            warn!(entry = %entry, "scoring entry has no integer index, dropped");
            continue;
        };
        if raw_index < 0 || raw_index as usize >= candidate_count {
            warn!(
                index = raw_index,
                candidates = candidate_count,
                "scoring index out of range, dropped"
            );
            continue;
        }
        let index = raw_index as usize;
        let Some(score) = entry.get("score").and_then(serde_json::Value::as_f64) else {
            warn!(index, "scoring entry has no numeric score, dropped");
            continue;
        };
        if !(0.0..=1.0).contains(&score) {
            warn!(index, score, "score outside [0,1], dropped");
            continue;
        }
        if out.iter().any(|e| e.index == index) {
            debug!(index, "duplicate scoring index, first entry kept");
            continue;
        }
        let reasoning = entry
            .get("reasoning")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("")
            .to_string();
        out.push(ScoredEntry { index, score, reasoning });
    }
    ScoringOutcome::Matches(out)
}

/// The user message: query first, then the 0-indexed candidate list.
fn rank_prompt(query: &str, candidates: &[Candidate]) -> String {
    use std::fmt::Write;
    let mut numbered = String::new();
    for (i, c) in candidates.iter().enumerate() {
        let _ = writeln!(numbered, "{}. {}", i, c.display());
    }
    format!("Query: {query}\n\nCandidates:\n{numbered}")
}

/// Threshold-filter, sort by score descending (ties by index), attach the
/// candidates back. Entries are pre-validated so indexing cannot slip.
fn rank_entries(
    entries: Vec<ScoredEntry>,
    candidates: &[Candidate],
    threshold: f64,
) -> Vec<RankedMatch> {
    let mut kept: Vec<ScoredEntry> =
        entries.into_iter().filter(|e| e.score >= threshold).collect();
    kept.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
    kept.into_iter()
        .map(|e| RankedMatch {
            index: e.index,
            candidate: candidates[e.index].clone(),
            score: e.score,
            reasoning: e.reasoning,
        })
        .collect()
}

/// Rank candidates against a query, keeping scores at or above `threshold`.
///
/// Exactly one scoring call per invocation, no retries. A missing config,
/// an empty query or candidate set, a transport failure, and a malformed
/// response all produce an empty list; only the log line differs. Callers
/// can always tell "nothing matched" apart from "matching is off" by
/// checking the config themselves.
pub async fn rank(
    scoring: Option<&ScoringConfig>,
    query: &str,
    candidates: &[Candidate],
    threshold: f64,
) -> Vec<RankedMatch> {
    let Some(cfg) = scoring else {
        debug!("semantic matching disabled, returning no matches");
        return vec![];
    };
    if query.trim().is_empty() || candidates.is_empty() {
        return vec![];
    }
    let threshold = if threshold.is_finite() { threshold.clamp(0.0, 1.0) } else { 0.0 };

    let user = rank_prompt(query, candidates);
    let raw = match scoring::score_text(cfg, crate::prompts::RANK_SYSTEM, &user).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "scoring call failed, returning no matches");
            return vec![];
        }
    };

    match parse_scoring_response(&raw, candidates.len()) {
        ScoringOutcome::Matches(entries) => rank_entries(entries, candidates, threshold),
        ScoringOutcome::Malformed(reason) => {
            warn!(reason = %reason, "malformed scoring response, returning no matches");
            vec![]
        }
    }
}
