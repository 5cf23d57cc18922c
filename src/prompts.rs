//! Centralised prompt texts.
//!
//! Every prompt sent to the scoring service lives here so it can be audited
//! and tuned in one place. The rest of the codebase imports from
//! `crate::prompts`.

// ---------------------------------------------------------------------------
// matcher.rs — rank
// ---------------------------------------------------------------------------

pub const RANK_SYSTEM: &str = r#"You score catalog entries by semantic relevance to a search query.

The user message contains the query and a numbered candidate list. Judge each candidate against the INTENT of the query, not just shared words:
- "postgres tuning" should match "database performance notes" even with zero word overlap
- a candidate that only mentions the topic in passing scores low
- an unrelated candidate is OMITTED from the answer, never given a courtesy score

Respond with EXACTLY one JSON object and nothing else:
{"matches": [{"index": <candidate number>, "score": <0.0-1.0>, "reasoning": "<one short sentence>"}]}

Rules:
- "index" is the candidate's number from the list (counting starts at 0)
- "score" is your relevance estimate between 0.0 and 1.0
- order does not matter; the caller sorts by score
- no markdown fences, no commentary, no apologies"#;
