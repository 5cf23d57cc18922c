pub mod api;
pub mod db;
pub mod dedup;
pub mod error;
pub mod matcher;
pub mod prompts;
pub mod sanitize;
pub mod scoring;
pub mod util;

use std::sync::Arc;

pub type SharedDB = Arc<db::CatalogDB>;

#[derive(Clone)]
pub struct AppState {
    pub db: SharedDB,
    /// `None` means semantic matching is disabled and search degrades to
    /// keyword listing.
    pub scoring: Option<scoring::ScoringConfig>,
    /// `None` means the protected routes accept unauthenticated requests.
    pub api_key: Option<String>,
    pub started_at: std::time::Instant,
}
