use axum::http::StatusCode;
use axum::Json;

#[derive(Debug, thiserror::Error)]
pub enum KardexError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("title exceeds maximum length")]
    TitleTooLong,

    #[error("content exceeds maximum length")]
    ContentTooLong,

    #[error("invalid status: {0} (expected draft, published, or archived)")]
    InvalidStatus(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error("an active record with this title already exists")]
    ActiveDuplicate { existing_id: String },

    #[error("restore blocked: an active record now holds this title")]
    RestoreConflict { conflicting_id: String },

    #[error("scoring backend error: {0}")]
    ScoringBackend(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl KardexError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ActiveDuplicate { .. } | Self::RestoreConflict { .. } => StatusCode::CONFLICT,
            Self::ScoringBackend(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl axum::response::IntoResponse for KardexError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        // Conflict bodies carry the id of the record that holds the name so
        // callers can offer a concrete follow-up (open it, restore, rename).
        let body = match &self {
            Self::ActiveDuplicate { existing_id } => serde_json::json!({
                "error": self.to_string(),
                "existing_id": existing_id,
            }),
            Self::RestoreConflict { conflicting_id } => serde_json::json!({
                "error": self.to_string(),
                "conflicting_id": conflicting_id,
            }),
            _ => serde_json::json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
