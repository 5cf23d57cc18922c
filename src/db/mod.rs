//! SQLite-backed catalog storage.
//!
//! Items and tags carry explicit casefolded columns (`title_norm`,
//! `name_norm`) maintained by code, with partial unique indexes over the
//! non-deleted rows. The store is therefore the final arbiter of the
//! uniqueness invariant under concurrent writes, without depending on any
//! collation behavior.

mod items;
mod lifecycle;
mod tags;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::{Deserialize, Serialize};

use crate::error::KardexError;
use crate::util::casefold;

/// Set busy_timeout on every connection handed out by the pool.
/// Prevents SQLITE_BUSY under concurrent write pressure.
#[derive(Debug)]
struct BusyTimeoutCustomizer;
impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for BusyTimeoutCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(())
    }
}

type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

pub(crate) const MAX_TITLE_LEN: usize = 200;
pub(crate) const MAX_CONTENT_LEN: usize = 16_384;
pub(crate) const MAX_TAGS: usize = 20;
pub(crate) const MAX_TAG_LEN: usize = 48;
pub(crate) const MAX_RELATION_LEN: usize = 48;
pub(crate) const MAX_ACTOR_LEN: usize = 64;

/// Lifecycle status of an item. The `deleted` flag on the row is the
/// authoritative visibility switch; status is informational and tracks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Draft,
    Published,
    Archived,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Draft => "draft",
            ItemStatus::Published => "published",
            ItemStatus::Archived => "archived",
        }
    }
}

impl std::str::FromStr for ItemStatus {
    type Err = KardexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ItemStatus::Draft),
            "published" => Ok(ItemStatus::Published),
            "archived" => Ok(ItemStatus::Archived),
            other => Err(KardexError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub content: String,
    pub status: ItemStatus,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_date: Option<i64>,
    pub created_by: String,
    pub updated_by: String,
    pub created_date: i64,
    pub modified_date: i64,
    /// Names of active tags attached to this item.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_date: Option<i64>,
    pub created_date: i64,
    pub modified_date: i64,
}

/// Directed relationship between two items. No cycle constraint is imposed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemLink {
    pub from_id: String,
    pub to_id: String,
    pub relation: String,
    pub created_date: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub status: Option<ItemStatus>,
    pub tags: Option<Vec<String>>,
    /// Who is writing. Defaults to "api".
    pub actor: Option<String>,
}

impl ItemInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn content(mut self, c: impl Into<String>) -> Self {
        self.content = c.into();
        self
    }

    pub fn status(mut self, s: ItemStatus) -> Self {
        self.status = Some(s);
        self
    }

    pub fn tags(mut self, t: Vec<String>) -> Self {
        self.tags = Some(t);
        self
    }

    pub fn actor(mut self, a: impl Into<String>) -> Self {
        self.actor = Some(a.into());
        self
    }
}

/// Partial update for an item. `None` fields are left untouched; a `tags`
/// list replaces the existing associations wholesale.
#[derive(Debug, Default, Deserialize)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<ItemStatus>,
    pub tags: Option<Vec<String>>,
    pub actor: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ItemFilter {
    pub status: Option<ItemStatus>,
    /// Only items carrying this tag (case-insensitive).
    pub tag: Option<String>,
    /// Case-insensitive substring match over title and content.
    pub q: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// What a create produced. `RestoreCandidate` is a decision for the caller,
/// not an error: an archived record already holds the name and may be
/// restored instead of duplicated; the engine never restores on its own.
#[derive(Debug)]
pub enum CreateOutcome<T> {
    Created(T),
    RestoreCandidate { archived: T },
}

#[derive(Debug, Default, Serialize)]
pub struct Stats {
    pub active_items: usize,
    pub archived_items: usize,
    pub draft: usize,
    pub published: usize,
    pub active_tags: usize,
    pub archived_tags: usize,
    pub associations: usize,
    pub links: usize,
}

pub(crate) fn validate_title(title: &str) -> Result<(), KardexError> {
    let t = title.trim();
    if t.is_empty() {
        return Err(KardexError::EmptyTitle);
    }
    if t.chars().count() > MAX_TITLE_LEN {
        return Err(KardexError::TitleTooLong);
    }
    Ok(())
}

pub(crate) fn validate_content(content: &str) -> Result<(), KardexError> {
    if content.chars().count() > MAX_CONTENT_LEN {
        return Err(KardexError::ContentTooLong);
    }
    Ok(())
}

pub(crate) fn validate_tag_name(name: &str) -> Result<(), KardexError> {
    let n = name.trim();
    if n.is_empty() {
        return Err(KardexError::Validation("tag name must not be empty".into()));
    }
    if n.chars().count() > MAX_TAG_LEN {
        return Err(KardexError::Validation(format!(
            "tag name too long (max {MAX_TAG_LEN})"
        )));
    }
    Ok(())
}

pub(crate) fn validate_tags(tags: &[String]) -> Result<(), KardexError> {
    if tags.len() > MAX_TAGS {
        return Err(KardexError::Validation(format!("too many tags (max {MAX_TAGS})")));
    }
    for t in tags {
        validate_tag_name(t)?;
    }
    Ok(())
}

pub(crate) fn validate_actor(actor: &Option<String>) -> Result<(), KardexError> {
    if let Some(a) = actor {
        if a.chars().count() > MAX_ACTOR_LEN {
            return Err(KardexError::Validation("actor too long".into()));
        }
    }
    Ok(())
}

fn validate_item_input(input: &ItemInput) -> Result<(), KardexError> {
    validate_title(&input.title)?;
    validate_content(&input.content)?;
    if input.status == Some(ItemStatus::Archived) {
        return Err(KardexError::Validation(
            "new items cannot be created as archived".into(),
        ));
    }
    if let Some(ref tags) = input.tags {
        validate_tags(tags)?;
    }
    validate_actor(&input.actor)
}

/// Current time as whole Unix seconds (UTC). Stored in 64-bit columns, so
/// there is no wraparound concern; update paths take `MAX(now, old)` so
/// `modified_date` never moves backwards even if the clock does.
pub fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs() as i64
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    title_norm TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'draft',
    deleted INTEGER NOT NULL DEFAULT 0,
    archived_date INTEGER,
    prior_status TEXT,
    created_by TEXT NOT NULL DEFAULT 'api',
    updated_by TEXT NOT NULL DEFAULT 'api',
    created_date INTEGER NOT NULL,
    modified_date INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_items_title_active ON items(title_norm) WHERE deleted = 0;
CREATE INDEX IF NOT EXISTS idx_items_deleted ON items(deleted);
CREATE INDEX IF NOT EXISTS idx_items_status ON items(status);

CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    name_norm TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    archived_date INTEGER,
    created_date INTEGER NOT NULL,
    modified_date INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_tags_name_active ON tags(name_norm) WHERE deleted = 0;

CREATE TABLE IF NOT EXISTS item_tags (
    item_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    created_date INTEGER NOT NULL,
    PRIMARY KEY (item_id, tag_id)
);
CREATE INDEX IF NOT EXISTS idx_item_tags_tag ON item_tags(tag_id);

CREATE TABLE IF NOT EXISTS item_links (
    from_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    to_id TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    relation TEXT NOT NULL,
    created_date INTEGER NOT NULL,
    PRIMARY KEY (from_id, to_id, relation)
);
CREATE INDEX IF NOT EXISTS idx_item_links_to ON item_links(to_id);
"#;

/// SQLite-backed catalog store.
pub struct CatalogDB {
    pool: Pool<SqliteConnectionManager>,
}

impl CatalogDB {
    pub(crate) fn conn(&self) -> Result<PooledConn, KardexError> {
        self.pool.get().map_err(|e| KardexError::Internal(format!("pool: {e}")))
    }

    /// Open (or create) a database at the given path.
    /// Pool size defaults to 8 (1 writer + 7 readers in WAL mode).
    pub fn open(path: &str) -> Result<Self, KardexError> {
        let pool_size = if path == ":memory:" { 2 } else { 8 };
        let manager = if path == ":memory:" {
            // Shared cache so all pool connections see the same in-memory DB.
            // Each open gets a unique name to avoid cross-test pollution.
            let name = uuid::Uuid::new_v4().to_string();
            SqliteConnectionManager::file(format!("file:{name}?mode=memory&cache=shared"))
        } else {
            SqliteConnectionManager::file(path)
        };
        let pool = Pool::builder()
            .max_size(pool_size)
            .connection_customizer(Box::new(BusyTimeoutCustomizer))
            .build(manager)
            .map_err(|e| KardexError::Internal(format!("pool: {e}")))?;

        let conn = pool.get().map_err(|e| KardexError::Internal(e.to_string()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        // prior_status arrived after first release; older files need the column
        if conn.prepare("SELECT prior_status FROM items LIMIT 0").is_err() {
            conn.execute("ALTER TABLE items ADD COLUMN prior_status TEXT", [])?;
        }
        drop(conn);
        Ok(Self { pool })
    }

    /// Database file size in bytes (via SQLite pragma).
    pub fn db_size_bytes(&self) -> i64 {
        self.conn()
            .and_then(|c| {
                c.query_row(
                    "SELECT page_count * page_size FROM pragma_page_count, pragma_page_size",
                    [],
                    |r| r.get(0),
                )
                .map_err(|e| KardexError::Internal(e.to_string()))
            })
            .unwrap_or(0)
    }
}

/// Commit on success, roll back on error. The rollback result is ignored:
/// the original error is what the caller needs to see.
pub(crate) fn finish_tx<T>(
    conn: &rusqlite::Connection,
    result: Result<T, KardexError>,
) -> Result<T, KardexError> {
    match result {
        Ok(v) => {
            conn.execute_batch("COMMIT")?;
            Ok(v)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

pub(crate) fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
    let status_str: String = row.get("status")?;
    let deleted: i64 = row.get("deleted")?;
    Ok(Item {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        status: status_str.parse().unwrap_or(ItemStatus::Draft),
        deleted: deleted != 0,
        archived_date: row.get("archived_date")?,
        created_by: row.get("created_by")?,
        updated_by: row.get("updated_by")?,
        created_date: row.get("created_date")?,
        modified_date: row.get("modified_date")?,
        tags: Vec::new(),
    })
}

pub(crate) fn row_to_tag(row: &rusqlite::Row) -> rusqlite::Result<Tag> {
    let deleted: i64 = row.get("deleted")?;
    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
        deleted: deleted != 0,
        archived_date: row.get("archived_date")?,
        created_date: row.get("created_date")?,
        modified_date: row.get("modified_date")?,
    })
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn status_round_trip() {
        for s in [ItemStatus::Draft, ItemStatus::Published, ItemStatus::Archived] {
            assert_eq!(s.as_str().parse::<ItemStatus>().unwrap(), s);
        }
        assert!("frozen".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn title_bounds() {
        assert!(validate_title("ok").is_ok());
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN + 1)).is_err());
        assert!(validate_title(&"x".repeat(MAX_TITLE_LEN)).is_ok());
    }

    #[test]
    fn tag_name_bounds() {
        assert!(validate_tag_name("rust").is_ok());
        assert!(validate_tag_name(" ").is_err());
        assert!(validate_tag_name(&"t".repeat(MAX_TAG_LEN + 1)).is_err());
    }

    #[test]
    fn archived_not_creatable() {
        let input = ItemInput::new("t").status(ItemStatus::Archived);
        assert!(validate_item_input(&input).is_err());
    }

    #[test]
    fn too_many_tags_rejected() {
        let tags: Vec<String> = (0..=MAX_TAGS).map(|i| format!("t{i}")).collect();
        assert!(validate_tags(&tags).is_err());
    }
}
