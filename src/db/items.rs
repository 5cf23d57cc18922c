//! Item CRUD, filtering, prefix resolution, and links.

use rusqlite::params;
use uuid::Uuid;

use super::*;
use crate::dedup;

/// Convert a unique-index rejection into `ActiveDuplicate` carrying the id
/// of the row that won the race. Any other error passes through untouched.
pub(crate) fn remap_constraint(
    conn: &rusqlite::Connection,
    table: &'static str,
    col: &'static str,
    norm: &str,
    err: KardexError,
) -> KardexError {
    if let KardexError::Database(rusqlite::Error::SqliteFailure(inner, _)) = &err {
        if inner.code == rusqlite::ErrorCode::ConstraintViolation {
            if let Ok(Some(id)) = dedup::active_holder_on(conn, table, col, norm, None) {
                return KardexError::ActiveDuplicate { existing_id: id };
            }
        }
    }
    err
}

pub(crate) fn get_item_on(
    conn: &rusqlite::Connection,
    id: &str,
) -> Result<Option<Item>, KardexError> {
    let mut stmt = conn.prepare("SELECT * FROM items WHERE id = ?1")?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => {
            let mut item = row_to_item(row)?;
            item.tags = item_tag_names_on(conn, &item.id)?;
            Ok(Some(item))
        }
        None => Ok(None),
    }
}

/// Names of the item's active tags, sorted. Archived tags stay associated
/// but are not listed here.
pub(crate) fn item_tag_names_on(
    conn: &rusqlite::Connection,
    item_id: &str,
) -> Result<Vec<String>, KardexError> {
    let mut stmt = conn.prepare(
        "SELECT t.name FROM tags t JOIN item_tags it ON it.tag_id = t.id \
         WHERE it.item_id = ?1 AND t.deleted = 0 ORDER BY t.name_norm",
    )?;
    let names = stmt
        .query_map(params![item_id], |row| row.get(0))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(names)
}

/// Resolve tag names to rows and associate them with the item. Names are
/// deduplicated by casefold; an existing row (active or archived) is reused
/// rather than duplicated. Returns the item's active tag names afterwards.
pub(crate) fn attach_tags_on(
    conn: &rusqlite::Connection,
    item_id: &str,
    names: &[String],
    now: i64,
) -> Result<Vec<String>, KardexError> {
    let mut seen = std::collections::HashSet::new();
    for raw in names {
        let name = raw.trim();
        let norm = casefold(name);
        if !seen.insert(norm.clone()) {
            continue;
        }
        let tag_id = tags::ensure_tag_on(conn, name, &norm, now)?;
        conn.execute(
            "INSERT OR IGNORE INTO item_tags (item_id, tag_id, created_date) VALUES (?1, ?2, ?3)",
            params![item_id, tag_id, now],
        )?;
    }
    item_tag_names_on(conn, item_id)
}

pub(crate) fn find_item_by_norm_on(
    conn: &rusqlite::Connection,
    norm: &str,
    archived: bool,
) -> Result<Option<Item>, KardexError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM items WHERE title_norm = ?1 AND deleted = ?2 \
         ORDER BY archived_date DESC LIMIT 1",
    )?;
    let mut rows = stmt.query(params![norm, archived])?;
    match rows.next()? {
        Some(row) => {
            let mut item = row_to_item(row)?;
            item.tags = item_tag_names_on(conn, &item.id)?;
            Ok(Some(item))
        }
        None => Ok(None),
    }
}

impl CatalogDB {
    /// Create an item with its tag associations in one transaction.
    ///
    /// The duplicate check runs inside the same transaction as the insert.
    /// If another writer still sneaks the title in first, the partial
    /// unique index rejects the insert and the error is remapped to
    /// `ActiveDuplicate` naming the winner.
    pub fn create_item(&self, input: ItemInput) -> Result<CreateOutcome<Item>, KardexError> {
        validate_item_input(&input)?;
        let title = input.title.trim().to_string();
        let norm = casefold(&title);

        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<CreateOutcome<Item>, KardexError> {
            match dedup::title_verdict_on(&conn, &title)? {
                dedup::Verdict::ActiveDuplicate { id } => {
                    return Err(KardexError::ActiveDuplicate { existing_id: id });
                }
                dedup::Verdict::RestoreCandidate { id } => {
                    let archived = get_item_on(&conn, &id)?.ok_or_else(|| {
                        KardexError::Internal("archived duplicate vanished mid-transaction".into())
                    })?;
                    return Ok(CreateOutcome::RestoreCandidate { archived });
                }
                dedup::Verdict::Clear => {}
            }

            let now = now_ts();
            let id = Uuid::new_v4().to_string();
            let status = input.status.unwrap_or(ItemStatus::Draft);
            let actor = input.actor.clone().unwrap_or_else(|| "api".into());
            conn.execute(
                "INSERT INTO items (id, title, title_norm, content, status, deleted, \
                 created_by, updated_by, created_date, modified_date) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6, ?7, ?7)",
                params![id, title, norm, input.content, status.as_str(), actor, now],
            )?;
            if let Some(ref tag_names) = input.tags {
                attach_tags_on(&conn, &id, tag_names, now)?;
            }
            let item = get_item_on(&conn, &id)?
                .ok_or_else(|| KardexError::Internal("item vanished after insert".into()))?;
            Ok(CreateOutcome::Created(item))
        })();
        finish_tx(&conn, result).map_err(|e| remap_constraint(&conn, "items", "title_norm", &norm, e))
    }

    pub fn get_item(&self, id: &str) -> Result<Option<Item>, KardexError> {
        let conn = self.conn()?;
        get_item_on(&conn, id)
    }

    /// Active item holding this title, if any.
    pub fn find_active_item_by_title(&self, title: &str) -> Result<Option<Item>, KardexError> {
        let conn = self.conn()?;
        find_item_by_norm_on(&conn, &casefold(title), false)
    }

    /// Most recently archived item holding this title, if any.
    pub fn find_archived_item_by_title(&self, title: &str) -> Result<Option<Item>, KardexError> {
        let conn = self.conn()?;
        find_item_by_norm_on(&conn, &casefold(title), true)
    }

    /// Resolve a short id prefix to a full id. Full-length ids pass through
    /// unchecked; ambiguous prefixes are rejected rather than guessed.
    pub fn resolve_item_prefix(&self, prefix: &str) -> Result<String, KardexError> {
        if prefix.len() >= 36 {
            return Ok(prefix.to_string());
        }
        if prefix.len() < 4 {
            return Err(KardexError::Validation(
                "id prefix must be at least 4 characters".into(),
            ));
        }
        let conn = self.conn()?;
        let pattern = format!("{prefix}%");
        let mut stmt = conn.prepare("SELECT id FROM items WHERE id LIKE ?1 LIMIT 2")?;
        let ids: Vec<String> = stmt
            .query_map(params![pattern], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        match ids.as_slice() {
            [] => Err(KardexError::NotFound),
            [id] => Ok(id.clone()),
            _ => Err(KardexError::Validation(format!(
                "id prefix '{prefix}' is ambiguous"
            ))),
        }
    }

    /// Patch an item's fields. Title changes re-check active uniqueness
    /// (excluding the item itself); archived holders never block a rename.
    /// Returns `None` when the id does not exist.
    pub fn update_item(&self, id: &str, patch: ItemPatch) -> Result<Option<Item>, KardexError> {
        if let Some(ref t) = patch.title {
            validate_title(t)?;
        }
        if let Some(ref c) = patch.content {
            validate_content(c)?;
        }
        if patch.status == Some(ItemStatus::Archived) {
            return Err(KardexError::Validation(
                "use the archive operation to archive an item".into(),
            ));
        }
        if let Some(ref tags) = patch.tags {
            validate_tags(tags)?;
        }
        validate_actor(&patch.actor)?;

        let new_norm = patch.title.as_deref().map(casefold);
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<Option<Item>, KardexError> {
            let Some(current) = get_item_on(&conn, id)? else {
                return Ok(None);
            };
            if current.deleted {
                return Err(KardexError::Validation(
                    "archived items cannot be edited; restore first".into(),
                ));
            }

            let now = now_ts();
            let mut sets: Vec<String> = Vec::new();
            let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(ref title) = patch.title {
                let title = title.trim().to_string();
                let norm = casefold(&title);
                if let Some(holder) =
                    dedup::active_holder_on(&conn, "items", "title_norm", &norm, Some(id))?
                {
                    return Err(KardexError::ActiveDuplicate { existing_id: holder });
                }
                values.push(Box::new(title));
                sets.push(format!("title = ?{}", values.len()));
                values.push(Box::new(norm));
                sets.push(format!("title_norm = ?{}", values.len()));
            }
            if let Some(ref content) = patch.content {
                values.push(Box::new(content.clone()));
                sets.push(format!("content = ?{}", values.len()));
            }
            if let Some(status) = patch.status {
                values.push(Box::new(status.as_str().to_string()));
                sets.push(format!("status = ?{}", values.len()));
            }

            if !sets.is_empty() || patch.tags.is_some() {
                let actor = patch.actor.clone().unwrap_or_else(|| "api".into());
                values.push(Box::new(actor));
                sets.push(format!("updated_by = ?{}", values.len()));
                values.push(Box::new(now));
                sets.push(format!("modified_date = MAX(?{}, modified_date)", values.len()));
                values.push(Box::new(id.to_string()));
                let sql = format!(
                    "UPDATE items SET {} WHERE id = ?{}",
                    sets.join(", "),
                    values.len()
                );
                let refs: Vec<&dyn rusqlite::types::ToSql> =
                    values.iter().map(|v| v.as_ref()).collect();
                conn.execute(&sql, refs.as_slice())?;
            }

            if let Some(ref tags) = patch.tags {
                conn.execute("DELETE FROM item_tags WHERE item_id = ?1", params![id])?;
                attach_tags_on(&conn, id, tags, now)?;
            }
            get_item_on(&conn, id)
        })();
        match new_norm {
            Some(norm) => finish_tx(&conn, result)
                .map_err(|e| remap_constraint(&conn, "items", "title_norm", &norm, e)),
            None => finish_tx(&conn, result),
        }
    }

    /// Active items matching the filter, most recently modified first.
    pub fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, KardexError> {
        self.list_items_where(filter, false)
    }

    /// Archived items matching the filter, most recently archived first.
    pub fn list_archived_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, KardexError> {
        self.list_items_where(filter, true)
    }

    fn list_items_where(
        &self,
        filter: &ItemFilter,
        archived: bool,
    ) -> Result<Vec<Item>, KardexError> {
        let conn = self.conn()?;
        let limit = filter.limit.unwrap_or(50).min(100);
        let offset = filter.offset.unwrap_or(0);

        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        let mut clauses = vec![format!("deleted = {}", if archived { 1 } else { 0 })];

        if let Some(status) = filter.status {
            values.push(Box::new(status.as_str().to_string()));
            clauses.push(format!("status = ?{}", values.len()));
        }
        if let Some(ref tag) = filter.tag {
            values.push(Box::new(casefold(tag)));
            clauses.push(format!(
                "id IN (SELECT it.item_id FROM item_tags it \
                 JOIN tags t ON t.id = it.tag_id WHERE t.name_norm = ?{})",
                values.len()
            ));
        }
        if let Some(ref q) = filter.q {
            values.push(Box::new(format!("%{}%", casefold(q))));
            let idx = values.len();
            clauses.push(format!("(title_norm LIKE ?{idx} OR lower(content) LIKE ?{idx})"));
        }

        values.push(Box::new(limit as i64));
        let limit_idx = values.len();
        values.push(Box::new(offset as i64));
        let offset_idx = values.len();

        let order = if archived { "archived_date DESC" } else { "modified_date DESC" };
        let sql = format!(
            "SELECT * FROM items WHERE {} ORDER BY {} LIMIT ?{} OFFSET ?{}",
            clauses.join(" AND "),
            order,
            limit_idx,
            offset_idx
        );

        let mut stmt = conn.prepare(&sql)?;
        let refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let mut items: Vec<Item> = stmt
            .query_map(refs.as_slice(), row_to_item)?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        for item in &mut items {
            item.tags = item_tag_names_on(&conn, &item.id)?;
        }
        Ok(items)
    }

    /// Create a directed link between two items. Endpoints must exist;
    /// archived endpoints are fine since links survive archiving. Repeating
    /// an existing edge is idempotent and keeps the original date. The
    /// endpoint checks and the insert share one transaction, so an endpoint
    /// cannot be purged out from under the check.
    pub fn add_link(
        &self,
        from_id: &str,
        to_id: &str,
        relation: &str,
    ) -> Result<ItemLink, KardexError> {
        let rel = relation.trim();
        if rel.is_empty() {
            return Err(KardexError::Validation("relation must not be empty".into()));
        }
        if rel.chars().count() > MAX_RELATION_LEN {
            return Err(KardexError::Validation(format!(
                "relation too long (max {MAX_RELATION_LEN})"
            )));
        }
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<ItemLink, KardexError> {
            for id in [from_id, to_id] {
                let exists: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM items WHERE id = ?1",
                    params![id],
                    |r| r.get(0),
                )?;
                if exists == 0 {
                    return Err(KardexError::NotFound);
                }
            }
            let now = now_ts();
            conn.execute(
                "INSERT OR IGNORE INTO item_links (from_id, to_id, relation, created_date) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![from_id, to_id, rel, now],
            )?;
            let created: i64 = conn.query_row(
                "SELECT created_date FROM item_links WHERE from_id = ?1 AND to_id = ?2 AND relation = ?3",
                params![from_id, to_id, rel],
                |r| r.get(0),
            )?;
            Ok(ItemLink {
                from_id: from_id.to_string(),
                to_id: to_id.to_string(),
                relation: rel.to_string(),
                created_date: created,
            })
        })();
        finish_tx(&conn, result)
    }

    /// Remove one link edge. Returns whether anything was deleted.
    pub fn remove_link(
        &self,
        from_id: &str,
        to_id: &str,
        relation: &str,
    ) -> Result<bool, KardexError> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM item_links WHERE from_id = ?1 AND to_id = ?2 AND relation = ?3",
            params![from_id, to_id, relation.trim()],
        )?;
        Ok(n > 0)
    }

    /// All links touching an item, outgoing and incoming, oldest first.
    pub fn links_for_item(&self, id: &str) -> Result<Vec<ItemLink>, KardexError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT from_id, to_id, relation, created_date FROM item_links \
             WHERE from_id = ?1 OR to_id = ?1 ORDER BY created_date, relation",
        )?;
        let links = stmt
            .query_map(params![id], |row| {
                Ok(ItemLink {
                    from_id: row.get(0)?,
                    to_id: row.get(1)?,
                    relation: row.get(2)?,
                    created_date: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(links)
    }

    /// Catalog-wide counts. Errors degrade to zeros; this feeds health
    /// output and must not take the endpoint down with it.
    pub fn stats(&self) -> Stats {
        let mut s = Stats::default();
        let Ok(conn) = self.conn() else {
            return s;
        };
        let count = |sql: &str| -> usize {
            conn.query_row(sql, [], |r| r.get::<_, i64>(0)).unwrap_or(0) as usize
        };
        s.active_items = count("SELECT COUNT(*) FROM items WHERE deleted = 0");
        s.archived_items = count("SELECT COUNT(*) FROM items WHERE deleted = 1");
        s.draft = count("SELECT COUNT(*) FROM items WHERE deleted = 0 AND status = 'draft'");
        s.published =
            count("SELECT COUNT(*) FROM items WHERE deleted = 0 AND status = 'published'");
        s.active_tags = count("SELECT COUNT(*) FROM tags WHERE deleted = 0");
        s.archived_tags = count("SELECT COUNT(*) FROM tags WHERE deleted = 1");
        s.associations = count("SELECT COUNT(*) FROM item_tags");
        s.links = count("SELECT COUNT(*) FROM item_links");
        s
    }
}
