//! Tag CRUD and item associations.

use rusqlite::params;
use uuid::Uuid;

use super::items::{get_item_on, remap_constraint};
use super::*;
use crate::dedup;

pub(crate) fn get_tag_on(
    conn: &rusqlite::Connection,
    id: &str,
) -> Result<Option<Tag>, KardexError> {
    let mut stmt = conn.prepare("SELECT * FROM tags WHERE id = ?1")?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_tag(row)?)),
        None => Ok(None),
    }
}

/// Row holding this casefolded name, preferring an active one; renames can
/// leave several archived holders, in which case the latest wins.
pub(crate) fn find_tag_by_norm_on(
    conn: &rusqlite::Connection,
    norm: &str,
) -> Result<Option<Tag>, KardexError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM tags WHERE name_norm = ?1 \
         ORDER BY deleted ASC, archived_date DESC LIMIT 1",
    )?;
    let mut rows = stmt.query(params![norm])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_tag(row)?)),
        None => Ok(None),
    }
}

/// Find or create the tag row for a name. An existing row is reused even
/// when archived: the association stays dormant until the tag is restored,
/// and no second row ever takes the name.
pub(crate) fn ensure_tag_on(
    conn: &rusqlite::Connection,
    name: &str,
    norm: &str,
    now: i64,
) -> Result<String, KardexError> {
    if let Some(tag) = find_tag_by_norm_on(conn, norm)? {
        return Ok(tag.id);
    }
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO tags (id, name, name_norm, deleted, created_date, modified_date) \
         VALUES (?1, ?2, ?3, 0, ?4, ?4)",
        params![id, name, norm, now],
    )?;
    Ok(id)
}

impl CatalogDB {
    /// Create a tag, running the same archive-aware duplicate resolution as
    /// items: an active holder refuses, an archived holder offers restore.
    pub fn create_tag(&self, name: &str) -> Result<CreateOutcome<Tag>, KardexError> {
        validate_tag_name(name)?;
        let name = name.trim().to_string();
        let norm = casefold(&name);

        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<CreateOutcome<Tag>, KardexError> {
            match dedup::name_verdict_on(&conn, &name)? {
                dedup::Verdict::ActiveDuplicate { id } => {
                    return Err(KardexError::ActiveDuplicate { existing_id: id });
                }
                dedup::Verdict::RestoreCandidate { id } => {
                    let archived = get_tag_on(&conn, &id)?.ok_or_else(|| {
                        KardexError::Internal("archived duplicate vanished mid-transaction".into())
                    })?;
                    return Ok(CreateOutcome::RestoreCandidate { archived });
                }
                dedup::Verdict::Clear => {}
            }
            let now = now_ts();
            let id = Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO tags (id, name, name_norm, deleted, created_date, modified_date) \
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                params![id, name, norm, now],
            )?;
            let tag = get_tag_on(&conn, &id)?
                .ok_or_else(|| KardexError::Internal("tag vanished after insert".into()))?;
            Ok(CreateOutcome::Created(tag))
        })();
        finish_tx(&conn, result).map_err(|e| remap_constraint(&conn, "tags", "name_norm", &norm, e))
    }

    pub fn get_tag(&self, id: &str) -> Result<Option<Tag>, KardexError> {
        let conn = self.conn()?;
        get_tag_on(&conn, id)
    }

    pub fn find_active_tag_by_name(&self, name: &str) -> Result<Option<Tag>, KardexError> {
        let conn = self.conn()?;
        match find_tag_by_norm_on(&conn, &casefold(name))? {
            Some(tag) if !tag.deleted => Ok(Some(tag)),
            _ => Ok(None),
        }
    }

    pub fn find_archived_tag_by_name(&self, name: &str) -> Result<Option<Tag>, KardexError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM tags WHERE name_norm = ?1 AND deleted = 1 \
             ORDER BY archived_date DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![casefold(name)])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_tag(row)?)),
            None => Ok(None),
        }
    }

    /// Rename a tag, re-checking active uniqueness (excluding itself).
    /// Returns `None` when the id does not exist.
    pub fn rename_tag(&self, id: &str, new_name: &str) -> Result<Option<Tag>, KardexError> {
        validate_tag_name(new_name)?;
        let new_name = new_name.trim().to_string();
        let norm = casefold(&new_name);

        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<Option<Tag>, KardexError> {
            let Some(current) = get_tag_on(&conn, id)? else {
                return Ok(None);
            };
            if current.deleted {
                return Err(KardexError::Validation(
                    "archived tags cannot be renamed; restore first".into(),
                ));
            }
            if let Some(holder) =
                dedup::active_holder_on(&conn, "tags", "name_norm", &norm, Some(id))?
            {
                return Err(KardexError::ActiveDuplicate { existing_id: holder });
            }
            conn.execute(
                "UPDATE tags SET name = ?1, name_norm = ?2, \
                 modified_date = MAX(?3, modified_date) WHERE id = ?4",
                params![new_name, norm, now_ts(), id],
            )?;
            get_tag_on(&conn, id)
        })();
        finish_tx(&conn, result).map_err(|e| remap_constraint(&conn, "tags", "name_norm", &norm, e))
    }

    /// List tags, active by default. Active tags sort by name, archived by
    /// recency of archiving.
    pub fn list_tags(
        &self,
        archived: bool,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Tag>, KardexError> {
        let conn = self.conn()?;
        let order = if archived { "archived_date DESC" } else { "name_norm ASC" };
        let sql = format!(
            "SELECT * FROM tags WHERE deleted = ?1 ORDER BY {order} LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let tags = stmt
            .query_map(
                params![
                    archived,
                    limit.unwrap_or(50).min(100) as i64,
                    offset.unwrap_or(0) as i64
                ],
                row_to_tag,
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(tags)
    }

    /// Associate a tag with an item by name, reusing an existing tag row
    /// (active or archived) and creating one only when none holds the name.
    /// Returns the tag and whether a new association was made; the caller
    /// can tell from `tag.deleted` that the association starts dormant.
    pub fn attach_tag(&self, item_id: &str, name: &str) -> Result<(Tag, bool), KardexError> {
        validate_tag_name(name)?;
        let name = name.trim().to_string();

        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<(Tag, bool), KardexError> {
            let Some(item) = get_item_on(&conn, item_id)? else {
                return Err(KardexError::NotFound);
            };
            if item.deleted {
                return Err(KardexError::Validation(
                    "archived items cannot be tagged; restore first".into(),
                ));
            }
            let now = now_ts();
            let tag_id = ensure_tag_on(&conn, &name, &casefold(&name), now)?;
            let n = conn.execute(
                "INSERT OR IGNORE INTO item_tags (item_id, tag_id, created_date) VALUES (?1, ?2, ?3)",
                params![item_id, tag_id, now],
            )?;
            let tag = get_tag_on(&conn, &tag_id)?
                .ok_or_else(|| KardexError::Internal("tag vanished after attach".into()))?;
            Ok((tag, n > 0))
        })();
        finish_tx(&conn, result)
    }

    /// Drop the association between an item and a tag named `name`.
    /// The tag row itself stays. Returns whether an association existed.
    pub fn detach_tag(&self, item_id: &str, name: &str) -> Result<bool, KardexError> {
        let conn = self.conn()?;
        let Some(item) = get_item_on(&conn, item_id)? else {
            return Err(KardexError::NotFound);
        };
        if item.deleted {
            return Err(KardexError::Validation(
                "archived items cannot be untagged; restore first".into(),
            ));
        }
        let Some(tag) = find_tag_by_norm_on(&conn, &casefold(name))? else {
            return Ok(false);
        };
        let n = conn.execute(
            "DELETE FROM item_tags WHERE item_id = ?1 AND tag_id = ?2",
            params![item_id, tag.id],
        )?;
        Ok(n > 0)
    }

    /// Tags associated with an item. Dormant (archived) tags are included
    /// only on request.
    pub fn tags_for_item(
        &self,
        item_id: &str,
        include_archived: bool,
    ) -> Result<Vec<Tag>, KardexError> {
        let conn = self.conn()?;
        let sql = if include_archived {
            "SELECT t.* FROM tags t JOIN item_tags it ON it.tag_id = t.id \
             WHERE it.item_id = ?1 ORDER BY t.name_norm"
        } else {
            "SELECT t.* FROM tags t JOIN item_tags it ON it.tag_id = t.id \
             WHERE it.item_id = ?1 AND t.deleted = 0 ORDER BY t.name_norm"
        };
        let mut stmt = conn.prepare(sql)?;
        let tags = stmt
            .query_map(params![item_id], row_to_tag)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(tags)
    }

}
