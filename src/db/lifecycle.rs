//! Archive lifecycle: active to archived and back, plus physical purge.
//!
//! Archiving is the only delete the public surface offers. It keeps tag
//! associations and links intact, stashes the pre-archive status, and frees
//! the title for reuse (the unique indexes only cover non-deleted rows).
//! Purge is the privileged escape hatch and only works on archived records.

use rusqlite::params;

use super::items::get_item_on;
use super::tags::get_tag_on;
use super::*;
use crate::dedup;

impl CatalogDB {
    /// Soft-delete an active item. Already-archived items are refused so a
    /// double archive cannot clobber `prior_status`.
    pub fn archive_item(&self, id: &str, actor: Option<&str>) -> Result<Item, KardexError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<Item, KardexError> {
            let Some(item) = get_item_on(&conn, id)? else {
                return Err(KardexError::NotFound);
            };
            if item.deleted {
                return Err(KardexError::Validation("item is already archived".into()));
            }
            let now = now_ts();
            conn.execute(
                "UPDATE items SET deleted = 1, prior_status = status, status = 'archived', \
                 archived_date = ?1, modified_date = MAX(?1, modified_date), updated_by = ?2 \
                 WHERE id = ?3",
                params![now, actor.unwrap_or("api"), id],
            )?;
            get_item_on(&conn, id)?
                .ok_or_else(|| KardexError::Internal("item vanished during archive".into()))
        })();
        finish_tx(&conn, result)
    }

    /// Bring an archived item back, re-checking the active-title invariant
    /// in the same transaction. If another active record took the title in
    /// the meantime, nothing changes and `RestoreConflict` names it. The
    /// pre-archive status comes back; anything unrecognized falls back to
    /// draft.
    pub fn restore_item(&self, id: &str, actor: Option<&str>) -> Result<Item, KardexError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<Item, KardexError> {
            let Some(item) = get_item_on(&conn, id)? else {
                return Err(KardexError::NotFound);
            };
            if !item.deleted {
                return Err(KardexError::Validation("item is not archived".into()));
            }
            let norm = casefold(&item.title);
            if let Some(holder) =
                dedup::active_holder_on(&conn, "items", "title_norm", &norm, Some(id))?
            {
                return Err(KardexError::RestoreConflict { conflicting_id: holder });
            }
            let now = now_ts();
            conn.execute(
                "UPDATE items SET deleted = 0, \
                 status = CASE WHEN prior_status IN ('draft', 'published') \
                          THEN prior_status ELSE 'draft' END, \
                 prior_status = NULL, archived_date = NULL, \
                 modified_date = MAX(?1, modified_date), updated_by = ?2 \
                 WHERE id = ?3",
                params![now, actor.unwrap_or("api"), id],
            )?;
            get_item_on(&conn, id)?
                .ok_or_else(|| KardexError::Internal("item vanished during restore".into()))
        })();
        finish_tx(&conn, result)
    }

    /// Soft-delete a tag. Associations stay in place and turn dormant: the
    /// tag stops appearing on items until restored.
    pub fn archive_tag(&self, id: &str) -> Result<Tag, KardexError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<Tag, KardexError> {
            let Some(tag) = get_tag_on(&conn, id)? else {
                return Err(KardexError::NotFound);
            };
            if tag.deleted {
                return Err(KardexError::Validation("tag is already archived".into()));
            }
            let now = now_ts();
            conn.execute(
                "UPDATE tags SET deleted = 1, archived_date = ?1, \
                 modified_date = MAX(?1, modified_date) WHERE id = ?2",
                params![now, id],
            )?;
            get_tag_on(&conn, id)?
                .ok_or_else(|| KardexError::Internal("tag vanished during archive".into()))
        })();
        finish_tx(&conn, result)
    }

    /// Restore an archived tag, re-checking that no active tag took the
    /// name while it was away.
    pub fn restore_tag(&self, id: &str) -> Result<Tag, KardexError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<Tag, KardexError> {
            let Some(tag) = get_tag_on(&conn, id)? else {
                return Err(KardexError::NotFound);
            };
            if !tag.deleted {
                return Err(KardexError::Validation("tag is not archived".into()));
            }
            let norm = casefold(&tag.name);
            if let Some(holder) =
                dedup::active_holder_on(&conn, "tags", "name_norm", &norm, Some(id))?
            {
                return Err(KardexError::RestoreConflict { conflicting_id: holder });
            }
            let now = now_ts();
            conn.execute(
                "UPDATE tags SET deleted = 0, archived_date = NULL, \
                 modified_date = MAX(?1, modified_date) WHERE id = ?2",
                params![now, id],
            )?;
            get_tag_on(&conn, id)?
                .ok_or_else(|| KardexError::Internal("tag vanished during restore".into()))
        })();
        finish_tx(&conn, result)
    }

    /// Physically delete an archived item with its associations and links.
    /// Active items are refused: archive first, purge second. Returns
    /// whether a row was deleted.
    pub fn purge_item(&self, id: &str) -> Result<bool, KardexError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<bool, KardexError> {
            let Some(item) = get_item_on(&conn, id)? else {
                return Ok(false);
            };
            if !item.deleted {
                return Err(KardexError::Validation(
                    "only archived items can be purged".into(),
                ));
            }
            conn.execute("DELETE FROM item_tags WHERE item_id = ?1", params![id])?;
            conn.execute(
                "DELETE FROM item_links WHERE from_id = ?1 OR to_id = ?1",
                params![id],
            )?;
            let n = conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })();
        finish_tx(&conn, result)
    }

    /// Physically delete an archived tag and its associations.
    pub fn purge_tag(&self, id: &str) -> Result<bool, KardexError> {
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<bool, KardexError> {
            let Some(tag) = get_tag_on(&conn, id)? else {
                return Ok(false);
            };
            if !tag.deleted {
                return Err(KardexError::Validation(
                    "only archived tags can be purged".into(),
                ));
            }
            conn.execute("DELETE FROM item_tags WHERE tag_id = ?1", params![id])?;
            let n = conn.execute("DELETE FROM tags WHERE id = ?1", params![id])?;
            Ok(n > 0)
        })();
        finish_tx(&conn, result)
    }
}
