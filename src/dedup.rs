//! Duplicate detection over the catalog: exact, casefolded, archive-aware.
//!
//! One verdict shape serves both items and tags. There is deliberately no
//! fuzzy matching here; approximate relevance belongs to the semantic match
//! engine, and a "duplicate" must mean the same thing every time it is
//! computed.

use rusqlite::Connection;

use crate::db::CatalogDB;
use crate::error::KardexError;
use crate::util::casefold;

/// What a proposed title or name collides with, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// No record, active or archived, holds the name.
    Clear,
    /// An active record holds it; creation must be refused.
    ActiveDuplicate { id: String },
    /// Only archived records hold it; the caller may restore one instead.
    RestoreCandidate { id: String },
}

/// Id of the active row holding `norm` in `table.col`, excluding `exclude`
/// (the record being edited or restored, which may keep its own name).
pub(crate) fn active_holder_on(
    conn: &Connection,
    table: &str,
    col: &str,
    norm: &str,
    exclude: Option<&str>,
) -> Result<Option<String>, KardexError> {
    let sql = match exclude {
        Some(_) => {
            format!("SELECT id FROM {table} WHERE {col} = ?1 AND deleted = 0 AND id != ?2 LIMIT 1")
        }
        None => format!("SELECT id FROM {table} WHERE {col} = ?1 AND deleted = 0 LIMIT 1"),
    };
    let found = match exclude {
        Some(ex) => conn.query_row(&sql, rusqlite::params![norm, ex], |r| r.get(0)),
        None => conn.query_row(&sql, rusqlite::params![norm], |r| r.get(0)),
    };
    match found {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Most recently archived holder of `norm`, if any. Renames can leave
/// several archived rows with the same name; the latest one gets the
/// restore offer.
fn archived_holder_on(
    conn: &Connection,
    table: &str,
    col: &str,
    norm: &str,
) -> Result<Option<String>, KardexError> {
    let sql = format!(
        "SELECT id FROM {table} WHERE {col} = ?1 AND deleted = 1 ORDER BY archived_date DESC LIMIT 1"
    );
    match conn.query_row(&sql, rusqlite::params![norm], |r| r.get(0)) {
        Ok(id) => Ok(Some(id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn verdict_on(
    conn: &Connection,
    table: &str,
    col: &str,
    raw: &str,
) -> Result<Verdict, KardexError> {
    let norm = casefold(raw);
    if let Some(id) = active_holder_on(conn, table, col, &norm, None)? {
        return Ok(Verdict::ActiveDuplicate { id });
    }
    if let Some(id) = archived_holder_on(conn, table, col, &norm)? {
        return Ok(Verdict::RestoreCandidate { id });
    }
    Ok(Verdict::Clear)
}

pub(crate) fn title_verdict_on(conn: &Connection, title: &str) -> Result<Verdict, KardexError> {
    verdict_on(conn, "items", "title_norm", title)
}

pub(crate) fn name_verdict_on(conn: &Connection, name: &str) -> Result<Verdict, KardexError> {
    verdict_on(conn, "tags", "name_norm", name)
}

impl CatalogDB {
    /// Dry-run duplicate check for a proposed item title. Write paths run
    /// the same check inside their own transaction, so this is advisory.
    pub fn title_verdict(&self, title: &str) -> Result<Verdict, KardexError> {
        let conn = self.conn()?;
        title_verdict_on(&conn, title)
    }

    /// Dry-run duplicate check for a proposed tag name.
    pub fn name_verdict(&self, name: &str) -> Result<Verdict, KardexError> {
        let conn = self.conn()?;
        name_verdict_on(&conn, name)
    }
}
