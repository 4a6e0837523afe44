use anyhow::{Context, Result};
use portal_common::{NoteEntityType, NoteType};
use rusqlite::{OptionalExtension, Row, params};

use super::{PortalDb, enum_col, non_empty, now_ts};
use crate::errors::PortalError;
use crate::portal::models::{Author, Note, NoteDraft};

const NOTE_COLUMNS: &str = "id, entity_id, entity_type, note_type, title, content, is_internal, \
     is_pinned, is_current, version_number, replaces_note_id, created_by_entity_id, created_at, updated_at";

fn map_note(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        entity_id: row.get(1)?,
        entity_type: enum_col(row, 2)?,
        note_type: enum_col(row, 3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        is_internal: row.get(6)?,
        is_pinned: row.get(7)?,
        is_current: row.get(8)?,
        version_number: row.get(9)?,
        replaces_note_id: row.get(10)?,
        created_by_entity_id: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl PortalDb {
    /// Create a note, or supersede note `note_id` with a new version.
    ///
    /// Superseding is a compare-and-swap on `version_number`: the current row
    /// is retired only if it is still current at `version`, and the new row
    /// is inserted in the same transaction. A new version keeps the key of
    /// the row it replaces. Returns the id of the inserted row.
    pub fn save_note(
        &self,
        note_id: Option<i64>,
        version: Option<i64>,
        draft: &NoteDraft,
        by: &Author,
    ) -> Result<i64> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let id = self.save_note_on(note_id, version, draft, by)?;
        tx.commit().context("Failed to commit note")?;
        Ok(id)
    }

    /// [`save_note`](Self::save_note) on the caller's transaction, for writes
    /// that pair a note with other rows.
    pub(super) fn save_note_on(
        &self,
        note_id: Option<i64>,
        version: Option<i64>,
        draft: &NoteDraft,
        by: &Author,
    ) -> Result<i64> {
        let Some(note_id) = note_id else {
            return self.create_note(draft, by);
        };
        let version = version.ok_or_else(|| {
            PortalError::validation("Version must be provided when updating an existing note")
        })?;
        let now = now_ts();

        let retired = self
            .conn
            .execute(
                "UPDATE notes SET is_current = 0, updated_at = ?1
                 WHERE id = ?2 AND is_current = 1 AND version_number = ?3",
                params![now, note_id, version],
            )
            .context("Failed to retire note version")?;

        if retired == 0 {
            let current: Option<i64> = self
                .conn
                .query_row(
                    "SELECT version_number FROM notes WHERE id = ?1 AND is_current = 1",
                    params![note_id],
                    |row| row.get(0),
                )
                .optional()
                .context("Failed to read note version")?;
            return Err(match current {
                Some(current) => {
                    tracing::warn!(note_id, expected = version, current, "Note version conflict");
                    PortalError::VersionConflict {
                        expected: version,
                        current,
                    }
                }
                None => PortalError::NoteNotCurrent { id: note_id },
            }
            .into());
        }

        self.conn
            .execute(
                "INSERT INTO notes (entity_id, entity_type, note_type, title, content, is_internal,
                                    is_pinned, is_current, version_number, replaces_note_id,
                                    created_by_entity_id, created_at, updated_at)
                 SELECT entity_id, entity_type, note_type, ?1, ?2, ?3, ?4, 1, ?5, id, ?6, ?7, ?7
                 FROM notes WHERE id = ?8",
                params![
                    non_empty(draft.title.as_deref()),
                    draft.content,
                    draft.is_internal,
                    draft.is_pinned,
                    version + 1,
                    by.entity_id,
                    now,
                    note_id
                ],
            )
            .context("Failed to insert note version")?;
        let new_id = self.conn.last_insert_rowid();

        tracing::info!(note_id = new_id, replaces = note_id, version = version + 1, "Note updated");
        Ok(new_id)
    }

    fn create_note(&self, draft: &NoteDraft, by: &Author) -> Result<i64> {
        if let Some(existing) =
            self.current_note(draft.entity_id, draft.entity_type, draft.note_type)?
        {
            return Err(PortalError::VersionConflict {
                expected: 0,
                current: existing.version_number,
            }
            .into());
        }

        let now = now_ts();
        self.conn
            .execute(
                "INSERT INTO notes (entity_id, entity_type, note_type, title, content, is_internal,
                                    is_pinned, is_current, version_number, replaces_note_id,
                                    created_by_entity_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 1, NULL, ?8, ?9, ?9)",
                params![
                    draft.entity_id,
                    draft.entity_type.as_str(),
                    draft.note_type.as_str(),
                    non_empty(draft.title.as_deref()),
                    draft.content,
                    draft.is_internal,
                    draft.is_pinned,
                    by.entity_id,
                    now
                ],
            )
            .context("Failed to insert note")?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(note_id = id, entity_id = draft.entity_id, "Note created");
        Ok(id)
    }

    pub fn current_note(
        &self,
        entity_id: i64,
        entity_type: NoteEntityType,
        note_type: NoteType,
    ) -> Result<Option<Note>> {
        let sql = format!(
            "SELECT {} FROM notes
             WHERE entity_id = ?1 AND entity_type = ?2 AND note_type = ?3 AND is_current = 1",
            NOTE_COLUMNS
        );
        self.conn
            .query_row(
                &sql,
                params![entity_id, entity_type.as_str(), note_type.as_str()],
                map_note,
            )
            .optional()
            .context("Failed to query current note")
    }

    pub fn get_note(&self, id: i64) -> Result<Option<Note>> {
        let sql = format!("SELECT {} FROM notes WHERE id = ?1", NOTE_COLUMNS);
        self.conn
            .query_row(&sql, params![id], map_note)
            .optional()
            .context("Failed to query note")
    }

    /// Current notes of every type attached to an entity.
    pub fn list_current_notes(
        &self,
        entity_id: i64,
        entity_type: NoteEntityType,
    ) -> Result<Vec<Note>> {
        let sql = format!(
            "SELECT {} FROM notes
             WHERE entity_id = ?1 AND entity_type = ?2 AND is_current = 1
             ORDER BY is_pinned DESC, note_type, id",
            NOTE_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_current_notes")?;
        let rows = stmt
            .query_map(params![entity_id, entity_type.as_str()], map_note)
            .context("Failed to query notes")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read note row")
    }

    /// Soft delete. No replacement row is written.
    pub fn mark_note_non_current(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE notes SET is_current = 0, updated_at = ?1 WHERE id = ?2",
                params![now_ts(), id],
            )
            .context("Failed to retire note")?;
        if changed == 0 {
            return Err(PortalError::not_found("Note", id).into());
        }
        Ok(())
    }

    /// Every version from `id` back to version 1, newest first.
    pub fn note_history(&self, id: i64) -> Result<Vec<Note>> {
        let sql = format!(
            "WITH RECURSIVE chain(note_id) AS (
                 SELECT ?1
                 UNION ALL
                 SELECT n.replaces_note_id FROM notes n JOIN chain c ON n.id = c.note_id
                 WHERE n.replaces_note_id IS NOT NULL
             )
             SELECT {} FROM notes WHERE id IN (SELECT note_id FROM chain)
             ORDER BY version_number DESC",
            NOTE_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare note_history")?;
        let rows = stmt
            .query_map(params![id], map_note)
            .context("Failed to query note history")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read note row")
    }
}
