use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, Row, params};

use super::{PortalDb, enum_col, non_empty, now_ts, opt_enum_col};
use crate::errors::PortalError;
use crate::portal::models::{AccessItem, AccessItemForm, Author};

const ACCESS_ITEM_SELECT: &str = "
    SELECT ai.id, ai.email, ai.username, ai.access_item_owner, ai.in_lastpass, ai.tfa_type,
           ai.tfa_type_value, ai.tfa_contact_id, tc.name, ai.tfa_source, ai.partner_entity_id,
           pe.name, ai.is_active, ai.created_at, ai.updated_at
    FROM access_items ai
    LEFT JOIN entities tc ON tc.id = ai.tfa_contact_id
    LEFT JOIN entities pe ON pe.id = ai.partner_entity_id";

fn map_access_item(row: &Row<'_>) -> rusqlite::Result<AccessItem> {
    Ok(AccessItem {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        access_item_owner: enum_col(row, 3)?,
        in_lastpass: row.get(4)?,
        tfa_type: opt_enum_col(row, 5)?,
        tfa_type_value: row.get(6)?,
        tfa_contact_id: row.get(7)?,
        tfa_contact_name: row.get(8)?,
        tfa_source: opt_enum_col(row, 9)?,
        partner_entity_id: row.get(10)?,
        partner_name: row.get(11)?,
        is_active: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn required_username(form: &AccessItemForm) -> Result<&str, PortalError> {
    non_empty(Some(form.username.as_str()))
        .ok_or_else(|| PortalError::validation("Username is required"))
}

impl PortalDb {
    /// Active items, or with `include_inactive` only the inactive ones,
    /// most recently touched first.
    pub fn list_access_items(&self, include_inactive: bool) -> Result<Vec<AccessItem>> {
        let sql = format!(
            "{} WHERE ai.is_active = ?1 ORDER BY ai.updated_at DESC, ai.id DESC",
            ACCESS_ITEM_SELECT
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_access_items")?;
        let rows = stmt
            .query_map(params![!include_inactive], map_access_item)
            .context("Failed to query access items")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read access item row")
    }

    pub fn get_access_item(&self, id: i64) -> Result<Option<AccessItem>> {
        let sql = format!("{} WHERE ai.id = ?1", ACCESS_ITEM_SELECT);
        self.conn
            .query_row(&sql, params![id], map_access_item)
            .optional()
            .context("Failed to query access item")
    }

    pub fn create_access_item(&self, form: &AccessItemForm, by: &Author) -> Result<AccessItem> {
        let username = required_username(form)?;
        let now = now_ts();
        self.conn
            .execute(
                "INSERT INTO access_items (email, username, access_item_owner, in_lastpass,
                    tfa_type, tfa_type_value, tfa_contact_id, tfa_source, partner_entity_id,
                    created_at, created_by, updated_at, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?10, ?11)",
                params![
                    non_empty(form.email.as_deref()),
                    username,
                    form.access_item_owner.as_str(),
                    form.in_lastpass,
                    form.tfa_type.map(|t| t.as_str()),
                    non_empty(form.tfa_type_value.as_deref()),
                    form.tfa_contact_id,
                    form.tfa_source.map(|s| s.as_str()),
                    form.partner_entity_id,
                    now,
                    by.entity_id,
                ],
            )
            .context("Failed to insert access item")?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(access_item_id = id, "Access item created");
        self.get_access_item(id)?
            .context("Access item not found after insert")
    }

    pub fn update_access_item(
        &self,
        id: i64,
        form: &AccessItemForm,
        by: &Author,
    ) -> Result<AccessItem> {
        let username = required_username(form)?;
        let changed = self
            .conn
            .execute(
                "UPDATE access_items SET email = ?1, username = ?2, access_item_owner = ?3,
                    in_lastpass = ?4, tfa_type = ?5, tfa_type_value = ?6, tfa_contact_id = ?7,
                    tfa_source = ?8, partner_entity_id = ?9, updated_at = ?10, updated_by = ?11
                 WHERE id = ?12",
                params![
                    non_empty(form.email.as_deref()),
                    username,
                    form.access_item_owner.as_str(),
                    form.in_lastpass,
                    form.tfa_type.map(|t| t.as_str()),
                    non_empty(form.tfa_type_value.as_deref()),
                    form.tfa_contact_id,
                    form.tfa_source.map(|s| s.as_str()),
                    form.partner_entity_id,
                    now_ts(),
                    by.entity_id,
                    id,
                ],
            )
            .context("Failed to update access item")?;
        if changed == 0 {
            return Err(PortalError::not_found("Access item", id).into());
        }
        tracing::info!(access_item_id = id, "Access item updated");
        self.get_access_item(id)?
            .context("Access item not found after update")
    }

    pub fn deactivate_access_item(&self, id: i64, by: &Author) -> Result<()> {
        self.set_access_item_active(id, false, by)
    }

    pub fn activate_access_item(&self, id: i64, by: &Author) -> Result<()> {
        self.set_access_item_active(id, true, by)
    }

    fn set_access_item_active(&self, id: i64, active: bool, by: &Author) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE access_items SET is_active = ?1, updated_at = ?2, updated_by = ?3 WHERE id = ?4",
                params![active, now_ts(), by.entity_id, id],
            )
            .context("Failed to update access item status")?;
        if changed == 0 {
            return Err(PortalError::not_found("Access item", id).into());
        }
        tracing::info!(access_item_id = id, active, "Access item status changed");
        Ok(())
    }
}
