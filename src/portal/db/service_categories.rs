use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params};

use super::{PortalDb, non_empty, now_ts, text_value, update_columns};
use crate::errors::PortalError;
use crate::portal::models::{Author, ServiceCategory, ServiceCategoryForm, ServiceCategoryPatch};

const CATEGORY_SELECT: &str = "
    SELECT sc.id, sc.key, sc.display_name, sc.description, sc.is_active, sc.created_at,
           sc.updated_at, sc.updated_by, u.name
    FROM service_categories sc
    LEFT JOIN entities u ON u.id = sc.updated_by";

fn map_category(row: &Row<'_>) -> rusqlite::Result<ServiceCategory> {
    Ok(ServiceCategory {
        id: row.get(0)?,
        key: row.get(1)?,
        display_name: row.get(2)?,
        description: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        updated_by: row.get(7)?,
        updated_by_name: row.get(8)?,
    })
}

impl PortalDb {
    pub fn list_service_categories(&self, include_inactive: bool) -> Result<Vec<ServiceCategory>> {
        let filter = if include_inactive {
            ""
        } else {
            "WHERE sc.is_active = 1"
        };
        let sql = format!("{} {} ORDER BY sc.display_name", CATEGORY_SELECT, filter);
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_service_categories")?;
        let rows = stmt
            .query_map([], map_category)
            .context("Failed to query service categories")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read service category row")
    }

    pub fn get_service_category(&self, id: i64) -> Result<Option<ServiceCategory>> {
        let sql = format!("{} WHERE sc.id = ?1", CATEGORY_SELECT);
        self.conn
            .query_row(&sql, params![id], map_category)
            .optional()
            .context("Failed to query service category")
    }

    pub fn get_service_category_by_key(&self, key: &str) -> Result<Option<ServiceCategory>> {
        let sql = format!("{} WHERE sc.key = ?1", CATEGORY_SELECT);
        self.conn
            .query_row(&sql, params![key.trim()], map_category)
            .optional()
            .context("Failed to query service category by key")
    }

    pub fn create_service_category(
        &self,
        form: &ServiceCategoryForm,
        by: &Author,
    ) -> Result<ServiceCategory> {
        let key = form.key.trim();
        let display_name = form.display_name.trim();
        if key.is_empty() || display_name.is_empty() {
            return Err(PortalError::validation("Key and display name are required").into());
        }
        if self.get_service_category_by_key(key)?.is_some() {
            return Err(PortalError::DuplicateKey {
                key: key.to_string(),
            }
            .into());
        }

        let now = now_ts();
        self.conn
            .execute(
                "INSERT INTO service_categories (key, display_name, description, created_at, created_by, updated_at, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?4, ?5)",
                params![
                    key,
                    display_name,
                    non_empty(form.description.as_deref()),
                    now,
                    by.entity_id
                ],
            )
            .context("Failed to insert service category")?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(category_id = id, key, "Service category created");
        self.get_service_category(id)?
            .context("Service category not found after insert")
    }

    pub fn update_service_category(
        &self,
        id: i64,
        patch: &ServiceCategoryPatch,
        by: &Author,
    ) -> Result<ServiceCategory> {
        let mut cols: Vec<(&str, Value)> = Vec::new();
        if let Some(name) = patch.display_name.as_deref() {
            match non_empty(Some(name)) {
                Some(name) => cols.push(("display_name", Value::Text(name.to_string()))),
                None => return Err(PortalError::validation("Display name cannot be empty").into()),
            }
        }
        if patch.description.is_some() {
            cols.push(("description", text_value(patch.description.as_deref())));
        }
        cols.push(("updated_at", Value::Text(now_ts())));
        cols.push(("updated_by", Value::Integer(by.entity_id)));

        let changed = update_columns(&self.conn, "service_categories", "id", id, cols)
            .context("Failed to update service category")?;
        if changed == 0 {
            return Err(PortalError::not_found("Service category", id).into());
        }
        self.get_service_category(id)?
            .context("Service category not found after update")
    }

    pub fn set_service_category_active(&self, id: i64, active: bool, by: &Author) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE service_categories SET is_active = ?1, updated_at = ?2, updated_by = ?3 WHERE id = ?4",
                params![active, now_ts(), by.entity_id, id],
            )
            .context("Failed to update service category status")?;
        if changed == 0 {
            return Err(PortalError::not_found("Service category", id).into());
        }
        tracing::info!(category_id = id, active, "Service category status changed");
        Ok(())
    }
}
