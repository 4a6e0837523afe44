use anyhow::{Context, Result};
use portal_common::{ActivityType, NoteEntityType, NoteType, RelatedTable, ServiceType};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use super::{
    FieldKind, PortalDb, choice, field_update, non_empty, now_ts, opt_enum_col, update_columns,
};
use crate::errors::PortalError;
use crate::portal::models::*;

const PACKAGE_SELECT: &str = "
    SELECT pk.id, pk.name, pk.monthly_price_cents, pk.currency, pk.partner_entity_id, pe.name,
           pk.related_campaign_profile_id, cp.name, pk.campaign_considerations,
           pk.presale_considerations, pk.phase_one_outline, pk.ongoing_phase_outline,
           pk.seo_growth_opportunities, pk.is_active, pk.buy_without_discovery, pk.description,
           pk.outcome, pk.type, pk.default_aa_client_template, pk.created_at, pk.updated_at, u.name
    FROM packages pk
    LEFT JOIN entities pe ON pe.id = pk.partner_entity_id
    LEFT JOIN campaign_profiles cp ON cp.id = pk.related_campaign_profile_id
    LEFT JOIN entities u ON u.id = pk.updated_by";

/// Text columns copied from a campaign profile into a new package, and from
/// a source package into its duplicate.
const PROFILE_TEXT_COLUMNS: &[&str] = &[
    "campaign_considerations",
    "presale_considerations",
    "phase_one_outline",
    "ongoing_phase_outline",
    "seo_growth_opportunities",
];

const EDITABLE_FIELDS: &[(&str, FieldKind)] = &[
    ("name", FieldKind::Text),
    ("description", FieldKind::Text),
    ("outcome", FieldKind::Text),
    ("monthly_price_cents", FieldKind::Int),
    ("currency", FieldKind::Text),
    ("partner_entity_id", FieldKind::Int),
    ("related_campaign_profile_id", FieldKind::Int),
    ("campaign_considerations", FieldKind::Text),
    ("presale_considerations", FieldKind::Text),
    ("phase_one_outline", FieldKind::Text),
    ("ongoing_phase_outline", FieldKind::Text),
    ("seo_growth_opportunities", FieldKind::Text),
    ("is_active", FieldKind::Bool),
    ("buy_without_discovery", FieldKind::Bool),
    ("type", FieldKind::Choice(choice::<ServiceType>)),
    ("default_aa_client_template", FieldKind::Text),
];

/// Escape LIKE wildcards so the search term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn map_package(row: &Row<'_>) -> rusqlite::Result<Package> {
    Ok(Package {
        id: row.get(0)?,
        name: row.get(1)?,
        monthly_price_cents: row.get(2)?,
        currency: row.get(3)?,
        partner_entity_id: row.get(4)?,
        partner_name: row.get(5)?,
        related_campaign_profile_id: row.get(6)?,
        campaign_profile_name: row.get(7)?,
        campaign_considerations: row.get(8)?,
        presale_considerations: row.get(9)?,
        phase_one_outline: row.get(10)?,
        ongoing_phase_outline: row.get(11)?,
        seo_growth_opportunities: row.get(12)?,
        is_active: row.get(13)?,
        buy_without_discovery: row.get(14)?,
        description: row.get(15)?,
        outcome: row.get(16)?,
        package_type: opt_enum_col(row, 17)?,
        default_aa_client_template: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
        updated_by_name: row.get(21)?,
        service_items: Vec::new(),
    })
}

fn map_package_item(row: &Row<'_>) -> rusqlite::Result<PackageServiceItem> {
    Ok(PackageServiceItem {
        id: row.get(0)?,
        package_id: row.get(1)?,
        service_item_id: row.get(2)?,
        service_item_name: row.get(3)?,
        service_label: row.get(4)?,
        quantity: row.get(5)?,
        frequency: row.get(6)?,
        monthly_price_cents: row.get(7)?,
        order_override: row.get(8)?,
        unique_service_label: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn map_action_item(row: &Row<'_>) -> rusqlite::Result<PackageActionItem> {
    Ok(PackageActionItem {
        id: row.get(0)?,
        package_id: row.get(1)?,
        package_service_item_id: row.get(2)?,
        service_item_id: row.get(3)?,
        name: row.get(4)?,
        order_override: row.get(5)?,
        in_onboarding: row.get(6)?,
    })
}

impl PortalDb {
    // ── Reads ─────────────────────────────────────────────────────────

    fn query_packages(&self, filter: &str, values: Vec<Value>) -> Result<Vec<Package>> {
        let sql = format!(
            "{} {} ORDER BY pk.updated_at DESC, pk.id DESC",
            PACKAGE_SELECT, filter
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare package query")?;
        let rows = stmt
            .query_map(params_from_iter(values), map_package)
            .context("Failed to query packages")?;
        let mut packages = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read package row")?;
        for package in &mut packages {
            package.service_items = self.list_package_service_items(package.id)?;
        }
        Ok(packages)
    }

    /// Active packages, or with `include_inactive` only the inactive ones.
    pub fn list_packages(&self, include_inactive: bool) -> Result<Vec<Package>> {
        self.query_packages(
            "WHERE pk.is_active = ?1",
            vec![Value::Integer(i64::from(!include_inactive))],
        )
    }

    /// Name search with optional partner, profile and type filters. Unlike
    /// [`list_packages`](Self::list_packages), `include_inactive` widens the
    /// result instead of switching it.
    pub fn search_packages(
        &self,
        term: &str,
        partner_id: Option<i64>,
        campaign_profile_id: Option<i64>,
        include_inactive: bool,
        package_type: Option<ServiceType>,
    ) -> Result<Vec<Package>> {
        let mut conditions = Vec::new();
        let mut values = Vec::new();
        if !include_inactive {
            conditions.push("pk.is_active = 1".to_string());
        }
        if let Some(term) = non_empty(Some(term)) {
            values.push(Value::Text(format!("%{}%", escape_like(term))));
            conditions.push(format!("pk.name LIKE ?{} ESCAPE '\\'", values.len()));
        }
        if let Some(partner_id) = partner_id.filter(|id| *id != 0) {
            values.push(Value::Integer(partner_id));
            conditions.push(format!("pk.partner_entity_id = ?{}", values.len()));
        }
        if let Some(profile_id) = campaign_profile_id.filter(|id| *id != 0) {
            values.push(Value::Integer(profile_id));
            conditions.push(format!("pk.related_campaign_profile_id = ?{}", values.len()));
        }
        if let Some(package_type) = package_type {
            values.push(Value::Text(package_type.as_str().to_string()));
            conditions.push(format!("pk.type = ?{}", values.len()));
        }

        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        self.query_packages(&filter, values)
    }

    pub fn get_package(&self, id: i64) -> Result<Option<Package>> {
        let sql = format!("{} WHERE pk.id = ?1", PACKAGE_SELECT);
        let package = self
            .conn
            .query_row(&sql, params![id], map_package)
            .optional()
            .context("Failed to query package")?;
        match package {
            Some(mut package) => {
                package.service_items = self.list_package_service_items(id)?;
                Ok(Some(package))
            }
            None => Ok(None),
        }
    }

    fn require_package(&self, id: i64) -> Result<Package> {
        self.get_package(id)?
            .ok_or_else(|| PortalError::not_found("Package", id).into())
    }

    fn require_package_refs(&self, form: &PackageForm) -> Result<()> {
        self.require_ref("Partner", "partners", "entity_id", form.partner_entity_id)?;
        self.require_ref(
            "Campaign profile",
            "campaign_profiles",
            "id",
            form.related_campaign_profile_id,
        )
    }

    // ── Package writes ────────────────────────────────────────────────

    /// Insert the package row. Runs on the caller's transaction, if any.
    fn insert_package(&self, form: &PackageForm, by: &Author) -> Result<i64> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err(PortalError::validation("Package name is required").into());
        }
        let profile_id = form.related_campaign_profile_id.filter(|id| *id != 0);
        self.require_package_refs(form)?;
        let now = now_ts();

        self.conn
            .execute(
                "INSERT INTO packages (name, monthly_price_cents, currency, partner_entity_id,
                                       related_campaign_profile_id, description, outcome, type,
                                       buy_without_discovery, is_active, default_aa_client_template,
                                       created_at, created_by, updated_at, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?12, ?13)",
                params![
                    name,
                    form.monthly_price_cents,
                    non_empty(form.currency.as_deref()).unwrap_or("USD"),
                    form.partner_entity_id.filter(|id| *id != 0),
                    profile_id,
                    non_empty(form.description.as_deref()),
                    non_empty(form.outcome.as_deref()),
                    form.package_type.map(|t| t.as_str()),
                    form.buy_without_discovery.unwrap_or(true),
                    form.is_active.unwrap_or(true),
                    non_empty(form.default_aa_client_template.as_deref()),
                    now,
                    by.entity_id
                ],
            )
            .context("Failed to insert package")?;
        let id = self.conn.last_insert_rowid();

        if let Some(profile_id) = profile_id {
            let assignments = PROFILE_TEXT_COLUMNS
                .iter()
                .map(|col| format!("{col} = (SELECT {col} FROM campaign_profiles WHERE id = ?1)"))
                .collect::<Vec<_>>()
                .join(", ");
            self.conn
                .execute(
                    &format!("UPDATE packages SET {} WHERE id = ?2", assignments),
                    params![profile_id, id],
                )
                .context("Failed to copy campaign profile into package")?;
        }

        self.create_activity(
            &NewActivity::new(by, ActivityType::PackageCreated, RelatedTable::Packages, id)
                .partner(form.partner_entity_id.filter(|id| *id != 0))
                .details(format!("Created package: {}", name)),
        )?;
        Ok(id)
    }

    pub fn create_package(&self, form: &PackageForm, by: &Author) -> Result<Package> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let id = self.insert_package(form, by)?;
        tx.commit().context("Failed to commit package")?;
        tracing::info!(package_id = id, "Package created");
        self.require_package(id)
    }

    /// Rewrite the editable header fields. Currency falls back to USD and
    /// `is_active` to true.
    pub fn update_package_basic_details(
        &self,
        id: i64,
        form: &PackageForm,
        by: &Author,
    ) -> Result<Package> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err(PortalError::validation("Package name is required").into());
        }
        let partner_id = form.partner_entity_id.filter(|id| *id != 0);
        self.require_package_refs(form)?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let changed = tx
            .execute(
                "UPDATE packages SET name = ?1, description = ?2, partner_entity_id = ?3,
                        monthly_price_cents = ?4, currency = ?5, related_campaign_profile_id = ?6,
                        is_active = ?7, updated_by = ?8, updated_at = ?9
                 WHERE id = ?10",
                params![
                    name,
                    non_empty(form.description.as_deref()),
                    partner_id,
                    form.monthly_price_cents.filter(|c| *c != 0),
                    non_empty(form.currency.as_deref()).unwrap_or("USD"),
                    form.related_campaign_profile_id.filter(|id| *id != 0),
                    form.is_active.unwrap_or(true),
                    by.entity_id,
                    now_ts(),
                    id
                ],
            )
            .context("Failed to update package")?;
        if changed == 0 {
            return Err(PortalError::not_found("Package", id).into());
        }
        self.create_activity(
            &NewActivity::new(by, ActivityType::PackageUpdated, RelatedTable::Packages, id)
                .partner(partner_id)
                .details("Updated package basic details"),
        )?;
        tx.commit().context("Failed to commit package update")?;

        tracing::info!(package_id = id, "Package details updated");
        self.require_package(id)
    }

    pub fn update_package_field(
        &self,
        id: i64,
        field: &str,
        value: &serde_json::Value,
        by: &Author,
    ) -> Result<Package> {
        let (column, value) = field_update(EDITABLE_FIELDS, field, value)?;
        if column == "name" && value == Value::Null {
            return Err(PortalError::validation("Package name is required").into());
        }
        if let Value::Integer(ref_id) = value {
            match column {
                "partner_entity_id" => {
                    self.require_ref("Partner", "partners", "entity_id", Some(ref_id))?
                }
                "related_campaign_profile_id" => {
                    self.require_ref("Campaign profile", "campaign_profiles", "id", Some(ref_id))?
                }
                _ => {}
            }
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let changed = update_columns(
            &tx,
            "packages",
            "id",
            id,
            vec![
                (column, value),
                ("updated_by", Value::Integer(by.entity_id)),
                ("updated_at", Value::Text(now_ts())),
            ],
        )
        .context("Failed to update package field")?;
        if changed == 0 {
            return Err(PortalError::not_found("Package", id).into());
        }
        let partner_id: Option<i64> = tx
            .query_row(
                "SELECT partner_entity_id FROM packages WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .context("Failed to read package partner")?;
        self.create_activity(
            &NewActivity::new(by, ActivityType::PackageUpdated, RelatedTable::Packages, id)
                .partner(partner_id)
                .details(format!("Updated field: {}", column)),
        )?;
        tx.commit().context("Failed to commit package field")?;
        self.require_package(id)
    }

    /// Hard delete; service and action items go with the package.
    pub fn delete_package(&self, id: i64, by: &Author) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let changed = tx
            .execute("DELETE FROM packages WHERE id = ?1", params![id])
            .context("Failed to delete package")?;
        if changed == 0 {
            return Err(PortalError::not_found("Package", id).into());
        }
        self.create_activity(
            &NewActivity::new(by, ActivityType::PackageDeleted, RelatedTable::Packages, id)
                .details("Deleted package"),
        )?;
        tx.commit().context("Failed to commit package delete")?;
        tracing::info!(package_id = id, "Package deleted");
        Ok(())
    }

    // ── Notes and history ─────────────────────────────────────────────

    /// The package's general note, every version, newest first.
    pub fn package_notes(&self, id: i64) -> Result<Vec<Note>> {
        match self.current_note(id, NoteEntityType::Packages, NoteType::General)? {
            Some(current) => self.note_history(current.id),
            None => Ok(Vec::new()),
        }
    }

    /// Add a note by superseding the current general note, or start one.
    pub fn add_package_note(&self, id: i64, content: &str, by: &Author) -> Result<i64> {
        let content = content.trim();
        if content.is_empty() {
            return Err(PortalError::validation("Note content is required").into());
        }
        let package = self.require_package(id)?;

        let draft =
            NoteDraft::new(id, NoteEntityType::Packages, NoteType::General).with_content(content);
        let current = self.current_note(id, NoteEntityType::Packages, NoteType::General)?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let note_id = match current {
            Some(note) => {
                self.save_note_on(Some(note.id), Some(note.version_number), &draft, by)?
            }
            None => self.save_note_on(None, None, &draft, by)?,
        };
        self.create_activity(
            &NewActivity::new(by, ActivityType::PackageNoteAdded, RelatedTable::Packages, id)
                .partner(package.partner_entity_id)
                .details("Added note to package"),
        )?;
        tx.commit().context("Failed to commit package note")?;
        Ok(note_id)
    }

    pub fn package_activities(&self, id: i64) -> Result<Vec<Activity>> {
        self.activities_for_item(RelatedTable::Packages, id)
    }

    // ── Package service items ─────────────────────────────────────────

    pub fn list_package_service_items(&self, package_id: i64) -> Result<Vec<PackageServiceItem>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT psi.id, psi.package_id, psi.service_item_id, si.name, si.service_label,
                        psi.quantity, psi.frequency, psi.monthly_price_cents, psi.order_override,
                        psi.unique_service_label, psi.created_at
                 FROM package_service_items psi
                 JOIN service_items si ON si.id = psi.service_item_id
                 WHERE psi.package_id = ?1
                 ORDER BY psi.order_override, psi.created_at, psi.id",
            )
            .context("Failed to prepare list_package_service_items")?;
        let rows = stmt
            .query_map(params![package_id], map_package_item)
            .context("Failed to query package service items")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read package service item row")
    }

    fn insert_package_service_item(
        &self,
        package_id: i64,
        form: &PackageServiceItemForm,
        by: &Author,
    ) -> Result<i64> {
        let label: Option<String> = self
            .conn
            .query_row(
                "SELECT service_label FROM service_items WHERE id = ?1",
                params![form.service_item_id],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to read service item")?
            .ok_or(PortalError::not_found("Service item", form.service_item_id))?;
        let now = now_ts();
        self.conn
            .execute(
                "INSERT INTO package_service_items (package_id, service_item_id, quantity, frequency,
                                                    monthly_price_cents, unique_service_label,
                                                    created_at, created_by, updated_at, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?7, ?8)",
                params![
                    package_id,
                    form.service_item_id,
                    form.quantity.filter(|q| *q != 0).unwrap_or(1),
                    non_empty(form.frequency.as_deref()).unwrap_or("monthly"),
                    form.monthly_price_cents.unwrap_or(0),
                    label,
                    now,
                    by.entity_id
                ],
            )
            .context("Failed to insert package service item")?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_package_service_item(
        &self,
        package_id: i64,
        form: &PackageServiceItemForm,
        by: &Author,
    ) -> Result<PackageServiceItem> {
        let package = self.require_package(package_id)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let row_id = self.insert_package_service_item(package_id, form, by)?;
        self.create_activity(
            &NewActivity::new(by, ActivityType::PackageUpdated, RelatedTable::Packages, package_id)
                .partner(package.partner_entity_id)
                .details("Added service item to package"),
        )?;
        tx.commit().context("Failed to commit package service item")?;

        self.list_package_service_items(package_id)?
            .into_iter()
            .find(|item| item.id == row_id)
            .context("Package service item not found after insert")
    }

    /// Patch one row of the package's service items by its row id.
    pub fn update_package_service_item(
        &self,
        package_id: i64,
        item_row_id: i64,
        patch: &PackageServiceItemPatch,
        by: &Author,
    ) -> Result<()> {
        let mut cols: Vec<(&str, Value)> = Vec::new();
        if let Some(quantity) = patch.quantity {
            cols.push(("quantity", Value::Integer(quantity)));
        }
        if let Some(frequency) = non_empty(patch.frequency.as_deref()) {
            cols.push(("frequency", Value::Text(frequency.to_string())));
        }
        if let Some(cents) = patch.monthly_price_cents {
            cols.push(("monthly_price_cents", Value::Integer(cents)));
        }
        if let Some(order) = patch.order_override {
            cols.push(("order_override", Value::Integer(order)));
        }
        if let Some(label) = patch.unique_service_label.as_deref() {
            cols.push(("unique_service_label", super::text_value(Some(label))));
        }
        cols.push(("updated_by", Value::Integer(by.entity_id)));
        cols.push(("updated_at", Value::Text(now_ts())));

        let belongs: bool = self
            .conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM package_service_items WHERE id = ?1 AND package_id = ?2",
                params![item_row_id, package_id],
                |row| row.get(0),
            )
            .context("Failed to check package service item")?;
        if !belongs {
            return Err(PortalError::not_found("Package service item", item_row_id).into());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        update_columns(&tx, "package_service_items", "id", item_row_id, cols)
            .context("Failed to update package service item")?;
        self.create_activity(
            &NewActivity::new(by, ActivityType::PackageUpdated, RelatedTable::Packages, package_id)
                .details("Updated service item in package"),
        )?;
        tx.commit().context("Failed to commit package service item")?;
        Ok(())
    }

    /// Remove every row for `service_item_id` from the package.
    pub fn remove_package_service_item(
        &self,
        package_id: i64,
        service_item_id: i64,
        by: &Author,
    ) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let removed = tx
            .execute(
                "DELETE FROM package_service_items WHERE package_id = ?1 AND service_item_id = ?2",
                params![package_id, service_item_id],
            )
            .context("Failed to remove package service item")?;
        if removed == 0 {
            return Err(PortalError::not_found("Package service item", service_item_id).into());
        }
        self.create_activity(
            &NewActivity::new(by, ActivityType::PackageUpdated, RelatedTable::Packages, package_id)
                .details("Removed service item from package"),
        )?;
        tx.commit().context("Failed to commit package service item removal")?;
        Ok(())
    }

    // ── Package action items ──────────────────────────────────────────

    pub fn list_package_action_items(&self, package_id: i64) -> Result<Vec<PackageActionItem>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT pa.id, pa.package_id, pa.package_service_item_id, pa.service_item_id,
                        si.name, pa.order_override, pa.in_onboarding
                 FROM package_service_action_items pa
                 JOIN service_items si ON si.id = pa.service_item_id
                 WHERE pa.package_id = ?1
                 ORDER BY pa.order_override, si.name",
            )
            .context("Failed to prepare list_package_action_items")?;
        let rows = stmt
            .query_map(params![package_id], map_action_item)
            .context("Failed to query package action items")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read package action item row")
    }

    fn insert_package_action_item(
        &self,
        package_id: i64,
        form: &PackageActionItemForm,
        by: &Author,
    ) -> Result<i64> {
        let service_item_id = form
            .service_item_id
            .filter(|id| *id != 0)
            .ok_or_else(|| PortalError::validation("service_item_id is required"))?;
        self.require_ref("Service item", "service_items", "id", Some(service_item_id))?;
        self.require_ref(
            "Package service item",
            "package_service_items",
            "id",
            form.package_service_item_id,
        )?;
        let now = now_ts();
        self.conn
            .execute(
                "INSERT INTO package_service_action_items (package_id, package_service_item_id,
                                                          service_item_id, order_override, in_onboarding,
                                                          created_at, created_by, updated_at, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?6, ?7)",
                params![
                    package_id,
                    form.package_service_item_id.filter(|id| *id != 0),
                    service_item_id,
                    form.order_override,
                    form.in_onboarding.unwrap_or(false),
                    now,
                    by.entity_id
                ],
            )
            .context("Failed to insert package action item")?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_package_action_item(
        &self,
        package_id: i64,
        form: &PackageActionItemForm,
        by: &Author,
    ) -> Result<i64> {
        self.require_package(package_id)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let id = self.insert_package_action_item(package_id, form, by)?;
        self.create_activity(
            &NewActivity::new(by, ActivityType::PackageUpdated, RelatedTable::Packages, package_id)
                .details("Added action item to package"),
        )?;
        tx.commit().context("Failed to commit package action item")?;
        Ok(id)
    }

    pub fn remove_package_action_item(
        &self,
        package_id: i64,
        service_item_id: i64,
        by: &Author,
    ) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let removed = tx
            .execute(
                "DELETE FROM package_service_action_items WHERE package_id = ?1 AND service_item_id = ?2",
                params![package_id, service_item_id],
            )
            .context("Failed to remove package action item")?;
        if removed == 0 {
            return Err(PortalError::not_found("Package action item", service_item_id).into());
        }
        self.create_activity(
            &NewActivity::new(by, ActivityType::PackageUpdated, RelatedTable::Packages, package_id)
                .details("Removed action item from package"),
        )?;
        tx.commit().context("Failed to commit package action item removal")?;
        Ok(())
    }

    pub fn reorder_package_action_items(
        &self,
        package_id: i64,
        order: &[ActionItemOrder],
        by: &Author,
    ) -> Result<()> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let now = now_ts();
        for entry in order {
            tx.execute(
                "UPDATE package_service_action_items
                 SET order_override = ?1, updated_by = ?2, updated_at = ?3
                 WHERE package_id = ?4 AND service_item_id = ?5",
                params![
                    entry.order_override,
                    by.entity_id,
                    now,
                    package_id,
                    entry.service_item_id
                ],
            )
            .context("Failed to reorder package action item")?;
        }
        tx.commit().context("Failed to commit action item order")?;
        Ok(())
    }

    // ── Duplication ───────────────────────────────────────────────────

    /// Deep copy a package with its service items and action items.
    ///
    /// Fields absent from `overrides` are taken from the source. The copy
    /// keeps the source's considerations and outlines even when a different
    /// campaign profile is chosen.
    pub fn duplicate_package(
        &self,
        source_id: i64,
        overrides: &DuplicatePackageForm,
        by: &Author,
    ) -> Result<Package> {
        let source = self.require_package(source_id)?;
        let actions = self.list_package_action_items(source_id)?;

        let form = PackageForm {
            name: overrides
                .name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("{} (copy)", source.name)),
            monthly_price_cents: overrides.monthly_price_cents.or(source.monthly_price_cents),
            currency: overrides.currency.clone().or_else(|| source.currency.clone()),
            partner_entity_id: overrides.partner_entity_id.or(source.partner_entity_id),
            related_campaign_profile_id: overrides
                .related_campaign_profile_id
                .or(source.related_campaign_profile_id),
            description: overrides
                .description
                .clone()
                .or_else(|| source.description.clone()),
            outcome: source.outcome.clone(),
            package_type: overrides.package_type.or(source.package_type),
            buy_without_discovery: Some(source.buy_without_discovery),
            is_active: Some(true),
            default_aa_client_template: source.default_aa_client_template.clone(),
        };

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let new_id = self.insert_package(&form, by)?;

        for item in &source.service_items {
            self.insert_package_service_item(
                new_id,
                &PackageServiceItemForm {
                    service_item_id: item.service_item_id,
                    quantity: item.quantity,
                    frequency: item.frequency.clone(),
                    monthly_price_cents: item.monthly_price_cents,
                },
                by,
            )?;
        }
        for action in &actions {
            self.insert_package_action_item(
                new_id,
                &PackageActionItemForm {
                    service_item_id: Some(action.service_item_id),
                    package_service_item_id: None,
                    order_override: action.order_override,
                    in_onboarding: Some(action.in_onboarding),
                },
                by,
            )?;
        }

        let copied = PROFILE_TEXT_COLUMNS
            .iter()
            .map(|col| format!("{col} = (SELECT {col} FROM packages WHERE id = ?1)"))
            .collect::<Vec<_>>()
            .join(", ");
        tx.execute(
            &format!("UPDATE packages SET {} WHERE id = ?2", copied),
            params![source_id, new_id],
        )
        .context("Failed to copy package considerations")?;

        self.create_activity(
            &NewActivity::new(by, ActivityType::PackageUpdated, RelatedTable::Packages, new_id)
                .partner(form.partner_entity_id)
                .details(format!("Package duplicated from \"{}\"", source.name)),
        )?;
        tx.commit().context("Failed to commit package duplicate")?;

        tracing::info!(source_id, package_id = new_id, "Package duplicated");
        self.require_package(new_id)
    }
}
