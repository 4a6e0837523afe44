use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use portal_common::{PermissionState, ScopeStatus};
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use super::{
    FieldKind, PortalDb, choice, enum_col, field_update, non_empty, now_ts, opt_enum_col,
    text_value, update_columns,
};
use crate::errors::PortalError;
use crate::portal::models::{
    Author, EffectivePermission, Permission, PermissionForm, PermissionPatch,
};

static PERMISSION_KEY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_:.-]+$").unwrap());

const PERMISSION_SELECT: &str = "
    SELECT p.id, p.name, p.permission_key, p.permission_state, p.scope_status,
           p.service_item_id, si.name, p.service_category_id, sc.display_name,
           p.partner_id, pe.name, p.campaign_id, p.package_id,
           p.campaign_profile_id, cp.name, p.changed_by, p.change_reason, p.is_active,
           p.created_at, p.updated_at, u.name
    FROM permissions p
    LEFT JOIN service_items si ON si.id = p.service_item_id
    LEFT JOIN service_categories sc ON sc.id = p.service_category_id
    LEFT JOIN entities pe ON pe.id = p.partner_id
    LEFT JOIN campaign_profiles cp ON cp.id = p.campaign_profile_id
    LEFT JOIN entities u ON u.id = p.updated_by";

const EDITABLE_FIELDS: &[(&str, FieldKind)] = &[
    ("name", FieldKind::Text),
    ("permission_key", FieldKind::Text),
    (
        "permission_state",
        FieldKind::Choice(choice::<PermissionState>),
    ),
    ("scope_status", FieldKind::Choice(choice::<ScopeStatus>)),
    ("service_item_id", FieldKind::Int),
    ("service_category_id", FieldKind::Int),
    ("campaign_profile_id", FieldKind::Int),
    ("change_reason", FieldKind::Text),
    ("is_active", FieldKind::Bool),
];

fn map_permission(row: &Row<'_>) -> rusqlite::Result<Permission> {
    Ok(Permission {
        id: row.get(0)?,
        name: row.get(1)?,
        permission_key: row.get(2)?,
        permission_state: enum_col(row, 3)?,
        scope_status: opt_enum_col(row, 4)?,
        service_item_id: row.get(5)?,
        service_item_name: row.get(6)?,
        service_category_id: row.get(7)?,
        service_category_name: row.get(8)?,
        partner_id: row.get(9)?,
        partner_name: row.get(10)?,
        campaign_id: row.get(11)?,
        package_id: row.get(12)?,
        campaign_profile_id: row.get(13)?,
        campaign_profile_name: row.get(14)?,
        changed_by: row.get(15)?,
        change_reason: row.get(16)?,
        is_active: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
        updated_by_name: row.get(20)?,
    })
}

/// Permission keys are lowercase identifiers such as `reporting:monthly`.
fn validate_permission_key(key: &str) -> Result<&str, PortalError> {
    let key = key.trim();
    if key.is_empty() {
        return Err(PortalError::validation("Permission key is required"));
    }
    if !PERMISSION_KEY_REGEX.is_match(key) {
        return Err(PortalError::validation(format!(
            "Invalid permission key '{}'. Use lowercase letters, digits and _ : . -",
            key
        )));
    }
    Ok(key)
}

/// Apply partner overrides onto the base permission list.
///
/// Each base row whose key has a partner row is replaced by the override's
/// id and state; the name falls back to the base name when the override has
/// none. When a partner has several rows for one key the last one wins.
/// Partner keys that are not in the base set are dropped, and base order is
/// kept.
pub fn merge_partner_overrides(
    base: &[Permission],
    partner: &[Permission],
) -> Vec<EffectivePermission> {
    let overrides: HashMap<&str, &Permission> = partner
        .iter()
        .map(|p| (p.permission_key.as_str(), p))
        .collect();

    base.iter()
        .map(|b| match overrides.get(b.permission_key.as_str()) {
            Some(o) => EffectivePermission {
                id: o.id,
                name: o.name.clone().or_else(|| b.name.clone()),
                permission_key: b.permission_key.clone(),
                permission_state: o.permission_state,
                is_partner_override: true,
            },
            None => EffectivePermission {
                id: b.id,
                name: b.name.clone(),
                permission_key: b.permission_key.clone(),
                permission_state: b.permission_state,
                is_partner_override: false,
            },
        })
        .collect()
}

impl PortalDb {
    fn query_permissions(&self, filter: &str, values: Vec<Value>) -> Result<Vec<Permission>> {
        let sql = format!("{} {} ORDER BY p.name, p.id", PERMISSION_SELECT, filter);
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare permission query")?;
        let rows = stmt
            .query_map(params_from_iter(values), map_permission)
            .context("Failed to query permissions")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read permission row")
    }

    /// Active permissions, or with `include_inactive` only the inactive ones.
    pub fn list_permissions(&self, include_inactive: bool) -> Result<Vec<Permission>> {
        self.query_permissions(
            "WHERE p.is_active = ?1",
            vec![Value::Integer(i64::from(!include_inactive))],
        )
    }

    pub fn get_permission(&self, id: i64) -> Result<Option<Permission>> {
        let sql = format!("{} WHERE p.id = ?1", PERMISSION_SELECT);
        self.conn
            .query_row(&sql, params![id], map_permission)
            .optional()
            .context("Failed to query permission")
    }

    pub fn permissions_for_partner(&self, partner_id: i64) -> Result<Vec<Permission>> {
        self.query_permissions(
            "WHERE p.partner_id = ?1 AND p.is_active = 1",
            vec![Value::Integer(partner_id)],
        )
    }

    /// Active permissions that are not bound to any partner.
    pub fn base_permissions(&self) -> Result<Vec<Permission>> {
        self.query_permissions("WHERE p.partner_id IS NULL AND p.is_active = 1", Vec::new())
    }

    pub fn create_permission(&self, form: &PermissionForm, by: &Author) -> Result<Permission> {
        let key = validate_permission_key(&form.permission_key)?;
        let now = now_ts();
        self.conn
            .execute(
                "INSERT INTO permissions (name, permission_key, permission_state, scope_status,
                    service_item_id, service_category_id, partner_id, campaign_id, package_id,
                    campaign_profile_id, changed_by, change_reason, created_at, created_by,
                    updated_at, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?11, ?13, ?11)",
                params![
                    non_empty(form.name.as_deref()),
                    key,
                    form.permission_state.as_str(),
                    form.scope_status.map(|s| s.as_str()),
                    form.service_item_id,
                    form.service_category_id,
                    form.partner_id,
                    form.campaign_id,
                    form.package_id,
                    form.campaign_profile_id,
                    by.entity_id,
                    non_empty(form.change_reason.as_deref()),
                    now,
                ],
            )
            .context("Failed to insert permission")?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(
            permission_id = id,
            key,
            partner_id = ?form.partner_id,
            "Permission created"
        );
        self.get_permission(id)?
            .context("Permission not found after insert")
    }

    pub fn update_permission(
        &self,
        id: i64,
        patch: &PermissionPatch,
        by: &Author,
    ) -> Result<Permission> {
        let mut cols: Vec<(&str, Value)> = Vec::new();
        if patch.name.is_some() {
            cols.push(("name", text_value(patch.name.as_deref())));
        }
        if let Some(key) = patch.permission_key.as_deref() {
            let key = validate_permission_key(key)?;
            cols.push(("permission_key", Value::Text(key.to_string())));
        }
        if let Some(state) = patch.permission_state {
            cols.push(("permission_state", Value::Text(state.as_str().to_string())));
        }
        if let Some(scope) = patch.scope_status {
            cols.push(("scope_status", Value::Text(scope.as_str().to_string())));
        }
        if patch.change_reason.is_some() {
            cols.push(("change_reason", text_value(patch.change_reason.as_deref())));
        }
        if let Some(active) = patch.is_active {
            cols.push(("is_active", Value::Integer(i64::from(active))));
        }
        self.stamp_permission(id, cols, by)?;
        tracing::info!(permission_id = id, "Permission updated");
        self.get_permission(id)?
            .context("Permission not found after update")
    }

    pub fn update_permission_field(
        &self,
        id: i64,
        field: &str,
        value: &serde_json::Value,
        by: &Author,
    ) -> Result<Permission> {
        let (column, value) = field_update(EDITABLE_FIELDS, field, value)?;
        let value = match (column, value) {
            ("permission_key", Value::Text(key)) => {
                Value::Text(validate_permission_key(&key)?.to_string())
            }
            ("permission_key" | "permission_state", Value::Null) => {
                return Err(PortalError::validation(format!("Field '{}' is required", column)).into());
            }
            (_, value) => value,
        };
        self.stamp_permission(id, vec![(column, value)], by)?;
        tracing::debug!(permission_id = id, field = column, "Permission field updated");
        self.get_permission(id)?
            .context("Permission not found after update")
    }

    /// Write the given columns plus the change stamp, failing when the row is missing.
    fn stamp_permission(&self, id: i64, mut cols: Vec<(&str, Value)>, by: &Author) -> Result<()> {
        cols.push(("changed_by", Value::Integer(by.entity_id)));
        cols.push(("updated_at", Value::Text(now_ts())));
        cols.push(("updated_by", Value::Integer(by.entity_id)));
        let changed = update_columns(&self.conn, "permissions", "id", id, cols)
            .context("Failed to update permission")?;
        if changed == 0 {
            return Err(PortalError::not_found("Permission", id).into());
        }
        Ok(())
    }

    pub fn delete_permission(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM permissions WHERE id = ?1", params![id])
            .context("Failed to delete permission")?;
        if changed == 0 {
            return Err(PortalError::not_found("Permission", id).into());
        }
        tracing::info!(permission_id = id, "Permission deleted");
        Ok(())
    }

    // ── Merged views ──────────────────────────────────────────────────

    /// Base permissions with the partner's overrides applied. Without a
    /// partner this is the base list unchanged.
    pub fn default_permissions_for_campaign(
        &self,
        partner_id: Option<i64>,
    ) -> Result<Vec<EffectivePermission>> {
        let base = self.base_permissions()?;
        let overrides = match partner_id {
            Some(partner_id) => self.permissions_for_partner(partner_id)?,
            None => Vec::new(),
        };
        Ok(merge_partner_overrides(&base, &overrides))
    }

    pub fn default_permissions_for_campaign_id(
        &self,
        campaign_id: i64,
    ) -> Result<Vec<EffectivePermission>> {
        let campaign = self
            .get_campaign(campaign_id)?
            .ok_or(PortalError::not_found("Campaign", campaign_id))?;
        self.default_permissions_for_campaign(Some(campaign.partner_entity_id))
    }

    /// The merged state for one key, or `None` when no base row defines it.
    pub fn check_permission(
        &self,
        partner_id: Option<i64>,
        key: &str,
    ) -> Result<Option<PermissionState>> {
        Ok(self
            .default_permissions_for_campaign(partner_id)?
            .into_iter()
            .find(|p| p.permission_key == key)
            .map(|p| p.permission_state))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::seed_author;
    use super::*;
    use crate::portal::models::PartnerForm;
    use serde_json::json;

    fn form(name: &str, key: &str, state: PermissionState, partner: Option<i64>) -> PermissionForm {
        PermissionForm {
            name: Some(name.to_string()),
            permission_key: key.to_string(),
            permission_state: state,
            scope_status: None,
            service_item_id: None,
            service_category_id: None,
            partner_id: partner,
            campaign_id: None,
            package_id: None,
            campaign_profile_id: None,
            change_reason: None,
        }
    }

    fn seed_partner(db: &PortalDb, author: &Author) -> Result<i64> {
        db.save_partner(
            None,
            &PartnerForm {
                name: "Acme".to_string(),
                ..Default::default()
            },
            author,
        )
    }

    fn row(id: i64, name: Option<&str>, key: &str, state: PermissionState) -> Permission {
        Permission {
            id,
            name: name.map(str::to_string),
            permission_key: key.to_string(),
            permission_state: state,
            scope_status: None,
            service_item_id: None,
            service_item_name: None,
            service_category_id: None,
            service_category_name: None,
            partner_id: None,
            partner_name: None,
            campaign_id: None,
            package_id: None,
            campaign_profile_id: None,
            campaign_profile_name: None,
            changed_by: None,
            change_reason: None,
            is_active: true,
            created_at: String::new(),
            updated_at: String::new(),
            updated_by_name: None,
        }
    }

    #[test]
    fn test_merge_keeps_base_order_and_falls_back_to_base_name() {
        let base = vec![
            row(1, Some("Blog posts"), "content:blog", PermissionState::Allowed),
            row(2, Some("Ads spend"), "ads:spend", PermissionState::NotAllowed),
            row(3, Some("Reports"), "reporting", PermissionState::Allowed),
        ];
        let partner = vec![
            row(10, None, "ads:spend", PermissionState::AllowedWithApproval),
            row(11, Some("Unknown"), "not:in:base", PermissionState::Allowed),
            row(12, Some("Blogs (custom)"), "content:blog", PermissionState::NotAllowed),
            row(13, None, "content:blog", PermissionState::AllowedWithApproval),
        ];

        let merged = merge_partner_overrides(&base, &partner);
        let keys: Vec<&str> = merged.iter().map(|p| p.permission_key.as_str()).collect();
        assert_eq!(keys, vec!["content:blog", "ads:spend", "reporting"]);

        assert_eq!(merged[0].id, 13);
        assert_eq!(merged[0].permission_state, PermissionState::AllowedWithApproval);
        assert_eq!(merged[0].name.as_deref(), Some("Blog posts"));
        assert!(merged[0].is_partner_override);

        assert_eq!(merged[1].id, 10);
        assert_eq!(merged[1].name.as_deref(), Some("Ads spend"));

        assert_eq!(merged[2].id, 3);
        assert!(!merged[2].is_partner_override);
    }

    #[test]
    fn test_permission_key_validation() {
        assert!(validate_permission_key("portal:campaign.edit-v2_x").is_ok());
        assert!(validate_permission_key("  ").is_err());
        assert!(validate_permission_key("Upper:Case").is_err());
        assert!(validate_permission_key("has space").is_err());
    }

    #[test]
    fn test_create_and_list_permissions() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let partner = seed_partner(&db, &author)?;

        db.create_permission(&form("Reports", "reporting", PermissionState::Allowed, None), &author)?;
        let ads = db.create_permission(
            &form("Ads", "ads:spend", PermissionState::NotAllowed, None),
            &author,
        )?;
        let custom = db.create_permission(
            &form("Ads", "ads:spend", PermissionState::Allowed, Some(partner)),
            &author,
        )?;
        assert_eq!(custom.partner_name.as_deref(), Some("Acme"));
        assert_eq!(custom.updated_by_name.as_deref(), Some("Test Author"));
        assert_eq!(custom.changed_by, Some(author.entity_id));

        db.update_permission_field(ads.id, "is_active", &json!("false"), &author)?;

        let active: Vec<i64> = db.list_permissions(false)?.iter().map(|p| p.id).collect();
        assert_eq!(active.len(), 2);
        assert!(!active.contains(&ads.id));
        let inactive = db.list_permissions(true)?;
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].id, ads.id);

        assert_eq!(db.base_permissions()?.len(), 1);
        assert_eq!(db.permissions_for_partner(partner)?.len(), 1);

        let err = db
            .create_permission(&form("Bad", "Bad Key", PermissionState::Allowed, None), &author)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::Validation(_))
        ));
        Ok(())
    }

    #[test]
    fn test_default_permissions_for_campaign_applies_overrides() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let partner = seed_partner(&db, &author)?;
        let campaign = db.create_campaign(partner, "https://acme.example", None, None, &author)?;

        db.create_permission(&form("Blog", "content:blog", PermissionState::Allowed, None), &author)?;
        db.create_permission(&form("Ads", "ads:spend", PermissionState::NotAllowed, None), &author)?;
        let over = db.create_permission(
            &form("Ads", "ads:spend", PermissionState::AllowedWithApproval, Some(partner)),
            &author,
        )?;

        let base = db.default_permissions_for_campaign(None)?;
        assert!(base.iter().all(|p| !p.is_partner_override));

        let merged = db.default_permissions_for_campaign_id(campaign.id)?;
        assert_eq!(merged.len(), 2);
        let ads = merged
            .iter()
            .find(|p| p.permission_key == "ads:spend")
            .unwrap();
        assert_eq!(ads.id, over.id);

        assert_eq!(
            db.check_permission(Some(partner), "ads:spend")?,
            Some(PermissionState::AllowedWithApproval)
        );
        assert_eq!(
            db.check_permission(None, "ads:spend")?,
            Some(PermissionState::NotAllowed)
        );
        assert_eq!(db.check_permission(Some(partner), "missing")?, None);

        assert!(db.default_permissions_for_campaign_id(999).is_err());
        Ok(())
    }

    #[test]
    fn test_update_and_delete_permission() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let perm = db.create_permission(
            &form("Blog", "content:blog", PermissionState::Allowed, None),
            &author,
        )?;

        let updated = db.update_permission(
            perm.id,
            &PermissionPatch {
                permission_state: Some(PermissionState::NotAllowed),
                scope_status: Some(ScopeStatus::NotInScope),
                change_reason: Some("Partner opted out".to_string()),
                ..Default::default()
            },
            &author,
        )?;
        assert_eq!(updated.permission_state, PermissionState::NotAllowed);
        assert_eq!(updated.scope_status, Some(ScopeStatus::NotInScope));
        assert_eq!(updated.change_reason.as_deref(), Some("Partner opted out"));
        assert_eq!(updated.name.as_deref(), Some("Blog"));

        assert!(
            db.update_permission_field(perm.id, "permission_key", &json!("NOPE"), &author)
                .is_err()
        );
        assert!(
            db.update_permission_field(perm.id, "partner_id", &json!(1), &author)
                .is_err()
        );

        db.delete_permission(perm.id)?;
        assert!(db.get_permission(perm.id)?.is_none());
        let err = db.delete_permission(perm.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::NotFound { .. })
        ));
        Ok(())
    }
}
