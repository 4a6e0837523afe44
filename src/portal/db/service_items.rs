use std::collections::HashMap;

use anyhow::{Context, Result};
use portal_common::money::dollars_to_cents;
use portal_common::{ProposalMode, ServiceScope, ServiceType};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use super::{PortalDb, enum_col, non_empty, now_ts, opt_enum_col};
use crate::errors::PortalError;
use crate::portal::models::{ActionItemOption, Author, PackageOption, ServiceItem, ServiceItemForm};

const ITEM_SELECT: &str = "
    SELECT si.id, si.name, si.service_category, si.service_category_id, sc.display_name,
           si.service_label, si.type, si.description, si.sop_url, si.min_pricing_usd_cents,
           si.est_cogs_usd_cents, si.est_time_minutes, si.recommended_price_cents,
           si.recommended_price_currency, si.partner_entity_id, p.name, si.is_active,
           si.service_scope, si.is_billable, si.proposal_mode, si.package_display,
           si.mcp_display, si.in_stream, si.generate_task, si.created_at, si.updated_at, u.name
    FROM service_items si
    LEFT JOIN entities p ON p.id = si.partner_entity_id
    LEFT JOIN entities u ON u.id = si.updated_by
    LEFT JOIN service_categories sc ON sc.id = si.service_category_id";

fn map_item(row: &Row<'_>) -> rusqlite::Result<ServiceItem> {
    Ok(ServiceItem {
        id: row.get(0)?,
        name: row.get(1)?,
        service_category: row.get(2)?,
        service_category_id: row.get(3)?,
        service_category_name: row.get(4)?,
        service_label: row.get(5)?,
        service_type: opt_enum_col(row, 6)?,
        description: row.get(7)?,
        sop_url: row.get(8)?,
        min_pricing_usd_cents: row.get(9)?,
        est_cogs_usd_cents: row.get(10)?,
        est_time_minutes: row.get(11)?,
        recommended_price_cents: row.get(12)?,
        recommended_price_currency: row.get(13)?,
        partner_entity_id: row.get(14)?,
        partner_name: row.get(15)?,
        is_active: row.get(16)?,
        service_scope: enum_col(row, 17)?,
        is_billable: row.get(18)?,
        proposal_mode: enum_col(row, 19)?,
        package_display: row.get(20)?,
        mcp_display: row.get(21)?,
        in_stream: row.get(22)?,
        generate_task: row.get(23)?,
        created_at: row.get(24)?,
        updated_at: row.get(25)?,
        updated_by_name: row.get(26)?,
    })
}

/// `partner_entity_id` filter shared by the package pickers: core items
/// always, plus the partner's own items when a partner is given.
fn partner_scope(partner_id: Option<i64>, values: &mut Vec<Value>) -> String {
    match partner_id.filter(|id| *id != 0) {
        Some(id) => {
            values.push(Value::Integer(id));
            format!(
                "(partner_entity_id IS NULL OR partner_entity_id = ?{})",
                values.len()
            )
        }
        None => "partner_entity_id IS NULL".to_string(),
    }
}

fn starred(name: String, partner_specific: bool) -> String {
    if partner_specific {
        format!("*{}", name)
    } else {
        name
    }
}

impl PortalDb {
    /// Active items, or with `include_inactive` only the inactive ones.
    pub fn list_service_items(&self, include_inactive: bool) -> Result<Vec<ServiceItem>> {
        let sql = format!("{} WHERE si.is_active = ?1 ORDER BY si.name", ITEM_SELECT);
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_service_items")?;
        let rows = stmt
            .query_map(params![!include_inactive], map_item)
            .context("Failed to query service items")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read service item row")
    }

    pub fn get_service_item(&self, id: i64) -> Result<Option<ServiceItem>> {
        let sql = format!("{} WHERE si.id = ?1", ITEM_SELECT);
        self.conn
            .query_row(&sql, params![id], map_item)
            .optional()
            .context("Failed to query service item")
    }

    fn category_id_for_key(&self, key: Option<&str>) -> Result<Option<i64>> {
        let Some(key) = non_empty(key) else {
            return Ok(None);
        };
        self.conn
            .query_row(
                "SELECT id FROM service_categories WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up service category")
    }

    /// Column values shared by create and update, in `ITEM_COLUMNS` order.
    fn item_values(&self, form: &ServiceItemForm) -> Result<Vec<Value>> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err(PortalError::validation("Service item name is required").into());
        }
        let text = |v: &Option<String>| match non_empty(v.as_deref()) {
            Some(s) => Value::Text(s.to_string()),
            None => Value::Null,
        };
        let int = |v: Option<i64>| v.map(Value::Integer).unwrap_or(Value::Null);
        let flag = |v: Option<bool>, default: bool| Value::Integer(i64::from(v.unwrap_or(default)));

        Ok(vec![
            Value::Text(name.to_string()),
            text(&form.service_category),
            int(self.category_id_for_key(form.service_category.as_deref())?),
            text(&form.service_label),
            form.service_type
                .map(|t| Value::Text(t.as_str().to_string()))
                .unwrap_or(Value::Null),
            text(&form.description),
            text(&form.sop_url),
            int(dollars_to_cents(form.budget_amount_dollars)),
            int(dollars_to_cents(form.est_cogs_dollars)),
            int(form.est_time_minutes),
            int(dollars_to_cents(form.recommended_price_dollars)),
            text(&form.recommended_price_currency),
            int(form.partner_entity_id.filter(|id| *id != 0)),
            flag(form.is_active, true),
            Value::Text(form.service_scope.unwrap_or(ServiceScope::Campaign).as_str().to_string()),
            flag(form.is_billable, true),
            Value::Text(form.proposal_mode.unwrap_or(ProposalMode::Both).as_str().to_string()),
            text(&form.package_display),
            text(&form.mcp_display),
            flag(form.in_stream, false),
            flag(form.generate_task, false),
        ])
    }

    pub fn create_service_item(&self, form: &ServiceItemForm, by: &Author) -> Result<ServiceItem> {
        let mut values = self.item_values(form)?;
        let now = now_ts();
        values.extend([
            Value::Text(now.clone()),
            Value::Integer(by.entity_id),
            Value::Text(now),
            Value::Integer(by.entity_id),
        ]);
        let placeholders = (1..=values.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO service_items ({}, created_at, created_by, updated_at, updated_by) VALUES ({})",
            ITEM_COLUMNS.join(", "),
            placeholders
        );
        self.conn
            .execute(&sql, params_from_iter(values))
            .context("Failed to insert service item")?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(service_item_id = id, "Service item created");
        self.get_service_item(id)?
            .context("Service item not found after insert")
    }

    pub fn update_service_item(
        &self,
        id: i64,
        form: &ServiceItemForm,
        by: &Author,
    ) -> Result<ServiceItem> {
        let mut values = self.item_values(form)?;
        values.extend([Value::Text(now_ts()), Value::Integer(by.entity_id)]);
        let assignments = ITEM_COLUMNS
            .iter()
            .chain(["updated_at", "updated_by"].iter())
            .enumerate()
            .map(|(i, col)| format!("{} = ?{}", col, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        values.push(Value::Integer(id));
        let sql = format!(
            "UPDATE service_items SET {} WHERE id = ?{}",
            assignments,
            values.len()
        );
        let changed = self
            .conn
            .execute(&sql, params_from_iter(values))
            .context("Failed to update service item")?;
        if changed == 0 {
            return Err(PortalError::not_found("Service item", id).into());
        }
        tracing::info!(service_item_id = id, "Service item updated");
        self.get_service_item(id)?
            .context("Service item not found after update")
    }

    /// Items that can be placed on a package, one per service label.
    ///
    /// A partner's own item replaces the core item with the same label.
    pub fn available_for_package(
        &self,
        partner_id: Option<i64>,
        package_type: Option<ServiceType>,
    ) -> Result<Vec<PackageOption>> {
        let mut values = Vec::new();
        let mut conditions = vec!["is_active = 1".to_string()];
        if let Some(package_type) = package_type {
            let modes = ProposalMode::ALL
                .iter()
                .filter(|m| m.fits_package(package_type))
                .map(|m| format!("'{}'", m.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            conditions.push(format!("proposal_mode IN ({})", modes));
        }
        conditions.push(partner_scope(partner_id, &mut values));

        let sql = format!(
            "SELECT id, name, service_label, partner_entity_id, recommended_price_cents
             FROM service_items WHERE {} ORDER BY id",
            conditions.join(" AND ")
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare available_for_package")?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                let partner: Option<i64> = row.get(3)?;
                Ok(PackageOption {
                    id: row.get(0)?,
                    name: starred(row.get(1)?, partner.is_some()),
                    service_label: row.get(2)?,
                    is_partner_specific: partner.is_some(),
                    recommended_price_cents: row.get(4)?,
                })
            })
            .context("Failed to query available service items")?;

        let mut options: Vec<PackageOption> = Vec::new();
        let mut by_label: HashMap<String, usize> = HashMap::new();
        for row in rows {
            let option = row.context("Failed to read service item row")?;
            let label = option
                .service_label
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            match by_label.get(&label) {
                Some(&idx) if option.is_partner_specific => options[idx] = option,
                Some(_) => {}
                None => {
                    by_label.insert(label, options.len());
                    options.push(option);
                }
            }
        }
        Ok(options)
    }

    /// Items offered only as package action items (`proposal_mode = neither`).
    pub fn available_action_items_for_package(
        &self,
        partner_id: Option<i64>,
    ) -> Result<Vec<ActionItemOption>> {
        let mut values = Vec::new();
        let scope = partner_scope(partner_id, &mut values);
        let sql = format!(
            "SELECT id, name, description, partner_entity_id FROM service_items
             WHERE is_active = 1 AND proposal_mode = 'neither' AND {}
             ORDER BY name",
            scope
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare available_action_items_for_package")?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                let name: String = row.get(1)?;
                let partner: Option<i64> = row.get(3)?;
                Ok(ActionItemOption {
                    id: row.get(0)?,
                    name: starred(name.clone(), partner.is_some()),
                    title: name,
                    description: row.get(2)?,
                    is_partner_specific: partner.is_some(),
                })
            })
            .context("Failed to query action items")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read action item row")
    }
}

const ITEM_COLUMNS: &[&str] = &[
    "name",
    "service_category",
    "service_category_id",
    "service_label",
    "type",
    "description",
    "sop_url",
    "min_pricing_usd_cents",
    "est_cogs_usd_cents",
    "est_time_minutes",
    "recommended_price_cents",
    "recommended_price_currency",
    "partner_entity_id",
    "is_active",
    "service_scope",
    "is_billable",
    "proposal_mode",
    "package_display",
    "mcp_display",
    "in_stream",
    "generate_task",
];

#[cfg(test)]
pub(crate) mod tests {
    use super::super::testing::seed_author;
    use super::*;
    use crate::portal::models::{PartnerForm, ServiceCategoryForm};

    pub(crate) fn item_form(name: &str, label: &str, mode: ProposalMode) -> ServiceItemForm {
        ServiceItemForm {
            name: name.to_string(),
            service_label: Some(label.to_string()),
            proposal_mode: Some(mode),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_converts_dollars_and_resolves_category() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let category = db.create_service_category(
            &ServiceCategoryForm {
                key: "seo".to_string(),
                display_name: "SEO".to_string(),
                description: None,
            },
            &author,
        )?;

        let mut form = item_form("Citation cleanup", "citations", ProposalMode::Both);
        form.service_category = Some("seo".to_string());
        form.budget_amount_dollars = Some(19.99);
        form.est_cogs_dollars = Some(0.0);
        form.recommended_price_dollars = Some(250.0);
        let item = db.create_service_item(&form, &author)?;

        assert_eq!(item.service_category_id, Some(category.id));
        assert_eq!(item.service_category_name.as_deref(), Some("SEO"));
        assert_eq!(item.min_pricing_usd_cents, Some(1999));
        assert_eq!(item.est_cogs_usd_cents, None);
        assert_eq!(item.recommended_price_cents, Some(25000));
        assert_eq!(item.service_scope, ServiceScope::Campaign);
        assert!(item.is_active);

        let mut unknown = item_form("Other", "other", ProposalMode::Both);
        unknown.service_category = Some("nope".to_string());
        assert_eq!(db.create_service_item(&unknown, &author)?.service_category_id, None);
        Ok(())
    }

    #[test]
    fn test_update_item_and_inactive_listing() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let item = db.create_service_item(&item_form("Audit", "audit", ProposalMode::Both), &author)?;

        let mut form = item_form("Site audit", "audit", ProposalMode::OneTime);
        form.is_active = Some(false);
        let updated = db.update_service_item(item.id, &form, &author)?;
        assert_eq!(updated.name, "Site audit");
        assert_eq!(updated.proposal_mode, ProposalMode::OneTime);

        assert!(db.list_service_items(false)?.is_empty());
        assert_eq!(db.list_service_items(true)?.len(), 1);
        assert!(db.update_service_item(999, &form, &author).is_err());
        Ok(())
    }

    #[test]
    fn test_available_for_package_prefers_partner_items() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let partner = db.save_partner(
            None,
            &PartnerForm {
                name: "Acme".to_string(),
                ..Default::default()
            },
            &author,
        )?;

        db.create_service_item(&item_form("Blog posts", "content", ProposalMode::Recurring), &author)?;
        db.create_service_item(&item_form("Audit", "audit", ProposalMode::OneTime), &author)?;
        db.create_service_item(&item_form("Links", "links", ProposalMode::Both), &author)?;
        let mut custom = item_form("Acme blog", "content", ProposalMode::Both);
        custom.partner_entity_id = Some(partner);
        db.create_service_item(&custom, &author)?;

        let core = db.available_for_package(None, Some(ServiceType::Ongoing))?;
        let names: Vec<&str> = core.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Blog posts", "Links"]);

        let scoped = db.available_for_package(Some(partner), Some(ServiceType::Ongoing))?;
        let names: Vec<&str> = scoped.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["*Acme blog", "Links"]);
        assert!(scoped[0].is_partner_specific);

        let one_time = db.available_for_package(Some(partner), Some(ServiceType::OneTime))?;
        let names: Vec<&str> = one_time.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Audit", "Links", "*Acme blog"]);
        Ok(())
    }

    #[test]
    fn test_action_items_only_neither_mode() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        db.create_service_item(&item_form("Kickoff call", "kickoff", ProposalMode::Neither), &author)?;
        db.create_service_item(&item_form("Audit", "audit", ProposalMode::Both), &author)?;

        let items = db.available_action_items_for_package(None)?;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Kickoff call");
        assert!(!items[0].is_partner_specific);
        Ok(())
    }
}
