use anyhow::{Context, Result};
use portal_common::templates::{derive_template_category, scope_id};
use portal_common::{ActivityType, RelatedTable};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params};

use super::{PortalDb, enum_col, non_empty, now_ts, text_value, update_columns};
use crate::errors::PortalError;
use crate::portal::models::{Author, NewActivity, TaskTemplate, TaskTemplateForm, TaskTemplatePatch};

const TEMPLATE_SELECT: &str = "
    SELECT tt.id, tt.type, tt.title, tt.description, tt.key, tt.primary_participant, tt.grouping,
           tt.est_time_minutes, tt.sop_url, tt.sop_id, tt.gold_standard_url, tt.template_category,
           tt.partner_entity_id, pe.name, tt.campaign_profile_id, cp.name,
           tt.service_category_id, sc.display_name, tt.mandatory, tt.decision_point, tt.active,
           tt.created_at, tt.created_by, tt.updated_at, tt.updated_by, u.name
    FROM task_templates tt
    LEFT JOIN entities pe ON pe.id = tt.partner_entity_id
    LEFT JOIN campaign_profiles cp ON cp.id = tt.campaign_profile_id
    LEFT JOIN service_categories sc ON sc.id = tt.service_category_id
    LEFT JOIN entities u ON u.id = tt.updated_by";

fn map_template(row: &Row<'_>) -> rusqlite::Result<TaskTemplate> {
    Ok(TaskTemplate {
        id: row.get(0)?,
        template_type: enum_col(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        key: row.get(4)?,
        primary_participant: enum_col(row, 5)?,
        grouping: enum_col(row, 6)?,
        est_time_minutes: row.get(7)?,
        sop_url: row.get(8)?,
        sop_id: row.get(9)?,
        gold_standard_url: row.get(10)?,
        template_category: enum_col(row, 11)?,
        partner_entity_id: row.get(12)?,
        partner_name: row.get(13)?,
        campaign_profile_id: row.get(14)?,
        campaign_profile_name: row.get(15)?,
        service_category_id: row.get(16)?,
        service_category_name: row.get(17)?,
        mandatory: row.get(18)?,
        decision_point: row.get(19)?,
        active: row.get(20)?,
        created_at: row.get(21)?,
        created_by: row.get(22)?,
        updated_at: row.get(23)?,
        updated_by: row.get(24)?,
        updated_by_name: row.get(25)?,
    })
}

fn display_title(title: &str) -> &str {
    match title.trim() {
        "" => "Untitled",
        t => t,
    }
}

impl PortalDb {
    /// Active templates, or with `include_inactive` only the inactive ones,
    /// oldest first.
    pub fn list_task_templates(&self, include_inactive: bool) -> Result<Vec<TaskTemplate>> {
        let sql = format!(
            "{} WHERE tt.active = ?1 ORDER BY tt.created_at, tt.id",
            TEMPLATE_SELECT
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_task_templates")?;
        let rows = stmt
            .query_map(params![!include_inactive], map_template)
            .context("Failed to query task templates")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read task template row")
    }

    pub fn get_task_template(&self, id: i64) -> Result<Option<TaskTemplate>> {
        let sql = format!("{} WHERE tt.id = ?1", TEMPLATE_SELECT);
        self.conn
            .query_row(&sql, params![id], map_template)
            .optional()
            .context("Failed to query task template")
    }

    /// True when no active template in the same partner scope uses `key`.
    /// A `None` partner only collides with other core templates.
    pub fn is_task_template_key_unique(
        &self,
        key: &str,
        partner_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM task_templates
                 WHERE key = ?1 AND active = 1 AND partner_entity_id IS ?2
                   AND (?3 IS NULL OR id != ?3)",
                params![key.trim(), scope_id(partner_id), exclude_id],
                |row| row.get(0),
            )
            .context("Failed to check task template key")?;
        Ok(count == 0)
    }

    fn ensure_template_key_unique(
        &self,
        key: &str,
        partner_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<()> {
        if !self.is_task_template_key_unique(key, partner_id, exclude_id)? {
            tracing::warn!(key, ?partner_id, "Task template key already in use");
            return Err(PortalError::DuplicateKey {
                key: key.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn create_task_template(
        &self,
        form: &TaskTemplateForm,
        by: &Author,
    ) -> Result<TaskTemplate> {
        let title = form.title.trim();
        if title.is_empty() {
            return Err(PortalError::validation("Title is required").into());
        }
        let partner_id = scope_id(form.partner_entity_id);
        let profile_id = scope_id(form.campaign_profile_id);
        let key = non_empty(form.key.as_deref());
        if let Some(key) = key {
            self.ensure_template_key_unique(key, partner_id, None)?;
        }
        let category = derive_template_category(partner_id, profile_id);

        let now = now_ts();
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO task_templates (type, title, description, key, primary_participant,
                grouping, est_time_minutes, sop_url, sop_id, gold_standard_url, template_category,
                partner_entity_id, campaign_profile_id, service_category_id, mandatory,
                decision_point, created_at, created_by, updated_at, updated_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?17, ?18)",
            params![
                form.template_type.as_str(),
                title,
                non_empty(form.description.as_deref()),
                key,
                form.primary_participant.as_str(),
                form.grouping.as_str(),
                form.est_time_minutes,
                non_empty(form.sop_url.as_deref()),
                form.sop_id,
                non_empty(form.gold_standard_url.as_deref()),
                category.as_str(),
                partner_id,
                profile_id,
                scope_id(form.service_category_id),
                form.mandatory,
                form.decision_point,
                now,
                by.entity_id,
            ],
        )
        .context("Failed to insert task template")?;
        let id = tx.last_insert_rowid();
        self.create_activity(
            &NewActivity::new(by, ActivityType::CreatedTemplate, RelatedTable::TaskTemplates, id)
                .partner(partner_id)
                .details(title),
        )?;
        tx.commit().context("Failed to commit task template")?;

        tracing::info!(template_id = id, category = %category, "Task template created");
        self.get_task_template(id)?
            .context("Task template not found after insert")
    }

    /// Apply the provided fields. The category follows the merged partner and
    /// profile scope whenever either is part of the patch.
    pub fn update_task_template(
        &self,
        id: i64,
        patch: &TaskTemplatePatch,
        by: &Author,
    ) -> Result<TaskTemplate> {
        let existing = self
            .get_task_template(id)?
            .ok_or(PortalError::not_found("Task template", id))?;

        let mut cols: Vec<(&str, Value)> = Vec::new();
        if let Some(t) = patch.template_type {
            cols.push(("type", Value::Text(t.as_str().to_string())));
        }
        let mut title = existing.title.clone();
        if let Some(new_title) = patch.title.as_deref() {
            match non_empty(Some(new_title)) {
                Some(t) => {
                    title = t.to_string();
                    cols.push(("title", Value::Text(title.clone())));
                }
                None => return Err(PortalError::validation("Title cannot be empty").into()),
            }
        }
        if patch.description.is_some() {
            cols.push(("description", text_value(patch.description.as_deref())));
        }
        if let Some(p) = patch.primary_participant {
            cols.push(("primary_participant", Value::Text(p.as_str().to_string())));
        }
        if let Some(g) = patch.grouping {
            cols.push(("grouping", Value::Text(g.as_str().to_string())));
        }
        if let Some(minutes) = patch.est_time_minutes {
            cols.push(("est_time_minutes", Value::Integer(minutes)));
        }
        if patch.sop_url.is_some() {
            cols.push(("sop_url", text_value(patch.sop_url.as_deref())));
        }
        if let Some(sop_id) = patch.sop_id {
            cols.push(("sop_id", scope_value(sop_id)));
        }
        if patch.gold_standard_url.is_some() {
            cols.push(("gold_standard_url", text_value(patch.gold_standard_url.as_deref())));
        }
        if let Some(category_id) = patch.service_category_id {
            cols.push(("service_category_id", scope_value(category_id)));
        }
        if let Some(mandatory) = patch.mandatory {
            cols.push(("mandatory", Value::Integer(i64::from(mandatory))));
        }
        if let Some(decision) = patch.decision_point {
            cols.push(("decision_point", Value::Integer(i64::from(decision))));
        }

        let partner_id = match patch.partner_entity_id {
            Some(p) => scope_id(Some(p)),
            None => existing.partner_entity_id,
        };
        let profile_id = match patch.campaign_profile_id {
            Some(p) => scope_id(Some(p)),
            None => existing.campaign_profile_id,
        };
        if patch.partner_entity_id.is_some() || patch.campaign_profile_id.is_some() {
            let category = derive_template_category(partner_id, profile_id);
            cols.push(("partner_entity_id", opt_int(partner_id)));
            cols.push(("campaign_profile_id", opt_int(profile_id)));
            cols.push(("template_category", Value::Text(category.as_str().to_string())));
        }

        let key = match patch.key.as_deref() {
            Some(k) => {
                let key = non_empty(Some(k)).map(str::to_string);
                cols.push(("key", key.clone().map_or(Value::Null, Value::Text)));
                key
            }
            None => existing.key.clone(),
        };
        let key_changed = key != existing.key || partner_id != existing.partner_entity_id;
        if let Some(key) = key.as_deref().filter(|_| key_changed) {
            self.ensure_template_key_unique(key, partner_id, Some(id))?;
        }

        cols.push(("updated_at", Value::Text(now_ts())));
        cols.push(("updated_by", Value::Integer(by.entity_id)));

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        update_columns(&tx, "task_templates", "id", id, cols)
            .context("Failed to update task template")?;
        self.create_activity(
            &NewActivity::new(by, ActivityType::UpdatedTemplate, RelatedTable::TaskTemplates, id)
                .partner(partner_id)
                .details(display_title(&title)),
        )?;
        tx.commit().context("Failed to commit task template")?;

        tracing::info!(template_id = id, "Task template updated");
        self.get_task_template(id)?
            .context("Task template not found after update")
    }

    pub fn deactivate_task_template(&self, id: i64, by: &Author) -> Result<()> {
        self.set_task_template_active(id, false, by)
    }

    pub fn activate_task_template(&self, id: i64, by: &Author) -> Result<()> {
        self.set_task_template_active(id, true, by)
    }

    fn set_task_template_active(&self, id: i64, active: bool, by: &Author) -> Result<()> {
        let template = self
            .get_task_template(id)?
            .ok_or(PortalError::not_found("Task template", id))?;
        let activity_type = if active {
            ActivityType::UpdatedTemplate
        } else {
            ActivityType::DeletedTemplate
        };

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE task_templates SET active = ?1, updated_at = ?2, updated_by = ?3 WHERE id = ?4",
            params![active, now_ts(), by.entity_id, id],
        )
        .context("Failed to update task template status")?;
        self.create_activity(
            &NewActivity::new(by, activity_type, RelatedTable::TaskTemplates, id)
                .partner(template.partner_entity_id)
                .details(display_title(&template.title)),
        )?;
        tx.commit().context("Failed to commit task template status")?;

        tracing::info!(template_id = id, active, "Task template status changed");
        Ok(())
    }
}

/// `0` from a cleared dropdown means no scope.
fn scope_value(id: i64) -> Value {
    opt_int(scope_id(Some(id)))
}

fn opt_int(id: Option<i64>) -> Value {
    id.map_or(Value::Null, Value::Integer)
}

#[cfg(test)]
mod tests {
    use super::super::testing::seed_author;
    use super::*;
    use crate::portal::models::{PartnerForm, ServiceCategoryForm};
    use portal_common::{PrimaryParticipant, TaskGrouping, TaskTemplateType, TemplateCategory};

    fn form(title: &str, key: Option<&str>, partner: Option<i64>) -> TaskTemplateForm {
        TaskTemplateForm {
            template_type: TaskTemplateType::PartnerOnboarding,
            title: title.to_string(),
            description: None,
            key: key.map(str::to_string),
            primary_participant: PrimaryParticipant::AccountManager,
            grouping: TaskGrouping::PoAdmin,
            est_time_minutes: Some(30),
            sop_url: None,
            sop_id: None,
            gold_standard_url: None,
            partner_entity_id: partner,
            campaign_profile_id: None,
            service_category_id: None,
            mandatory: false,
            decision_point: false,
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

    #[test]
    fn test_create_derives_category_and_logs() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let partner = seed_partner(&db, &author)?;

        let core = db.create_task_template(&form("Kickoff call", Some("kickoff"), None), &author)?;
        assert_eq!(core.template_category, TemplateCategory::Default);

        let scoped =
            db.create_task_template(&form("Partner kickoff", Some("kickoff"), Some(partner)), &author)?;
        assert_eq!(scoped.template_category, TemplateCategory::PartnerSpecific);

        let zero = db.create_task_template(&form("Zero ids", None, Some(0)), &author)?;
        assert_eq!(zero.partner_entity_id, None);
        assert_eq!(zero.template_category, TemplateCategory::Default);

        let log = db.activities_for_item(RelatedTable::TaskTemplates, scoped.id)?;
        assert_eq!(log[0].activity_type, ActivityType::CreatedTemplate);
        assert_eq!(log[0].details.as_deref(), Some("Partner kickoff"));
        assert_eq!(log[0].partner_id, Some(partner));
        Ok(())
    }

    #[test]
    fn test_key_uniqueness_is_scoped_to_partner_and_active_rows() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let partner = seed_partner(&db, &author)?;

        let first = db.create_task_template(&form("Kickoff", Some("kickoff"), None), &author)?;
        assert!(!db.is_task_template_key_unique("kickoff", None, None)?);
        assert!(db.is_task_template_key_unique("kickoff", None, Some(first.id))?);
        assert!(db.is_task_template_key_unique("kickoff", Some(partner), None)?);

        let err = db
            .create_task_template(&form("Again", Some("kickoff"), None), &author)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::DuplicateKey { key }) if key == "kickoff"
        ));

        db.deactivate_task_template(first.id, &author)?;
        assert!(db.is_task_template_key_unique("kickoff", None, None)?);
        Ok(())
    }

    #[test]
    fn test_update_recomputes_category_from_merged_scope() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let partner = seed_partner(&db, &author)?;
        let profile = db.create_campaign_profile("Local SEO", None, &author)?;

        let template =
            db.create_task_template(&form("Audit", Some("audit"), Some(partner)), &author)?;

        let updated = db.update_task_template(
            template.id,
            &TaskTemplatePatch {
                campaign_profile_id: Some(profile.id),
                ..Default::default()
            },
            &author,
        )?;
        assert_eq!(
            updated.template_category,
            TemplateCategory::PartnerCampaignProfileSpecific
        );
        assert_eq!(updated.partner_entity_id, Some(partner));

        let cleared = db.update_task_template(
            template.id,
            &TaskTemplatePatch {
                partner_entity_id: Some(0),
                title: Some("Site audit".to_string()),
                ..Default::default()
            },
            &author,
        )?;
        assert_eq!(cleared.partner_entity_id, None);
        assert_eq!(
            cleared.template_category,
            TemplateCategory::CampaignProfileSpecific
        );
        assert_eq!(cleared.title, "Site audit");
        assert_eq!(cleared.est_time_minutes, Some(30));

        let untouched = db.update_task_template(
            template.id,
            &TaskTemplatePatch {
                mandatory: Some(true),
                ..Default::default()
            },
            &author,
        )?;
        assert_eq!(
            untouched.template_category,
            TemplateCategory::CampaignProfileSpecific
        );
        assert!(untouched.mandatory);
        Ok(())
    }

    #[test]
    fn test_update_sets_and_clears_sop_id() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let template = db.create_task_template(&form("Kickoff", None, None), &author)?;
        assert_eq!(template.sop_id, None);

        let linked = db.update_task_template(
            template.id,
            &TaskTemplatePatch {
                sop_id: Some(42),
                ..Default::default()
            },
            &author,
        )?;
        assert_eq!(linked.sop_id, Some(42));

        let kept = db.update_task_template(
            template.id,
            &TaskTemplatePatch {
                title: Some("Kickoff call".to_string()),
                ..Default::default()
            },
            &author,
        )?;
        assert_eq!(kept.sop_id, Some(42));

        let cleared = db.update_task_template(
            template.id,
            &TaskTemplatePatch {
                sop_id: Some(0),
                ..Default::default()
            },
            &author,
        )?;
        assert_eq!(cleared.sop_id, None);
        Ok(())
    }

    #[test]
    fn test_templates_carry_related_names() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let partner = seed_partner(&db, &author)?;
        let profile = db.create_campaign_profile("Local SEO", None, &author)?;
        let category = db.create_service_category(
            &ServiceCategoryForm {
                key: "content".to_string(),
                display_name: "Content".to_string(),
                description: None,
            },
            &author,
        )?;

        let mut scoped = form("Audit", None, Some(partner));
        scoped.campaign_profile_id = Some(profile.id);
        scoped.service_category_id = Some(category.id);
        let created = db.create_task_template(&scoped, &author)?;
        db.create_task_template(&form("Kickoff", None, None), &author)?;

        assert_eq!(created.partner_name.as_deref(), Some("Acme"));
        assert_eq!(created.campaign_profile_name.as_deref(), Some("Local SEO"));
        assert_eq!(created.service_category_name.as_deref(), Some("Content"));
        assert_eq!(created.updated_by_name.as_deref(), Some("Test Author"));

        let listed = db.list_task_templates(false)?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].partner_name.as_deref(), Some("Acme"));
        assert_eq!(listed[1].partner_name, None);
        assert_eq!(listed[1].service_category_name, None);
        assert_eq!(listed[1].updated_by_name.as_deref(), Some("Test Author"));
        Ok(())
    }

    #[test]
    fn test_update_rechecks_changed_key() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        db.create_task_template(&form("Kickoff", Some("kickoff"), None), &author)?;
        let other = db.create_task_template(&form("Audit", Some("audit"), None), &author)?;

        let same = db.update_task_template(
            other.id,
            &TaskTemplatePatch {
                key: Some("audit".to_string()),
                ..Default::default()
            },
            &author,
        )?;
        assert_eq!(same.key.as_deref(), Some("audit"));

        let err = db
            .update_task_template(
                other.id,
                &TaskTemplatePatch {
                    key: Some("kickoff".to_string()),
                    ..Default::default()
                },
                &author,
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::DuplicateKey { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_activate_and_deactivate() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let template = db.create_task_template(&form("Kickoff", None, None), &author)?;

        db.deactivate_task_template(template.id, &author)?;
        assert!(db.list_task_templates(false)?.is_empty());
        assert_eq!(db.list_task_templates(true)?.len(), 1);

        db.activate_task_template(template.id, &author)?;
        assert!(db.get_task_template(template.id)?.unwrap().active);

        let types: Vec<ActivityType> = db
            .activities_for_item(RelatedTable::TaskTemplates, template.id)?
            .into_iter()
            .map(|a| a.activity_type)
            .collect();
        assert_eq!(
            types,
            vec![
                ActivityType::UpdatedTemplate,
                ActivityType::DeletedTemplate,
                ActivityType::CreatedTemplate
            ]
        );

        assert!(db.deactivate_task_template(404, &author).is_err());
        Ok(())
    }
}
