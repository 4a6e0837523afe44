use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params};

use super::{FieldKind, PortalDb, field_update, non_empty, now_ts, update_columns};
use crate::errors::PortalError;
use crate::portal::models::{Author, CampaignProfile};

const PROFILE_COLUMNS: &str = "id, name, label, short_description, long_description, criteria, \
     examples, seo_growth_opportunities, common_challenges, campaign_considerations, \
     presale_considerations, phase_one_outline, ongoing_phase_outline, is_active, created_at, \
     created_by, updated_at, updated_by";

/// Columns the profile editor may change one at a time.
const EDITABLE_FIELDS: &[(&str, FieldKind)] = &[
    ("name", FieldKind::Text),
    ("label", FieldKind::Text),
    ("short_description", FieldKind::Text),
    ("long_description", FieldKind::Text),
    ("criteria", FieldKind::Text),
    ("examples", FieldKind::Text),
    ("seo_growth_opportunities", FieldKind::Text),
    ("common_challenges", FieldKind::Text),
    ("campaign_considerations", FieldKind::Text),
    ("presale_considerations", FieldKind::Text),
    ("phase_one_outline", FieldKind::Text),
    ("ongoing_phase_outline", FieldKind::Text),
    ("is_active", FieldKind::Bool),
];

fn map_profile(row: &Row<'_>) -> rusqlite::Result<CampaignProfile> {
    Ok(CampaignProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        label: row.get(2)?,
        short_description: row.get(3)?,
        long_description: row.get(4)?,
        criteria: row.get(5)?,
        examples: row.get(6)?,
        seo_growth_opportunities: row.get(7)?,
        common_challenges: row.get(8)?,
        campaign_considerations: row.get(9)?,
        presale_considerations: row.get(10)?,
        phase_one_outline: row.get(11)?,
        ongoing_phase_outline: row.get(12)?,
        is_active: row.get(13)?,
        created_at: row.get(14)?,
        created_by: row.get(15)?,
        updated_at: row.get(16)?,
        updated_by: row.get(17)?,
    })
}

impl PortalDb {
    /// Active profiles, or with `include_inactive` only the inactive ones.
    pub fn list_campaign_profiles(&self, include_inactive: bool) -> Result<Vec<CampaignProfile>> {
        let sql = format!(
            "SELECT {} FROM campaign_profiles WHERE is_active = ?1 ORDER BY name",
            PROFILE_COLUMNS
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_campaign_profiles")?;
        let rows = stmt
            .query_map(params![!include_inactive], map_profile)
            .context("Failed to query campaign profiles")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read campaign profile row")
    }

    pub fn get_campaign_profile(&self, id: i64) -> Result<Option<CampaignProfile>> {
        let sql = format!(
            "SELECT {} FROM campaign_profiles WHERE id = ?1",
            PROFILE_COLUMNS
        );
        self.conn
            .query_row(&sql, params![id], map_profile)
            .optional()
            .context("Failed to query campaign profile")
    }

    pub fn create_campaign_profile(
        &self,
        name: &str,
        short_description: Option<&str>,
        by: &Author,
    ) -> Result<CampaignProfile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PortalError::validation("Profile name is required").into());
        }
        let now = now_ts();
        self.conn
            .execute(
                "INSERT INTO campaign_profiles (name, short_description, created_at, created_by, updated_at, updated_by)
                 VALUES (?1, ?2, ?3, ?4, ?3, ?4)",
                params![name, non_empty(short_description), now, by.entity_id],
            )
            .context("Failed to insert campaign profile")?;
        let id = self.conn.last_insert_rowid();
        tracing::info!(profile_id = id, "Campaign profile created");
        self.get_campaign_profile(id)?
            .context("Campaign profile not found after insert")
    }

    pub fn update_campaign_profile_field(
        &self,
        id: i64,
        field: &str,
        value: &serde_json::Value,
        by: &Author,
    ) -> Result<CampaignProfile> {
        let (column, value) = field_update(EDITABLE_FIELDS, field, value)?;
        if column == "name" && value == Value::Null {
            return Err(PortalError::validation("Profile name is required").into());
        }
        let changed = update_columns(
            &self.conn,
            "campaign_profiles",
            "id",
            id,
            vec![
                (column, value),
                ("updated_at", Value::Text(now_ts())),
                ("updated_by", Value::Integer(by.entity_id)),
            ],
        )
        .context("Failed to update campaign profile")?;
        if changed == 0 {
            return Err(PortalError::not_found("Campaign profile", id).into());
        }
        tracing::debug!(profile_id = id, field = column, "Campaign profile field updated");
        self.get_campaign_profile(id)?
            .context("Campaign profile not found after update")
    }

    /// Hard delete. Campaigns, packages and templates keep their rows with
    /// the reference cleared; profile-scoped permissions are removed.
    pub fn delete_campaign_profile(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("DELETE FROM campaign_profiles WHERE id = ?1", params![id])
            .context("Failed to delete campaign profile")?;
        if changed == 0 {
            return Err(PortalError::not_found("Campaign profile", id).into());
        }
        tracing::info!(profile_id = id, "Campaign profile deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::seed_author;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_and_list_profiles() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        db.create_campaign_profile("Local SEO", Some("Maps and reviews"), &author)?;
        let hidden = db.create_campaign_profile("Ecommerce", None, &author)?;
        db.update_campaign_profile_field(hidden.id, "is_active", &json!(false), &author)?;

        let active: Vec<String> = db
            .list_campaign_profiles(false)?
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(active, vec!["Local SEO"]);

        let inactive = db.list_campaign_profiles(true)?;
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].name, "Ecommerce");
        Ok(())
    }

    #[test]
    fn test_update_field_whitelist() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let profile = db.create_campaign_profile("Local SEO", None, &author)?;

        let updated = db.update_campaign_profile_field(
            profile.id,
            "phase_one_outline",
            &json!("Audit, then fix citations"),
            &author,
        )?;
        assert_eq!(
            updated.phase_one_outline.as_deref(),
            Some("Audit, then fix citations")
        );

        let err = db
            .update_campaign_profile_field(profile.id, "created_by", &json!(7), &author)
            .unwrap_err();
        assert!(err.to_string().contains("cannot be updated"));

        assert!(
            db.update_campaign_profile_field(profile.id, "name", &json!(""), &author)
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn test_delete_profile_clears_references() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let profile = db.create_campaign_profile("Local SEO", None, &author)?;
        let partner = db.save_partner(
            None,
            &crate::portal::models::PartnerForm {
                name: "Acme".to_string(),
                ..Default::default()
            },
            &author,
        )?;
        let campaign =
            db.create_campaign(partner, "https://a.example", None, Some(profile.id), &author)?;

        db.delete_campaign_profile(profile.id)?;
        assert!(db.get_campaign_profile(profile.id)?.is_none());
        assert_eq!(db.get_campaign(campaign.id)?.unwrap().campaign_profile_id, None);

        let err = db.delete_campaign_profile(profile.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::NotFound { .. })
        ));
        Ok(())
    }
}
