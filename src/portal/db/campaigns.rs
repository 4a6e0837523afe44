use anyhow::{Context, Result};
use portal_common::{ActivityType, CampaignStatus, RelatedTable};
use rusqlite::{OptionalExtension, Row, params};

use super::{PortalDb, enum_col, now_ts};
use crate::errors::PortalError;
use crate::portal::models::{Author, Campaign, NewActivity};

fn map_campaign(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: row.get(0)?,
        partner_entity_id: row.get(1)?,
        site_url: row.get(2)?,
        status: enum_col(row, 3)?,
        campaign_profile_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl PortalDb {
    pub fn create_campaign(
        &self,
        partner_id: i64,
        site_url: &str,
        status: Option<CampaignStatus>,
        campaign_profile_id: Option<i64>,
        by: &Author,
    ) -> Result<Campaign> {
        let site_url = site_url.trim();
        if site_url.is_empty() {
            return Err(PortalError::validation("Site URL is required").into());
        }
        if self.get_partner(partner_id)?.is_none() {
            return Err(PortalError::not_found("Partner", partner_id).into());
        }
        let campaign_profile_id = campaign_profile_id.filter(|id| *id != 0);
        self.require_ref(
            "Campaign profile",
            "campaign_profiles",
            "id",
            campaign_profile_id,
        )?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO campaigns (partner_entity_id, site_url, status, campaign_profile_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                partner_id,
                site_url,
                status.unwrap_or(CampaignStatus::Prospect).as_str(),
                campaign_profile_id
            ],
        )
        .context("Failed to insert campaign")?;
        let id = tx.last_insert_rowid();
        self.create_activity(
            &NewActivity::new(by, ActivityType::CampaignCreated, RelatedTable::Campaigns, id)
                .partner(Some(partner_id))
                .details(site_url),
        )?;
        tx.commit().context("Failed to commit campaign")?;

        tracing::info!(campaign_id = id, partner_id, "Campaign created");
        self.get_campaign(id)?
            .context("Campaign not found after insert")
    }

    pub fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        self.conn
            .query_row(
                "SELECT id, partner_entity_id, site_url, status, campaign_profile_id, created_at, updated_at
                 FROM campaigns WHERE id = ?1",
                params![id],
                map_campaign,
            )
            .optional()
            .context("Failed to query campaign")
    }

    pub fn list_campaigns_for_partner(&self, partner_id: i64) -> Result<Vec<Campaign>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, partner_entity_id, site_url, status, campaign_profile_id, created_at, updated_at
                 FROM campaigns WHERE partner_entity_id = ?1 ORDER BY created_at, id",
            )
            .context("Failed to prepare list_campaigns_for_partner")?;
        let rows = stmt
            .query_map(params![partner_id], map_campaign)
            .context("Failed to query campaigns")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read campaign row")
    }

    pub fn update_campaign_status(
        &self,
        id: i64,
        status: CampaignStatus,
        by: &Author,
    ) -> Result<Campaign> {
        let campaign = self
            .get_campaign(id)?
            .ok_or(PortalError::not_found("Campaign", id))?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "UPDATE campaigns SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_ts(), id],
        )
        .context("Failed to update campaign status")?;
        self.create_activity(
            &NewActivity::new(by, ActivityType::CampaignUpdated, RelatedTable::Campaigns, id)
                .partner(Some(campaign.partner_entity_id))
                .details(format!("Status changed from {} to {}", campaign.status, status)),
        )?;
        tx.commit().context("Failed to commit campaign status")?;

        tracing::info!(campaign_id = id, status = %status, "Campaign status updated");
        self.get_campaign(id)?
            .context("Campaign not found after update")
    }
}
