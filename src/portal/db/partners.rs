use std::collections::BTreeMap;

use anyhow::{Context, Result};
use portal_common::{
    ActivityType, ContactType, EntityType, NoteEntityType, NoteType, PartnerStatus,
    RelatedTable, RelationshipSubtype, RelationshipType,
};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params};

use super::{PortalDb, enum_col, non_empty, now_ts, opt_enum_col, text_value, update_columns};
use crate::errors::PortalError;
use crate::portal::models::*;

const SUMMARY_SELECT: &str = "
    SELECT p.entity_id, e.name, p.external_id, p.status, p.partner_type,
           p.total_monthly_revenue, p.available_currencies, p.default_currency,
           p.is_onboarded, p.created_at, p.updated_at
    FROM partners p
    JOIN entities e ON e.id = p.entity_id";

const DETAIL_SELECT: &str = "
    SELECT p.entity_id, e.name, e.netsuite_id, e.avatar_url, p.status, p.partner_type,
           p.msa_signed, p.msa_signed_date, p.demo_date, p.demo_by_entity_id, p.start_date,
           p.acquisition_source, p.total_monthly_revenue, p.available_currencies,
           p.default_currency, p.analytics_folder_id, p.google_drive_link, p.external_id,
           p.is_onboarded, c.legal_name, c.industry, c.size, c.business_registration_number,
           r.id, r.child_entity_id, m.name, bc.id, bc.contact_value,
           p.created_at, p.updated_at
    FROM partners p
    JOIN entities e ON e.id = p.entity_id
    LEFT JOIN companies c ON c.entity_id = p.entity_id
    LEFT JOIN entity_relationships r
           ON r.parent_entity_id = p.entity_id AND r.relationship_type = 'account_manager'
    LEFT JOIN entities m ON m.id = r.child_entity_id
    LEFT JOIN entity_contacts bc
           ON bc.entity_id = p.entity_id AND bc.contact_type = 'address' AND bc.contact_label = 'billing'";

fn map_summary(row: &Row<'_>) -> rusqlite::Result<PartnerSummary> {
    let available_currencies: Option<String> = row.get(6)?;
    Ok(PartnerSummary {
        entity_id: row.get(0)?,
        name: row.get(1)?,
        external_id: row.get(2)?,
        status: enum_col(row, 3)?,
        partner_type: opt_enum_col(row, 4)?,
        total_monthly_revenue: row.get(5)?,
        available_currencies_list: split_currencies(available_currencies.as_deref()),
        available_currencies,
        default_currency: row.get(7)?,
        is_onboarded: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn map_partner(row: &Row<'_>) -> rusqlite::Result<Partner> {
    let available_currencies: Option<String> = row.get(13)?;
    Ok(Partner {
        entity_id: row.get(0)?,
        name: row.get(1)?,
        netsuite_id: row.get(2)?,
        avatar_url: row.get(3)?,
        status: enum_col(row, 4)?,
        partner_type: opt_enum_col(row, 5)?,
        msa_signed: row.get(6)?,
        msa_signed_date: row.get(7)?,
        demo_date: row.get(8)?,
        demo_by_entity_id: row.get(9)?,
        start_date: row.get(10)?,
        acquisition_source: row.get(11)?,
        total_monthly_revenue: row.get(12)?,
        available_currencies_list: split_currencies(available_currencies.as_deref()),
        available_currencies,
        default_currency: row.get(14)?,
        analytics_folder_id: row.get(15)?,
        google_drive_link: row.get(16)?,
        external_id: row.get(17)?,
        is_onboarded: row.get(18)?,
        legal_name: row.get(19)?,
        industry: row.get(20)?,
        size: row.get(21)?,
        business_registration_number: row.get(22)?,
        account_manager_relationship_id: row.get(23)?,
        account_manager_id: row.get(24)?,
        account_manager_name: row.get(25)?,
        billing_address_id: row.get(26)?,
        billing_address: row.get(27)?,
        created_at: row.get(28)?,
        updated_at: row.get(29)?,
    })
}

fn map_employee(row: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        entity_id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        title: row.get(3)?,
        status: row.get(4)?,
        external_auth_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl PortalDb {
    // ── Employees ─────────────────────────────────────────────────────

    pub fn create_employee(
        &self,
        first_name: &str,
        last_name: &str,
        title: Option<&str>,
        external_auth_id: Option<&str>,
    ) -> Result<Employee> {
        let first_name = first_name.trim();
        let last_name = last_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(PortalError::validation("First and last name are required").into());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO entities (entity_type, name) VALUES (?1, ?2)",
            params![
                EntityType::Employee.as_str(),
                format!("{} {}", first_name, last_name)
            ],
        )
        .context("Failed to insert employee entity")?;
        let entity_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO employees (entity_id, first_name, last_name, title, external_auth_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entity_id,
                first_name,
                last_name,
                non_empty(title),
                non_empty(external_auth_id)
            ],
        )
        .context("Failed to insert employee")?;
        tx.commit().context("Failed to commit employee")?;

        self.get_employee(entity_id)?
            .context("Employee not found after insert")
    }

    pub fn get_employee(&self, entity_id: i64) -> Result<Option<Employee>> {
        self.conn
            .query_row(
                "SELECT entity_id, first_name, last_name, title, status, external_auth_id, e.created_at
                 FROM employees JOIN entities e ON e.id = employees.entity_id
                 WHERE entity_id = ?1",
                params![entity_id],
                map_employee,
            )
            .optional()
            .context("Failed to query employee")
    }

    pub fn list_employees(&self) -> Result<Vec<Employee>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT entity_id, first_name, last_name, title, status, external_auth_id, e.created_at
                 FROM employees JOIN entities e ON e.id = employees.entity_id
                 ORDER BY last_name, first_name",
            )
            .context("Failed to prepare list_employees")?;
        let rows = stmt
            .query_map([], map_employee)
            .context("Failed to query employees")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read employee row")
    }

    // ── Partner reads ─────────────────────────────────────────────────

    /// Customer partners (external id `CUS…`) plus partners not yet synced.
    pub fn list_partners(&self) -> Result<Vec<PartnerSummary>> {
        let sql = format!(
            "{} WHERE p.external_id LIKE 'CUS%' OR p.external_id IS NULL ORDER BY p.external_id",
            SUMMARY_SELECT
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_partners")?;
        let rows = stmt
            .query_map([], map_summary)
            .context("Failed to query partners")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read partner row")
    }

    pub fn list_partner_names(&self) -> Result<Vec<PartnerName>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT p.entity_id, p.external_id, e.name
                 FROM partners p JOIN entities e ON e.id = p.entity_id
                 WHERE p.external_id LIKE 'CUS%' AND p.status != 'inactive'
                 ORDER BY e.name",
            )
            .context("Failed to prepare list_partner_names")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PartnerName {
                    entity_id: row.get(0)?,
                    external_id: row.get(1)?,
                    name: row.get(2)?,
                })
            })
            .context("Failed to query partner names")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read partner name row")
    }

    pub fn count_active_partners(&self) -> Result<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM partners WHERE status != 'inactive'",
                [],
                |row| row.get(0),
            )
            .context("Failed to count partners")
    }

    pub fn get_partner(&self, id: i64) -> Result<Option<Partner>> {
        let sql = format!("{} WHERE p.entity_id = ?1 LIMIT 1", DETAIL_SELECT);
        self.conn
            .query_row(&sql, params![id], map_partner)
            .optional()
            .context("Failed to query partner")
    }

    pub fn get_partner_by_campaign(&self, campaign_id: i64) -> Result<Option<Partner>> {
        let sql = format!(
            "{} WHERE p.entity_id = (SELECT partner_entity_id FROM campaigns WHERE id = ?1) LIMIT 1",
            DETAIL_SELECT
        );
        self.conn
            .query_row(&sql, params![campaign_id], map_partner)
            .optional()
            .context("Failed to query partner by campaign")
    }

    fn partner_exists(&self, id: i64) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM partners WHERE entity_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .context("Failed to check partner")
    }

    /// Current partner notes, grouped by note type.
    pub fn partner_notes(&self, id: i64) -> Result<BTreeMap<NoteType, Vec<Note>>> {
        let mut grouped: BTreeMap<NoteType, Vec<Note>> = BTreeMap::new();
        for note in self.list_current_notes(id, NoteEntityType::Partner)? {
            grouped.entry(note.note_type).or_default().push(note);
        }
        Ok(grouped)
    }

    /// Email addresses of the partner's contacts.
    pub fn partner_contact_emails(&self, id: i64) -> Result<Vec<ContactEmail>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT ec.contact_value, i.first_name, i.last_name, e.name
                 FROM entity_contacts ec
                 JOIN entity_relationships r ON r.child_entity_id = ec.entity_id
                 JOIN entities e ON e.id = ec.entity_id
                 LEFT JOIN individuals i ON i.entity_id = e.id
                 WHERE r.parent_entity_id = ?1
                   AND r.relationship_type = 'contact'
                   AND ec.contact_type = 'email'
                 ORDER BY ec.is_primary DESC, ec.id",
            )
            .context("Failed to prepare partner_contact_emails")?;
        let rows = stmt
            .query_map(params![id], |row| {
                let address: String = row.get(0)?;
                let first: Option<String> = row.get(1)?;
                let last: Option<String> = row.get(2)?;
                let entity_name: String = row.get(3)?;
                let name = match (first, last) {
                    (Some(f), Some(l)) if !f.is_empty() && !l.is_empty() => format!("{} {}", f, l),
                    _ => entity_name,
                };
                Ok(ContactEmail { name, address })
            })
            .context("Failed to query contact emails")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read contact email row")
    }

    // ── Partner writes ────────────────────────────────────────────────

    /// Create (`id == None`) or update a partner from the edit form. The
    /// entity, company, partner and billing address rows change together.
    pub fn save_partner(&self, id: Option<i64>, form: &PartnerForm, by: &Author) -> Result<i64> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err(PortalError::validation("Partner name is required").into());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let now = now_ts();

        let (entity_id, activity) = match id {
            Some(entity_id) => {
                if !self.partner_exists(entity_id)? {
                    return Err(PortalError::not_found("Partner", entity_id).into());
                }
                tx.execute(
                    "UPDATE entities SET name = ?1, netsuite_id = ?2, avatar_url = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![
                        name,
                        form.netsuite_id,
                        non_empty(form.avatar_url.as_deref()),
                        now,
                        entity_id
                    ],
                )
                .context("Failed to update partner entity")?;
                tx.execute(
                    "INSERT INTO companies (entity_id, legal_name, business_registration_number, industry, size)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(entity_id) DO UPDATE SET
                        legal_name = excluded.legal_name,
                        business_registration_number = excluded.business_registration_number,
                        industry = excluded.industry,
                        size = excluded.size",
                    params![
                        entity_id,
                        non_empty(form.legal_name.as_deref()),
                        non_empty(form.business_registration_number.as_deref()),
                        non_empty(form.industry.as_deref()),
                        non_empty(form.size.as_deref())
                    ],
                )
                .context("Failed to update company")?;
                tx.execute(
                    "UPDATE partners SET
                        demo_date = ?1, demo_by_entity_id = ?2, msa_signed = COALESCE(?3, msa_signed),
                        msa_signed_date = ?4, start_date = ?5, status = COALESCE(?6, status),
                        partner_type = ?7, acquisition_source = ?8, total_monthly_revenue = ?9,
                        available_currencies = ?10, default_currency = ?11, analytics_folder_id = ?12,
                        google_drive_link = ?13, external_id = ?14,
                        is_onboarded = COALESCE(?15, is_onboarded), updated_at = ?16
                     WHERE entity_id = ?17",
                    params![
                        non_empty(form.demo_date.as_deref()),
                        form.demo_by_entity_id,
                        form.msa_signed,
                        non_empty(form.msa_signed_date.as_deref()),
                        non_empty(form.start_date.as_deref()),
                        form.status.map(|s| s.as_str()),
                        form.partner_type.map(|t| t.as_str()),
                        non_empty(form.acquisition_source.as_deref()),
                        form.total_monthly_revenue,
                        non_empty(form.available_currencies.as_deref()),
                        non_empty(form.default_currency.as_deref()),
                        non_empty(form.analytics_folder_id.as_deref()),
                        non_empty(form.google_drive_link.as_deref()),
                        non_empty(form.external_id.as_deref()),
                        form.is_onboarded,
                        now,
                        entity_id
                    ],
                )
                .context("Failed to update partner")?;
                (entity_id, ActivityType::PartnerUpdated)
            }
            None => {
                tx.execute(
                    "INSERT INTO entities (entity_type, name, netsuite_id, avatar_url) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        EntityType::Company.as_str(),
                        name,
                        form.netsuite_id,
                        non_empty(form.avatar_url.as_deref())
                    ],
                )
                .context("Failed to insert partner entity")?;
                let entity_id = tx.last_insert_rowid();
                tx.execute(
                    "INSERT INTO partners (
                        entity_id, demo_date, demo_by_entity_id, msa_signed, msa_signed_date,
                        start_date, status, partner_type, acquisition_source, total_monthly_revenue,
                        available_currencies, default_currency, analytics_folder_id,
                        google_drive_link, external_id, is_onboarded)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                    params![
                        entity_id,
                        non_empty(form.demo_date.as_deref()),
                        form.demo_by_entity_id,
                        form.msa_signed.unwrap_or(false),
                        non_empty(form.msa_signed_date.as_deref()),
                        non_empty(form.start_date.as_deref()),
                        form.status.unwrap_or(PartnerStatus::Prospect).as_str(),
                        form.partner_type.map(|t| t.as_str()),
                        non_empty(form.acquisition_source.as_deref()),
                        form.total_monthly_revenue,
                        non_empty(form.available_currencies.as_deref()),
                        non_empty(form.default_currency.as_deref()),
                        non_empty(form.analytics_folder_id.as_deref()),
                        non_empty(form.google_drive_link.as_deref()),
                        non_empty(form.external_id.as_deref()),
                        form.is_onboarded.unwrap_or(false)
                    ],
                )
                .context("Failed to insert partner")?;
                tx.execute(
                    "INSERT INTO companies (entity_id, legal_name, business_registration_number, industry, size)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        entity_id,
                        non_empty(form.legal_name.as_deref()).unwrap_or(name),
                        non_empty(form.business_registration_number.as_deref()),
                        non_empty(form.industry.as_deref()),
                        non_empty(form.size.as_deref())
                    ],
                )
                .context("Failed to insert company")?;
                (entity_id, ActivityType::PartnerCreated)
            }
        };

        match (form.billing_address_id, non_empty(form.billing_address.as_deref())) {
            (Some(contact_id), address) => {
                tx.execute(
                    "UPDATE entity_contacts SET contact_value = ?1 WHERE id = ?2 AND entity_id = ?3",
                    params![address.unwrap_or(""), contact_id, entity_id],
                )
                .context("Failed to update billing address")?;
            }
            (None, Some(address)) => {
                tx.execute(
                    "INSERT INTO entity_contacts (entity_id, contact_type, contact_value, contact_label, is_primary)
                     VALUES (?1, ?2, ?3, 'billing', 1)",
                    params![entity_id, ContactType::Address.as_str(), address],
                )
                .context("Failed to insert billing address")?;
            }
            (None, None) => {}
        }

        self.create_activity(
            &NewActivity::new(by, activity, RelatedTable::Partners, entity_id)
                .partner(Some(entity_id))
                .details(name),
        )?;
        tx.commit().context("Failed to commit partner")?;

        tracing::info!(partner_id = entity_id, created = id.is_none(), "Partner saved");
        Ok(entity_id)
    }

    /// Create a prospect partner together with its primary contact person.
    pub fn create_prospect(
        &self,
        form: &ProspectForm,
        contact_auth_id: Option<&str>,
        by: &Author,
    ) -> Result<NewProspect> {
        let company = form.company_name.trim();
        let first = form.first_name.trim();
        let last = form.last_name.trim();
        let email = form.email.trim();
        if company.is_empty() || first.is_empty() || last.is_empty() {
            return Err(
                PortalError::validation("Company name, first name and last name are required").into(),
            );
        }
        if !email.contains('@') {
            return Err(PortalError::validation(format!("Invalid email address '{}'", email)).into());
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        tx.execute(
            "INSERT INTO entities (entity_type, name) VALUES (?1, ?2)",
            params![EntityType::Company.as_str(), company],
        )
        .context("Failed to insert company entity")?;
        let partner_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO entities (entity_type, name) VALUES (?1, ?2)",
            params![EntityType::Individual.as_str(), format!("{} {}", first, last)],
        )
        .context("Failed to insert contact entity")?;
        let contact_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO companies (entity_id, legal_name) VALUES (?1, ?2)",
            params![partner_id, company],
        )
        .context("Failed to insert company")?;
        tx.execute(
            "INSERT INTO individuals (entity_id, first_name, last_name, external_auth_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![contact_id, first, last, non_empty(contact_auth_id)],
        )
        .context("Failed to insert individual")?;
        tx.execute(
            "INSERT INTO partners (entity_id, status) VALUES (?1, ?2)",
            params![partner_id, PartnerStatus::Prospect.as_str()],
        )
        .context("Failed to insert prospect partner")?;
        tx.execute(
            "INSERT INTO entity_contacts (entity_id, contact_type, contact_value, contact_label, is_primary)
             VALUES (?1, ?2, ?3, 'work', 1)",
            params![contact_id, ContactType::Email.as_str(), email],
        )
        .context("Failed to insert contact email")?;
        tx.execute(
            "INSERT INTO entity_relationships (parent_entity_id, child_entity_id, relationship_type, relationship_subtype)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                partner_id,
                contact_id,
                RelationshipType::Contact.as_str(),
                RelationshipSubtype::Primary.as_str()
            ],
        )
        .context("Failed to insert contact relationship")?;

        self.create_activity(
            &NewActivity::new(by, ActivityType::ProspectCreated, RelatedTable::Partners, partner_id)
                .partner(Some(partner_id))
                .details(company),
        )?;
        tx.commit().context("Failed to commit prospect")?;

        tracing::info!(partner_id, contact_id, "Prospect created");
        Ok(NewProspect {
            partner_id,
            contact_id,
        })
    }

    /// Apply only the provided profile fields to the partner and company rows.
    pub fn update_partner_profile(&self, id: i64, patch: &PartnerProfilePatch) -> Result<ProfileUpdate> {
        if !self.partner_exists(id)? {
            return Err(PortalError::not_found("Partner", id).into());
        }

        let mut partner_cols: Vec<(&str, Value)> = Vec::new();
        if let Some(status) = patch.status {
            partner_cols.push(("status", Value::Text(status.as_str().to_string())));
        }
        if let Some(partner_type) = patch.partner_type {
            partner_cols.push(("partner_type", Value::Text(partner_type.as_str().to_string())));
        }
        if let Some(signed) = patch.msa_signed {
            partner_cols.push(("msa_signed", Value::Integer(i64::from(signed))));
        }
        if let Some(onboarded) = patch.is_onboarded {
            partner_cols.push(("is_onboarded", Value::Integer(i64::from(onboarded))));
        }
        if let Some(revenue) = patch.total_monthly_revenue {
            partner_cols.push(("total_monthly_revenue", Value::Integer(revenue)));
        }
        let partner_text = [
            ("msa_signed_date", &patch.msa_signed_date),
            ("start_date", &patch.start_date),
            ("acquisition_source", &patch.acquisition_source),
            ("available_currencies", &patch.available_currencies),
            ("default_currency", &patch.default_currency),
            ("analytics_folder_id", &patch.analytics_folder_id),
            ("google_drive_link", &patch.google_drive_link),
            ("external_id", &patch.external_id),
        ];
        for (col, value) in partner_text {
            if value.is_some() {
                partner_cols.push((col, text_value(value.as_deref())));
            }
        }

        let mut company_cols: Vec<(&str, Value)> = Vec::new();
        let company_text = [
            ("legal_name", &patch.legal_name),
            ("business_registration_number", &patch.business_registration_number),
            ("industry", &patch.industry),
            ("size", &patch.size),
        ];
        for (col, value) in company_text {
            if value.is_some() {
                company_cols.push((col, text_value(value.as_deref())));
            }
        }

        let result = ProfileUpdate {
            partner_updated: !partner_cols.is_empty(),
            company_updated: !company_cols.is_empty(),
        };
        if !result.partner_updated && !result.company_updated {
            return Ok(result);
        }

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        if result.partner_updated {
            partner_cols.push(("updated_at", Value::Text(now_ts())));
            update_columns(&tx, "partners", "entity_id", id, partner_cols)
                .context("Failed to update partner profile")?;
        }
        if result.company_updated {
            tx.execute(
                "INSERT OR IGNORE INTO companies (entity_id) VALUES (?1)",
                params![id],
            )
            .context("Failed to ensure company row")?;
            update_columns(&tx, "companies", "entity_id", id, company_cols)
                .context("Failed to update company profile")?;
        }
        tx.commit().context("Failed to commit profile update")?;
        Ok(result)
    }

    /// Point the partner's account manager relationship at `employee_id`,
    /// reusing `relationship_id` when the partner already has one. The reused
    /// row must be this partner's account manager link.
    pub fn set_account_manager(
        &self,
        partner_id: i64,
        employee_id: i64,
        relationship_id: Option<i64>,
    ) -> Result<()> {
        if !self.partner_exists(partner_id)? {
            return Err(PortalError::not_found("Partner", partner_id).into());
        }
        if self.get_employee(employee_id)?.is_none() {
            return Err(PortalError::not_found("Employee", employee_id).into());
        }

        match relationship_id {
            Some(rel_id) => {
                let changed = self
                    .conn
                    .execute(
                        "UPDATE entity_relationships SET child_entity_id = ?1, created_at = ?2
                         WHERE id = ?3 AND parent_entity_id = ?4 AND relationship_type = ?5",
                        params![
                            employee_id,
                            now_ts(),
                            rel_id,
                            partner_id,
                            RelationshipType::AccountManager.as_str()
                        ],
                    )
                    .context("Failed to update account manager")?;
                if changed == 0 {
                    return Err(
                        PortalError::not_found("Account manager relationship", rel_id).into(),
                    );
                }
            }
            None => {
                self.conn
                    .execute(
                        "INSERT INTO entity_relationships (parent_entity_id, child_entity_id, relationship_type)
                         VALUES (?1, ?2, ?3)",
                        params![
                            partner_id,
                            employee_id,
                            RelationshipType::AccountManager.as_str()
                        ],
                    )
                    .context("Failed to insert account manager")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::seed_author;
    use super::*;

    fn partner_form(name: &str) -> PartnerForm {
        PartnerForm {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_employee() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let employee = db.create_employee("Ada", "Lovelace", Some("Strategist"), Some("auth|ada"))?;
        assert_eq!(employee.first_name, "Ada");
        assert_eq!(employee.status, "active");
        assert_eq!(employee.external_auth_id.as_deref(), Some("auth|ada"));

        assert!(db.create_employee(" ", "Nobody", None, None).is_err());
        Ok(())
    }

    #[test]
    fn test_list_employees_ordered_by_last_name() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        db.create_employee("Zed", "Young", None, None)?;
        db.create_employee("Amy", "Adams", None, None)?;
        let names: Vec<String> = db
            .list_employees()?
            .into_iter()
            .map(|e| e.last_name)
            .collect();
        assert_eq!(names, vec!["Adams", "Young"]);
        Ok(())
    }

    #[test]
    fn test_create_partner_defaults_legal_name() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;

        let mut form = partner_form("Acme Roofing");
        form.external_id = Some("CUS100".to_string());
        form.available_currencies = Some("USD, CAD".to_string());
        form.billing_address = Some("1 Main St".to_string());
        let id = db.save_partner(None, &form, &author)?;

        let partner = db.get_partner(id)?.expect("partner should exist");
        assert_eq!(partner.name, "Acme Roofing");
        assert_eq!(partner.status, PartnerStatus::Prospect);
        assert_eq!(partner.legal_name.as_deref(), Some("Acme Roofing"));
        assert_eq!(partner.available_currencies_list, vec!["USD", "CAD"]);
        assert_eq!(partner.billing_address.as_deref(), Some("1 Main St"));
        assert!(!partner.msa_signed);
        Ok(())
    }

    #[test]
    fn test_update_partner_rewrites_rows() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let mut form = partner_form("Acme");
        form.billing_address = Some("1 Main St".to_string());
        let id = db.save_partner(None, &form, &author)?;
        let before = db.get_partner(id)?.unwrap();

        let mut update = partner_form("Acme Holdings");
        update.status = Some(PartnerStatus::Active);
        update.legal_name = Some("Acme Holdings LLC".to_string());
        update.billing_address_id = before.billing_address_id;
        update.billing_address = Some("2 Side St".to_string());
        assert_eq!(db.save_partner(Some(id), &update, &author)?, id);

        let after = db.get_partner(id)?.unwrap();
        assert_eq!(after.name, "Acme Holdings");
        assert_eq!(after.status, PartnerStatus::Active);
        assert_eq!(after.legal_name.as_deref(), Some("Acme Holdings LLC"));
        assert_eq!(after.billing_address.as_deref(), Some("2 Side St"));
        assert_eq!(after.billing_address_id, before.billing_address_id);

        let activity = db.activities_for_item(RelatedTable::Partners, id)?;
        assert_eq!(activity.len(), 2);
        assert_eq!(activity[0].activity_type, ActivityType::PartnerUpdated);
        Ok(())
    }

    #[test]
    fn test_save_missing_partner_is_not_found() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let err = db
            .save_partner(Some(999), &partner_form("Ghost"), &author)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::NotFound { id: 999, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_list_partners_filters_external_id() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        for (name, ext) in [("B", Some("CUS2")), ("A", Some("CUS1")), ("V", Some("VEN9")), ("N", None)] {
            let mut form = partner_form(name);
            form.external_id = ext.map(str::to_string);
            db.save_partner(None, &form, &author)?;
        }

        let names: Vec<String> = db.list_partners()?.into_iter().map(|p| p.name).collect();
        // NULL sorts first in SQLite
        assert_eq!(names, vec!["N", "A", "B"]);
        Ok(())
    }

    #[test]
    fn test_partner_names_and_active_count() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let mut a = partner_form("Zulu");
        a.external_id = Some("CUS1".to_string());
        let mut b = partner_form("Alpha");
        b.external_id = Some("CUS2".to_string());
        let mut c = partner_form("Gone");
        c.external_id = Some("CUS3".to_string());
        c.status = Some(PartnerStatus::Inactive);
        for form in [&a, &b, &c] {
            db.save_partner(None, form, &author)?;
        }

        let names: Vec<String> = db
            .list_partner_names()?
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Zulu"]);
        assert_eq!(db.count_active_partners()?, 2);
        Ok(())
    }

    #[test]
    fn test_create_prospect() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let prospect = db.create_prospect(
            &ProspectForm {
                company_name: "Bright Dental".to_string(),
                first_name: "Dana".to_string(),
                last_name: "Reyes".to_string(),
                email: "dana@bright.example".to_string(),
            },
            Some("auth|dana"),
            &author,
        )?;

        let partner = db.get_partner(prospect.partner_id)?.unwrap();
        assert_eq!(partner.status, PartnerStatus::Prospect);
        assert_eq!(partner.legal_name.as_deref(), Some("Bright Dental"));

        let emails = db.partner_contact_emails(prospect.partner_id)?;
        assert_eq!(
            emails,
            vec![ContactEmail {
                name: "Dana Reyes".to_string(),
                address: "dana@bright.example".to_string()
            }]
        );
        Ok(())
    }

    #[test]
    fn test_create_prospect_rejects_bad_email() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let result = db.create_prospect(
            &ProspectForm {
                company_name: "X".to_string(),
                first_name: "Y".to_string(),
                last_name: "Z".to_string(),
                email: "not-an-email".to_string(),
            },
            None,
            &author,
        );
        assert!(result.is_err());
        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM partners", [], |row| row.get(0))?;
        assert_eq!(count, 0);
        Ok(())
    }

    #[test]
    fn test_update_partner_profile_partial() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let mut form = partner_form("Acme");
        form.acquisition_source = Some("referral".to_string());
        let id = db.save_partner(None, &form, &author)?;

        let result = db.update_partner_profile(
            id,
            &PartnerProfilePatch {
                default_currency: Some("CAD".to_string()),
                industry: Some("Roofing".to_string()),
                ..Default::default()
            },
        )?;
        assert!(result.partner_updated);
        assert!(result.company_updated);

        let partner = db.get_partner(id)?.unwrap();
        assert_eq!(partner.default_currency.as_deref(), Some("CAD"));
        assert_eq!(partner.industry.as_deref(), Some("Roofing"));
        assert_eq!(partner.acquisition_source.as_deref(), Some("referral"));

        let noop = db.update_partner_profile(id, &PartnerProfilePatch::default())?;
        assert_eq!(noop, ProfileUpdate::default());
        Ok(())
    }

    #[test]
    fn test_set_account_manager_insert_then_update() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let id = db.save_partner(None, &partner_form("Acme"), &author)?;
        let first = db.create_employee("Sam", "Lee", None, None)?;
        let second = db.create_employee("Kim", "Park", None, None)?;

        db.set_account_manager(id, first.entity_id, None)?;
        let partner = db.get_partner(id)?.unwrap();
        assert_eq!(partner.account_manager_id, Some(first.entity_id));
        assert_eq!(partner.account_manager_name.as_deref(), Some("Sam Lee"));

        db.set_account_manager(id, second.entity_id, partner.account_manager_relationship_id)?;
        let partner = db.get_partner(id)?.unwrap();
        assert_eq!(partner.account_manager_id, Some(second.entity_id));
        Ok(())
    }

    #[test]
    fn test_set_account_manager_rejects_other_relationships() -> Result<()> {
        let db = PortalDb::new_in_memory()?;
        let author = seed_author(&db)?;
        let acme = db.save_partner(None, &partner_form("Acme"), &author)?;
        let manager = db.create_employee("Sam", "Lee", None, None)?;
        let prospect = db.create_prospect(
            &ProspectForm {
                company_name: "Bright Dental".to_string(),
                first_name: "Dana".to_string(),
                last_name: "Reyes".to_string(),
                email: "dana@bright.example".to_string(),
            },
            None,
            &author,
        )?;
        let contact_link: i64 = db.conn.query_row(
            "SELECT id FROM entity_relationships WHERE parent_entity_id = ?1 AND relationship_type = 'contact'",
            params![prospect.partner_id],
            |row| row.get(0),
        )?;

        // Another partner's contact link.
        let err = db
            .set_account_manager(acme, manager.entity_id, Some(contact_link))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PortalError>(),
            Some(PortalError::NotFound { id, .. }) if *id == contact_link
        ));
        // The partner's own contact link is not an account manager link either.
        assert!(
            db.set_account_manager(prospect.partner_id, manager.entity_id, Some(contact_link))
                .is_err()
        );

        let (parent, child, kind): (i64, i64, String) = db.conn.query_row(
            "SELECT parent_entity_id, child_entity_id, relationship_type FROM entity_relationships WHERE id = ?1",
            params![contact_link],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        assert_eq!(parent, prospect.partner_id);
        assert_eq!(child, prospect.contact_id);
        assert_eq!(kind, "contact");
        assert_eq!(db.get_partner(acme)?.unwrap().account_manager_id, None);
        Ok(())
    }
}
