//! Row and form types shared by the database layer and the HTTP API.
//!
//! Output rows derive `Serialize`; form and patch types derive `Deserialize`
//! and are passed straight from request bodies into `PortalDb` methods.

use portal_common::{
    AccessItemOwner, ActivityType, CampaignStatus, NoteEntityType, NoteType, PartnerStatus,
    PartnerType, PermissionState, PrimaryParticipant, ProposalMode, RelatedTable, ScopeStatus,
    ServiceScope, ServiceType, TaskGrouping, TaskTemplateType, TemplateCategory, TfaSource,
    TfaType,
};
use serde::{Deserialize, Serialize};

/// Who is making a change: the employee entity stamped into `created_by` /
/// `updated_by`, and the auth-provider id recorded in the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub entity_id: i64,
    pub user_id: String,
}

// ── Parties ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Employee {
    pub entity_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub title: Option<String>,
    pub status: String,
    pub external_auth_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEmployee {
    pub first_name: String,
    pub last_name: String,
    pub title: Option<String>,
    pub external_auth_id: Option<String>,
}

/// Row of the partner list screen.
#[derive(Debug, Clone, Serialize)]
pub struct PartnerSummary {
    pub entity_id: i64,
    pub name: String,
    pub external_id: Option<String>,
    pub status: PartnerStatus,
    pub partner_type: Option<PartnerType>,
    pub total_monthly_revenue: Option<i64>,
    pub available_currencies: Option<String>,
    pub available_currencies_list: Vec<String>,
    pub default_currency: Option<String>,
    pub is_onboarded: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerName {
    pub entity_id: i64,
    pub external_id: Option<String>,
    pub name: String,
}

/// Full partner record: entity, company and partner rows, plus the account
/// manager relationship and billing address contact.
#[derive(Debug, Clone, Serialize)]
pub struct Partner {
    pub entity_id: i64,
    pub name: String,
    pub netsuite_id: Option<i64>,
    pub avatar_url: Option<String>,
    pub status: PartnerStatus,
    pub partner_type: Option<PartnerType>,
    pub msa_signed: bool,
    pub msa_signed_date: Option<String>,
    pub demo_date: Option<String>,
    pub demo_by_entity_id: Option<i64>,
    pub start_date: Option<String>,
    pub acquisition_source: Option<String>,
    pub total_monthly_revenue: Option<i64>,
    pub available_currencies: Option<String>,
    pub available_currencies_list: Vec<String>,
    pub default_currency: Option<String>,
    pub analytics_folder_id: Option<String>,
    pub google_drive_link: Option<String>,
    pub external_id: Option<String>,
    pub is_onboarded: bool,
    pub legal_name: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub business_registration_number: Option<String>,
    pub account_manager_relationship_id: Option<i64>,
    pub account_manager_id: Option<i64>,
    pub account_manager_name: Option<String>,
    pub billing_address_id: Option<i64>,
    pub billing_address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PartnerForm {
    pub name: String,
    pub netsuite_id: Option<i64>,
    pub avatar_url: Option<String>,
    pub status: Option<PartnerStatus>,
    pub partner_type: Option<PartnerType>,
    pub msa_signed: Option<bool>,
    pub msa_signed_date: Option<String>,
    pub demo_date: Option<String>,
    pub demo_by_entity_id: Option<i64>,
    pub start_date: Option<String>,
    pub acquisition_source: Option<String>,
    pub total_monthly_revenue: Option<i64>,
    pub available_currencies: Option<String>,
    pub default_currency: Option<String>,
    pub analytics_folder_id: Option<String>,
    pub google_drive_link: Option<String>,
    pub external_id: Option<String>,
    pub is_onboarded: Option<bool>,
    pub legal_name: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
    pub business_registration_number: Option<String>,
    pub billing_address: Option<String>,
    pub billing_address_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProspectForm {
    pub company_name: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewProspect {
    pub partner_id: i64,
    pub contact_id: i64,
}

/// Partial profile update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PartnerProfilePatch {
    pub status: Option<PartnerStatus>,
    pub partner_type: Option<PartnerType>,
    pub msa_signed: Option<bool>,
    pub msa_signed_date: Option<String>,
    pub start_date: Option<String>,
    pub acquisition_source: Option<String>,
    pub total_monthly_revenue: Option<i64>,
    pub available_currencies: Option<String>,
    pub default_currency: Option<String>,
    pub analytics_folder_id: Option<String>,
    pub google_drive_link: Option<String>,
    pub external_id: Option<String>,
    pub is_onboarded: Option<bool>,
    pub legal_name: Option<String>,
    pub business_registration_number: Option<String>,
    pub industry: Option<String>,
    pub size: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    pub partner_updated: bool,
    pub company_updated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContactEmail {
    pub name: String,
    pub address: String,
}

// ── Campaigns ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Campaign {
    pub id: i64,
    pub partner_entity_id: i64,
    pub site_url: String,
    pub status: CampaignStatus,
    pub campaign_profile_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCampaign {
    pub site_url: String,
    pub status: Option<CampaignStatus>,
    pub campaign_profile_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignProfile {
    pub id: i64,
    pub name: String,
    pub label: Option<String>,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub criteria: Option<String>,
    pub examples: Option<String>,
    pub seo_growth_opportunities: Option<String>,
    pub common_challenges: Option<String>,
    pub campaign_considerations: Option<String>,
    pub presale_considerations: Option<String>,
    pub phase_one_outline: Option<String>,
    pub ongoing_phase_outline: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub created_by: i64,
    pub updated_at: String,
    pub updated_by: i64,
}

// ── Catalog ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ServiceCategory {
    pub id: i64,
    pub key: String,
    pub display_name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub updated_by: i64,
    pub updated_by_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceCategoryForm {
    pub key: String,
    pub display_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceCategoryPatch {
    pub display_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceItem {
    pub id: i64,
    pub name: String,
    /// Legacy free-text category key, kept alongside `service_category_id`.
    pub service_category: Option<String>,
    pub service_category_id: Option<i64>,
    pub service_category_name: Option<String>,
    pub service_label: Option<String>,
    #[serde(rename = "type")]
    pub service_type: Option<ServiceType>,
    pub description: Option<String>,
    pub sop_url: Option<String>,
    pub min_pricing_usd_cents: Option<i64>,
    pub est_cogs_usd_cents: Option<i64>,
    pub est_time_minutes: Option<i64>,
    pub recommended_price_cents: Option<i64>,
    pub recommended_price_currency: Option<String>,
    pub partner_entity_id: Option<i64>,
    pub partner_name: Option<String>,
    pub is_active: bool,
    pub service_scope: ServiceScope,
    pub is_billable: bool,
    pub proposal_mode: ProposalMode,
    pub package_display: Option<String>,
    pub mcp_display: Option<String>,
    pub in_stream: bool,
    pub generate_task: bool,
    pub created_at: String,
    pub updated_at: String,
    pub updated_by_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceItemForm {
    pub name: String,
    pub service_category: Option<String>,
    pub service_label: Option<String>,
    #[serde(rename = "type")]
    pub service_type: Option<ServiceType>,
    pub description: Option<String>,
    pub sop_url: Option<String>,
    pub budget_amount_dollars: Option<f64>,
    pub est_cogs_dollars: Option<f64>,
    pub est_time_minutes: Option<i64>,
    pub recommended_price_dollars: Option<f64>,
    pub recommended_price_currency: Option<String>,
    pub partner_entity_id: Option<i64>,
    pub is_active: Option<bool>,
    pub service_scope: Option<ServiceScope>,
    pub is_billable: Option<bool>,
    pub proposal_mode: Option<ProposalMode>,
    pub package_display: Option<String>,
    pub mcp_display: Option<String>,
    pub in_stream: Option<bool>,
    pub generate_task: Option<bool>,
}

/// Service item offered when building a package. Partner-specific items
/// carry a leading `*` in `name`.
#[derive(Debug, Clone, Serialize)]
pub struct PackageOption {
    pub id: i64,
    pub name: String,
    pub service_label: Option<String>,
    pub is_partner_specific: bool,
    pub recommended_price_cents: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionItemOption {
    pub id: i64,
    pub name: String,
    /// Unprefixed item name.
    pub title: String,
    pub description: Option<String>,
    pub is_partner_specific: bool,
}

// ── Packages ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Package {
    pub id: i64,
    pub name: String,
    pub monthly_price_cents: Option<i64>,
    pub currency: Option<String>,
    pub partner_entity_id: Option<i64>,
    pub partner_name: Option<String>,
    pub related_campaign_profile_id: Option<i64>,
    pub campaign_profile_name: Option<String>,
    pub campaign_considerations: Option<String>,
    pub presale_considerations: Option<String>,
    pub phase_one_outline: Option<String>,
    pub ongoing_phase_outline: Option<String>,
    pub seo_growth_opportunities: Option<String>,
    pub is_active: bool,
    pub buy_without_discovery: bool,
    pub description: Option<String>,
    pub outcome: Option<String>,
    #[serde(rename = "type")]
    pub package_type: Option<ServiceType>,
    pub default_aa_client_template: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub updated_by_name: Option<String>,
    pub service_items: Vec<PackageServiceItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageForm {
    pub name: String,
    pub monthly_price_cents: Option<i64>,
    pub currency: Option<String>,
    pub partner_entity_id: Option<i64>,
    pub related_campaign_profile_id: Option<i64>,
    pub description: Option<String>,
    pub outcome: Option<String>,
    #[serde(rename = "type")]
    pub package_type: Option<ServiceType>,
    pub buy_without_discovery: Option<bool>,
    pub is_active: Option<bool>,
    pub default_aa_client_template: Option<String>,
}

/// Fields a duplicate may override; everything else is taken from the source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DuplicatePackageForm {
    pub name: Option<String>,
    pub monthly_price_cents: Option<i64>,
    pub currency: Option<String>,
    pub partner_entity_id: Option<i64>,
    pub related_campaign_profile_id: Option<i64>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub package_type: Option<ServiceType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageServiceItem {
    pub id: i64,
    pub package_id: i64,
    pub service_item_id: i64,
    pub service_item_name: String,
    pub service_label: Option<String>,
    pub quantity: Option<i64>,
    pub frequency: Option<String>,
    pub monthly_price_cents: Option<i64>,
    pub order_override: Option<i64>,
    pub unique_service_label: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageServiceItemForm {
    pub service_item_id: i64,
    pub quantity: Option<i64>,
    pub frequency: Option<String>,
    pub monthly_price_cents: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageServiceItemPatch {
    pub quantity: Option<i64>,
    pub frequency: Option<String>,
    pub monthly_price_cents: Option<i64>,
    pub order_override: Option<i64>,
    pub unique_service_label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageActionItem {
    pub id: i64,
    pub package_id: i64,
    pub package_service_item_id: Option<i64>,
    pub service_item_id: i64,
    pub name: String,
    pub order_override: Option<i64>,
    pub in_onboarding: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PackageActionItemForm {
    pub service_item_id: Option<i64>,
    pub package_service_item_id: Option<i64>,
    pub order_override: Option<i64>,
    pub in_onboarding: Option<bool>,
}

/// New position of the action item built from `service_item_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionItemOrder {
    pub service_item_id: i64,
    pub order_override: Option<i64>,
}

// ── Permissions ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Permission {
    pub id: i64,
    pub name: Option<String>,
    pub permission_key: String,
    pub permission_state: PermissionState,
    pub scope_status: Option<ScopeStatus>,
    pub service_item_id: Option<i64>,
    pub service_item_name: Option<String>,
    pub service_category_id: Option<i64>,
    pub service_category_name: Option<String>,
    pub partner_id: Option<i64>,
    pub partner_name: Option<String>,
    pub campaign_id: Option<i64>,
    pub package_id: Option<i64>,
    pub campaign_profile_id: Option<i64>,
    pub campaign_profile_name: Option<String>,
    pub changed_by: Option<i64>,
    pub change_reason: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub updated_by_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PermissionForm {
    pub name: Option<String>,
    pub permission_key: String,
    pub permission_state: PermissionState,
    pub scope_status: Option<ScopeStatus>,
    pub service_item_id: Option<i64>,
    pub service_category_id: Option<i64>,
    pub partner_id: Option<i64>,
    pub campaign_id: Option<i64>,
    pub package_id: Option<i64>,
    pub campaign_profile_id: Option<i64>,
    pub change_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PermissionPatch {
    pub name: Option<String>,
    pub permission_key: Option<String>,
    pub permission_state: Option<PermissionState>,
    pub scope_status: Option<ScopeStatus>,
    pub change_reason: Option<String>,
    pub is_active: Option<bool>,
}

/// A base permission after partner overrides are applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectivePermission {
    /// Id of the row that supplied the state: the override when there is one.
    pub id: i64,
    pub name: Option<String>,
    pub permission_key: String,
    pub permission_state: PermissionState,
    pub is_partner_override: bool,
}

// ── Task templates ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TaskTemplate {
    pub id: i64,
    #[serde(rename = "type")]
    pub template_type: TaskTemplateType,
    pub title: String,
    pub description: Option<String>,
    pub key: Option<String>,
    pub primary_participant: PrimaryParticipant,
    pub grouping: TaskGrouping,
    pub est_time_minutes: Option<i64>,
    pub sop_url: Option<String>,
    pub sop_id: Option<i64>,
    pub gold_standard_url: Option<String>,
    pub template_category: TemplateCategory,
    pub partner_entity_id: Option<i64>,
    pub partner_name: Option<String>,
    pub campaign_profile_id: Option<i64>,
    pub campaign_profile_name: Option<String>,
    pub service_category_id: Option<i64>,
    pub service_category_name: Option<String>,
    pub mandatory: bool,
    pub decision_point: bool,
    pub active: bool,
    pub created_at: String,
    pub created_by: Option<i64>,
    pub updated_at: String,
    pub updated_by: Option<i64>,
    pub updated_by_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskTemplateForm {
    #[serde(rename = "type")]
    pub template_type: TaskTemplateType,
    pub title: String,
    pub description: Option<String>,
    pub key: Option<String>,
    pub primary_participant: PrimaryParticipant,
    pub grouping: TaskGrouping,
    pub est_time_minutes: Option<i64>,
    pub sop_url: Option<String>,
    pub sop_id: Option<i64>,
    pub gold_standard_url: Option<String>,
    pub partner_entity_id: Option<i64>,
    pub campaign_profile_id: Option<i64>,
    pub service_category_id: Option<i64>,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub decision_point: bool,
}

/// Partial update. For the scope ids and `sop_id`, `Some(0)` clears the column.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskTemplatePatch {
    #[serde(rename = "type")]
    pub template_type: Option<TaskTemplateType>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub key: Option<String>,
    pub primary_participant: Option<PrimaryParticipant>,
    pub grouping: Option<TaskGrouping>,
    pub est_time_minutes: Option<i64>,
    pub sop_url: Option<String>,
    pub sop_id: Option<i64>,
    pub gold_standard_url: Option<String>,
    pub partner_entity_id: Option<i64>,
    pub campaign_profile_id: Option<i64>,
    pub service_category_id: Option<i64>,
    pub mandatory: Option<bool>,
    pub decision_point: Option<bool>,
}

// ── Access items ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AccessItem {
    pub id: i64,
    pub email: Option<String>,
    pub username: String,
    pub access_item_owner: AccessItemOwner,
    pub in_lastpass: bool,
    pub tfa_type: Option<TfaType>,
    pub tfa_type_value: Option<String>,
    pub tfa_contact_id: Option<i64>,
    pub tfa_contact_name: Option<String>,
    pub tfa_source: Option<TfaSource>,
    pub partner_entity_id: Option<i64>,
    pub partner_name: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessItemForm {
    pub email: Option<String>,
    pub username: String,
    pub access_item_owner: AccessItemOwner,
    #[serde(default)]
    pub in_lastpass: bool,
    pub tfa_type: Option<TfaType>,
    pub tfa_type_value: Option<String>,
    pub tfa_contact_id: Option<i64>,
    pub tfa_source: Option<TfaSource>,
    pub partner_entity_id: Option<i64>,
}

// ── Notes ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: i64,
    pub entity_id: i64,
    pub entity_type: NoteEntityType,
    pub note_type: NoteType,
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_internal: bool,
    pub is_pinned: bool,
    pub is_current: bool,
    pub version_number: i64,
    pub replaces_note_id: Option<i64>,
    pub created_by_entity_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Note content as submitted. The key `(entity_id, entity_type, note_type)`
/// is taken from the draft when creating; a new version keeps the key of the
/// note it replaces.
#[derive(Debug, Clone, Deserialize)]
pub struct NoteDraft {
    pub entity_id: i64,
    pub entity_type: NoteEntityType,
    #[serde(default = "default_note_type")]
    pub note_type: NoteType,
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(default = "default_true")]
    pub is_internal: bool,
    #[serde(default)]
    pub is_pinned: bool,
}

fn default_note_type() -> NoteType {
    NoteType::General
}

fn default_true() -> bool {
    true
}

impl NoteDraft {
    pub fn new(entity_id: i64, entity_type: NoteEntityType, note_type: NoteType) -> Self {
        Self {
            entity_id,
            entity_type,
            note_type,
            title: None,
            content: None,
            is_internal: true,
            is_pinned: false,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

// ── Activity log ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Activity {
    pub id: i64,
    pub user_id: String,
    pub partner_id: Option<i64>,
    pub activity_type: ActivityType,
    pub related_id: i64,
    pub related_table: RelatedTable,
    pub details: Option<String>,
    pub activity_date: String,
    /// "first last" of the employee or individual behind `user_id`.
    pub actor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub user_id: String,
    pub partner_id: Option<i64>,
    pub activity_type: ActivityType,
    pub related_table: RelatedTable,
    pub related_id: i64,
    pub details: Option<String>,
}

impl NewActivity {
    pub fn new(
        author: &Author,
        activity_type: ActivityType,
        related_table: RelatedTable,
        related_id: i64,
    ) -> Self {
        Self {
            user_id: author.user_id.clone(),
            partner_id: None,
            activity_type,
            related_table,
            related_id,
            details: None,
        }
    }

    pub fn partner(mut self, partner_id: Option<i64>) -> Self {
        self.partner_id = partner_id;
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Split the stored comma-separated currency list.
pub fn split_currencies(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
